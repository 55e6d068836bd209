//! Controller errors, surfaced as JSON before streaming begins.

use axum::response::{IntoResponse, Json, Response};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

use htsgate_engine::{CatalogError, QueryError, TrailerError};

/// Errors the controller can report with a real status code. Anything that
/// happens after the 200 has been flushed is reported through the
/// truncation trailer instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Trailer(#[from] TrailerError),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::Query(_) => StatusCode::BAD_REQUEST,
            GatewayError::Catalog(CatalogError::NotFound(_)) => StatusCode::NOT_FOUND,
            GatewayError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Trailer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) | GatewayError::Query(_) => "validation",
            GatewayError::Catalog(CatalogError::NotFound(_)) => "not_found",
            GatewayError::Catalog(_) => "catalog",
            GatewayError::Trailer(_) => "internal",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status(), Json(payload)).into_response()
    }
}
