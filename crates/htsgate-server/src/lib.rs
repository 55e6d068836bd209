//! HTTP controller for htsgate.
//!
//! A thin layer over the engine: routes, parameter parsing, catalog lookup,
//! and the trailer-capable streaming response. Validation and catalog
//! failures are reported as JSON with a real status code; once streaming
//! has started, failures only ever surface through the trailer block.

pub mod body;
pub mod error;

use std::sync::Arc;

use axum::extract::{Path, Query as UrlQuery, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderValue};
use serde_json::json;
use tracing::{info, warn};

use htsgate_engine::{
    response_channel, trailer, Catalog, RequestProcessor, RESPONSE_CHANNEL_CAPACITY,
};
use htsgate_types::{FileRef, Format, Query, Ticket};

use crate::body::TrailerBody;
use crate::error::GatewayError;

const TICKET_CONTENT_TYPE: &str = "application/vnd.ga4gh.htsget.v1.0+json; charset=utf-8";

/// Shared controller state; read-only after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub processor: Arc<RequestProcessor>,
    pub catalog: Arc<dyn Catalog>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sample", get(sample_handler))
        .route("/file", get(file_handler))
        .route("/ga4gh/sample/{id}", get(ticket_handler))
        .with_state(state)
}

/// Query-string parameters shared by the streaming endpoints.
#[derive(Debug, Default)]
struct Params {
    accession: Option<String>,
    name: Option<String>,
    format: Option<String>,
    regions: Vec<String>,
}

fn parse_params(pairs: Vec<(String, String)>) -> Params {
    let mut params = Params::default();
    for (key, value) in pairs {
        match key.as_str() {
            "accession" => params.accession = Some(value),
            "name" => params.name = Some(value),
            "format" => params.format = Some(value),
            "region" => params.regions.push(value),
            _ => {}
        }
    }
    params
}

fn requested_format(params: &Params) -> Result<Format, GatewayError> {
    match &params.format {
        Some(name) => name
            .parse::<Format>()
            .map_err(|err| GatewayError::Query(err.into())),
        None => Ok(RequestProcessor::default_format()),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Stream every file recorded under an accession, merged when plural.
async fn sample_handler(
    State(state): State<GatewayState>,
    UrlQuery(pairs): UrlQuery<Vec<(String, String)>>,
) -> Result<Response, GatewayError> {
    let params = parse_params(pairs);
    let accession = params
        .accession
        .as_deref()
        .ok_or_else(|| GatewayError::BadRequest("accession parameter required".to_string()))?;
    let format = requested_format(&params)?;
    let files = state.catalog.by_accession(accession).await?;
    let query = build_query(&state, files, format, params.regions).await?;
    stream_pipeline(&state, query)
}

/// Stream one named data object.
async fn file_handler(
    State(state): State<GatewayState>,
    UrlQuery(pairs): UrlQuery<Vec<(String, String)>>,
) -> Result<Response, GatewayError> {
    let params = parse_params(pairs);
    let name = params
        .name
        .as_deref()
        .ok_or_else(|| GatewayError::BadRequest("name parameter required".to_string()))?;
    let format = requested_format(&params)?;
    let file = state.catalog.by_name(name).await?;
    let query = build_query(&state, vec![file], format, params.regions).await?;
    stream_pipeline(&state, query)
}

/// Hand out a redirect manifest pointing back at `/sample`.
async fn ticket_handler(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    UrlQuery(pairs): UrlQuery<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let params = parse_params(pairs);
    let format = requested_format(&params)?;
    // Confirm the accession resolves before handing out a ticket.
    state.catalog.by_accession(&id).await?;

    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    // Path and query extractors hand over decoded values; re-encode them
    // before they go back out in the ticket URL.
    let mut url = format!(
        "http://{host}/sample?accession={}&format={format}",
        encode_query_value(&id)
    );
    for region in &params.regions {
        url.push_str("&region=");
        url.push_str(&encode_query_value(region));
    }

    let mut response = Json(Ticket::single(format.as_str(), url)).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TICKET_CONTENT_TYPE));
    Ok(response)
}

/// Percent-encode one query-string value (everything but unreserved bytes).
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

async fn build_query(
    state: &GatewayState,
    files: Vec<FileRef>,
    format: Format,
    regions: Vec<String>,
) -> Result<Query, GatewayError> {
    let mut query = Query {
        files,
        regions,
        format,
        reference: None,
    };
    if format == Format::Vcf {
        if let Some(first) = query.files.first() {
            query.reference = state.catalog.reference_for(first).await?;
        }
        if query.reference.is_none() {
            query.reference = state.processor.config().reference.clone();
        }
    }
    state.processor.validate(&query)?;
    Ok(query)
}

/// Start the pipeline and return the streaming response immediately.
///
/// The trailer block is declared before the first body byte; from here on
/// the processor reports every failure through `data-truncated`.
fn stream_pipeline(state: &GatewayState, query: Query) -> Result<Response, GatewayError> {
    let (mut channel, body) = response_channel(RESPONSE_CHANNEL_CAPACITY);
    trailer::declare(&mut channel)?;
    channel.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let headers = channel.headers().clone();

    let processor = Arc::clone(&state.processor);
    tokio::spawn(async move {
        match processor.process(&query, &mut channel).await {
            Ok(outcome) => info!(truncated = outcome.truncated, "request settled"),
            Err(err) => {
                warn!(error = %err, "request failed before streaming");
                let _ = trailer::set_data_truncation(&mut channel, true, None);
            }
        }
    });

    let mut response = Response::new(axum::body::Body::new(TrailerBody::new(body)));
    *response.headers_mut() = headers;
    Ok(response)
}
