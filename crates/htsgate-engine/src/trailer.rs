//! HTTP trailer declaration and emission.
//!
//! Trailers are the only reliable way to report truncation after a 200 has
//! already been flushed. Two invariants are enforced here: declare before
//! the first body byte, set values only after a declaration. A transport
//! that stripped chunked encoding simply never delivers the block; emission
//! into a closed transport is not an error.

use http::header::{HeaderName, HeaderValue, TRAILER};
use http::HeaderMap;

use crate::error::TrailerError;
use crate::response::ResponseChannel;

/// Trailer announcing whether the streamed body is complete.
pub const DATA_TRUNCATED: &str = "data-truncated";
/// Trailer carrying the hex MD5 of the streamed body.
pub const CHECKSUM: &str = "checksum";

const DECLARATION: &str = "data-truncated,checksum";

/// Announce the trailer block. Must run before the first body write.
pub fn declare(response: &mut ResponseChannel) -> Result<(), TrailerError> {
    if response.body_started {
        return Err(TrailerError::HeadersAlreadySent);
    }
    response
        .headers
        .insert(TRAILER, HeaderValue::from_static(DECLARATION));
    response.declared = true;
    Ok(())
}

/// Undo [`declare`]. Idempotent; a response without a declaration is left
/// untouched.
pub fn remove_declaration(response: &mut ResponseChannel) {
    response.headers.remove(TRAILER);
    response.declared = false;
}

/// Emit the trailer values: `data-truncated` and `checksum` (`"null"` when
/// no digest is available).
pub fn set_data_truncation(
    response: &mut ResponseChannel,
    truncated: bool,
    checksum: Option<&str>,
) -> Result<(), TrailerError> {
    if !response.declared {
        return Err(TrailerError::TrailerNotDeclared);
    }

    let mut trailers = HeaderMap::new();
    trailers.insert(
        HeaderName::from_static(DATA_TRUNCATED),
        HeaderValue::from_static(if truncated { "true" } else { "false" }),
    );
    let checksum = checksum.unwrap_or("null");
    trailers.insert(
        HeaderName::from_static(CHECKSUM),
        HeaderValue::from_str(checksum).unwrap_or_else(|_| HeaderValue::from_static("null")),
    );

    if let Some(tx) = response.trailers_tx.take() {
        // Receiver gone means the transport already hung up; nothing left
        // to report the truncation to.
        let _ = tx.send(trailers);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::response_channel;
    use bytes::Bytes;

    fn raw_trailers(map: &HeaderMap) -> Vec<String> {
        assert_eq!(map.len(), 2);
        let mut raw = Vec::new();
        for name in [DATA_TRUNCATED, CHECKSUM] {
            raw.push(name.to_string());
            raw.push(map.get(name).unwrap().to_str().unwrap().to_string());
        }
        raw
    }

    #[test]
    fn declare_sets_trailer_header() {
        let (mut response, _body) = response_channel(1);
        declare(&mut response).unwrap();
        assert_eq!(
            response.headers().get(TRAILER).unwrap(),
            "data-truncated,checksum"
        );
        assert!(response.trailer_declared());
    }

    #[tokio::test]
    async fn declare_after_first_write_fails() {
        let (mut response, mut body) = response_channel(1);
        response.write(Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(
            declare(&mut response).unwrap_err(),
            TrailerError::HeadersAlreadySent
        );
        // The response is not corrupted: the body still flows.
        assert!(response.headers().get(TRAILER).is_none());
        assert_eq!(body.chunk().await.unwrap(), Bytes::from_static(b"x"));
    }

    #[test]
    fn set_without_declare_fails() {
        let (mut response, _body) = response_channel(1);
        assert_eq!(
            set_data_truncation(&mut response, true, None).unwrap_err(),
            TrailerError::TrailerNotDeclared
        );
    }

    #[tokio::test]
    async fn truncated_run_emits_true_and_null() {
        let (mut response, body) = response_channel(1);
        declare(&mut response).unwrap();
        set_data_truncation(&mut response, true, None).unwrap();
        drop(response);

        let (_, trailers) = body.collect().await;
        assert_eq!(
            raw_trailers(&trailers.unwrap()),
            vec!["data-truncated", "true", "checksum", "null"]
        );
    }

    #[tokio::test]
    async fn complete_run_emits_false_and_digest() {
        let (mut response, body) = response_channel(1);
        declare(&mut response).unwrap();
        set_data_truncation(
            &mut response,
            false,
            Some("5a1ca5a77b7eb8af83bf55483715b1ba"),
        )
        .unwrap();
        drop(response);

        let (_, trailers) = body.collect().await;
        assert_eq!(
            raw_trailers(&trailers.unwrap()),
            vec![
                "data-truncated",
                "false",
                "checksum",
                "5a1ca5a77b7eb8af83bf55483715b1ba"
            ]
        );
    }

    #[test]
    fn remove_declaration_restores_undeclared_state() {
        let (mut response, _body) = response_channel(1);
        let before = response.headers().clone();
        declare(&mut response).unwrap();
        remove_declaration(&mut response);
        assert_eq!(*response.headers(), before);
        assert!(!response.trailer_declared());
    }

    #[test]
    fn remove_declaration_without_declare_is_noop() {
        let (mut response, _body) = response_channel(1);
        remove_declaration(&mut response);
        remove_declaration(&mut response);
        assert!(response.headers().is_empty());
    }
}
