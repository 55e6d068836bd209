//! GA4GH-style redirect-manifest (ticket) types.
//!
//! The controller answers `/ga4gh/sample/{id}` with a ticket; the walker
//! client fetches each entry of `urls` in order and concatenates the bytes.
//! Entries may be ordinary `http(s)` URLs or inline `data:` URIs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub htsget: TicketBody,
}

/// Payload description inside a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBody {
    /// Upper-case format name of the referenced payload.
    pub format: String,
    /// Ordered list of URIs whose concatenation is the payload.
    pub urls: Vec<TicketUrl>,
}

/// One leg of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUrl {
    pub url: String,
    /// Extra request headers for this leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Optional payload class (`header` or `body`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl TicketUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: None,
            class: None,
        }
    }
}

impl Ticket {
    /// Ticket with a single full-payload URL.
    pub fn single(format: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            htsget: TicketBody {
                format: format.into(),
                urls: vec![TicketUrl::new(url)],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_empty_fields() {
        let ticket = Ticket::single("BAM", "https://gw/sample?accession=ABC123456");
        let json = serde_json::to_string(&ticket).unwrap();
        assert_eq!(
            json,
            r#"{"htsget":{"format":"BAM","urls":[{"url":"https://gw/sample?accession=ABC123456"}]}}"#
        );
    }

    #[test]
    fn parses_ticket_with_headers_and_class() {
        let json = r#"{
            "htsget": {
                "format": "VCF",
                "urls": [
                    {"url": "data:;base64,IyNmaWxlZm9ybWF0", "class": "header"},
                    {"url": "https://gw/sample?accession=X", "headers": {"Range": "bytes=0-9"}}
                ]
            }
        }"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.htsget.format, "VCF");
        assert_eq!(ticket.htsget.urls.len(), 2);
        assert_eq!(ticket.htsget.urls[0].class.as_deref(), Some("header"));
        let headers = ticket.htsget.urls[1].headers.as_ref().unwrap();
        assert_eq!(headers.get("Range").unwrap(), "bytes=0-9");
    }
}
