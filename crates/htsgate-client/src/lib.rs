//! Walk a redirect manifest and concatenate its legs.
//!
//! The walker fetches a ticket, then streams every referenced URI in order
//! into a single output. `data:` URIs are decoded inline; `http` legs are
//! read frame-by-frame so the trailer block stays observable — a
//! `data-truncated: true` trailer marks the transfer as failed after the
//! fact, which is the whole reason the gateway sends one.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use htsgate_types::{Ticket, TicketUrl};

/// Walker failures.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("manifest request failed with status {0}")]
    ManifestStatus(u16),
    #[error("leg request failed with status {0}")]
    LegStatus(u16),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("invalid uri: {0}")]
    Uri(String),
    #[error("invalid data uri")]
    DataUri,
    #[error("stream truncated by the server")]
    Truncated,
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary of one completed walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkSummary {
    pub legs: usize,
    pub bytes: u64,
}

type HttpClient = Client<HttpConnector, Empty<Bytes>>;

/// Manifest walker over a shared HTTP client.
pub struct Walker {
    client: HttpClient,
}

impl Default for Walker {
    fn default() -> Self {
        Self::new()
    }
}

impl Walker {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Fetch `manifest_url` and stream every leg into `out`, in order.
    pub async fn walk<W>(&self, manifest_url: &str, out: &mut W) -> Result<WalkSummary, WalkError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let ticket = self.fetch_ticket(manifest_url).await?;
        debug!(
            legs = ticket.htsget.urls.len(),
            format = %ticket.htsget.format,
            "walking manifest"
        );
        let mut written = 0u64;
        let mut failure = None;
        for leg in &ticket.htsget.urls {
            match self.stream_leg(leg, out).await {
                Ok(bytes) => written += bytes,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        // Flush before reporting any leg failure: everything received so
        // far must reach the output even when a trailer marks the stream
        // truncated, or the writer would drop the tail it buffered.
        let flushed = out.flush().await;
        if let Some(err) = failure {
            return Err(err);
        }
        flushed?;
        Ok(WalkSummary {
            legs: ticket.htsget.urls.len(),
            bytes: written,
        })
    }

    async fn fetch_ticket(&self, url: &str) -> Result<Ticket, WalkError> {
        let uri: hyper::Uri = url.parse().map_err(|_| WalkError::Uri(url.to_string()))?;
        let request = Request::get(uri)
            .body(Empty::<Bytes>::new())
            .map_err(|err| WalkError::Http(err.to_string()))?;
        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| WalkError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(WalkError::ManifestStatus(response.status().as_u16()));
        }
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|err| WalkError::Http(err.to_string()))?
            .to_bytes();
        Ok(serde_json::from_slice(&body)?)
    }

    /// Stream one leg into `out`; returns the number of bytes written.
    async fn stream_leg<W>(&self, leg: &TicketUrl, out: &mut W) -> Result<u64, WalkError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if leg.url.starts_with("data:") {
            let payload = decode_data_uri(&leg.url)?;
            out.write_all(&payload).await?;
            return Ok(payload.len() as u64);
        }

        let uri: hyper::Uri = leg
            .url
            .parse()
            .map_err(|_| WalkError::Uri(leg.url.clone()))?;
        let mut request = Request::get(uri);
        if let Some(headers) = &leg.headers {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        let request = request
            .body(Empty::<Bytes>::new())
            .map_err(|err| WalkError::Http(err.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| WalkError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(WalkError::LegStatus(response.status().as_u16()));
        }

        let mut body = response.into_body();
        let mut written = 0u64;
        let mut truncated = false;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|err| WalkError::Http(err.to_string()))?;
            let frame = match frame.into_data() {
                Ok(data) => {
                    written += data.len() as u64;
                    out.write_all(&data).await?;
                    continue;
                }
                Err(frame) => frame,
            };
            if let Ok(trailers) = frame.into_trailers() {
                if trailers
                    .get("data-truncated")
                    .is_some_and(|value| value == "true")
                {
                    truncated = true;
                }
            }
        }
        // Everything received is already written; the trailer only decides
        // whether the walk counts as complete.
        if truncated {
            return Err(WalkError::Truncated);
        }
        Ok(written)
    }
}

/// Decode an inline `data:` URI payload (base64 or percent-encoded).
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, WalkError> {
    let rest = uri.strip_prefix("data:").ok_or(WalkError::DataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(WalkError::DataUri)?;
    if meta.ends_with(";base64") {
        BASE64.decode(payload).map_err(|_| WalkError::DataUri)
    } else {
        percent_decode(payload)
    }
}

fn percent_decode(payload: &str) -> Result<Vec<u8>, WalkError> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16));
                let lo = bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => return Err(WalkError::DataUri),
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    Ok(out)
}
