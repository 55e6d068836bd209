//! Byte channel standing in for the HTTP response.
//!
//! The engine never touches the transport directly: it writes body chunks
//! into a bounded channel and publishes the trailer block through a one-shot
//! slot. The server crate turns the receiving half into an HTTP body; tests
//! read it directly.
//!
//! ```text
//!   ResponseChannel ──▶ [mpsc<Bytes>]    ──▶ ResponseBody ──▶ transport
//!                  └──▶ [oneshot<HeaderMap>] ─┘ (trailer block)
//!                   ├── writer awaits when the channel is full (backpressure)
//!                   ├── dropping the writer ends the body
//!                   └── dropping the reader breaks the writer (hangup)
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use tokio::sync::{mpsc, oneshot};

/// Default channel capacity, in chunks.
pub const RESPONSE_CHANNEL_CAPACITY: usize = 16;

/// The receiving half of the response has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

impl fmt::Display for SinkClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("response sink closed")
    }
}

impl std::error::Error for SinkClosed {}

/// Create a response channel pair with the given chunk capacity.
pub fn response_channel(capacity: usize) -> (ResponseChannel, ResponseBody) {
    let (body_tx, body_rx) = mpsc::channel(capacity);
    let (trailers_tx, trailers_rx) = oneshot::channel();
    (
        ResponseChannel {
            headers: HeaderMap::new(),
            body_tx,
            trailers_tx: Some(trailers_tx),
            body_started: false,
            declared: false,
        },
        ResponseBody {
            body_rx,
            trailers_rx: Some(trailers_rx),
        },
    )
}

/// Writing half: owned by the request processor, borrowed by the engine.
///
/// Carries the response header map so the trailer writer can enforce its
/// declare-before-write protocol against the real response state.
pub struct ResponseChannel {
    pub(crate) headers: HeaderMap,
    pub(crate) body_tx: mpsc::Sender<Bytes>,
    pub(crate) trailers_tx: Option<oneshot::Sender<HeaderMap>>,
    pub(crate) body_started: bool,
    pub(crate) declared: bool,
}

impl ResponseChannel {
    /// Response headers (including any trailer declaration).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access for controller-set headers such as content type.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// True once a trailer declaration is in place.
    pub fn trailer_declared(&self) -> bool {
        self.declared
    }

    /// Write one body chunk, awaiting channel capacity.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.body_started = true;
        self.body_tx.send(chunk).await.map_err(|_| SinkClosed)
    }

    /// True when the receiving half is already gone.
    pub fn is_closed(&self) -> bool {
        self.body_tx.is_closed()
    }

    /// Future resolving when the receiving half goes away (client hangup).
    ///
    /// Detached from the channel's lifetime so it can be polled alongside
    /// writes.
    pub fn hangup(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.body_tx.clone();
        async move { tx.closed().await }
    }
}

/// Reading half: drained by the transport (or by tests).
pub struct ResponseBody {
    body_rx: mpsc::Receiver<Bytes>,
    trailers_rx: Option<oneshot::Receiver<HeaderMap>>,
}

impl ResponseBody {
    /// Poll for the next body chunk; `None` once every writer is gone.
    pub fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.body_rx.poll_recv(cx)
    }

    /// Poll for the trailer block. Yields at most once; `None` when the
    /// writer went away without emitting trailers.
    pub fn poll_trailers(&mut self, cx: &mut Context<'_>) -> Poll<Option<HeaderMap>> {
        let Some(rx) = self.trailers_rx.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(result) => {
                self.trailers_rx = None;
                Poll::Ready(result.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }

    /// Await the next body chunk.
    pub async fn chunk(&mut self) -> Option<Bytes> {
        self.body_rx.recv().await
    }

    /// Drain the whole body, then the trailer block.
    pub async fn collect(mut self) -> (Vec<u8>, Option<HeaderMap>) {
        let mut body = Vec::new();
        while let Some(chunk) = self.body_rx.recv().await {
            body.extend_from_slice(&chunk);
        }
        let trailers = match self.trailers_rx.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        (body, trailers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn body_round_trip() {
        let (mut channel, body) = response_channel(4);
        channel.write(Bytes::from_static(b"hello ")).await.unwrap();
        channel.write(Bytes::from_static(b"world")).await.unwrap();
        drop(channel);

        let (bytes, trailers) = body.collect().await;
        assert_eq!(bytes, b"hello world");
        assert!(trailers.is_none());
    }

    #[tokio::test]
    async fn write_fails_after_reader_drop() {
        let (mut channel, body) = response_channel(1);
        drop(body);
        let err = channel.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err, SinkClosed);
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn hangup_resolves_on_reader_drop() {
        let (channel, body) = response_channel(1);
        let hangup = channel.hangup();
        drop(body);
        hangup.await;
    }

    #[tokio::test]
    async fn backpressure_blocks_writer_until_read() {
        let (mut channel, mut body) = response_channel(1);
        channel.write(Bytes::from_static(b"a")).await.unwrap();

        // Channel is full now; the next write must wait for a read.
        let second = tokio::spawn(async move {
            channel.write(Bytes::from_static(b"b")).await.unwrap();
        });
        assert_eq!(body.chunk().await.unwrap(), Bytes::from_static(b"a"));
        second.await.unwrap();
        assert_eq!(body.chunk().await.unwrap(), Bytes::from_static(b"b"));
    }
}
