//! HTTP body carrying the engine's byte stream and trailer block.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};

use htsgate_engine::ResponseBody;

/// Streaming body over a [`ResponseBody`]: data frames while the channel is
/// open, then exactly one trailers frame when the engine emitted a trailer
/// block. A transport that strips chunked encoding simply drops the final
/// frame.
pub struct TrailerBody {
    inner: ResponseBody,
    data_done: bool,
}

impl TrailerBody {
    pub fn new(inner: ResponseBody) -> Self {
        Self {
            inner,
            data_done: false,
        }
    }
}

impl Body for TrailerBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.as_mut().get_mut();
        if !this.data_done {
            match this.inner.poll_chunk(cx) {
                Poll::Ready(Some(chunk)) => return Poll::Ready(Some(Ok(Frame::data(chunk)))),
                Poll::Ready(None) => this.data_done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
        match this.inner.poll_trailers(cx) {
            Poll::Ready(Some(trailers)) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        false
    }
}
