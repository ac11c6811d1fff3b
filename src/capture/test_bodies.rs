//! Body implementations for exercising capture paths in tests

use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yields each chunk as its own data frame, then ends
#[derive(Debug, Default)]
pub struct ChunkedBody {
    chunks: VecDeque<Bytes>,
}

impl HttpBody for ChunkedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.chunks.pop_front().map(|chunk| Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub fn chunked(chunks: &[&'static str]) -> Body {
    Body::new(ChunkedBody {
        chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
    })
}

#[derive(Debug)]
pub struct ConnectionReset;

impl std::fmt::Display for ConnectionReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("connection reset by peer")
    }
}

impl std::error::Error for ConnectionReset {}

/// Yields some chunks, then fails
#[derive(Debug)]
pub struct FailingBody {
    chunks: VecDeque<Bytes>,
}

impl FailingBody {
    pub fn after(chunks: &[&'static str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
        }
    }
}

impl HttpBody for FailingBody {
    type Data = Bytes;
    type Error = ConnectionReset;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.chunks.pop_front() {
            Some(chunk) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            None => Poll::Ready(Some(Err(ConnectionReset))),
        }
    }
}

/// Yields some chunks and then never signals anything again
#[derive(Debug)]
pub struct StalledBody {
    chunks: VecDeque<Bytes>,
}

impl StalledBody {
    pub fn after(chunks: &[&'static str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
        }
    }
}

impl HttpBody for StalledBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.chunks.pop_front() {
            Some(chunk) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            None => Poll::Pending,
        }
    }
}
