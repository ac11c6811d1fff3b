//! Body decorators that copy bytes into accumulators while forwarding them
//!
//! - [`TappedBody`] wraps the request body. Whoever reads it downstream sees
//!   every frame unchanged; data frames are also copied into a shared
//!   [`RequestTap`].
//! - [`CapturingBody`] wraps the response body. Data frames are copied into
//!   the response accumulator and the end of the stream (or the body being
//!   dropped) fires the exchange completion exactly once.

use crate::capture::accumulator::{AppendOutcome, ByteAccumulator};
use crate::capture::codec::BodySource;
use crate::event::types::ExchangeId;
use crate::headers::CONTENT_LENGTH;
use crate::log_messages::capture as messages;
use axum::body::Body;
use bytes::Bytes;
use http::request::Parts;
use http_body::{Body as HttpBody, Frame, SizeHint};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// Request extension marking that capture is already wired for this exchange
#[derive(Clone, Copy, Debug)]
pub struct CaptureInstalled;

/// Request extension carrying a body an upstream layer already parsed
#[derive(Clone, Debug)]
pub struct ParsedBody(pub Value);

/// Whether the request body should be tapped.
///
/// Requires body capture, no already-parsed body and a positive declared
/// content length.
pub fn should_tap_request(log_body: bool, parts: &Parts) -> bool {
    if !log_body || parts.extensions.get::<ParsedBody>().is_some() {
        return false;
    }
    parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|length| length > 0)
}

#[derive(Debug)]
struct TapState {
    exchange_id: ExchangeId,
    limit: usize,
    debug: bool,
    accumulator: Option<ByteAccumulator>,
    unread: Option<Body>,
    finished: bool,
    closed: bool,
}

/// What the request tap holds once the response completes
#[derive(Debug)]
pub enum TapOutcome {
    /// Bytes (or the overflow marker) copied while downstream code read the body
    Captured(BodySource),
    /// Nobody read the body; it was handed back unread
    Unread(Body),
    /// Nothing was captured and nothing is left to read
    Empty,
}

/// Shared capture state for one request body
#[derive(Clone, Debug)]
pub struct RequestTap {
    state: Arc<Mutex<TapState>>,
}

impl RequestTap {
    pub fn new(exchange_id: ExchangeId, limit: usize, debug: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(TapState {
                exchange_id,
                limit,
                debug,
                accumulator: None,
                unread: None,
                finished: false,
                closed: false,
            })),
        }
    }

    /// Wrap `body` so reads through it are copied into this tap
    pub fn wrap(&self, body: Body) -> TappedBody {
        TappedBody {
            inner: Some(body),
            tap: self.clone(),
        }
    }

    fn observe(&self, chunk: &Bytes) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let limit = state.limit;
        let outcome = state
            .accumulator
            .get_or_insert_with(|| ByteAccumulator::new(limit))
            .append(chunk);
        if outcome == AppendOutcome::Overflowed && state.debug {
            debug!(exchange_id = %state.exchange_id, limit, "{}", messages::REQUEST_BODY_OVERFLOW);
        }
    }

    fn release(&self, unread: Option<Body>, finished: bool) {
        let mut state = self.state.lock();
        state.finished |= finished;
        if !state.finished && !state.closed {
            state.unread = unread;
        }
    }

    /// Take whatever the tap holds. Later reads are no longer copied.
    pub fn take_capture(&self) -> TapOutcome {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(source) = state.accumulator.take().and_then(ByteAccumulator::finish) {
            return TapOutcome::Captured(source);
        }
        match state.unread.take() {
            Some(body) => TapOutcome::Unread(body),
            None => TapOutcome::Empty,
        }
    }
}

/// Request body that tees data frames into a [`RequestTap`]
#[derive(Debug)]
pub struct TappedBody {
    inner: Option<Body>,
    tap: RequestTap,
}

impl HttpBody for TappedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(chunk) = frame.data_ref() {
                    this.tap.observe(chunk);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.inner = None;
                this.tap.release(None, true);
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.as_ref().is_none_or(|inner| inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner
            .as_ref()
            .map(|inner| inner.size_hint())
            .unwrap_or_else(|| SizeHint::with_exact(0))
    }
}

impl Drop for TappedBody {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            self.tap.release(Some(inner), false);
        }
    }
}

/// Runs once when the response body finishes
pub type CompletionFn = Box<dyn FnOnce(Option<BodySource>) + Send + 'static>;

/// Response-side capture: the accumulator plus the completion callback.
///
/// Dropping it fires the completion if the stream never reached its end.
pub struct ResponseCapture {
    exchange_id: ExchangeId,
    debug: bool,
    accumulator: Option<ByteAccumulator>,
    on_complete: Option<CompletionFn>,
}

impl ResponseCapture {
    /// `limit` of `None` disables body capture; completion still fires.
    pub fn new(
        exchange_id: ExchangeId,
        limit: Option<usize>,
        debug: bool,
        on_complete: CompletionFn,
    ) -> Self {
        Self {
            exchange_id,
            debug,
            accumulator: limit.map(ByteAccumulator::new),
            on_complete: Some(on_complete),
        }
    }

    fn observe(&mut self, chunk: &Bytes) {
        if self.on_complete.is_none() {
            return;
        }
        if let Some(accumulator) = self.accumulator.as_mut() {
            if accumulator.append(chunk) == AppendOutcome::Overflowed && self.debug {
                debug!(
                    exchange_id = %self.exchange_id,
                    limit = accumulator.limit(),
                    "{}",
                    messages::RESPONSE_BODY_OVERFLOW
                );
            }
        }
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            let body = self.accumulator.take().and_then(ByteAccumulator::finish);
            on_complete(body);
        }
    }
}

impl Drop for ResponseCapture {
    fn drop(&mut self) {
        self.complete();
    }
}

pin_project! {
    /// Response body that copies data frames while forwarding them unchanged
    pub struct CapturingBody<B> {
        #[pin]
        inner: B,
        capture: ResponseCapture,
    }
}

impl<B> CapturingBody<B> {
    pub fn new(inner: B, capture: ResponseCapture) -> Self {
        Self { inner, capture }
    }
}

impl<B> HttpBody for CapturingBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(chunk) = frame.data_ref() {
                    this.capture.observe(chunk);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.capture.complete();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
