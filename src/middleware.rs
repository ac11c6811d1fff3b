//! Capture middleware for axum routers
//!
//! [`Ironleap`] owns the formatter and the batcher for one middleware
//! instance. [`capture_middleware`] runs once per exchange: it asks the skip
//! hook whether to leave the exchange alone, taps the request body, wraps the
//! response body, and when the response finishes turns the exchange into an
//! event and queues it for delivery.

use crate::batcher::{BatchHandler, Batcher, BatcherConfig};
use crate::capture::codec::BodySource;
use crate::capture::interceptor::{
    should_tap_request, CaptureInstalled, CapturingBody, ParsedBody, RequestTap, ResponseCapture,
    TapOutcome,
};
use crate::capture::recovery::RawBodyRecovery;
use crate::config::Options;
use crate::error::{CaptureError, Result};
use crate::event::formatter::EventFormatter;
use crate::event::types::{CapturedRequest, CapturedResponse, Event, ExchangeId};
use crate::log_messages::{capture as messages, lifecycle};
use crate::transport::{ApiClient, Transport};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

/// Request extension describing the connection an exchange arrived on.
///
/// Servers terminating TLS insert it so events report an `https` URI.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionInfo {
    pub encrypted: bool,
}

struct Inner {
    options: Options,
    formatter: EventFormatter,
    batcher: Batcher<Event>,
}

/// One configured middleware instance
#[derive(Clone)]
pub struct Ironleap {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Ironleap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ironleap")
            .field("collector_url", &self.inner.options.collector_url)
            .field("batcher", &self.inner.batcher)
            .finish_non_exhaustive()
    }
}

impl Ironleap {
    /// Deliver batches over HTTP to the configured collector.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(options: Options) -> Result<Self> {
        let client = ApiClient::new(&options)?;
        Self::with_handler(options, client)
    }

    /// Deliver batches through a caller-supplied transport
    pub fn with_transport<X: Transport>(options: Options, transport: X) -> Result<Self> {
        let client = ApiClient::with_transport(&options, transport)?;
        Self::with_handler(options, client)
    }

    /// Hand flushed batches to an arbitrary handler
    pub fn with_handler<H: BatchHandler<Event>>(options: Options, handler: H) -> Result<Self> {
        info!(collector_url = %options.collector_url, "{}", lifecycle::STARTING);
        let batcher = Batcher::new(BatcherConfig::from_options(&options), handler)?;
        let formatter = EventFormatter::new(&options);

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                formatter,
                batcher,
            }),
        })
    }

    /// Wrap every route of `router` with exchange capture
    pub fn apply_to_router<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self.clone(), capture_middleware))
    }

    /// Send whatever is queued without waiting for the timer
    pub fn flush(&self) {
        self.inner.batcher.flush();
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Events captured but not yet flushed
    pub fn pending(&self) -> usize {
        self.inner.batcher.pending()
    }
}

/// Axum middleware function; see [`Ironleap::apply_to_router`]
pub async fn capture_middleware(
    State(ironleap): State<Ironleap>,
    request: Request,
    next: Next,
) -> Response {
    let options = &ironleap.inner.options;

    if request.extensions().get::<CaptureInstalled>().is_some() {
        if options.debug {
            debug!("{}", messages::ALREADY_INSTALLED);
        }
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let exchange_id = ExchangeId::generate();
    let captured = CapturedRequest {
        exchange_id,
        time: Utc::now(),
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
        encrypted: parts
            .extensions
            .get::<ConnectionInfo>()
            .is_some_and(|info| info.encrypted),
    };

    if skipped_before_capture(options, &captured) {
        if options.debug {
            debug!(%exchange_id, "{}", messages::SKIPPED_BEFORE_CAPTURE);
        }
        return next.run(Request::from_parts(parts, body)).await;
    }
    parts.extensions.insert(CaptureInstalled);

    let (body, request_body) = if let Some(parsed) = parts.extensions.get::<ParsedBody>() {
        (body, RequestBody::Parsed(parsed.0.clone()))
    } else if should_tap_request(options.log_body, &parts) {
        if options.debug {
            debug!(%exchange_id, "{}", messages::TAPPING_REQUEST_BODY);
        }
        let tap = RequestTap::new(exchange_id, options.request_limit(), options.debug);
        (Body::new(tap.wrap(body)), RequestBody::Tapped(tap))
    } else {
        (body, RequestBody::None)
    };

    let response = next.run(Request::from_parts(parts, body)).await;
    let (parts, body) = response.into_parts();

    let exchange = Exchange {
        ironleap: ironleap.clone(),
        request: captured,
        request_body,
        status: parts.status,
        response_headers: parts.headers.clone(),
    };
    let capture = ResponseCapture::new(
        exchange_id,
        options.log_body.then_some(options.response_limit()),
        options.debug,
        Box::new(move |response_body| exchange.complete(response_body)),
    );

    Response::from_parts(parts, Body::new(CapturingBody::new(body, capture)))
}

/// Ask the skip hook about the request alone, before anything is wired up.
///
/// The hook sees a pending response with no status. A panic counts as "keep".
fn skipped_before_capture(options: &Options, request: &CapturedRequest) -> bool {
    let skip = &options.hooks.skip;
    let pending = CapturedResponse::pending();
    match panic::catch_unwind(AssertUnwindSafe(|| skip(request, &pending))) {
        Ok(skipped) => skipped,
        Err(payload) => {
            let error = CaptureError::hook_panicked(payload.as_ref());
            error!(exchange_id = %request.exchange_id, %error, "{}", messages::SKIP_CHECK_FAILED);
            false
        }
    }
}

enum RequestBody {
    Parsed(serde_json::Value),
    Tapped(RequestTap),
    None,
}

/// Everything the completion handler needs once the response body is done
struct Exchange {
    ironleap: Ironleap,
    request: CapturedRequest,
    request_body: RequestBody,
    status: StatusCode,
    response_headers: HeaderMap,
}

impl Exchange {
    fn complete(mut self, response_body: Option<BodySource>) {
        let response = CapturedResponse {
            time: Utc::now(),
            status: Some(self.status),
            headers: std::mem::take(&mut self.response_headers).into(),
        };

        let request_body = match std::mem::replace(&mut self.request_body, RequestBody::None) {
            RequestBody::Parsed(value) => Some(BodySource::Structured(value)),
            RequestBody::None => None,
            RequestBody::Tapped(tap) => match tap.take_capture() {
                TapOutcome::Captured(source) => Some(source),
                TapOutcome::Empty => None,
                TapOutcome::Unread(body) => {
                    self.recover_then_finish(body, response, response_body);
                    return;
                }
            },
        };

        self.finish(&response, request_body, response_body);
    }

    fn recover_then_finish(
        self,
        unread: Body,
        response: CapturedResponse,
        response_body: Option<BodySource>,
    ) {
        let options = &self.ironleap.inner.options;
        if options.debug {
            debug!(exchange_id = %self.request.exchange_id, "{}", messages::RECOVERING_REQUEST_BODY);
        }
        let recovery = RawBodyRecovery::new(
            self.request.exchange_id,
            options.request_limit(),
            options.recovery_timeout,
            options.debug,
        );

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let request_body = recovery.recover(Some(unread)).await;
                    self.finish(&response, request_body, response_body);
                });
            }
            Err(_) => {
                error!(
                    exchange_id = %self.request.exchange_id,
                    error = %CaptureError::NoRuntime,
                    "{}",
                    messages::COMPLETION_FAILED
                );
                self.finish(&response, None, response_body);
            }
        }
    }

    fn finish(
        &self,
        response: &CapturedResponse,
        request_body: Option<BodySource>,
        response_body: Option<BodySource>,
    ) {
        let inner = &self.ironleap.inner;
        let exchange_id = self.request.exchange_id;

        let formatted = panic::catch_unwind(AssertUnwindSafe(|| {
            inner
                .formatter
                .format(&self.request, response, request_body, response_body)
        }));

        match formatted {
            Ok(Some(event)) => {
                if inner.options.debug {
                    debug!(%exchange_id, uri = %event.request.uri, "{}", messages::SAVING_EVENT);
                }
                inner.batcher.add(event);
            }
            Ok(None) => {
                if inner.options.debug {
                    debug!(%exchange_id, "{}", messages::SKIPPED);
                }
            }
            Err(payload) => {
                let error = CaptureError::hook_panicked(payload.as_ref());
                error!(%exchange_id, %error, "{}", messages::COMPLETION_FAILED);
            }
        }
    }
}
