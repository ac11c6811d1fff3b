//! Delivery of event batches to the collector
//!
//! [`Transport`] is the seam between batching and the network. [`HyperTransport`]
//! posts payloads with a `hyper_util` client over rustls, so both `http://` and
//! `https://` collectors are reachable; [`ApiClient`] serializes batches,
//! attaches the fixed delivery headers and acts as the [`BatchHandler`] for
//! events.

use crate::batcher::BatchHandler;
use crate::config::Options;
use crate::event::types::Event;
use crate::headers::{content_types, CONTENT_TYPE, X_IRONLEAP_APPLICATION_ID};
use crate::log_messages::delivery as messages;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::crypto::CryptoProvider;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Collector responded with status {0}")]
    Status(u16),

    #[error("Invalid delivery request: {0}")]
    InvalidRequest(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What the collector answered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: StatusCode,
}

/// Sends one serialized payload to a URL
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn deliver(
        &self,
        url: &str,
        payload: Bytes,
        headers: &HeaderMap,
    ) -> Result<DeliveryOutcome, TransportError>;
}

/// HTTP(S) transport over the `hyper_util` connection-pooling client
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HyperTransport {
    /// Uses the process-wide rustls provider when one is installed, else aws-lc-rs.
    /// Server certificates are checked against the webpki roots.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn deliver(
        &self,
        url: &str,
        payload: Bytes,
        headers: &HeaderMap,
    ) -> Result<DeliveryOutcome, TransportError> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .body(Full::new(payload))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        request.headers_mut().extend(headers.clone());

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            let status = response.status();
            // Read the reply to the end so the connection goes back to the pool
            response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            Ok::<_, TransportError>(DeliveryOutcome { status })
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}

/// Batch handler that posts events to the collector
#[derive(Debug)]
pub struct ApiClient<X = HyperTransport> {
    transport: X,
    url: String,
    headers: HeaderMap,
    debug: bool,
}

impl ApiClient<HyperTransport> {
    pub fn new(options: &Options) -> Result<Self, TransportError> {
        Self::with_transport(options, HyperTransport::new(options.delivery_timeout)?)
    }
}

impl<X: Transport> ApiClient<X> {
    pub fn with_transport(options: &Options, transport: X) -> Result<Self, TransportError> {
        let app_id = HeaderValue::from_str(&options.app_key.to_string()).map_err(|_| {
            TransportError::InvalidRequest("app key is not a valid header value".to_string())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_types::JSON_UTF8));
        headers.insert(HeaderName::from_static(X_IRONLEAP_APPLICATION_ID), app_id);

        Ok(Self {
            transport,
            url: options.collector_url.to_string(),
            headers,
            debug: options.debug,
        })
    }

    /// Headers attached to every batch
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub async fn send_batch(&self, batch: &[Event]) -> Result<DeliveryOutcome, TransportError> {
        let payload = Bytes::from(serde_json::to_vec(batch)?);
        if self.debug {
            debug!(batch_size = batch.len(), bytes = payload.len(), "{}", messages::SENDING_BATCH);
        }

        let outcome = self.transport.deliver(&self.url, payload, &self.headers).await?;
        if !outcome.status.is_success() {
            return Err(TransportError::Status(outcome.status.as_u16()));
        }

        if self.debug {
            debug!(status = outcome.status.as_u16(), "{}", messages::SENT_BATCH);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl<X: Transport> BatchHandler<Event> for ApiClient<X> {
    async fn handle_batch(&self, batch: Vec<Event>) -> crate::Result<()> {
        self.send_batch(&batch).await?;
        Ok(())
    }
}
