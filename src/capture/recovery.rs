//! Last-resort drain of a request body nobody read
//!
//! When the response finishes and the request tap saw no bytes, the body that
//! was handed back unread is drained here directly. The drain always resolves:
//! on end of stream, on a stream error, or when the timeout fires.

use crate::capture::accumulator::ByteAccumulator;
use crate::capture::codec::BodySource;
use crate::event::types::ExchangeId;
use crate::log_messages::capture as messages;
use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

/// Body recorded when the request stream fails while being drained
pub const READ_ERROR_NOTICE: &str = r#"{ "msg": "error reading request body"}"#;

enum Drain {
    Ended,
    Failed(String),
}

#[derive(Clone, Copy, Debug)]
pub struct RawBodyRecovery {
    exchange_id: ExchangeId,
    limit: usize,
    timeout: Duration,
    debug: bool,
}

impl RawBodyRecovery {
    pub fn new(exchange_id: ExchangeId, limit: usize, timeout: Duration, debug: bool) -> Self {
        Self {
            exchange_id,
            limit,
            timeout,
            debug,
        }
    }

    /// Drain `body` under the size limit. `None` resolves immediately.
    pub async fn recover<B>(&self, body: Option<B>) -> Option<BodySource>
    where
        B: HttpBody<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let mut body = body?;
        let mut accumulator = ByteAccumulator::new(self.limit);

        let drained = tokio::time::timeout(self.timeout, async {
            while let Some(frame) = body.frame().await {
                match frame {
                    Ok(frame) => {
                        if let Some(chunk) = frame.data_ref() {
                            accumulator.append(chunk);
                        }
                    }
                    Err(e) => return Drain::Failed(e.to_string()),
                }
            }
            Drain::Ended
        })
        .await;

        match drained {
            Ok(Drain::Ended) => accumulator.finish(),
            Ok(Drain::Failed(error)) => {
                if self.debug {
                    debug!(exchange_id = %self.exchange_id, %error, "{}", messages::RECOVERY_READ_ERROR);
                }
                Some(BodySource::Bytes(Bytes::from_static(READ_ERROR_NOTICE.as_bytes())))
            }
            Err(_) => {
                if self.debug {
                    debug!(
                        exchange_id = %self.exchange_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "{}",
                        messages::RECOVERY_TIMED_OUT
                    );
                }
                accumulator.finish()
            }
        }
    }
}
