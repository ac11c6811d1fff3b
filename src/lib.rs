//! Iron Leap - request/response capture middleware for axum services
//!
//! Every exchange passing through the middleware is observed without being
//! altered: bodies are copied as they stream, bounded by size limits, and the
//! finished exchange is normalized into an [`Event`]. Events are batched by
//! count and time and posted to the Iron Leap collector in the background.

pub mod batcher;
pub mod capture;
pub mod config;
pub mod error;
pub mod event;
pub mod headers;
pub mod log_messages;
pub mod middleware;
pub mod transport;

pub use capture::ParsedBody;
pub use config::{Options, Settings};
pub use error::{Error, Result};
pub use event::{Event, Hooks};
pub use middleware::{ConnectionInfo, Ironleap};
