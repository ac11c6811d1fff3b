//! HTTP header constants
//!
//! Header names the middleware reads from instrumented exchanges or sets on
//! outbound batches.

use ::http::header;

/// Header carrying the configured application key on every batch
pub const X_IRONLEAP_APPLICATION_ID: &str = "x-ironleap-application-id";

/// Protocol the client used, as reported by a fronting proxy
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Host the client addressed, as reported by a fronting proxy
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Standard header re-exports for convenience
pub use header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};

/// Content types used on outbound batches
pub mod content_types {
    pub const JSON_UTF8: &str = "application/json; charset=utf-8";
}
