//! Capture of request and response bytes for one exchange
//!
//! The interceptor tees bytes into bounded accumulators as the host reads the
//! request and writes the response. Recovery drains a request body nobody
//! read. The codec turns the finished captures into wire-safe bodies.

pub mod accumulator;
pub mod codec;
pub mod interceptor;
pub mod recovery;

#[cfg(test)]
pub(crate) mod test_bodies;

pub use accumulator::{AppendOutcome, ByteAccumulator};
pub use codec::{BodyCodec, BodySide, BodySource, ContentHints, EncodedBody};
pub use interceptor::{
    CaptureInstalled, CapturingBody, ParsedBody, RequestTap, ResponseCapture, TapOutcome,
    TappedBody,
};
pub use recovery::RawBodyRecovery;
