//! Normalized events built from captured exchanges

pub mod formatter;
pub mod hooks;
pub mod types;

pub use formatter::EventFormatter;
pub use hooks::Hooks;
pub use types::{
    CapturedRequest, CapturedResponse, Event, ExchangeId, Headers, RequestRecord,
    ResponseHeaderSource, ResponseRecord, TransferEncoding,
};
