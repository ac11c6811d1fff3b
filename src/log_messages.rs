//! Log message constants
//!
//! Centralizes the text of log lines emitted by the capture pipeline so they
//! stay consistent across modules.

/// Middleware lifecycle messages
pub mod lifecycle {
    pub const STARTING: &str = "Starting Iron Leap middleware";
    pub const DELIVERY_WORKER_STARTED: &str = "Batch delivery worker started";
    pub const DELIVERY_WORKER_STOPPED: &str = "Batch delivery worker stopped";
}

/// Per-exchange capture messages
pub mod capture {
    pub const ALREADY_INSTALLED: &str = "Capture already installed for this exchange";
    pub const TAPPING_REQUEST_BODY: &str = "Tapping request body";
    pub const REQUEST_BODY_OVERFLOW: &str = "Request body exceeded capture limit";
    pub const RESPONSE_BODY_OVERFLOW: &str = "Response body exceeded capture limit";
    pub const RECOVERING_REQUEST_BODY: &str = "Nothing read the request body; draining it";
    pub const RECOVERY_READ_ERROR: &str = "Error reading request body during recovery";
    pub const RECOVERY_TIMED_OUT: &str = "Request body recovery timed out";
    pub const SKIPPED: &str = "Skip hook discarded the exchange";
    pub const SKIPPED_BEFORE_CAPTURE: &str = "Skip hook bypassed capture for the exchange";
    pub const SKIP_CHECK_FAILED: &str = "Skip hook panicked before capture; capturing anyway";
    pub const SAVING_EVENT: &str = "Saving event";
    pub const COMPLETION_FAILED: &str = "Error occurred while logging the exchange";
}

/// Batching and delivery messages
pub mod delivery {
    pub const FLUSHING: &str = "Flushing batch";
    pub const EMPTY_FLUSH: &str = "Flush requested with nothing queued";
    pub const WORKER_GONE: &str = "Delivery worker is gone; batch dropped";
    pub const SENDING_BATCH: &str = "Sending batch";
    pub const SENT_BATCH: &str = "Successfully sent batch to Iron Leap";
    pub const SEND_FAILED: &str = "Failed to send batch to Iron Leap";
}
