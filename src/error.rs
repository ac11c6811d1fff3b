use thiserror::Error;

/// Iron Leap error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Delivery error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures inside the per-exchange capture path.
///
/// These never reach the host's request/response lifecycle; the completion
/// handler logs and drops them.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("A host hook panicked while formatting the event: {0}")]
    HookPanicked(String),

    #[error("No tokio runtime available to complete the exchange")]
    NoRuntime,
}

impl CaptureError {
    pub fn hook_panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::HookPanicked(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_panic_message_is_extracted() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let error = CaptureError::hook_panicked(payload.as_ref());
        assert_eq!(error.to_string(), "A host hook panicked while formatting the event: boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        let error = CaptureError::hook_panicked(payload.as_ref());
        assert!(error.to_string().ends_with("owned boom"));

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        let error = CaptureError::hook_panicked(payload.as_ref());
        assert!(error.to_string().ends_with("non-string panic payload"));
    }
}
