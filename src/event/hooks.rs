//! Host-supplied hooks consulted while an event is being built

use crate::event::types::{CapturedRequest, CapturedResponse, Event};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Returns the company an exchange belongs to
pub type IdentifyCompanyFn =
    Arc<dyn Fn(&CapturedRequest, &CapturedResponse) -> Option<Value> + Send + Sync>;

/// Returns arbitrary metadata to attach to the event
pub type GetMetadataFn =
    Arc<dyn Fn(&CapturedRequest, &CapturedResponse) -> Option<Value> + Send + Sync>;

/// Final redaction pass over the assembled event
pub type MaskContentFn = Arc<dyn Fn(Event) -> Event + Send + Sync>;

/// Returns true to discard the exchange.
///
/// Called once before capture with a pending response (`status` is `None`),
/// where `true` bypasses capture entirely, and again on the finished exchange.
pub type SkipFn = Arc<dyn Fn(&CapturedRequest, &CapturedResponse) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct Hooks {
    pub identify_company: IdentifyCompanyFn,
    pub get_metadata: GetMetadataFn,
    pub mask_content: MaskContentFn,
    pub skip: SkipFn,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            identify_company: Arc::new(|_: &CapturedRequest, _: &CapturedResponse| None),
            get_metadata: Arc::new(|_: &CapturedRequest, _: &CapturedResponse| None),
            mask_content: Arc::new(|event: Event| event),
            skip: Arc::new(|_: &CapturedRequest, _: &CapturedResponse| false),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

/// Normalize whatever the identification hook returned into a company id.
///
/// Numbers become their decimal form and strings pass through. Null means no
/// company. Anything else is rendered as compact JSON text.
pub fn normalize_company_id(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(id) => Some(id),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::number(Some(json!(42)), Some("42"))]
    #[case::float(Some(json!(1.5)), Some("1.5"))]
    #[case::string(Some(json!("acme")), Some("acme"))]
    #[case::null(Some(Value::Null), None)]
    #[case::absent(None, None)]
    #[case::boolean(Some(json!(true)), Some("true"))]
    #[case::object(Some(json!({"id": 7})), Some(r#"{"id":7}"#))]
    fn test_company_id_normalization(#[case] input: Option<Value>, #[case] expected: Option<&str>) {
        assert_eq!(normalize_company_id(input).as_deref(), expected);
    }

    #[test]
    fn test_default_hooks_produce_nothing() {
        let hooks = Hooks::default();
        let request = CapturedRequest::for_tests();
        let response = CapturedResponse::for_tests();

        assert!((hooks.identify_company)(&request, &response).is_none());
        assert!((hooks.get_metadata)(&request, &response).is_none());
        assert!(!(hooks.skip)(&request, &response));
    }
}
