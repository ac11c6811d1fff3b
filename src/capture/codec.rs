//! Classification of captured bodies into JSON or base64 wire form

use crate::event::types::{Headers, TransferEncoding};
use crate::headers::{CONTENT_ENCODING, CONTENT_TYPE};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::{HeaderMap, HeaderName};
use serde_json::{json, Value};

/// A finished capture, ready for classification
#[derive(Clone, Debug, PartialEq)]
pub enum BodySource {
    /// Raw bytes as they crossed the wire
    Bytes(Bytes),
    /// A body some other layer already parsed
    Structured(Value),
    /// The capture went past its size limit
    Overflowed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodySide {
    Request,
    Response,
}

/// Body in the form it is shipped inside an event
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedBody {
    pub body: Value,
    pub transfer_encoding: TransferEncoding,
}

impl EncodedBody {
    fn json(body: Value) -> Self {
        Self {
            body,
            transfer_encoding: TransferEncoding::Json,
        }
    }

    fn base64(bytes: &[u8]) -> Self {
        Self {
            body: Value::String(STANDARD.encode(bytes)),
            transfer_encoding: TransferEncoding::Base64,
        }
    }
}

/// Header facts the codec needs about one side of the exchange
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentHints {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

impl ContentHints {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let value = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            content_type: value(CONTENT_TYPE),
            content_encoding: value(CONTENT_ENCODING),
        }
    }

    pub fn from_headers(headers: &Headers) -> Self {
        Self {
            content_type: headers.get(CONTENT_TYPE.as_str()).map(str::to_string),
            content_encoding: headers.get(CONTENT_ENCODING.as_str()).map(str::to_string),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.content_encoding
            .as_deref()
            .map(str::trim)
            .is_some_and(|encoding| !encoding.is_empty() && !encoding.eq_ignore_ascii_case("identity"))
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.to_ascii_lowercase().contains("json"))
    }
}

/// Whether the first non-whitespace byte opens a JSON object or array
pub fn starts_with_json(bytes: &[u8]) -> bool {
    matches!(
        bytes.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'{') | Some(b'[')
    )
}

/// Body reported in place of a capture that exceeded its limit
pub fn overflow_notice(side: BodySide, limit: usize) -> Value {
    let msg = match side {
        BodySide::Request => {
            format!("request.body.length exceeded options requestMaxBodySize of {limit}")
        }
        BodySide::Response => {
            format!("response.body.length exceeded options responseMaxBodySize of {limit}")
        }
    };
    json!({ "msg": msg })
}

/// Turns finished captures into wire-safe bodies for one side of an exchange
#[derive(Clone, Copy, Debug)]
pub struct BodyCodec {
    side: BodySide,
    limit: usize,
}

impl BodyCodec {
    pub fn new(side: BodySide, limit: usize) -> Self {
        Self { side, limit }
    }

    /// Classify a capture. Absent or empty input yields no body at all.
    pub fn encode(&self, source: Option<BodySource>, hints: &ContentHints) -> Option<EncodedBody> {
        let source = match source? {
            BodySource::Structured(Value::Null) => return None,
            BodySource::Structured(Value::String(text)) => BodySource::Bytes(Bytes::from(text)),
            other => other,
        };

        match source {
            BodySource::Overflowed => Some(self.overflowed()),
            BodySource::Structured(value) => {
                let size = serde_json::to_vec(&value).map(|v| v.len()).unwrap_or(0);
                if size > self.limit {
                    Some(self.overflowed())
                } else {
                    Some(EncodedBody::json(value))
                }
            }
            BodySource::Bytes(bytes) if bytes.is_empty() => None,
            BodySource::Bytes(bytes) if bytes.len() > self.limit => Some(self.overflowed()),
            BodySource::Bytes(bytes) => Some(Self::classify_bytes(&bytes, hints)),
        }
    }

    fn classify_bytes(bytes: &[u8], hints: &ContentHints) -> EncodedBody {
        if hints.is_compressed() {
            return EncodedBody::base64(bytes);
        }
        if hints.is_json() || starts_with_json(bytes) {
            if let Ok(parsed) = serde_json::from_slice::<Value>(bytes) {
                return EncodedBody::json(parsed);
            }
        }
        EncodedBody::base64(bytes)
    }

    fn overflowed(&self) -> EncodedBody {
        EncodedBody::json(overflow_notice(self.side, self.limit))
    }
}
