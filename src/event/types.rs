//! Type definitions for captured exchanges and the events built from them

use chrono::{DateTime, Utc};
use derive_more::Display;
use http::{HeaderMap, Method, StatusCode, Uri};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status reported when the host never set one
pub const STATUS_NOT_SET: u16 = 599;

/// Identifier used to correlate log lines for one exchange
#[nutype(derive(Clone, Copy, Debug, Display, Deserialize, Serialize, AsRef, From, PartialEq, Eq))]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// How a captured body is represented on the wire
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferEncoding {
    #[display("json")]
    Json,
    #[display("base64")]
    Base64,
}

/// Immutable snapshot of a header block.
///
/// Keys keep the case they were captured with. Repeated headers are joined
/// with `", "`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            map.entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        Self(map)
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Case-insensitive, like [`Headers::get`]
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// A copy without any header named in `names`, compared case-insensitively.
    pub fn masked<S: AsRef<str>>(&self, names: &[S]) -> Self {
        if names.is_empty() {
            return self.clone();
        }
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !names.iter().any(|name| key.eq_ignore_ascii_case(name.as_ref())))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Request side of an exchange as seen by the host hooks
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub exchange_id: ExchangeId,
    pub time: DateTime<Utc>,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Whether the connection itself was encrypted
    pub encrypted: bool,
}

/// Where response headers can be read from, best source first
#[derive(Clone, Debug, Default)]
pub struct ResponseHeaderSource {
    pub accessor: Option<HeaderMap>,
    pub cache: Option<Headers>,
    pub raw_block: Option<String>,
}

impl From<HeaderMap> for ResponseHeaderSource {
    fn from(headers: HeaderMap) -> Self {
        Self {
            accessor: Some(headers),
            ..Self::default()
        }
    }
}

/// Response side of an exchange as seen by the host hooks
#[derive(Clone, Debug)]
pub struct CapturedResponse {
    pub time: DateTime<Utc>,
    pub status: Option<StatusCode>,
    pub headers: ResponseHeaderSource,
}

impl CapturedResponse {
    /// A response that has not started yet: no status and no headers
    pub fn pending() -> Self {
        Self {
            time: Utc::now(),
            status: None,
            headers: ResponseHeaderSource::default(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status.map(|s| s.as_u16()).unwrap_or(STATUS_NOT_SET)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub time: DateTime<Utc>,
    pub verb: String,
    pub uri: String,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_encoding: Option<TransferEncoding>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub time: DateTime<Utc>,
    pub status: u16,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_encoding: Option<TransferEncoding>,
}

/// One captured request/response exchange
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub request: RequestRecord,
    pub response: ResponseRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[cfg(test)]
impl CapturedRequest {
    pub fn for_tests() -> Self {
        Self {
            exchange_id: ExchangeId::generate(),
            time: Utc::now(),
            method: Method::GET,
            uri: Uri::from_static("/test"),
            headers: HeaderMap::new(),
            encrypted: false,
        }
    }
}

#[cfg(test)]
impl CapturedResponse {
    pub fn for_tests() -> Self {
        Self {
            time: Utc::now(),
            status: Some(StatusCode::OK),
            headers: ResponseHeaderSource::default(),
        }
    }
}
