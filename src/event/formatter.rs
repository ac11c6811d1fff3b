//! Assembly of a normalized [`Event`] from a completed exchange

use crate::capture::codec::{BodyCodec, BodySide, BodySource, ContentHints, EncodedBody};
use crate::config::Options;
use crate::event::hooks::{normalize_company_id, Hooks};
use crate::event::types::{
    CapturedRequest, CapturedResponse, Event, Headers, RequestRecord, ResponseHeaderSource,
    ResponseRecord, TransferEncoding,
};
use crate::headers::{HOST, X_FORWARDED_HOST, X_FORWARDED_PROTO};
use http::HeaderMap;
use serde_json::Value;

pub const DEFAULT_HOST: &str = "localhost";

/// Builds events for every exchange of one middleware instance
#[derive(Clone, Debug)]
pub struct EventFormatter {
    log_body: bool,
    request_codec: BodyCodec,
    response_codec: BodyCodec,
    request_mask_headers: Vec<String>,
    response_mask_headers: Vec<String>,
    hooks: Hooks,
}

impl EventFormatter {
    pub fn new(options: &Options) -> Self {
        Self {
            log_body: options.log_body,
            request_codec: BodyCodec::new(BodySide::Request, options.request_limit()),
            response_codec: BodyCodec::new(BodySide::Response, options.response_limit()),
            request_mask_headers: options.request_mask_headers.clone(),
            response_mask_headers: options.response_mask_headers.clone(),
            hooks: options.hooks.clone(),
        }
    }

    /// Build the event for an exchange, or `None` when the skip hook rejects it.
    ///
    /// The skip hook runs after all other formatting work.
    pub fn format(
        &self,
        request: &CapturedRequest,
        response: &CapturedResponse,
        request_body: Option<BodySource>,
        response_body: Option<BodySource>,
    ) -> Option<Event> {
        let request_headers = Headers::from_header_map(&request.headers);
        let response_headers = resolve_response_headers(&response.headers);

        let (request_body, request_encoding) = if self.log_body {
            split(self.request_codec.encode(
                request_body,
                &ContentHints::from_header_map(&request.headers),
            ))
        } else {
            (None, None)
        };
        let (response_body, response_encoding) = if self.log_body {
            split(
                self.response_codec
                    .encode(response_body, &ContentHints::from_headers(&response_headers)),
            )
        } else {
            (None, None)
        };

        let company_id = normalize_company_id((self.hooks.identify_company)(request, response));
        let metadata = (self.hooks.get_metadata)(request, response);

        let event = Event {
            request: RequestRecord {
                time: request.time,
                verb: request.method.to_string(),
                uri: resolve_uri(request),
                headers: request_headers.masked(self.request_mask_headers.as_slice()),
                body: request_body,
                transfer_encoding: request_encoding,
            },
            response: ResponseRecord {
                time: response.time,
                status: response.status_code(),
                headers: response_headers.masked(self.response_mask_headers.as_slice()),
                body: response_body,
                transfer_encoding: response_encoding,
            },
            company_id,
            metadata,
        };
        let event = (self.hooks.mask_content)(event);

        if (self.hooks.skip)(request, response) {
            return None;
        }
        Some(event)
    }
}

fn split(encoded: Option<EncodedBody>) -> (Option<Value>, Option<TransferEncoding>) {
    match encoded {
        Some(encoded) => (Some(encoded.body), Some(encoded.transfer_encoding)),
        None => (None, None),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `protocol://host/path` for the request as the client addressed it
pub fn resolve_uri(request: &CapturedRequest) -> String {
    let forwarded_secure = header_str(&request.headers, X_FORWARDED_PROTO)
        .and_then(|proto| proto.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
    let secure = request.encrypted
        || request.uri.scheme_str() == Some("https")
        || forwarded_secure;
    let protocol = if secure { "https" } else { "http" };

    let host = header_str(&request.headers, HOST.as_str())
        .or_else(|| request.uri.host())
        .or_else(|| header_str(&request.headers, X_FORWARDED_HOST))
        .unwrap_or(DEFAULT_HOST);

    let path = request
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{protocol}://{host}{path}")
}

/// Resolve response headers from the best available source
pub fn resolve_response_headers(source: &ResponseHeaderSource) -> Headers {
    if let Some(map) = &source.accessor {
        return Headers::from_header_map(map);
    }
    if let Some(cache) = &source.cache {
        return cache.clone();
    }
    source
        .raw_block
        .as_deref()
        .map(decode_raw_header_block)
        .unwrap_or_default()
}

/// Parse a raw header block, dropping the leading status or request line
pub fn decode_raw_header_block(raw: &str) -> Headers {
    Headers::from_pairs(
        raw.split("\r\n")
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim()))
            .filter(|(name, _)| !name.is_empty()),
    )
}
