//! Property-based tests for body classification and header masking
//!
//! These check the codec and masking invariants across generated payloads
//! rather than hand-picked examples.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use ironleap::capture::{BodyCodec, BodySide, BodySource, ContentHints};
use ironleap::event::{Headers, TransferEncoding};
use proptest::prelude::*;
use serde_json::{json, Value};

const LIMIT: usize = 4096;

pub mod generators {
    use super::*;
    use proptest::collection::{btree_map, vec};

    /// Small JSON documents: objects of scalars, or arrays of them
    pub fn json_document() -> impl Strategy<Value = Value> {
        let scalar = prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ];
        prop_oneof![
            btree_map("[a-z]{1,8}", scalar.clone(), 0..8)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
            vec(scalar, 0..8).prop_map(Value::Array),
        ]
    }

    /// Bytes whose first non-whitespace byte does not open a JSON document
    pub fn opaque_bytes() -> impl Strategy<Value = Vec<u8>> {
        vec(any::<u8>(), 1..256).prop_filter("must not look like JSON", |bytes| {
            !matches!(
                bytes.iter().find(|b| !b.is_ascii_whitespace()),
                Some(b'{') | Some(b'[') | None
            )
        })
    }

    /// Header names in mixed case
    pub fn header_name() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z-]{0,15}"
    }
}

fn hints(content_type: Option<&str>) -> ContentHints {
    ContentHints {
        content_type: content_type.map(String::from),
        content_encoding: None,
    }
}

fn flip_case(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn valid_json_under_limit_is_tagged_json(
        document in generators::json_document(),
        declared in any::<bool>(),
    ) {
        let bytes = serde_json::to_vec(&document).unwrap();
        prop_assume!(bytes.len() <= LIMIT);

        let codec = BodyCodec::new(BodySide::Response, LIMIT);
        let content_type = declared.then_some("application/json");
        let encoded = codec
            .encode(Some(BodySource::Bytes(Bytes::from(bytes))), &hints(content_type))
            .unwrap();

        prop_assert_eq!(encoded.transfer_encoding, TransferEncoding::Json);
        prop_assert_eq!(encoded.body, document);
    }

    #[test]
    fn opaque_bytes_survive_base64(bytes in generators::opaque_bytes()) {
        let codec = BodyCodec::new(BodySide::Request, LIMIT);
        let encoded = codec
            .encode(Some(BodySource::Bytes(Bytes::from(bytes.clone()))), &hints(None))
            .unwrap();

        prop_assert_eq!(encoded.transfer_encoding, TransferEncoding::Base64);
        let decoded = STANDARD.decode(encoded.body.as_str().unwrap()).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn broken_json_falls_back_to_original_bytes(tail in "[a-z :,]{0,32}") {
        let bytes = format!("{{{tail}").into_bytes();
        prop_assume!(serde_json::from_slice::<Value>(&bytes).is_err());

        let codec = BodyCodec::new(BodySide::Request, LIMIT);
        let encoded = codec
            .encode(
                Some(BodySource::Bytes(Bytes::from(bytes.clone()))),
                &hints(Some("application/json")),
            )
            .unwrap();

        prop_assert_eq!(encoded.transfer_encoding, TransferEncoding::Base64);
        let decoded = STANDARD.decode(encoded.body.as_str().unwrap()).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn oversized_payloads_become_the_notice(
        limit in 1usize..64,
        extra in 1usize..64,
        fill in any::<u8>(),
    ) {
        let codec = BodyCodec::new(BodySide::Response, limit);
        let payload = vec![fill; limit + extra];
        let encoded = codec
            .encode(Some(BodySource::Bytes(Bytes::from(payload))), &hints(Some("application/json")))
            .unwrap();

        prop_assert_eq!(encoded.transfer_encoding, TransferEncoding::Json);
        prop_assert_eq!(
            encoded.body,
            json!({
                "msg": format!("response.body.length exceeded options responseMaxBodySize of {limit}")
            })
        );
    }

    #[test]
    fn masking_ignores_case_and_is_idempotent(
        names in proptest::collection::btree_set(generators::header_name(), 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let headers = Headers::from_pairs(names.iter().map(|n| (n.as_str(), "value")));
        let target = pick.get(&names);
        let mask = [flip_case(target)];

        let masked = headers.masked(&mask);
        prop_assert!(masked.get(target).is_none());
        prop_assert_eq!(masked.masked(&mask), masked.clone());
        for name in names.iter().filter(|n| !n.eq_ignore_ascii_case(target)) {
            prop_assert_eq!(masked.get(name), Some("value"));
        }

        // Masking an absent header changes nothing
        prop_assert_eq!(headers.masked(&["x-not-present-anywhere"]), headers);
    }
}
