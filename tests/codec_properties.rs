// Property tests: round-trip identity and framing invariants over
// generated documents.

use chrono::DateTime;
use oxibson::{
    Binary, BinarySubtype, Code, Document, ObjectId, Regex, RegexFlags, Timestamp, Value,
    decode_all, decode_document, encode_document,
};
use proptest::prelude::*;
use uuid::Uuid;

fn arb_key() -> impl Strategy<Value = String> {
    // No '$' prefix, no dots, no NUL; never collides with "_id".
    "[a-z][a-z0-9_]{0,7}"
}

fn arb_regex_flags() -> impl Strategy<Value = RegexFlags> {
    // The unicode bit is decode-only, so identity holds without it.
    (0u32..128).prop_map(|bits| {
        RegexFlags::from_bits_truncate(bits) - RegexFlags::UNICODE
    })
}

fn arb_primitive() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::MinKey),
        Just(Value::MaxKey),
        any::<bool>().prop_map(Value::Boolean),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        any::<f64>()
            .prop_filter("finite doubles only", |f| f.is_finite())
            .prop_map(Value::Double),
        (-2_000_000_000_000i64..2_000_000_000_000i64).prop_map(|millis| {
            Value::DateTime(DateTime::from_timestamp_millis(millis).unwrap())
        }),
    ]
}

fn arb_rich_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[ -~]{0,12}".prop_map(Value::String),
        "[ -~]{0,12}".prop_map(Value::JsCode),
        "[ -~]{0,12}".prop_map(Value::Symbol),
        any::<[u8; 12]>().prop_map(|b| Value::ObjectId(ObjectId::from_bytes(b))),
        any::<u128>().prop_map(|v| Value::Uuid(Uuid::from_u128(v))),
        (any::<u32>(), any::<u32>()).prop_map(|(seconds, increment)| {
            Value::Timestamp(Timestamp { seconds, increment })
        }),
        prop::collection::vec(any::<u8>(), 0..24)
            .prop_map(|b| Value::Binary(Binary::new(BinarySubtype::Generic, b))),
        prop::collection::vec(any::<u8>(), 0..24)
            .prop_map(|b| Value::Binary(Binary::new(BinarySubtype::BinaryOld, b))),
        ("[a-z^$.*+ ]{0,10}", arb_regex_flags())
            .prop_map(|(pattern, flags)| Value::Regex(Regex::new(pattern, flags))),
    ]
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![arb_primitive(), arb_rich_scalar()]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            entries(inner.clone()).prop_map(|e| Value::Document(e.into_iter().collect())),
            ("[ -~]{0,8}", entries(inner))
                .prop_map(|(code, e)| Value::CodeWithScope(Code::new(code, e.into_iter().collect()))),
        ]
    })
}

fn entries(
    value: impl Strategy<Value = Value> + 'static,
) -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec((arb_key(), value), 0..4)
}

fn arb_document() -> impl Strategy<Value = Document> {
    entries(arb_value()).prop_map(|e| e.into_iter().collect())
}

proptest! {
    #[test]
    fn roundtrip_identity(doc in arb_document()) {
        let bytes = encode_document(&doc, true).unwrap();
        prop_assert_eq!(
            i32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize,
            bytes.len()
        );
        prop_assert_eq!(bytes[bytes.len() - 1], 0x00);
        let (decoded, rest) = decode_document(&bytes, true).unwrap();
        prop_assert!(rest.is_empty());
        prop_assert_eq!(decoded, doc);
    }

    #[test]
    fn concatenated_streams_split_cleanly(
        a in arb_document(),
        b in arb_document(),
    ) {
        let mut stream = encode_document(&a, true).unwrap().to_vec();
        stream.extend_from_slice(&encode_document(&b, true).unwrap());
        let docs = decode_all(&stream).unwrap();
        prop_assert_eq!(docs, vec![a, b]);
    }

    #[test]
    fn truncation_never_panics(doc in arb_document(), cut in 0usize..64) {
        let bytes = encode_document(&doc, true).unwrap();
        let cut = cut.min(bytes.len());
        // Any prefix either decodes or errors; it must not panic.
        let _ = decode_document(&bytes[..bytes.len() - cut], true);
    }
}
