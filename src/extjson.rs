//! Relaxed Extended JSON rendering of decoded values.
//!
//! A one-way, human-oriented view: native JSON where a value maps cleanly,
//! `$`-keyed wrapper objects where it doesn't. Used by the dump tool.

use crate::document::Document;
use crate::value::{BinarySubtype, Value};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::SecondsFormat;
use serde_json::{Map, Value as Json, json};

pub fn document_to_relaxed_json(doc: &Document) -> Json {
    let mut map = Map::new();
    for (key, value) in doc.iter() {
        map.insert(key.clone(), value_to_relaxed_json(value));
    }
    Json::Object(map)
}

pub fn value_to_relaxed_json(value: &Value) -> Json {
    match value {
        Value::Double(d) if d.is_finite() => json!(d),
        // Non-finite doubles have no JSON literal
        Value::Double(d) if d.is_nan() => json!({"$numberDouble": "NaN"}),
        Value::Double(d) if *d > 0.0 => json!({"$numberDouble": "Infinity"}),
        Value::Double(_) => json!({"$numberDouble": "-Infinity"}),
        Value::String(s) => json!(s),
        Value::Document(doc) => document_to_relaxed_json(doc),
        Value::Array(items) => Json::Array(items.iter().map(value_to_relaxed_json).collect()),
        Value::Binary(binary) => json!({
            "$binary": {
                "base64": BASE64.encode(&binary.bytes),
                "subType": format!("{:02x}", u8::from(binary.subtype)),
            }
        }),
        Value::Uuid(uuid) => json!({
            "$binary": {
                "base64": BASE64.encode(uuid.to_bytes_le()),
                "subType": format!("{:02x}", u8::from(BinarySubtype::UuidLegacy)),
            }
        }),
        Value::ObjectId(oid) => json!({"$oid": oid.to_hex()}),
        Value::Boolean(b) => json!(b),
        Value::DateTime(dt) => {
            json!({"$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true)})
        }
        Value::NaiveDateTime(dt) => {
            json!({"$date": dt.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true)})
        }
        Value::Null => Json::Null,
        Value::Regex(regex) => json!({
            "$regularExpression": {
                "pattern": regex.pattern,
                "options": regex.flags.as_wire_string(),
            }
        }),
        Value::JsCode(code) => json!({"$code": code}),
        Value::Symbol(symbol) => json!({"$symbol": symbol}),
        Value::CodeWithScope(code) => json!({
            "$code": code.code,
            "$scope": document_to_relaxed_json(&code.scope),
        }),
        Value::Int32(v) => json!(v),
        Value::Timestamp(ts) => json!({
            "$timestamp": {"t": ts.seconds, "i": ts.increment}
        }),
        Value::Int64(v) => json!(v),
        Value::DbRef(dbref) => document_to_relaxed_json(&dbref.as_doc()),
        Value::MinKey => json!({"$minKey": 1}),
        Value::MaxKey => json!({"$maxKey": 1}),
    }
}
