//! Document encoder: in-memory documents to their binary form.

use crate::buffer::WriteBuffer;
use crate::config::CodecConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::{BinarySubtype, Value, tag};
use bytes::Bytes;

/// Encode a single document. `check_keys` enforces the key naming rules
/// (`$` prefix and embedded `.` rejected); NUL bytes in keys are rejected
/// regardless.
pub fn encode_document(doc: &Document, check_keys: bool) -> Result<Bytes> {
    encode_document_with(doc, check_keys, &CodecConfig::default())
}

/// Encode with explicit limits.
pub fn encode_document_with(
    doc: &Document,
    check_keys: bool,
    config: &CodecConfig,
) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    Encoder::new(config).write_document(&mut buf, doc, check_keys, true)?;
    tracing::trace!(op = "encode_document", bytes = buf.position(), "encoded document");
    Ok(buf.freeze())
}

/// Single-pass encoder. Nested length prefixes are reserved up front and
/// patched once the scope is complete; the depth counter bounds recursion
/// independently of the host stack.
pub(crate) struct Encoder<'a> {
    config: &'a CodecConfig,
    depth: usize,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(config: &'a CodecConfig) -> Self {
        Self { config, depth: 0 }
    }

    /// Write one framed document: length prefix, elements, terminating NUL.
    /// At top level an `_id` entry is emitted first regardless of its
    /// position in the document.
    pub(crate) fn write_document(
        &mut self,
        buf: &mut WriteBuffer,
        doc: &Document,
        check_keys: bool,
        top_level: bool,
    ) -> Result<()> {
        self.enter()?;
        let start = buf.position();
        let length_slot = buf.reserve(4);

        if top_level {
            if let Some(id) = doc.get("_id") {
                // Hoisted pair skips the key checks, like any _id.
                self.write_pair(buf, "_id", id, false, true)?;
            }
        }
        for (key, value) in doc.iter() {
            self.write_pair(buf, key, value, check_keys, !top_level)?;
        }

        buf.write_u8(0);
        buf.patch_i32(length_slot, (buf.position() - start) as i32);
        self.depth -= 1;
        Ok(())
    }

    fn write_pair(
        &mut self,
        buf: &mut WriteBuffer,
        key: &str,
        value: &Value,
        check_keys: bool,
        allow_id: bool,
    ) -> Result<()> {
        // _id was already written at the front of a top-level document;
        // don't write it again when the main iteration reaches it.
        if !allow_id && key == "_id" {
            return Ok(());
        }

        let tag_slot = buf.reserve(1);
        if key.as_bytes().contains(&0) {
            return Err(Error::InvalidDocument(
                "key names must not contain the NULL byte".to_string(),
            ));
        }
        if check_keys {
            check_key_name(key)?;
        }
        write_cstring(buf, key);
        let element_tag = self.write_element(buf, value, check_keys)?;
        buf.patch(tag_slot, &[element_tag]);
        Ok(())
    }

    /// Write a value's payload and return its type tag, which the caller
    /// patches into the slot reserved before the key.
    fn write_element(
        &mut self,
        buf: &mut WriteBuffer,
        value: &Value,
        check_keys: bool,
    ) -> Result<u8> {
        match value {
            Value::Double(d) => {
                buf.write_f64(*d);
                Ok(tag::DOUBLE)
            }
            Value::String(s) => {
                write_string(buf, s);
                Ok(tag::STRING)
            }
            Value::Document(doc) => {
                self.write_document(buf, doc, check_keys, false)?;
                Ok(tag::DOCUMENT)
            }
            Value::Array(items) => {
                self.enter()?;
                let start = buf.position();
                let length_slot = buf.reserve(4);
                for (index, item) in items.iter().enumerate() {
                    let tag_slot = buf.reserve(1);
                    write_cstring(buf, &index.to_string());
                    let element_tag = self.write_element(buf, item, check_keys)?;
                    buf.patch(tag_slot, &[element_tag]);
                }
                buf.write_u8(0);
                buf.patch_i32(length_slot, (buf.position() - start) as i32);
                self.depth -= 1;
                Ok(tag::ARRAY)
            }
            Value::Binary(binary) => {
                let length = binary.bytes.len() as i32;
                if binary.subtype == BinarySubtype::BinaryOld {
                    // Legacy layout doubles the length: the outer one
                    // covers the inner length prefix plus the payload.
                    buf.write_i32(length + 4);
                    buf.write_u8(binary.subtype.into());
                    buf.write_i32(length);
                } else {
                    buf.write_i32(length);
                    buf.write_u8(binary.subtype.into());
                }
                buf.write(&binary.bytes);
                Ok(tag::BINARY)
            }
            Value::Uuid(uuid) => {
                // UUIDs are a special case of binary: subtype 3, 16 bytes,
                // little-endian field order.
                buf.write_i32(16);
                buf.write_u8(BinarySubtype::UuidLegacy.into());
                buf.write(&uuid.to_bytes_le());
                Ok(tag::BINARY)
            }
            Value::ObjectId(oid) => {
                buf.write(&oid.bytes());
                Ok(tag::OBJECT_ID)
            }
            Value::Boolean(b) => {
                buf.write_u8(u8::from(*b));
                Ok(tag::BOOLEAN)
            }
            Value::DateTime(dt) => {
                buf.write_i64(dt.timestamp_millis());
                Ok(tag::DATETIME)
            }
            Value::NaiveDateTime(dt) => {
                buf.write_i64(dt.and_utc().timestamp_millis());
                Ok(tag::DATETIME)
            }
            Value::Null => Ok(tag::NULL),
            Value::Regex(regex) => {
                if regex.pattern.as_bytes().contains(&0) {
                    return Err(Error::InvalidDocument(
                        "regex patterns must not contain the NULL byte".to_string(),
                    ));
                }
                write_cstring(buf, &regex.pattern);
                write_cstring(buf, &regex.flags.as_wire_string());
                Ok(tag::REGEX)
            }
            Value::JsCode(code) => {
                write_string(buf, code);
                Ok(tag::JS_CODE)
            }
            Value::Symbol(symbol) => {
                write_string(buf, symbol);
                Ok(tag::SYMBOL)
            }
            Value::CodeWithScope(code) => {
                let start = buf.position();
                let length_slot = buf.reserve(4);
                write_string(buf, &code.code);
                self.write_document(buf, &code.scope, false, false)?;
                buf.patch_i32(length_slot, (buf.position() - start) as i32);
                Ok(tag::JS_CODE_WITH_SCOPE)
            }
            Value::Int32(v) => {
                buf.write_i32(*v);
                Ok(tag::INT32)
            }
            Value::Timestamp(ts) => {
                buf.write_u32(ts.increment);
                buf.write_u32(ts.seconds);
                Ok(tag::TIMESTAMP)
            }
            Value::Int64(v) => {
                buf.write_i64(*v);
                Ok(tag::INT64)
            }
            Value::DbRef(dbref) => {
                // References serialize as their $ref/$id document form.
                self.write_document(buf, &dbref.as_doc(), false, false)?;
                Ok(tag::DOCUMENT)
            }
            Value::MinKey => Ok(tag::MIN_KEY),
            Value::MaxKey => Ok(tag::MAX_KEY),
        }
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_depth {
            return Err(Error::TooDeep(self.config.max_depth));
        }
        self.depth += 1;
        Ok(())
    }
}

fn check_key_name(key: &str) -> Result<()> {
    if key.starts_with('$') {
        return Err(Error::InvalidDocument(format!(
            "key '{}' must not start with '$'",
            key
        )));
    }
    if key.contains('.') {
        return Err(Error::InvalidDocument(format!(
            "key '{}' must not contain '.'",
            key
        )));
    }
    Ok(())
}

pub(crate) fn write_cstring(buf: &mut WriteBuffer, s: &str) {
    buf.write(s.as_bytes());
    buf.write_u8(0);
}

/// Length-prefixed string: int32 byte count including the trailing NUL.
fn write_string(buf: &mut WriteBuffer, s: &str) {
    buf.write_i32(s.len() as i32 + 1);
    buf.write(s.as_bytes());
    buf.write_u8(0);
}
