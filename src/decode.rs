//! Document decoder: binary form back into in-memory documents.

use crate::config::CodecConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::oid::ObjectId;
use crate::value::{Binary, BinarySubtype, Code, DbRef, Regex, RegexFlags, Timestamp, Value, tag};
use chrono::DateTime;
use indexmap::IndexMap;
use uuid::Uuid;

/// Builds the top-level container from decoded entries. Nested documents
/// always decode to [`Document`]; this hook only picks the outermost
/// representation.
pub trait FromEntries {
    fn from_entries(entries: Vec<(String, Value)>) -> Self;
}

impl FromEntries for Document {
    fn from_entries(entries: Vec<(String, Value)>) -> Self {
        entries.into_iter().collect()
    }
}

impl FromEntries for IndexMap<String, Value> {
    fn from_entries(entries: Vec<(String, Value)>) -> Self {
        entries.into_iter().collect()
    }
}

impl FromEntries for Vec<(String, Value)> {
    fn from_entries(entries: Vec<(String, Value)>) -> Self {
        entries
    }
}

/// Decode one document from the front of `bytes`, returning it along with
/// the unconsumed remainder. With `tz_aware` set, datetimes come back as
/// UTC instants; otherwise as naive wall-clock values.
pub fn decode_document(bytes: &[u8], tz_aware: bool) -> Result<(Document, &[u8])> {
    decode_document_with(bytes, tz_aware, &CodecConfig::default())
}

pub fn decode_document_with<'a>(
    bytes: &'a [u8],
    tz_aware: bool,
    config: &CodecConfig,
) -> Result<(Document, &'a [u8])> {
    decode_document_as(bytes, tz_aware, config)
}

/// Decode into a caller-chosen top-level container.
pub fn decode_document_as<'a, C: FromEntries>(
    bytes: &'a [u8],
    tz_aware: bool,
    config: &CodecConfig,
) -> Result<(C, &'a [u8])> {
    let size = frame_size(bytes, config)?;
    let mut decoder = Decoder {
        config,
        tz_aware,
        depth: 1,
    };
    let entries = decoder.read_elements(&bytes[4..size - 1])?;
    tracing::trace!(op = "decode_document", bytes = size, "decoded document");
    Ok((C::from_entries(entries), &bytes[size..]))
}

/// Decode a stream of concatenated documents, tz-aware.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Document>> {
    decode_all_with(bytes, true, &CodecConfig::default())
}

pub fn decode_all_with(
    bytes: &[u8],
    tz_aware: bool,
    config: &CodecConfig,
) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let (doc, remainder) = decode_document_with(rest, tz_aware, config)?;
        docs.push(doc);
        rest = remainder;
    }
    Ok(docs)
}

/// Validate the outer frame and return the declared size.
fn frame_size(bytes: &[u8], config: &CodecConfig) -> Result<usize> {
    if bytes.len() < 5 {
        return Err(Error::InvalidBson(
            "not enough data for a BSON document".to_string(),
        ));
    }
    let size = i32::from_le_bytes(bytes[..4].try_into().unwrap_or([0; 4]));
    if size < 5 {
        return Err(Error::InvalidBson(format!(
            "invalid document length {}",
            size
        )));
    }
    if let Some(ceiling) = config.max_document_size {
        if size > ceiling {
            return Err(Error::InvalidBson("objsize too large".to_string()));
        }
    }
    let size = size as usize;
    if bytes.len() < size {
        return Err(Error::InvalidBson("objsize too large".to_string()));
    }
    if bytes[size - 1] != 0x00 {
        return Err(Error::InvalidBson("bad eoo".to_string()));
    }
    Ok(size)
}

struct Decoder<'c> {
    config: &'c CodecConfig,
    tz_aware: bool,
    depth: usize,
}

impl Decoder<'_> {
    /// Parse an element region: repeated (tag, key cstring, payload)
    /// triples. The terminating NUL of the enclosing document is not part
    /// of the region.
    fn read_elements(&mut self, region: &[u8]) -> Result<Vec<(String, Value)>> {
        let mut reader = Reader::new(region);
        let mut entries = Vec::new();
        while reader.remaining() > 0 {
            let element_tag = reader.read_u8()?;
            let key = reader.read_cstring()?.to_string();
            let value = self.read_value(&mut reader, element_tag)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn read_value(&mut self, reader: &mut Reader<'_>, element_tag: u8) -> Result<Value> {
        let value = match element_tag {
            tag::DOUBLE => Value::Double(reader.read_f64()?),
            tag::STRING => Value::String(read_string(reader)?),
            tag::JS_CODE => Value::JsCode(read_string(reader)?),
            tag::SYMBOL => Value::Symbol(read_string(reader)?),
            tag::DOCUMENT => {
                let entries = self.read_document_raw(reader)?;
                rewrite_dbref(entries)
            }
            tag::ARRAY => {
                self.enter()?;
                let region = read_framed_region(reader)?;
                let mut inner = Reader::new(region);
                let mut items = Vec::new();
                while inner.remaining() > 0 {
                    let item_tag = inner.read_u8()?;
                    // Indices are positional; the key is just skipped.
                    inner.read_cstring()?;
                    items.push(self.read_value(&mut inner, item_tag)?);
                }
                self.depth -= 1;
                Value::Array(items)
            }
            tag::BINARY => {
                let length = reader.read_i32()?;
                if length < 0 {
                    return Err(Error::InvalidBson(format!(
                        "invalid binary length {}",
                        length
                    )));
                }
                let subtype = BinarySubtype::from(reader.read_u8()?);
                let payload = reader.read_bytes(length as usize)?;
                match subtype {
                    BinarySubtype::BinaryOld => {
                        if length < 4 {
                            return Err(Error::InvalidBson(
                                "invalid binary subtype 2 length".to_string(),
                            ));
                        }
                        let inner =
                            i32::from_le_bytes(payload[..4].try_into().unwrap_or([0; 4]));
                        if inner != length - 4 {
                            return Err(Error::InvalidBson(
                                "invalid binary subtype 2 length".to_string(),
                            ));
                        }
                        Value::Binary(Binary::new(subtype, payload[4..].to_vec()))
                    }
                    BinarySubtype::UuidLegacy if length == 16 => {
                        let bytes: [u8; 16] = payload.try_into().unwrap_or([0; 16]);
                        Value::Uuid(Uuid::from_bytes_le(bytes))
                    }
                    _ => Value::Binary(Binary::new(subtype, payload.to_vec())),
                }
            }
            tag::UNDEFINED | tag::NULL => Value::Null,
            tag::OBJECT_ID => {
                let raw = reader.read_bytes(12)?;
                let bytes: [u8; 12] = raw.try_into().unwrap_or([0; 12]);
                Value::ObjectId(ObjectId::from_bytes(bytes))
            }
            tag::BOOLEAN => Value::Boolean(reader.read_u8()? != 0),
            tag::DATETIME => {
                let millis = reader.read_i64()?;
                let instant = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| Error::InvalidBson("datetime out of range".to_string()))?;
                if self.tz_aware {
                    Value::DateTime(instant)
                } else {
                    Value::NaiveDateTime(instant.naive_utc())
                }
            }
            tag::REGEX => {
                let pattern = reader.read_cstring()?.to_string();
                let flags = RegexFlags::from_wire_str(reader.read_cstring()?);
                Value::Regex(Regex { pattern, flags })
            }
            tag::DB_POINTER => {
                // Legacy reference: string length (redundant), collection,
                // raw 12-byte id.
                reader.read_i32()?;
                let collection = reader.read_cstring()?.to_string();
                let raw = reader.read_bytes(12)?;
                let bytes: [u8; 12] = raw.try_into().unwrap_or([0; 12]);
                Value::DbRef(DbRef::new(collection, ObjectId::from_bytes(bytes)))
            }
            tag::JS_CODE_WITH_SCOPE => {
                let before = reader.remaining();
                let total = reader.read_i32()?;
                let code = read_string(reader)?;
                let entries = self.read_document_raw(reader)?;
                let consumed = before - reader.remaining();
                if consumed != total as usize {
                    return Err(Error::InvalidBson(
                        "code_w_scope lengths don't match".to_string(),
                    ));
                }
                Value::CodeWithScope(Code::new(code, entries.into_iter().collect()))
            }
            tag::INT32 => Value::Int32(reader.read_i32()?),
            tag::TIMESTAMP => {
                let increment = reader.read_u32()?;
                let seconds = reader.read_u32()?;
                Value::Timestamp(Timestamp { seconds, increment })
            }
            tag::INT64 => Value::Int64(reader.read_i64()?),
            tag::MIN_KEY => Value::MinKey,
            tag::MAX_KEY => Value::MaxKey,
            other => {
                return Err(Error::InvalidBson(format!(
                    "no decoder for type 0x{:02x}",
                    other
                )));
            }
        };
        Ok(value)
    }

    /// Read a nested framed document and return its entries.
    fn read_document_raw(&mut self, reader: &mut Reader<'_>) -> Result<Vec<(String, Value)>> {
        self.enter()?;
        let region = read_framed_region(reader)?;
        let entries = self.read_elements(region)?;
        self.depth -= 1;
        Ok(entries)
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_depth {
            return Err(Error::TooDeep(self.config.max_depth));
        }
        self.depth += 1;
        Ok(())
    }
}

/// Read a length-prefixed, NUL-terminated scope (document or array) and
/// return the element region between the prefix and the terminator.
fn read_framed_region<'a>(reader: &mut Reader<'a>) -> Result<&'a [u8]> {
    let size = reader.read_i32()?;
    if size < 5 {
        return Err(Error::InvalidBson(format!(
            "invalid document length {}",
            size
        )));
    }
    let chunk = reader.read_bytes(size as usize - 4)?;
    if chunk[chunk.len() - 1] != 0x00 {
        return Err(Error::InvalidBson("bad eoo".to_string()));
    }
    Ok(&chunk[..chunk.len() - 1])
}

/// Length-prefixed string: the declared count includes the trailing NUL.
fn read_string(reader: &mut Reader<'_>) -> Result<String> {
    let length = reader.read_i32()?;
    if length < 1 {
        return Err(Error::InvalidBson(format!("invalid string length {}", length)));
    }
    let raw = reader.read_bytes(length as usize)?;
    if raw[raw.len() - 1] != 0x00 {
        return Err(Error::InvalidBson("string missing NUL terminator".to_string()));
    }
    let s = std::str::from_utf8(&raw[..raw.len() - 1])
        .map_err(|_| Error::InvalidStringData("strings must be valid UTF-8".to_string()))?;
    Ok(s.to_string())
}

/// A decoded sub-document whose first key is `$ref` is really a reference:
/// pull out `$ref`/`$id`/`$db` and keep the rest as extra keys. Anything
/// not shaped like a reference stays a plain document.
fn rewrite_dbref(entries: Vec<(String, Value)>) -> Value {
    let looks_like_ref = matches!(
        entries.first(),
        Some((key, Value::String(_))) if key == "$ref"
    ) && entries.iter().any(|(key, _)| key == "$id");
    if !looks_like_ref {
        return Value::Document(entries.into_iter().collect());
    }

    let mut collection = None;
    let mut id = None;
    let mut database = None;
    let mut extra = Document::new();
    for (key, value) in entries {
        match (key.as_str(), value) {
            ("$ref", Value::String(s)) if collection.is_none() => collection = Some(s),
            ("$id", value) if id.is_none() => id = Some(value),
            ("$db", Value::String(s)) if database.is_none() => database = Some(s),
            (_, value) => {
                extra.insert(key, value);
            }
        }
    }
    match (collection, id) {
        (Some(collection), Some(id)) => Value::DbRef(DbRef {
            collection,
            id: Box::new(id),
            database,
            extra,
        }),
        // Unreachable given the shape check above, but never panic on
        // wire data.
        _ => Value::Document(extra),
    }
}

/// Bounds-checked cursor over an element region.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::InvalidBson("document element truncated".to_string()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        let raw = self.read_bytes(4)?;
        Ok(i32::from_le_bytes(raw.try_into().unwrap_or([0; 4])))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(raw.try_into().unwrap_or([0; 4])))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let raw = self.read_bytes(8)?;
        Ok(i64::from_le_bytes(raw.try_into().unwrap_or([0; 8])))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let raw = self.read_bytes(8)?;
        Ok(f64::from_le_bytes(raw.try_into().unwrap_or([0; 8])))
    }

    /// UTF-8 bytes up to (not including) the next NUL.
    fn read_cstring(&mut self) -> Result<&'a str> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::InvalidBson("document element truncated".to_string()))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| Error::InvalidStringData("strings must be valid UTF-8".to_string()))?;
        self.pos += nul + 1;
        Ok(s)
    }
}
