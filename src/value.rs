//! The tagged value set carried by documents.

use crate::document::Document;
use crate::error::Error;
use crate::oid::ObjectId;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use uuid::Uuid;

/// One-byte element type tags as they appear on the wire.
pub(crate) mod tag {
    pub const DOUBLE: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const DOCUMENT: u8 = 0x03;
    pub const ARRAY: u8 = 0x04;
    pub const BINARY: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const OBJECT_ID: u8 = 0x07;
    pub const BOOLEAN: u8 = 0x08;
    pub const DATETIME: u8 = 0x09;
    pub const NULL: u8 = 0x0A;
    pub const REGEX: u8 = 0x0B;
    pub const DB_POINTER: u8 = 0x0C;
    pub const JS_CODE: u8 = 0x0D;
    pub const SYMBOL: u8 = 0x0E;
    pub const JS_CODE_WITH_SCOPE: u8 = 0x0F;
    pub const INT32: u8 = 0x10;
    pub const TIMESTAMP: u8 = 0x11;
    pub const INT64: u8 = 0x12;
    pub const MIN_KEY: u8 = 0xFF;
    pub const MAX_KEY: u8 = 0x7F;
}

/// A single value in a document. Closed over every kind the binary format
/// can carry; adapters below convert host types into the right variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Vec<Value>),
    Binary(Binary),
    /// UUIDs ride on the wire as binary subtype 3 in little-endian byte
    /// order, but get their own variant so they survive a round trip.
    Uuid(Uuid),
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// A wall-clock instant with no attached zone. Encodes identically to
    /// `DateTime`; the decoder produces it when not asked for tz-aware
    /// values.
    NaiveDateTime(NaiveDateTime),
    Null,
    Regex(Regex),
    JsCode(String),
    Symbol(String),
    CodeWithScope(Code),
    Int32(i32),
    Timestamp(Timestamp),
    Int64(i64),
    /// Serialized as its `$ref`/`$id` document form; the legacy 0x0C
    /// pointer tag also decodes to this.
    DbRef(DbRef),
    MinKey,
    MaxKey,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }
}

/// Binary payload subtypes. Anything unrecognized passes through as
/// `UserDefined`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinarySubtype {
    Generic,
    Function,
    /// Legacy subtype whose payload carries a second, doubled length
    /// prefix on the wire.
    BinaryOld,
    UuidLegacy,
    Uuid,
    Md5,
    UserDefined(u8),
}

impl From<u8> for BinarySubtype {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => BinarySubtype::Generic,
            0x01 => BinarySubtype::Function,
            0x02 => BinarySubtype::BinaryOld,
            0x03 => BinarySubtype::UuidLegacy,
            0x04 => BinarySubtype::Uuid,
            0x05 => BinarySubtype::Md5,
            other => BinarySubtype::UserDefined(other),
        }
    }
}

impl From<BinarySubtype> for u8 {
    fn from(subtype: BinarySubtype) -> Self {
        match subtype {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::BinaryOld => 0x02,
            BinarySubtype::UuidLegacy => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::Md5 => 0x05,
            BinarySubtype::UserDefined(other) => other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: BinarySubtype, bytes: Vec<u8>) -> Self {
        Self { subtype, bytes }
    }

    /// Reinterpret a 16-byte subtype-3 payload as a UUID (little-endian
    /// byte order).
    pub fn to_uuid(&self) -> Option<Uuid> {
        if self.subtype != BinarySubtype::UuidLegacy || self.bytes.len() != 16 {
            return None;
        }
        let bytes: [u8; 16] = self.bytes.as_slice().try_into().ok()?;
        Some(Uuid::from_bytes_le(bytes))
    }
}

bitflags::bitflags! {
    /// Regular-expression option bits, matching the numeric flag values of
    /// the original host regex engine so the on-wire letters stay stable.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RegexFlags: u32 {
        const IGNORE_CASE = 2;
        const LOCALE = 4;
        const MULTILINE = 8;
        const DOT_ALL = 16;
        /// Decode-only bit; the encoder never emits a letter for it.
        const UNICODE = 32;
        const VERBOSE = 64;
    }
}

impl RegexFlags {
    const ENCODE_LETTERS: [(RegexFlags, char); 5] = [
        (RegexFlags::IGNORE_CASE, 'i'),
        (RegexFlags::LOCALE, 'l'),
        (RegexFlags::MULTILINE, 'm'),
        (RegexFlags::DOT_ALL, 's'),
        (RegexFlags::VERBOSE, 'x'),
    ];

    /// The flag letters as serialized, sorted in definition order. The
    /// `u` bit is accepted on decode but never written back.
    pub fn as_wire_string(&self) -> String {
        let mut out = String::new();
        for (flag, letter) in Self::ENCODE_LETTERS {
            if self.contains(flag) {
                out.push(letter);
            }
        }
        out
    }

    /// Parse a flags cstring; unknown letters are ignored.
    pub fn from_wire_str(s: &str) -> Self {
        let mut flags = RegexFlags::empty();
        for letter in s.chars() {
            match letter {
                'i' => flags |= RegexFlags::IGNORE_CASE,
                'l' => flags |= RegexFlags::LOCALE,
                'm' => flags |= RegexFlags::MULTILINE,
                's' => flags |= RegexFlags::DOT_ALL,
                'u' => flags |= RegexFlags::UNICODE,
                'x' => flags |= RegexFlags::VERBOSE,
                _ => {}
            }
        }
        flags
    }
}

/// An uncompiled regular expression: pattern text plus option bits. The
/// crate carries patterns as data and leaves compilation to the caller's
/// engine of choice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Regex {
    pub pattern: String,
    pub flags: RegexFlags,
}

impl Regex {
    pub fn new(pattern: impl Into<String>, flags: RegexFlags) -> Self {
        Self {
            pattern: pattern.into(),
            flags,
        }
    }
}

/// An internal replication timestamp. Not a wall-clock value; on the wire
/// the increment comes first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: u32,
    pub increment: u32,
}

/// JavaScript code with a captured scope document.
#[derive(Clone, Debug, PartialEq)]
pub struct Code {
    pub code: String,
    pub scope: Document,
}

impl Code {
    pub fn new(code: impl Into<String>, scope: Document) -> Self {
        Self {
            code: code.into(),
            scope,
        }
    }
}

/// A reference to a document in another collection.
#[derive(Clone, Debug, PartialEq)]
pub struct DbRef {
    pub collection: String,
    pub id: Box<Value>,
    pub database: Option<String>,
    /// Any additional keys carried alongside the reference.
    pub extra: Document,
}

impl DbRef {
    pub fn new(collection: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            collection: collection.into(),
            id: Box::new(id.into()),
            database: None,
            extra: Document::new(),
        }
    }

    /// The document form this reference serializes as: `$ref`, `$id`,
    /// optional `$db`, then the extra keys.
    pub fn as_doc(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("$ref", self.collection.clone());
        doc.insert("$id", (*self.id).clone());
        if let Some(ref database) = self.database {
            doc.insert("$db", database.clone());
        }
        for (key, value) in self.extra.iter() {
            doc.insert(key.clone(), value.clone());
        }
        doc
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Double(f64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

/// 64-bit integers narrow to `Int32` when they fit, mirroring the way the
/// wire format prefers the four-byte encoding.
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        match i32::try_from(v) {
            Ok(narrow) => Value::Int32(narrow),
            Err(_) => Value::Int64(v),
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int32(i32::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int32(i32::from(v))
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int32(i32::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int32(i32::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::from(i64::from(v))
    }
}

impl TryFrom<u64> for Value {
    type Error = Error;

    fn try_from(v: u64) -> Result<Self, Error> {
        match i64::try_from(v) {
            Ok(wide) => Ok(Value::from(wide)),
            Err(_) => Err(Error::IntTooLarge),
        }
    }
}

impl TryFrom<i128> for Value {
    type Error = Error;

    fn try_from(v: i128) -> Result<Self, Error> {
        match i64::try_from(v) {
            Ok(wide) => Ok(Value::from(wide)),
            Err(_) => Err(Error::IntTooLarge),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// Raw byte strings encode as generic binary.
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(Binary::new(BinarySubtype::Generic, v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(Binary::new(BinarySubtype::Generic, v.to_vec()))
    }
}

impl From<Binary> for Value {
    fn from(v: Binary) -> Self {
        Value::Binary(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

/// Offset datetimes are normalized to UTC before they hit the wire.
impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::NaiveDateTime(v)
    }
}

impl From<Regex> for Value {
    fn from(v: Regex) -> Self {
        Value::Regex(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Code> for Value {
    fn from(v: Code) -> Self {
        Value::CodeWithScope(v)
    }
}

impl From<DbRef> for Value {
    fn from(v: DbRef) -> Self {
        Value::DbRef(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_i64_narrows_when_it_fits() {
        assert_eq!(Value::from(5i64), Value::Int32(5));
        assert_eq!(Value::from(i64::from(i32::MAX)), Value::Int32(i32::MAX));
        assert_eq!(
            Value::from(i64::from(i32::MAX) + 1),
            Value::Int64(i64::from(i32::MAX) + 1)
        );
        assert_eq!(Value::from(i64::from(i32::MIN) - 1).as_i64(), Some(i64::from(i32::MIN) - 1));
    }

    #[test]
    fn test_unsigned_past_i64_overflows() {
        assert_eq!(Value::try_from(5u64).unwrap(), Value::Int32(5));
        assert!(matches!(
            Value::try_from(1u64 << 63),
            Err(Error::IntTooLarge)
        ));
        assert!(matches!(
            Value::try_from(1i128 << 63),
            Err(Error::IntTooLarge)
        ));
        assert_eq!(
            Value::try_from((1i128 << 63) - 1).unwrap(),
            Value::Int64(i64::MAX)
        );
    }

    #[test]
    fn test_regex_flag_letters() {
        let flags = RegexFlags::IGNORE_CASE | RegexFlags::MULTILINE;
        assert_eq!(flags.as_wire_string(), "im");
        assert_eq!(RegexFlags::from_wire_str("im").bits(), 10);
        assert_eq!(RegexFlags::from_wire_str("xsmli").as_wire_string(), "ilmsx");
        // 'u' parses but never serializes
        let unicode = RegexFlags::from_wire_str("iu");
        assert!(unicode.contains(RegexFlags::UNICODE));
        assert_eq!(unicode.as_wire_string(), "i");
        assert_eq!(RegexFlags::from_wire_str("q"), RegexFlags::empty());
    }

    #[test]
    fn test_offset_datetime_normalizes_to_utc() {
        let with_offset = DateTime::parse_from_rfc3339("2011-06-14T12:00:00+02:00").unwrap();
        let utc = DateTime::parse_from_rfc3339("2011-06-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Value::from(with_offset), Value::DateTime(utc));
    }

    #[test]
    fn test_binary_to_uuid_little_endian() {
        let uuid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let binary = Binary::new(BinarySubtype::UuidLegacy, uuid.to_bytes_le().to_vec());
        assert_eq!(binary.to_uuid(), Some(uuid));
        let generic = Binary::new(BinarySubtype::Generic, uuid.to_bytes_le().to_vec());
        assert_eq!(generic.to_uuid(), None);
    }

    #[test]
    fn test_dbref_document_form() {
        let mut dbref = DbRef::new("coll", ObjectId::from_bytes([1; 12]));
        dbref.database = Some("other".to_string());
        dbref.extra.insert("note", "x");
        let doc = dbref.as_doc();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, ["$ref", "$id", "$db", "note"]);
        assert_eq!(doc.get_str("$ref"), Some("coll"));
    }

    #[test]
    fn test_option_maps_to_null() {
        let doc = doc! {"some": Some(3), "none": Option::<i32>::None};
        assert_eq!(doc.get_i32("some"), Some(3));
        assert_eq!(doc.get("none"), Some(&Value::Null));
    }
}
