//! BSON document codec and legacy MongoDB request framing.
//!
//! The codec converts ordered [`Document`]s with a rich tagged value set
//! to and from their self-describing binary form; the [`protocol`] module
//! wraps encoded documents in the legacy OP_INSERT / OP_UPDATE / OP_QUERY
//! / OP_GET_MORE envelopes. Everything is synchronous and allocation-only:
//! no I/O happens here.
//!
//! ```
//! use oxibson::{doc, decode_document, encode_document};
//!
//! let bytes = encode_document(&doc! {"hello": "world"}, false).unwrap();
//! let (decoded, rest) = decode_document(&bytes, true).unwrap();
//! assert!(rest.is_empty());
//! assert_eq!(decoded.get_str("hello"), Some("world"));
//! ```

pub mod buffer;
pub mod config;
pub mod decode;
pub mod document;
pub mod encode;
pub mod error;
pub mod extjson;
pub mod oid;
pub mod protocol;
pub mod value;

pub use config::CodecConfig;
pub use decode::{
    FromEntries, decode_all, decode_all_with, decode_document, decode_document_as,
    decode_document_with,
};
pub use document::Document;
pub use encode::{encode_document, encode_document_with};
pub use error::{Error, Result};
pub use oid::ObjectId;
pub use value::{
    Binary, BinarySubtype, Code, DbRef, Regex, RegexFlags, Timestamp, Value,
};
