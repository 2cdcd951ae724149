use std::result::Result as StdResult;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Structural problems in a document handed to the encoder: bad key
    /// names, NUL bytes where a cstring is required.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Text payload that is not valid UTF-8.
    #[error("invalid string data: {0}")]
    InvalidStringData(String),

    /// Malformed bytes on the decode path: inconsistent length prefixes,
    /// missing terminators, truncated payloads, unknown type tags.
    #[error("invalid BSON: {0}")]
    InvalidBson(String),

    #[error("MongoDB can only handle up to 8-byte ints")]
    IntTooLarge,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Document nesting exceeded the configured depth limit.
    #[error("document nesting exceeds the depth limit of {0}")]
    TooDeep(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Msg(String),
}

pub type Result<T> = StdResult<T, Error>;
