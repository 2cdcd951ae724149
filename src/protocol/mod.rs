//! Legacy request envelopes.
//! - Message header parsing
//! - OP_INSERT / OP_UPDATE / OP_QUERY / OP_GET_MORE builders
//!
//! Each builder produces a complete length-prefixed packet around encoded
//! documents. In safe mode a second packet carrying a `getlasterror`
//! command is appended to the same buffer so the transport sends both
//! back-to-back and the client can await the acknowledgement.

use crate::buffer::WriteBuffer;
use crate::config::CodecConfig;
use crate::document::Document;
use crate::encode::{Encoder, write_cstring};
use crate::error::{Error, Result};
use bytes::Bytes;
use rand::Rng;

// Request op codes
pub const OP_UPDATE: i32 = 2001;
pub const OP_INSERT: i32 = 2002;
pub const OP_QUERY: i32 = 2004;
pub const OP_GET_MORE: i32 = 2005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MessageHeader {
    pub const SIZE: usize = 16;

    pub fn parse(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < Self::SIZE {
            return None;
        }
        // Little-endian 32-bit fields
        let message_length = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let request_id = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let response_to = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let op_code = i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);

        Some((
            Self {
                message_length,
                request_id,
                response_to,
                op_code,
            },
            Self::SIZE,
        ))
    }
}

/// A framed request ready for the transport. In safe mode `bytes` holds
/// two concatenated packets sharing one `request_id`.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: i32,
    pub bytes: Bytes,
    /// Size of the largest single encoded document in the body, for the
    /// caller to compare against the server's per-document limit.
    pub max_doc_size: usize,
}

/// Build an OP_INSERT packet carrying every document in `docs`.
pub fn insert_message(
    collection_name: &str,
    docs: &[Document],
    check_keys: bool,
    safe: bool,
    last_error_opts: &Document,
) -> Result<Request> {
    if docs.is_empty() {
        return Err(Error::InvalidOperation(
            "cannot do an empty bulk insert".to_string(),
        ));
    }

    let config = CodecConfig::default();
    let request_id = next_request_id();
    let mut buf = WriteBuffer::new();
    let length_slot = buf.reserve(4);
    buf.write_i32(request_id);
    buf.write_i32(0); // responseTo
    buf.write_i32(OP_INSERT);
    buf.write_i32(0); // reserved flags
    write_collection_name(&mut buf, collection_name)?;

    let mut encoder = Encoder::new(&config);
    let mut max_doc_size = 0;
    for doc in docs {
        let before = buf.position();
        encoder.write_document(&mut buf, doc, check_keys, true)?;
        max_doc_size = max_doc_size.max(buf.position() - before);
    }

    buf.patch_i32(length_slot, buf.position() as i32);
    if safe {
        add_last_error(&mut buf, request_id, last_error_opts, &config)?;
    }
    tracing::debug!(
        op = "insert_message",
        request_id,
        collection = %collection_name,
        docs = docs.len(),
        "built insert request"
    );
    Ok(Request {
        request_id,
        bytes: buf.freeze(),
        max_doc_size,
    })
}

/// Build an OP_UPDATE packet: a selector `spec` plus the update `doc`.
pub fn update_message(
    collection_name: &str,
    upsert: bool,
    multi: bool,
    spec: &Document,
    doc: &Document,
    safe: bool,
    last_error_opts: &Document,
) -> Result<Request> {
    let mut options = 0i32;
    if upsert {
        options |= 1;
    }
    if multi {
        options |= 2;
    }

    let config = CodecConfig::default();
    let request_id = next_request_id();
    let mut buf = WriteBuffer::new();
    let length_slot = buf.reserve(4);
    buf.write_i32(request_id);
    buf.write_i32(0); // responseTo
    buf.write_i32(OP_UPDATE);
    buf.write_i32(0); // reserved flags
    write_collection_name(&mut buf, collection_name)?;
    buf.write_i32(options);

    let mut encoder = Encoder::new(&config);
    let before = buf.position();
    encoder.write_document(&mut buf, spec, false, true)?;
    let mut max_doc_size = buf.position() - before;
    let before = buf.position();
    encoder.write_document(&mut buf, doc, false, true)?;
    max_doc_size = max_doc_size.max(buf.position() - before);

    buf.patch_i32(length_slot, buf.position() as i32);
    if safe {
        add_last_error(&mut buf, request_id, last_error_opts, &config)?;
    }
    tracing::debug!(
        op = "update_message",
        request_id,
        collection = %collection_name,
        upsert,
        multi,
        "built update request"
    );
    Ok(Request {
        request_id,
        bytes: buf.freeze(),
        max_doc_size,
    })
}

/// Build an OP_QUERY packet. Unlike the other envelopes, the flag word
/// precedes the collection name.
pub fn query_message(
    options: i32,
    collection_name: &str,
    num_to_skip: i32,
    num_to_return: i32,
    query: &Document,
    field_selector: Option<&Document>,
) -> Result<Request> {
    let config = CodecConfig::default();
    let request_id = next_request_id();
    let mut buf = WriteBuffer::new();
    let length_slot = buf.reserve(4);
    buf.write_i32(request_id);
    buf.write_i32(0); // responseTo
    buf.write_i32(OP_QUERY);
    buf.write_i32(options);
    write_collection_name(&mut buf, collection_name)?;
    buf.write_i32(num_to_skip);
    buf.write_i32(num_to_return);

    let mut encoder = Encoder::new(&config);
    let before = buf.position();
    encoder.write_document(&mut buf, query, false, true)?;
    let mut max_doc_size = buf.position() - before;
    if let Some(selector) = field_selector {
        let before = buf.position();
        encoder.write_document(&mut buf, selector, false, true)?;
        max_doc_size = max_doc_size.max(buf.position() - before);
    }

    buf.patch_i32(length_slot, buf.position() as i32);
    tracing::debug!(
        op = "query_message",
        request_id,
        collection = %collection_name,
        num_to_skip,
        num_to_return,
        "built query request"
    );
    Ok(Request {
        request_id,
        bytes: buf.freeze(),
        max_doc_size,
    })
}

/// Build an OP_GET_MORE packet for an open cursor. Carries no documents,
/// so the result is just the id and the bytes.
pub fn get_more_message(
    collection_name: &str,
    num_to_return: i32,
    cursor_id: i64,
) -> Result<(i32, Bytes)> {
    let request_id = next_request_id();
    let mut buf = WriteBuffer::new();
    let length_slot = buf.reserve(4);
    buf.write_i32(request_id);
    buf.write_i32(0); // responseTo
    buf.write_i32(OP_GET_MORE);
    buf.write_i32(0); // reserved flags
    write_collection_name(&mut buf, collection_name)?;
    buf.write_i32(num_to_return);
    buf.write_i64(cursor_id);

    buf.patch_i32(length_slot, buf.position() as i32);
    tracing::debug!(
        op = "get_more_message",
        request_id,
        collection = %collection_name,
        cursor_id,
        "built get_more request"
    );
    Ok((request_id, buf.freeze()))
}

/// Append a `getlasterror` query packet against `admin.$cmd` so the
/// server acknowledges the write that precedes it. Shares the caller's
/// request id.
fn add_last_error(
    buf: &mut WriteBuffer,
    request_id: i32,
    last_error_opts: &Document,
    config: &CodecConfig,
) -> Result<()> {
    let message_slot = buf.reserve(4);
    buf.write_i32(request_id);
    buf.write_i32(0); // responseTo
    buf.write_i32(OP_QUERY);
    buf.write_i32(0); // options
    write_cstring(buf, "admin.$cmd");
    buf.write_i32(0); // numberToSkip
    buf.write_i32(-1); // numberToReturn

    let mut command = Document::new();
    command.insert("getlasterror", 1);
    for (key, value) in last_error_opts.iter() {
        command.insert(key.clone(), value.clone());
    }
    Encoder::new(config).write_document(buf, &command, false, false)?;

    let message_length = (buf.position() - message_slot) as i32;
    buf.patch_i32(message_slot, message_length);
    Ok(())
}

fn write_collection_name(buf: &mut WriteBuffer, name: &str) -> Result<()> {
    if name.as_bytes().contains(&0) {
        return Err(Error::InvalidOperation(
            "collection names must not contain the NULL byte".to_string(),
        ));
    }
    write_cstring(buf, name);
    Ok(())
}

/// Random request ids match the original wire behavior; callers that need
/// uniqueness deduplicate on their side.
fn next_request_id() -> i32 {
    rand::thread_rng().gen_range(i32::MIN..=i32::MAX)
}
