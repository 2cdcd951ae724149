//! Append-only write buffer with write-back slots for length prefixes.
//!
//! BSON and the wire envelopes are full of `int32` lengths that cover bytes
//! written *after* the length field itself. `reserve` hands out the offset
//! of a placeholder; once the scope is complete the caller patches the real
//! value in. All multi-byte integers go through `to_le_bytes`, so the
//! serialized form is little-endian on every host.

use bytes::{Bytes, BytesMut};

#[derive(Debug, Default)]
pub struct WriteBuffer {
    buf: BytesMut,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.buf.extend_from_slice(&[byte]);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append `n` placeholder bytes and return the absolute offset of the
    /// first one, to be overwritten later with `patch`.
    pub fn reserve(&mut self, n: usize) -> usize {
        let offset = self.buf.len();
        self.buf.resize(offset + n, 0);
        offset
    }

    /// Overwrite previously written bytes at `offset`. The slot must lie
    /// entirely within the written region.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() <= self.buf.len());
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.patch(offset, &value.to_le_bytes());
    }

    /// Current write offset, i.e. the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the buffer into an immutable byte sequence.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_position() {
        let mut buf = WriteBuffer::new();
        assert_eq!(buf.position(), 0);
        buf.write(b"abc");
        buf.write_u8(0);
        assert_eq!(buf.position(), 4);
        assert_eq!(buf.bytes(), b"abc\x00");
    }

    #[test]
    fn test_little_endian_integers() {
        let mut buf = WriteBuffer::new();
        buf.write_i32(258);
        buf.write_i64(-1);
        assert_eq!(&buf.bytes()[..4], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(&buf.bytes()[4..], &[0xFF; 8]);
    }

    #[test]
    fn test_reserve_then_patch() {
        let mut buf = WriteBuffer::new();
        let slot = buf.reserve(4);
        assert_eq!(slot, 0);
        buf.write(b"hello");
        let len = buf.position() as i32;
        buf.patch_i32(slot, len);
        assert_eq!(&buf.bytes()[..4], &9i32.to_le_bytes());
        assert_eq!(&buf.bytes()[4..], b"hello");
    }

    #[test]
    fn test_freeze_returns_contents() {
        let mut buf = WriteBuffer::new();
        buf.write(b"xy");
        let frozen = buf.freeze();
        assert_eq!(&frozen[..], b"xy");
    }
}
