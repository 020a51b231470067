//! Binary reading and writing utilities for the herding protocol.
//!
//! All values are little-endian. Quantized quantities travel as `i32`
//! hundredths ("centi" values) so both ends decode the same `f32`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A reader for parsing binary protocol messages.
///
/// Every getter returns `None` instead of panicking when the buffer is short.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    pub fn try_get_u8(&mut self) -> Option<u8> {
        if self.buf.remaining() >= 1 {
            Some(self.buf.get_u8())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_get_u16(&mut self) -> Option<u16> {
        if self.buf.remaining() >= 2 {
            Some(self.buf.get_u16_le())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_get_u32(&mut self) -> Option<u32> {
        if self.buf.remaining() >= 4 {
            Some(self.buf.get_u32_le())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_get_i32(&mut self) -> Option<i32> {
        if self.buf.remaining() >= 4 {
            Some(self.buf.get_i32_le())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_get_u64(&mut self) -> Option<u64> {
        if self.buf.remaining() >= 8 {
            Some(self.buf.get_u64_le())
        } else {
            None
        }
    }

    #[inline]
    pub fn try_get_f32(&mut self) -> Option<f32> {
        if self.buf.remaining() >= 4 {
            Some(self.buf.get_f32_le())
        } else {
            None
        }
    }

    /// Read a value written with [`BinaryWriter::put_centi`].
    #[inline]
    pub fn try_get_centi(&mut self) -> Option<f32> {
        self.try_get_i32().map(|v| v as f32 / 100.0)
    }

    /// Read a null-terminated UTF-8 string. `None` if the terminator is
    /// missing.
    pub fn try_get_string_utf8(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == 0)?;
        let bytes = self.buf.split_to(end);
        self.buf.advance(1);
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// A writer for building binary protocol messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    #[inline]
    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    /// Write `v` rounded to hundredths. Non-finite values become 0 and
    /// out-of-range values saturate.
    #[inline]
    pub fn put_centi(&mut self, v: f32) {
        let scaled = (v * 100.0).round();
        let encoded = if scaled.is_finite() { scaled as i32 } else { 0 };
        self.buf.put_i32_le(encoded);
    }

    /// Write a null-terminated UTF-8 string. Interior NULs are dropped.
    pub fn put_string_utf8(&mut self, s: &str) {
        for b in s.bytes().filter(|&b| b != 0) {
            self.buf.put_u8(b);
        }
        self.buf.put_u8(0);
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Get current buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_buffer_yields_none() {
        let mut r = BinaryReader::new(vec![1u8, 2, 3]);
        assert_eq!(r.try_get_u32(), None);
        assert_eq!(r.try_get_u16(), Some(0x0201));
        assert_eq!(r.try_get_u8(), Some(3));
        assert_eq!(r.try_get_u8(), None);
    }

    #[test]
    fn test_string_utf8() {
        let mut w = BinaryWriter::new();
        w.put_string_utf8("meadow");
        w.put_u8(7);
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.try_get_string_utf8().as_deref(), Some("meadow"));
        assert_eq!(r.try_get_u8(), Some(7));
    }

    #[test]
    fn test_unterminated_string_is_rejected() {
        let mut r = BinaryReader::new(b"abc".to_vec());
        assert_eq!(r.try_get_string_utf8(), None);
    }

    #[test]
    fn test_centi_decodes_to_quantized_value() {
        let values = [0.0f32, 1.23456, -1.2349, 49.995, -99.5, 0.155];
        let mut w = BinaryWriter::new();
        for v in values {
            w.put_centi(v);
        }
        let mut r = BinaryReader::new(w.finish());
        for v in values {
            assert_eq!(r.try_get_centi(), Some(sim::quantize(v)));
        }
    }

    #[test]
    fn test_centi_non_finite_writes_zero() {
        let mut w = BinaryWriter::new();
        w.put_centi(f32::NAN);
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.try_get_centi(), Some(0.0));
    }
}
