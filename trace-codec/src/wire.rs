//! Little-endian primitives shared by the binary formats
//!
//! Reads never zero-fill: running out of input inside a value is a
//! [`CodecError::Decode`] carrying the offset where the value started.

use crate::error::CodecError;
use crate::Result;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

/// Longest string a 1-byte length prefix can describe
pub const MAX_STRING_LEN: usize = 255;

/// Cursor over an in-memory trace file
pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Next byte without consuming it, `None` at end of input
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                CodecError::decode(
                    self.pos,
                    format!(
                        "unexpected end of stream reading {} ({} bytes needed, {} left)",
                        what,
                        len,
                        self.data.len() - self.pos
                    ),
                )
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.read_bytes(1, what)?[0])
    }

    pub fn read_u32(&mut self, what: &str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4, what)?))
    }

    /// Unsigned integer `width` bytes wide (1..=8)
    pub fn read_uint(&mut self, width: u8, what: &str) -> Result<u64> {
        Ok(LittleEndian::read_uint(self.read_bytes(width as usize, what)?, width as usize))
    }

    /// `count` consecutive integers of `width` bytes
    pub fn read_uints(&mut self, count: usize, width: u8, what: &str) -> Result<Vec<u64>> {
        (0..count).map(|_| self.read_uint(width, what)).collect()
    }

    /// String with a 1-byte length prefix
    pub fn read_string(&mut self, what: &str) -> Result<String> {
        let start = self.pos;
        let len = self.read_u8(what)? as usize;
        let bytes = self.read_bytes(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CodecError::decode(start, format!("{} is not valid UTF-8: {}", what, e)))
    }
}

/// Whether `value` is representable in `width` bytes
pub(crate) fn fits_width(value: u64, width: u8) -> bool {
    width >= 8 || value >> (u32::from(width) * 8) == 0
}

pub(crate) fn write_uint<W: Write>(writer: &mut W, value: u64, width: u8, what: &str) -> Result<()> {
    if !(1..=8).contains(&width) {
        return Err(CodecError::Encode(format!("{} width {} outside 1..=8", what, width)));
    }
    if !fits_width(value, width) {
        return Err(CodecError::Encode(format!(
            "{} {:#x} does not fit in {} bytes",
            what, value, width
        )));
    }
    writer.write_uint::<LittleEndian>(value, width as usize)?;
    Ok(())
}

pub(crate) fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_u32::<LittleEndian>(value)?;
    Ok(())
}

/// Write a string with a 1-byte length prefix, truncating past 255 bytes
pub(crate) fn write_string<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    let text = truncate_utf8(text, MAX_STRING_LEN);
    writer.write_u8(text.len() as u8)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

/// Longest prefix of `text` no longer than `max` bytes ending on a char boundary
pub fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end_is_error() {
        let mut reader = WireReader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u8("tag").unwrap(), 1);
        let err = reader.read_u32("start row").unwrap_err();
        match err {
            CodecError::Decode { offset, reason } => {
                assert_eq!(offset, 1);
                assert!(reason.contains("start row"), "reason: {}", reason);
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_uint_widths() {
        let data = [0x78, 0x56, 0x34, 0x12, 0xff];
        let mut reader = WireReader::new(&data);
        assert_eq!(reader.read_uint(4, "value").unwrap(), 0x1234_5678);
        assert_eq!(reader.read_uint(1, "value").unwrap(), 0xff);
        assert!(reader.peek_u8().is_none());
    }

    #[test]
    fn test_fits_width() {
        assert!(fits_width(0xffff_ffff, 4));
        assert!(!fits_width(0x1_0000_0000, 4));
        assert!(fits_width(u64::MAX, 8));
    }

    #[test]
    fn test_write_uint_rejects_overflow() {
        let mut out = Vec::new();
        assert!(write_uint(&mut out, 0x1_0000, 2, "value").is_err());
        write_uint(&mut out, 0xbeef, 2, "value").unwrap();
        assert_eq!(out, vec![0xef, 0xbe]);
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundary() {
        let text = format!("{}é", "a".repeat(254)); // 'é' is 2 bytes, spans 254..256
        assert_eq!(truncate_utf8(&text, 255).len(), 254);
        assert_eq!(truncate_utf8("short", 255), "short");
    }

    #[test]
    fn test_write_string_truncates() {
        let mut out = Vec::new();
        write_string(&mut out, &"x".repeat(300)).unwrap();
        assert_eq!(out[0], 255);
        assert_eq!(out.len(), 256);
    }
}
