//! Trace file formats
//!
//! The two binary formats share a file shell: a 4-byte magic, a length-prefixed
//! JSON metadata blob and a stream of tagged records. This module holds the
//! pieces of that shell both formats use; each submodule implements one format.

use crate::error::CodecError;
use crate::wire::{self, WireReader};
use crate::Result;
use byteorder::WriteBytesExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use trace_data::{Bookmark, TraceStore};

pub mod json;
pub mod legacy;
pub mod native;

/// Record tag of a trace row
pub(crate) const TAG_ROW: u8 = 0x00;
/// Record tag of a bookmark
pub(crate) const TAG_BOOKMARK: u8 = 0x01;

/// Flags byte: a 4-byte thread id follows
pub(crate) const THREAD_ID_FLAG: u8 = 0x80;
/// Flags byte: opcode length bits
pub(crate) const OPCODE_LEN_MASK: u8 = 0x0f;

/// Check the magic and parse the metadata blob
///
/// Any problem before the first record is a format error.
pub(crate) fn read_header<T: DeserializeOwned>(
    reader: &mut WireReader<'_>,
    magic: &[u8; 4],
) -> Result<T> {
    let found = reader
        .read_bytes(4, "magic")
        .map_err(|_| CodecError::Format("file too short for magic".to_string()))?;
    if found != magic {
        return Err(CodecError::Format(format!(
            "wrong magic {:02x?}, expected {:?}",
            found,
            String::from_utf8_lossy(magic)
        )));
    }

    let header_len = reader
        .read_u32("metadata length")
        .map_err(|e| CodecError::Format(e.to_string()))?;
    let blob = reader
        .read_bytes(header_len as usize, "metadata")
        .map_err(|e| CodecError::Format(e.to_string()))?;
    serde_json::from_slice(blob).map_err(|e| CodecError::Format(format!("bad metadata: {}", e)))
}

pub(crate) fn write_header<W: Write, T: Serialize>(
    writer: &mut W,
    magic: &[u8; 4],
    header: &T,
) -> Result<()> {
    let blob = serde_json::to_vec(header)?;
    let len = u32::try_from(blob.len())
        .map_err(|_| CodecError::Encode("metadata larger than 4 GiB".to_string()))?;
    writer.write_all(magic)?;
    wire::write_u32(writer, len)?;
    writer.write_all(&blob)?;
    Ok(())
}

/// Apply one row's register changes to the persistent register array
///
/// The i-th change lands on `sum(skips[..=i]) + i`. Changes beyond the array are
/// counted and dropped: tracers may record more registers than the table names.
pub(crate) fn apply_register_changes(regs: &mut [u64], skips: &[u8], values: &[u64]) -> usize {
    let mut cursor = 0usize;
    let mut dropped = 0;
    for (occurrence, (&skip, &value)) in skips.iter().zip(values).enumerate() {
        cursor += skip as usize;
        match regs.get_mut(cursor + occurrence) {
            Some(slot) => *slot = value,
            None => dropped += 1,
        }
    }
    dropped
}

/// Register changes of a row relative to the previous row
///
/// With no previous row every register counts as changed. Each skip is the
/// number of unchanged registers since the previous emitted change.
pub(crate) fn register_changes(previous: Option<&[u64]>, current: &[u64]) -> Result<(Vec<u8>, Vec<u64>)> {
    let mut skips = Vec::new();
    let mut values = Vec::new();
    let mut gap = 0usize;
    for (index, &value) in current.iter().enumerate() {
        let changed = previous.map_or(true, |prev| prev.get(index) != Some(&value));
        if changed {
            let skip = u8::try_from(gap).map_err(|_| {
                CodecError::Encode(format!(
                    "{} unchanged registers before register {} exceed the 255 skip limit",
                    gap, index
                ))
            })?;
            skips.push(skip);
            values.push(value);
            gap = 0;
        } else {
            gap += 1;
        }
    }
    Ok((skips, values))
}

pub(crate) fn read_bookmark(reader: &mut WireReader<'_>) -> Result<Bookmark> {
    let startrow = reader.read_u32("bookmark start row")? as usize;
    let endrow = reader.read_u32("bookmark end row")? as usize;
    let disasm = reader.read_string("bookmark disassembly")?;
    let comment = reader.read_string("bookmark comment")?;
    let addr = reader.read_string("bookmark address")?;
    Ok(Bookmark {
        addr,
        disasm,
        startrow,
        endrow,
        comment,
    })
}

pub(crate) fn write_bookmark<W: Write>(writer: &mut W, bookmark: &Bookmark) -> Result<()> {
    let row = |value: usize| {
        u32::try_from(value)
            .map_err(|_| CodecError::Encode(format!("bookmark row {} does not fit in 32 bits", value)))
    };
    writer.write_u8(TAG_BOOKMARK)?;
    wire::write_u32(writer, row(bookmark.startrow)?)?;
    wire::write_u32(writer, row(bookmark.endrow)?)?;
    wire::write_string(writer, &bookmark.disasm)?;
    wire::write_string(writer, &bookmark.comment)?;
    wire::write_string(writer, &bookmark.addr)?;
    Ok(())
}

/// Add a bookmark read from a file, skipping ones the index refuses
pub(crate) fn insert_loaded_bookmark(store: &mut TraceStore, bookmark: Bookmark) {
    let startrow = bookmark.startrow;
    if let Err(e) = store.bookmarks.add(bookmark, false) {
        tracing::warn!("Skipping bookmark at row {}: {}", startrow, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_changes_first_row_emits_everything() {
        let (skips, values) = register_changes(None, &[5, 6, 7]).unwrap();
        assert_eq!(skips, vec![0, 0, 0]);
        assert_eq!(values, vec![5, 6, 7]);
    }

    #[test]
    fn test_register_changes_counts_unchanged_gaps() {
        let prev = [0, 0, 0, 0, 0, 0];
        let (skips, values) = register_changes(Some(&prev), &[0, 0, 1, 0, 0, 2]).unwrap();
        assert_eq!(skips, vec![2, 2]);
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_apply_register_changes_adds_occurrence() {
        let mut regs = vec![0u64; 6];
        let dropped = apply_register_changes(&mut regs, &[2, 2], &[1, 2]);
        assert_eq!(dropped, 0);
        assert_eq!(regs, vec![0, 0, 1, 0, 0, 2]);
    }

    #[test]
    fn test_apply_register_changes_drops_out_of_table() {
        let mut regs = vec![0u64; 2];
        let dropped = apply_register_changes(&mut regs, &[0, 5], &[9, 9]);
        assert_eq!(dropped, 1);
        assert_eq!(regs, vec![9, 0]);
    }

    #[test]
    fn test_register_changes_gap_limit() {
        let prev = vec![0u64; 300];
        let mut current = prev.clone();
        current[299] = 1;
        assert!(matches!(
            register_changes(Some(&prev), &current),
            Err(CodecError::Encode(_))
        ));
    }

    #[test]
    fn test_header_wrong_magic() {
        let mut reader = WireReader::new(b"ABCD\x02\x00\x00\x00{}");
        let result: Result<serde_json::Value> = read_header(&mut reader, b"TVTR");
        assert!(matches!(result, Err(CodecError::Format(_))));
    }

    #[test]
    fn test_bookmark_record_truncates_strings() {
        let bookmark = Bookmark {
            comment: "c".repeat(256),
            ..Bookmark::new(3, 4)
        };
        let mut out = Vec::new();
        write_bookmark(&mut out, &bookmark).unwrap();
        assert_eq!(out[0], TAG_BOOKMARK);

        let mut reader = WireReader::new(&out[1..]);
        let back = read_bookmark(&mut reader).unwrap();
        assert_eq!(back.startrow, 3);
        assert_eq!(back.endrow, 4);
        assert_eq!(back.comment.len(), 255);
    }
}
