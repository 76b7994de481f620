//! Native "TVTR" trace format (read/write)
//!
//! Layout after the shared shell:
//!
//! ```text
//! row      := 0x00 str(disasm) str(comment) u8 C u8 M u8 flags [u32 thread]
//!             opcodes[flags & 0x0f] u8 skip[C] uint value[C]
//!             u8 access[M] uint addr[M] uint value[M]
//! bookmark := 0x01 u32 start u32 end str(disasm) str(comment) str(addr)
//! ```
//!
//! `uint` is `pointer_size` bytes, `str` a 1-byte length followed by UTF-8.
//! Bit 0 of an access byte marks a write.

use super::{
    apply_register_changes, insert_loaded_bookmark, read_bookmark, read_header,
    register_changes, write_bookmark, write_header, OPCODE_LEN_MASK, TAG_BOOKMARK, TAG_ROW,
    THREAD_ID_FLAG,
};
use crate::error::CodecError;
use crate::wire::{self, WireReader};
use crate::Result;
use byteorder::WriteBytesExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use trace_data::{
    Arch, MemAccessKind, MemoryAccess, RegisterMap, RegisterTables, TraceRow, TraceStore,
};

/// File magic
pub const MAGIC: &[u8; 4] = b"TVTR";

/// Metadata version written by [`write`]
pub const VERSION: &str = "1.0";

/// Metadata blob
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    arch: Arch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pointer_size: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl Header {
    /// Register map and pointer size, from explicit fields or arch defaults
    fn resolve(&self, tables: &RegisterTables) -> Result<(RegisterMap, u8)> {
        let names = match (&self.regs, tables.for_arch(&self.arch)) {
            (Some(regs), _) => regs.clone(),
            (None, Some(table)) => table.to_vec(),
            (None, None) => {
                return Err(CodecError::Format(format!(
                    "unknown architecture '{}' and no register list",
                    self.arch
                )))
            }
        };
        let pointer_size = self
            .pointer_size
            .or_else(|| self.arch.pointer_size())
            .ok_or_else(|| {
                CodecError::Format(format!(
                    "unknown architecture '{}' and no pointer size",
                    self.arch
                ))
            })?;
        if !(1..=8).contains(&pointer_size) {
            return Err(CodecError::Format(format!(
                "pointer size {} outside 1..=8",
                pointer_size
            )));
        }
        let registers = RegisterMap::new(names).map_err(|e| CodecError::Format(e.to_string()))?;
        Ok((registers, pointer_size))
    }
}

/// Decode a native trace file
pub fn decode(data: &[u8], tables: &RegisterTables) -> Result<TraceStore> {
    let mut reader = WireReader::new(data);
    let header: Header = read_header(&mut reader, MAGIC)?;
    tracing::debug!(
        "TVTR header: arch={}, pointer_size={:?}, {} named registers, version={:?}",
        header.arch,
        header.pointer_size,
        header.regs.as_ref().map_or(0, Vec::len),
        header.version
    );

    let (registers, pointer_size) = header.resolve(tables)?;
    let mut store = TraceStore::new(header.arch, pointer_size, registers);
    let mut regs = vec![0u64; store.registers.len()];
    let mut dropped = 0usize;

    loop {
        match reader.peek_u8() {
            Some(TAG_ROW) => {
                reader.read_u8("record tag")?;
                let row = read_row(&mut reader, pointer_size, &mut regs, &mut dropped)?;
                store.trace.push(row);
            }
            Some(TAG_BOOKMARK) => {
                reader.read_u8("record tag")?;
                let bookmark = read_bookmark(&mut reader)?;
                insert_loaded_bookmark(&mut store, bookmark);
            }
            Some(tag) => {
                tracing::debug!(
                    "Record stream ends at unrecognized tag {:#04x} (offset {})",
                    tag,
                    reader.position()
                );
                break;
            }
            None => break,
        }
    }

    if dropped > 0 {
        tracing::debug!("Ignored {} register changes outside the register map", dropped);
    }
    tracing::info!(
        "Decoded TVTR trace: {} rows, {} bookmarks",
        store.row_count(),
        store.bookmarks.len()
    );
    Ok(store)
}

fn read_row(
    reader: &mut WireReader<'_>,
    pointer_size: u8,
    regs: &mut [u64],
    dropped: &mut usize,
) -> Result<TraceRow> {
    let disasm = reader.read_string("disassembly")?;
    let comment = reader.read_string("comment")?;
    let change_count = reader.read_u8("register change count")? as usize;
    let access_count = reader.read_u8("memory access count")? as usize;
    let flags = reader.read_u8("flags")?;
    let thread = if flags & THREAD_ID_FLAG != 0 {
        Some(reader.read_u32("thread id")?)
    } else {
        None
    };
    let opcodes = reader
        .read_bytes((flags & OPCODE_LEN_MASK) as usize, "opcodes")?
        .to_vec();

    let skips = reader.read_bytes(change_count, "register skips")?;
    let values = reader.read_uints(change_count, pointer_size, "register values")?;
    let access_flags = reader.read_bytes(access_count, "memory access flags")?;
    let addrs = reader.read_uints(access_count, pointer_size, "memory addresses")?;
    let mem_values = reader.read_uints(access_count, pointer_size, "memory values")?;

    *dropped += apply_register_changes(regs, skips, &values);

    let mem = access_flags
        .iter()
        .zip(addrs.iter().zip(&mem_values))
        .map(|(&flag, (&addr, &value))| MemoryAccess {
            access: if flag & 1 == 1 {
                MemAccessKind::Write
            } else {
                MemAccessKind::Read
            },
            addr,
            value,
        })
        .collect();

    Ok(TraceRow {
        id: 0,
        disasm,
        comment,
        regs: regs.to_vec(),
        opcodes,
        mem,
        thread,
    })
}

/// Encode a trace store as a native trace file
pub fn encode(store: &TraceStore) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write(store, &mut out)?;
    Ok(out)
}

/// Stream a trace store as a native trace file
///
/// Register values are delta-encoded against the previous row. Strings longer
/// than 255 bytes are truncated.
pub fn write<W: Write>(store: &TraceStore, writer: &mut W) -> Result<()> {
    if !(1..=8).contains(&store.pointer_size) {
        return Err(CodecError::Encode(format!(
            "pointer size {} outside 1..=8",
            store.pointer_size
        )));
    }
    let header = Header {
        arch: store.arch.clone(),
        pointer_size: Some(store.pointer_size),
        regs: Some(store.registers.names().to_vec()),
        version: Some(VERSION.to_string()),
    };
    write_header(writer, MAGIC, &header)?;

    let mut previous: Option<&[u64]> = None;
    for row in store.trace.iter() {
        if row.regs.len() != store.registers.len() {
            return Err(CodecError::Encode(format!(
                "row {} has {} register values but the register map has {}",
                row.id,
                row.regs.len(),
                store.registers.len()
            )));
        }
        write_row(writer, row, previous, store.pointer_size)?;
        previous = Some(&row.regs);
    }

    for bookmark in store.bookmarks.iter() {
        write_bookmark(writer, bookmark)?;
    }

    tracing::info!(
        "Encoded TVTR trace: {} rows, {} bookmarks",
        store.row_count(),
        store.bookmarks.len()
    );
    Ok(())
}

fn write_row<W: Write>(
    writer: &mut W,
    row: &TraceRow,
    previous: Option<&[u64]>,
    pointer_size: u8,
) -> Result<()> {
    let (skips, values) = register_changes(previous, &row.regs)?;
    let change_count = count_u8(skips.len(), row.id, "changed registers")?;
    let access_count = count_u8(row.mem.len(), row.id, "memory accesses")?;
    if row.opcodes.len() > OPCODE_LEN_MASK as usize {
        return Err(CodecError::Encode(format!(
            "row {} has {} opcode bytes, at most 15 fit",
            row.id,
            row.opcodes.len()
        )));
    }
    let mut flags = row.opcodes.len() as u8;
    if row.thread.is_some() {
        flags |= THREAD_ID_FLAG;
    }

    writer.write_u8(TAG_ROW)?;
    wire::write_string(writer, &row.disasm)?;
    wire::write_string(writer, &row.comment)?;
    writer.write_u8(change_count)?;
    writer.write_u8(access_count)?;
    writer.write_u8(flags)?;
    if let Some(thread) = row.thread {
        wire::write_u32(writer, thread)?;
    }
    writer.write_all(&row.opcodes)?;
    writer.write_all(&skips)?;
    for value in values {
        wire::write_uint(writer, value, pointer_size, "register value")?;
    }
    for access in &row.mem {
        writer.write_u8(u8::from(access.access == MemAccessKind::Write))?;
    }
    for access in &row.mem {
        wire::write_uint(writer, access.addr, pointer_size, "memory address")?;
    }
    for access in &row.mem {
        wire::write_uint(writer, access.value, pointer_size, "memory value")?;
    }
    Ok(())
}

fn count_u8(count: usize, row: usize, what: &str) -> Result<u8> {
    u8::try_from(count).map_err(|_| {
        CodecError::Encode(format!("row {} has {} {}, at most 255 fit", row, count, what))
    })
}
