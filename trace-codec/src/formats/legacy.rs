//! Legacy "TRAC" trace format written by x64dbg (read-only)
//!
//! Rows carry no disassembly or comment text:
//!
//! ```text
//! row := 0x00 u8 C u8 M u8 flags [u32 thread] opcodes[flags & 0x0f]
//!        u8 skip[C] uint value[C]
//!        u8 access[M] uint addr[M] uint old[M] uint new[writes]
//! ```
//!
//! An access whose bit 0 is clear is a write and carries a new value after the
//! old values. A set bit 0 is a read (or a write of an identical value) and only
//! has the one stored value. Values are always stored at full pointer width.

use super::{
    apply_register_changes, insert_loaded_bookmark, read_bookmark, read_header,
    OPCODE_LEN_MASK, TAG_BOOKMARK, TAG_ROW, THREAD_ID_FLAG,
};
use crate::disasm::Disassembler;
use crate::error::CodecError;
use crate::wire::WireReader;
use crate::Result;
use serde::Deserialize;
use trace_data::{Arch, MemoryAccess, RegisterMap, RegisterTables, TraceRow, TraceStore};

/// File magic
pub const MAGIC: &[u8; 4] = b"TRAC";

#[derive(Debug, Deserialize)]
struct Header {
    arch: Arch,
}

/// Architecture-dependent decoding parameters
struct Layout {
    pointer_size: u8,
    ip_index: usize,
}

/// Decode an x64dbg trace file
///
/// Disassembly is produced by `disassembler` from each row's opcodes at the
/// row's instruction pointer. Anything other than `x64` is decoded as x86.
pub fn decode(
    data: &[u8],
    tables: &RegisterTables,
    disassembler: &dyn Disassembler,
) -> Result<TraceStore> {
    let mut reader = WireReader::new(data);
    let header: Header = read_header(&mut reader, MAGIC)?;
    let arch = match header.arch {
        Arch::X64 => Arch::X64,
        Arch::X86 => Arch::X86,
        Arch::Other(tag) => {
            tracing::warn!("Unknown architecture '{}' in x64dbg trace, decoding as x86", tag);
            Arch::X86
        }
    };

    let table = tables
        .for_arch(&arch)
        .ok_or_else(|| CodecError::Format(format!("no register table for {}", arch)))?;
    let registers =
        RegisterMap::new(table.iter().cloned()).map_err(|e| CodecError::Format(e.to_string()))?;
    let ip_name = arch.ip_register();
    let layout = Layout {
        pointer_size: arch.pointer_size().unwrap_or(4),
        ip_index: registers.index_of(ip_name).ok_or_else(|| {
            CodecError::Format(format!("register table for {} lacks {}", arch, ip_name))
        })?,
    };
    tracing::debug!(
        "TRAC header: arch={}, {} registers, ip={}",
        arch,
        registers.len(),
        ip_name
    );

    let mut store = TraceStore::new(arch, layout.pointer_size, registers);
    let mut regs = vec![0u64; store.registers.len()];
    let mut dropped = 0usize;
    let mut undecodable = 0usize;

    loop {
        match reader.peek_u8() {
            Some(TAG_ROW) => {
                reader.read_u8("record tag")?;
                let mut row = read_row(&mut reader, &layout, &mut regs, &mut dropped)?;
                let ip = row.regs[layout.ip_index];
                match disassembler.disassemble(&row.opcodes, ip, &store.arch) {
                    Some(text) => row.disasm = text,
                    None => undecodable += 1,
                }
                let mask = value_mask(&row.disasm);
                for access in &mut row.mem {
                    access.value &= mask;
                }
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

    if undecodable > 0 {
        tracing::warn!("{} rows could not be disassembled", undecodable);
    }
    if dropped > 0 {
        tracing::debug!("Ignored {} register changes outside the register table", dropped);
    }
    tracing::info!(
        "Decoded TRAC trace: {} rows, {} bookmarks",
        store.row_count(),
        store.bookmarks.len()
    );
    Ok(store)
}

fn read_row(
    reader: &mut WireReader<'_>,
    layout: &Layout,
    regs: &mut [u64],
    dropped: &mut usize,
) -> Result<TraceRow> {
    let ps = layout.pointer_size;
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
    let values = reader.read_uints(change_count, ps, "register values")?;
    let access_flags = reader.read_bytes(access_count, "memory access flags")?;
    let addrs = reader.read_uints(access_count, ps, "memory addresses")?;
    let old_values = reader.read_uints(access_count, ps, "memory old values")?;
    let write_count = access_flags.iter().filter(|&&f| f & 1 == 0).count();
    let mut new_values = reader
        .read_uints(write_count, ps, "memory new values")?
        .into_iter();

    *dropped += apply_register_changes(regs, skips, &values);

    let mut mem = Vec::with_capacity(access_count);
    for ((&flag, &addr), &old) in access_flags.iter().zip(&addrs).zip(&old_values) {
        let access = if flag & 1 == 0 {
            // write_count new values were read for exactly these accesses
            let value = new_values.next().unwrap_or(old);
            MemoryAccess::write(addr, value)
        } else {
            MemoryAccess::read(addr, old)
        };
        mem.push(access);
    }

    Ok(TraceRow {
        id: 0,
        disasm: String::new(),
        comment: String::new(),
        regs: regs.to_vec(),
        opcodes,
        mem,
        thread,
    })
}

/// Mask narrowing full-width memory values to the operand size in `disasm`
///
/// `qword` and `dword` are checked before `word`, which is a substring of both.
pub fn value_mask(disasm: &str) -> u64 {
    if disasm.contains("qword") {
        u64::MAX
    } else if disasm.contains("dword") {
        0xffff_ffff
    } else if disasm.contains("word") {
        0xffff
    } else if disasm.contains("byte") {
        0xff
    } else {
        u64::MAX
    }
}
