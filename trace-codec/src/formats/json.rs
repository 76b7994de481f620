//! JSON interchange format (read/write)
//!
//! Rows are stored fully resolved, without delta encoding:
//!
//! ```json
//! {"arch": "x86", "pointer_size": 4, "regs": {"eax": 0, "eip": 1},
//!  "trace": [{"id": 0, "disasm": "push eax", "comment": "", "regs": [1, 4198400],
//!             "opcodes": "50", "mem": [{"access": "WRITE", "addr": 1703680, "value": 1}]}],
//!  "bookmarks": [{"addr": "0x401000", "disasm": "push eax", "startrow": 0, "endrow": 0,
//!                 "comment": ""}]}
//! ```

use crate::error::CodecError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use trace_data::{Arch, Bookmark, RegisterMap, Trace, TraceStore};

#[derive(Debug, Deserialize)]
struct JsonTrace {
    #[serde(default)]
    arch: Option<Arch>,
    #[serde(default)]
    pointer_size: Option<u8>,
    #[serde(default)]
    regs: RegisterMap,
    trace: Trace,
    #[serde(default)]
    bookmarks: Vec<Bookmark>,
}

#[derive(Debug, Serialize)]
struct JsonTraceRef<'a> {
    arch: &'a Arch,
    pointer_size: u8,
    regs: &'a RegisterMap,
    trace: &'a Trace,
    bookmarks: &'a [Bookmark],
}

/// Decode a JSON trace
///
/// A missing `pointer_size` is derived from `arch` (4 when unknown). Row ids
/// are reassigned from position.
pub fn decode(data: &[u8]) -> Result<TraceStore> {
    let parsed: JsonTrace = serde_json::from_slice(data)?;

    let arch = parsed.arch.unwrap_or_else(|| Arch::Other(String::new()));
    let pointer_size = parsed
        .pointer_size
        .or_else(|| arch.pointer_size())
        .unwrap_or(4);
    if !(1..=8).contains(&pointer_size) {
        return Err(CodecError::Format(format!(
            "pointer size {} outside 1..=8",
            pointer_size
        )));
    }

    if !parsed.regs.is_empty() {
        if let Some(row) = parsed.trace.iter().find(|r| r.regs.len() != parsed.regs.len()) {
            return Err(CodecError::decode(
                0,
                format!(
                    "row {} has {} register values but {} registers are named",
                    row.id,
                    row.regs.len(),
                    parsed.regs.len()
                ),
            ));
        }
    }

    let mut store = TraceStore::new(arch, pointer_size, parsed.regs);
    store.trace = parsed.trace;
    for bookmark in parsed.bookmarks {
        super::insert_loaded_bookmark(&mut store, bookmark);
    }

    tracing::info!(
        "Decoded JSON trace: {} rows, {} bookmarks",
        store.row_count(),
        store.bookmarks.len()
    );
    Ok(store)
}

/// Encode a trace store as JSON
pub fn encode(store: &TraceStore) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write(store, &mut out)?;
    Ok(out)
}

/// Stream a trace store as JSON
pub fn write<W: Write>(store: &TraceStore, writer: &mut W) -> Result<()> {
    let document = JsonTraceRef {
        arch: &store.arch,
        pointer_size: store.pointer_size,
        regs: &store.registers,
        trace: &store.trace,
        bookmarks: store.bookmarks.as_slice(),
    };
    serde_json::to_writer(writer, &document)?;
    tracing::info!(
        "Encoded JSON trace: {} rows, {} bookmarks",
        store.row_count(),
        store.bookmarks.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_data::{MemoryAccess, TraceRow};

    fn sample_store() -> TraceStore {
        let registers = RegisterMap::new(["eax", "eip"]).unwrap();
        let mut store = TraceStore::new(Arch::X86, 4, registers);
        store.trace.push(
            TraceRow::new("push eax", vec![0x50], vec![1, 0x401000])
                .with_mem(vec![MemoryAccess::write(0x19ff00, 1)])
                .with_thread(7),
        );
        store.trace.push(TraceRow::new("pop ebx", vec![0x5b], vec![1, 0x401001]).with_comment("x"));
        store
            .bookmarks
            .add(
                Bookmark {
                    addr: "0x401000".to_string(),
                    ..Bookmark::new(0, 1)
                },
                false,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_round_trip() {
        let store = sample_store();
        let decoded = decode(&encode(&store).unwrap()).unwrap();
        assert_eq!(decoded, store);
    }

    #[test]
    fn test_minimal_document() {
        let json = br#"{"trace": [{"disasm": "nop", "regs": [], "opcodes": "90"}]}"#;
        let store = decode(json).unwrap();
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.pointer_size, 4);
        assert!(store.registers.is_empty());
        assert!(store.bookmarks.is_empty());
    }

    #[test]
    fn test_x64_pointer_size_default() {
        let json = br#"{"arch": "x64", "regs": {"rip": 0}, "trace": []}"#;
        let store = decode(json).unwrap();
        assert_eq!(store.arch, Arch::X64);
        assert_eq!(store.pointer_size, 8);
    }

    #[test]
    fn test_register_count_mismatch() {
        let json = br#"{"regs": {"eax": 0, "ebx": 1}, "trace": [{"regs": [1], "opcodes": ""}]}"#;
        assert!(matches!(decode(json), Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_missing_trace_is_json_error() {
        assert!(matches!(decode(br#"{"arch": "x86"}"#), Err(CodecError::Json(_))));
        assert!(matches!(decode(b"not json"), Err(CodecError::Json(_))));
    }
}
