//! Trace Codec - Reading and writing execution trace files
//!
//! Three formats are supported:
//!
//! * native `TVTR` binary - read/write, delta-encoded registers, bookmarks
//! * legacy `TRAC` binary written by x64dbg - read-only, disassembled on load
//! * JSON interchange - read/write, fully resolved rows
//!
//! [`load`] picks the decoder by sniffing the first four bytes and falls back to
//! JSON. Decoding never produces a partial trace: a truncated or corrupt record
//! fails the whole load, while a valid file without rows loads as an empty trace.
//!
//! # Usage
//!
//! ```
//! use trace_codec::{load, save, Format, IcedDisassembler};
//! use trace_data::{Arch, RegisterMap, RegisterTables, TraceRow, TraceStore};
//!
//! let registers = RegisterMap::new(["eax", "eip"]).unwrap();
//! let mut store = TraceStore::new(Arch::X86, 4, registers);
//! store.trace.push(TraceRow::new("push eax", vec![0x50], vec![1, 0x401000]));
//!
//! let bytes = save(&store, Format::Native).unwrap();
//! let loaded = load(&bytes, &RegisterTables::default(), &IcedDisassembler).unwrap();
//! assert_eq!(loaded, store);
//! ```

pub mod disasm;
pub mod error;
pub mod formats;
pub mod wire;

pub use disasm::{Disassembler, IcedDisassembler};
pub use error::CodecError;
pub use formats::{json, legacy, native};

use std::fmt;
use std::io::Write;
use trace_data::{RegisterTables, TraceStore};

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Trace file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `TVTR` binary
    Native,
    /// x64dbg `TRAC` binary
    Legacy,
    /// JSON interchange
    Json,
}

impl Format {
    /// Whether traces can be written in this format
    pub fn is_writable(&self) -> bool {
        !matches!(self, Format::Legacy)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Native => "native",
            Format::Legacy => "legacy",
            Format::Json => "json",
        })
    }
}

/// Format implied by the first four bytes; anything unrecognized is JSON
pub fn sniff(data: &[u8]) -> Format {
    match data.get(..4) {
        Some(magic) if magic == legacy::MAGIC => Format::Legacy,
        Some(magic) if magic == native::MAGIC => Format::Native,
        _ => Format::Json,
    }
}

/// Decode a trace file of any supported format
///
/// Data that carries neither binary magic and does not parse as a JSON trace
/// is a [`CodecError::Format`].
pub fn load(
    data: &[u8],
    tables: &RegisterTables,
    disassembler: &dyn Disassembler,
) -> Result<TraceStore> {
    let format = sniff(data);
    tracing::debug!("Sniffed {} trace ({} bytes)", format, data.len());
    match format {
        Format::Legacy => legacy::decode(data, tables, disassembler),
        Format::Native => native::decode(data, tables),
        Format::Json => json::decode(data).map_err(|e| match e {
            CodecError::Json(e) => {
                CodecError::Format(format!("not a TVTR, TRAC or JSON trace: {}", e))
            }
            other => other,
        }),
    }
}

/// Encode a trace store in a writable format
pub fn save(store: &TraceStore, format: Format) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    save_to(store, format, &mut out)?;
    Ok(out)
}

/// Stream a trace store in a writable format
pub fn save_to<W: Write>(store: &TraceStore, format: Format, writer: &mut W) -> Result<()> {
    match format {
        Format::Native => native::write(store, writer),
        Format::Json => json::write(store, writer),
        Format::Legacy => Err(CodecError::Encode(
            "the x64dbg TRAC format is read-only".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_data::{Arch, RegisterMap, TraceRow};

    fn no_disasm(_: &[u8], _: u64, _: &Arch) -> Option<String> {
        None
    }

    fn sample_store() -> TraceStore {
        let registers = RegisterMap::new(["eax", "eip"]).unwrap();
        let mut store = TraceStore::new(Arch::X86, 4, registers);
        store.trace.push(TraceRow::new("push eax", vec![0x50], vec![1, 0x401000]));
        store
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"TRAC...."), Format::Legacy);
        assert_eq!(sniff(b"TVTR...."), Format::Native);
        assert_eq!(sniff(b"{\"trace\": []}"), Format::Json);
        assert_eq!(sniff(b"TV"), Format::Json);
    }

    #[test]
    fn test_load_dispatches_native_and_json() {
        let store = sample_store();
        let tables = RegisterTables::default();
        for format in [Format::Native, Format::Json] {
            let bytes = save(&store, format).unwrap();
            assert_eq!(sniff(&bytes), format);
            assert_eq!(load(&bytes, &tables, &no_disasm).unwrap(), store, "{}", format);
        }
    }

    #[test]
    fn test_unrecognized_file_is_format_error() {
        let result = load(b"GARBAGE DATA", &RegisterTables::default(), &no_disasm);
        assert!(matches!(result, Err(CodecError::Format(_))), "got {:?}", result.err());

        let result = load(b"", &RegisterTables::default(), &no_disasm);
        assert!(matches!(result, Err(CodecError::Format(_))));
    }

    #[test]
    fn test_legacy_is_read_only() {
        assert!(!Format::Legacy.is_writable());
        assert!(matches!(
            save(&sample_store(), Format::Legacy),
            Err(CodecError::Encode(_))
        ));
    }

    #[test]
    fn test_native_to_json_conversion_preserves_trace() {
        let store = sample_store();
        let tables = RegisterTables::default();
        let native = save(&store, Format::Native).unwrap();
        let loaded = load(&native, &tables, &no_disasm).unwrap();
        let json = save(&loaded, Format::Json).unwrap();
        assert_eq!(load(&json, &tables, &no_disasm).unwrap(), store);
    }
}
