//! Trace Data - In-memory model for recorded execution traces
//!
//! This crate holds everything a loaded trace consists of once the file format
//! has been stripped away: the rows, the register naming that indexes each row's
//! register array, architecture metadata and the bookmarks attached to row ranges.
//!
//! # Overview
//!
//! * [`TraceRow`] - one executed instruction with disassembly, opcodes, comment,
//!   the full register state after the step and its memory accesses
//! * [`RegisterMap`] - name <-> index bijection fixed for one loaded trace
//! * [`TraceStore`] - a trace plus its register map, architecture and bookmarks
//! * [`BookmarkIndex`] - bookmarks sorted by start row, at most one per start row
//!
//! # Usage
//!
//! ```
//! use trace_data::{Arch, RegisterMap, TraceRow, TraceStore};
//!
//! let registers = RegisterMap::new(["eax", "eip"]).unwrap();
//! let mut store = TraceStore::new(Arch::X86, 4, registers);
//! store.trace.push(TraceRow::new("push eax", vec![0x50], vec![1, 0x401000]));
//!
//! assert_eq!(store.instruction_pointer(0).unwrap(), 0x401000);
//! assert_eq!(store.register_value(0, "eax").unwrap(), 1);
//! ```

pub mod bookmark;
pub mod error;
pub mod registers;
pub mod store;
pub mod trace;

pub use bookmark::{Bookmark, BookmarkIndex};
pub use error::TraceError;
pub use registers::{Arch, RegisterMap, RegisterTables, X64_REGISTERS, X86_REGISTERS};
pub use store::{TraceStore, POINTER_REGISTER_CANDIDATES};
pub use trace::{MemAccessKind, MemoryAccess, Trace, TraceRow};

/// Result type for trace data operations
pub type Result<T> = std::result::Result<T, TraceError>;
