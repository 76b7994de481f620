//! Trace Viewer - Browsing, filtering and annotating execution traces
//!
//! This crate sits on top of [`trace_data`] and [`trace_codec`] and provides
//! what a viewer front end works with: an open [`Session`] with its filtered
//! view, the filter and find query engine, and whole-trace analyses.
//!
//! # Usage
//!
//! ```
//! use trace_viewer::{Direction, FindField, Session, ViewerConfig};
//! use trace_data::{Arch, RegisterMap, TraceRow, TraceStore};
//!
//! let registers = RegisterMap::new(["eax", "eip"]).unwrap();
//! let mut store = TraceStore::new(Arch::X86, 4, registers);
//! store.trace.push(TraceRow::new("push eax", vec![0x50], vec![1, 0x401000]));
//! store.trace.push(TraceRow::new("pop ebx", vec![0x5b], vec![1, 0x401001]));
//!
//! let mut session = Session::new(store, ViewerConfig::default());
//! assert_eq!(session.filter("disasm=pop").unwrap(), 1);
//! assert_eq!(
//!     session.find(FindField::Disasm, "pop", 0, Direction::Forward).unwrap(),
//!     Some(0)
//! );
//! ```

pub mod analysis;
pub mod config;
pub mod query;
pub mod session;

pub use analysis::{
    annotate_memory_accesses, bookmark_memory_writes, bookmark_summary, execution_counts,
    rows_accessing_range, BookmarkSummary,
};
pub use config::ViewerConfig;
pub use query::{filter_trace, find, Direction, Filter, FilterError, FindError, FindField};
pub use session::{Session, TraceView};

/// Result type for viewer operations
pub type Result<T> = anyhow::Result<T>;
