//! Errors raised by trace lookups and mutations

use thiserror::Error;

/// Errors related to trace, register and bookmark operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// Row id outside the trace
    #[error("Row {row} not found (trace has {len} rows)")]
    RowNotFound { row: usize, len: usize },

    /// Register name not present in the register map
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// No instruction pointer register could be resolved
    #[error("No pointer register: none of eip, rip, ip, pc present and no override set")]
    NoPointerRegister,

    /// Position outside a list (bookmarks)
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A bookmark already starts at this row
    #[error("Bookmark at row {startrow} already exists")]
    BookmarkConflict { startrow: usize },

    /// Bookmark range is inverted
    #[error("Invalid bookmark: end row {endrow} is before start row {startrow}")]
    InvalidBookmark { startrow: usize, endrow: usize },

    /// Register names/indexes do not form a dense bijection
    #[error("Invalid register map: {0}")]
    InvalidRegisterMap(String),
}
