//! Filtering and searching over trace rows
//!
//! Both operate on any row sequence: the full trace or the result of a
//! previous filter.

pub mod filter;
pub mod find;

pub use filter::{filter_trace, Clause, Filter, FilterError};
pub use find::{find, Direction, FindError, FindField};

/// Parse a hex number with an optional `0x` prefix
pub(crate) fn parse_hex(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
