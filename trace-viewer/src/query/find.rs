//! Keyword search
//!
//! Scans one row at a time from a start position toward either end of a row
//! sequence and stops at the first match.

use super::parse_hex;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use trace_data::{MemoryAccess, TraceRow};

/// Row field searched by [`find`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindField {
    /// Disassembly substring, `/`-separated alternatives
    Disasm,
    /// Hex value held by any register
    Regs,
    /// Access kind, or hex address or value when the keyword starts with `0x`
    Mem,
    /// Hex memory address
    MemAddr,
    /// Hex memory value
    MemValue,
    /// Comment substring
    Comment,
    /// Comment, memory, disassembly, then registers
    Any,
}

impl FindField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindField::Disasm => "disasm",
            FindField::Regs => "regs",
            FindField::Mem => "mem",
            FindField::MemAddr => "mem_addr",
            FindField::MemValue => "mem_value",
            FindField::Comment => "comment",
            FindField::Any => "any",
        }
    }
}

impl fmt::Display for FindField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FindField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disasm" => Ok(FindField::Disasm),
            "regs" => Ok(FindField::Regs),
            "mem" => Ok(FindField::Mem),
            "mem_addr" => Ok(FindField::MemAddr),
            "mem_value" => Ok(FindField::MemValue),
            "comment" => Ok(FindField::Comment),
            "any" => Ok(FindField::Any),
            other => Err(format!(
                "unknown field '{}' (expected disasm, regs, mem, mem_addr, mem_value, comment or any)",
                other
            )),
        }
    }
}

/// Scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// Direction of a signed step: negative scans backward
    pub fn from_step(step: isize) -> Self {
        if step < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

/// Search errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FindError {
    #[error("Invalid keyword '{keyword}' for {field} search: expected a hex number")]
    InvalidKeyword { keyword: String, field: FindField },
}

/// Compiled keyword predicate
enum Matcher<'k> {
    Disasm(Vec<&'k str>),
    Regs(u64),
    MemNumber(u64),
    MemKind(&'k str),
    MemAddr(u64),
    MemValue(u64),
    Comment(&'k str),
    Any { text: &'k str, number: Option<u64> },
}

impl<'k> Matcher<'k> {
    fn new(field: FindField, keyword: &'k str) -> Result<Self, FindError> {
        let hex = || {
            parse_hex(keyword).ok_or_else(|| FindError::InvalidKeyword {
                keyword: keyword.to_string(),
                field,
            })
        };
        let is_hex = keyword.starts_with("0x");

        Ok(match field {
            FindField::Disasm => {
                Matcher::Disasm(keyword.split('/').filter(|alt| !alt.is_empty()).collect())
            }
            FindField::Regs => Matcher::Regs(hex()?),
            FindField::Mem if is_hex => Matcher::MemNumber(hex()?),
            FindField::Mem => Matcher::MemKind(keyword),
            FindField::MemAddr => Matcher::MemAddr(hex()?),
            FindField::MemValue => Matcher::MemValue(hex()?),
            FindField::Comment => Matcher::Comment(keyword),
            FindField::Any => Matcher::Any {
                text: keyword,
                number: if is_hex { Some(hex()?) } else { None },
            },
        })
    }

    fn matches(&self, row: &TraceRow) -> bool {
        match self {
            Matcher::Disasm(alternatives) => alternatives.iter().any(|alt| row.disasm.contains(alt)),
            Matcher::Regs(value) => row.regs.contains(value),
            Matcher::MemNumber(n) => row.mem.iter().any(|m| m.addr == *n || m.value == *n),
            Matcher::MemKind(text) => row.mem.iter().any(|m| kind_is(m, text)),
            Matcher::MemAddr(addr) => row.mem.iter().any(|m| m.addr == *addr),
            Matcher::MemValue(value) => row.mem.iter().any(|m| m.value == *value),
            Matcher::Comment(text) => row.comment.contains(text),
            Matcher::Any { text, number } => {
                row.comment.contains(text)
                    || row.mem.iter().any(|m| {
                        kind_is(m, text) || number.is_some_and(|n| m.addr == n || m.value == n)
                    })
                    || row.disasm.contains(text)
                    || number.is_some_and(|n| row.regs.contains(&n))
            }
        }
    }
}

fn kind_is(access: &MemoryAccess, text: &str) -> bool {
    access.access.as_str() == text
}

/// Position of the next row matching `keyword` in `field`
///
/// The scan starts at `start_row` itself and moves toward the end (forward)
/// or the beginning (backward) of `rows`. An empty keyword, an empty
/// sequence or a start at or past the end finds nothing without scanning.
pub fn find<R: Borrow<TraceRow>>(
    rows: &[R],
    field: FindField,
    keyword: &str,
    start_row: usize,
    direction: Direction,
) -> Result<Option<usize>, FindError> {
    if keyword.is_empty() || rows.is_empty() || start_row >= rows.len() {
        return Ok(None);
    }
    let matcher = Matcher::new(field, keyword)?;
    let hit = |&i: &usize| matcher.matches(Borrow::<TraceRow>::borrow(&rows[i]));

    let position = match direction {
        Direction::Forward => (start_row..rows.len()).find(hit),
        Direction::Backward => (0..=start_row).rev().find(hit),
    };
    tracing::debug!(
        "find {} '{}' from {} ({:?}): {:?}",
        field,
        keyword,
        start_row,
        direction,
        position
    );
    Ok(position)
}
