//! Loaded trace with its register naming, architecture and bookmarks

use crate::bookmark::BookmarkIndex;
use crate::error::TraceError;
use crate::registers::{Arch, RegisterMap};
use crate::trace::{Trace, TraceRow};
use crate::Result;

/// Instruction pointer names tried, in order, when no override is set
pub const POINTER_REGISTER_CANDIDATES: [&str; 4] = ["eip", "rip", "ip", "pc"];

/// One loaded trace
///
/// Replaced wholesale on every successful load; comments and bookmarks are
/// edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStore {
    /// CPU architecture tag
    pub arch: Arch,
    /// Width in bytes of register values and memory addresses
    pub pointer_size: u8,
    /// Register naming for every row's register array
    pub registers: RegisterMap,
    /// Rows in execution order
    pub trace: Trace,
    /// Bookmarked row ranges
    pub bookmarks: BookmarkIndex,
    /// Explicit instruction pointer register name
    pub ip_register: Option<String>,
}

impl TraceStore {
    /// Create an empty store
    pub fn new(arch: Arch, pointer_size: u8, registers: RegisterMap) -> Self {
        Self {
            arch,
            pointer_size,
            registers,
            trace: Trace::new(),
            bookmarks: BookmarkIndex::new(),
            ip_register: None,
        }
    }

    /// Get number of rows
    pub fn row_count(&self) -> usize {
        self.trace.len()
    }

    /// Row by id, never clamped
    pub fn row(&self, id: usize) -> Result<&TraceRow> {
        self.trace.get(id).ok_or(TraceError::RowNotFound {
            row: id,
            len: self.trace.len(),
        })
    }

    /// Rows for a list of ids, in the given order
    pub fn rows(&self, ids: &[usize]) -> Result<Vec<&TraceRow>> {
        ids.iter().map(|&id| self.row(id)).collect()
    }

    /// Replace the comment of a row
    pub fn set_comment(&mut self, id: usize, comment: impl Into<String>) -> Result<()> {
        let len = self.trace.len();
        let row = self
            .trace
            .get_mut(id)
            .ok_or(TraceError::RowNotFound { row: id, len })?;
        row.comment = comment.into();
        Ok(())
    }

    /// Value of a named register at a row
    pub fn register_value(&self, id: usize, name: &str) -> Result<u64> {
        let index = self
            .registers
            .index_of(name)
            .ok_or_else(|| TraceError::UnknownRegister(name.to_string()))?;
        let row = self.row(id)?;
        Ok(row.regs.get(index).copied().unwrap_or_default())
    }

    /// `(name, value)` for every register at a row, in register map order
    pub fn registers_at(&self, id: usize) -> Result<Vec<(&str, u64)>> {
        let row = self.row(id)?;
        Ok(self
            .registers
            .iter()
            .map(|(index, name)| (name, row.regs.get(index).copied().unwrap_or_default()))
            .collect())
    }

    /// Names of registers whose value differs between row `id` and `id + 1`
    ///
    /// Empty for the last row.
    pub fn modified_registers(&self, id: usize) -> Result<Vec<&str>> {
        let row = self.row(id)?;
        let Some(next) = self.trace.get(id + 1) else {
            return Ok(Vec::new());
        };
        Ok(self
            .registers
            .iter()
            .filter(|&(index, _)| row.regs.get(index) != next.regs.get(index))
            .map(|(_, name)| name)
            .collect())
    }

    /// Name of the instruction pointer register
    ///
    /// An explicit override wins; otherwise the first of
    /// [`POINTER_REGISTER_CANDIDATES`] present in the register map.
    pub fn instruction_pointer_name(&self) -> Result<&str> {
        if let Some(name) = &self.ip_register {
            return Ok(name);
        }
        POINTER_REGISTER_CANDIDATES
            .iter()
            .copied()
            .find(|name| self.registers.contains(name))
            .ok_or(TraceError::NoPointerRegister)
    }

    /// Instruction pointer value at a row
    pub fn instruction_pointer(&self, id: usize) -> Result<u64> {
        let name = self.instruction_pointer_name()?;
        self.register_value(id, name)
    }
}
