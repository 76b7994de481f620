//! Data structures for execution traces

use crate::registers::RegisterMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Write as _;

/// Complete execution trace, one row per executed instruction
///
/// Append-only. A row's id always equals its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<TraceRow>")]
pub struct Trace {
    rows: Vec<TraceRow>,
}

/// A single traced instruction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Row id (position in the trace)
    #[serde(default)]
    pub id: usize,
    /// Disassembly text (mnemonic and operands)
    #[serde(default)]
    pub disasm: String,
    /// User comment
    #[serde(default)]
    pub comment: String,
    /// Full register state after this step, indexed by the trace's register map
    #[serde(default)]
    pub regs: Vec<u64>,
    /// Raw instruction bytes
    #[serde(default, with = "hex_bytes")]
    pub opcodes: Vec<u8>,
    /// Memory accesses performed by the instruction
    #[serde(default)]
    pub mem: Vec<MemoryAccess>,
    /// Thread that executed the instruction, when the tracer recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<u32>,
}

/// Memory access (read or write)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryAccess {
    /// Access type
    pub access: MemAccessKind,
    /// Memory address
    pub addr: u64,
    /// Value read or written
    pub value: u64,
}

/// Type of memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemAccessKind {
    #[serde(rename = "READ")]
    Read,
    #[serde(rename = "WRITE")]
    Write,
}

impl MemAccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemAccessKind::Read => "READ",
            MemAccessKind::Write => "WRITE",
        }
    }
}

impl MemoryAccess {
    pub fn read(addr: u64, value: u64) -> Self {
        Self { access: MemAccessKind::Read, addr, value }
    }

    pub fn write(addr: u64, value: u64) -> Self {
        Self { access: MemAccessKind::Write, addr, value }
    }
}

impl TraceRow {
    /// Create a row with no comment, memory accesses or thread id
    pub fn new(disasm: impl Into<String>, opcodes: Vec<u8>, regs: Vec<u64>) -> Self {
        Self {
            disasm: disasm.into(),
            opcodes,
            regs,
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_mem(mut self, mem: Vec<MemoryAccess>) -> Self {
        self.mem = mem;
        self
    }

    pub fn with_thread(mut self, thread: u32) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Opcode bytes as lowercase hex
    pub fn opcodes_hex(&self) -> String {
        hex::encode(&self.opcodes)
    }

    /// Single-line textual form used by regex filtering
    ///
    /// `<id> <opcodes> <disasm> ; <comment> | <reg>=0x<hex> ... | <ACCESS> [0x<addr>]=0x<value> ...`
    pub fn render(&self, registers: &RegisterMap) -> String {
        let mut line = format!("{} {} {} ; {} |", self.id, self.opcodes_hex(), self.disasm, self.comment);
        for (index, value) in self.regs.iter().enumerate() {
            match registers.name(index) {
                Some(name) => {
                    let _ = write!(line, " {}={:#x}", name, value);
                }
                None => {
                    let _ = write!(line, " r{}={:#x}", index, value);
                }
            }
        }
        line.push_str(" |");
        for access in &self.mem {
            let _ = write!(line, " {} [{:#x}]={:#x}", access.access.as_str(), access.addr, access.value);
        }
        line
    }
}

impl Trace {
    /// Create new empty trace
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { rows: Vec::with_capacity(capacity) }
    }

    /// Append a row, assigning its id; returns the id
    pub fn push(&mut self, mut row: TraceRow) -> usize {
        let id = self.rows.len();
        row.id = id;
        self.rows.push(row);
        id
    }

    /// Get number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&TraceRow> {
        self.rows.get(id)
    }

    /// Ids stay crate-private; outside callers edit through `TraceStore`
    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut TraceRow> {
        self.rows.get_mut(id)
    }

    /// All rows in order
    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceRow> {
        self.rows.iter()
    }
}

impl From<Vec<TraceRow>> for Trace {
    fn from(rows: Vec<TraceRow>) -> Self {
        rows.into_iter().collect()
    }
}

impl From<Trace> for Vec<TraceRow> {
    fn from(trace: Trace) -> Self {
        trace.rows
    }
}

impl Serialize for Trace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.rows)
    }
}

impl FromIterator<TraceRow> for Trace {
    fn from_iter<I: IntoIterator<Item = TraceRow>>(iter: I) -> Self {
        let mut trace = Trace::new();
        for row in iter {
            trace.push(row);
        }
        trace
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceRow;
    type IntoIter = std::slice::Iter<'a, TraceRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Opcode bytes travel as a hex string in JSON
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.trim()).map_err(serde::de::Error::custom)
    }
}
