//! Register naming and architecture metadata

use crate::error::TraceError;
use crate::Result;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// x86 registers in x64dbg REGISTERCONTEXT order
pub const X86_REGISTERS: &[&str] = &[
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "eip", "eflags", "gs", "fs", "es",
    "ds", "cs", "ss", "dr0", "dr1", "dr2", "dr3", "dr6", "dr7",
];

/// x64 registers in x64dbg REGISTERCONTEXT order
pub const X64_REGISTERS: &[&str] = &[
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15", "rip", "eflags", "gs", "fs", "es", "ds", "cs", "ss", "dr0", "dr1",
    "dr2", "dr3", "dr6", "dr7",
];

/// CPU architecture tag of a trace
///
/// Unrecognized tags are kept verbatim so they survive a save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Arch {
    X86,
    X64,
    Other(String),
}

impl Arch {
    /// Tag as written in file metadata
    pub fn as_str(&self) -> &str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::Other(tag) => tag,
        }
    }

    /// Pointer width implied by the architecture, if it implies one
    pub fn pointer_size(&self) -> Option<u8> {
        match self {
            Arch::X86 => Some(4),
            Arch::X64 => Some(8),
            Arch::Other(_) => None,
        }
    }

    /// Designated instruction pointer register
    pub fn ip_register(&self) -> &'static str {
        match self {
            Arch::X64 => "rip",
            _ => "eip",
        }
    }
}

impl From<String> for Arch {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "x86" => Arch::X86,
            "x64" => Arch::X64,
            _ => Arch::Other(tag),
        }
    }
}

impl From<&str> for Arch {
    fn from(tag: &str) -> Self {
        Arch::from(tag.to_string())
    }
}

impl From<Arch> for String {
    fn from(arch: Arch) -> Self {
        match arch {
            Arch::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default register tables used when a file does not name its registers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterTables {
    /// Register order for x86 traces
    pub x86: Vec<String>,
    /// Register order for x64 traces
    pub x64: Vec<String>,
}

impl RegisterTables {
    /// Create register tables from explicit name lists
    pub fn new(x86: Vec<String>, x64: Vec<String>) -> Self {
        Self { x86, x64 }
    }

    /// Table for an architecture, `None` for unrecognized tags
    pub fn for_arch(&self, arch: &Arch) -> Option<&[String]> {
        match arch {
            Arch::X86 => Some(&self.x86),
            Arch::X64 => Some(&self.x64),
            Arch::Other(_) => None,
        }
    }
}

impl Default for RegisterTables {
    fn default() -> Self {
        Self {
            x86: X86_REGISTERS.iter().map(|r| r.to_string()).collect(),
            x64: X64_REGISTERS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Bijection between register names and positions in a row's register array
///
/// Fixed for the lifetime of one loaded trace. Serializes as a `{name: index}`
/// object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, usize>")]
pub struct RegisterMap {
    names: Vec<String>,
    indexes: HashMap<String, usize>,
}

impl RegisterMap {
    /// Build a register map from names in index order
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut indexes = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            if indexes.insert(name.clone(), index).is_some() {
                return Err(TraceError::InvalidRegisterMap(format!(
                    "duplicate register name '{}'",
                    name
                )));
            }
        }
        Ok(Self { names, indexes })
    }

    /// Number of registers
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a register in the register array
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indexes.get(name).copied()
    }

    /// Name of the register at a position
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Register names in index order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `(index, name)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }
}

impl TryFrom<BTreeMap<String, usize>> for RegisterMap {
    type Error = TraceError;

    fn try_from(map: BTreeMap<String, usize>) -> Result<Self> {
        let len = map.len();
        let mut slots: Vec<Option<String>> = vec![None; len];
        for (name, index) in map {
            let slot = slots.get_mut(index).ok_or_else(|| {
                TraceError::InvalidRegisterMap(format!(
                    "register '{}' has index {} but only {} registers are defined",
                    name, index, len
                ))
            })?;
            if let Some(other) = slot {
                return Err(TraceError::InvalidRegisterMap(format!(
                    "registers '{}' and '{}' share index {}",
                    other, name, index
                )));
            }
            *slot = Some(name);
        }
        // Every slot is filled: len distinct indexes all below len.
        RegisterMap::new(slots.into_iter().flatten())
    }
}

impl Serialize for RegisterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (index, name) in self.iter() {
            map.serialize_entry(name, &index)?;
        }
        map.end()
    }
}
