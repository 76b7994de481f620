//! Filter expressions
//!
//! A filter is a `/`-separated pipeline of `key=value` clauses. Each clause
//! narrows the result of the one before it:
//!
//! ```text
//! disasm=push|pop/mem_write_value=0x0/rows=0-99
//! ```
//!
//! The whole expression is compiled before any row is examined, so a bad
//! clause fails the filter without producing partial results.

use super::parse_hex;
use regex::Regex;
use thiserror::Error;
use trace_data::{MemAccessKind, MemoryAccess, RegisterMap, TraceRow};

/// Filter syntax errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Malformed filter clause '{0}': expected key=value")]
    MalformedClause(String),

    #[error("Unknown filter key '{0}'")]
    UnknownKey(String),

    #[error("Unknown register '{0}' in filter")]
    UnknownRegister(String),

    #[error("Invalid value '{value}' for filter key '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// Which memory accesses a `mem_*` clause considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFilter {
    Any,
    Only(MemAccessKind),
}

impl AccessFilter {
    fn admits(&self, access: &MemoryAccess) -> bool {
        match self {
            AccessFilter::Any => true,
            AccessFilter::Only(kind) => access.access == *kind,
        }
    }
}

/// One compiled filter clause
#[derive(Debug, Clone)]
pub enum Clause {
    /// Positions `start..=end` of the current result
    Rows { start: usize, end: usize },
    /// Disassembly contains any of the alternatives
    Disasm(Vec<String>),
    /// Lowercase hex opcodes contain the text
    Opcodes(String),
    /// Comment contains the text
    Comment(String),
    /// Register at `index` equals `value`
    Register { index: usize, value: u64 },
    /// Any register equals the value
    AnyRegister(u64),
    /// Textual row form matches
    Regex(Regex),
    /// Textual row form does not match
    NotRegex(Regex),
    /// Some admitted access has this value
    MemValue { access: AccessFilter, value: u64 },
    /// Some admitted access has this address
    MemAddr { access: AccessFilter, addr: u64 },
}

impl Clause {
    /// Compile a single `key=value` clause
    pub fn parse(text: &str, registers: &RegisterMap) -> Result<Self, FilterError> {
        let text = text.trim();
        let mut parts = text.split('=');
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !value.is_empty() => (key, value),
            _ => return Err(FilterError::MalformedClause(text.to_string())),
        };

        let hex = || {
            parse_hex(value).ok_or_else(|| FilterError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        };
        let regex = || {
            Regex::new(value).map_err(|e| FilterError::InvalidRegex {
                pattern: value.to_string(),
                reason: e.to_string(),
            })
        };

        let clause = match key {
            "rows" => {
                let bounds = value
                    .split_once('-')
                    .and_then(|(start, end)| Some((start.parse().ok()?, end.parse().ok()?)));
                let (start, end) = bounds.ok_or_else(|| FilterError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
                Clause::Rows { start, end }
            }
            "disasm" => Clause::Disasm(
                value
                    .split('|')
                    .filter(|alt| !alt.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            "opcodes" => Clause::Opcodes(value.to_lowercase()),
            "comment" => Clause::Comment(value.to_string()),
            "regex" => Clause::Regex(regex()?),
            "iregex" => Clause::NotRegex(regex()?),
            "mem_value" => Clause::MemValue { access: AccessFilter::Any, value: hex()? },
            "mem_read_value" => Clause::MemValue {
                access: AccessFilter::Only(MemAccessKind::Read),
                value: hex()?,
            },
            "mem_write_value" => Clause::MemValue {
                access: AccessFilter::Only(MemAccessKind::Write),
                value: hex()?,
            },
            "mem_addr" => Clause::MemAddr { access: AccessFilter::Any, addr: hex()? },
            "mem_read_addr" => Clause::MemAddr {
                access: AccessFilter::Only(MemAccessKind::Read),
                addr: hex()?,
            },
            "mem_write_addr" => Clause::MemAddr {
                access: AccessFilter::Only(MemAccessKind::Write),
                addr: hex()?,
            },
            _ => match key.strip_prefix("reg_") {
                Some("any") => Clause::AnyRegister(hex()?),
                Some(name) => {
                    let index = registers
                        .index_of(name)
                        .ok_or_else(|| FilterError::UnknownRegister(name.to_string()))?;
                    Clause::Register { index, value: hex()? }
                }
                None => return Err(FilterError::UnknownKey(key.to_string())),
            },
        };
        Ok(clause)
    }

    /// Whether a row passes this clause; positional clauses admit every row
    fn matches(&self, row: &TraceRow, registers: &RegisterMap) -> bool {
        match self {
            Clause::Rows { .. } => true,
            Clause::Disasm(alternatives) => alternatives.iter().any(|alt| row.disasm.contains(alt.as_str())),
            Clause::Opcodes(text) => row.opcodes_hex().contains(text.as_str()),
            Clause::Comment(text) => row.comment.contains(text.as_str()),
            Clause::Register { index, value } => row.regs.get(*index) == Some(value),
            Clause::AnyRegister(value) => row.regs.contains(value),
            Clause::Regex(re) => re.is_match(&row.render(registers)),
            Clause::NotRegex(re) => !re.is_match(&row.render(registers)),
            Clause::MemValue { access, value } => row
                .mem
                .iter()
                .any(|m| access.admits(m) && m.value == *value),
            Clause::MemAddr { access, addr } => row
                .mem
                .iter()
                .any(|m| access.admits(m) && m.addr == *addr),
        }
    }

    /// Narrow `rows` by this clause
    fn apply<'a>(&self, rows: Vec<&'a TraceRow>, registers: &RegisterMap) -> Vec<&'a TraceRow> {
        match *self {
            Clause::Rows { start, end } => {
                let start = start.min(rows.len());
                let end = end.saturating_add(1).min(rows.len()).max(start);
                rows[start..end].to_vec()
            }
            _ => rows
                .into_iter()
                .filter(|row| self.matches(row, registers))
                .collect(),
        }
    }
}

/// Compiled filter expression
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Compile a `/`-separated filter expression
    ///
    /// Blank text compiles to a filter that keeps every row.
    pub fn parse(text: &str, registers: &RegisterMap) -> Result<Self, FilterError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let clauses = text
            .split('/')
            .map(|clause| Clause::parse(clause, registers))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    /// Compiled clauses in pipeline order
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Whether the filter keeps every row
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Run the clause pipeline over `rows`
    pub fn apply<'a>(&self, rows: &'a [TraceRow], registers: &RegisterMap) -> Vec<&'a TraceRow> {
        self.clauses
            .iter()
            .fold(rows.iter().collect(), |current, clause| clause.apply(current, registers))
    }
}

/// Compile and run a filter expression in one step
pub fn filter_trace<'a>(
    rows: &'a [TraceRow],
    registers: &RegisterMap,
    text: &str,
) -> Result<Vec<&'a TraceRow>, FilterError> {
    let filter = Filter::parse(text, registers)?;
    let result = filter.apply(rows, registers);
    tracing::debug!(
        "Filter '{}' ({} clauses) kept {} of {} rows",
        text,
        filter.clauses().len(),
        result.len(),
        rows.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_data::{MemoryAccess, Trace};

    fn registers() -> RegisterMap {
        RegisterMap::new(["eax", "ebx", "eip"]).unwrap()
    }

    /// 100 rows: eax = id % 4, ebx = id, alternating push/pop
    fn sample_trace() -> Trace {
        (0..100u64)
            .map(|i| {
                let disasm = if i % 2 == 0 { "push eax" } else { "pop ebx" };
                let opcode = if i % 2 == 0 { 0x50 } else { 0x5b };
                let mut row = TraceRow::new(disasm, vec![opcode], vec![i % 4, i, 0x1000 + i]);
                if i == 42 {
                    row = row
                        .with_comment("answer")
                        .with_mem(vec![MemoryAccess::write(0x2000, 0x41), MemoryAccess::read(0x3000, 7)]);
                }
                if i == 43 {
                    row = row.with_mem(vec![MemoryAccess::read(0x2000, 0x41)]);
                }
                row
            })
            .collect()
    }

    fn ids(rows: &[&TraceRow]) -> Vec<usize> {
        rows.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_rows_slice_is_inclusive() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "rows=10-20").unwrap();
        assert_eq!(result.len(), 11);
        assert_eq!(result[0].id, 10);
        assert_eq!(result[10].id, 20);
    }

    #[test]
    fn test_rows_slice_is_clamped() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "rows=95-500").unwrap();
        assert_eq!(ids(&result), vec![95, 96, 97, 98, 99]);

        let result = filter_trace(trace.rows(), &registers(), "rows=200-300").unwrap();
        assert!(result.is_empty());

        let result = filter_trace(trace.rows(), &registers(), "rows=20-10").unwrap();
        assert!(result.is_empty(), "reversed bounds select nothing");
    }

    #[test]
    fn test_register_equality() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "reg_eax=0x1").unwrap();
        assert_eq!(result.len(), 25);
        assert!(result.iter().all(|r| r.regs[0] == 1), "only rows with eax == 1");

        let result = filter_trace(trace.rows(), &registers(), "reg_ebx=2a").unwrap();
        assert_eq!(ids(&result), vec![42], "prefix is optional");
    }

    #[test]
    fn test_any_register() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "reg_any=0x1010").unwrap();
        assert_eq!(ids(&result), vec![16], "matched through eip");
    }

    #[test]
    fn test_disasm_alternatives() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "disasm=pop").unwrap();
        assert_eq!(result.len(), 50);
        let result = filter_trace(trace.rows(), &registers(), "disasm=push|pop").unwrap();
        assert_eq!(result.len(), 100);
        let result = filter_trace(trace.rows(), &registers(), "disasm=call|ret").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_opcodes_and_comment() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "opcodes=5B").unwrap();
        assert_eq!(result.len(), 50, "opcode match is case-insensitive on the hex text");
        let result = filter_trace(trace.rows(), &registers(), "comment=answ").unwrap();
        assert_eq!(ids(&result), vec![42]);
    }

    #[test]
    fn test_memory_clauses() {
        let trace = sample_trace();
        let regs = registers();
        let run = |text: &str| ids(&filter_trace(trace.rows(), &regs, text).unwrap());

        assert_eq!(run("mem_value=0x41"), vec![42, 43]);
        assert_eq!(run("mem_write_value=0x41"), vec![42]);
        assert_eq!(run("mem_read_value=0x41"), vec![43]);
        assert_eq!(run("mem_addr=0x3000"), vec![42]);
        assert_eq!(run("mem_read_addr=0x2000"), vec![43]);
        assert_eq!(run("mem_write_addr=0x3000"), Vec::<usize>::new());
    }

    #[test]
    fn test_regex_over_textual_form() {
        let trace = sample_trace();
        let regs = registers();
        let result = filter_trace(trace.rows(), &regs, r"regex=WRITE \[0x2000\]").unwrap();
        assert_eq!(ids(&result), vec![42]);

        let result = filter_trace(trace.rows(), &regs, r"regex=ebx.0x2a\b").unwrap();
        assert_eq!(ids(&result), vec![42], "register names appear in the textual form");

        let result = filter_trace(trace.rows(), &regs, "iregex=push").unwrap();
        assert_eq!(result.len(), 50);
    }

    #[test]
    fn test_pipeline_narrows_previous_result() {
        let trace = sample_trace();
        let regs = registers();
        // rows applies to the disasm result, not to the trace
        let result = filter_trace(trace.rows(), &regs, "disasm=pop/rows=0-2").unwrap();
        assert_eq!(ids(&result), vec![1, 3, 5]);

        let result = filter_trace(trace.rows(), &regs, "rows=0-9/reg_eax=0x2/disasm=push").unwrap();
        assert_eq!(ids(&result), vec![2, 6]);
    }

    #[test]
    fn test_syntax_errors() {
        let trace = sample_trace();
        let regs = registers();
        let run = |text: &str| filter_trace(trace.rows(), &regs, text).unwrap_err();

        assert_eq!(run("bogus=1"), FilterError::UnknownKey("bogus".to_string()));
        assert!(matches!(run("disasm"), FilterError::MalformedClause(_)));
        assert!(matches!(run("disasm="), FilterError::MalformedClause(_)));
        assert!(matches!(run("a=b=c"), FilterError::MalformedClause(_)));
        assert_eq!(run("reg_xmm0=1"), FilterError::UnknownRegister("xmm0".to_string()));
        assert!(matches!(run("reg_eax=zz"), FilterError::InvalidValue { .. }));
        assert!(matches!(run("rows=10"), FilterError::InvalidValue { .. }));
        assert!(matches!(run("mem_addr=0xg"), FilterError::InvalidValue { .. }));
        assert!(matches!(run("regex=(unclosed"), FilterError::InvalidRegex { .. }));
    }

    #[test]
    fn test_bad_clause_discards_earlier_results() {
        let trace = sample_trace();
        let result = filter_trace(trace.rows(), &registers(), "disasm=push/bogus=1/rows=0-1");
        assert_eq!(result.unwrap_err(), FilterError::UnknownKey("bogus".to_string()));
    }

    #[test]
    fn test_errors_surface_on_empty_trace() {
        let empty = Trace::new();
        assert!(filter_trace(empty.rows(), &registers(), "bogus=1").is_err());
        assert!(filter_trace(empty.rows(), &registers(), "disasm=push").unwrap().is_empty());
    }

    #[test]
    fn test_blank_filter_keeps_everything() {
        let trace = sample_trace();
        let filter = Filter::parse("  ", &registers()).unwrap();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(trace.rows(), &registers()).len(), 100);
    }
}
