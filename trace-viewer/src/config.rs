//! Viewer configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default.
//!
//! ```json
//! {"ip_register": "pc", "page_size": 500, "registers": {"x86": ["eax", "eip"]}}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::Path;
use trace_data::RegisterTables;

/// Default number of rows shown per page
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Configuration for opening and browsing traces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Register names for formats that do not name their registers
    pub registers: RegisterTables,
    /// Instruction pointer register, overriding the eip/rip/ip/pc lookup
    pub ip_register: Option<String>,
    /// Rows per page when listing rows
    pub page_size: usize,
}

impl ViewerConfig {
    /// Create a new viewer configuration
    pub fn new(registers: RegisterTables, ip_register: Option<String>, page_size: usize) -> Self {
        Self {
            registers,
            ip_register,
            page_size,
        }
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        anyhow::ensure!(config.page_size > 0, "page_size must be at least 1");
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Number of pages needed for `total` rows (at least one)
    pub fn page_count(&self, total: usize) -> usize {
        let size = self.page_size.max(1);
        total.div_ceil(size).max(1)
    }

    /// Row positions on 1-based `page`, clamped to `total`
    pub fn page_range(&self, page: usize, total: usize) -> Range<usize> {
        let size = self.page_size.max(1);
        let start = page.saturating_sub(1).saturating_mul(size).min(total);
        start..start.saturating_add(size).min(total)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            registers: RegisterTables::default(),
            ip_register: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.page_size, 10_000);
        assert_eq!(config.ip_register, None);
        assert_eq!(config.registers.x86.len(), 22);
        assert_eq!(config.registers.x64.len(), 30);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ip_register": "pc", "page_size": 50}}"#).unwrap();

        let config = ViewerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ip_register.as_deref(), Some("pc"));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.registers, RegisterTables::default(), "registers fall back to defaults");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "page_size = 3").unwrap();
        assert!(ViewerConfig::from_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"page_size": 0}}"#).unwrap();
        assert!(ViewerConfig::from_file(file.path()).is_err(), "zero page size rejected");

        assert!(ViewerConfig::from_file("/nonexistent/tvt.json").is_err());
    }

    #[test]
    fn test_paging() {
        let config = ViewerConfig::new(RegisterTables::default(), None, 10);
        assert_eq!(config.page_count(0), 1);
        assert_eq!(config.page_count(25), 3);
        assert_eq!(config.page_range(1, 25), 0..10);
        assert_eq!(config.page_range(3, 25), 20..25);
        assert_eq!(config.page_range(4, 25), 25..25, "pages past the end are empty");
        assert_eq!(config.page_range(0, 25), 0..10, "page 0 is treated as page 1");
    }
}
