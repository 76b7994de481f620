//! Viewer session: one open trace plus its filtered view

use crate::config::ViewerConfig;
use crate::query::{find, Direction, FilterError, FindError, FindField, Filter};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use trace_codec::{Format, IcedDisassembler};
use trace_data::{Bookmark, BookmarkIndex, TraceError, TraceRow, TraceStore};

/// Row sequence that row positions, find and listings refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceView {
    /// Every row of the trace
    #[default]
    Full,
    /// Rows kept by the last successful filter
    Filtered,
}

/// An open trace
///
/// The store is replaced wholesale on open and dropped with the session.
/// Filter results are kept as row ids into the store.
#[derive(Debug, Clone)]
pub struct Session {
    config: ViewerConfig,
    path: Option<PathBuf>,
    store: TraceStore,
    filtered: Vec<usize>,
    view: TraceView,
}

impl Session {
    /// Wrap an in-memory store
    pub fn new(mut store: TraceStore, config: ViewerConfig) -> Self {
        if let Some(name) = &config.ip_register {
            store.ip_register = Some(name.clone());
        }
        Self {
            config,
            path: None,
            store,
            filtered: Vec::new(),
            view: TraceView::Full,
        }
    }

    /// Open a trace file of any supported format
    pub fn open(path: impl AsRef<Path>, config: ViewerConfig) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening trace {}", path.display());

        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let store = trace_codec::load(&data, &config.registers, &IcedDisassembler)
            .with_context(|| format!("Failed to load trace {}", path.display()))?;

        let mut session = Self::new(store, config);
        session.path = Some(path.to_path_buf());
        Ok(session)
    }

    /// Write the trace back to the file it was opened from, in native format
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .context("Trace has no file name; use save_as")?;
        self.write_file(path, Format::Native)
    }

    /// Write the trace to `path`
    ///
    /// Saving in native format makes `path` the session's file.
    pub fn save_as(&mut self, path: impl AsRef<Path>, format: Format) -> Result<()> {
        let path = path.as_ref();
        self.write_file(path, format)?;
        if format == Format::Native {
            self.path = Some(path.to_path_buf());
        }
        Ok(())
    }

    fn write_file(&self, path: &Path, format: Format) -> Result<()> {
        anyhow::ensure!(format.is_writable(), "Cannot write {} traces", format);
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        trace_codec::save_to(&self.store, format, &mut writer)
            .with_context(|| format!("Failed to encode trace to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved {} trace to {}", format, path.display());
        Ok(())
    }

    /// File the session reads from and saves to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TraceStore {
        &mut self.store
    }

    /// Row by id in the full trace
    pub fn row(&self, id: usize) -> std::result::Result<&TraceRow, TraceError> {
        self.store.row(id)
    }

    pub fn view(&self) -> TraceView {
        self.view
    }

    /// Select the row sequence that positions refer to
    pub fn set_view(&mut self, view: TraceView) {
        self.view = view;
    }

    /// Ids of the rows kept by the last successful filter
    pub fn filtered_ids(&self) -> &[usize] {
        &self.filtered
    }

    /// Rows of the selected view, in order
    pub fn visible_rows(&self) -> Vec<&TraceRow> {
        match self.view {
            TraceView::Full => self.store.trace.iter().collect(),
            TraceView::Filtered => self
                .filtered
                .iter()
                .filter_map(|&id| self.store.trace.get(id))
                .collect(),
        }
    }

    /// Filter the full trace and switch to the filtered view
    ///
    /// On error the previous filter result and view are kept. Returns the
    /// number of rows kept.
    pub fn filter(&mut self, text: &str) -> std::result::Result<usize, FilterError> {
        let filter = Filter::parse(text, &self.store.registers)?;
        self.filtered = filter
            .apply(self.store.trace.rows(), &self.store.registers)
            .into_iter()
            .map(|row| row.id)
            .collect();
        self.view = TraceView::Filtered;
        tracing::info!(
            "Filter '{}' kept {} of {} rows",
            text,
            self.filtered.len(),
            self.store.row_count()
        );
        Ok(self.filtered.len())
    }

    /// Drop the filter result and show the full trace
    pub fn clear_filter(&mut self) {
        self.filtered.clear();
        self.view = TraceView::Full;
    }

    /// Position in the visible rows of the next match, see [`find`]
    pub fn find(
        &self,
        field: FindField,
        keyword: &str,
        start: usize,
        direction: Direction,
    ) -> std::result::Result<Option<usize>, FindError> {
        find(&self.visible_rows(), field, keyword, start, direction)
    }

    pub fn set_comment(&mut self, id: usize, comment: &str) -> std::result::Result<(), TraceError> {
        self.store.set_comment(id, comment)
    }

    pub fn bookmarks(&self) -> &BookmarkIndex {
        &self.store.bookmarks
    }

    /// Bookmark containing a row
    pub fn bookmark_at(&self, row: usize) -> Option<&Bookmark> {
        self.store.bookmarks.lookup(row)
    }

    pub fn add_bookmark(
        &mut self,
        bookmark: Bookmark,
        replace: bool,
    ) -> std::result::Result<Option<Bookmark>, TraceError> {
        self.store.bookmarks.add(bookmark, replace)
    }

    /// Bookmark rows `startrow..=endrow`, labeled from the start row
    ///
    /// The address is the start row's instruction pointer (empty when the
    /// trace has no pointer register) and the disassembly is copied from it.
    /// Without an explicit comment the start row's comment is used.
    pub fn bookmark_rows(
        &mut self,
        startrow: usize,
        endrow: usize,
        comment: Option<&str>,
        replace: bool,
    ) -> std::result::Result<Bookmark, TraceError> {
        self.store.row(endrow)?;
        let first = self.store.row(startrow)?;
        let addr = match self.store.instruction_pointer(startrow) {
            Ok(ip) => format!("{:#x}", ip),
            Err(TraceError::NoPointerRegister) => String::new(),
            Err(e) => return Err(e),
        };
        let bookmark = Bookmark {
            addr,
            disasm: first.disasm.clone(),
            startrow,
            endrow,
            comment: comment.map_or_else(|| first.comment.clone(), str::to_string),
        };
        self.store.bookmarks.add(bookmark.clone(), replace)?;
        tracing::debug!("Bookmarked rows {}..={}", startrow, endrow);
        Ok(bookmark)
    }

    pub fn delete_bookmark(&mut self, index: usize) -> std::result::Result<Bookmark, TraceError> {
        self.store.bookmarks.delete(index)
    }

    pub fn clear_bookmarks(&mut self) {
        self.store.bookmarks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_codec::CodecError;
    use trace_data::{Arch, RegisterMap};

    fn sample_store() -> TraceStore {
        let registers = RegisterMap::new(["eax", "ebx", "eip"]).unwrap();
        let mut store = TraceStore::new(Arch::X86, 4, registers);
        for i in 0..20u64 {
            let disasm = if i % 5 == 0 { "push eax" } else { "nop" };
            store
                .trace
                .push(TraceRow::new(disasm, vec![0x90], vec![i % 2, i, 0x401000 + i]));
        }
        store
    }

    fn session() -> Session {
        Session::new(sample_store(), ViewerConfig::default())
    }

    #[test]
    fn test_filter_switches_view() {
        let mut session = session();
        assert_eq!(session.view(), TraceView::Full);
        assert_eq!(session.visible_rows().len(), 20);

        assert_eq!(session.filter("disasm=push").unwrap(), 4);
        assert_eq!(session.view(), TraceView::Filtered);
        assert_eq!(session.filtered_ids(), &[0, 5, 10, 15]);
        let visible: Vec<usize> = session.visible_rows().iter().map(|r| r.id).collect();
        assert_eq!(visible, vec![0, 5, 10, 15]);

        session.set_view(TraceView::Full);
        assert_eq!(session.visible_rows().len(), 20, "filter result kept while viewing full trace");
        assert_eq!(session.filtered_ids().len(), 4);

        session.clear_filter();
        assert!(session.filtered_ids().is_empty());
    }

    #[test]
    fn test_failed_filter_keeps_previous_result() {
        let mut session = session();
        session.filter("reg_eax=1").unwrap();
        assert!(matches!(session.filter("bogus=1"), Err(FilterError::UnknownKey(_))));
        assert_eq!(session.filtered_ids().len(), 10);
        assert_eq!(session.view(), TraceView::Filtered);
    }

    #[test]
    fn test_find_uses_visible_positions() {
        let mut session = session();
        assert_eq!(
            session.find(FindField::Disasm, "push", 1, Direction::Forward),
            Ok(Some(5))
        );
        session.filter("disasm=push").unwrap();
        assert_eq!(
            session.find(FindField::Regs, "0xa", 0, Direction::Forward),
            Ok(Some(2)),
            "row 10 is position 2 of the filtered view"
        );
    }

    #[test]
    fn test_comment_and_row_lookup() {
        let mut session = session();
        session.set_comment(3, "here").unwrap();
        assert_eq!(session.row(3).unwrap().comment, "here");
        assert_eq!(
            session.set_comment(20, "x"),
            Err(TraceError::RowNotFound { row: 20, len: 20 })
        );
        assert!(session.row(20).is_err());
    }

    #[test]
    fn test_bookmark_rows() {
        let mut session = session();
        session.set_comment(5, "loop").unwrap();

        let bookmark = session.bookmark_rows(5, 9, None, false).unwrap();
        assert_eq!(bookmark.addr, "0x401005");
        assert_eq!(bookmark.disasm, "push eax");
        assert_eq!(bookmark.comment, "loop", "start row comment is the default");
        assert_eq!(session.bookmark_at(7), Some(&bookmark));
        assert_eq!(session.bookmark_at(10), None);

        assert_eq!(
            session.bookmark_rows(5, 6, Some("again"), false),
            Err(TraceError::BookmarkConflict { startrow: 5 })
        );
        let replaced = session.bookmark_rows(5, 6, Some("again"), true).unwrap();
        assert_eq!(session.bookmarks().len(), 1);
        assert_eq!(session.bookmarks().get(0), Some(&replaced));

        assert!(session.bookmark_rows(18, 25, None, false).is_err(), "end row must exist");
        assert!(matches!(
            session.bookmark_rows(9, 2, None, false),
            Err(TraceError::InvalidBookmark { .. })
        ));

        session.bookmark_rows(0, 1, None, false).unwrap();
        assert_eq!(session.delete_bookmark(0).unwrap().startrow, 0);
        session.clear_bookmarks();
        assert!(session.bookmarks().is_empty());
    }

    #[test]
    fn test_bookmark_without_pointer_register() {
        let registers = RegisterMap::new(["r0"]).unwrap();
        let mut store = TraceStore::new(Arch::Other("toy".into()), 4, registers);
        store.trace.push(TraceRow::new("inc r0", vec![1], vec![1]));
        let mut session = Session::new(store, ViewerConfig::default());
        assert_eq!(session.bookmark_rows(0, 0, None, false).unwrap().addr, "");
    }

    #[test]
    fn test_ip_register_override() {
        let config = ViewerConfig {
            ip_register: Some("ebx".to_string()),
            ..ViewerConfig::default()
        };
        let session = Session::new(sample_store(), config);
        assert_eq!(session.store().instruction_pointer(4).unwrap(), 4);
    }

    #[test]
    fn test_save_and_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.tvt");

        let mut session = session();
        session.set_comment(2, "saved").unwrap();
        session.bookmark_rows(0, 4, Some("prologue"), false).unwrap();
        session.save_as(&path, Format::Native).unwrap();
        assert_eq!(session.path(), Some(path.as_path()));

        let reopened = Session::open(&path, ViewerConfig::default()).unwrap();
        assert_eq!(reopened.store(), session.store());
        assert_eq!(reopened.row(2).unwrap().comment, "saved");

        let json_path = dir.path().join("trace.json");
        session.save_as(&json_path, Format::Json).unwrap();
        assert_eq!(session.path(), Some(path.as_path()), "JSON export keeps the session file");
        let from_json = Session::open(&json_path, ViewerConfig::default()).unwrap();
        assert_eq!(from_json.store(), session.store());
    }

    #[test]
    fn test_save_requires_path() {
        assert!(session().save().is_err());
        let dir = tempfile::tempdir().unwrap();
        let mut session = session();
        assert!(session.save_as(dir.path().join("x.trace32"), Format::Legacy).is_err());
    }

    #[test]
    fn test_open_garbage_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        fs::write(&path, b"GARBAGE DATA").unwrap();

        let err = Session::open(&path, ViewerConfig::default()).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<CodecError>(), Some(CodecError::Format(_))),
            "got {:#}",
            err
        );
        assert!(Session::open(dir.path().join("missing.tvt"), ViewerConfig::default()).is_err());
    }

    #[test]
    fn test_open_empty_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tvt");
        let registers = RegisterMap::new(["eax", "eip"]).unwrap();
        let mut session = Session::new(TraceStore::new(Arch::X86, 4, registers), ViewerConfig::default());
        session.save_as(&path, Format::Native).unwrap();

        let reopened = Session::open(&path, ViewerConfig::default()).unwrap();
        assert_eq!(reopened.store().row_count(), 0);
        assert!(reopened.visible_rows().is_empty());
    }
}
