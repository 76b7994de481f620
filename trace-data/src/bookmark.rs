//! Bookmarks: labeled, commentable row ranges

use crate::error::TraceError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Labeled range of trace rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bookmark {
    /// Address label of the start row
    pub addr: String,
    /// Disassembly snapshot of the start row
    pub disasm: String,
    /// First row of the range
    pub startrow: usize,
    /// Last row of the range (inclusive)
    pub endrow: usize,
    /// Free-text comment
    pub comment: String,
}

impl Bookmark {
    pub fn new(startrow: usize, endrow: usize) -> Self {
        Self {
            startrow,
            endrow,
            ..Self::default()
        }
    }

    /// Whether `row` falls inside `[startrow, endrow]`
    pub fn contains(&self, row: usize) -> bool {
        self.startrow <= row && row <= self.endrow
    }
}

/// Bookmarks sorted ascending by start row, at most one per start row
///
/// Overlapping ranges with distinct start rows are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkIndex {
    bookmarks: Vec<Bookmark>,
}

impl BookmarkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a bookmark, keeping the index sorted by start row
    ///
    /// When a bookmark already starts at the same row it is overwritten if
    /// `replace` is set, otherwise the insert fails with
    /// [`TraceError::BookmarkConflict`]. Returns the bookmark that was replaced.
    pub fn add(&mut self, bookmark: Bookmark, replace: bool) -> Result<Option<Bookmark>> {
        if bookmark.endrow < bookmark.startrow {
            return Err(TraceError::InvalidBookmark {
                startrow: bookmark.startrow,
                endrow: bookmark.endrow,
            });
        }

        match self.bookmarks.binary_search_by_key(&bookmark.startrow, |b| b.startrow) {
            Ok(pos) if replace => {
                tracing::debug!("Bookmark at {} replaced", bookmark.startrow);
                Ok(Some(std::mem::replace(&mut self.bookmarks[pos], bookmark)))
            }
            Ok(_) => Err(TraceError::BookmarkConflict {
                startrow: bookmark.startrow,
            }),
            Err(pos) => {
                self.bookmarks.insert(pos, bookmark);
                Ok(None)
            }
        }
    }

    /// First bookmark (in start row order) whose range contains `row`
    pub fn lookup(&self, row: usize) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.contains(row))
    }

    /// Remove the bookmark at a position
    pub fn delete(&mut self, index: usize) -> Result<Bookmark> {
        if index >= self.bookmarks.len() {
            return Err(TraceError::IndexOutOfRange {
                index,
                len: self.bookmarks.len(),
            });
        }
        Ok(self.bookmarks.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Bookmark> {
        self.bookmarks.get(index)
    }

    /// Mutable access for editing label, snapshot, comment or end row
    ///
    /// The start row must not be changed through this reference.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut Bookmark> {
        let len = self.bookmarks.len();
        self.bookmarks
            .get_mut(index)
            .ok_or(TraceError::IndexOutOfRange { index, len })
    }

    pub fn clear(&mut self) {
        self.bookmarks.clear();
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bookmark> {
        self.bookmarks.iter()
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.bookmarks
    }
}

impl<'a> IntoIterator for &'a BookmarkIndex {
    type Item = &'a Bookmark;
    type IntoIter = std::slice::Iter<'a, Bookmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.bookmarks.iter()
    }
}
