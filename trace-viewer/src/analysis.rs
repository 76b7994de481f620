//! Whole-trace analyses over a row sequence
//!
//! Each analysis takes the rows it should look at, so it runs equally on the
//! full trace or on a filter result.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Write;
use trace_data::{Bookmark, BookmarkIndex, MemAccessKind, TraceError, TraceRow, TraceStore};

/// How often each instruction pointer value occurs in `rows`
///
/// Sorted by count, highest first; ties by ascending address.
pub fn execution_counts<R: Borrow<TraceRow>>(
    store: &TraceStore,
    rows: &[R],
) -> Result<Vec<(u64, usize)>, TraceError> {
    let name = store.instruction_pointer_name()?;
    let index = store
        .registers
        .index_of(name)
        .ok_or_else(|| TraceError::UnknownRegister(name.to_string()))?;

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for row in rows.iter() {
        let row = Borrow::<TraceRow>::borrow(row);
        let ip = row.regs.get(index).copied().unwrap_or_default();
        *counts.entry(ip).or_default() += 1;
    }

    let mut counts: Vec<(u64, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    tracing::debug!("{} unique addresses in {} rows", counts.len(), rows.len());
    Ok(counts)
}

/// Rows with a memory access inside `addr..=addr + size`
pub fn rows_accessing_range<R: Borrow<TraceRow>>(rows: &[R], addr: u64, size: u64) -> Vec<&TraceRow> {
    let end = addr.saturating_add(size);
    rows.iter()
        .map(|row| Borrow::<TraceRow>::borrow(row))
        .filter(|row| row.mem.iter().any(|m| (addr..=end).contains(&m.addr)))
        .collect()
}

/// Replace the comment of each listed row that accesses memory with a
/// summary of its accesses
///
/// ```text
/// [0x19ff00] -> 0x41 'A' [0x19ff04] <- 0x1000
/// ```
///
/// Returns the number of rows annotated.
pub fn annotate_memory_accesses(store: &mut TraceStore, ids: &[usize]) -> Result<usize, TraceError> {
    store.rows(ids)?;

    let mut annotated = 0;
    for &id in ids {
        let row = store.row(id)?;
        if row.mem.is_empty() {
            continue;
        }
        let mut comment = String::new();
        for access in &row.mem {
            let arrow = match access.access {
                MemAccessKind::Read => "->",
                MemAccessKind::Write => "<-",
            };
            let _ = write!(comment, "[{:#x}] {} {:#x} ", access.addr, arrow, access.value);
            if (0x20..=0x7e).contains(&access.value) {
                let _ = write!(comment, "'{}' ", access.value as u8 as char);
            }
        }
        store.set_comment(id, comment)?;
        annotated += 1;
    }
    tracing::info!("Annotated {} rows with memory accesses", annotated);
    Ok(annotated)
}

/// Bookmark every listed row that writes memory
///
/// Each bookmark covers the single row; its comment lists the written values.
/// Rows that already start a bookmark are left alone. Returns the number of
/// bookmarks added.
pub fn bookmark_memory_writes(store: &mut TraceStore, ids: &[usize]) -> Result<usize, TraceError> {
    let mut added = 0;
    for &id in ids {
        let row = store.row(id)?;
        let values: Vec<String> = row
            .mem
            .iter()
            .filter(|m| m.access == MemAccessKind::Write)
            .map(|m| format!("{:#x}", m.value))
            .collect();
        if values.is_empty() {
            continue;
        }
        let bookmark = Bookmark {
            addr: format!("{:#x}", store.instruction_pointer(id)?),
            disasm: row.disasm.clone(),
            comment: values.join(" "),
            ..Bookmark::new(id, id)
        };
        match store.bookmarks.add(bookmark, false) {
            Ok(_) => added += 1,
            Err(TraceError::BookmarkConflict { startrow }) => {
                tracing::debug!("Row {} is already bookmarked", startrow);
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!("Bookmarked {} memory writes", added);
    Ok(added)
}

/// Bookmark statistics
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkSummary {
    /// Number of bookmarks
    pub total: usize,
    /// Start rows per bookmark address, most bookmarked address first
    pub by_address: Vec<(String, Vec<usize>)>,
    /// Mean range length in rows
    pub average_length: f64,
    /// Longest range in rows
    pub longest: usize,
    /// Shortest range in rows
    pub shortest: usize,
}

/// Summarize a bookmark index, `None` when it is empty
pub fn bookmark_summary(bookmarks: &BookmarkIndex) -> Option<BookmarkSummary> {
    if bookmarks.is_empty() {
        return None;
    }

    let mut by_address: Vec<(String, Vec<usize>)> = Vec::new();
    for bookmark in bookmarks {
        match by_address.iter_mut().find(|(addr, _)| *addr == bookmark.addr) {
            Some((_, rows)) => rows.push(bookmark.startrow),
            None => by_address.push((bookmark.addr.clone(), vec![bookmark.startrow])),
        }
    }
    // stable: equal counts keep first-seen order
    by_address.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let lengths: Vec<usize> = bookmarks.iter().map(|b| b.endrow - b.startrow + 1).collect();
    Some(BookmarkSummary {
        total: bookmarks.len(),
        by_address,
        average_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        longest: lengths.iter().copied().max().unwrap_or_default(),
        shortest: lengths.iter().copied().min().unwrap_or_default(),
    })
}
