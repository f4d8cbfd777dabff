//! Pagination cursors for the upstream catalog.
//!
//! Both cursors are plain in-memory state owned by a workflow instance; replay
//! rebuilds them by feeding the recorded page sizes and change maps back in.

use std::collections::{BTreeMap, VecDeque};

/// Zero-based page walk over the full show index.
///
/// Iteration ends only on a page with no records; an upstream 404 past the
/// last page arrives here as an empty page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullIndexCursor {
    page: u32,
    pages_fetched: u32,
    exhausted: bool,
}

impl FullIndexCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page to fetch next.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Records the size of the page just fetched. Returns `false` once the
    /// index is exhausted.
    pub fn advance(&mut self, records_on_page: usize) -> bool {
        if self.exhausted {
            return false;
        }
        self.pages_fetched += 1;
        if records_on_page == 0 {
            self.exhausted = true;
            return false;
        }
        self.page += 1;
        true
    }
}

/// Visits each changed show id once, in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalCursor {
    pending: VecDeque<i64>,
    total: usize,
}

impl IncrementalCursor {
    /// `changes` maps external show id to its upstream change timestamp.
    pub fn new(changes: &BTreeMap<i64, i64>) -> Self {
        let pending: VecDeque<i64> = changes.keys().copied().collect();
        Self {
            total: pending.len(),
            pending,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Ids handed out so far.
    pub fn visited(&self) -> usize {
        self.total - self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl Iterator for IncrementalCursor {
    type Item = i64;

    fn next(&mut self) -> Option<Self::Item> {
        self.pending.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}
