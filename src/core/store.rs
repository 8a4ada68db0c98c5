//! Purpose: In-memory counting map from ISBN to number of held copies.
//! Exports: `CountingStore`.
//! Role: Sole owner of count data; callers supply already-validated `Isbn`s.
//! Invariants: Every present entry has count >= 1; zero-count entries are removed.
//! Invariants: Absence reads as count 0; `remove` on an absent key is a no-op.
//! Notes: Not synchronized; shared use goes through `api::Library`.

use indexmap::IndexMap;

use crate::core::isbn::Isbn;

#[derive(Clone, Debug, Default)]
pub struct CountingStore {
    counts: IndexMap<Isbn, u64>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, isbn: &Isbn) -> bool {
        self.counts.contains_key(isbn)
    }

    pub fn count(&self, isbn: &Isbn) -> u64 {
        self.counts.get(isbn).copied().unwrap_or(0)
    }

    pub fn add(&mut self, isbn: &Isbn) {
        *self.counts.entry(isbn.clone()).or_insert(0) += 1;
    }

    pub fn remove(&mut self, isbn: &Isbn) {
        let Some(count) = self.counts.get_mut(isbn) else {
            return;
        };
        if *count > 1 {
            *count -= 1;
        } else {
            self.counts.shift_remove(isbn);
        }
    }

    /// Snapshot of every tracked entry at call time.
    pub fn list_all(&self) -> Vec<(Isbn, u64)> {
        self.counts
            .iter()
            .map(|(isbn, count)| (isbn.clone(), *count))
            .collect()
    }

    /// Number of distinct ISBNs with count >= 1.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
