//! Purpose: Book operations behind the HTTP surface, independent of any framework.
//! Exports: `Library`, `BookCount`, `parse_batch`.
//! Role: Validates input, drives the counting store, and shapes `{isbn, count}` records.
//! Invariants: Validation completes before any mutation; a rejected batch leaves the store untouched.
//! Invariants: Each operation runs under one store lock, so concurrent updates are never lost.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::isbn::Isbn;
use crate::core::store::CountingStore;

/// Wire record for a single ISBN and its current count.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BookCount {
    pub isbn: Isbn,
    pub count: u64,
}

/// Cloneable handle to one shared counting store.
#[derive(Clone, Debug, Default)]
pub struct Library {
    store: Arc<Mutex<CountingStore>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: CountingStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn get_book(&self, isbn: &str) -> Result<BookCount, Error> {
        let isbn = Isbn::parse(isbn)?;
        let store = self.lock()?;
        let count = store.count(&isbn);
        Ok(BookCount { isbn, count })
    }

    pub fn add_book(&self, isbn: &str) -> Result<BookCount, Error> {
        let isbn = Isbn::parse(isbn)?;
        let mut store = self.lock()?;
        store.add(&isbn);
        let count = store.count(&isbn);
        tracing::debug!(isbn = %isbn, count, "book added");
        Ok(BookCount { isbn, count })
    }

    pub fn remove_book(&self, isbn: &str) -> Result<BookCount, Error> {
        let isbn = Isbn::parse(isbn)?;
        let mut store = self.lock()?;
        store.remove(&isbn);
        let count = store.count(&isbn);
        tracing::debug!(isbn = %isbn, count, "book removed");
        Ok(BookCount { isbn, count })
    }

    pub fn list_books(&self) -> Result<Vec<BookCount>, Error> {
        let store = self.lock()?;
        Ok(store
            .list_all()
            .into_iter()
            .map(|(isbn, count)| BookCount { isbn, count })
            .collect())
    }

    /// Adds every ISBN in `payload` (a JSON array of strings) in input order.
    ///
    /// The whole payload is checked first; any malformed element or invalid
    /// ISBN aborts the batch with no mutation. Each returned record shows the
    /// count right after that occurrence was added, so a duplicated ISBN shows
    /// escalating counts.
    pub fn add_books(&self, payload: &Value) -> Result<Vec<BookCount>, Error> {
        let isbns = match parse_batch(payload) {
            Ok(isbns) => isbns,
            Err(err) => {
                tracing::info!(
                    isbn = err.isbn().unwrap_or_default(),
                    "batch rejected: {}",
                    err.message().unwrap_or("invalid payload")
                );
                return Err(err);
            }
        };
        let mut store = self.lock()?;
        let mut out = Vec::with_capacity(isbns.len());
        for isbn in isbns {
            store.add(&isbn);
            let count = store.count(&isbn);
            out.push(BookCount { isbn, count });
        }
        tracing::debug!(added = out.len(), "batch added");
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, CountingStore>, Error> {
        self.store
            .lock()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("book store lock poisoned"))
    }
}

/// Checks that `payload` is an array of strings, then that every string is an
/// ISBN. Reports the first offender.
pub fn parse_batch(payload: &Value) -> Result<Vec<Isbn>, Error> {
    let Some(items) = payload.as_array() else {
        return Err(Error::new(ErrorKind::MalformedRequest)
            .with_status(400)
            .with_message("request body must be a JSON array of ISBN strings"));
    };

    let mut candidates = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(candidate) => candidates.push(candidate),
            None => {
                return Err(Error::new(ErrorKind::MalformedRequest)
                    .with_status(400)
                    .with_message(format!("element {index} of the request body is not a string")));
            }
        }
    }

    candidates.into_iter().map(Isbn::parse).collect()
}
