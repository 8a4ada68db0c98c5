//! Purpose: Library crate behind the `genbog` binary and its tests.
//! Exports: `core` (ISBN validation, counting store, errors) and `api` (book operations).
//! Role: Keeps HTTP-independent logic testable without a running server.
//! Invariants: No module-level singletons; every store is constructed explicitly.
pub mod api;
pub mod core;
