//! Purpose: Define the public Rust API boundary for genbog.
//! Exports: Book operations plus the core types they are built from.
//! Role: Single import path for the binary, the server, and tests.
//! Invariants: Store access from outside the crate goes through `Library` or an owned `CountingStore`.

mod library;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::isbn::{ISBN_LEN, Isbn, validate};
pub use crate::core::store::CountingStore;
pub use library::{BookCount, Library, parse_batch};
