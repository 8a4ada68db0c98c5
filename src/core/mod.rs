// Core modules implementing validation, counting, and error modeling.
pub mod error;
pub mod isbn;
pub mod store;
