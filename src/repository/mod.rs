//! Repository layer for the result store.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! against a single SQLite file.

pub mod context;
pub mod conversion;
pub mod models;
pub mod pool;
pub mod util;

pub use context::DbContext;
pub use conversion::{ConversionRepository, ResultUpdate, ValidationUpdate};
pub use pool::{DbError, DbPool};
