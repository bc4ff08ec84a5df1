//! Durable store boundary.
//!
//! The store is the source of truth for all entities. The engine validates
//! every capacity/availability decision against it and writes it before
//! touching the in-memory cache.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::Store;
