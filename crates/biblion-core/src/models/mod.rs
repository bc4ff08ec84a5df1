//! Domain types for the circulation engine.
//!
//! These are plain data types: they carry state and derived projections but
//! never talk to the store. Lifecycle transitions live in the ledger, and
//! all writes flow through the coordinator.

mod book;
mod member;
mod transaction;

pub use book::{Book, BookDraft};
pub use member::{Member, MemberDraft, MemberRole};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
