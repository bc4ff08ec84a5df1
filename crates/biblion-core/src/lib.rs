//! Biblion Core - Headless circulation engine for a lending library.
//!
//! This crate keeps a book catalog, a member registry, and a borrow/return
//! transaction ledger consistent across a durable SQLite store and an
//! in-memory cache. It can be used programmatically without any UI layer.
//!
//! Every mutation follows the same protocol: validate against the store,
//! write the store, then update the cache, all under a single write lock.
//! Availability is always derived from the transaction history, never read
//! back from a persisted counter.
//!
//! # Example
//!
//! ```rust,ignore
//! use biblion_library::{BookDraft, LibraryService};
//!
//! #[tokio::main]
//! async fn main() -> biblion_library::Result<()> {
//!     let service = LibraryService::open("/path/to/data")?;
//!
//!     let book = service
//!         .add_book(BookDraft {
//!             title: "Dune".into(),
//!             author: "Frank Herbert".into(),
//!             total_copies: 3,
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Added {} as {}", book.title, book.id);
//!
//!     for hit in service.search_books("dune") {
//!         println!("{}: {} available", hit.id, hit.available_copies());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use cache::LibraryCache;
pub use cancel::{CancellationToken, CancelledError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{LoanPolicy, ResyncConfig, StoreConfig};
pub use error::{LibraryError, Result};
pub use models::{
    Book, BookDraft, Member, MemberDraft, MemberRole, Transaction, TransactionStatus,
    TransactionType,
};
pub use service::LibraryService;
pub use store::{SqliteStore, Store};
