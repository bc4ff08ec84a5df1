//! Store trait: the persistence boundary consumed by the coordinator.

use crate::error::Result;
use crate::models::{Book, Member, Transaction};

/// Durable store for books, members, and transactions.
///
/// Every call either fully succeeds or fails with a persistence error; the
/// paired loan writes are applied atomically so a failure can never leave a
/// transaction row without its matching copy-count update. All operations
/// are synchronous to match rusqlite's API.
pub trait Store: Send + Sync {
    // Books

    /// Get a book by id, including soft-deleted ones.
    fn get_book(&self, id: &str) -> Result<Option<Book>>;

    /// List all active (non-deleted) books.
    fn list_books(&self) -> Result<Vec<Book>>;

    fn insert_book(&self, book: &Book) -> Result<()>;

    /// Update a book row, rewriting the derived `available_copies` column
    /// from `(total, borrowed)`.
    fn update_book(&self, book: &Book) -> Result<()>;

    /// Mark a book inactive. The row is kept for transaction history.
    fn soft_delete_book(&self, id: &str) -> Result<()>;

    // Members

    /// Get a member by id, including soft-deleted ones.
    fn get_member(&self, id: &str) -> Result<Option<Member>>;

    /// Look up an active member by unique username.
    fn get_member_by_username(&self, username: &str) -> Result<Option<Member>>;

    /// List all active (non-deleted) members.
    fn list_members(&self) -> Result<Vec<Member>>;

    fn insert_member(&self, member: &Member) -> Result<()>;

    fn update_member(&self, member: &Member) -> Result<()>;

    /// Mark a member inactive. The row is kept for transaction history.
    fn soft_delete_member(&self, id: &str) -> Result<()>;

    // Transactions

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>>;

    /// List the full transaction history, newest borrow date first.
    fn list_transactions(&self) -> Result<Vec<Transaction>>;

    fn insert_transaction(&self, transaction: &Transaction) -> Result<()>;

    fn update_transaction(&self, transaction: &Transaction) -> Result<()>;

    // Paired loan writes

    /// Atomically insert a new borrow record and write the book's updated
    /// copy counts.
    fn record_borrow(&self, transaction: &Transaction, book: &Book) -> Result<()>;

    /// Atomically update a closed (returned or cancelled) record and write
    /// the book's updated copy counts.
    fn record_loan_close(&self, transaction: &Transaction, book: &Book) -> Result<()>;

    // Authoritative counts
    //
    // Capacity and availability decisions must use these, never a cached
    // object graph that may be stale.

    /// Number of ACTIVE transactions held by a member.
    fn count_active_loans_for_member(&self, member_id: &str) -> Result<usize>;

    /// Number of ACTIVE transactions referencing a book. At any instant this
    /// equals the book's `borrowed_copies`.
    fn count_active_loans_for_book(&self, book_id: &str) -> Result<usize>;

    // ID counter recovery

    /// Highest numeric id suffix in the books table, soft-deleted included.
    fn max_book_seq(&self) -> Result<u64>;

    /// Highest numeric id suffix in the members table, soft-deleted included.
    fn max_member_seq(&self) -> Result<u64>;

    /// Highest numeric id suffix in the transactions table.
    fn max_transaction_seq(&self) -> Result<u64>;
}
