//! In-memory cache of the durable store.
//!
//! The cache serves read-only queries and tolerates slight staleness. It is
//! only ever mutated after a successful store write, and `replace_all`
//! rebuilds it wholesale during resync. Capacity and availability decisions
//! never read it; those go to the store.

use crate::models::{Book, Member, Transaction};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// In-memory projection of books, members, and transactions.
///
/// Active entities only for books and members (soft delete evicts); the full
/// transaction history is kept for listings and fine displays.
#[derive(Debug, Default)]
pub struct LibraryCache {
    books: RwLock<HashMap<String, Book>>,
    members: RwLock<HashMap<String, Member>>,
    transactions: RwLock<HashMap<String, Transaction>>,
}

impl LibraryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire cache contents from store state.
    pub fn replace_all(&self, books: Vec<Book>, members: Vec<Member>, transactions: Vec<Transaction>) {
        let book_count = books.len();
        let member_count = members.len();
        let tx_count = transactions.len();

        *self.books.write().expect("cache lock poisoned") =
            books.into_iter().map(|b| (b.id.clone(), b)).collect();
        *self.members.write().expect("cache lock poisoned") =
            members.into_iter().map(|m| (m.id.clone(), m)).collect();
        *self.transactions.write().expect("cache lock poisoned") =
            transactions.into_iter().map(|t| (t.id.clone(), t)).collect();

        debug!(
            books = book_count,
            members = member_count,
            transactions = tx_count,
            "cache replaced from store"
        );
    }

    // Books

    pub fn get_book(&self, id: &str) -> Option<Book> {
        self.books.read().expect("cache lock poisoned").get(id).cloned()
    }

    pub fn books(&self) -> Vec<Book> {
        self.books
            .read()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn upsert_book(&self, book: Book) {
        self.books
            .write()
            .expect("cache lock poisoned")
            .insert(book.id.clone(), book);
    }

    pub fn remove_book(&self, id: &str) {
        self.books.write().expect("cache lock poisoned").remove(id);
    }

    // Members

    pub fn get_member(&self, id: &str) -> Option<Member> {
        self.members
            .read()
            .expect("cache lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn members(&self) -> Vec<Member> {
        self.members
            .read()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn upsert_member(&self, member: Member) {
        self.members
            .write()
            .expect("cache lock poisoned")
            .insert(member.id.clone(), member);
    }

    pub fn remove_member(&self, id: &str) {
        self.members.write().expect("cache lock poisoned").remove(id);
    }

    // Transactions

    pub fn get_transaction(&self, id: &str) -> Option<Transaction> {
        self.transactions
            .read()
            .expect("cache lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions
            .read()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn upsert_transaction(&self, transaction: Transaction) {
        self.transactions
            .write()
            .expect("cache lock poisoned")
            .insert(transaction.id.clone(), transaction);
    }
}
