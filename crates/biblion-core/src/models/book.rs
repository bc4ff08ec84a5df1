//! Book entity and its creation draft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A book title in the catalog, with its copy inventory.
///
/// `total_copies` and `borrowed_copies` are the stored facts; the number of
/// available copies is always derived from them via [`Book::available_copies`]
/// and never trusted as an independent value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: String,
    pub description: String,
    pub publication_year: i32,
    pub publisher: String,
    /// Total copies owned by the library.
    pub total_copies: u32,
    /// Copies currently out on loan. Always <= total_copies.
    pub borrowed_copies: u32,
    /// Soft-delete flag; inactive books are hidden from listings.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Create a new book from a draft. All copies start available.
    pub fn from_draft(id: impl Into<String>, draft: &BookDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: draft.title.trim().to_string(),
            author: draft.author.trim().to_string(),
            isbn: draft.isbn.trim().to_string(),
            genre: draft.genre.trim().to_string(),
            description: draft.description.clone(),
            publication_year: draft.publication_year,
            publisher: draft.publisher.clone(),
            total_copies: draft.total_copies,
            borrowed_copies: 0,
            is_active: true,
            created_at: now,
        }
    }

    /// Copies available for borrowing: `max(0, total - borrowed)`.
    ///
    /// Recomputed on every call; business decisions must use this, not a
    /// stored column that may have drifted.
    pub fn available_copies(&self) -> u32 {
        self.total_copies.saturating_sub(self.borrowed_copies)
    }

    /// Whether at least one copy can be borrowed right now.
    pub fn is_available(&self) -> bool {
        self.is_active && self.available_copies() > 0
    }

    /// Replace descriptive fields and total copy count from a draft,
    /// preserving identity, borrow state, and creation time.
    pub fn apply_draft(&self, draft: &BookDraft) -> Self {
        Self {
            id: self.id.clone(),
            title: draft.title.trim().to_string(),
            author: draft.author.trim().to_string(),
            isbn: draft.isbn.trim().to_string(),
            genre: draft.genre.trim().to_string(),
            description: draft.description.clone(),
            publication_year: draft.publication_year,
            publisher: draft.publisher.clone(),
            total_copies: draft.total_copies,
            borrowed_copies: self.borrowed_copies,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

/// Input for creating or replacing a book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: String,
    pub description: String,
    pub publication_year: i32,
    pub publisher: String,
    pub total_copies: u32,
}
