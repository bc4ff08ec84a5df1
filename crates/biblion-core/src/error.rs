//! Error types for the Biblion circulation engine.
//!
//! Every rejected mutation surfaces a typed reason; no operation reports a
//! bare failure flag without a cause.

use thiserror::Error;

/// Main error type for the circulation engine.
#[derive(Debug, Error)]
pub enum LibraryError {
    // Input rejected before any write was attempted
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Delete or edit blocked by live references
    #[error("Conflict: {message}")]
    Conflict { message: String },

    // Borrowing limit reached, or capacity set below active loans
    #[error("Capacity error: {message}")]
    Capacity { message: String },

    #[error("No copies available for book {book_id}")]
    NotAvailable { book_id: String },

    #[error("Transaction {transaction_id} is not active and cannot be returned")]
    AlreadyReturned { transaction_id: String },

    #[error("Authentication failed")]
    AuthFailed,

    // Lookup failures
    #[error("Book not found: {book_id}")]
    BookNotFound { book_id: String },

    #[error("Member not found: {member_id}")]
    MemberNotFound { member_id: String },

    #[error("Transaction not found: {transaction_id}")]
    TransactionNotFound { transaction_id: String },

    // Durable store errors: the only class propagated as a hard failure.
    // The coordinator guarantees no cache mutation occurred on this path.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors (database directory creation)
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for circulation engine operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

// Conversion implementations for common error types

impl From<rusqlite::Error> for LibraryError {
    fn from(err: rusqlite::Error) -> Self {
        LibraryError::Persistence {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LibraryError {
    /// Create a validation error with field context.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LibraryError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        LibraryError::Conflict {
            message: message.into(),
        }
    }

    /// Create a capacity error.
    pub fn capacity(message: impl Into<String>) -> Self {
        LibraryError::Capacity {
            message: message.into(),
        }
    }

    /// Check if this error left the engine state untouched.
    ///
    /// All local rejections are checked before any write; persistence
    /// failures abort before the cache is mutated.
    pub fn is_state_preserving(&self) -> bool {
        !matches!(self, LibraryError::Io { .. } | LibraryError::Json { .. })
    }
}
