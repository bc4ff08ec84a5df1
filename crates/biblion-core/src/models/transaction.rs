//! Borrow/return transaction record.
//!
//! Lifecycle transitions (return, cancel) and all fine math live in the
//! ledger module; this type only carries state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of transaction record.
///
/// Every record is created as BORROW; a return mutates the same record
/// rather than creating a RETURN row. The variant exists because the stored
/// schema keeps a `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Borrow,
    Return,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Borrow => "BORROW",
            TransactionType::Return => "RETURN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BORROW" => Some(TransactionType::Borrow),
            "RETURN" => Some(TransactionType::Return),
            _ => None,
        }
    }
}

/// Stored status of a transaction.
///
/// Only ACTIVE, RETURNED, and CANCELLED are ever written by operations.
/// OVERDUE exists in the stored vocabulary but is a read-time projection of
/// ACTIVE past its due date, surfaced via `Transaction::is_overdue`, never a
/// persisted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Active,
    Returned,
    Overdue,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "ACTIVE",
            TransactionStatus::Returned => "RETURNED",
            TransactionStatus::Overdue => "OVERDUE",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(TransactionStatus::Active),
            "RETURNED" => Some(TransactionStatus::Returned),
            "OVERDUE" => Some(TransactionStatus::Overdue),
            "CANCELLED" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Returned | TransactionStatus::Cancelled)
    }
}

/// One borrow/return record.
///
/// References its book and member by id only; the record never drives the
/// lifecycle of either entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub book_id: String,
    pub member_id: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Set exactly once, by the return transition. Non-null iff RETURNED.
    pub return_date: Option<DateTime<Utc>>,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    /// Cache of the last fine computation, in cents. The authoritative value
    /// is always recomputable from the dates.
    pub fine_cents: i64,
    pub notes: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Read-time overdue projection: an ACTIVE loan past its due date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Active && now > self.due_date
    }

    /// Whether the return transition is permitted.
    pub fn can_be_returned(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Fine in dollars, for display surfaces.
    pub fn fine_amount(&self) -> f64 {
        crate::config::cents_to_dollars(self.fine_cents)
    }
}
