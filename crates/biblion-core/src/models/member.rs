//! Member entity, roles, and the registration draft.

use crate::config::LoanPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a library account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Admin,
    Librarian,
    Member,
}

impl MemberRole {
    /// Stable string form used in the `role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "ADMIN",
            MemberRole::Librarian => "LIBRARIAN",
            MemberRole::Member => "MEMBER",
        }
    }

    /// Parse the stored string form. Unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(MemberRole::Admin),
            "LIBRARIAN" => Some(MemberRole::Librarian),
            "MEMBER" => Some(MemberRole::Member),
            _ => None,
        }
    }

    /// Only MEMBER accounts borrow books; staff roles have no loan slots.
    pub fn can_hold_loans(&self) -> bool {
        matches!(self, MemberRole::Member)
    }
}

/// A registered library account.
///
/// `book_capacity` is the maximum number of concurrent active loans and is
/// meaningful only for the MEMBER role (0 for staff). Capacity decisions are
/// never made from this struct alone: the coordinator pairs it with an
/// authoritative active-loan count from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub role: MemberRole,
    pub book_capacity: u32,
    /// Soft-delete flag; inactive accounts cannot authenticate or borrow.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Create a member from a draft.
    ///
    /// Capacity defaults to [`LoanPolicy::DEFAULT_MEMBER_CAPACITY`] for the
    /// MEMBER role and 0 for staff roles unless the draft overrides it.
    pub fn from_draft(id: impl Into<String>, draft: &MemberDraft, now: DateTime<Utc>) -> Self {
        let book_capacity = draft.book_capacity.unwrap_or(match draft.role {
            MemberRole::Member => LoanPolicy::DEFAULT_MEMBER_CAPACITY,
            _ => 0,
        });
        Self {
            id: id.into(),
            username: draft.username.trim().to_string(),
            password: draft.password.clone(),
            full_name: draft.full_name.trim().to_string(),
            email: draft.email.trim().to_string(),
            role: draft.role,
            book_capacity,
            is_active: true,
            created_at: now,
        }
    }

    /// Replace profile fields from a draft, preserving identity, active
    /// flag, and creation time. Capacity is preserved too, unless the role
    /// change crosses the staff/member line, where it resets to the role
    /// default (staff hold no loans). Explicit capacity changes go through
    /// the dedicated capacity operation so they can be checked against loans.
    pub fn apply_draft(&self, draft: &MemberDraft) -> Self {
        let book_capacity = if draft.role.can_hold_loans() == self.role.can_hold_loans() {
            self.book_capacity
        } else if draft.role.can_hold_loans() {
            LoanPolicy::DEFAULT_MEMBER_CAPACITY
        } else {
            0
        };
        Self {
            id: self.id.clone(),
            username: draft.username.trim().to_string(),
            password: draft.password.clone(),
            full_name: draft.full_name.trim().to_string(),
            email: draft.email.trim().to_string(),
            role: draft.role,
            book_capacity,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

/// Input for registering or updating a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDraft {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub role: MemberRole,
    /// Override for the role-based default capacity.
    pub book_capacity: Option<u32>,
}
