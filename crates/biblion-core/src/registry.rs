//! Member registry rules: capacity math and credential checks.
//!
//! These helpers are pure on purpose. The active-loan count they consume
//! must come from the store's transaction table (the coordinator supplies
//! it); a count derived from a cached object graph is unsafe for capacity
//! decisions.

use crate::error::{LibraryError, Result};
use crate::models::{Member, MemberDraft};

/// Remaining borrowing slots: `max(0, capacity - active_loans)`.
pub fn remaining_slots(member: &Member, active_loans: usize) -> usize {
    (member.book_capacity as usize).saturating_sub(active_loans)
}

/// Whether a member may borrow right now, given the authoritative active
/// loan count: MEMBER role, active account, and at least one free slot.
pub fn can_borrow(member: &Member, active_loans: usize) -> bool {
    member.role.can_hold_loans() && member.is_active && remaining_slots(member, active_loans) > 0
}

/// Exact-match credential check against an active account.
pub fn credentials_match(member: &Member, password: &str) -> bool {
    member.is_active && member.password == password
}

/// Validate a member draft before any write.
pub fn validate_draft(draft: &MemberDraft) -> Result<()> {
    if draft.username.trim().is_empty() {
        return Err(LibraryError::validation("username", "must not be empty"));
    }
    if draft.full_name.trim().is_empty() {
        return Err(LibraryError::validation("full_name", "must not be empty"));
    }
    if draft.password.is_empty() {
        return Err(LibraryError::validation("password", "must not be empty"));
    }
    Ok(())
}
