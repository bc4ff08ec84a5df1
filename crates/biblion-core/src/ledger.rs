//! Transaction lifecycle and fine math.
//!
//! The state machine is small: ACTIVE transitions once to RETURNED (normal
//! flow) or to CANCELLED (administrative). OVERDUE is never a transition;
//! see `Transaction::is_overdue`. Everything here is pure over an injected
//! `now` so fines are re-derivable at any time.

use crate::config::LoanPolicy;
use crate::error::{LibraryError, Result};
use crate::models::{Transaction, TransactionStatus, TransactionType};
use chrono::{DateTime, Duration, Utc};

/// Build a new ACTIVE borrow record. Due date is the borrow instant plus the
/// fixed loan period.
pub fn new_borrow(
    id: impl Into<String>,
    book_id: impl Into<String>,
    member_id: impl Into<String>,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: id.into(),
        book_id: book_id.into(),
        member_id: member_id.into(),
        borrow_date: now,
        due_date: now + Duration::days(LoanPolicy::LOAN_PERIOD_DAYS),
        return_date: None,
        kind: TransactionType::Borrow,
        status: TransactionStatus::Active,
        fine_cents: 0,
        notes: String::new(),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Apply the return transition: ACTIVE -> RETURNED, exactly once.
///
/// Sets the return date, freezes the fine at its value as of `now`, and
/// fails with `AlreadyReturned` for any non-ACTIVE record, leaving it
/// unchanged.
pub fn apply_return(transaction: &mut Transaction, now: DateTime<Utc>) -> Result<()> {
    if !transaction.can_be_returned() {
        return Err(LibraryError::AlreadyReturned {
            transaction_id: transaction.id.clone(),
        });
    }
    transaction.return_date = Some(now);
    transaction.status = TransactionStatus::Returned;
    transaction.fine_cents = fine_cents_between(transaction.due_date, now);
    transaction.updated_at = now;
    Ok(())
}

/// Apply the administrative cancel transition: ACTIVE -> CANCELLED.
///
/// Releases the copy without a return date or fine. Not part of the normal
/// borrow/return flow.
pub fn apply_cancel(transaction: &mut Transaction, now: DateTime<Utc>) -> Result<()> {
    if transaction.status != TransactionStatus::Active {
        return Err(LibraryError::conflict(format!(
            "transaction {} is {} and cannot be cancelled",
            transaction.id,
            transaction.status.as_str()
        )));
    }
    transaction.status = TransactionStatus::Cancelled;
    transaction.fine_cents = 0;
    transaction.updated_at = now;
    Ok(())
}

/// Fine accrued between a due date and an effective end, in cents. One
/// whole day past due accrues one daily rate; never negative.
fn fine_cents_between(due: DateTime<Utc>, effective: DateTime<Utc>) -> i64 {
    let days_over = (effective - due).num_days().max(0);
    days_over * LoanPolicy::DAILY_FINE_CENTS
}

/// Current fine for a transaction, in cents.
///
/// For ACTIVE records this is the running fine as of `now` (monotonic
/// non-decreasing while overdue); for RETURNED records it is fixed at the
/// return date; cancelled records carry no fine.
pub fn calculate_fine_cents(transaction: &Transaction, now: DateTime<Utc>) -> i64 {
    match transaction.status {
        TransactionStatus::Active | TransactionStatus::Overdue => {
            fine_cents_between(transaction.due_date, now)
        }
        TransactionStatus::Returned => transaction
            .return_date
            .map(|r| fine_cents_between(transaction.due_date, r))
            .unwrap_or(transaction.fine_cents),
        TransactionStatus::Cancelled => 0,
    }
}

/// Whole days overdue: `max(0, days_between(due, return ?? now))`.
pub fn days_overdue(transaction: &Transaction, now: DateTime<Utc>) -> i64 {
    let effective = transaction.return_date.unwrap_or(now);
    (effective - transaction.due_date).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day_zero() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_new_borrow_due_in_fourteen_days() {
        let tx = new_borrow("T001", "B001", "M001", day_zero());
        assert_eq!(tx.due_date - tx.borrow_date, Duration::days(14));
        assert_eq!(tx.status, TransactionStatus::Active);
        assert_eq!(tx.fine_cents, 0);
        assert!(tx.return_date.is_none());
    }

    #[test]
    fn test_return_three_days_late_fines_three_dollars() {
        let mut tx = new_borrow("T001", "B001", "M001", day_zero());
        let returned_at = day_zero() + Duration::days(17);
        apply_return(&mut tx, returned_at).unwrap();

        assert_eq!(tx.status, TransactionStatus::Returned);
        assert_eq!(tx.return_date, Some(returned_at));
        assert_eq!(tx.fine_cents, 300);
        assert_eq!(tx.fine_amount(), 3.0);
    }

    #[test]
    fn test_same_day_return_no_fine() {
        let mut tx = new_borrow("T001", "B001", "M001", day_zero());
        apply_return(&mut tx, day_zero() + Duration::hours(2)).unwrap();
        assert_eq!(tx.fine_cents, 0);
    }

    #[test]
    fn test_return_exactly_at_due_date_no_fine() {
        let mut tx = new_borrow("T001", "B001", "M001", day_zero());
        let due = tx.due_date;
        apply_return(&mut tx, due).unwrap();
        assert_eq!(tx.fine_cents, 0);
    }

    #[test]
    fn test_second_return_fails_and_preserves_state() {
        let mut tx = new_borrow("T001", "B001", "M001", day_zero());
        apply_return(&mut tx, day_zero() + Duration::days(17)).unwrap();
        let snapshot = tx.clone();

        let err = apply_return(&mut tx, day_zero() + Duration::days(30)).unwrap_err();
        assert!(matches!(err, LibraryError::AlreadyReturned { .. }));
        assert_eq!(tx, snapshot);
    }

    #[test]
    fn test_running_fine_is_monotonic_while_active() {
        let tx = new_borrow("T001", "B001", "M001", day_zero());
        let mut last = 0;
        for days in 0..30 {
            let fine = calculate_fine_cents(&tx, day_zero() + Duration::days(days));
            assert!(fine >= last, "fine regressed on day {days}");
            last = fine;
        }
        assert_eq!(last, 15 * 100); // day 29 is 15 whole days past day-14 due
    }

    #[test]
    fn test_fine_frozen_after_return() {
        let mut tx = new_borrow("T001", "B001", "M001", day_zero());
        apply_return(&mut tx, day_zero() + Duration::days(17)).unwrap();

        let much_later = day_zero() + Duration::days(365);
        assert_eq!(calculate_fine_cents(&tx, much_later), 300);
    }

    #[test]
    fn test_days_overdue() {
        let tx = new_borrow("T001", "B001", "M001", day_zero());
        assert_eq!(days_overdue(&tx, day_zero() + Duration::days(10)), 0);
        assert_eq!(days_overdue(&tx, day_zero() + Duration::days(17)), 3);

        let mut returned = tx.clone();
        apply_return(&mut returned, day_zero() + Duration::days(20)).unwrap();
        // Frozen at the return date, however late "now" is
        assert_eq!(days_overdue(&returned, day_zero() + Duration::days(99)), 6);
    }

    #[test]
    fn test_cancel_only_from_active() {
        let mut tx = new_borrow("T001", "B001", "M001", day_zero());
        apply_cancel(&mut tx, day_zero() + Duration::days(1)).unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
        assert_eq!(calculate_fine_cents(&tx, day_zero() + Duration::days(99)), 0);

        let err = apply_cancel(&mut tx, day_zero()).unwrap_err();
        assert!(matches!(err, LibraryError::Conflict { .. }));
    }
}
