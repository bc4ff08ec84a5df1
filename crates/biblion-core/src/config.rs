//! Centralized configuration constants for the circulation engine.

use std::time::Duration;

/// Loan policy constants.
///
/// These are fixed library policy, not runtime configuration: a 14-day
/// borrowing period and a $1.00/day overdue fine. Fines are tracked as
/// integer cents so daily accrual is exact.
pub struct LoanPolicy;

impl LoanPolicy {
    /// Borrowing period added to the borrow date to produce the due date.
    pub const LOAN_PERIOD_DAYS: i64 = 14;
    /// Overdue fine accrued per whole day past the due date, in cents.
    pub const DAILY_FINE_CENTS: i64 = 100;
    /// Default borrowing capacity for newly registered members.
    pub const DEFAULT_MEMBER_CAPACITY: u32 = 5;
}

/// Durable store configuration.
pub struct StoreConfig;

impl StoreConfig {
    /// Default database filename inside the library data directory.
    pub const DB_FILENAME: &'static str = "library.db";
    /// Bound on how long a store call may wait on a locked database.
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Background resync configuration.
pub struct ResyncConfig;

impl ResyncConfig {
    /// Default interval between periodic full cache rebuilds.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
}

/// Convert a fine in cents to dollars for display surfaces.
pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Convert a stored dollar amount back to cents, rounding to the nearest cent.
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}
