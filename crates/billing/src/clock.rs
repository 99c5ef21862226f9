//! Injectable clock
//!
//! Every "today" comparison in the core goes through this trait so that
//! scans and tests can control the current date.

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current date/time.
pub trait Clock: Send + Sync {
    /// Current calendar date (UTC).
    fn today(&self) -> NaiveDate;

    /// Current instant (UTC). Used for notification de-dup timestamps.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Fixed clock for tests and replay.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now(&self) -> DateTime<Utc> {
        // Midnight of the fixed date keeps de-dup comparisons deterministic.
        DateTime::from_naive_utc_and_offset(
            self.date.and_hms_opt(0, 0, 0).unwrap_or_default(),
            Utc,
        )
    }
}
