// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Rebill Billing Core
//!
//! Subscription billing engine for per-business customers on recurring
//! payment plans.
//!
//! ## Features
//!
//! - **Period Arithmetic**: Recurring due dates across six cadences with
//!   month-end clamping and leap-year handling
//! - **Charge Computation**: Plan discounts, flat per-day late fees past a
//!   grace window, mid-cycle proration, half-up 2dp rounding
//! - **Lifecycle State Machine**: pending/active/overdue/cancelled/expired
//!   transitions driven by payments and scan ticks
//! - **Overdue Scanner**: idempotent single-flight batch re-evaluation with
//!   reminder and overdue notifications
//! - **Orchestration**: create/record-payment/cancel operations with
//!   optimistic locking and bounded retry

pub mod charges;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod period;
pub mod scanner;
pub mod service;
pub mod store;


// Charges
pub use charges::{compute_charge, prorated_amount, validate_plan, ChargeBreakdown};

// Clock
pub use clock::{Clock, FixedClock, SystemClock};

// Error
pub use error::{BillingError, BillingResult};

// Lifecycle
pub use lifecycle::{evaluate, LifecycleEvent, LifecycleInput, Transition};

// Notify
pub use notify::{
    NotificationDispatcher, NullDispatcher, RecordingDispatcher, SmsConfig, SmsDispatcher,
};

// Period
pub use period::{advance, days_in_month, periods_elapsed};

// Scanner
pub use scanner::{OverdueScanner, ScanOutcome, ScanReport, DEFAULT_REMINDER_WINDOW_DAYS};

// Service
pub use service::BillingService;

// Store
pub use store::{MemoryStore, PgStore, SubscriptionStore};
