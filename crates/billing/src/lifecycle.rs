//! Subscription lifecycle state machine
//!
//! Pure transition evaluation for a single subscription. Callers feed in
//! the current status, the relevant dates and an event; the result names
//! the target status and any notification the caller must queue. No I/O
//! happens here; persistence and dispatch belong to the service and the
//! scanner.
//!
//! Transition table:
//!
//! | From            | Event           | To        |
//! |-----------------|-----------------|-----------|
//! | Pending         | payment success | Active    |
//! | Overdue         | payment success | Active    |
//! | Active          | payment success | Active    |
//! | Active/Pending  | tick past grace | Overdue   |
//! | Active/Overdue  | tick past end   | Expired   |
//! | any non-terminal| cancel          | Cancelled |
//!
//! `Cancelled` and `Expired` are terminal; payment and cancel events
//! against them are validation errors.

use chrono::{Days, NaiveDate};
use rebill_shared::{SubscriptionStatus, TemplateKind};

use crate::error::{BillingError, BillingResult};

/// Event driving a lifecycle evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A payment settled successfully.
    PaymentSucceeded,
    /// Periodic re-evaluation against "today".
    ScanTick,
    /// Explicit cancellation requested.
    Cancel,
}

/// Everything the state machine needs to know about one subscription.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleInput {
    pub status: SubscriptionStatus,
    pub today: NaiveDate,
    pub next_payment_date: NaiveDate,
    pub grace_period_days: i32,
    pub end_date: Option<NaiveDate>,
}

/// Outcome of a lifecycle evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: SubscriptionStatus,
    /// False when the evaluation leaves the status as-is (no state churn).
    pub changed: bool,
    /// Notification to queue. Set on every successful payment, and on a
    /// scan tick only when the status actually crossed into overdue.
    pub notification: Option<TemplateKind>,
}

impl Transition {
    fn unchanged(status: SubscriptionStatus) -> Self {
        Self {
            to: status,
            changed: false,
            notification: None,
        }
    }

    fn to(status: SubscriptionStatus, notification: Option<TemplateKind>) -> Self {
        Self {
            to: status,
            changed: true,
            notification,
        }
    }
}

/// Evaluate one event against the subscription's current state.
pub fn evaluate(input: LifecycleInput, event: LifecycleEvent) -> BillingResult<Transition> {
    match event {
        LifecycleEvent::PaymentSucceeded => {
            if input.status.is_terminal() {
                return Err(BillingError::Validation(format!(
                    "cannot record payment on {} subscription",
                    input.status
                )));
            }
            Ok(Transition {
                to: SubscriptionStatus::Active,
                changed: input.status != SubscriptionStatus::Active,
                notification: Some(TemplateKind::PaymentSuccess),
            })
        }
        LifecycleEvent::Cancel => {
            if input.status.is_terminal() {
                return Err(BillingError::Validation(format!(
                    "cannot cancel {} subscription",
                    input.status
                )));
            }
            Ok(Transition::to(SubscriptionStatus::Cancelled, None))
        }
        LifecycleEvent::ScanTick => Ok(evaluate_tick(input)),
    }
}

/// Scan-tick evaluation. Never errors: terminal subscriptions are simply
/// left alone so one bad row cannot abort a scan pass.
fn evaluate_tick(input: LifecycleInput) -> Transition {
    if input.status.is_terminal() {
        return Transition::unchanged(input.status);
    }

    // End-of-life wins over overdue: a subscription past its end date
    // expires instead of accruing late fees.
    if let Some(end_date) = input.end_date {
        if input.today >= end_date
            && matches!(
                input.status,
                SubscriptionStatus::Active | SubscriptionStatus::Overdue
            )
        {
            return Transition::to(SubscriptionStatus::Expired, None);
        }
    }

    let grace_end =
        input.next_payment_date + Days::new(input.grace_period_days.max(0) as u64);
    if input.today > grace_end {
        return match input.status {
            SubscriptionStatus::Active | SubscriptionStatus::Pending => Transition::to(
                SubscriptionStatus::Overdue,
                Some(TemplateKind::OverdueNotice),
            ),
            // Already overdue: nothing new to report.
            _ => Transition::unchanged(input.status),
        };
    }

    Transition::unchanged(input.status)
}
