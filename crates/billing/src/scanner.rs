//! Overdue scanner
//!
//! Periodic batch re-evaluation of every non-terminal subscription against
//! "today": expires subscriptions past their end date, marks overdue ones
//! past their grace window, and queues payment reminders ahead of the next
//! due date. One bad subscription never aborts the pass; its error is
//! logged and counted in the aggregate report.
//!
//! The pass is idempotent: a second run on the same day performs no
//! additional writes and sends no duplicate notifications. Overdue notices
//! only fire when the status actually crosses into overdue, and reminders
//! are de-duplicated through `last_reminder_sent` against the current
//! cycle's anchor.
//!
//! At most one pass runs at a time system-wide: an overlapping tick is
//! skipped, not queued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rebill_shared::{Subscription, TemplateKind};
use tracing::{error, info, warn};

use crate::charges;
use crate::clock::Clock;
use crate::error::BillingResult;
use crate::lifecycle::{self, LifecycleEvent, LifecycleInput};
use crate::notify::NotificationDispatcher;
use crate::store::SubscriptionStore;

/// Default number of days before a due date in which reminders are sent.
pub const DEFAULT_REMINDER_WINDOW_DAYS: i64 = 3;

/// Aggregate result of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub examined: usize,
    pub marked_overdue: usize,
    pub expired: usize,
    pub reminders_sent: usize,
    pub errors: usize,
}

/// Result of asking the scanner to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A pass was already in flight; this tick did nothing.
    Skipped,
    Completed(ScanReport),
}

/// Periodic re-evaluator for all non-terminal subscriptions.
pub struct OverdueScanner {
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    reminder_window_days: i64,
    // Single-flight guard: a tick that cannot take this immediately is dropped.
    scan_lock: tokio::sync::Mutex<()>,
}

impl OverdueScanner {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        reminder_window_days: i64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            reminder_window_days,
            scan_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one scan pass, unless another is still in flight.
    pub async fn run_scan(&self) -> BillingResult<ScanOutcome> {
        let Ok(_guard) = self.scan_lock.try_lock() else {
            warn!("Overdue scan tick skipped: previous pass still running");
            return Ok(ScanOutcome::Skipped);
        };

        let today = self.clock.today();
        let subscriptions = self.store.list_non_terminal().await?;

        let mut report = ScanReport {
            examined: subscriptions.len(),
            ..Default::default()
        };

        for subscription in subscriptions {
            match self.process_one(&subscription).await {
                Ok(processed) => {
                    report.marked_overdue += processed.marked_overdue;
                    report.expired += processed.expired;
                    report.reminders_sent += processed.reminders_sent;
                }
                Err(e) => {
                    error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to process subscription during scan"
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            scan_date = %today,
            examined = report.examined,
            marked_overdue = report.marked_overdue,
            expired = report.expired,
            reminders_sent = report.reminders_sent,
            errors = report.errors,
            "Overdue scan pass complete"
        );
        Ok(ScanOutcome::Completed(report))
    }

    async fn process_one(&self, subscription: &Subscription) -> BillingResult<ScanReport> {
        let today = self.clock.today();
        let plan = self.store.load_plan(subscription.payment_plan_id).await?;
        let mut report = ScanReport::default();

        let transition = lifecycle::evaluate(
            LifecycleInput {
                status: subscription.status,
                today,
                next_payment_date: subscription.next_payment_date,
                grace_period_days: plan.grace_period_days,
                end_date: subscription.end_date,
            },
            LifecycleEvent::ScanTick,
        )?;

        if transition.changed {
            let mut updated = subscription.clone();
            updated.status = transition.to;
            if transition.notification.is_some() {
                updated.last_reminder_sent = Some(self.clock.now());
            }
            self.store.save_subscription(&updated).await?;

            match transition.to {
                rebill_shared::SubscriptionStatus::Overdue => report.marked_overdue += 1,
                rebill_shared::SubscriptionStatus::Expired => report.expired += 1,
                _ => {}
            }

            // Dispatch only after the state change is durable.
            if let Some(kind) = transition.notification {
                let charge = charges::compute_charge(&plan, subscription.next_payment_date, today);
                self.dispatcher
                    .notify(
                        subscription.customer_id,
                        kind,
                        serde_json::json!({
                            "subscription_id": subscription.id,
                            "amount_due": charge.amount_due(),
                            "days_late": charge.days_late,
                            "late_fee": charge.late_fee,
                        }),
                    )
                    .await;
            }
            return Ok(report);
        }

        if self.reminder_due(subscription, today) {
            let mut updated = subscription.clone();
            updated.last_reminder_sent = Some(self.clock.now());
            self.store.save_subscription(&updated).await?;

            self.dispatcher
                .notify(
                    subscription.customer_id,
                    TemplateKind::PaymentReminder,
                    serde_json::json!({
                        "subscription_id": subscription.id,
                        "next_payment_date": subscription.next_payment_date,
                        "amount_due": subscription.total_amount,
                    }),
                )
                .await;
            report.reminders_sent += 1;
        }

        Ok(report)
    }

    /// A reminder is due when today falls inside the window leading up to
    /// the next due date and no reminder has gone out this cycle.
    fn reminder_due(&self, subscription: &Subscription, today: chrono::NaiveDate) -> bool {
        let days_until = (subscription.next_payment_date - today).num_days();
        if days_until < 0 || days_until > self.reminder_window_days {
            return false;
        }

        // The cycle anchor is where the current cycle started; a reminder
        // stamped before it belongs to a previous cycle.
        let anchor: DateTime<Utc> = DateTime::from_naive_utc_and_offset(
            subscription
                .last_payment_date
                .unwrap_or(subscription.start_date)
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default(),
            Utc,
        );

        match subscription.last_reminder_sent {
            None => true,
            Some(sent) => sent < anchor,
        }
    }
}
