//! Billing service orchestration
//!
//! Entry points for the operations that mutate subscriptions: creation,
//! payment recording and cancellation, plus the read-only overdue
//! projection. The service wires the pure calculators and the lifecycle
//! state machine to the storage and notification collaborators.
//!
//! `record_payment` is serialized per subscription through the store's
//! optimistic locking; a lost race is retried here with exponential
//! backoff before `ConcurrentModification` is surfaced to the caller.

use std::sync::Arc;

use chrono::NaiveDate;
use rebill_shared::{Payment, PaymentStatus, Subscription, SubscriptionStatus, TemplateKind};
use rust_decimal::Decimal;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::info;
use uuid::Uuid;

use crate::charges::{self, ChargeBreakdown};
use crate::clock::Clock;
use crate::error::{BillingError, BillingResult};
use crate::lifecycle::{self, LifecycleEvent, LifecycleInput};
use crate::notify::NotificationDispatcher;
use crate::period;
use crate::store::SubscriptionStore;

/// Automatic retries on a lost optimistic-lock race before surfacing.
const CONCURRENT_RETRY_ATTEMPTS: usize = 3;

/// Orchestrates subscription billing operations.
pub struct BillingService {
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
        }
    }

    /// Create a subscription for `customer_id` on `plan_id`, starting at
    /// `start_date`, with status `Pending` until the first payment settles.
    pub async fn create_subscription(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> BillingResult<Subscription> {
        let customer = self.store.load_customer(customer_id).await?;
        let plan = self.store.load_plan(plan_id).await?;

        if !plan.is_active {
            return Err(BillingError::Validation(format!(
                "payment plan {} is not active",
                plan.id
            )));
        }
        charges::validate_plan(&plan)?;
        if let Some(end) = end_date {
            if end <= start_date {
                return Err(BillingError::Validation(
                    "end_date must be after start_date".into(),
                ));
            }
        }

        let today = self.clock.today();
        let charge = charges::compute_charge(&plan, start_date, today);
        let next_payment_date = period::advance(start_date, plan.period_type, plan.period_count)?;

        let subscription = Subscription {
            id: Uuid::new_v4(),
            customer_id: customer.id,
            payment_plan_id: plan.id,
            start_date,
            end_date,
            status: SubscriptionStatus::Pending,
            total_amount: charge.total_amount,
            discount_applied: charge.discount_amount,
            next_payment_date,
            last_payment_date: None,
            last_reminder_sent: None,
            version: 1,
            created_at: self.clock.now(),
        };
        self.store.insert_subscription(&subscription).await?;

        info!(
            subscription_id = %subscription.id,
            customer_id = %customer_id,
            plan_id = %plan_id,
            next_payment_date = %next_payment_date,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Record a settled payment against a subscription.
    ///
    /// Validates the amount against the expected charge (late fee
    /// included), persists the payment, drives the lifecycle to `Active`
    /// and re-anchors `next_payment_date` from the payment date.
    pub async fn record_payment(
        &self,
        subscription_id: Uuid,
        amount: Decimal,
        payment_method: &str,
        transaction_id: &str,
    ) -> BillingResult<Payment> {
        let strategy = ExponentialBackoff::from_millis(25)
            .map(jitter)
            .take(CONCURRENT_RETRY_ATTEMPTS);

        RetryIf::spawn(
            strategy,
            || self.try_record_payment(subscription_id, amount, payment_method, transaction_id),
            |e: &BillingError| e.is_retryable(),
        )
        .await
    }

    async fn try_record_payment(
        &self,
        subscription_id: Uuid,
        amount: Decimal,
        payment_method: &str,
        transaction_id: &str,
    ) -> BillingResult<Payment> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "payment amount must be positive".into(),
            ));
        }
        if transaction_id.trim().is_empty() {
            return Err(BillingError::Validation(
                "transaction_id must not be empty".into(),
            ));
        }

        let subscription = self.store.load_subscription(subscription_id).await?;
        let plan = self.store.load_plan(subscription.payment_plan_id).await?;
        let today = self.clock.today();

        // Rejects terminal subscriptions before anything is written.
        let transition = lifecycle::evaluate(
            LifecycleInput {
                status: subscription.status,
                today,
                next_payment_date: subscription.next_payment_date,
                grace_period_days: plan.grace_period_days,
                end_date: subscription.end_date,
            },
            LifecycleEvent::PaymentSucceeded,
        )?;

        let charge = charges::compute_charge(&plan, subscription.next_payment_date, today);
        let expected = charge.amount_due();
        if amount != expected {
            return Err(BillingError::Validation(format!(
                "payment amount {} does not match expected charge {} (late fee {})",
                amount, expected, charge.late_fee
            )));
        }

        // Re-anchor the cycle on the payment date. The combined save below
        // is the serialization point: version check, duplicate-transaction
        // check and payment insert land atomically, so a rejected retry of
        // an old transaction id cannot move the cycle.
        let mut updated = subscription.clone();
        updated.status = transition.to;
        updated.last_payment_date = Some(today);
        updated.next_payment_date = period::advance(today, plan.period_type, plan.period_count)?;
        updated.total_amount = charge.total_amount;
        updated.discount_applied = charge.discount_amount;

        let payment = Payment {
            id: Uuid::new_v4(),
            subscription_id,
            amount,
            due_date: subscription.next_payment_date,
            payment_date: Some(today),
            status: PaymentStatus::Success,
            transaction_id: transaction_id.to_string(),
            payment_method: payment_method.to_string(),
            late_fee: charge.late_fee,
            notes: None,
            created_at: self.clock.now(),
        };
        self.store
            .save_subscription_with_payment(&updated, &payment)
            .await?;

        info!(
            subscription_id = %subscription_id,
            transaction_id = transaction_id,
            amount = %amount,
            late_fee = %charge.late_fee,
            next_payment_date = %updated.next_payment_date,
            "Payment recorded"
        );

        self.dispatcher
            .notify(
                subscription.customer_id,
                TemplateKind::PaymentSuccess,
                serde_json::json!({
                    "subscription_id": subscription_id,
                    "amount": amount,
                    "next_payment_date": updated.next_payment_date,
                }),
            )
            .await;

        Ok(payment)
    }

    /// Read-only projection of what a subscription owes as of `as_of`
    /// (defaults to today). Mutates nothing.
    pub async fn get_overdue_amount(
        &self,
        subscription_id: Uuid,
        as_of: Option<NaiveDate>,
    ) -> BillingResult<ChargeBreakdown> {
        let subscription = self.store.load_subscription(subscription_id).await?;
        let plan = self.store.load_plan(subscription.payment_plan_id).await?;
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        Ok(charges::compute_charge(
            &plan,
            subscription.next_payment_date,
            as_of,
        ))
    }

    /// Explicitly cancel a subscription. Terminal, retained for audit.
    pub async fn cancel_subscription(&self, subscription_id: Uuid) -> BillingResult<Subscription> {
        let subscription = self.store.load_subscription(subscription_id).await?;
        let plan = self.store.load_plan(subscription.payment_plan_id).await?;

        let transition = lifecycle::evaluate(
            LifecycleInput {
                status: subscription.status,
                today: self.clock.today(),
                next_payment_date: subscription.next_payment_date,
                grace_period_days: plan.grace_period_days,
                end_date: subscription.end_date,
            },
            LifecycleEvent::Cancel,
        )?;

        let mut updated = subscription;
        updated.status = transition.to;
        self.store.save_subscription(&updated).await?;
        updated.version += 1;

        info!(subscription_id = %subscription_id, "Subscription cancelled");
        Ok(updated)
    }
}
