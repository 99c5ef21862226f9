//! Subscription storage
//!
//! The billing core talks to persistence through `SubscriptionStore`, a
//! narrow interface with per-row optimistic locking. `PgStore` is the
//! production Postgres implementation; `MemoryStore` backs tests.
//!
//! Optimistic concurrency: every subscription row carries a `version`
//! counter. `save_subscription` only applies when the caller's loaded
//! version still matches the row, and bumps it; a mismatch surfaces as
//! `ConcurrentModification` for the caller to retry from a fresh load.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rebill_shared::{Customer, Payment, PaymentPlan, Subscription, SubscriptionStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Durable storage for billing entities.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load_subscription(&self, id: Uuid) -> BillingResult<Subscription>;

    /// Persist a new subscription.
    async fn insert_subscription(&self, subscription: &Subscription) -> BillingResult<()>;

    /// Persist changes to an existing subscription. The row is only
    /// updated if its stored version equals `subscription.version`;
    /// otherwise `ConcurrentModification` is returned.
    async fn save_subscription(&self, subscription: &Subscription) -> BillingResult<()>;

    /// All subscriptions that are not cancelled or expired, for scan passes.
    async fn list_non_terminal(&self) -> BillingResult<Vec<Subscription>>;

    async fn load_plan(&self, id: Uuid) -> BillingResult<PaymentPlan>;

    async fn load_customer(&self, id: Uuid) -> BillingResult<Customer>;

    /// Atomically persist a subscription save together with its payment.
    /// Either both writes land or neither: a stale version surfaces as
    /// `ConcurrentModification` and a reused `transaction_id` as a
    /// validation error (double-charge guard), with the subscription row
    /// left untouched in both cases.
    async fn save_subscription_with_payment(
        &self,
        subscription: &Subscription,
        payment: &Payment,
    ) -> BillingResult<()>;
}

fn payment_insert_error(e: sqlx::Error, transaction_id: &str) -> BillingError {
    let is_duplicate = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if is_duplicate {
        BillingError::Validation(format!("duplicate transaction id {}", transaction_id))
    } else {
        e.into()
    }
}

/// Postgres-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn load_subscription(&self, id: Uuid) -> BillingResult<Subscription> {
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT id, customer_id, payment_plan_id, start_date, end_date, status,
                   total_amount, discount_applied, next_payment_date, last_payment_date,
                   last_reminder_sent, version, created_at
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::NotFound(format!("subscription {}", id)))
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, customer_id, payment_plan_id, start_date, end_date, status,
                 total_amount, discount_applied, next_payment_date, last_payment_date,
                 last_reminder_sent, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.customer_id)
        .bind(subscription.payment_plan_id)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.status)
        .bind(subscription.total_amount)
        .bind(subscription.discount_applied)
        .bind(subscription.next_payment_date)
        .bind(subscription.last_payment_date)
        .bind(subscription.last_reminder_sent)
        .bind(subscription.version)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $3,
                total_amount = $4,
                discount_applied = $5,
                next_payment_date = $6,
                last_payment_date = $7,
                last_reminder_sent = $8,
                end_date = $9,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.version)
        .bind(subscription.status)
        .bind(subscription.total_amount)
        .bind(subscription.discount_applied)
        .bind(subscription.next_payment_date)
        .bind(subscription.last_payment_date)
        .bind(subscription.last_reminder_sent)
        .bind(subscription.end_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::ConcurrentModification(subscription.id));
        }
        Ok(())
    }

    async fn list_non_terminal(&self) -> BillingResult<Vec<Subscription>> {
        let rows: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT id, customer_id, payment_plan_id, start_date, end_date, status,
                   total_amount, discount_applied, next_payment_date, last_payment_date,
                   last_reminder_sent, version, created_at
            FROM subscriptions
            WHERE status NOT IN ('cancelled', 'expired')
            ORDER BY next_payment_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_plan(&self, id: Uuid) -> BillingResult<PaymentPlan> {
        let row: Option<PaymentPlan> = sqlx::query_as(
            r#"
            SELECT id, business_id, plan_name, period_type, period_count, base_amount,
                   discount_percentage, late_fee_per_day, grace_period_days, is_active,
                   created_at
            FROM payment_plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::NotFound(format!("payment plan {}", id)))
    }

    async fn load_customer(&self, id: Uuid) -> BillingResult<Customer> {
        let row: Option<Customer> = sqlx::query_as(
            "SELECT id, business_id, name, phone_number, created_at FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::NotFound(format!("customer {}", id)))
    }

    async fn save_subscription_with_payment(
        &self,
        subscription: &Subscription,
        payment: &Payment,
    ) -> BillingResult<()> {
        // Dropping the transaction without committing rolls the save back.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $3,
                total_amount = $4,
                discount_applied = $5,
                next_payment_date = $6,
                last_payment_date = $7,
                last_reminder_sent = $8,
                end_date = $9,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.version)
        .bind(subscription.status)
        .bind(subscription.total_amount)
        .bind(subscription.discount_applied)
        .bind(subscription.next_payment_date)
        .bind(subscription.last_payment_date)
        .bind(subscription.last_reminder_sent)
        .bind(subscription.end_date)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BillingError::ConcurrentModification(subscription.id));
        }

        sqlx::query(
            r#"
            INSERT INTO payments
                (id, subscription_id, amount, due_date, payment_date, status,
                 transaction_id, payment_method, late_fee, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id)
        .bind(payment.subscription_id)
        .bind(payment.amount)
        .bind(payment.due_date)
        .bind(payment.payment_date)
        .bind(payment.status)
        .bind(&payment.transaction_id)
        .bind(&payment.payment_method)
        .bind(payment.late_fee)
        .bind(payment.notes.as_deref())
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| payment_insert_error(e, &payment.transaction_id))?;

        tx.commit().await?;
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    subscriptions: HashMap<Uuid, Subscription>,
    plans: HashMap<Uuid, PaymentPlan>,
    customers: HashMap<Uuid, Customer>,
    payments: Vec<Payment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plan(&self, plan: PaymentPlan) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.plans.insert(plan.id, plan);
        }
    }

    pub fn add_customer(&self, customer: Customer) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.customers.insert(customer.id, customer);
        }
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.inner
            .lock()
            .map(|inner| inner.payments.clone())
            .unwrap_or_default()
    }

    /// Total saves applied across all subscriptions, for write-churn assertions.
    pub fn total_versions(&self) -> i64 {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .subscriptions
                    .values()
                    .map(|s| s.version as i64)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> BillingResult<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| BillingError::Validation("memory store poisoned".into()))
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn load_subscription(&self, id: Uuid) -> BillingResult<Subscription> {
        self.lock()?
            .subscriptions
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", id)))
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        self.lock()?
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        let mut inner = self.lock()?;
        let existing = inner
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", subscription.id)))?;

        if existing.version != subscription.version {
            return Err(BillingError::ConcurrentModification(subscription.id));
        }
        let mut updated = subscription.clone();
        updated.version += 1;
        *existing = updated;
        Ok(())
    }

    async fn list_non_terminal(&self) -> BillingResult<Vec<Subscription>> {
        let mut rows: Vec<Subscription> = self
            .lock()?
            .subscriptions
            .values()
            .filter(|s| !s.status.is_terminal())
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.next_payment_date);
        Ok(rows)
    }

    async fn load_plan(&self, id: Uuid) -> BillingResult<PaymentPlan> {
        self.lock()?
            .plans
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("payment plan {}", id)))
    }

    async fn load_customer(&self, id: Uuid) -> BillingResult<Customer> {
        self.lock()?
            .customers
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("customer {}", id)))
    }

    async fn save_subscription_with_payment(
        &self,
        subscription: &Subscription,
        payment: &Payment,
    ) -> BillingResult<()> {
        let mut inner = self.lock()?;

        // Both checks run before either write so a rejection leaves the
        // subscription exactly as loaded.
        if inner
            .payments
            .iter()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(BillingError::Validation(format!(
                "duplicate transaction id {}",
                payment.transaction_id
            )));
        }
        let existing = inner
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", subscription.id)))?;
        if existing.version != subscription.version {
            return Err(BillingError::ConcurrentModification(subscription.id));
        }

        let mut updated = subscription.clone();
        updated.version += 1;
        *existing = updated;
        inner.payments.push(payment.clone());
        Ok(())
    }
}
