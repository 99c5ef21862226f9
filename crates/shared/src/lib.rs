//! Rebill Shared Types
//!
//! Entity model shared between the billing core and the worker:
//! payment plans, subscriptions, payments and their status enums.
//!
//! Entities hold only the identifiers of their parents (no back-references);
//! related rows are resolved through the storage layer.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing cadence unit for a payment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::SemiAnnual => "semi_annual",
            PeriodType::Yearly => "yearly",
        }
    }

    /// Calendar months per single period unit, for the month-based cadences.
    pub fn months_per_unit(&self) -> Option<u32> {
        match self {
            PeriodType::Monthly => Some(1),
            PeriodType::Quarterly => Some(3),
            PeriodType::SemiAnnual => Some(6),
            PeriodType::Yearly => Some(12),
            PeriodType::Daily | PeriodType::Weekly => None,
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription status.
///
/// `Cancelled` and `Expired` are terminal: a subscription is never deleted,
/// only transitioned into one of these and retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Overdue,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Overdue => "overdue",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment settlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// Notification template kinds the core can ask the dispatcher to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    PaymentReminder,
    OverdueNotice,
    PaymentSuccess,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::PaymentReminder => "payment_reminder",
            TemplateKind::OverdueNotice => "overdue_notice",
            TemplateKind::PaymentSuccess => "payment_success",
        }
    }
}

/// A business's recurring payment plan.
///
/// Referenced by subscriptions, owned by exactly one business.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentPlan {
    pub id: Uuid,
    pub business_id: Uuid,
    pub plan_name: String,
    pub period_type: PeriodType,
    /// Number of period units per billing cycle (>= 1).
    pub period_count: i32,
    /// Base charge per cycle in the tenant currency, 2 fractional digits.
    pub base_amount: Decimal,
    /// Percentage in [0, 100].
    pub discount_percentage: Decimal,
    /// Flat amount accrued per day past the grace window.
    pub late_fee_per_day: Decimal,
    pub grace_period_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A customer's subscription to a payment plan.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub payment_plan_id: Uuid,
    pub start_date: NaiveDate,
    /// Open-ended when absent.
    pub end_date: Option<NaiveDate>,
    pub status: SubscriptionStatus,
    /// Base minus discount, computed once per billing cycle.
    pub total_amount: Decimal,
    pub discount_applied: Decimal,
    pub next_payment_date: NaiveDate,
    pub last_payment_date: Option<NaiveDate>,
    /// De-duplication anchor for reminder/overdue notifications.
    pub last_reminder_sent: Option<DateTime<Utc>>,
    /// Optimistic-lock counter, bumped by every save.
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// A single payment against a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    /// Unset until the payment settles.
    pub payment_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub payment_method: String,
    pub late_fee: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A business's customer, the target of notifications.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}
