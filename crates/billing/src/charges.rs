//! Charge computation
//!
//! Pure monetary arithmetic for a billing cycle: plan discount, late-fee
//! accrual past the grace window, and mid-cycle proration. All amounts are
//! rounded half-up to 2 decimals at the point of computation and never
//! re-rounded on later reads.
//!
//! Late fees use the flat per-day model: `late_fee_per_day * days_late`,
//! where days late start counting the day after `due_date +
//! grace_period_days`.

use chrono::NaiveDate;
use rebill_shared::PaymentPlan;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::{BillingError, BillingResult};

/// Result of evaluating a plan against a due date and "today".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeBreakdown {
    /// Base amount minus discount.
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    /// Zero until the grace window has fully elapsed.
    pub late_fee: Decimal,
    pub grace_expired: bool,
    /// Whole days past the end of the grace window (0 inside it).
    pub days_late: i64,
}

impl ChargeBreakdown {
    /// Total the customer owes for the cycle, late fee included.
    pub fn amount_due(&self) -> Decimal {
        self.total_amount + self.late_fee
    }
}

/// Round half-up to 2 fractional digits.
fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject plans with out-of-range monetary configuration.
///
/// Period configuration is checked separately by the period calculator.
pub fn validate_plan(plan: &PaymentPlan) -> BillingResult<()> {
    if plan.base_amount <= Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "plan {} base_amount must be positive",
            plan.id
        )));
    }
    if plan.discount_percentage < Decimal::ZERO || plan.discount_percentage > Decimal::from(100) {
        return Err(BillingError::Validation(format!(
            "plan {} discount_percentage must be within [0, 100]",
            plan.id
        )));
    }
    if plan.late_fee_per_day < Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "plan {} late_fee_per_day must not be negative",
            plan.id
        )));
    }
    if plan.grace_period_days < 0 {
        return Err(BillingError::Validation(format!(
            "plan {} grace_period_days must not be negative",
            plan.id
        )));
    }
    Ok(())
}

/// Compute the charge for one billing cycle of `plan` due on `due_date`,
/// evaluated as of `today`.
///
/// Idempotent: identical inputs always produce identical outputs.
pub fn compute_charge(plan: &PaymentPlan, due_date: NaiveDate, today: NaiveDate) -> ChargeBreakdown {
    let discount_amount =
        round_money(plan.base_amount * plan.discount_percentage / Decimal::from(100));
    let total_amount = round_money(plan.base_amount - discount_amount);

    let grace_end = due_date + chrono::Days::new(plan.grace_period_days.max(0) as u64);
    let grace_expired = today > grace_end;
    let days_late = if grace_expired {
        (today - grace_end).num_days()
    } else {
        0
    };
    let late_fee = round_money(plan.late_fee_per_day * Decimal::from(days_late));

    ChargeBreakdown {
        total_amount,
        discount_amount,
        late_fee,
        grace_expired,
        days_late,
    }
}

/// Partial-cycle charge for a subscription starting mid-cycle:
/// `monthly_amount * days_used / days_in_month`, rounded half-up.
pub fn prorated_amount(
    monthly_amount: Decimal,
    days_used: u32,
    days_in_month: u32,
) -> BillingResult<Decimal> {
    if days_in_month == 0 {
        return Err(BillingError::Validation(
            "days_in_month must be positive".into(),
        ));
    }
    if days_used > days_in_month {
        return Err(BillingError::Validation(format!(
            "days_used {} exceeds days_in_month {}",
            days_used, days_in_month
        )));
    }
    Ok(round_money(
        monthly_amount * Decimal::from(days_used) / Decimal::from(days_in_month),
    ))
}
