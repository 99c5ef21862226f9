//! Billing period arithmetic
//!
//! Pure calendar math for recurring due dates. The month-based cadences
//! (monthly, quarterly, semi-annual, yearly) add calendar months and clamp
//! to the last valid day when the anchor day does not exist in the target
//! month: Jan 31 + 1 month lands on Feb 29 in leap years and Feb 28
//! otherwise, and a Feb 29 anchor advanced by whole years clamps to Feb 28.
//!
//! Everything here is deterministic and side-effect free; the same
//! functions drive both forward projection (next due date) and elapsed
//! cycle counting (late-payment catch-up).

use chrono::{Datelike, Days, Months, NaiveDate};
use rebill_shared::PeriodType;

use crate::error::{BillingError, BillingResult};

/// Advance `anchor` by one billing cycle of `period_count` units of
/// `period_type`.
///
/// Fails with `InvalidPeriod` when `period_count < 1` or the result would
/// overflow the calendar range.
pub fn advance(
    anchor: NaiveDate,
    period_type: PeriodType,
    period_count: i32,
) -> BillingResult<NaiveDate> {
    if period_count < 1 {
        return Err(BillingError::InvalidPeriod(format!(
            "period_count must be >= 1, got {}",
            period_count
        )));
    }
    let count = period_count as u64;

    let next = match period_type {
        PeriodType::Daily => anchor.checked_add_days(Days::new(count)),
        PeriodType::Weekly => anchor.checked_add_days(Days::new(7 * count)),
        PeriodType::Monthly | PeriodType::Quarterly | PeriodType::SemiAnnual | PeriodType::Yearly => {
            let months = period_type
                .months_per_unit()
                .unwrap_or(1)
                .saturating_mul(period_count as u32);
            anchor.checked_add_months(Months::new(months))
        }
    };

    next.ok_or_else(|| {
        BillingError::InvalidPeriod(format!(
            "advancing {} by {} x {} overflows the calendar",
            anchor, period_count, period_type
        ))
    })
}

/// Number of whole billing cycles elapsed between `anchor` and `today`.
///
/// Zero when `today <= anchor` or the first cycle has not completed yet.
pub fn periods_elapsed(
    anchor: NaiveDate,
    period_type: PeriodType,
    period_count: i32,
    today: NaiveDate,
) -> BillingResult<u32> {
    let mut cursor = advance(anchor, period_type, period_count)?;
    let mut elapsed = 0u32;
    while cursor <= today {
        elapsed += 1;
        cursor = advance(cursor, period_type, period_count)?;
    }
    Ok(elapsed)
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = first
        .checked_add_months(Months::new(1))
        .unwrap_or(first);
    next_month.signed_duration_since(first).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn daily_and_weekly_are_plain_day_offsets() {
        assert_eq!(
            advance(d(2024, 3, 1), PeriodType::Daily, 10).unwrap(),
            d(2024, 3, 11)
        );
        assert_eq!(
            advance(d(2024, 3, 1), PeriodType::Weekly, 2).unwrap(),
            d(2024, 3, 15)
        );
    }

    #[test]
    fn month_end_clamps_into_february() {
        // Leap year: Jan 31 -> Feb 29
        assert_eq!(
            advance(d(2024, 1, 31), PeriodType::Monthly, 1).unwrap(),
            d(2024, 2, 29)
        );
        // Non-leap year: Jan 31 -> Feb 28
        assert_eq!(
            advance(d(2025, 1, 31), PeriodType::Monthly, 1).unwrap(),
            d(2025, 2, 28)
        );
    }

    #[test]
    fn leap_day_anchor_clamps_on_yearly_step() {
        assert_eq!(
            advance(d(2024, 2, 29), PeriodType::Yearly, 1).unwrap(),
            d(2025, 2, 28)
        );
    }

    #[test]
    fn quarterly_and_semi_annual_use_month_multiples() {
        assert_eq!(
            advance(d(2024, 1, 15), PeriodType::Quarterly, 1).unwrap(),
            d(2024, 4, 15)
        );
        assert_eq!(
            advance(d(2024, 1, 15), PeriodType::SemiAnnual, 1).unwrap(),
            d(2024, 7, 15)
        );
        assert_eq!(
            advance(d(2024, 8, 31), PeriodType::Quarterly, 1).unwrap(),
            d(2024, 11, 30)
        );
    }

    #[test]
    fn advance_is_strictly_increasing_for_all_types() {
        let anchor = d(2024, 2, 29);
        for period_type in [
            PeriodType::Daily,
            PeriodType::Weekly,
            PeriodType::Monthly,
            PeriodType::Quarterly,
            PeriodType::SemiAnnual,
            PeriodType::Yearly,
        ] {
            for count in [1, 2, 5] {
                let next = advance(anchor, period_type, count).unwrap();
                assert!(next > anchor, "{period_type} x {count} did not advance");
            }
        }
    }

    #[test]
    fn zero_or_negative_count_is_rejected() {
        assert!(matches!(
            advance(d(2024, 1, 1), PeriodType::Monthly, 0),
            Err(BillingError::InvalidPeriod(_))
        ));
        assert!(matches!(
            advance(d(2024, 1, 1), PeriodType::Daily, -3),
            Err(BillingError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn elapsed_periods_count_whole_cycles_only() {
        let anchor = d(2024, 1, 1);
        // 2.5 months into a monthly cycle: 2 whole cycles elapsed.
        assert_eq!(
            periods_elapsed(anchor, PeriodType::Monthly, 1, d(2024, 3, 15)).unwrap(),
            2
        );
        // Same day as anchor: nothing elapsed.
        assert_eq!(
            periods_elapsed(anchor, PeriodType::Monthly, 1, anchor).unwrap(),
            0
        );
        // Exactly one cycle boundary counts as elapsed.
        assert_eq!(
            periods_elapsed(anchor, PeriodType::Monthly, 1, d(2024, 2, 1)).unwrap(),
            1
        );
    }

    #[test]
    fn days_in_month_handles_leap_february() {
        assert_eq!(days_in_month(d(2024, 2, 10)), 29);
        assert_eq!(days_in_month(d(2025, 2, 10)), 28);
        assert_eq!(days_in_month(d(2024, 4, 1)), 30);
        assert_eq!(days_in_month(d(2024, 12, 31)), 31);
    }
}
