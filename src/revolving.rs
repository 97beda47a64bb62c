use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::UsageThresholds;
use crate::errors::{LedgerError, Result};
use crate::facility::Facility;
use crate::state::Loan;

/// how much of the revolving period has been consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Available,
    Warning,
    Critical,
    Expired,
}

/// days used against a facility's maximum revolving period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevolvingUsage {
    pub days_used: i64,
    /// zero when the facility sets no maximum
    pub max_period: u32,
    pub days_remaining: i64,
    pub percentage_used: Decimal,
    pub status: UsageStatus,
    pub can_revolve: bool,
}

/// tracks cumulative loan days per facility and gates new terms
#[derive(Debug, Clone, Default)]
pub struct RevolvingTracker {
    thresholds: UsageThresholds,
}

impl RevolvingTracker {
    pub fn new(thresholds: UsageThresholds) -> Self {
        Self { thresholds }
    }

    /// usage figures for `days_used` against `max_period`
    pub fn usage(&self, days_used: i64, max_period: Option<u32>) -> RevolvingUsage {
        let days_used = days_used.max(0);
        let max = max_period.unwrap_or(0);

        let share_used = if max == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(days_used) / Decimal::from(max) * dec!(100)).min(dec!(100))
        };
        let days_remaining = (i64::from(max) - days_used).max(0);
        let exhausted = max > 0 && days_remaining == 0;

        RevolvingUsage {
            days_used,
            max_period: max,
            days_remaining,
            percentage_used: share_used.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            status: self.status_for(share_used, exhausted),
            can_revolve: days_remaining > 0,
        }
    }

    /// thresholds compare against the unrounded share; only a fully used
    /// period is expired
    fn status_for(&self, share_used: Decimal, exhausted: bool) -> UsageStatus {
        if exhausted {
            UsageStatus::Expired
        } else if share_used >= self.thresholds.critical {
            UsageStatus::Critical
        } else if share_used >= self.thresholds.warning {
            UsageStatus::Warning
        } else {
            UsageStatus::Available
        }
    }

    /// allocated term days of every non-cancelled loan on the facility
    pub fn facility_days_used<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> i64 {
        loans
            .into_iter()
            .filter(|loan| !loan.is_cancelled())
            .map(Loan::term_days)
            .sum()
    }

    pub fn facility_usage<'a>(
        &self,
        facility: &Facility,
        loans: impl IntoIterator<Item = &'a Loan>,
    ) -> RevolvingUsage {
        self.usage(Self::facility_days_used(loans), facility.max_revolving_period)
    }

    /// days a loan has actually run, up to settlement or its due date
    pub fn loan_days_elapsed(loan: &Loan, today: NaiveDate) -> i64 {
        let end = today.min(loan.settled_date.or(loan.cancelled_date).unwrap_or(loan.due_date));
        (end - loan.start_date).num_days().max(0)
    }

    pub fn loan_usage(&self, facility: &Facility, loan: &Loan, today: NaiveDate) -> RevolvingUsage {
        self.usage(Self::loan_days_elapsed(loan, today), facility.max_revolving_period)
    }

    /// reject `requested_days` when it does not fit in the facility's remaining period
    pub fn ensure_capacity(
        &self,
        facility: &Facility,
        usage: &RevolvingUsage,
        requested_days: i64,
    ) -> Result<()> {
        if !facility.tracks_revolving_period() || facility.max_revolving_period.is_none() {
            return Ok(());
        }
        if requested_days > usage.days_remaining {
            return Err(LedgerError::RevolvingPeriodExceeded {
                facility_id: facility.id,
                requested: requested_days,
                remaining: usage.days_remaining,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanTerms;
    use crate::decimal::{Money, Rate};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan_on(facility: &Facility, start: NaiveDate, term_days: u32) -> Loan {
        let terms = LoanTerms::builder()
            .facility(facility.id)
            .principal(Money::from_major(100_000))
            .base_rate(Rate::from_percent(dec!(5)))
            .start_date(start)
            .term_days(term_days)
            .build()
            .unwrap();
        Loan::from_terms(&terms, Utc::now())
    }

    #[test]
    fn test_usage_thresholds() {
        let tracker = RevolvingTracker::default();

        let fresh = tracker.usage(0, Some(360));
        assert_eq!(fresh.status, UsageStatus::Available);
        assert_eq!(fresh.days_remaining, 360);

        assert_eq!(tracker.usage(252, Some(360)).status, UsageStatus::Warning);
        assert_eq!(tracker.usage(324, Some(360)).status, UsageStatus::Critical);

        let expired = tracker.usage(400, Some(360));
        assert_eq!(expired.status, UsageStatus::Expired);
        assert_eq!(expired.percentage_used, dec!(100));
        assert_eq!(expired.days_remaining, 0);
        assert!(!expired.can_revolve);
    }

    #[test]
    fn test_last_day_is_not_expired() {
        let usage = RevolvingTracker::default().usage(99_999, Some(100_000));
        assert_eq!(usage.percentage_used, dec!(100.00));
        assert_eq!(usage.days_remaining, 1);
        assert_eq!(usage.status, UsageStatus::Critical);
        assert!(usage.can_revolve);

        let used_up = RevolvingTracker::default().usage(100_000, Some(100_000));
        assert_eq!(used_up.status, UsageStatus::Expired);
        assert!(!used_up.can_revolve);
    }

    #[test]
    fn test_zero_or_missing_max_reports_zero_percent() {
        let tracker = RevolvingTracker::default();

        for max in [Some(0), None] {
            let usage = tracker.usage(120, max);
            assert_eq!(usage.percentage_used, Decimal::ZERO);
            assert_eq!(usage.status, UsageStatus::Available);
            assert_eq!(usage.days_remaining, 0);
            assert!(!usage.can_revolve);
        }
    }

    #[test]
    fn test_facility_usage_nearly_exhausted() {
        let tracker = RevolvingTracker::default();
        let facility = Facility::new("Revolver", Money::from_major(1_000_000)).with_revolving_period(360);
        let loans = vec![
            loan_on(&facility, date(2024, 1, 1), 200),
            loan_on(&facility, date(2024, 3, 1), 150),
        ];

        let usage = tracker.facility_usage(&facility, &loans);
        assert_eq!(usage.days_used, 350);
        assert_eq!(usage.percentage_used, dec!(97.22));
        assert_eq!(usage.status, UsageStatus::Critical);
        assert_eq!(usage.days_remaining, 10);
        assert!(usage.can_revolve);

        assert!(tracker.ensure_capacity(&facility, &usage, 10).is_ok());
        match tracker.ensure_capacity(&facility, &usage, 20) {
            Err(LedgerError::RevolvingPeriodExceeded { requested, remaining, .. }) => {
                assert_eq!(requested, 20);
                assert_eq!(remaining, 10);
            }
            other => panic!("expected revolving period error, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_loans_free_their_days() {
        let facility = Facility::new("Revolver", Money::from_major(1_000_000)).with_revolving_period(360);
        let mut cancelled = loan_on(&facility, date(2024, 1, 1), 200);
        cancelled.mark_cancelled(date(2024, 1, 20), Utc::now());
        let live = loan_on(&facility, date(2024, 1, 1), 100);

        assert_eq!(RevolvingTracker::facility_days_used([&cancelled, &live]), 100);
    }

    #[test]
    fn test_loan_elapsed_days() {
        let facility = Facility::new("Revolver", Money::from_major(1_000_000)).with_revolving_period(360);
        let mut loan = loan_on(&facility, date(2024, 1, 1), 90);

        assert_eq!(RevolvingTracker::loan_days_elapsed(&loan, date(2023, 12, 1)), 0);
        assert_eq!(RevolvingTracker::loan_days_elapsed(&loan, date(2024, 1, 31)), 30);
        assert_eq!(RevolvingTracker::loan_days_elapsed(&loan, date(2024, 12, 31)), 90);

        loan.mark_settled(date(2024, 1, 11), Money::from_major(1), uuid::Uuid::new_v4(), Utc::now());
        assert_eq!(RevolvingTracker::loan_days_elapsed(&loan, date(2024, 12, 31)), 10);
    }

    #[test]
    fn test_untracked_facility_never_gated() {
        let tracker = RevolvingTracker::default();
        let facility = Facility::new("Bridge", Money::from_major(1_000_000));
        let usage = tracker.usage(10_000, facility.max_revolving_period);

        assert!(tracker.ensure_capacity(&facility, &usage, 365).is_ok());
    }
}
