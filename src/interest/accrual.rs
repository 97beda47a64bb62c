use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::interest::InterestCalculation;

/// day count basis for converting an annual rate into a daily one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayCountBasis {
    /// actual days / 365
    #[default]
    Actual365,
    /// actual days / 360
    Actual360,
}

impl DayCountBasis {
    pub fn basis_days(&self) -> u32 {
        match self {
            DayCountBasis::Actual365 => 365,
            DayCountBasis::Actual360 => 360,
        }
    }
}

/// whole calendar days from `start` to `end`, never negative
pub fn elapsed_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().max(0)
}

/// simple (non-compounding) interest on `principal` between two dates
///
/// Dates must already be truncated in the reporting timezone. A reversed
/// range, a zero or negative rate and a non-positive principal all accrue
/// nothing.
pub fn accrued_interest(
    principal: Money,
    annual_rate: Rate,
    start: NaiveDate,
    end: NaiveDate,
    basis: DayCountBasis,
) -> Money {
    if !annual_rate.is_positive() || !principal.is_positive() {
        return Money::ZERO;
    }

    let days = elapsed_days(start, end);
    if days == 0 {
        return Money::ZERO;
    }

    // multiply before dividing to keep the quotient exact as long as possible
    let interest = principal.as_decimal() * annual_rate.as_decimal() * Decimal::from(days)
        / Decimal::from(basis.basis_days());
    Money::from_decimal(interest)
}

/// engine for accruing interest under one basis
#[derive(Debug, Clone, Copy)]
pub struct AccrualEngine {
    pub basis: DayCountBasis,
}

impl AccrualEngine {
    pub fn new(basis: DayCountBasis) -> Self {
        Self { basis }
    }

    pub fn daily_rate(&self, annual_rate: Rate) -> Rate {
        Rate::from_decimal(annual_rate.as_decimal() / Decimal::from(self.basis.basis_days()))
    }

    pub fn interest(&self, principal: Money, annual_rate: Rate, start: NaiveDate, end: NaiveDate) -> Money {
        accrued_interest(principal, annual_rate, start, end, self.basis)
    }

    /// interest with the inputs that produced it
    pub fn calculate(
        &self,
        principal: Money,
        annual_rate: Rate,
        start: NaiveDate,
        end: NaiveDate,
    ) -> InterestCalculation {
        InterestCalculation {
            interest_amount: self.interest(principal, annual_rate, start, end),
            daily_rate: self.daily_rate(annual_rate),
            days: elapsed_days(start, end),
            principal_base: principal,
            start_date: start,
            end_date: end,
            basis: self.basis,
        }
    }
}
