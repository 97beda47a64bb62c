pub mod accrual;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};

pub use accrual::{accrued_interest, elapsed_days, AccrualEngine, DayCountBasis};

/// interest calculation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestCalculation {
    pub interest_amount: Money,
    pub daily_rate: Rate,
    pub days: i64,
    pub principal_base: Money,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub basis: DayCountBasis,
}
