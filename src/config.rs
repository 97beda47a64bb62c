use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::DayCountBasis;
use crate::types::FacilityId;

/// largest principal, fee or simulated amount accepted on new terms
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000);

/// highest annual rate accepted, as a fraction (1000%)
pub const MAX_ANNUAL_RATE: Decimal = dec!(10);

/// longest loan term in days, roughly a century
pub const MAX_TERM_DAYS: i64 = 36_600;

/// `date` moved forward by `days`, or a validation error when the calendar runs out
pub(crate) fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    date.checked_add_signed(chrono::Duration::days(days))
        .ok_or_else(|| LedgerError::validation(format!("{} days from {} is out of range", days, date)))
}

pub(crate) fn ensure_amount_in_range(label: &str, amount: Money) -> Result<()> {
    if amount.as_decimal() > MAX_AMOUNT {
        return Err(LedgerError::validation(format!(
            "{} {} exceeds the maximum of {}",
            label, amount, MAX_AMOUNT
        )));
    }
    Ok(())
}

/// annual rate within 0 and `MAX_ANNUAL_RATE`
pub(crate) fn ensure_rate_in_range(rate: Rate) -> Result<()> {
    if rate.is_negative() {
        return Err(LedgerError::validation(format!(
            "annual rate must not be negative, got {}",
            rate
        )));
    }
    if rate.as_decimal() > MAX_ANNUAL_RATE {
        return Err(LedgerError::validation(format!(
            "annual rate {} exceeds the maximum of {}",
            rate,
            Rate::from_decimal(MAX_ANNUAL_RATE)
        )));
    }
    Ok(())
}

/// base rate plus margin, checked against the accepted range
pub(crate) fn all_in_rate(base_rate: Rate, margin: Rate) -> Result<Rate> {
    let rate = base_rate
        .as_decimal()
        .checked_add(margin.as_decimal())
        .map(Rate::from_decimal)
        .ok_or_else(|| LedgerError::validation(format!("rate {} + {} is out of range", base_rate, margin)))?;
    ensure_rate_in_range(rate)?;
    Ok(rate)
}

/// due date after start and no more than `MAX_TERM_DAYS` later
pub(crate) fn ensure_term_in_range(start_date: NaiveDate, due_date: NaiveDate) -> Result<()> {
    if due_date <= start_date {
        return Err(LedgerError::validation(format!(
            "due date {} must be after start date {}",
            due_date, start_date
        )));
    }
    let days = (due_date - start_date).num_days();
    if days > MAX_TERM_DAYS {
        return Err(LedgerError::validation(format!(
            "term of {} days exceeds the maximum of {}",
            days, MAX_TERM_DAYS
        )));
    }
    Ok(())
}

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// offset of the reporting timezone; timestamps are truncated to dates here
    pub reporting_utc_offset_minutes: i32,
    /// default split for payments that arrive without one
    pub allocation_policy: AllocationPolicy,
    pub usage_thresholds: UsageThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reporting_utc_offset_minutes: 0,
            allocation_policy: AllocationPolicy::InterestFirst,
            usage_thresholds: UsageThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// parse from json, falling back to defaults for missing fields
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| {
            LedgerError::validation(format!("invalid engine configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.reporting_offset()?;
        self.usage_thresholds.validate()
    }

    pub fn reporting_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.reporting_utc_offset_minutes * 60).ok_or_else(|| {
            LedgerError::validation(format!(
                "reporting offset of {} minutes is out of range",
                self.reporting_utc_offset_minutes
            ))
        })
    }

    /// calendar date of a timestamp in the reporting timezone
    pub fn reporting_date(&self, timestamp: DateTime<Utc>) -> Result<NaiveDate> {
        Ok(timestamp.with_timezone(&self.reporting_offset()?).date_naive())
    }
}

/// default allocation order for payments without an explicit split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// interest due, then fees, then principal
    InterestFirst,
    /// fees, then interest, then principal
    FeesFirst,
    /// principal, then interest, then fees
    PrincipalFirst,
}

/// percentage boundaries for revolving usage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageThresholds {
    pub warning: Decimal,
    pub critical: Decimal,
}

impl Default for UsageThresholds {
    fn default() -> Self {
        Self {
            warning: dec!(70),
            critical: dec!(90),
        }
    }
}

impl UsageThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.warning <= Decimal::ZERO
            || self.warning >= self.critical
            || self.critical >= Decimal::ONE_HUNDRED
        {
            return Err(LedgerError::validation(format!(
                "usage thresholds must satisfy 0 < warning < critical < 100, got {} and {}",
                self.warning, self.critical
            )));
        }
        Ok(())
    }
}

/// terms for drawing down a new loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub facility_id: FacilityId,
    pub reference: String,
    pub principal: Money,
    pub base_rate: Rate,
    pub margin: Rate,
    pub basis: DayCountBasis,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub arrangement_fee: Money,
}

impl LoanTerms {
    pub fn builder() -> LoanTermsBuilder {
        LoanTermsBuilder::new()
    }

    pub fn annual_rate(&self) -> Rate {
        self.base_rate + self.margin
    }

    pub fn term_days(&self) -> i64 {
        (self.due_date - self.start_date).num_days()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(LedgerError::validation(format!(
                "principal must be positive, got {}",
                self.principal
            )));
        }
        ensure_amount_in_range("principal", self.principal)?;
        ensure_term_in_range(self.start_date, self.due_date)?;
        all_in_rate(self.base_rate, self.margin)?;
        if self.arrangement_fee.is_negative() {
            return Err(LedgerError::validation("arrangement fee must not be negative"));
        }
        ensure_amount_in_range("arrangement fee", self.arrangement_fee)
    }
}

/// builder for loan terms
#[derive(Debug, Default)]
pub struct LoanTermsBuilder {
    facility_id: Option<FacilityId>,
    reference: Option<String>,
    principal: Option<Money>,
    base_rate: Option<Rate>,
    margin: Option<Rate>,
    basis: Option<DayCountBasis>,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    term_days: Option<u32>,
    arrangement_fee: Option<Money>,
}

impl LoanTermsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facility(mut self, facility_id: FacilityId) -> Self {
        self.facility_id = Some(facility_id);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn principal(mut self, principal: Money) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn base_rate(mut self, rate: Rate) -> Self {
        self.base_rate = Some(rate);
        self
    }

    pub fn margin(mut self, margin: Rate) -> Self {
        self.margin = Some(margin);
        self
    }

    pub fn basis(mut self, basis: DayCountBasis) -> Self {
        self.basis = Some(basis);
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    /// alternative to `due_date`: term length counted from the start date
    pub fn term_days(mut self, days: u32) -> Self {
        self.term_days = Some(days);
        self
    }

    pub fn arrangement_fee(mut self, fee: Money) -> Self {
        self.arrangement_fee = Some(fee);
        self
    }

    pub fn build(self) -> Result<LoanTerms> {
        let facility_id = self
            .facility_id
            .ok_or_else(|| LedgerError::validation("facility required"))?;
        let principal = self
            .principal
            .ok_or_else(|| LedgerError::validation("principal required"))?;
        let base_rate = self
            .base_rate
            .ok_or_else(|| LedgerError::validation("base rate required"))?;
        let start_date = self
            .start_date
            .ok_or_else(|| LedgerError::validation("start date required"))?;

        let due_date = match (self.due_date, self.term_days) {
            (Some(due), None) => due,
            (None, Some(days)) => add_days(start_date, i64::from(days))?,
            (Some(_), Some(_)) => {
                return Err(LedgerError::validation(
                    "set either a due date or a term, not both",
                ));
            }
            (None, None) => return Err(LedgerError::validation("due date or term required")),
        };

        let reference = self
            .reference
            .unwrap_or_else(|| format!("LN-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).to_uppercase());

        let terms = LoanTerms {
            facility_id,
            reference,
            principal,
            base_rate,
            margin: self.margin.unwrap_or(Rate::ZERO),
            basis: self.basis.unwrap_or_default(),
            start_date,
            due_date,
            arrangement_fee: self.arrangement_fee.unwrap_or(Money::ZERO),
        };
        terms.validate()?;
        Ok(terms)
    }
}

/// new terms applied when a loan is rolled forward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevolveTerms {
    pub effective_date: NaiveDate,
    pub new_due_date: NaiveDate,
    #[serde(default)]
    pub base_rate: Option<Rate>,
    #[serde(default)]
    pub margin: Option<Rate>,
}

impl RevolveTerms {
    pub fn new(effective_date: NaiveDate, new_due_date: NaiveDate) -> Self {
        Self {
            effective_date,
            new_due_date,
            base_rate: None,
            margin: None,
        }
    }

    pub fn with_base_rate(mut self, rate: Rate) -> Self {
        self.base_rate = Some(rate);
        self
    }

    pub fn with_margin(mut self, margin: Rate) -> Self {
        self.margin = Some(margin);
        self
    }
}
