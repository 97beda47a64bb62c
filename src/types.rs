use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a facility
pub type FacilityId = Uuid;

/// unique identifier for a ledger transaction
pub type TransactionId = Uuid;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// drawn and accruing
    Active,
    /// repaid in full as of a settlement date, balance frozen
    Settled,
    /// voided; the only state a loan may be deleted from
    Cancelled,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Settled => "settled",
            LoanStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ledger transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// principal disbursed
    Draw,
    /// payment split across principal, interest and fees
    Repayment,
    /// stand-alone interest payment
    Interest,
    /// stand-alone fee payment
    Fee,
    /// closing payment, or a roll-forward leg when revolving
    Settlement,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Draw => "draw",
            TransactionType::Repayment => "repayment",
            TransactionType::Interest => "interest",
            TransactionType::Fee => "fee",
            TransactionType::Settlement => "settlement",
        };
        f.write_str(name)
    }
}

/// split of a payment across balance components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Allocation {
    pub principal: Money,
    pub interest: Money,
    #[serde(default)]
    pub fees: Money,
}

impl Allocation {
    pub fn new(principal: Money, interest: Money, fees: Money) -> Self {
        Self {
            principal,
            interest,
            fees,
        }
    }

    /// principal/interest split with no fee component
    pub fn split(principal: Money, interest: Money) -> Self {
        Self::new(principal, interest, Money::ZERO)
    }

    pub fn principal_only(amount: Money) -> Self {
        Self::new(amount, Money::ZERO, Money::ZERO)
    }

    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }

    pub fn has_negative_component(&self) -> bool {
        self.principal.is_negative() || self.interest.is_negative() || self.fees.is_negative()
    }
}

/// stand-alone charge a borrower can pay outside a repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    Interest,
    Fee,
}

impl ChargeKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            ChargeKind::Interest => TransactionType::Interest,
            ChargeKind::Fee => TransactionType::Fee,
        }
    }
}

/// client-supplied token making a financial mutation safe to retry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::validation("idempotency key must not be blank"));
        }
        if trimmed.len() > 128 {
            return Err(LedgerError::validation(
                "idempotency key must be at most 128 characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// fresh random key, for callers that do not retry
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// operation an idempotency key was first used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Payment,
    ChargePayment,
    Settlement,
    Revolve,
}
