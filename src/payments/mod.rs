pub mod waterfall;

use chrono::NaiveDate;

use crate::balance::Balance;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{Allocation, ChargeKind, IdempotencyKey};

pub use waterfall::{BalanceComponent, PaymentAllocator, PaymentWaterfall};

/// payment request
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Money,
    pub payment_date: NaiveDate,
    /// caller-supplied split; the configured waterfall applies when absent
    pub allocation: Option<Allocation>,
    pub idempotency_key: IdempotencyKey,
}

impl PaymentRequest {
    pub fn new(amount: Money, payment_date: NaiveDate, idempotency_key: IdempotencyKey) -> Self {
        Self {
            amount,
            payment_date,
            allocation: None,
            idempotency_key,
        }
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = Some(allocation);
        self
    }
}

/// stand-alone payment of unpaid interest or fees
#[derive(Debug, Clone, PartialEq)]
pub struct ChargePaymentRequest {
    pub kind: ChargeKind,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub idempotency_key: IdempotencyKey,
}

/// settlement request; the outstanding total is used when no amount is given
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    pub settlement_date: NaiveDate,
    pub amount: Option<Money>,
    pub idempotency_key: IdempotencyKey,
}

impl SettlementRequest {
    pub fn new(settlement_date: NaiveDate, idempotency_key: IdempotencyKey) -> Self {
        Self {
            settlement_date,
            amount: None,
            idempotency_key,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// amounts due on the payment date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentContext {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

impl PaymentContext {
    pub fn from_balance(balance: &Balance) -> Self {
        Self {
            principal: balance.principal,
            interest: balance.interest,
            fees: balance.fees,
        }
    }

    pub fn total_outstanding(&self) -> Money {
        self.principal + self.interest + self.fees
    }

    pub fn due(&self, component: BalanceComponent) -> Money {
        match component {
            BalanceComponent::Principal => self.principal,
            BalanceComponent::Interest => self.interest,
            BalanceComponent::Fees => self.fees,
        }
    }

    /// positive and no larger than what is owed
    pub fn validate_payment(&self, amount: Money) -> Result<()> {
        if !amount.is_positive() {
            return Err(LedgerError::validation(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }

        let outstanding = self.total_outstanding();
        if amount > outstanding {
            return Err(LedgerError::Overpayment {
                outstanding,
                requested: amount,
            });
        }

        Ok(())
    }
}
