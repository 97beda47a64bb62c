use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LoanTerms;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::events::AuditTrail;
use crate::interest::DayCountBasis;
use crate::ledger::Ledger;
use crate::types::{FacilityId, LoanId, LoanStatus, TransactionId};

/// loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub facility_id: FacilityId,
    pub reference: String,

    // terms
    pub principal: Money,
    pub base_rate: Rate,
    pub margin: Rate,
    pub basis: DayCountBasis,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub arrangement_fee: Money,

    // status
    pub status: LoanStatus,
    pub settled_date: Option<NaiveDate>,
    pub settled_amount: Option<Money>,
    pub settlement_transaction_id: Option<TransactionId>,
    #[serde(default)]
    pub cancelled_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// new active loan from validated terms
    pub fn from_terms(terms: &LoanTerms, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            facility_id: terms.facility_id,
            reference: terms.reference.clone(),
            principal: terms.principal,
            base_rate: terms.base_rate,
            margin: terms.margin,
            basis: terms.basis,
            start_date: terms.start_date,
            due_date: terms.due_date,
            arrangement_fee: terms.arrangement_fee,
            status: LoanStatus::Active,
            settled_date: None,
            settled_amount: None,
            settlement_transaction_id: None,
            cancelled_date: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// all-in annual rate
    pub fn annual_rate(&self) -> Rate {
        self.base_rate + self.margin
    }

    /// allocated term in days
    pub fn term_days(&self) -> i64 {
        (self.due_date - self.start_date).num_days().max(0)
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn is_settled(&self) -> bool {
        self.status == LoanStatus::Settled
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == LoanStatus::Cancelled
    }

    /// settlement details are present exactly when the loan is settled
    pub fn check_invariants(&self) -> Result<()> {
        let has_settlement = self.settled_date.is_some()
            && self.settled_amount.is_some()
            && self.settlement_transaction_id.is_some();
        let has_any_settlement = self.settled_date.is_some()
            || self.settled_amount.is_some()
            || self.settlement_transaction_id.is_some();

        let consistent = if self.is_settled() {
            has_settlement
        } else {
            !has_any_settlement
        };
        if !consistent {
            return Err(LedgerError::validation(format!(
                "loan {} is {} but settlement details are {}",
                self.id,
                self.status,
                if has_any_settlement { "present" } else { "missing" }
            )));
        }
        if self.is_cancelled() != self.cancelled_date.is_some() {
            return Err(LedgerError::validation(format!(
                "loan {} is {} but its cancellation date is {}",
                self.id,
                self.status,
                if self.cancelled_date.is_some() { "present" } else { "missing" }
            )));
        }
        if self.due_date <= self.start_date {
            return Err(LedgerError::validation(format!(
                "loan {} due date {} is not after start date {}",
                self.id, self.due_date, self.start_date
            )));
        }
        Ok(())
    }

    pub(crate) fn mark_settled(
        &mut self,
        date: NaiveDate,
        amount: Money,
        transaction_id: TransactionId,
        timestamp: DateTime<Utc>,
    ) {
        self.status = LoanStatus::Settled;
        self.settled_date = Some(date);
        self.settled_amount = Some(amount);
        self.settlement_transaction_id = Some(transaction_id);
        self.updated_at = timestamp;
    }

    pub(crate) fn clear_settlement(&mut self, timestamp: DateTime<Utc>) {
        self.status = LoanStatus::Active;
        self.settled_date = None;
        self.settled_amount = None;
        self.settlement_transaction_id = None;
        self.updated_at = timestamp;
    }

    pub(crate) fn mark_cancelled(&mut self, date: NaiveDate, timestamp: DateTime<Utc>) {
        self.status = LoanStatus::Cancelled;
        self.cancelled_date = Some(date);
        self.updated_at = timestamp;
    }
}

/// consistent read of a loan with its ledger and audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSnapshot {
    pub loan: Loan,
    pub ledger: Ledger,
    pub audit: AuditTrail,
    /// bumped on every committed mutation
    pub version: u64,
}

impl LoanSnapshot {
    pub fn new(loan: Loan) -> Self {
        let ledger = Ledger::new(loan.id);
        Self {
            loan,
            ledger,
            audit: AuditTrail::new(),
            version: 0,
        }
    }

    pub fn loan_id(&self) -> LoanId {
        self.loan.id
    }
}
