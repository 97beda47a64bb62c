use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{Allocation, ChargeKind, FacilityId, LoanId, TransactionId};

/// lifecycle events recorded against a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoanEvent {
    Created {
        facility_id: FacilityId,
        principal: Money,
        start_date: NaiveDate,
        due_date: NaiveDate,
    },
    PaymentRecorded {
        transaction_id: TransactionId,
        allocation: Allocation,
        payment_date: NaiveDate,
    },
    ChargePaid {
        transaction_id: TransactionId,
        kind: ChargeKind,
        amount: Money,
    },
    Settled {
        transaction_id: TransactionId,
        settlement_date: NaiveDate,
        settlement_amount: Money,
    },
    SettlementReversed {
        reversed_transaction_id: TransactionId,
        previous_settled_date: NaiveDate,
        previous_settled_amount: Money,
    },
    Cancelled,
    Revolved {
        effective_date: NaiveDate,
        previous_due_date: NaiveDate,
        new_due_date: NaiveDate,
        previous_rate: Rate,
        new_rate: Rate,
    },
}

impl LoanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LoanEvent::Created { .. } => "created",
            LoanEvent::PaymentRecorded { .. } => "payment_recorded",
            LoanEvent::ChargePaid { .. } => "charge_paid",
            LoanEvent::Settled { .. } => "settled",
            LoanEvent::SettlementReversed { .. } => "settlement_reversed",
            LoanEvent::Cancelled => "cancelled",
            LoanEvent::Revolved { .. } => "revolved",
        }
    }
}

/// audit entry with the optional reason supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub loan_id: LoanId,
    pub event: LoanEvent,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(loan_id: LoanId, event: LoanEvent, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            event,
            reason: None,
            recorded_at,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

/// append-only audit trail for one loan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
