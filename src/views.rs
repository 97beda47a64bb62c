//! serialization views for route handlers
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::BalanceCalculator;
use crate::decimal::{Money, Rate};
use crate::interest::DayCountBasis;
use crate::state::LoanSnapshot;
use crate::types::{FacilityId, LoanId, LoanStatus, TransactionType};

/// serializable view of a loan and its derived balance
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub facility_id: FacilityId,
    pub reference: String,
    pub status: LoanStatus,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub settled_date: Option<NaiveDate>,
    pub settled_amount: Option<Money>,
    pub financial: FinancialView,
    pub payments: PaymentView,
    pub metadata: MetadataView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FinancialView {
    pub original_principal: Money,
    pub base_rate: Rate,
    pub margin: Rate,
    pub annual_rate: Rate,
    pub arrangement_fee: Money,
    pub outstanding_principal: Money,
    pub unpaid_interest: Money,
    pub unpaid_fees: Money,
    pub total_outstanding: Money,
    pub total_drawn: Money,
    pub as_of: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentView {
    pub total_principal_paid: Money,
    pub total_interest_paid: Money,
    pub total_fees_paid: Money,
    pub last_payment_date: Option<NaiveDate>,
    pub payment_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataView {
    pub day_count_basis: DayCountBasis,
    pub term_days: i64,
    pub transaction_count: usize,
    pub audit_entries: usize,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl LoanView {
    pub fn from_snapshot(snapshot: &LoanSnapshot, as_of: NaiveDate) -> Self {
        let loan = &snapshot.loan;
        let totals = BalanceCalculator::fold(loan, &snapshot.ledger, as_of);
        let balance = BalanceCalculator::calculate(loan, &snapshot.ledger, as_of);

        let payments: Vec<_> = snapshot
            .ledger
            .effective_entries()
            .into_iter()
            .filter(|tx| tx.transaction_type != TransactionType::Draw)
            .filter(|tx| tx.effective_date <= totals.as_of)
            .collect();

        LoanView {
            id: loan.id,
            facility_id: loan.facility_id,
            reference: loan.reference.clone(),
            status: loan.status,
            start_date: loan.start_date,
            due_date: loan.due_date,
            settled_date: loan.settled_date,
            settled_amount: loan.settled_amount,
            financial: FinancialView {
                original_principal: loan.principal,
                base_rate: loan.base_rate,
                margin: loan.margin,
                annual_rate: totals.current_rate,
                arrangement_fee: loan.arrangement_fee,
                outstanding_principal: balance.principal,
                unpaid_interest: balance.interest,
                unpaid_fees: balance.fees,
                total_outstanding: balance.total,
                total_drawn: totals.drawn,
                as_of: balance.as_of,
            },
            payments: PaymentView {
                total_principal_paid: totals.principal_paid,
                total_interest_paid: totals.interest_paid.to_cents(),
                total_fees_paid: totals.fees_paid,
                last_payment_date: payments.last().map(|tx| tx.effective_date),
                payment_count: payments.len() as u32,
            },
            metadata: MetadataView {
                day_count_basis: loan.basis,
                term_days: loan.term_days(),
                transaction_count: snapshot.ledger.len(),
                audit_entries: snapshot.audit.len(),
                version: snapshot.version,
                updated_at: loan.updated_at,
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
