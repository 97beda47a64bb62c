use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::interest::accrued_interest;
use crate::ledger::{Ledger, LedgerTransaction};
use crate::state::Loan;
use crate::types::{LoanStatus, TransactionType};

/// outstanding balance, derived on every query and never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
    pub total: Money,
    pub as_of: NaiveDate,
}

impl Balance {
    /// unpaid components rounded to cents; the total is their exact sum
    pub fn from_totals(totals: &LedgerTotals) -> Self {
        let principal = totals.principal_outstanding().to_cents();
        let interest = totals.interest_unpaid().to_cents();
        let fees = totals.fees_unpaid().to_cents();
        Self {
            principal,
            interest,
            fees,
            total: principal + interest + fees,
            as_of: totals.as_of,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.total.is_zero()
    }
}

/// running sums produced by folding a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub as_of: NaiveDate,
    pub drawn: Money,
    pub principal_paid: Money,
    pub interest_accrued: Money,
    pub interest_paid: Money,
    pub fees_charged: Money,
    pub fees_paid: Money,
    /// rate in force at `as_of`
    pub current_rate: Rate,
}

impl LedgerTotals {
    pub fn principal_outstanding(&self) -> Money {
        (self.drawn - self.principal_paid).non_negative()
    }

    pub fn interest_unpaid(&self) -> Money {
        (self.interest_accrued - self.interest_paid).non_negative()
    }

    pub fn fees_unpaid(&self) -> Money {
        (self.fees_charged - self.fees_paid).non_negative()
    }
}

/// pure fold of a loan's ledger into its outstanding balance
pub struct BalanceCalculator;

impl BalanceCalculator {
    /// settled loans are frozen at their settlement date regardless of `as_of`,
    /// cancelled loans stop accruing at their cancellation date
    pub fn effective_as_of(loan: &Loan, as_of: NaiveDate) -> NaiveDate {
        match loan.status {
            LoanStatus::Settled => loan.settled_date.unwrap_or(as_of),
            LoanStatus::Cancelled => loan.cancelled_date.map_or(as_of, |cancelled| as_of.min(cancelled)),
            LoanStatus::Active => as_of,
        }
    }

    pub fn calculate(loan: &Loan, ledger: &Ledger, as_of: NaiveDate) -> Balance {
        Balance::from_totals(&Self::fold(loan, ledger, as_of))
    }

    /// balance right after `tx` was recorded, on its effective date
    pub fn as_recorded(loan: &Loan, ledger: &Ledger, tx: &LedgerTransaction) -> Balance {
        Balance::from_totals(&Self::accumulate(loan, &ledger.through(tx.sequence), tx.effective_date))
    }

    pub fn fold(loan: &Loan, ledger: &Ledger, as_of: NaiveDate) -> LedgerTotals {
        Self::accumulate(loan, ledger, Self::effective_as_of(loan, as_of))
    }

    /// interest accrues segment by segment on the principal outstanding in
    /// each segment, at the rate set by the latest draw
    fn accumulate(loan: &Loan, ledger: &Ledger, as_of: NaiveDate) -> LedgerTotals {
        let mut totals = LedgerTotals {
            as_of,
            drawn: Money::ZERO,
            principal_paid: Money::ZERO,
            interest_accrued: Money::ZERO,
            interest_paid: Money::ZERO,
            fees_charged: loan.arrangement_fee,
            fees_paid: Money::ZERO,
            current_rate: loan.annual_rate(),
        };

        let mut outstanding = Money::ZERO;
        let mut cursor: Option<NaiveDate> = None;

        for tx in ledger.effective_entries() {
            if tx.effective_date > as_of {
                break;
            }

            if let Some(from) = cursor {
                totals.interest_accrued += accrued_interest(
                    outstanding,
                    totals.current_rate,
                    from,
                    tx.effective_date,
                    loan.basis,
                );
            }
            cursor = Some(tx.effective_date);

            match tx.transaction_type {
                TransactionType::Draw => {
                    totals.drawn += tx.amount;
                    outstanding += tx.amount;
                    if let Some(rate) = tx.rate {
                        totals.current_rate = rate;
                    }
                }
                TransactionType::Repayment | TransactionType::Settlement => {
                    let allocation = tx.effective_allocation();
                    totals.principal_paid += allocation.principal;
                    totals.interest_paid += allocation.interest;
                    totals.fees_paid += allocation.fees;
                    outstanding = (outstanding - allocation.principal).non_negative();
                }
                TransactionType::Interest => totals.interest_paid += tx.amount,
                TransactionType::Fee => totals.fees_paid += tx.amount,
            }
        }

        if let Some(from) = cursor {
            totals.interest_accrued +=
                accrued_interest(outstanding, totals.current_rate, from, as_of, loan.basis);
        }

        totals
    }

    /// principal drawn less principal repaid across the whole ledger,
    /// future-dated records included
    pub fn principal_outstanding(ledger: &Ledger) -> Money {
        let mut outstanding = Money::ZERO;
        for tx in ledger.effective_entries() {
            match tx.transaction_type {
                TransactionType::Draw => outstanding += tx.amount,
                TransactionType::Repayment | TransactionType::Settlement => {
                    outstanding = (outstanding - tx.effective_allocation().principal).non_negative();
                }
                TransactionType::Interest | TransactionType::Fee => {}
            }
        }
        outstanding.to_cents()
    }
}
