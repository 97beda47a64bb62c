use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{Allocation, ChargeKind, IdempotencyKey, LoanId, TransactionId, TransactionType};

/// immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub loan_id: LoanId,
    /// position in append order, assigned by the ledger
    pub sequence: u64,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub effective_date: NaiveDate,
    pub allocation: Option<Allocation>,
    /// annual rate in force from this draw onwards
    pub rate: Option<Rate>,
    /// transaction this record compensates
    pub reverses: Option<TransactionId>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    fn new(
        loan_id: LoanId,
        transaction_type: TransactionType,
        amount: Money,
        effective_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence: 0,
            transaction_type,
            amount,
            effective_date,
            allocation: None,
            rate: None,
            reverses: None,
            idempotency_key: None,
            created_at,
        }
    }

    pub fn draw(
        loan_id: LoanId,
        amount: Money,
        rate: Rate,
        effective_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(loan_id, TransactionType::Draw, amount, effective_date, created_at);
        tx.rate = Some(rate);
        tx
    }

    pub fn repayment(
        loan_id: LoanId,
        allocation: Allocation,
        effective_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            loan_id,
            TransactionType::Repayment,
            allocation.total(),
            effective_date,
            created_at,
        );
        tx.allocation = Some(allocation);
        tx
    }

    pub fn settlement(
        loan_id: LoanId,
        allocation: Allocation,
        effective_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            loan_id,
            TransactionType::Settlement,
            allocation.total(),
            effective_date,
            created_at,
        );
        tx.allocation = Some(allocation);
        tx
    }

    pub fn charge_payment(
        loan_id: LoanId,
        kind: ChargeKind,
        amount: Money,
        effective_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(loan_id, kind.transaction_type(), amount, effective_date, created_at)
    }

    /// compensating record for `original`; carries the same amount and split
    pub fn reversal_of(
        original: &LedgerTransaction,
        effective_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::new(
            original.loan_id,
            original.transaction_type,
            original.amount,
            effective_date,
            created_at,
        );
        tx.allocation = original.allocation;
        tx.reverses = Some(original.id);
        tx
    }

    /// split used by the balance fold; unallocated payments count as principal
    pub fn effective_allocation(&self) -> Allocation {
        self.allocation
            .unwrap_or_else(|| Allocation::principal_only(self.amount))
    }

    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }
}

/// append-only, ordered transaction log for one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    loan_id: LoanId,
    entries: Vec<LedgerTransaction>,
}

impl Ledger {
    pub fn new(loan_id: LoanId) -> Self {
        Self {
            loan_id,
            entries: Vec::new(),
        }
    }

    pub fn loan_id(&self) -> LoanId {
        self.loan_id
    }

    /// append a record, assigning its sequence number
    pub fn append(&mut self, mut tx: LedgerTransaction) -> Result<&LedgerTransaction> {
        self.check_appendable(&tx)?;
        tx.sequence = self.entries.len() as u64 + 1;
        self.entries.push(tx);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// validate a record without appending it
    pub fn check_appendable(&self, tx: &LedgerTransaction) -> Result<()> {
        if tx.loan_id != self.loan_id {
            return Err(LedgerError::validation(format!(
                "transaction {} belongs to loan {}, not {}",
                tx.id, tx.loan_id, self.loan_id
            )));
        }
        if tx.amount.is_negative() {
            return Err(LedgerError::validation(format!(
                "transaction {} has negative amount {}",
                tx.id, tx.amount
            )));
        }
        if self.entries.iter().any(|e| e.id == tx.id) {
            return Err(LedgerError::validation(format!(
                "transaction {} already recorded",
                tx.id
            )));
        }
        Ok(())
    }

    /// records in append order
    pub fn entries(&self) -> &[LedgerTransaction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: TransactionId) -> Option<&LedgerTransaction> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// records in (effective date, sequence) order
    pub fn ordered(&self) -> Vec<&LedgerTransaction> {
        let mut ordered: Vec<&LedgerTransaction> = self.entries.iter().collect();
        ordered.sort_by_key(|e| (e.effective_date, e.sequence));
        ordered
    }

    /// ordered records that still count, i.e. without reversed records and
    /// the reversals that cancel them
    pub fn effective_entries(&self) -> Vec<&LedgerTransaction> {
        let reversed: HashSet<TransactionId> =
            self.entries.iter().filter_map(|e| e.reverses).collect();

        self.ordered()
            .into_iter()
            .filter(|e| !e.is_reversal() && !reversed.contains(&e.id))
            .collect()
    }

    /// the ledger as it stood once record `sequence` was appended
    pub fn through(&self, sequence: u64) -> Ledger {
        Ledger {
            loan_id: self.loan_id,
            entries: self.entries.iter().filter(|e| e.sequence <= sequence).cloned().collect(),
        }
    }

    /// latest effective date on the ledger, reversals included
    pub fn last_effective_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|e| e.effective_date).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_append_assigns_sequence() {
        let loan_id = Uuid::new_v4();
        let now = Utc::now();
        let mut ledger = Ledger::new(loan_id);

        ledger
            .append(LedgerTransaction::draw(
                loan_id,
                Money::from_major(1_000),
                Rate::from_percent(dec!(5)),
                date(2024, 1, 1),
                now,
            ))
            .unwrap();
        let second = ledger
            .append(LedgerTransaction::repayment(
                loan_id,
                Allocation::split(Money::from_major(100), Money::from_major(4)),
                date(2024, 2, 1),
                now,
            ))
            .unwrap();

        assert_eq!(second.sequence, 2);
        assert_eq!(second.amount, Money::from_major(104));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[1].transaction_type, TransactionType::Repayment);
    }

    #[test]
    fn test_rejects_foreign_and_duplicate_records() {
        let loan_id = Uuid::new_v4();
        let now = Utc::now();
        let mut ledger = Ledger::new(loan_id);

        let foreign = LedgerTransaction::charge_payment(
            Uuid::new_v4(),
            ChargeKind::Fee,
            Money::from_major(10),
            date(2024, 1, 1),
            now,
        );
        assert!(ledger.append(foreign).is_err());

        let fee = LedgerTransaction::charge_payment(
            loan_id,
            ChargeKind::Fee,
            Money::from_major(10),
            date(2024, 1, 1),
            now,
        );
        ledger.append(fee.clone()).unwrap();
        assert!(ledger.append(fee).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_ordering_by_effective_date() {
        let loan_id = Uuid::new_v4();
        let now = Utc::now();
        let mut ledger = Ledger::new(loan_id);

        let later = LedgerTransaction::charge_payment(
            loan_id,
            ChargeKind::Interest,
            Money::from_major(5),
            date(2024, 3, 1),
            now,
        );
        let earlier = LedgerTransaction::draw(
            loan_id,
            Money::from_major(1_000),
            Rate::from_percent(dec!(5)),
            date(2024, 1, 1),
            now,
        );
        ledger.append(later).unwrap();
        ledger.append(earlier).unwrap();

        let ordered = ledger.ordered();
        assert_eq!(ordered[0].transaction_type, TransactionType::Draw);
        assert_eq!(ordered[1].transaction_type, TransactionType::Interest);
        assert_eq!(ledger.last_effective_date(), Some(date(2024, 3, 1)));
    }

    #[test]
    fn test_reversed_pairs_drop_out_of_effective_entries() {
        let loan_id = Uuid::new_v4();
        let now = Utc::now();
        let mut ledger = Ledger::new(loan_id);

        ledger
            .append(LedgerTransaction::draw(
                loan_id,
                Money::from_major(1_000),
                Rate::from_percent(dec!(5)),
                date(2024, 1, 1),
                now,
            ))
            .unwrap();
        let settlement = ledger
            .append(LedgerTransaction::settlement(
                loan_id,
                Allocation::split(Money::from_major(1_000), Money::from_major(20)),
                date(2024, 3, 1),
                now,
            ))
            .unwrap()
            .clone();
        ledger
            .append(LedgerTransaction::reversal_of(&settlement, date(2024, 3, 5), now))
            .unwrap();

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.entries()[2].reverses, Some(settlement.id));
        let effective = ledger.effective_entries();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].transaction_type, TransactionType::Draw);

        let before_reversal = ledger.through(2);
        assert_eq!(before_reversal.loan_id(), loan_id);
        assert_eq!(before_reversal.len(), 2);
        assert_eq!(before_reversal.effective_entries().len(), 2);
        assert_eq!(ledger.through(0).len(), 0);
    }
}
