use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::events::AuditEntry;
use crate::facility::Facility;
use crate::ledger::LedgerTransaction;
use crate::state::{Loan, LoanSnapshot};
use crate::types::{FacilityId, IdempotencyKey, LoanId, Operation, TransactionId};

/// what an idempotency key was first used for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub loan_id: LoanId,
    pub operation: Operation,
    pub transaction_ids: Vec<TransactionId>,
}

/// one atomic change to a loan: new loan record, appended ledger records,
/// audit entries and the idempotency key that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct LoanMutation {
    pub loan: Loan,
    pub transactions: Vec<LedgerTransaction>,
    pub audit: Vec<AuditEntry>,
    pub idempotency: Option<(IdempotencyKey, Operation)>,
}

impl LoanMutation {
    pub fn new(loan: Loan) -> Self {
        Self {
            loan,
            transactions: Vec::new(),
            audit: Vec::new(),
            idempotency: None,
        }
    }

    pub fn append(mut self, tx: LedgerTransaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn audit(mut self, entry: AuditEntry) -> Self {
        self.audit.push(entry);
        self
    }

    /// tag the appended records with `key` and reserve it for `operation`
    pub fn idempotent(mut self, key: IdempotencyKey, operation: Operation) -> Self {
        for tx in &mut self.transactions {
            tx.idempotency_key = Some(key.clone());
        }
        self.idempotency = Some((key, operation));
        self
    }

    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }
}

/// read-only source of facility definitions
pub trait FacilityDirectory: Send + Sync {
    fn facility(&self, id: FacilityId) -> Result<Facility>;
}

/// persistence for loans, their ledgers and audit trails
pub trait LoanStore: Send + Sync {
    fn insert(&self, snapshot: LoanSnapshot) -> Result<()>;

    /// consistent copy of the loan, ledger, audit trail and version
    fn snapshot(&self, id: LoanId) -> Result<LoanSnapshot>;

    /// apply `mutation` if the stored version still equals `expected_version`;
    /// nothing is written on failure
    fn commit(&self, id: LoanId, expected_version: u64, mutation: LoanMutation) -> Result<LoanSnapshot>;

    /// drop the loan with its ledger, audit trail and idempotency records
    fn remove(&self, id: LoanId, expected_version: u64) -> Result<()>;

    fn facility_snapshots(&self, facility_id: FacilityId) -> Result<Vec<LoanSnapshot>>;

    fn idempotency_record(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>>;
}

/// in-memory store; records lock before idempotency keys
#[derive(Debug, Default)]
pub struct InMemoryLoanStore {
    records: DashMap<LoanId, LoanSnapshot>,
    keys: DashMap<IdempotencyKey, IdempotencyRecord>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn apply(current: &LoanSnapshot, mutation: &LoanMutation) -> Result<LoanSnapshot> {
        if mutation.loan.id != current.loan_id() {
            return Err(LedgerError::validation(format!(
                "mutation for loan {} applied to loan {}",
                mutation.loan.id,
                current.loan_id()
            )));
        }
        mutation.loan.check_invariants()?;

        let mut next = current.clone();
        for tx in &mutation.transactions {
            next.ledger.append(tx.clone())?;
        }
        for entry in &mutation.audit {
            next.audit.record(entry.clone());
        }
        next.loan = mutation.loan.clone();
        next.version = current.version + 1;
        Ok(next)
    }
}

impl LoanStore for InMemoryLoanStore {
    fn insert(&self, snapshot: LoanSnapshot) -> Result<()> {
        snapshot.loan.check_invariants()?;
        match self.records.entry(snapshot.loan_id()) {
            Entry::Occupied(_) => Err(LedgerError::validation(format!(
                "loan {} already exists",
                snapshot.loan_id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
                Ok(())
            }
        }
    }

    fn snapshot(&self, id: LoanId) -> Result<LoanSnapshot> {
        self.records
            .get(&id)
            .map(|record| record.value().clone())
            .ok_or(LedgerError::LoanNotFound { id })
    }

    fn commit(&self, id: LoanId, expected_version: u64, mutation: LoanMutation) -> Result<LoanSnapshot> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(LedgerError::LoanNotFound { id })?;

        if record.version != expected_version {
            return Err(LedgerError::ConcurrentModification {
                loan_id: id,
                expected: expected_version,
                found: record.version,
            });
        }

        let next = Self::apply(&record, &mutation)?;

        if let Some((key, operation)) = &mutation.idempotency {
            match self.keys.entry(key.clone()) {
                Entry::Occupied(_) => {
                    return Err(LedgerError::IdempotencyConflict {
                        key: key.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(IdempotencyRecord {
                        loan_id: id,
                        operation: *operation,
                        transaction_ids: mutation.transaction_ids(),
                    });
                }
            }
        }

        *record = next.clone();
        Ok(next)
    }

    fn remove(&self, id: LoanId, expected_version: u64) -> Result<()> {
        if self
            .records
            .remove_if(&id, |_, record| record.version == expected_version)
            .is_none()
        {
            return match self.records.get(&id) {
                Some(record) => Err(LedgerError::ConcurrentModification {
                    loan_id: id,
                    expected: expected_version,
                    found: record.version,
                }),
                None => Err(LedgerError::LoanNotFound { id }),
            };
        }

        self.keys.retain(|_, record| record.loan_id != id);
        Ok(())
    }

    fn facility_snapshots(&self, facility_id: FacilityId) -> Result<Vec<LoanSnapshot>> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.loan.facility_id == facility_id)
            .map(|record| record.value().clone())
            .collect())
    }

    fn idempotency_record(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        Ok(self.keys.get(key).map(|record| record.value().clone()))
    }
}

/// in-memory facility directory
#[derive(Debug, Default)]
pub struct InMemoryFacilities {
    facilities: DashMap<FacilityId, Facility>,
}

impl InMemoryFacilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// add or replace a facility definition
    pub fn register(&self, facility: Facility) -> FacilityId {
        let id = facility.id;
        self.facilities.insert(id, facility);
        id
    }
}

impl FacilityDirectory for InMemoryFacilities {
    fn facility(&self, id: FacilityId) -> Result<Facility> {
        self.facilities
            .get(&id)
            .map(|facility| facility.value().clone())
            .ok_or(LedgerError::FacilityNotFound { id })
    }
}
