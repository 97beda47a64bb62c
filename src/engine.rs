use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::balance::{Balance, BalanceCalculator};
use crate::config::{ensure_rate_in_range, EngineConfig, LoanTerms, RevolveTerms};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::AuditEntry;
use crate::facility::{Facility, FacilityUtilization};
use crate::ledger::LedgerTransaction;
use crate::lifecycle;
use crate::payments::{ChargePaymentRequest, PaymentAllocator, PaymentRequest, SettlementRequest};
use crate::revolving::{RevolvingTracker, RevolvingUsage};
use crate::simulator::{LoanEconomics, Scenario, ScenarioResult, SimulationInput, WhatIfSimulator};
use crate::state::{Loan, LoanSnapshot};
use crate::store::{
    FacilityDirectory, IdempotencyRecord, InMemoryFacilities, InMemoryLoanStore, LoanStore,
};
use crate::types::{FacilityId, IdempotencyKey, LoanId, Operation, TransactionId};
use crate::views::LoanView;

/// what to measure revolving usage for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum UsageTarget {
    Facility(FacilityId),
    Loan(LoanId),
}

/// result of a repayment or charge payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub transaction: LedgerTransaction,
    /// balance on the payment date once the payment is applied
    pub balance: Balance,
    /// true when the idempotency key had already been processed
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub loan: Loan,
    pub transaction: LedgerTransaction,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevolveOutcome {
    pub loan: Loan,
    /// the payoff settlement followed by the re-advance draw
    pub transactions: Vec<LedgerTransaction>,
    pub replayed: bool,
}

/// loan ledger engine
///
/// Every mutation reads one snapshot of the loan, validates against it and
/// commits with the version it read. Balances are recomputed from the
/// ledger on every query.
pub struct LedgerEngine<S: LoanStore, F: FacilityDirectory> {
    store: S,
    facilities: F,
    config: EngineConfig,
    allocator: PaymentAllocator,
    tracker: RevolvingTracker,
    time: SafeTimeProvider,
    facility_guards: DashMap<FacilityId, Arc<Mutex<()>>>,
}

impl LedgerEngine<InMemoryLoanStore, InMemoryFacilities> {
    /// engine over the in-memory store and facility directory
    pub fn in_memory(config: EngineConfig, time: SafeTimeProvider) -> Result<Self> {
        Self::new(InMemoryLoanStore::new(), InMemoryFacilities::new(), config, time)
    }
}

impl<S: LoanStore, F: FacilityDirectory> LedgerEngine<S, F> {
    pub fn new(store: S, facilities: F, config: EngineConfig, time: SafeTimeProvider) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            facilities,
            allocator: PaymentAllocator::for_policy(config.allocation_policy),
            tracker: RevolvingTracker::new(config.usage_thresholds),
            config,
            time,
            facility_guards: DashMap::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn facilities(&self) -> &F {
        &self.facilities
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }

    /// current date in the reporting timezone
    pub fn today(&self) -> Result<NaiveDate> {
        self.config.reporting_date(self.time.now())
    }

    fn facility_guard(&self, facility_id: FacilityId) -> Arc<Mutex<()>> {
        self.facility_guards.entry(facility_id).or_default().value().clone()
    }

    /// the stored outcome for `key`, if this request was already processed
    fn replay(
        &self,
        loan_id: LoanId,
        key: &IdempotencyKey,
        operation: Operation,
    ) -> Result<Option<(LoanSnapshot, Vec<LedgerTransaction>)>> {
        let record = match self.store.idempotency_record(key)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let IdempotencyRecord { loan_id: owner, operation: used_for, transaction_ids } = record;
        if owner != loan_id || used_for != operation {
            warn!(
                "idempotency key {} reused: first used for {:?} on loan {}",
                key, used_for, owner
            );
            return Err(LedgerError::IdempotencyConflict { key: key.to_string() });
        }

        let snapshot = self.store.snapshot(loan_id)?;
        let transactions = Self::recorded(&snapshot, &transaction_ids)?;
        debug!("replaying {:?} for loan {} with key {}", operation, loan_id, key);
        Ok(Some((snapshot, transactions)))
    }

    fn recorded(snapshot: &LoanSnapshot, ids: &[TransactionId]) -> Result<Vec<LedgerTransaction>> {
        ids.iter()
            .map(|id| {
                snapshot.ledger.get(*id).cloned().ok_or_else(|| LedgerError::Storage {
                    message: format!("transaction {} missing from ledger of loan {}", id, snapshot.loan_id()),
                })
            })
            .collect()
    }

    fn first(loan_id: LoanId, transactions: Vec<LedgerTransaction>) -> Result<LedgerTransaction> {
        transactions.into_iter().next().ok_or_else(|| LedgerError::Storage {
            message: format!("no transaction recorded for loan {}", loan_id),
        })
    }

    fn payment_outcome(snapshot: &LoanSnapshot, transaction: LedgerTransaction, replayed: bool) -> PaymentOutcome {
        let balance = BalanceCalculator::as_recorded(&snapshot.loan, &snapshot.ledger, &transaction);
        PaymentOutcome {
            transaction,
            balance,
            replayed,
        }
    }

    fn facility_loans(&self, facility_id: FacilityId) -> Result<Vec<Loan>> {
        Ok(self
            .store
            .facility_snapshots(facility_id)?
            .into_iter()
            .map(|snapshot| snapshot.loan)
            .collect())
    }

    fn facility_outstanding(&self, facility_id: FacilityId) -> Result<Money> {
        Ok(self
            .store
            .facility_snapshots(facility_id)?
            .iter()
            .filter(|snapshot| snapshot.loan.is_active())
            .map(|snapshot| BalanceCalculator::principal_outstanding(&snapshot.ledger))
            .sum())
    }

    /// reject `requested_days` when the facility's revolving period cannot absorb it
    fn ensure_revolving_capacity(&self, facility: &Facility, requested_days: i64) -> Result<()> {
        if !facility.tracks_revolving_period() {
            return Ok(());
        }
        let loans = self.facility_loans(facility.id)?;
        let usage = self.tracker.facility_usage(facility, &loans);
        self.tracker.ensure_capacity(facility, &usage, requested_days).map_err(|e| {
            warn!(
                "facility {} revolving period: {} days requested, {} remaining",
                facility.id, requested_days, usage.days_remaining
            );
            e
        })
    }

    /// book a new loan and its initial draw
    pub fn create_loan(&self, terms: LoanTerms) -> Result<Loan> {
        terms.validate()?;
        let facility = self.facilities.facility(terms.facility_id)?;

        let guard = self.facility_guard(facility.id);
        let _lock = guard.lock().unwrap_or_else(|e| e.into_inner());

        let utilization = FacilityUtilization::calculate(&facility, self.facility_outstanding(facility.id)?);
        if !utilization.can_fund(terms.principal) {
            warn!(
                "facility {} credit limit: {} requested, {} available",
                facility.id, terms.principal, utilization.available
            );
            return Err(LedgerError::CreditLimitExceeded {
                available: utilization.available,
                requested: terms.principal,
            });
        }
        self.ensure_revolving_capacity(&facility, terms.term_days())?;

        let snapshot = lifecycle::originate(&terms, self.time.now())?;
        let loan = snapshot.loan.clone();
        self.store.insert(snapshot)?;

        info!(
            "loan {} ({}) created on facility {}: {} at {} from {} to {}",
            loan.id,
            loan.reference,
            loan.facility_id,
            loan.principal,
            loan.annual_rate(),
            loan.start_date,
            loan.due_date
        );
        Ok(loan)
    }

    pub fn record_payment(&self, loan_id: LoanId, request: PaymentRequest) -> Result<PaymentOutcome> {
        if let Some((snapshot, transactions)) = self.replay(loan_id, &request.idempotency_key, Operation::Payment)? {
            let tx = Self::first(loan_id, transactions)?;
            return Ok(Self::payment_outcome(&snapshot, tx, true));
        }

        let snapshot = self.store.snapshot(loan_id)?;
        let mutation = lifecycle::record_payment(&snapshot, &request, &self.allocator, self.time.now())?;
        let ids = mutation.transaction_ids();
        let committed = self.store.commit(loan_id, snapshot.version, mutation)?;
        let tx = Self::first(loan_id, Self::recorded(&committed, &ids)?)?;

        info!("loan {} payment of {} recorded on {}", loan_id, tx.amount, tx.effective_date);
        Ok(Self::payment_outcome(&committed, tx, false))
    }

    /// stand-alone interest or fee payment
    pub fn record_charge_payment(&self, loan_id: LoanId, request: ChargePaymentRequest) -> Result<PaymentOutcome> {
        if let Some((snapshot, transactions)) =
            self.replay(loan_id, &request.idempotency_key, Operation::ChargePayment)?
        {
            let tx = Self::first(loan_id, transactions)?;
            return Ok(Self::payment_outcome(&snapshot, tx, true));
        }

        let snapshot = self.store.snapshot(loan_id)?;
        let mutation = lifecycle::record_charge_payment(&snapshot, &request, self.time.now())?;
        let ids = mutation.transaction_ids();
        let committed = self.store.commit(loan_id, snapshot.version, mutation)?;
        let tx = Self::first(loan_id, Self::recorded(&committed, &ids)?)?;

        info!(
            "loan {} {} payment of {} recorded on {}",
            loan_id, tx.transaction_type, tx.amount, tx.effective_date
        );
        Ok(Self::payment_outcome(&committed, tx, false))
    }

    pub fn settle(&self, loan_id: LoanId, request: SettlementRequest) -> Result<SettlementOutcome> {
        if let Some((snapshot, transactions)) =
            self.replay(loan_id, &request.idempotency_key, Operation::Settlement)?
        {
            let transaction = Self::first(loan_id, transactions)?;
            return Ok(SettlementOutcome {
                loan: snapshot.loan,
                transaction,
                replayed: true,
            });
        }

        let snapshot = self.store.snapshot(loan_id)?;
        let mutation = lifecycle::settle(&snapshot, &request, self.time.now())?;
        let ids = mutation.transaction_ids();
        let committed = self.store.commit(loan_id, snapshot.version, mutation)?;
        let transaction = Self::first(loan_id, Self::recorded(&committed, &ids)?)?;

        info!(
            "loan {} settled on {} for {}",
            loan_id, transaction.effective_date, transaction.amount
        );
        Ok(SettlementOutcome {
            loan: committed.loan,
            transaction,
            replayed: false,
        })
    }

    pub fn reverse_settlement(&self, loan_id: LoanId, reason: Option<&str>) -> Result<Loan> {
        let snapshot = self.store.snapshot(loan_id)?;
        let mutation = lifecycle::reverse_settlement(&snapshot, reason.map(str::to_string), self.time.now())?;
        let committed = self.store.commit(loan_id, snapshot.version, mutation)?;

        warn!(
            "loan {} settlement reversed{}",
            loan_id,
            reason.map(|r| format!(": {}", r.trim())).unwrap_or_default()
        );
        Ok(committed.loan)
    }

    pub fn cancel(&self, loan_id: LoanId, reason: &str) -> Result<Loan> {
        let snapshot = self.store.snapshot(loan_id)?;
        let mutation = lifecycle::cancel(&snapshot, reason, self.today()?, self.time.now())?;
        let committed = self.store.commit(loan_id, snapshot.version, mutation)?;

        warn!("loan {} cancelled: {}", loan_id, reason.trim());
        Ok(committed.loan)
    }

    /// remove a cancelled loan with its ledger, audit trail and idempotency records
    pub fn permanently_delete(&self, loan_id: LoanId) -> Result<()> {
        let snapshot = self.store.snapshot(loan_id)?;
        lifecycle::ensure_deletable(&snapshot.loan)?;
        self.store.remove(loan_id, snapshot.version)?;

        warn!("loan {} permanently deleted with {} ledger records", loan_id, snapshot.ledger.len());
        Ok(())
    }

    /// roll the loan forward to new terms, gated by the facility's revolving period
    pub fn revolve(&self, loan_id: LoanId, terms: RevolveTerms, key: IdempotencyKey) -> Result<RevolveOutcome> {
        if let Some((snapshot, transactions)) = self.replay(loan_id, &key, Operation::Revolve)? {
            return Ok(RevolveOutcome {
                loan: snapshot.loan,
                transactions,
                replayed: true,
            });
        }

        let facility_id = self.store.snapshot(loan_id)?.loan.facility_id;
        let facility = self.facilities.facility(facility_id)?;
        let guard = self.facility_guard(facility_id);
        let _lock = guard.lock().unwrap_or_else(|e| e.into_inner());

        let snapshot = self.store.snapshot(loan_id)?;
        lifecycle::ensure_active(&snapshot.loan)?;
        self.ensure_revolving_capacity(&facility, lifecycle::revolve_extension_days(&snapshot.loan, &terms))?;

        let mutation = lifecycle::revolve(&snapshot, &terms, self.time.now())?.idempotent(key, Operation::Revolve);
        let ids = mutation.transaction_ids();
        let committed = self.store.commit(loan_id, snapshot.version, mutation)?;
        let transactions = Self::recorded(&committed, &ids)?;

        info!(
            "loan {} revolved on {}: due {} -> {}, rate {} -> {}",
            loan_id,
            terms.effective_date,
            snapshot.loan.due_date,
            committed.loan.due_date,
            snapshot.loan.annual_rate(),
            committed.loan.annual_rate()
        );
        Ok(RevolveOutcome {
            loan: committed.loan,
            transactions,
            replayed: false,
        })
    }

    /// balance as of today
    pub fn get_balance(&self, loan_id: LoanId) -> Result<Balance> {
        self.get_balance_as_of(loan_id, self.today()?)
    }

    pub fn get_balance_as_of(&self, loan_id: LoanId, as_of: NaiveDate) -> Result<Balance> {
        let snapshot = self.store.snapshot(loan_id)?;
        Ok(BalanceCalculator::calculate(&snapshot.loan, &snapshot.ledger, as_of))
    }

    /// every ledger record in (effective date, sequence) order, reversals included
    pub fn get_ledger(&self, loan_id: LoanId) -> Result<Vec<LedgerTransaction>> {
        let snapshot = self.store.snapshot(loan_id)?;
        Ok(snapshot.ledger.ordered().into_iter().cloned().collect())
    }

    pub fn get_audit_trail(&self, loan_id: LoanId) -> Result<Vec<AuditEntry>> {
        Ok(self.store.snapshot(loan_id)?.audit.entries().to_vec())
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        Ok(self.store.snapshot(loan_id)?.loan)
    }

    pub fn get_revolving_usage(&self, target: UsageTarget) -> Result<RevolvingUsage> {
        match target {
            UsageTarget::Facility(facility_id) => {
                let facility = self.facilities.facility(facility_id)?;
                let loans = self.facility_loans(facility_id)?;
                Ok(self.tracker.facility_usage(&facility, &loans))
            }
            UsageTarget::Loan(loan_id) => {
                let loan = self.get_loan(loan_id)?;
                let facility = self.facilities.facility(loan.facility_id)?;
                Ok(self.tracker.loan_usage(&facility, &loan, self.today()?))
            }
        }
    }

    pub fn get_facility_utilization(&self, facility_id: FacilityId) -> Result<FacilityUtilization> {
        let facility = self.facilities.facility(facility_id)?;
        Ok(FacilityUtilization::calculate(&facility, self.facility_outstanding(facility_id)?))
    }

    /// price a scenario on a copy of the loan's parameters
    pub fn simulate(&self, loan_id: LoanId, scenario: Scenario) -> Result<ScenarioResult> {
        let loan = self.get_loan(loan_id)?;
        WhatIfSimulator::simulate(&SimulationInput::from_loan(&loan), &scenario)
    }

    pub fn get_economics(&self, loan_id: LoanId) -> Result<LoanEconomics> {
        let loan = self.get_loan(loan_id)?;
        let facility = self.facilities.facility(loan.facility_id)?;
        ensure_rate_in_range(facility.cost_of_funding)?;
        Ok(LoanEconomics::calculate(&SimulationInput::from_loan(&loan), facility.cost_of_funding))
    }

    /// serializable view as of today
    pub fn loan_view(&self, loan_id: LoanId) -> Result<LoanView> {
        let snapshot = self.store.snapshot(loan_id)?;
        Ok(LoanView::from_snapshot(&snapshot, self.today()?))
    }
}
