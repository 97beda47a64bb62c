pub mod balance;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod facility;
pub mod interest;
pub mod ledger;
pub mod lifecycle;
pub mod payments;
pub mod revolving;
pub mod simulator;
pub mod state;
pub mod store;
pub mod types;
pub mod views;

// re-export key types
pub use balance::{Balance, BalanceCalculator, LedgerTotals};
pub use config::{
    AllocationPolicy, EngineConfig, LoanTerms, LoanTermsBuilder, RevolveTerms, UsageThresholds, MAX_AMOUNT,
    MAX_ANNUAL_RATE, MAX_TERM_DAYS,
};
pub use decimal::{Money, Rate};
pub use engine::{LedgerEngine, PaymentOutcome, RevolveOutcome, SettlementOutcome, UsageTarget};
pub use errors::{LedgerError, Result};
pub use events::{AuditEntry, AuditTrail, LoanEvent};
pub use facility::{Facility, FacilityUtilization, UtilizationState};
pub use interest::{accrued_interest, elapsed_days, AccrualEngine, DayCountBasis, InterestCalculation};
pub use ledger::{Ledger, LedgerTransaction};
pub use payments::{
    ChargePaymentRequest, PaymentAllocator, PaymentContext, PaymentRequest, PaymentWaterfall,
    SettlementRequest,
};
pub use revolving::{RevolvingTracker, RevolvingUsage, UsageStatus};
pub use simulator::{LoanEconomics, Scenario, ScenarioResult, SimulationInput, WhatIfSimulator};
pub use state::{Loan, LoanSnapshot};
pub use store::{
    FacilityDirectory, IdempotencyRecord, InMemoryFacilities, InMemoryLoanStore, LoanMutation, LoanStore,
};
pub use types::{
    Allocation, ChargeKind, FacilityId, IdempotencyKey, LoanId, LoanStatus, Operation, TransactionId,
    TransactionType,
};
pub use views::LoanView;

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
