use thiserror::Error;

use crate::decimal::Money;
use crate::types::{FacilityId, LoanId, LoanStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid state: loan {loan_id} is {current}, expected {expected}")]
    InvalidState {
        loan_id: LoanId,
        current: LoanStatus,
        expected: String,
    },

    #[error("overpayment: outstanding {outstanding}, requested {requested}")]
    Overpayment {
        outstanding: Money,
        requested: Money,
    },

    #[error("revolving period exceeded on facility {facility_id}: requested {requested} days, {remaining} remaining")]
    RevolvingPeriodExceeded {
        facility_id: FacilityId,
        requested: i64,
        remaining: i64,
    },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("credit limit exceeded: available {available}, requested {requested}")]
    CreditLimitExceeded {
        available: Money,
        requested: Money,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("facility not found: {id}")]
    FacilityNotFound {
        id: FacilityId,
    },

    #[error("concurrent modification of loan {loan_id}: expected version {expected}, found {found}")]
    ConcurrentModification {
        loan_id: LoanId,
        expected: u64,
        found: u64,
    },

    #[error("idempotency key {key} already used for a different request")]
    IdempotencyConflict {
        key: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },
}

impl LedgerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(loan_id: LoanId, current: LoanStatus, expected: &str) -> Self {
        LedgerError::InvalidState {
            loan_id,
            current,
            expected: expected.to_string(),
        }
    }

    /// whether the caller can correct the request and try again;
    /// storage failures are passed through untouched
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LedgerError::Storage { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
