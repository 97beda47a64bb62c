use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::FacilityId;

/// credit facility a loan draws against; owned by the facility directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub credit_limit: Money,
    /// annual rate the lender pays for the funds
    pub cost_of_funding: Rate,
    pub enable_revolving_tracking: bool,
    /// cumulative loan days allowed across the facility
    pub max_revolving_period: Option<u32>,
}

impl Facility {
    pub fn new(name: impl Into<String>, credit_limit: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            credit_limit,
            cost_of_funding: Rate::ZERO,
            enable_revolving_tracking: false,
            max_revolving_period: None,
        }
    }

    pub fn with_cost_of_funding(mut self, rate: Rate) -> Self {
        self.cost_of_funding = rate;
        self
    }

    /// enable revolving period tracking with a cap in days
    pub fn with_revolving_period(mut self, max_days: u32) -> Self {
        self.enable_revolving_tracking = true;
        self.max_revolving_period = Some(max_days);
        self
    }

    pub fn tracks_revolving_period(&self) -> bool {
        self.enable_revolving_tracking
    }
}

/// utilization bands for a facility's credit limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationState {
    Unused,   // 0%
    Low,      // < 30%
    Moderate, // 30-70%
    High,     // 70-90%
    Maxed,    // >= 90%
}

/// drawn principal against a facility's credit limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityUtilization {
    pub facility_id: FacilityId,
    pub credit_limit: Money,
    pub outstanding_principal: Money,
    pub available: Money,
    pub utilization_rate: Rate,
    pub state: UtilizationState,
}

impl FacilityUtilization {
    /// utilization given the outstanding principal of the facility's active loans
    pub fn calculate(facility: &Facility, outstanding_principal: Money) -> Self {
        let available = (facility.credit_limit - outstanding_principal).non_negative();

        let utilization_rate = if facility.credit_limit.is_positive() {
            Rate::from_decimal(
                (outstanding_principal.as_decimal() / facility.credit_limit.as_decimal()).round_dp(4),
            )
        } else {
            Rate::ZERO
        };

        Self {
            facility_id: facility.id,
            credit_limit: facility.credit_limit,
            outstanding_principal,
            available,
            utilization_rate,
            state: Self::state_for(outstanding_principal, utilization_rate),
        }
    }

    fn state_for(outstanding_principal: Money, rate: Rate) -> UtilizationState {
        if !outstanding_principal.is_positive() {
            UtilizationState::Unused
        } else if rate < Rate::from_bps(3_000) {
            UtilizationState::Low
        } else if rate < Rate::from_bps(7_000) {
            UtilizationState::Moderate
        } else if rate < Rate::from_bps(9_000) {
            UtilizationState::High
        } else {
            UtilizationState::Maxed
        }
    }

    /// whether another `principal` fits under the limit
    pub fn can_fund(&self, principal: Money) -> bool {
        principal <= self.available
    }
}
