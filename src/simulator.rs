use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{add_days, ensure_amount_in_range, ensure_rate_in_range, ensure_term_in_range, MAX_TERM_DAYS};
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::{accrued_interest, DayCountBasis};
use crate::state::Loan;

/// alternative terms to price against the current trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "snake_case")]
pub enum Scenario {
    /// same principal and period at another annual rate
    Refinance { new_rate: Rate },
    /// full payoff when `amount` is absent, otherwise a partial paydown
    EarlyPayment {
        payment_date: NaiveDate,
        amount: Option<Money>,
    },
    /// same start, different term
    TermChange { new_term_days: u32 },
}

/// copy of the loan parameters a scenario is priced on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInput {
    pub principal: Money,
    pub annual_rate: Rate,
    pub basis: DayCountBasis,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl SimulationInput {
    pub fn from_loan(loan: &Loan) -> Self {
        Self {
            principal: loan.principal,
            annual_rate: loan.annual_rate(),
            basis: loan.basis,
            start_date: loan.start_date,
            due_date: loan.due_date,
        }
    }

    /// interest over the full current term
    pub fn full_term_interest(&self) -> Money {
        self.interest(self.principal, self.annual_rate, self.start_date, self.due_date)
    }

    fn interest(&self, principal: Money, rate: Rate, start: NaiveDate, end: NaiveDate) -> Money {
        accrued_interest(principal, rate, start, end, self.basis).to_cents()
    }

    fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(LedgerError::validation("simulation principal must be positive"));
        }
        ensure_amount_in_range("simulation principal", self.principal)?;
        ensure_rate_in_range(self.annual_rate)?;
        ensure_term_in_range(self.start_date, self.due_date)
    }
}

/// priced scenario; `savings` is negative when the scenario costs more
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub principal: Money,
    pub current_interest: Money,
    pub scenario_interest: Money,
    pub savings: Money,
    pub total_cost: Money,
    pub new_due_date: NaiveDate,
}

/// prices scenarios on copies of loan parameters; never touches a ledger
pub struct WhatIfSimulator;

impl WhatIfSimulator {
    pub fn simulate(input: &SimulationInput, scenario: &Scenario) -> Result<ScenarioResult> {
        input.validate()?;
        let current_interest = input.full_term_interest();

        let (scenario_interest, new_due_date) = match scenario {
            Scenario::Refinance { new_rate } => {
                ensure_rate_in_range(*new_rate)?;
                let interest = input.interest(input.principal, *new_rate, input.start_date, input.due_date);
                (interest, input.due_date)
            }
            Scenario::EarlyPayment { payment_date, amount } => {
                (Self::early_payment(input, *payment_date, *amount)?, input.due_date)
            }
            Scenario::TermChange { new_term_days } => {
                let days = i64::from(*new_term_days);
                if days == 0 || days > MAX_TERM_DAYS {
                    return Err(LedgerError::validation(format!(
                        "new term must be between 1 and {} days, got {}",
                        MAX_TERM_DAYS, days
                    )));
                }
                let due = add_days(input.start_date, days)?;
                (input.interest(input.principal, input.annual_rate, input.start_date, due), due)
            }
        };

        Ok(ScenarioResult {
            scenario: scenario.clone(),
            principal: input.principal,
            current_interest,
            scenario_interest,
            savings: current_interest - scenario_interest,
            total_cost: input.principal + scenario_interest,
            new_due_date,
        })
    }

    fn early_payment(input: &SimulationInput, payment_date: NaiveDate, amount: Option<Money>) -> Result<Money> {
        if payment_date < input.start_date || payment_date > input.due_date {
            return Err(LedgerError::validation(format!(
                "payment date {} must fall between {} and {}",
                payment_date, input.start_date, input.due_date
            )));
        }

        let to_payment = input.interest(input.principal, input.annual_rate, input.start_date, payment_date);
        match amount {
            None => Ok(to_payment),
            Some(amount) => {
                if !amount.is_positive() || amount > input.principal {
                    return Err(LedgerError::validation(format!(
                        "early payment must be positive and at most {}, got {}",
                        input.principal, amount
                    )));
                }
                let remaining = input.interest(
                    input.principal - amount,
                    input.annual_rate,
                    payment_date,
                    input.due_date,
                );
                Ok(to_payment + remaining)
            }
        }
    }
}

/// interest income against the facility's cost of funding over the full term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanEconomics {
    pub interest_income: Money,
    pub funding_cost: Money,
    pub net_interest: Money,
    pub net_margin: Rate,
}

impl LoanEconomics {
    pub fn calculate(input: &SimulationInput, cost_of_funding: Rate) -> Self {
        let interest_income = input.full_term_interest();
        let funding_cost = input.interest(input.principal, cost_of_funding, input.start_date, input.due_date);
        Self {
            interest_income,
            funding_cost,
            net_interest: interest_income - funding_cost,
            net_margin: input.annual_rate - cost_of_funding,
        }
    }
}
