use chrono::{DateTime, NaiveDate, Utc};
use log::debug;

use crate::balance::{Balance, BalanceCalculator};
use crate::config::{all_in_rate, ensure_term_in_range, LoanTerms, RevolveTerms};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{AuditEntry, LoanEvent};
use crate::ledger::{Ledger, LedgerTransaction};
use crate::payments::{
    ChargePaymentRequest, PaymentAllocator, PaymentContext, PaymentRequest, PaymentWaterfall,
    SettlementRequest,
};
use crate::state::{Loan, LoanSnapshot};
use crate::store::LoanMutation;
use crate::types::{Allocation, ChargeKind, LoanStatus, Operation};

/// new loan with its initial draw and creation audit entry
pub fn originate(terms: &LoanTerms, now: DateTime<Utc>) -> Result<LoanSnapshot> {
    terms.validate()?;

    let loan = Loan::from_terms(terms, now);
    let mut snapshot = LoanSnapshot::new(loan);
    let loan = &snapshot.loan;

    let draw = LedgerTransaction::draw(loan.id, loan.principal, loan.annual_rate(), loan.start_date, now);
    let created = AuditEntry::new(
        loan.id,
        LoanEvent::Created {
            facility_id: loan.facility_id,
            principal: loan.principal,
            start_date: loan.start_date,
            due_date: loan.due_date,
        },
        now,
    );

    snapshot.ledger.append(draw)?;
    snapshot.audit.record(created);
    Ok(snapshot)
}

pub fn ensure_active(loan: &Loan) -> Result<()> {
    if !loan.is_active() {
        return Err(LedgerError::invalid_state(loan.id, loan.status, "active"));
    }
    Ok(())
}

/// only cancelled loans may be removed
pub fn ensure_deletable(loan: &Loan) -> Result<()> {
    if !loan.is_cancelled() {
        return Err(LedgerError::invalid_state(loan.id, loan.status, "cancelled"));
    }
    Ok(())
}

/// financial dates must fall on or after the loan start and the latest ledger date
fn ensure_postable(loan: &Loan, ledger: &Ledger, date: NaiveDate) -> Result<()> {
    if date < loan.start_date {
        return Err(LedgerError::validation(format!(
            "date {} is before loan start {}",
            date, loan.start_date
        )));
    }
    if let Some(latest) = ledger.last_effective_date() {
        if date < latest {
            return Err(LedgerError::validation(format!(
                "date {} is before the latest ledger entry on {}",
                date, latest
            )));
        }
    }
    Ok(())
}

fn touched(loan: &Loan, now: DateTime<Utc>) -> Loan {
    let mut loan = loan.clone();
    loan.updated_at = now;
    loan
}

/// repayment split by `allocator` unless the request carries its own split
pub fn record_payment(
    snapshot: &LoanSnapshot,
    request: &PaymentRequest,
    allocator: &PaymentAllocator,
    now: DateTime<Utc>,
) -> Result<LoanMutation> {
    let loan = &snapshot.loan;
    ensure_active(loan)?;
    ensure_postable(loan, &snapshot.ledger, request.payment_date)?;

    let balance = BalanceCalculator::calculate(loan, &snapshot.ledger, request.payment_date);
    let allocation = allocator.allocate(
        request.amount,
        request.allocation,
        &PaymentContext::from_balance(&balance),
    )?;
    debug!(
        "loan {} payment {} split principal {} interest {} fees {}",
        loan.id, request.amount, allocation.principal, allocation.interest, allocation.fees
    );

    let tx = LedgerTransaction::repayment(loan.id, allocation, request.payment_date, now);
    let audit = AuditEntry::new(
        loan.id,
        LoanEvent::PaymentRecorded {
            transaction_id: tx.id,
            allocation,
            payment_date: request.payment_date,
        },
        now,
    );

    Ok(LoanMutation::new(touched(loan, now))
        .append(tx)
        .audit(audit)
        .idempotent(request.idempotency_key.clone(), Operation::Payment))
}

/// stand-alone interest or fee payment, bounded by what is unpaid
pub fn record_charge_payment(
    snapshot: &LoanSnapshot,
    request: &ChargePaymentRequest,
    now: DateTime<Utc>,
) -> Result<LoanMutation> {
    let loan = &snapshot.loan;
    ensure_active(loan)?;
    ensure_postable(loan, &snapshot.ledger, request.payment_date)?;

    if !request.amount.is_positive() {
        return Err(LedgerError::validation(format!(
            "{} payment must be positive, got {}",
            request.kind.transaction_type(),
            request.amount
        )));
    }

    let balance = BalanceCalculator::calculate(loan, &snapshot.ledger, request.payment_date);
    let due = match request.kind {
        ChargeKind::Interest => balance.interest,
        ChargeKind::Fee => balance.fees,
    };
    if request.amount > due {
        return Err(LedgerError::Overpayment {
            outstanding: due,
            requested: request.amount,
        });
    }

    let tx = LedgerTransaction::charge_payment(loan.id, request.kind, request.amount, request.payment_date, now);
    let audit = AuditEntry::new(
        loan.id,
        LoanEvent::ChargePaid {
            transaction_id: tx.id,
            kind: request.kind,
            amount: request.amount,
        },
        now,
    );

    Ok(LoanMutation::new(touched(loan, now))
        .append(tx)
        .audit(audit)
        .idempotent(request.idempotency_key.clone(), Operation::ChargePayment))
}

/// allocation for a settlement: fees, then interest, then principal
pub fn settlement_allocation(balance: &Balance, amount: Option<Money>) -> Result<Allocation> {
    match amount {
        None => Ok(Allocation::new(balance.principal, balance.interest, balance.fees)),
        Some(amount) => PaymentAllocator::new(PaymentWaterfall::fees_first()).allocate(
            amount,
            None,
            &PaymentContext::from_balance(balance),
        ),
    }
}

pub fn settle(snapshot: &LoanSnapshot, request: &SettlementRequest, now: DateTime<Utc>) -> Result<LoanMutation> {
    let loan = &snapshot.loan;
    ensure_active(loan)?;
    ensure_postable(loan, &snapshot.ledger, request.settlement_date)?;

    let balance = BalanceCalculator::calculate(loan, &snapshot.ledger, request.settlement_date);
    let allocation = settlement_allocation(&balance, request.amount)?;
    let amount = allocation.total();

    let tx = LedgerTransaction::settlement(loan.id, allocation, request.settlement_date, now);
    let mut settled = loan.clone();
    settled.mark_settled(request.settlement_date, amount, tx.id, now);

    let audit = AuditEntry::new(
        loan.id,
        LoanEvent::Settled {
            transaction_id: tx.id,
            settlement_date: request.settlement_date,
            settlement_amount: amount,
        },
        now,
    );

    Ok(LoanMutation::new(settled)
        .append(tx)
        .audit(audit)
        .idempotent(request.idempotency_key.clone(), Operation::Settlement))
}

/// back to active; the original settlement stays on the ledger with a
/// compensating record dated the same day
pub fn reverse_settlement(
    snapshot: &LoanSnapshot,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<LoanMutation> {
    let loan = &snapshot.loan;
    if loan.status != LoanStatus::Settled {
        return Err(LedgerError::invalid_state(loan.id, loan.status, "settled"));
    }

    let original = loan
        .settlement_transaction_id
        .and_then(|id| snapshot.ledger.get(id))
        .ok_or_else(|| {
            LedgerError::validation(format!("loan {} has no settlement transaction on its ledger", loan.id))
        })?;
    let (previous_settled_date, previous_settled_amount) = match (loan.settled_date, loan.settled_amount) {
        (Some(date), Some(amount)) => (date, amount),
        _ => (original.effective_date, original.amount),
    };

    let reversal = LedgerTransaction::reversal_of(original, original.effective_date, now);
    let mut reopened = loan.clone();
    reopened.clear_settlement(now);

    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let audit = AuditEntry::new(
        loan.id,
        LoanEvent::SettlementReversed {
            reversed_transaction_id: original.id,
            previous_settled_date,
            previous_settled_amount,
        },
        now,
    )
    .with_reason(reason);

    Ok(LoanMutation::new(reopened).append(reversal).audit(audit))
}

/// cancels an active loan; its balance stops accruing on `cancelled_on`, or on
/// the start date or latest ledger date when either is later
pub fn cancel(
    snapshot: &LoanSnapshot,
    reason: &str,
    cancelled_on: NaiveDate,
    now: DateTime<Utc>,
) -> Result<LoanMutation> {
    let loan = &snapshot.loan;
    ensure_active(loan)?;

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::validation("a cancellation reason is required"));
    }

    let frozen_on = snapshot
        .ledger
        .last_effective_date()
        .map_or(cancelled_on, |last| cancelled_on.max(last))
        .max(loan.start_date);
    let mut cancelled = loan.clone();
    cancelled.mark_cancelled(frozen_on, now);
    let audit = AuditEntry::new(loan.id, LoanEvent::Cancelled, now).with_reason(Some(reason.to_string()));

    Ok(LoanMutation::new(cancelled).audit(audit))
}

/// days a revolve adds to the loan's allocated term
pub fn revolve_extension_days(loan: &Loan, terms: &RevolveTerms) -> i64 {
    (terms.new_due_date - loan.due_date).num_days()
}

/// roll the loan forward: settle unpaid interest and principal at the
/// effective date and re-advance the principal at the new rate
pub fn revolve(snapshot: &LoanSnapshot, terms: &RevolveTerms, now: DateTime<Utc>) -> Result<LoanMutation> {
    let loan = &snapshot.loan;
    ensure_active(loan)?;
    ensure_postable(loan, &snapshot.ledger, terms.effective_date)?;

    if terms.new_due_date <= terms.effective_date {
        return Err(LedgerError::validation(format!(
            "new due date {} must be after the effective date {}",
            terms.new_due_date, terms.effective_date
        )));
    }

    let balance = BalanceCalculator::calculate(loan, &snapshot.ledger, terms.effective_date);
    if !balance.principal.is_positive() {
        return Err(LedgerError::validation(format!(
            "loan {} has no outstanding principal to revolve",
            loan.id
        )));
    }

    let mut revolved = loan.clone();
    if let Some(base_rate) = terms.base_rate {
        revolved.base_rate = base_rate;
    }
    if let Some(margin) = terms.margin {
        revolved.margin = margin;
    }
    all_in_rate(revolved.base_rate, revolved.margin)?;
    ensure_term_in_range(revolved.start_date, terms.new_due_date)?;
    revolved.due_date = terms.new_due_date;
    revolved.updated_at = now;

    let payoff = LedgerTransaction::settlement(
        loan.id,
        Allocation::split(balance.principal, balance.interest),
        terms.effective_date,
        now,
    );
    let redraw = LedgerTransaction::draw(
        loan.id,
        balance.principal,
        revolved.annual_rate(),
        terms.effective_date,
        now,
    );
    let audit = AuditEntry::new(
        loan.id,
        LoanEvent::Revolved {
            effective_date: terms.effective_date,
            previous_due_date: loan.due_date,
            new_due_date: terms.new_due_date,
            previous_rate: loan.annual_rate(),
            new_rate: revolved.annual_rate(),
        },
        now,
    );

    Ok(LoanMutation::new(revolved).append(payoff).append(redraw).audit(audit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationPolicy;
    use crate::decimal::Rate;
    use crate::interest::DayCountBasis;
    use crate::types::{IdempotencyKey, TransactionType};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn key(k: &str) -> IdempotencyKey {
        IdempotencyKey::new(k).unwrap()
    }

    /// 36,000 at 10% on actual/360 so 30 days accrue exactly 300
    fn originated() -> LoanSnapshot {
        let terms = LoanTerms::builder()
            .facility(Uuid::new_v4())
            .principal(Money::from_major(36_000))
            .base_rate(Rate::from_percent(dec!(10)))
            .basis(DayCountBasis::Actual360)
            .start_date(date(2024, 1, 1))
            .due_date(date(2024, 7, 1))
            .build()
            .unwrap();
        originate(&terms, Utc::now()).unwrap()
    }

    /// applies a mutation the way the store does
    fn applied(snapshot: &LoanSnapshot, mutation: LoanMutation) -> LoanSnapshot {
        let mut next = snapshot.clone();
        for tx in mutation.transactions {
            next.ledger.append(tx).unwrap();
        }
        for entry in mutation.audit {
            next.audit.record(entry);
        }
        next.loan = mutation.loan;
        next.version += 1;
        next
    }

    fn balance(snapshot: &LoanSnapshot, as_of: NaiveDate) -> Balance {
        BalanceCalculator::calculate(&snapshot.loan, &snapshot.ledger, as_of)
    }

    #[test]
    fn test_originate_records_draw() {
        let snapshot = originated();
        assert_eq!(snapshot.ledger.len(), 1);
        assert_eq!(snapshot.ledger.entries()[0].transaction_type, TransactionType::Draw);
        assert_eq!(snapshot.ledger.entries()[0].rate, Some(Rate::from_percent(dec!(10))));
        assert_eq!(snapshot.audit.entries()[0].event.name(), "created");
    }

    #[test]
    fn test_payment_uses_configured_waterfall() {
        let snapshot = originated();
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);
        let request = PaymentRequest::new(Money::from_major(1_300), date(2024, 1, 31), key("p1"));

        let mutation = record_payment(&snapshot, &request, &allocator, Utc::now()).unwrap();
        let allocation = mutation.transactions[0].allocation.unwrap();
        assert_eq!(allocation.interest, Money::from_major(300));
        assert_eq!(allocation.principal, Money::from_major(1_000));
        assert_eq!(mutation.idempotency, Some((key("p1"), Operation::Payment)));

        let after = applied(&snapshot, mutation);
        assert_eq!(balance(&after, date(2024, 1, 31)).total, Money::from_major(35_000));
    }

    #[test]
    fn test_backdated_payment_rejected() {
        let snapshot = originated();
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);
        let paid = applied(
            &snapshot,
            record_payment(
                &snapshot,
                &PaymentRequest::new(Money::from_major(100), date(2024, 2, 1), key("p1")),
                &allocator,
                Utc::now(),
            )
            .unwrap(),
        );

        let late = PaymentRequest::new(Money::from_major(100), date(2024, 1, 15), key("p2"));
        assert!(matches!(
            record_payment(&paid, &late, &allocator, Utc::now()),
            Err(LedgerError::Validation { .. })
        ));

        let early = PaymentRequest::new(Money::from_major(100), date(2023, 12, 31), key("p3"));
        assert!(record_payment(&snapshot, &early, &allocator, Utc::now()).is_err());
    }

    #[test]
    fn test_charge_payment_bounded_by_unpaid_interest() {
        let snapshot = originated();
        let ok = ChargePaymentRequest {
            kind: ChargeKind::Interest,
            amount: Money::from_major(300),
            payment_date: date(2024, 1, 31),
            idempotency_key: key("c1"),
        };
        assert!(record_charge_payment(&snapshot, &ok, Utc::now()).is_ok());

        let too_much = ChargePaymentRequest {
            amount: Money::from_major(301),
            ..ok.clone()
        };
        assert!(matches!(
            record_charge_payment(&snapshot, &too_much, Utc::now()),
            Err(LedgerError::Overpayment { .. })
        ));

        let no_fees = ChargePaymentRequest {
            kind: ChargeKind::Fee,
            amount: Money::from_major(1),
            ..ok
        };
        assert!(matches!(
            record_charge_payment(&snapshot, &no_fees, Utc::now()),
            Err(LedgerError::Overpayment { .. })
        ));
    }

    #[test]
    fn test_settle_without_amount_clears_balance() {
        let snapshot = originated();
        let request = SettlementRequest::new(date(2024, 1, 31), key("s1"));

        let mutation = settle(&snapshot, &request, Utc::now()).unwrap();
        assert!(mutation.loan.is_settled());
        assert_eq!(mutation.loan.settled_amount, Some(Money::from_major(36_300)));

        let after = applied(&snapshot, mutation);
        assert!(balance(&after, date(2024, 6, 1)).is_clear());
    }

    #[test]
    fn test_settle_amount_validation() {
        let snapshot = originated();

        let over = SettlementRequest::new(date(2024, 1, 31), key("s1")).with_amount(Money::from_major(36_301));
        assert!(matches!(settle(&snapshot, &over, Utc::now()), Err(LedgerError::Overpayment { .. })));

        let zero = SettlementRequest::new(date(2024, 1, 31), key("s2")).with_amount(Money::ZERO);
        assert!(matches!(settle(&snapshot, &zero, Utc::now()), Err(LedgerError::Validation { .. })));

        let partial = SettlementRequest::new(date(2024, 1, 31), key("s3")).with_amount(Money::from_major(1_000));
        let mutation = settle(&snapshot, &partial, Utc::now()).unwrap();
        let allocation = mutation.transactions[0].allocation.unwrap();
        assert_eq!(allocation.interest, Money::from_major(300));
        assert_eq!(allocation.principal, Money::from_major(700));
    }

    #[test]
    fn test_reverse_restores_accrual() {
        let snapshot = originated();
        let settled = applied(
            &snapshot,
            settle(&snapshot, &SettlementRequest::new(date(2024, 1, 31), key("s1")), Utc::now()).unwrap(),
        );

        assert!(matches!(
            reverse_settlement(&snapshot, None, Utc::now()),
            Err(LedgerError::InvalidState { .. })
        ));

        let mutation = reverse_settlement(&settled, Some("  wrong account  ".to_string()), Utc::now()).unwrap();
        assert!(mutation.loan.is_active());
        assert_eq!(mutation.audit[0].reason.as_deref(), Some("wrong account"));
        let reversal = &mutation.transactions[0];
        assert_eq!(reversal.reverses, settled.loan.settlement_transaction_id);
        assert_eq!(reversal.amount, Money::from_major(36_300));

        let reopened = applied(&settled, mutation);
        assert_eq!(reopened.ledger.len(), 3);
        assert_eq!(balance(&reopened, date(2024, 3, 1)).interest, Money::from_major(600));
    }

    #[test]
    fn test_cancel_rules() {
        let snapshot = originated();
        assert!(matches!(cancel(&snapshot, "   ", date(2024, 2, 1), Utc::now()), Err(LedgerError::Validation { .. })));

        let cancelled = applied(&snapshot, cancel(&snapshot, "duplicate booking", date(2024, 2, 1), Utc::now()).unwrap());
        assert!(cancelled.loan.is_cancelled());
        assert_eq!(cancelled.ledger.len(), 1);
        assert!(ensure_deletable(&cancelled.loan).is_ok());
        assert!(matches!(
            cancel(&cancelled, "again", date(2024, 2, 1), Utc::now()),
            Err(LedgerError::InvalidState { .. })
        ));

        let settled = applied(
            &snapshot,
            settle(&snapshot, &SettlementRequest::new(date(2024, 1, 31), key("s1")), Utc::now()).unwrap(),
        );
        assert!(matches!(
            cancel(&settled, "too late", date(2024, 2, 1), Utc::now()),
            Err(LedgerError::InvalidState { .. })
        ));
        assert!(ensure_deletable(&settled.loan).is_err());
        assert!(ensure_deletable(&snapshot.loan).is_err());
    }

    #[test]
    fn test_cancelled_loan_stops_accruing() {
        let snapshot = originated();
        let cancelled = applied(&snapshot, cancel(&snapshot, "booked in error", date(2024, 1, 31), Utc::now()).unwrap());
        assert_eq!(cancelled.loan.cancelled_date, Some(date(2024, 1, 31)));
        assert!(cancelled.loan.check_invariants().is_ok());
        assert_eq!(balance(&cancelled, date(2024, 1, 31)).interest, Money::from_major(300));
        assert_eq!(balance(&cancelled, date(2025, 6, 1)), balance(&cancelled, date(2024, 1, 31)));

        // never before the start date
        let early = applied(&snapshot, cancel(&snapshot, "not needed", date(2023, 12, 1), Utc::now()).unwrap());
        assert_eq!(early.loan.cancelled_date, Some(date(2024, 1, 1)));
        let at_start = balance(&early, date(2024, 6, 1));
        assert_eq!(at_start.principal, Money::from_major(36_000));
        assert_eq!(at_start.interest, Money::ZERO);

        // never before the latest ledger entry
        let allocator = PaymentAllocator::for_policy(AllocationPolicy::InterestFirst);
        let request = PaymentRequest::new(Money::from_major(1_600), date(2024, 3, 1), key("p1"));
        let paid = applied(&snapshot, record_payment(&snapshot, &request, &allocator, Utc::now()).unwrap());
        let cancelled = applied(&paid, cancel(&paid, "booked in error", date(2024, 2, 1), Utc::now()).unwrap());
        assert_eq!(cancelled.loan.cancelled_date, Some(date(2024, 3, 1)));
        let frozen = balance(&cancelled, date(2024, 12, 31));
        assert_eq!(frozen.principal, Money::from_major(35_000));
        assert_eq!(frozen.interest, Money::ZERO);
    }

    #[test]
    fn test_revolve_rolls_principal_forward() {
        let snapshot = originated();
        let terms = RevolveTerms::new(date(2024, 1, 31), date(2024, 9, 1)).with_base_rate(Rate::from_percent(dec!(20)));

        assert_eq!(revolve_extension_days(&snapshot.loan, &terms), 62);

        let mutation = revolve(&snapshot, &terms, Utc::now()).unwrap();
        assert_eq!(mutation.transactions.len(), 2);
        assert_eq!(mutation.transactions[0].transaction_type, TransactionType::Settlement);
        assert_eq!(
            mutation.transactions[0].allocation,
            Some(Allocation::split(Money::from_major(36_000), Money::from_major(300)))
        );
        assert_eq!(mutation.transactions[1].transaction_type, TransactionType::Draw);
        assert_eq!(mutation.transactions[1].amount, Money::from_major(36_000));
        assert_eq!(mutation.loan.start_date, date(2024, 1, 1));
        assert_eq!(mutation.loan.due_date, date(2024, 9, 1));

        let revolved = applied(&snapshot, mutation);
        let after = balance(&revolved, date(2024, 3, 1));
        assert_eq!(after.principal, Money::from_major(36_000));
        assert_eq!(after.interest, Money::from_major(600));
    }

    #[test]
    fn test_revolve_validation() {
        let snapshot = originated();

        let inverted = RevolveTerms::new(date(2024, 2, 1), date(2024, 2, 1));
        assert!(matches!(revolve(&snapshot, &inverted, Utc::now()), Err(LedgerError::Validation { .. })));

        let negative = RevolveTerms::new(date(2024, 2, 1), date(2024, 9, 1)).with_margin(Rate::from_percent(dec!(-12)));
        assert!(matches!(revolve(&snapshot, &negative, Utc::now()), Err(LedgerError::Validation { .. })));

        let century = RevolveTerms::new(date(2024, 2, 1), date(2125, 1, 1));
        assert!(matches!(revolve(&snapshot, &century, Utc::now()), Err(LedgerError::Validation { .. })));

        let allocator = PaymentAllocator::for_policy(AllocationPolicy::PrincipalFirst);
        let repaid = applied(
            &snapshot,
            record_payment(
                &snapshot,
                &PaymentRequest::new(Money::from_major(36_000), date(2024, 1, 31), key("p1")),
                &allocator,
                Utc::now(),
            )
            .unwrap(),
        );
        let terms = RevolveTerms::new(date(2024, 2, 1), date(2024, 9, 1));
        assert!(matches!(revolve(&repaid, &terms, Utc::now()), Err(LedgerError::Validation { .. })));
    }
}
