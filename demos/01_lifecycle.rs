/// lifecycle - payments, settlement, reversal and cancellation
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use loan_ledger_rs::{
    DayCountBasis, EngineConfig, Facility, IdempotencyKey, LedgerEngine, LoanTerms, Money, PaymentRequest, Rate,
    SafeTimeProvider, SettlementRequest, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
    let engine = LedgerEngine::in_memory(EngineConfig::default(), time)?;
    let controller = engine.time().test_control().unwrap();

    let facility_id = engine
        .facilities()
        .register(Facility::new("Trade finance", Money::from_major(250_000)));
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?;

    let loan = engine.create_loan(
        LoanTerms::builder()
            .facility(facility_id)
            .principal(Money::from_major(36_000))
            .base_rate(Rate::from_percent(dec!(10)))
            .basis(DayCountBasis::Actual360)
            .start_date(start)
            .term_days(180)
            .arrangement_fee(Money::from_major(250))
            .build()?,
    )?;
    println!("1. booked {} due {}", loan.reference, loan.due_date);

    controller.advance(Duration::days(30));
    let paid = engine.record_payment(
        loan.id,
        PaymentRequest::new(Money::from_major(1_000), engine.today()?, IdempotencyKey::new("pmt-2024-01")?),
    )?;
    println!("2. payment split: {:?}", paid.transaction.allocation);
    println!("   outstanding: {}", paid.balance.total);

    controller.advance(Duration::days(30));
    let settled = engine.settle(
        loan.id,
        SettlementRequest::new(engine.today()?, IdempotencyKey::new("settle-2024-03")?),
    )?;
    println!("3. settled on {:?} for {:?}", settled.loan.settled_date, settled.loan.settled_amount);

    let reopened = engine.reverse_settlement(loan.id, Some("funds returned by bank"))?;
    println!("4. settlement reversed, status {}", reopened.status);
    println!("   balance today: {}", engine.get_balance(loan.id)?.total);

    let cancelled = engine.cancel(loan.id, "booked against the wrong facility")?;
    println!("5. status {}", cancelled.status);

    println!("\naudit trail:");
    for entry in engine.get_audit_trail(loan.id)? {
        println!("  {} {} {}", entry.recorded_at.format("%Y-%m-%d"), entry.event.name(), entry.reason.unwrap_or_default());
    }

    engine.permanently_delete(loan.id)?;
    println!("\nloan removed: {}", engine.get_loan(loan.id).is_err());

    Ok(())
}
