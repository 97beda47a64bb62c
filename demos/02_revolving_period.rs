/// revolving period - cumulative term days against a facility maximum
use chrono::{NaiveDate, TimeZone, Utc};
use loan_ledger_rs::{
    EngineConfig, Facility, IdempotencyKey, LedgerEngine, LedgerError, LoanTerms, Money, Rate, RevolveTerms,
    SafeTimeProvider, TimeSource, UsageTarget,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== revolving period ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
    let engine = LedgerEngine::in_memory(EngineConfig::default(), time)?;
    let facility_id = engine
        .facilities()
        .register(Facility::new("Revolver", Money::from_major(10_000_000)).with_revolving_period(360));
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?;

    let terms = |days: u32| {
        LoanTerms::builder()
            .facility(facility_id)
            .principal(Money::from_major(100_000))
            .base_rate(Rate::from_percent(dec!(5)))
            .start_date(start)
            .term_days(days)
            .build()
    };

    let first = engine.create_loan(terms(200)?)?;
    engine.create_loan(terms(150)?)?;

    let usage = engine.get_revolving_usage(UsageTarget::Facility(facility_id))?;
    println!(
        "used {} of {} days ({}%), {} remaining, status {:?}",
        usage.days_used, usage.max_period, usage.percentage_used, usage.days_remaining, usage.status
    );

    match engine.create_loan(terms(20)?) {
        Err(LedgerError::RevolvingPeriodExceeded { requested, remaining, .. }) => {
            println!("20-day loan refused: {} requested, {} remaining", requested, remaining)
        }
        other => println!("unexpected: {:?}", other.map(|loan| loan.id)),
    }

    // roll the first loan forward by the days still available
    let revolve = RevolveTerms::new(start + chrono::Duration::days(30), first.due_date + chrono::Duration::days(10))
        .with_base_rate(Rate::from_percent(dec!(5.5)));
    let outcome = engine.revolve(first.id, revolve, IdempotencyKey::new("revolve-1")?)?;
    println!("\nrevolved {}: now due {} at {}", outcome.loan.reference, outcome.loan.due_date, outcome.loan.annual_rate());

    let usage = engine.get_revolving_usage(UsageTarget::Facility(facility_id))?;
    println!("usage after revolve: {}%, status {:?}", usage.percentage_used, usage.status);

    Ok(())
}
