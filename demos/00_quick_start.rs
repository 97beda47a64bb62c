/// quick start - book a loan and read its balance
use chrono::NaiveDate;
use loan_ledger_rs::{EngineConfig, Facility, LedgerEngine, LoanTerms, Money, Rate, SafeTimeProvider, TimeSource};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let engine = LedgerEngine::in_memory(EngineConfig::default(), SafeTimeProvider::new(TimeSource::System))?;
    let facility_id = engine
        .facilities()
        .register(Facility::new("Working capital", Money::from_major(5_000_000)));

    // 1,000,000 at 4.50% + 1.25% margin, actual/365
    let loan = engine.create_loan(
        LoanTerms::builder()
            .facility(facility_id)
            .reference("LN-0001")
            .principal(Money::from_major(1_000_000))
            .base_rate(Rate::from_percent(dec!(4.5)))
            .margin(Rate::from_percent(dec!(1.25)))
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?)
            .due_date(NaiveDate::from_ymd_opt(2024, 7, 1).ok_or("bad date")?)
            .build()?,
    )?;

    let balance = engine.get_balance_as_of(loan.id, loan.due_date)?;
    println!("balance at maturity: {}", serde_json::to_string_pretty(&balance)?);

    Ok(())
}
