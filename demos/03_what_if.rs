/// what-if - price refinance, early payment and term changes
use chrono::{Duration, NaiveDate};
use loan_ledger_rs::{
    EngineConfig, Facility, LedgerEngine, LoanTerms, Money, Rate, SafeTimeProvider, Scenario, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== what-if scenarios ===\n");

    let engine = LedgerEngine::in_memory(EngineConfig::default(), SafeTimeProvider::new(TimeSource::System))?;
    let facility_id = engine.facilities().register(
        Facility::new("Acquisition line", Money::from_major(5_000_000)).with_cost_of_funding(Rate::from_percent(dec!(3.5))),
    );
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).ok_or("bad date")?;

    let loan = engine.create_loan(
        LoanTerms::builder()
            .facility(facility_id)
            .principal(Money::from_major(1_000_000))
            .base_rate(Rate::from_percent(dec!(6)))
            .start_date(start)
            .term_days(365)
            .build()?,
    )?;

    let scenarios = [
        Scenario::Refinance { new_rate: Rate::from_percent(dec!(4.5)) },
        Scenario::EarlyPayment { payment_date: start + Duration::days(90), amount: None },
        Scenario::EarlyPayment {
            payment_date: start + Duration::days(90),
            amount: Some(Money::from_major(400_000)),
        },
        Scenario::TermChange { new_term_days: 180 },
    ];

    for scenario in scenarios {
        let result = engine.simulate(loan.id, scenario)?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    let economics = engine.get_economics(loan.id)?;
    println!(
        "\nincome {} funding {} net {} margin {}",
        economics.interest_income, economics.funding_cost, economics.net_interest, economics.net_margin
    );

    Ok(())
}
