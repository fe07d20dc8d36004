/// One location pass over a year, 30 days and 7 days on a hand-built account.
///
/// Validates that:
/// - An entity with enough conversions over the year is decided there and never revisited
/// - Entities short on data over the year are picked up by the first shorter window that has enough
/// - Entities with enough data nowhere are swept at the end and keep their modifier
/// - The pass processes windows longest first even when given shortest first

use chrono::NaiveDate;

use bidnudge::collaborators::ProcessingTaggerTrait;
use bidnudge::config::BidAdjustmentConfig;
use bidnudge::decision::OutcomeReason;
use bidnudge::in_memory_account::{InMemoryAccount, InMemoryTagger};
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::orchestrator::{run_adjustment_pass, CampaignScope};
use bidnudge::types::{Dimension, PerformanceSnapshot};
use bidnudge::windows::LookbackWindow;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "window_claims",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: window claims across year / 30 days / 7 days ===");

    let today = NaiveDate::from_ymd_opt(2024, 3, 15).ok_or("invalid date")?;
    let year = LookbackWindow::last_year(today);
    let month = LookbackWindow::last_days(30, today);
    let week = LookbackWindow::last_days(7, today);

    let mut account = InMemoryAccount::new();
    let campaign = account.add_campaign("City breaks");
    // 2% conversion rate over every window
    account.set_baseline(campaign, &year, PerformanceSnapshot::new(100_000, 2000.0, 50_000.0, 0.0));
    account.set_baseline(campaign, &month, PerformanceSnapshot::new(10_000, 200.0, 5000.0, 0.0));
    account.set_baseline(campaign, &week, PerformanceSnapshot::new(2500, 50.0, 1250.0, 0.0));

    let london = account.add_target(campaign, "London", Dimension::Location, 1.0)?;
    let lisbon = account.add_target(campaign, "Lisbon", Dimension::Location, 1.0)?;
    let oslo = account.add_target(campaign, "Oslo", Dimension::Location, 1.0)?;
    let reykjavik = account.add_target(campaign, "Reykjavik", Dimension::Location, 1.0)?;

    // London: 4% over the year with plenty of data, 1% recently
    account.set_performance(london, &year, PerformanceSnapshot::new(5000, 200.0, 2500.0, 0.0));
    account.set_performance(london, &month, PerformanceSnapshot::new(6000, 60.0, 3000.0, 0.0));
    account.set_performance(london, &week, PerformanceSnapshot::new(6000, 60.0, 3000.0, 0.0));
    // Lisbon: new, only enough in the last 30 days at 1%
    account.set_performance(lisbon, &year, PerformanceSnapshot::new(900, 30.0, 300.0, 0.0));
    account.set_performance(lisbon, &month, PerformanceSnapshot::new(6000, 60.0, 2000.0, 0.0));
    // Oslo: a burst in the last week, 4%
    account.set_performance(oslo, &year, PerformanceSnapshot::new(400, 8.0, 200.0, 0.0));
    account.set_performance(oslo, &month, PerformanceSnapshot::new(400, 8.0, 200.0, 0.0));
    account.set_performance(oslo, &week, PerformanceSnapshot::new(1500, 60.0, 400.0, 0.0));
    // Reykjavik: never enough
    account.set_performance(reykjavik, &year, PerformanceSnapshot::new(300, 3.0, 90.0, 0.0));

    let config = BidAdjustmentConfig::location_modifiers();
    let mut tagger = InMemoryTagger::default();
    let report = run_adjustment_pass(
        &mut account,
        Some(&mut tagger),
        &CampaignScope::new(vec![campaign]),
        Dimension::Location,
        &[week.clone(), month.clone(), year.clone()],
        &config,
        logger,
    )?;

    for outcome in &report.outcomes {
        logln!(
            logger,
            LogEvent::Scenario,
            "{:<10} {:<12} {:.2} -> {:.2} {}",
            outcome.target_name,
            outcome.window,
            outcome.old_bid,
            outcome.new_bid,
            outcome.reason.as_str()
        );
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Validation Results ===");
    let mut errors: Vec<String> = Vec::new();

    let london_outcomes = report.outcomes_for(&london);
    check(
        logger,
        &mut errors,
        london_outcomes.len() == 1 && london_outcomes[0].window == year.name && london_outcomes[0].reason == OutcomeReason::Increased,
        format!("London decided once, over the year, upward ({} evaluations)", london_outcomes.len()),
    );

    let lisbon_windows: Vec<&str> = report.outcomes_for(&lisbon).iter().map(|o| o.window.as_str()).collect();
    check(
        logger,
        &mut errors,
        lisbon_windows == [year.name.as_str(), month.name.as_str()] && account.bid(&lisbon).map_or(false, |bid| (bid - 0.95).abs() < 1e-9),
        format!("Lisbon decided in the 30 day window: {:?}, modifier {:?}", lisbon_windows, account.bid(&lisbon)),
    );

    let oslo_outcomes = report.outcomes_for(&oslo);
    check(
        logger,
        &mut errors,
        oslo_outcomes.len() == 3 && oslo_outcomes[2].window == week.name && oslo_outcomes[2].reason == OutcomeReason::Increased,
        format!("Oslo decided in the 7 day window ({} evaluations)", oslo_outcomes.len()),
    );

    check(
        logger,
        &mut errors,
        report.swept == vec![reykjavik] && account.bid(&reykjavik) == Some(1.0),
        format!("Only Reykjavik was swept unchanged: {:?}", report.swept),
    );

    check(
        logger,
        &mut errors,
        !tagger.is_marked(&reykjavik) && tagger.tags.is_empty(),
        "No processing mark left behind".to_string(),
    );

    finish(scenario_name, errors)
}
