/// Ad schedule slots and keywords that spend without converting.
///
/// Validates that:
/// - A slot with no conversions and spend above the threshold is stepped down whatever its ratio says
/// - A positive modifier is reset to at most 1.0 on the way down when the preset asks for it
/// - With the mark left in place a shorter window may step the slot down again; clearing it stops that
/// - The cost-per-conversion basis fires on expensive conversions even when some exist, and the
///   keyword drops to the quarter-rounded CPC one more conversion would pay for

use chrono::NaiveDate;

use bidnudge::config::BidAdjustmentConfig;
use bidnudge::decision::OutcomeReason;
use bidnudge::in_memory_account::InMemoryAccount;
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::orchestrator::{run_adjustment_pass, AdjustmentReport, CampaignScope};
use bidnudge::types::{Dimension, EntityKey, PerformanceSnapshot};
use bidnudge::windows::LookbackWindow;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "high_cost_override",
    run,
});

fn today() -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::from_ymd_opt(2024, 9, 2).ok_or_else(|| "invalid date".into())
}

/// Night slot burning 150 with no conversions in both windows
fn run_schedule(config: &BidAdjustmentConfig, logger: &mut Logger) -> Result<(InMemoryAccount, EntityKey, AdjustmentReport), Box<dyn std::error::Error>> {
    let windows = [LookbackWindow::last_days(30, today()?), LookbackWindow::last_days(7, today()?)];
    let mut account = InMemoryAccount::new();
    let campaign = account.add_campaign("Always on");
    for window in &windows {
        account.set_baseline(campaign, window, PerformanceSnapshot::new(5000, 100.0, 2500.0, 0.0));
    }
    let night = account.add_target(campaign, "Mon 00:00-06:00", Dimension::AdSchedule, 1.3)?;
    for window in &windows {
        account.set_performance(night, window, PerformanceSnapshot::new(300, 0.0, 150.0, 0.0));
    }

    let report = run_adjustment_pass(
        &mut account,
        None,
        &CampaignScope::new(vec![campaign]),
        Dimension::AdSchedule,
        &windows,
        config,
        logger,
    )?;
    Ok((account, night, report))
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: high cost override ===");
    let mut errors: Vec<String> = Vec::new();

    let keep_mark = BidAdjustmentConfig::ad_schedule_modifiers();
    let (account, night, report) = run_schedule(&keep_mark, logger)?;
    logln!(logger, LogEvent::Scenario, "Mark kept: {}", report.summary_string());
    let forced = report.count(OutcomeReason::ForcedDecreaseHighCost);
    let bid = account.bid(&night).unwrap_or(f64::NAN);
    check(
        logger,
        &mut errors,
        forced == 2 && (bid - 0.95).abs() < 1e-9,
        format!("Mark kept: forced twice, reset to 1.00 then one step to 0.95: {} forced, modifier {:.2}", forced, bid),
    );
    check(logger, &mut errors, report.swept == vec![night], "Mark kept: slot swept at the end".to_string());

    let clear_mark = BidAdjustmentConfig { clear_mark_on_override: true, ..keep_mark };
    let (account, night, report) = run_schedule(&clear_mark, logger)?;
    logln!(logger, LogEvent::Scenario, "Mark cleared: {}", report.summary_string());
    let forced = report.count(OutcomeReason::ForcedDecreaseHighCost);
    let bid = account.bid(&night).unwrap_or(f64::NAN);
    check(
        logger,
        &mut errors,
        forced == 1 && (bid - 1.0).abs() < 1e-9 && report.swept.is_empty(),
        format!("Mark cleared: forced once, modifier {:.2}", bid),
    );

    // keywords: 3 conversions for 150 is 50 per conversion against a 40 limit
    let window = LookbackWindow::last_days(30, today()?);
    let mut account = InMemoryAccount::new();
    let campaign = account.add_campaign("Search");
    let pricey = account.add_target(campaign, "cheap flights", Dimension::Keyword, 2.0)?;
    let fine = account.add_target(campaign, "flights to lisbon", Dimension::Keyword, 2.0)?;
    // (90 + 50 assumed) / 100 clicks = 1.40, rounded down to 1.25
    account.set_performance(pricey, &window, PerformanceSnapshot::new(100, 3.0, 150.0, 90.0));
    account.set_performance(fine, &window, PerformanceSnapshot::new(100, 5.0, 150.0, 250.0));
    let report = run_adjustment_pass(
        &mut account,
        None,
        &CampaignScope::new(vec![campaign]),
        Dimension::Keyword,
        &[window],
        &BidAdjustmentConfig::keyword_cpc(),
        logger,
    )?;
    logln!(logger, LogEvent::Scenario, "Keywords: {}", report.summary_string());
    let pricey_bid = account.bid(&pricey).unwrap_or(f64::NAN);
    check(
        logger,
        &mut errors,
        report.outcomes_for(&pricey).first().map(|o| o.reason) == Some(OutcomeReason::ForcedDecreaseHighCost) && (pricey_bid - 1.25).abs() < 1e-9,
        format!("Keyword at 50 per conversion lowered to 1.25: {:.2}", pricey_bid),
    );
    check(
        logger,
        &mut errors,
        report.outcomes_for(&fine).first().map(|o| o.reason) == Some(OutcomeReason::SkippedInsufficientData) && account.bid(&fine) == Some(2.0),
        "Keyword at 30 per conversion left alone".to_string(),
    );

    finish(scenario_name, errors)
}
