/// Device pass over three campaigns where one campaign rejects every write and another is gone.
///
/// Validates that:
/// - The pass completes and reports every entity even though writes fail
/// - Failed writes are reported with the attempted value and leave the stored modifier alone
/// - Entities in the healthy campaign are adjusted as usual
/// - An invalid configuration is rejected before anything is written

use chrono::NaiveDate;

use bidnudge::config::BidAdjustmentConfig;
use bidnudge::errors::BidError;
use bidnudge::in_memory_account::InMemoryAccount;
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::orchestrator::{run_adjustment_pass, CampaignScope};
use bidnudge::types::{Dimension, PerformanceSnapshot};
use bidnudge::windows::LookbackWindow;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "mutation_failures",
    run,
});

const DEVICES: [&str; 3] = ["Desktop", "Mobile", "Tablet"];

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: failing writes ===");

    let today = NaiveDate::from_ymd_opt(2024, 5, 10).ok_or("invalid date")?;
    let window = LookbackWindow::last_days(30, today);
    let mut account = InMemoryAccount::new();
    let healthy = account.add_campaign("Healthy");
    let locked = account.add_campaign("Locked");

    let mut locked_keys = Vec::new();
    let mut healthy_keys = Vec::new();
    for campaign in [healthy, locked] {
        account.set_baseline(campaign, &window, PerformanceSnapshot::new(3000, 120.0, 1500.0, 0.0));
        // 2%, 4% and 8% against a 4% baseline
        for (i, device) in DEVICES.iter().enumerate() {
            let key = account.add_target(campaign, device, Dimension::Device, 1.0)?;
            account.set_performance(key, &window, PerformanceSnapshot::new(1000, 20.0 * (1 << i) as f64, 500.0, 0.0));
            if campaign == locked {
                account.fail_mutations_for(key, "campaign is locked for editing");
                locked_keys.push(key);
            } else {
                healthy_keys.push(key);
            }
        }
    }

    let mut errors: Vec<String> = Vec::new();

    // campaign 7 does not exist
    let scope = CampaignScope::new(vec![healthy, locked, 7]);
    let invalid = BidAdjustmentConfig { increment: 0.0, ..BidAdjustmentConfig::device_modifiers() };
    let rejected = run_adjustment_pass(&mut account, None, &scope, Dimension::Device, std::slice::from_ref(&window), &invalid, logger);
    check(
        logger,
        &mut errors,
        matches!(rejected, Err(BidError::Configuration(_))) && account.mutations().is_empty(),
        "Zero increment rejected before any write".to_string(),
    );

    let report = run_adjustment_pass(
        &mut account,
        None,
        &scope,
        Dimension::Device,
        std::slice::from_ref(&window),
        &BidAdjustmentConfig::device_modifiers(),
        logger,
    )?;
    logln!(logger, LogEvent::Scenario, "{}", report.summary_string());
    for outcome in report.failed_mutations() {
        logln!(logger, LogEvent::Scenario, "{} {}: {}", outcome.key, outcome.target_name, outcome.mutation_error.as_deref().unwrap_or(""));
    }

    check(
        logger,
        &mut errors,
        report.outcomes.len() == 6,
        format!("Every existing entity reported: {} outcomes", report.outcomes.len()),
    );

    let failed: Vec<_> = report.failed_mutations().iter().map(|o| o.key).collect();
    // mobile sits at the baseline and needs no write
    check(
        logger,
        &mut errors,
        failed == vec![locked_keys[0], locked_keys[2]],
        format!("Only the locked desktop and tablet writes failed: {:?}", failed),
    );
    check(
        logger,
        &mut errors,
        locked_keys.iter().all(|k| account.bid(k) == Some(1.0)),
        "Locked campaign modifiers unchanged".to_string(),
    );

    let healthy_bids: Vec<Option<f64>> = healthy_keys.iter().map(|k| account.bid(k)).collect();
    let expected = [0.95, 1.0, 1.05];
    check(
        logger,
        &mut errors,
        healthy_bids.iter().zip(expected.iter()).all(|(bid, e)| bid.map_or(false, |b| (b - e).abs() < 1e-9)),
        format!("Healthy campaign adjusted: {:?}", healthy_bids),
    );

    finish(scenario_name, errors)
}
