/// Keyword CPCs stepped by a quarter toward conversion value per click, run daily for 45 days.
///
/// Validates that:
/// - No regular step moves a keyword more than 0.25, and never past its computed target
/// - CPCs end closer to the value per click they would settle on
/// - Targets below the current CPC are rounded down to a quarter before the step

use bidnudge::config::BidAdjustmentConfig;
use bidnudge::decision::OutcomeReason;
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::simulation::{DailySimulation, SimulationParams};

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "keyword_cpc",
    run,
});

const DAYS: usize = 45;

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: keyword CPC over {} daily passes ===", DAYS);

    let config = BidAdjustmentConfig::keyword_cpc();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 2, 1).ok_or("invalid start date")?;
    let mut simulation = DailySimulation::new(SimulationParams::keywords(2, 5), config.clone(), start)?;
    let trace = simulation.run(DAYS, logger)?;

    for entity in &trace.entities {
        logln!(
            logger,
            LogEvent::Scenario,
            "{}: {:.2} -> {:.2} (value per click {:.2}, last target {})",
            entity.label,
            entity.bids[0],
            entity.final_bid(),
            entity.ideal_bid,
            entity.last_target.map(|t| format!("{:.2}", t)).unwrap_or_else(|| "none".to_string())
        );
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Validation Results ===");
    let mut errors: Vec<String> = Vec::new();

    // the high-cost override may drop a keyword further in one go
    let largest_move = trace
        .reports
        .iter()
        .flat_map(|r| r.outcomes.iter())
        .filter(|o| o.reason != OutcomeReason::ForcedDecreaseHighCost)
        .map(|o| (o.new_bid - o.old_bid).abs())
        .fold(0.0, f64::max);
    check(
        logger,
        &mut errors,
        largest_move <= config.increment + 1e-9,
        format!("Largest regular move within a quarter: {:.4}", largest_move),
    );

    let overshoots = trace
        .reports
        .iter()
        .flat_map(|r| r.outcomes.iter())
        .filter(|o| match o.target_bid {
            Some(target) if o.new_bid > o.old_bid => o.new_bid > target.max(config.floor) + 1e-9,
            Some(target) if o.new_bid < o.old_bid => o.new_bid < target.min(config.ceiling) - 1e-9,
            _ => false,
        })
        .count();
    check(logger, &mut errors, overshoots == 0, format!("No step went past its target ({} did)", overshoots));

    let initial = trace.mean_initial_distance();
    let last = trace.mean_final_distance();
    check(
        logger,
        &mut errors,
        last < initial,
        format!("Mean distance to value per click shrank: {:.4} -> {:.4}", initial, last),
    );

    // a target under the current CPC comes from the margin limit, never from the step cap
    let unrounded = trace
        .reports
        .iter()
        .flat_map(|r| r.outcomes.iter())
        .filter_map(|o| o.target_bid.filter(|t| *t < o.old_bid))
        .filter(|t| *t >= 0.25 && ((t * 4.0).round() - t * 4.0).abs() > 1e-9)
        .count();
    check(logger, &mut errors, unrounded == 0, format!("Decrease targets rounded down to a quarter ({} were not)", unrounded));

    finish(scenario_name, errors)
}
