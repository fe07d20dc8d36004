/// Device modifiers re-adjusted once a day for 60 days on a synthetic account.
///
/// Validates that:
/// - Every daily move is at most one increment and stays inside [floor, ceiling]
/// - Modifiers end up closer to the conversion-rate ratio they would settle on with perfect data
/// - Devices that start far from their settled modifier move toward it

use bidnudge::config::BidAdjustmentConfig;
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::simulation::{DailySimulation, SimulationParams};

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "device_convergence",
    run,
});

const DAYS: usize = 60;

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: device modifiers over {} daily passes ===", DAYS);

    let config = BidAdjustmentConfig::device_modifiers();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid start date")?;
    let mut simulation = DailySimulation::new(SimulationParams::devices(4), config.clone(), start)?;
    let trace = simulation.run(DAYS, logger)?;

    for entity in &trace.entities {
        logln!(
            logger,
            LogEvent::Scenario,
            "{}: {:.2} -> {:.2} (settles at {:.2})",
            entity.label,
            entity.bids[0],
            entity.final_bid(),
            entity.ideal_bid
        );
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Validation Results ===");
    let mut errors: Vec<String> = Vec::new();

    let mut largest_move: f64 = 0.0;
    let mut in_bounds = true;
    for entity in &trace.entities {
        for pair in entity.bids.windows(2) {
            largest_move = largest_move.max((pair[1] - pair[0]).abs());
            in_bounds &= pair[1] >= config.floor - 1e-9 && pair[1] <= config.ceiling + 1e-9;
        }
    }
    check(
        logger,
        &mut errors,
        largest_move <= config.increment + 1e-9,
        format!("Largest daily move is within one increment: {:.4} <= {:.4}", largest_move, config.increment),
    );
    check(logger, &mut errors, in_bounds, format!("All modifiers stayed within [{:.2}, {:.2}]", config.floor, config.ceiling));

    let initial = trace.mean_initial_distance();
    let last = trace.mean_final_distance();
    check(
        logger,
        &mut errors,
        last < initial,
        format!("Mean distance to settled modifier shrank: {:.4} -> {:.4}", initial, last),
    );

    let far: Vec<_> = trace.entities.iter().filter(|e| (e.ideal_bid - e.bids[0]).abs() >= 0.3).collect();
    let wrong_direction = far
        .iter()
        .filter(|e| (e.final_bid() - e.bids[0]) * (e.ideal_bid - e.bids[0]) <= 0.0)
        .count();
    check(
        logger,
        &mut errors,
        wrong_direction == 0,
        format!("Devices far from their settled modifier moved toward it: {} of {} did not", wrong_direction, far.len()),
    );

    finish(scenario_name, errors)
}
