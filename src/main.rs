mod scenarios;

use bidnudge::charts;
use bidnudge::logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, LogReceiver, Logger};
use bidnudge::utils::{RAND_SEED, TOTAL_ADJUSTMENT_PASSES};
use bidnudge::{log, logln};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use scenarios::get_scenario_catalog;

/// Open a log file receiver, falling back to nothing when the file cannot be created
fn file_receiver(path: &str, events: Vec<LogEvent>) -> Option<Box<dyn LogReceiver>> {
    match FileReceiver::new(&PathBuf::from(path), events) {
        Ok(receiver) => Some(receiver),
        Err(e) => {
            eprintln!("Warning: cannot write {}: {}", path, e);
            None
        }
    }
}

fn parse_number(args: &[String], index: usize, what: &str, default: u64) -> u64 {
    match args.get(index) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("Error: Invalid {} parameter '{}'. Expected a number.", what, raw);
                std::process::exit(1);
            }
        },
    }
}

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();

    // Filter out --fastbreak
    let fastbreak = raw_args.iter().any(|arg| arg == "--fastbreak");
    let args: Vec<String> = raw_args.into_iter().filter(|arg| arg != "--fastbreak").collect();

    if args.len() > 1 && args[1] == "charts" {
        let mut logger = Logger::new();
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Pass]));
        match charts::generate_all_charts(&mut logger) {
            Ok(()) => {
                println!("All chart generation completed successfully.");
            }
            Err(e) => {
                eprintln!("Error generating charts: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if args.len() > 1 && args[1] == "list" {
        for scenario in get_scenario_catalog() {
            println!("{}", scenario.short_name);
        }
        return;
    }

    if args.len() > 1 {
        let scenario_arg = &args[1];
        let iterations = parse_number(&args, 2, "iterations", 1);
        let start_iteration = parse_number(&args, 3, "start iteration", 0);

        let all_scenarios = get_scenario_catalog();
        let scenarios: Vec<_> = if scenario_arg == "all" {
            all_scenarios.clone()
        } else {
            match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
                Some(scenario) => vec![scenario.clone()],
                None => {
                    eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                    eprintln!("Available scenarios:");
                    for s in &all_scenarios {
                        eprintln!("  - {}", s.short_name);
                    }
                    std::process::exit(1);
                }
            }
        };

        // Scenario lines only on the console for a single scenario run once
        let mut logger = Logger::new();
        if scenario_arg != "all" && iterations == 1 {
            logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
        } else {
            logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
        }
        let summary_receiver_id = file_receiver("log/summary.log", vec![LogEvent::Validation]).map(|r| logger.add_receiver(r));

        TOTAL_ADJUSTMENT_PASSES.store(0, Ordering::Relaxed);
        let what = if scenario_arg == "all" { "all scenarios".to_string() } else { format!("scenario '{}'", scenario_arg) };
        if iterations > 1 {
            logln!(&mut logger, LogEvent::Validation, "Running {} {} times...\n", what, iterations);
        } else {
            logln!(&mut logger, LogEvent::Validation, "Running {}...\n", what);
        }

        let mut failures = 0;
        'scenarios: for scenario in &scenarios {
            log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

            let scenario_receiver_id = file_receiver(
                &format!("log/{}/scenario.log", sanitize_filename(scenario.short_name)),
                vec![LogEvent::Scenario, LogEvent::Pass],
            )
            .map(|r| logger.add_receiver(r));

            for i in start_iteration..(start_iteration + iterations) {
                if iterations > 1 {
                    log!(&mut logger, LogEvent::Validation, "[{}/{}] ", i - start_iteration + 1, iterations);
                }

                RAND_SEED.store(i, Ordering::Relaxed);

                match (scenario.run)(scenario.short_name, &mut logger) {
                    Ok(()) => {
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✓");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✗");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                        }

                        if fastbreak {
                            if let Some(id) = scenario_receiver_id {
                                logger.remove_receiver(id);
                            }
                            logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                            logln!(
                                &mut logger,
                                LogEvent::Validation,
                                "Error at iteration {}/{} (seed {}): {}",
                                i - start_iteration + 1,
                                iterations,
                                i,
                                e
                            );
                            break 'scenarios;
                        }
                    }
                }

                let _ = logger.flush();
            }

            if let Some(id) = scenario_receiver_id {
                logger.remove_receiver(id);
            }
        }

        logln!(
            &mut logger,
            LogEvent::Validation,
            "\nTotal adjustment passes completed: {}",
            TOTAL_ADJUSTMENT_PASSES.load(Ordering::Relaxed)
        );
        if let Some(id) = summary_receiver_id {
            logger.remove_receiver(id);
        }
        if failures > 0 {
            std::process::exit(1);
        }
    } else {
        // Default: daily device convergence with pass level output
        let mut logger = Logger::new();
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Pass, LogEvent::Scenario, LogEvent::Validation]));
        if let Err(e) = scenarios::device_convergence::run("device_convergence", &mut logger) {
            eprintln!("Error running scenario: {}", e);
            std::process::exit(1);
        }
    }
}
