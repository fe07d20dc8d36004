/// Ad group CPCs held to a minimum return on ad spend of 4.
///
/// Validates that:
/// - An ad group earning too little per click snaps straight down to 25% of its revenue per click
/// - A profitable ad group only climbs by the 0.10 step cap
/// - An ad group with few conversions and spend above 40 drops to the CPC one more average conversion would pay for
/// - Aggressive bidding keeps the CPC of an ad group already inside the cost-of-sales limit

use chrono::NaiveDate;

use bidnudge::config::{BidAdjustmentConfig, TargetFormula};
use bidnudge::decision::OutcomeReason;
use bidnudge::in_memory_account::InMemoryAccount;
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::orchestrator::{run_adjustment_pass, AdjustmentReport, CampaignScope};
use bidnudge::types::{CampaignId, Dimension, EntityKey, PerformanceSnapshot};
use bidnudge::windows::LookbackWindow;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "min_roas_ad_groups",
    run,
});

struct AdGroups {
    account: InMemoryAccount,
    campaign: CampaignId,
    thin_margin: EntityKey,
    profitable: EntityKey,
    expensive: EntityKey,
    inside_margin: EntityKey,
}

fn prepare_account(window: &LookbackWindow) -> Result<AdGroups, Box<dyn std::error::Error>> {
    let mut account = InMemoryAccount::new();
    let campaign = account.add_campaign("Shop");
    let thin_margin = account.add_target(campaign, "Socks", Dimension::AdGroup, 0.90)?;
    let profitable = account.add_target(campaign, "Boots", Dimension::AdGroup, 0.80)?;
    let expensive = account.add_target(campaign, "Sandals", Dimension::AdGroup, 0.80)?;
    let inside_margin = account.add_target(campaign, "Slippers", Dimension::AdGroup, 0.80)?;

    // 2.00 revenue per click, 37.5% cost of sales
    account.set_performance(thin_margin, window, PerformanceSnapshot::new(200, 10.0, 150.0, 400.0));
    // 20.00 revenue per click
    account.set_performance(profitable, window, PerformanceSnapshot::new(100, 10.0, 80.0, 2000.0));
    // two conversions for 60, (80 + 40 assumed) / 75 clicks * 25% = 0.40
    account.set_performance(expensive, window, PerformanceSnapshot::new(75, 2.0, 60.0, 80.0));
    // 2.00 revenue per click, 20% cost of sales
    account.set_performance(inside_margin, window, PerformanceSnapshot::new(200, 10.0, 80.0, 400.0));

    Ok(AdGroups { account, campaign, thin_margin, profitable, expensive, inside_margin })
}

fn run_variant(config: &BidAdjustmentConfig, window: &LookbackWindow, logger: &mut Logger) -> Result<(AdGroups, AdjustmentReport), Box<dyn std::error::Error>> {
    let mut ad_groups = prepare_account(window)?;
    let report = run_adjustment_pass(
        &mut ad_groups.account,
        None,
        &CampaignScope::new(vec![ad_groups.campaign]),
        Dimension::AdGroup,
        std::slice::from_ref(window),
        config,
        logger,
    )?;
    for outcome in &report.outcomes {
        logln!(
            logger,
            LogEvent::Scenario,
            "{:<10} {:.2} -> {:.2} {}{}",
            outcome.target_name,
            outcome.old_bid,
            outcome.new_bid,
            outcome.reason.as_str(),
            outcome.target_bid.map(|t| format!(", target {:.2}", t)).unwrap_or_default()
        );
    }
    Ok((ad_groups, report))
}

fn reason_of(report: &AdjustmentReport, key: &EntityKey) -> Option<OutcomeReason> {
    report.outcomes_for(key).first().map(|o| o.reason)
}

fn bid_is(ad_groups: &AdGroups, key: &EntityKey, expected: f64) -> bool {
    ad_groups.account.bid(key).map_or(false, |bid| (bid - expected).abs() < 1e-9)
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: ad group CPC with minimum ROAS 4 ===");
    let today = NaiveDate::from_ymd_opt(2024, 11, 20).ok_or("invalid date")?;
    let window = LookbackWindow::last_days(90, today);
    let mut errors: Vec<String> = Vec::new();

    let config = BidAdjustmentConfig::ad_group_min_roas();
    logln!(logger, LogEvent::Scenario, "--- Standard ---");
    let (ad_groups, report) = run_variant(&config, &window, logger)?;

    check(
        logger,
        &mut errors,
        reason_of(&report, &ad_groups.thin_margin) == Some(OutcomeReason::Decreased) && bid_is(&ad_groups, &ad_groups.thin_margin, 0.50),
        format!("Thin margin ad group snapped to 0.50: {:?}", ad_groups.account.bid(&ad_groups.thin_margin)),
    );
    check(
        logger,
        &mut errors,
        reason_of(&report, &ad_groups.profitable) == Some(OutcomeReason::Increased) && bid_is(&ad_groups, &ad_groups.profitable, 0.90),
        format!("Profitable ad group raised by the step cap only: {:?}", ad_groups.account.bid(&ad_groups.profitable)),
    );
    check(
        logger,
        &mut errors,
        reason_of(&report, &ad_groups.expensive) == Some(OutcomeReason::ForcedDecreaseHighCost) && bid_is(&ad_groups, &ad_groups.expensive, 0.40),
        format!("Expensive ad group lowered to 0.40: {:?}", ad_groups.account.bid(&ad_groups.expensive)),
    );
    check(
        logger,
        &mut errors,
        reason_of(&report, &ad_groups.inside_margin) == Some(OutcomeReason::Decreased),
        "Without aggressive bidding the ad group inside the margin follows revenue per click".to_string(),
    );

    let aggressive = BidAdjustmentConfig {
        target_formula: TargetFormula::PROFIT_MARGIN_CPC {
            profit_margin_fraction: 0.25,
            aggressive: true,
            round_to_quarter: false,
            assumed_conversion_value: 40.0,
        },
        ..config
    };
    logln!(logger, LogEvent::Scenario, "--- Aggressive ---");
    let (ad_groups, report) = run_variant(&aggressive, &window, logger)?;
    check(
        logger,
        &mut errors,
        reason_of(&report, &ad_groups.inside_margin) == Some(OutcomeReason::NoChangeInsufficientDelta) && bid_is(&ad_groups, &ad_groups.inside_margin, 0.80),
        format!("Aggressive bidding kept the CPC inside the margin: {:?}", ad_groups.account.bid(&ad_groups.inside_margin)),
    );
    check(
        logger,
        &mut errors,
        bid_is(&ad_groups, &ad_groups.thin_margin, 0.50),
        "Aggressive bidding still lowers the ad group outside the margin".to_string(),
    );

    finish(scenario_name, errors)
}
