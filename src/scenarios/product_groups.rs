/// Shopping ad group CPCs adjusted for minimum ROAS, then pushed down to their product groups.
///
/// Validates that:
/// - Every biddable leaf ends up with the CPC its ad group was adjusted to
/// - Excluded subtrees and inner nodes never receive a bid
/// - An ad group with an unusable CPC is skipped while the others still propagate
/// - Campaigns outside the name filter are left alone

use chrono::NaiveDate;

use bidnudge::config::BidAdjustmentConfig;
use bidnudge::in_memory_account::InMemoryAccount;
use bidnudge::logger::{LogEvent, Logger};
use bidnudge::logln;
use bidnudge::orchestrator::{run_adjustment_pass, CampaignScope};
use bidnudge::product_groups::{propagate_ad_group_bids, ProductGroupNode, ShoppingAdGroup};
use bidnudge::types::{Dimension, PerformanceSnapshot};
use bidnudge::windows::LookbackWindow;

use crate::scenarios::{check, finish};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "product_groups",
    run,
});

fn apparel_tree() -> Vec<ProductGroupNode> {
    vec![ProductGroupNode::subdivision(
        "All products",
        vec![
            ProductGroupNode::subdivision(
                "Jackets",
                vec![ProductGroupNode::leaf("Rain", Some(1.20)), ProductGroupNode::leaf("Down", None)],
            ),
            ProductGroupNode {
                name: "Returns".to_string(),
                excluded: true,
                max_cpc: None,
                children: vec![ProductGroupNode::leaf("Damaged", Some(0.05))],
            },
            ProductGroupNode::leaf("Everything else", Some(0.30)),
        ],
    )]
}

fn shoes_tree() -> Vec<ProductGroupNode> {
    vec![ProductGroupNode::subdivision(
        "All products",
        vec![ProductGroupNode::leaf("Trail", Some(0.70)), ProductGroupNode::excluded("Everything else")],
    )]
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: shopping product groups ===");

    let today = NaiveDate::from_ymd_opt(2024, 12, 1).ok_or("invalid date")?;
    let window = LookbackWindow::last_days(90, today);
    let mut account = InMemoryAccount::new();
    let campaign = account.add_campaign("Shopping");
    let apparel = account.add_target(campaign, "Apparel", Dimension::AdGroup, 1.00)?;
    let shoes = account.add_target(campaign, "Shoes", Dimension::AdGroup, 0.60)?;
    // 4.00 revenue per click -> 1.00 at 25%, already there
    account.set_performance(apparel, &window, PerformanceSnapshot::new(500, 20.0, 450.0, 2000.0));
    // 3.20 revenue per click -> 0.80, capped at one 0.10 step up
    account.set_performance(shoes, &window, PerformanceSnapshot::new(250, 8.0, 150.0, 800.0));
    let search = account.add_campaign("Search - Shoes");
    let search_group = account.add_target(search, "Shoes exact", Dimension::AdGroup, 0.60)?;
    account.set_performance(search_group, &window, PerformanceSnapshot::new(250, 8.0, 150.0, 800.0));

    let scope = CampaignScope::filtered(&account.campaigns(), "shopping", "search");

    let report = run_adjustment_pass(
        &mut account,
        None,
        &scope,
        Dimension::AdGroup,
        std::slice::from_ref(&window),
        &BidAdjustmentConfig::ad_group_min_roas(),
        logger,
    )?;
    logln!(logger, LogEvent::Scenario, "{}", report.summary_string());

    let apparel_cpc = account.bid(&apparel).ok_or("apparel ad group missing")?;
    let shoes_cpc = account.bid(&shoes).ok_or("shoes ad group missing")?;
    let mut ad_groups = vec![
        ShoppingAdGroup { name: "Apparel".to_string(), cpc: apparel_cpc, product_groups: apparel_tree() },
        ShoppingAdGroup { name: "Shoes".to_string(), cpc: shoes_cpc, product_groups: shoes_tree() },
        ShoppingAdGroup { name: "Imported".to_string(), cpc: f64::NAN, product_groups: shoes_tree() },
    ];
    let updated = propagate_ad_group_bids(&mut ad_groups, logger);

    for ad_group in &ad_groups {
        let leaves: Vec<Option<f64>> = ad_group.product_groups.iter().flat_map(|n| n.leaf_bids()).collect();
        logln!(logger, LogEvent::Scenario, "{:<10} cpc {:.2} leaves {:?}", ad_group.name, ad_group.cpc, leaves);
    }

    logln!(logger, LogEvent::Scenario, "");
    logln!(logger, LogEvent::Scenario, "=== Validation Results ===");
    let mut errors: Vec<String> = Vec::new();

    check(
        logger,
        &mut errors,
        (apparel_cpc - 1.00).abs() < 1e-9 && (shoes_cpc - 0.70).abs() < 1e-9,
        format!("Ad group CPCs after the pass: apparel {:.2}, shoes {:.2}", apparel_cpc, shoes_cpc),
    );
    check(
        logger,
        &mut errors,
        scope.campaign_ids() == [campaign] && account.bid(&search_group) == Some(0.60),
        "Search campaign filtered out of the pass".to_string(),
    );
    check(logger, &mut errors, updated == 4, format!("Four product groups updated: {}", updated));

    let apparel_leaves = ad_groups[0].product_groups[0].leaf_bids();
    check(
        logger,
        &mut errors,
        apparel_leaves.iter().all(|bid| *bid == Some(apparel_cpc)) && apparel_leaves.len() == 3,
        format!("Apparel leaves carry the ad group CPC: {:?}", apparel_leaves),
    );

    let returns = &ad_groups[0].product_groups[0].children[1];
    check(
        logger,
        &mut errors,
        returns.max_cpc.is_none() && returns.children[0].max_cpc == Some(0.05) && ad_groups[0].product_groups[0].max_cpc.is_none(),
        "Excluded subtree and inner nodes carry no new bid".to_string(),
    );

    check(
        logger,
        &mut errors,
        ad_groups[1].product_groups[0].leaf_bids() == vec![Some(shoes_cpc)],
        "Shoes leaf raised with its ad group".to_string(),
    );
    check(
        logger,
        &mut errors,
        ad_groups[2].product_groups == shoes_tree(),
        "Ad group with an unusable CPC left untouched".to_string(),
    );

    finish(scenario_name, errors)
}
