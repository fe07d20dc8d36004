//! Multi-window adjustment pass.
//!
//! Every in-scope entity starts the pass marked as unprocessed. Windows are
//! walked from the longest to the shortest; within a window only entities that
//! are still marked get evaluated, and a decision backed by enough data claims
//! the entity so shorter windows leave it alone. Whatever is still marked at
//! the end is swept.

use crate::collaborators::{AdsAccountTrait, ProcessingTaggerTrait};
use crate::config::{BaselineSource, BidAdjustmentConfig};
use crate::decision::{decide, OutcomeReason};
use crate::errors::{BidError, BidResult};
use crate::logger::{LogEvent, Logger};
use crate::processing::ProcessingMarks;
use crate::target_formulas::{formula_for, TargetFormulaTrait};
use crate::types::{BidTarget, CampaignId, Dimension, EntityKey, LocationType, PerformanceSnapshot};
use crate::windows::{order_longest_first, LookbackWindow};
use crate::{errln, logln, warnln};

/// Entity-level selection applied to every campaign of a scope
///
/// Label names match exactly; an empty label filter is not applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    /// Only entities carrying this label
    pub label_include: String,
    /// Entities carrying this label are left alone
    pub label_ignore: String,
    pub ignored_location_types: Vec<LocationType>,
}

impl TargetFilter {
    pub fn accepts(&self, target: &BidTarget) -> bool {
        if !self.label_include.is_empty() && !target.has_label(&self.label_include) {
            return false;
        }
        if !self.label_ignore.is_empty() && target.has_label(&self.label_ignore) {
            return false;
        }
        match target.location_type {
            Some(location_type) => !self.ignored_location_types.contains(&location_type),
            None => true,
        }
    }
}

/// Campaigns a pass works on, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignScope {
    campaign_ids: Vec<CampaignId>,
    target_filter: TargetFilter,
}

impl CampaignScope {
    /// Duplicates are dropped, first occurrence wins
    pub fn new(campaign_ids: Vec<CampaignId>) -> Self {
        let mut unique = Vec::with_capacity(campaign_ids.len());
        for campaign_id in campaign_ids {
            if !unique.contains(&campaign_id) {
                unique.push(campaign_id);
            }
        }
        Self { campaign_ids: unique, target_filter: TargetFilter::default() }
    }

    pub fn with_target_filter(mut self, target_filter: TargetFilter) -> Self {
        self.target_filter = target_filter;
        self
    }

    /// Campaigns whose name contains `include` and does not contain `exclude`, ignoring case
    ///
    /// An empty filter string is not applied.
    pub fn filtered(campaigns: &[(CampaignId, String)], include: &str, exclude: &str) -> Self {
        let include = include.to_lowercase();
        let exclude = exclude.to_lowercase();
        let ids = campaigns
            .iter()
            .filter(|(_, name)| {
                let name = name.to_lowercase();
                (include.is_empty() || name.contains(&include)) && (exclude.is_empty() || !name.contains(&exclude))
            })
            .map(|(id, _)| *id)
            .collect();
        Self::new(ids)
    }

    pub fn campaign_ids(&self) -> &[CampaignId] {
        &self.campaign_ids
    }

    pub fn target_filter(&self) -> &TargetFilter {
        &self.target_filter
    }
}

/// What happened to one entity in one window
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentOutcome {
    pub key: EntityKey,
    pub target_name: String,
    pub window: String,
    pub old_bid: f64,
    /// Bid the entity carries after this evaluation; equals `old_bid` when the write failed
    pub new_bid: f64,
    pub target_bid: Option<f64>,
    pub reason: OutcomeReason,
    pub mutation_error: Option<String>,
}

/// Per-entity outcomes of one pass, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentReport {
    pub outcomes: Vec<AdjustmentOutcome>,
    /// Entities no window claimed
    pub swept: Vec<EntityKey>,
}

impl AdjustmentReport {
    pub fn count(&self, reason: OutcomeReason) -> usize {
        self.outcomes.iter().filter(|o| o.reason == reason).count()
    }

    pub fn outcomes_for(&self, key: &EntityKey) -> Vec<&AdjustmentOutcome> {
        self.outcomes.iter().filter(|o| o.key == *key).collect()
    }

    /// Bid after the last evaluation of an entity, None if it was never evaluated
    pub fn final_bid(&self, key: &EntityKey) -> Option<f64> {
        self.outcomes.iter().rev().find(|o| o.key == *key).map(|o| o.new_bid)
    }

    pub fn failed_mutations(&self) -> Vec<&AdjustmentOutcome> {
        self.outcomes.iter().filter(|o| o.mutation_error.is_some()).collect()
    }

    /// Number of bids actually written
    pub fn mutation_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.mutation_error.is_none() && o.new_bid != o.old_bid)
            .count()
    }

    pub fn summary_string(&self) -> String {
        format!(
            "evaluations: {}, increased: {}, decreased: {}, forced: {}, unchanged: {}, at limit: {}, skipped: {}, failed writes: {}, swept: {}",
            self.outcomes.len(),
            self.count(OutcomeReason::Increased),
            self.count(OutcomeReason::Decreased),
            self.count(OutcomeReason::ForcedDecreaseHighCost),
            self.count(OutcomeReason::NoChangeInsufficientDelta),
            self.count(OutcomeReason::NoChangeAtLimit),
            self.count(OutcomeReason::SkippedInsufficientData),
            self.failed_mutations().len(),
            self.swept.len()
        )
    }
}

/// Run one adjustment pass over a scope
///
/// # Arguments
/// * `account` - Selection, reporting and bid persistence
/// * `tagger` - Optional mirror of the processing marks
/// * `scope` - Campaigns to work on
/// * `dimension` - Which entities of those campaigns get adjusted
/// * `windows` - Lookback windows, evaluated longest first whatever their given order
/// * `config` - Tunables of this pass
/// * `logger` - Logger for entity, campaign, window and pass events
///
/// # Returns
/// The full report, or a `Configuration` error raised before any entity is touched
pub fn run_adjustment_pass(
    account: &mut dyn AdsAccountTrait,
    tagger: Option<&mut dyn ProcessingTaggerTrait>,
    scope: &CampaignScope,
    dimension: Dimension,
    windows: &[LookbackWindow],
    config: &BidAdjustmentConfig,
    logger: &mut Logger,
) -> BidResult<AdjustmentReport> {
    config.validate(dimension)?;
    BidAdjustmentConfig::validate_windows(windows)?;

    let windows = order_longest_first(windows);
    let formula = formula_for(&config.target_formula);
    logln!(
        logger,
        LogEvent::Pass,
        "Adjusting {} bids in {} campaigns using {}",
        dimension.name(),
        scope.campaign_ids().len(),
        formula.formula_string()
    );

    let mut targets: Vec<BidTarget> = Vec::new();
    for &campaign_id in scope.campaign_ids() {
        match account.targets(campaign_id, dimension) {
            Ok(found) => {
                for target in found {
                    if is_baseline_entity(&target, &config.baseline_source) {
                        logln!(logger, LogEvent::Entity, "{} is the baseline, not adjusted", target.label());
                    } else if scope.target_filter().accepts(&target) {
                        targets.push(target);
                    } else {
                        logln!(logger, LogEvent::Entity, "{} filtered out", target.label());
                    }
                }
            }
            Err(e) => {
                warnln!(logger, LogEvent::Campaign, "{}: {}", account.campaign_name(campaign_id), e);
            }
        }
    }

    let keys: Vec<EntityKey> = targets.iter().map(|t| t.key).collect();
    let mut marks = ProcessingMarks::new(tagger);
    marks.mark_all(&keys, logger);

    let mut report = AdjustmentReport::default();
    for window in &windows {
        let evaluated_before = report.outcomes.len();
        let mut claimed = 0;
        for &campaign_id in scope.campaign_ids() {
            claimed += run_campaign_window(
                account,
                &mut marks,
                &mut targets,
                campaign_id,
                window,
                formula.as_ref(),
                config,
                &mut report,
                logger,
            );
        }
        logln!(
            logger,
            LogEvent::Window,
            "{}: evaluated {}, claimed {}, still marked {}",
            window,
            report.outcomes.len() - evaluated_before,
            claimed,
            marks.unprocessed().len()
        );
    }

    report.swept = marks.sweep(logger);
    for key in &report.swept {
        logln!(logger, LogEvent::Entity, "{} not claimed by any window", key);
    }
    logln!(logger, LogEvent::Pass, "{}", report.summary_string());
    Ok(report)
}

/// Evaluate the still-marked entities of one campaign in one window, returns how many got claimed
#[allow(clippy::too_many_arguments)]
fn run_campaign_window(
    account: &mut dyn AdsAccountTrait,
    marks: &mut ProcessingMarks,
    targets: &mut [BidTarget],
    campaign_id: CampaignId,
    window: &LookbackWindow,
    formula: &dyn TargetFormulaTrait,
    config: &BidAdjustmentConfig,
    report: &mut AdjustmentReport,
    logger: &mut Logger,
) -> usize {
    let pending: Vec<usize> = targets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.key.campaign_id == campaign_id && marks.is_marked(&t.key))
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return 0;
    }

    let mut baseline_rate = 0.0;
    if formula.needs_baseline() {
        let dimension = targets[pending[0]].dimension;
        let skip_reason = match fetch_baseline(&*account, campaign_id, dimension, window, &config.baseline_source) {
            Ok(snapshot) if formula.rate(&snapshot) > 0.0 => {
                baseline_rate = formula.rate(&snapshot);
                None
            }
            Ok(_) => Some("zero baseline".to_string()),
            Err(e) => Some(e.to_string()),
        };
        let campaign_name = account.campaign_name(campaign_id);
        if let Some(reason) = skip_reason {
            warnln!(logger, LogEvent::Campaign, "{} [{}] skipped: {}", campaign_name, window.name, reason);
            for &i in &pending {
                report.outcomes.push(unchanged_outcome(&targets[i], window, OutcomeReason::SkippedInsufficientData));
            }
            return 0;
        }
        logln!(logger, LogEvent::Campaign, "{} [{}] baseline rate {:.6}", campaign_name, window.name, baseline_rate);
    }

    let mut claimed = 0;
    for i in pending {
        let snapshot = match account.fetch_performance(&targets[i], window) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                logln!(logger, LogEvent::Entity, "{} [{}] skipped: {}", targets[i].label(), window.name, e);
                report.outcomes.push(unchanged_outcome(&targets[i], window, OutcomeReason::SkippedInsufficientData));
                continue;
            }
        };

        let old_bid = targets[i].current_bid;
        let decision = decide(old_bid, &snapshot, baseline_rate, formula, config);

        let mut new_bid = old_bid;
        let mut mutation_error = None;
        if decision.changes_bid(old_bid) {
            match account.apply_bid(&targets[i], decision.new_bid) {
                Ok(()) => {
                    targets[i].current_bid = decision.new_bid;
                    new_bid = decision.new_bid;
                }
                Err(e) => {
                    errln!(logger, LogEvent::Entity, "{}", e);
                    mutation_error = Some(e.to_string());
                }
            }
        }

        if decision.claims_entity && marks.claim(&targets[i].key, logger) {
            claimed += 1;
        }

        logln!(
            logger,
            LogEvent::Entity,
            "{} [{}] clicks {} conv {:.1} cost {:.2}: {:.4} -> {:.4} ({}{})",
            targets[i].label(),
            window.name,
            snapshot.clicks,
            snapshot.conversions,
            snapshot.cost,
            old_bid,
            new_bid,
            decision.reason.as_str(),
            decision.target_bid.map(|t| format!(", target {:.4}", t)).unwrap_or_default()
        );

        report.outcomes.push(AdjustmentOutcome {
            key: targets[i].key,
            target_name: targets[i].name.clone(),
            window: window.name.clone(),
            old_bid,
            new_bid,
            target_bid: decision.target_bid,
            reason: decision.reason,
            mutation_error,
        });
    }
    claimed
}

fn is_baseline_entity(target: &BidTarget, source: &BaselineSource) -> bool {
    matches!(source, BaselineSource::Sibling(name) if target.name == *name)
}

/// Snapshot whose rate the entities of one campaign are compared against in a window
fn fetch_baseline(
    account: &dyn AdsAccountTrait,
    campaign_id: CampaignId,
    dimension: Dimension,
    window: &LookbackWindow,
    source: &BaselineSource,
) -> BidResult<PerformanceSnapshot> {
    match source {
        BaselineSource::CampaignTotal => account.fetch_baseline(campaign_id, window),
        BaselineSource::Sibling(name) => {
            let sibling = account
                .targets(campaign_id, dimension)?
                .into_iter()
                .find(|t| t.name == *name)
                .ok_or_else(|| BidError::no_data(format!("baseline {} '{}'", dimension.name(), name)))?;
            account.fetch_performance(&sibling, window)
        }
    }
}

fn unchanged_outcome(target: &BidTarget, window: &LookbackWindow, reason: OutcomeReason) -> AdjustmentOutcome {
    AdjustmentOutcome {
        key: target.key,
        target_name: target.name.clone(),
        window: window.name.clone(),
        old_bid: target.current_bid,
        new_bid: target.current_bid,
        target_bid: None,
        reason,
        mutation_error: None,
    }
}
