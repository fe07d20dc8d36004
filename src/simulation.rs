//! Synthetic accounts and day-by-day re-runs of the adjustment pass.
//!
//! Each simulated day produces traffic for every entity at its current bid,
//! then the pass runs once on the refreshed lookback windows, the way a
//! scheduled script would run once a day. Bids therefore walk toward their
//! targets one step per day.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use chrono::{Duration, NaiveDate};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Binomial, Distribution, LogNormal, Poisson};

use crate::adjustment_core::clamp_bid;
use crate::config::{BaselineSource, BidAdjustmentConfig};
use crate::errors::{BidError, BidResult};
use crate::in_memory_account::{InMemoryAccount, InMemoryTagger};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::orchestrator::{run_adjustment_pass, AdjustmentReport, CampaignScope};
use crate::target_formulas::formula_for;
use crate::types::{Dimension, EntityKey, PerformanceSnapshot};
use crate::utils::{create_lognormal, get_seed, TOTAL_ADJUSTMENT_PASSES};
use crate::windows::LookbackWindow;

/// Shape of a synthetic account
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub campaigns: usize,
    pub targets_per_campaign: usize,
    pub dimension: Dimension,
    pub initial_bid: f64,
    pub daily_clicks_mean: f64,
    pub conversion_rate_mean: f64,
    pub conversion_rate_stddev: f64,
    pub value_per_conversion_mean: f64,
    pub value_per_conversion_stddev: f64,
    /// Cost of one click at a bid (or modifier) of 1.0
    pub base_cpc: f64,
    /// Lookback windows in days, any order
    pub lookback_days: Vec<i64>,
}

impl SimulationParams {
    /// Three devices per campaign with modifiers at 1.0
    pub fn devices(campaigns: usize) -> Self {
        Self {
            campaigns,
            targets_per_campaign: 3,
            dimension: Dimension::Device,
            initial_bid: 1.0,
            daily_clicks_mean: 120.0,
            conversion_rate_mean: 0.04,
            conversion_rate_stddev: 0.02,
            value_per_conversion_mean: 60.0,
            value_per_conversion_stddev: 20.0,
            base_cpc: 0.80,
            lookback_days: vec![90, 30, 14, 7],
        }
    }

    /// Keywords bid in absolute CPC
    pub fn keywords(campaigns: usize, targets_per_campaign: usize) -> Self {
        Self {
            campaigns,
            targets_per_campaign,
            dimension: Dimension::Keyword,
            initial_bid: 1.0,
            daily_clicks_mean: 40.0,
            conversion_rate_mean: 0.05,
            conversion_rate_stddev: 0.02,
            value_per_conversion_mean: 50.0,
            value_per_conversion_stddev: 1.0,
            base_cpc: 1.0,
            lookback_days: vec![30, 14, 7],
        }
    }

    pub fn longest_lookback(&self) -> i64 {
        self.lookback_days.iter().copied().max().unwrap_or(0)
    }
}

/// Ground truth of one synthetic entity
#[derive(Debug, Clone)]
pub struct SyntheticEntity {
    pub key: EntityKey,
    pub clicks_mean: f64,
    pub conversion_rate: f64,
    pub value_per_conversion: f64,
    clicks_dist: Poisson<f64>,
}

/// Bid history of one entity over a simulation
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTrace {
    pub key: EntityKey,
    pub label: String,
    /// Where the bid would settle with perfect data
    pub ideal_bid: f64,
    /// Initial bid followed by the bid after every simulated day
    pub bids: Vec<f64>,
    /// Last target the pass computed
    pub last_target: Option<f64>,
}

impl EntityTrace {
    pub fn final_bid(&self) -> f64 {
        self.bids.last().copied().unwrap_or(0.0)
    }

    pub fn initial_distance(&self) -> f64 {
        (self.bids.first().copied().unwrap_or(0.0) - self.ideal_bid).abs()
    }

    pub fn final_distance(&self) -> f64 {
        (self.final_bid() - self.ideal_bid).abs()
    }
}

/// Everything recorded while a simulation ran
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationTrace {
    pub entities: Vec<EntityTrace>,
    /// Bids written per day
    pub mutations_per_day: Vec<usize>,
    pub reports: Vec<AdjustmentReport>,
}

impl SimulationTrace {
    pub fn entity(&self, key: &EntityKey) -> Option<&EntityTrace> {
        self.entities.iter().find(|e| e.key == *key)
    }

    /// (label, bids) pairs ready for charting
    pub fn series(&self) -> Vec<(String, Vec<f64>)> {
        self.entities.iter().map(|e| (e.label.clone(), e.bids.clone())).collect()
    }

    pub fn mean_initial_distance(&self) -> f64 {
        mean(self.entities.iter().map(|e| e.initial_distance()))
    }

    pub fn mean_final_distance(&self) -> f64 {
        mean(self.entities.iter().map(|e| e.final_distance()))
    }

    pub fn total_mutations(&self) -> usize {
        self.mutations_per_day.iter().sum()
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Synthetic account plus the state needed to replay it day by day
pub struct DailySimulation {
    pub account: InMemoryAccount,
    pub entities: Vec<SyntheticEntity>,
    params: SimulationParams,
    config: BidAdjustmentConfig,
    tagger: InMemoryTagger,
    history: BTreeMap<NaiveDate, Vec<(EntityKey, PerformanceSnapshot)>>,
    today: NaiveDate,
    rng_traffic: StdRng,
}

impl DailySimulation {
    /// Generate the account and enough history at the initial bids to fill the longest window
    pub fn new(params: SimulationParams, config: BidAdjustmentConfig, start: NaiveDate) -> BidResult<Self> {
        config.validate(params.dimension)?;
        if params.lookback_days.is_empty() || params.lookback_days.iter().any(|d| *d < 1) {
            return Err(BidError::configuration("simulation needs lookback windows of at least one day"));
        }

        let conversion_rate_dist = create_lognormal(params.conversion_rate_mean, params.conversion_rate_stddev)?;
        let value_dist = create_lognormal(params.value_per_conversion_mean, params.value_per_conversion_stddev)?;
        let clicks_spread = LogNormal::<f64>::new(0.0, 0.5).map_err(distribution_error)?;
        let mut rng_entities = StdRng::seed_from_u64(get_seed(1991));

        let mut account = InMemoryAccount::new();
        let mut entities = Vec::new();
        for c in 0..params.campaigns {
            let campaign_id = account.add_campaign(&format!("Campaign {}", c));
            for t in 0..params.targets_per_campaign {
                let key = account.add_target(campaign_id, &target_name(params.dimension, t), params.dimension, params.initial_bid)?;
                let clicks_mean = params.daily_clicks_mean * (0.5 + clicks_spread.sample(&mut rng_entities).min(3.0));
                entities.push(SyntheticEntity {
                    key,
                    clicks_mean,
                    conversion_rate: conversion_rate_dist.sample(&mut rng_entities).min(1.0),
                    value_per_conversion: value_dist.sample(&mut rng_entities),
                    clicks_dist: Poisson::new(clicks_mean).map_err(distribution_error)?,
                });
            }
        }

        let mut simulation = Self {
            account,
            entities,
            params,
            config,
            tagger: InMemoryTagger::default(),
            history: BTreeMap::new(),
            today: start,
            rng_traffic: StdRng::seed_from_u64(get_seed(2992)),
        };
        for _ in 0..simulation.params.longest_lookback() {
            simulation.simulate_traffic()?;
        }
        Ok(simulation)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Run the pass once per day for `days` days
    pub fn run(&mut self, days: usize, logger: &mut Logger) -> BidResult<SimulationTrace> {
        let mut trace = SimulationTrace {
            entities: self
                .entities
                .iter()
                .map(|e| EntityTrace {
                    key: e.key,
                    label: self.label(&e.key),
                    ideal_bid: self.ideal_bid(e),
                    bids: vec![self.account.bid(&e.key).unwrap_or(self.params.initial_bid)],
                    last_target: None,
                })
                .collect(),
            ..SimulationTrace::default()
        };

        for day in 0..days {
            self.publish_windows();
            let windows = self.windows();
            let scope = CampaignScope::new(self.account.campaign_ids());
            let report = run_adjustment_pass(
                &mut self.account,
                Some(&mut self.tagger),
                &scope,
                self.params.dimension,
                &windows,
                &self.config,
                logger,
            )?;
            TOTAL_ADJUSTMENT_PASSES.fetch_add(1, Ordering::Relaxed);

            for entity_trace in trace.entities.iter_mut() {
                entity_trace.bids.push(self.account.bid(&entity_trace.key).unwrap_or(self.params.initial_bid));
                let target = report.outcomes_for(&entity_trace.key).iter().rev().find_map(|o| o.target_bid);
                if target.is_some() {
                    entity_trace.last_target = target;
                }
            }
            logln!(logger, LogEvent::Scenario, "Day {} ({}): {}", day + 1, self.today, report.summary_string());
            trace.mutations_per_day.push(report.mutation_count());
            trace.reports.push(report);

            self.simulate_traffic()?;
        }
        Ok(trace)
    }

    /// Lookback windows as seen from today
    fn windows(&self) -> Vec<LookbackWindow> {
        self.params
            .lookback_days
            .iter()
            .map(|days| LookbackWindow::last_days(*days, self.today))
            .collect()
    }

    /// One day of traffic at the current bids, then move to the next day
    fn simulate_traffic(&mut self) -> BidResult<()> {
        let mut day = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            let bid = self.account.bid(&entity.key).unwrap_or(self.params.initial_bid);
            let clicks = entity.clicks_dist.sample(&mut self.rng_traffic) as u64;
            let conversions = Binomial::new(clicks, entity.conversion_rate)
                .map_err(distribution_error)?
                .sample(&mut self.rng_traffic) as f64;
            let cost = clicks as f64 * self.params.base_cpc * bid;
            day.push((entity.key, PerformanceSnapshot::new(clicks, conversions, cost, conversions * entity.value_per_conversion)));
        }
        self.history.insert(self.today, day);
        self.today += Duration::days(1);
        // days no window reaches any more
        let oldest_needed = self.today - Duration::days(self.params.longest_lookback());
        self.history = self.history.split_off(&oldest_needed);
        Ok(())
    }

    /// Replace the account's reports with totals over every window ending yesterday
    fn publish_windows(&mut self) {
        self.account.clear_performance();
        for window in self.windows() {
            let mut totals: BTreeMap<EntityKey, PerformanceSnapshot> = BTreeMap::new();
            for (_, day) in self.history.range(window.start..=window.end) {
                for (key, snapshot) in day {
                    let total = totals.entry(*key).or_default();
                    *total = PerformanceSnapshot::aggregate([*total, *snapshot].iter());
                }
            }
            for (key, snapshot) in totals {
                self.account.set_performance(key, &window, snapshot);
            }
        }
    }

    /// Bid the formula settles on with expected instead of sampled traffic
    pub fn ideal_bid(&self, entity: &SyntheticEntity) -> f64 {
        let expected = |e: &SyntheticEntity| {
            let clicks = (e.clicks_mean * 1000.0).round() as u64;
            let conversions = clicks as f64 * e.conversion_rate;
            PerformanceSnapshot::new(clicks, conversions, clicks as f64 * self.params.base_cpc, conversions * e.value_per_conversion)
        };
        let campaign: Vec<PerformanceSnapshot> = self
            .entities
            .iter()
            .filter(|e| e.key.campaign_id == entity.key.campaign_id)
            .map(expected)
            .collect();
        let formula = formula_for(&self.config.target_formula);
        let baseline = match &self.config.baseline_source {
            BaselineSource::CampaignTotal => Some(PerformanceSnapshot::aggregate(campaign.iter())),
            BaselineSource::Sibling(name) => self
                .entities
                .iter()
                .filter(|e| e.key.campaign_id == entity.key.campaign_id)
                .find(|e| self.account.target(&e.key).map_or(false, |t| t.name == *name))
                .map(expected),
        };
        let baseline_rate = baseline.map_or(0.0, |b| formula.rate(&b));
        let target = formula
            .target_bid(self.config.floor, &expected(entity), baseline_rate, f64::INFINITY, self.config.floor)
            .unwrap_or(self.params.initial_bid);
        clamp_bid(target, self.config.floor, self.config.ceiling)
    }

    fn label(&self, key: &EntityKey) -> String {
        self.account.target(key).map(|t| t.label()).unwrap_or_else(|| key.to_string())
    }
}

fn target_name(dimension: Dimension, index: usize) -> String {
    const DEVICES: [&str; 3] = ["Desktop", "Mobile", "Tablet"];
    match dimension {
        Dimension::Device if index < DEVICES.len() => DEVICES[index].to_string(),
        _ => format!("{} {}", dimension.name(), index + 1),
    }
}

fn distribution_error<E: std::fmt::Display>(e: E) -> BidError {
    BidError::configuration(format!("invalid distribution parameters: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_same_seed_same_trace() {
        let params = SimulationParams::devices(2);
        let mut logger = Logger::new();
        let mut a = DailySimulation::new(params.clone(), BidAdjustmentConfig::device_modifiers(), start()).unwrap();
        let mut b = DailySimulation::new(params, BidAdjustmentConfig::device_modifiers(), start()).unwrap();
        assert_eq!(a.run(5, &mut logger).unwrap().series(), b.run(5, &mut logger).unwrap().series());
    }

    #[test]
    fn test_bids_stay_in_bounds_and_move_one_step_per_day() {
        let config = BidAdjustmentConfig::device_modifiers();
        let mut logger = Logger::new();
        let mut simulation = DailySimulation::new(SimulationParams::devices(3), config.clone(), start()).unwrap();
        let trace = simulation.run(20, &mut logger).unwrap();

        assert_eq!(trace.mutations_per_day.len(), 20);
        for entity in &trace.entities {
            assert_eq!(entity.bids.len(), 21);
            for pair in entity.bids.windows(2) {
                assert!(pair[1] >= config.floor - 1e-9 && pair[1] <= config.ceiling + 1e-9);
                assert!((pair[1] - pair[0]).abs() <= config.increment + 1e-9);
            }
        }
    }

    #[test]
    fn test_history_fills_longest_window() {
        let simulation = DailySimulation::new(SimulationParams::devices(1), BidAdjustmentConfig::device_modifiers(), start()).unwrap();
        assert_eq!(simulation.history.len(), 90);
        assert_eq!(simulation.today(), start() + Duration::days(90));
    }

    #[test]
    fn test_history_keeps_only_longest_window() {
        let mut logger = Logger::new();
        let params = SimulationParams::keywords(1, 2);
        let mut simulation = DailySimulation::new(params.clone(), BidAdjustmentConfig::keyword_cpc(), start()).unwrap();
        simulation.run(10, &mut logger).unwrap();
        assert_eq!(simulation.history.len() as i64, params.longest_lookback());
        let oldest = simulation.history.keys().next().copied().unwrap();
        assert_eq!(oldest, simulation.today() - Duration::days(params.longest_lookback()));
    }

    #[test]
    fn test_keyword_decrease_targets_are_quarter_rounded() {
        let mut logger = Logger::new();
        let mut simulation = DailySimulation::new(SimulationParams::keywords(1, 4), BidAdjustmentConfig::keyword_cpc(), start()).unwrap();
        let trace = simulation.run(3, &mut logger).unwrap();
        let decrease_targets = trace
            .reports
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter_map(|o| o.target_bid.filter(|t| *t < o.old_bid));
        for target in decrease_targets {
            assert!(((target * 4.0).round() - target * 4.0).abs() < 1e-9 || target < 0.25);
        }
    }

    #[test]
    fn test_desktop_baseline_leaves_desktop_alone() {
        let mut logger = Logger::new();
        let config = BidAdjustmentConfig::device_modifiers_against_desktop();
        let mut simulation = DailySimulation::new(SimulationParams::devices(1), config, start()).unwrap();
        let desktop = simulation.entities[0].key;
        assert!((simulation.ideal_bid(&simulation.entities[0]) - 1.0).abs() < 1e-9);
        let trace = simulation.run(5, &mut logger).unwrap();
        assert!(trace.entity(&desktop).unwrap().bids.iter().all(|b| *b == 1.0));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = SimulationParams { lookback_days: vec![], ..SimulationParams::devices(1) };
        assert!(DailySimulation::new(params, BidAdjustmentConfig::device_modifiers(), start()).is_err());
        let params = SimulationParams { conversion_rate_mean: 0.0, ..SimulationParams::devices(1) };
        assert!(DailySimulation::new(params, BidAdjustmentConfig::device_modifiers(), start()).is_err());
    }
}
