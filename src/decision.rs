use crate::adjustment_core::{self, StepParams, BID_EPSILON};
use crate::config::{BidAdjustmentConfig, HighCostBasis};
use crate::target_formulas::TargetFormulaTrait;
use crate::types::PerformanceSnapshot;

/// Why an entity ended up with the bid it has after one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeReason {
    Increased,
    Decreased,
    /// Target within one increment of the current bid
    NoChangeInsufficientDelta,
    /// Significant move requested but the bid already sits at the floor or ceiling
    NoChangeAtLimit,
    SkippedInsufficientData,
    /// High-cost override fired, the bid is kept when already under the override target
    ForcedDecreaseHighCost,
}

impl OutcomeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeReason::Increased => "increased",
            OutcomeReason::Decreased => "decreased",
            OutcomeReason::NoChangeInsufficientDelta => "no change (insufficient delta)",
            OutcomeReason::NoChangeAtLimit => "no change (at limit)",
            OutcomeReason::SkippedInsufficientData => "skipped (insufficient data)",
            OutcomeReason::ForcedDecreaseHighCost => "forced decrease (high cost)",
        }
    }
}

/// Result of evaluating one entity in one lookback window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub new_bid: f64,
    pub target_bid: Option<f64>,
    pub reason: OutcomeReason,
    /// Whether this window claims the entity, so shorter windows leave it alone
    pub claims_entity: bool,
}

impl Decision {
    fn unchanged(current_bid: f64, target_bid: Option<f64>, reason: OutcomeReason, claims_entity: bool) -> Self {
        Self { new_bid: current_bid, target_bid, reason, claims_entity }
    }

    /// Whether a mutation has to be issued
    pub fn changes_bid(&self, current_bid: f64) -> bool {
        (self.new_bid - current_bid).abs() > BID_EPSILON
    }
}

/// Whether the entity spends too much for the conversions it brings
pub fn is_high_cost(snapshot: &PerformanceSnapshot, config: &BidAdjustmentConfig) -> bool {
    let threshold = match config.high_cost_threshold {
        Some(threshold) => threshold,
        None => return false,
    };
    match config.high_cost_basis {
        HighCostBasis::TotalCost => snapshot.cost > threshold,
        HighCostBasis::CostPerConversion => snapshot.cost_per_conversion().unwrap_or(snapshot.cost) > threshold,
    }
}

/// Decide the new bid for one entity
///
/// Enough conversions: significance test, then one step toward the formula target.
/// Too few conversions: high-cost override if it fires, otherwise skip. The override
/// lowers the bid to the formula's high-cost target when it has one, else steps it down.
pub fn decide(
    current_bid: f64,
    snapshot: &PerformanceSnapshot,
    baseline_rate: f64,
    formula: &dyn TargetFormulaTrait,
    config: &BidAdjustmentConfig,
) -> Decision {
    let params = StepParams::from_config(config);

    if snapshot.conversions >= config.min_conversions as f64 {
        let target_bid = match formula.target_bid(current_bid, snapshot, baseline_rate, config.increment, config.floor) {
            Some(target_bid) => target_bid,
            None => return Decision::unchanged(current_bid, None, OutcomeReason::SkippedInsufficientData, false),
        };

        if !adjustment_core::is_significant(current_bid, target_bid, config.increment) {
            return Decision::unchanged(current_bid, Some(target_bid), OutcomeReason::NoChangeInsufficientDelta, true);
        }

        let new_bid = adjustment_core::step(current_bid, target_bid, &params);
        let reason = if (new_bid - current_bid).abs() <= BID_EPSILON {
            OutcomeReason::NoChangeAtLimit
        } else if new_bid > current_bid {
            OutcomeReason::Increased
        } else {
            OutcomeReason::Decreased
        };
        return Decision { new_bid, target_bid: Some(target_bid), reason, claims_entity: true };
    }

    if is_high_cost(snapshot, config) {
        let target_bid = formula.high_cost_target(snapshot, config.floor);
        let new_bid = match target_bid {
            Some(target_bid) => adjustment_core::decrease_to(current_bid, target_bid, &params),
            None => adjustment_core::forced_decrease(current_bid, &params),
        };
        return Decision {
            new_bid,
            target_bid,
            reason: OutcomeReason::ForcedDecreaseHighCost,
            claims_entity: config.clear_mark_on_override,
        };
    }

    Decision::unchanged(current_bid, None, OutcomeReason::SkippedInsufficientData, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StepMode, TargetFormula};
    use crate::target_formulas::{formula_for, ConversionRateRatio, RevenuePerClickRatio};

    fn config() -> BidAdjustmentConfig {
        BidAdjustmentConfig {
            increment: 0.05,
            min_conversions: 10,
            floor: 0.10,
            ceiling: 1.90,
            high_cost_threshold: Some(500.0),
            ..BidAdjustmentConfig::device_modifiers()
        }
    }

    #[test]
    fn test_outperforming_target_increases_one_step() {
        // 0.08 conversion rate against a 0.04 baseline -> target 2.0
        let snapshot = PerformanceSnapshot::new(250, 20.0, 300.0, 0.0);
        let decision = decide(1.0, &snapshot, 0.04, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::Increased);
        assert!((decision.new_bid - 1.05).abs() < 1e-12);
        assert!((decision.target_bid.unwrap() - 2.0).abs() < 1e-12);
        assert!(decision.claims_entity);
    }

    #[test]
    fn test_equal_target_is_not_significant() {
        // 0.042 / 0.04 = 1.05
        let snapshot = PerformanceSnapshot::new(1000, 42.0, 300.0, 0.0);
        let decision = decide(1.05, &snapshot, 0.04, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::NoChangeInsufficientDelta);
        assert_eq!(decision.new_bid, 1.05);
        assert!(decision.claims_entity);
        assert!(!decision.changes_bid(1.05));
    }

    #[test]
    fn test_underperforming_target_decreases() {
        let snapshot = PerformanceSnapshot::new(1000, 20.0, 300.0, 0.0);
        let decision = decide(1.0, &snapshot, 0.04, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::Decreased);
        assert!((decision.new_bid - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_high_cost_override_ignores_target() {
        let snapshot = PerformanceSnapshot::new(400, 0.0, 600.0, 0.0);
        let decision = decide(1.2, &snapshot, 0.04, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::ForcedDecreaseHighCost);
        assert!((decision.new_bid - 1.15).abs() < 1e-12);
        assert!(!decision.claims_entity);

        let clearing = BidAdjustmentConfig { clear_mark_on_override: true, ..config() };
        assert!(decide(1.2, &snapshot, 0.04, &ConversionRateRatio, &clearing).claims_entity);
    }

    #[test]
    fn test_high_cost_override_respects_floor() {
        let snapshot = PerformanceSnapshot::new(400, 0.0, 600.0, 0.0);
        let decision = decide(0.12, &snapshot, 0.04, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::ForcedDecreaseHighCost);
        assert_eq!(decision.new_bid, 0.10);
    }

    #[test]
    fn test_zero_clicks_is_skipped_without_high_cost() {
        let snapshot = PerformanceSnapshot::new(0, 0.0, 0.0, 0.0);
        let decision = decide(1.0, &snapshot, 0.04, &RevenuePerClickRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::SkippedInsufficientData);
        assert_eq!(decision.new_bid, 1.0);
        assert!(!decision.claims_entity);
    }

    #[test]
    fn test_few_conversions_below_cost_threshold_skipped() {
        let snapshot = PerformanceSnapshot::new(100, 3.0, 120.0, 0.0);
        let decision = decide(1.0, &snapshot, 0.01, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::SkippedInsufficientData);
    }

    #[test]
    fn test_cost_per_conversion_basis() {
        let cpa = BidAdjustmentConfig {
            high_cost_threshold: Some(40.0),
            high_cost_basis: HighCostBasis::CostPerConversion,
            ..config()
        };
        // 2 conversions for 100 -> 50 per conversion
        assert!(is_high_cost(&PerformanceSnapshot::new(50, 2.0, 100.0, 0.0), &cpa));
        // zero conversions count as one
        assert!(is_high_cost(&PerformanceSnapshot::new(50, 0.0, 45.0, 0.0), &cpa));
        assert!(!is_high_cost(&PerformanceSnapshot::new(50, 4.0, 100.0, 0.0), &cpa));
    }

    #[test]
    fn test_at_ceiling_reports_limit() {
        let snapshot = PerformanceSnapshot::new(250, 20.0, 300.0, 0.0);
        let decision = decide(1.90, &snapshot, 0.04, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::NoChangeAtLimit);
        assert!(!decision.changes_bid(1.90));
    }

    #[test]
    fn test_zero_baseline_skips() {
        let snapshot = PerformanceSnapshot::new(250, 20.0, 300.0, 0.0);
        let decision = decide(1.0, &snapshot, 0.0, &ConversionRateRatio, &config());
        assert_eq!(decision.reason, OutcomeReason::SkippedInsufficientData);
        assert!(!decision.claims_entity);
    }

    #[test]
    fn test_min_roas_snap() {
        let config = BidAdjustmentConfig::ad_group_min_roas();
        assert_eq!(config.step_mode, StepMode::SnapToTarget);
        let formula = formula_for(&config.target_formula);
        // 2.00 revenue per click * 25% = 0.50, well below current 0.90
        let snapshot = PerformanceSnapshot::new(200, 10.0, 150.0, 400.0);
        let decision = decide(0.90, &snapshot, 0.0, formula.as_ref(), &config);
        assert_eq!(decision.reason, OutcomeReason::Decreased);
        assert!((decision.new_bid - 0.50).abs() < 1e-12);
        assert!(matches!(config.target_formula, TargetFormula::PROFIT_MARGIN_CPC { .. }));
    }

    #[test]
    fn test_keyword_target_rounded_before_step() {
        let config = BidAdjustmentConfig::keyword_cpc();
        let formula = formula_for(&config.target_formula);
        // 1.37 per click rounds down to 1.25, a significant move from 1.55
        let snapshot = PerformanceSnapshot::new(100, 25.0, 30.0, 137.0);
        let decision = decide(1.55, &snapshot, 0.0, formula.as_ref(), &config);
        assert_eq!(decision.target_bid, Some(1.25));
        assert_eq!(decision.reason, OutcomeReason::Decreased);
        assert!((decision.new_bid - 1.30).abs() < 1e-12);
    }

    #[test]
    fn test_high_cost_cpc_lowered_to_assumed_conversion_target() {
        let config = BidAdjustmentConfig::ad_group_min_roas();
        let formula = formula_for(&config.target_formula);
        // one conversion for 60, plus an assumed 40: 80 / 100 clicks * 25% = 0.20
        let snapshot = PerformanceSnapshot::new(100, 1.0, 60.0, 40.0);
        let decision = decide(0.90, &snapshot, 0.0, formula.as_ref(), &config);
        assert_eq!(decision.reason, OutcomeReason::ForcedDecreaseHighCost);
        assert!((decision.new_bid - 0.20).abs() < 1e-12);
        assert!(decision.target_bid.is_some());

        // already under the target: nothing to write
        let decision = decide(0.15, &snapshot, 0.0, formula.as_ref(), &config);
        assert_eq!(decision.reason, OutcomeReason::ForcedDecreaseHighCost);
        assert!(!decision.changes_bid(0.15));
    }
}
