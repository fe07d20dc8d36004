use crate::config::TargetFormula;
use crate::types::PerformanceSnapshot;
use crate::utils::round_down_to_quarter;

/// Lowest CPC any formula will ever propose
pub const MIN_CPC: f64 = 0.01;

/// Trait for turning observed performance into a desired bid
pub trait TargetFormulaTrait {
    /// Whether a campaign baseline must be fetched before targets can be computed
    fn needs_baseline(&self) -> bool;

    /// The rate this formula compares, applied to campaign totals to get the baseline
    fn rate(&self, snapshot: &PerformanceSnapshot) -> f64;

    /// Desired bid for one entity
    ///
    /// # Arguments
    /// * `current_bid` - Bid the entity carries now
    /// * `snapshot` - Entity performance in the window
    /// * `baseline_rate` - Campaign rate in the same window (ignored when no baseline is needed)
    /// * `max_step` - Largest single move the formula may propose upward
    /// * `min_bid` - Lowest value the formula may propose
    ///
    /// # Returns
    /// None when no target can be computed (zero baseline)
    fn target_bid(&self, current_bid: f64, snapshot: &PerformanceSnapshot, baseline_rate: f64, max_step: f64, min_bid: f64) -> Option<f64>;

    /// Bid a high-cost entity without enough conversions may be lowered to
    ///
    /// None means the formula has no such target and the bid is stepped down instead.
    fn high_cost_target(&self, _snapshot: &PerformanceSnapshot, _min_bid: f64) -> Option<f64> {
        None
    }

    /// Get a string representation of the formula
    fn formula_string(&self) -> String;
}

/// Modifier = entity conversion rate / campaign conversion rate
pub struct ConversionRateRatio;

impl TargetFormulaTrait for ConversionRateRatio {
    fn needs_baseline(&self) -> bool {
        true
    }

    fn rate(&self, snapshot: &PerformanceSnapshot) -> f64 {
        snapshot.conversion_rate()
    }

    fn target_bid(&self, _current_bid: f64, snapshot: &PerformanceSnapshot, baseline_rate: f64, _max_step: f64, _min_bid: f64) -> Option<f64> {
        ratio(self.rate(snapshot), baseline_rate)
    }

    fn formula_string(&self) -> String {
        "Conversion rate ratio".to_string()
    }
}

/// Modifier = entity revenue per click / campaign revenue per click
pub struct RevenuePerClickRatio;

impl TargetFormulaTrait for RevenuePerClickRatio {
    fn needs_baseline(&self) -> bool {
        true
    }

    fn rate(&self, snapshot: &PerformanceSnapshot) -> f64 {
        snapshot.revenue_per_click()
    }

    fn target_bid(&self, _current_bid: f64, snapshot: &PerformanceSnapshot, baseline_rate: f64, _max_step: f64, _min_bid: f64) -> Option<f64> {
        ratio(self.rate(snapshot), baseline_rate)
    }

    fn formula_string(&self) -> String {
        "Revenue per click ratio".to_string()
    }
}

fn ratio(rate: f64, baseline_rate: f64) -> Option<f64> {
    if baseline_rate > 0.0 {
        Some(rate / baseline_rate)
    } else {
        None
    }
}

/// Absolute CPC = revenue per click * margin, capped at one step above the current CPC
pub struct ProfitMarginCpc {
    pub profit_margin_fraction: f64,
    /// Never go below the current CPC while cost of sales is inside the margin
    pub aggressive: bool,
    pub round_to_quarter: bool,
    /// Extra revenue assumed for a high-cost entity, 0 disables the high-cost target
    pub assumed_conversion_value: f64,
}

impl ProfitMarginCpc {
    fn margin_limit(&self, revenue_per_click: f64) -> f64 {
        let limit = revenue_per_click * self.profit_margin_fraction;
        if self.round_to_quarter {
            round_down_to_quarter(limit)
        } else {
            limit
        }
    }
}

impl TargetFormulaTrait for ProfitMarginCpc {
    fn needs_baseline(&self) -> bool {
        false
    }

    fn rate(&self, snapshot: &PerformanceSnapshot) -> f64 {
        snapshot.revenue_per_click()
    }

    fn target_bid(&self, current_bid: f64, snapshot: &PerformanceSnapshot, _baseline_rate: f64, max_step: f64, min_bid: f64) -> Option<f64> {
        let profit_margin_limit = self.margin_limit(self.rate(snapshot));
        let step_cap = current_bid + max_step;
        let mut target = profit_margin_limit.min(step_cap);

        if self.aggressive {
            let inside_margin = snapshot
                .cost_of_sales()
                .map_or(false, |cost_of_sales| cost_of_sales < self.profit_margin_fraction);
            if inside_margin {
                target = target.max(current_bid);
            }
        }

        Some(target.max(min_bid).max(MIN_CPC))
    }

    fn high_cost_target(&self, snapshot: &PerformanceSnapshot, min_bid: f64) -> Option<f64> {
        if self.assumed_conversion_value <= 0.0 || snapshot.clicks == 0 {
            return None;
        }
        let assumed_revenue_per_click = (snapshot.revenue + self.assumed_conversion_value) / snapshot.clicks as f64;
        Some(self.margin_limit(assumed_revenue_per_click).max(min_bid).max(MIN_CPC))
    }

    fn formula_string(&self) -> String {
        format!(
            "Profit margin CPC ({:.0}% of revenue per click{}{})",
            self.profit_margin_fraction * 100.0,
            if self.aggressive { ", aggressive" } else { "" },
            if self.round_to_quarter { ", quarter rounded" } else { "" }
        )
    }
}

/// Build the formula implementation selected by a config value
pub fn formula_for(target_formula: &TargetFormula) -> Box<dyn TargetFormulaTrait> {
    match *target_formula {
        TargetFormula::CONVERSION_RATE_RATIO => Box::new(ConversionRateRatio),
        TargetFormula::REVENUE_PER_CLICK_RATIO => Box::new(RevenuePerClickRatio),
        TargetFormula::PROFIT_MARGIN_CPC {
            profit_margin_fraction,
            aggressive,
            round_to_quarter,
            assumed_conversion_value,
        } => Box::new(ProfitMarginCpc {
            profit_margin_fraction,
            aggressive,
            round_to_quarter,
            assumed_conversion_value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn margin(profit_margin_fraction: f64, aggressive: bool) -> ProfitMarginCpc {
        ProfitMarginCpc {
            profit_margin_fraction,
            aggressive,
            round_to_quarter: false,
            assumed_conversion_value: 0.0,
        }
    }

    #[test]
    fn test_conversion_rate_ratio() {
        let snapshot = PerformanceSnapshot::new(100, 8.0, 50.0, 0.0);
        let target = ConversionRateRatio.target_bid(1.0, &snapshot, 0.04, 0.05, 0.1);
        assert!((target.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_baseline_gives_no_target() {
        let snapshot = PerformanceSnapshot::new(100, 8.0, 50.0, 400.0);
        assert_eq!(ConversionRateRatio.target_bid(1.0, &snapshot, 0.0, 0.05, 0.1), None);
        assert_eq!(RevenuePerClickRatio.target_bid(1.0, &snapshot, 0.0, 0.05, 0.1), None);
    }

    #[test]
    fn test_zero_clicks_gives_zero_ratio() {
        let snapshot = PerformanceSnapshot::new(0, 0.0, 0.0, 0.0);
        assert_eq!(RevenuePerClickRatio.target_bid(1.2, &snapshot, 3.0, 0.05, 0.1), Some(0.0));
    }

    #[test]
    fn test_profit_margin_limit_below_step_cap() {
        // 400 revenue over 200 clicks = 2.00 per click, 25% margin -> 0.50
        let formula = margin(0.25, false);
        let snapshot = PerformanceSnapshot::new(200, 10.0, 150.0, 400.0);
        let target = formula.target_bid(0.80, &snapshot, 0.0, 0.10, 0.05).unwrap();
        assert!((target - 0.50).abs() < 1e-12);
    }

    #[test]
    fn test_profit_margin_step_cap() {
        let formula = margin(0.25, false);
        let snapshot = PerformanceSnapshot::new(100, 10.0, 50.0, 2000.0);
        let target = formula.target_bid(0.80, &snapshot, 0.0, 0.10, 0.05).unwrap();
        assert!((target - 0.90).abs() < 1e-12);
    }

    #[test]
    fn test_profit_margin_floored_at_min_bid() {
        let formula = margin(0.25, false);
        let snapshot = PerformanceSnapshot::new(0, 0.0, 0.0, 0.0);
        assert_eq!(formula.target_bid(0.80, &snapshot, 0.0, 0.10, 0.05), Some(0.05));
        assert_eq!(formula.target_bid(0.80, &snapshot, 0.0, 0.10, 0.0), Some(MIN_CPC));
    }

    #[test]
    fn test_aggressive_keeps_current_inside_margin() {
        let formula = margin(0.25, true);
        // cost of sales 0.2 < 0.25 but revenue per click says 0.50
        let snapshot = PerformanceSnapshot::new(200, 10.0, 80.0, 400.0);
        let target = formula.target_bid(0.80, &snapshot, 0.0, 0.10, 0.05).unwrap();
        assert_eq!(target, 0.80);
    }

    #[test]
    fn test_formula_for_selects_implementation() {
        assert!(formula_for(&TargetFormula::CONVERSION_RATE_RATIO).needs_baseline());
        let cpc = formula_for(&TargetFormula::PROFIT_MARGIN_CPC {
            profit_margin_fraction: 0.25,
            aggressive: false,
            round_to_quarter: false,
            assumed_conversion_value: 0.0,
        });
        assert!(!cpc.needs_baseline());
        assert_eq!(cpc.formula_string(), "Profit margin CPC (25% of revenue per click)");
        assert_eq!(ConversionRateRatio.high_cost_target(&PerformanceSnapshot::new(100, 0.0, 600.0, 0.0), 0.1), None);
    }

    #[test]
    fn test_quarter_rounding_applies_before_step_cap() {
        let formula = ProfitMarginCpc { round_to_quarter: true, ..margin(1.0, false) };
        // 1.37 revenue per click rounds down to 1.25
        let snapshot = PerformanceSnapshot::new(100, 25.0, 30.0, 137.0);
        assert_eq!(formula.target_bid(1.55, &snapshot, 0.0, 0.25, 0.01), Some(1.25));
        // 2.99 rounds to 2.75, then the cap of one quarter above 1.00 wins
        let snapshot = PerformanceSnapshot::new(100, 25.0, 30.0, 299.0);
        assert_eq!(formula.target_bid(1.00, &snapshot, 0.0, 0.25, 0.01), Some(1.25));
    }

    #[test]
    fn test_high_cost_target_assumes_one_more_conversion() {
        let formula = ProfitMarginCpc { assumed_conversion_value: 40.0, ..margin(0.25, false) };
        // (40 + 40) / 100 clicks * 25% = 0.20
        let snapshot = PerformanceSnapshot::new(100, 1.0, 60.0, 40.0);
        let target = formula.high_cost_target(&snapshot, 0.05).unwrap();
        assert!((target - 0.20).abs() < 1e-12);
        assert_eq!(formula.high_cost_target(&snapshot, 0.30), Some(0.30));
        assert_eq!(formula.high_cost_target(&PerformanceSnapshot::new(0, 0.0, 60.0, 0.0), 0.05), None);
        assert_eq!(margin(0.25, false).high_cost_target(&snapshot, 0.05), None);
    }

    #[test]
    fn test_high_cost_target_rounded_for_keywords() {
        let formula = ProfitMarginCpc { round_to_quarter: true, assumed_conversion_value: 50.0, ..margin(1.0, false) };
        // 50 / 30 clicks = 1.67 -> 1.50
        let snapshot = PerformanceSnapshot::new(30, 0.0, 45.0, 0.0);
        assert_eq!(formula.high_cost_target(&snapshot, 0.01), Some(1.50));
    }
}
