use crate::errors::{BidError, BidResult};
use crate::types::{BidKind, Dimension};
use crate::windows::LookbackWindow;

/// How a significant bid change moves the bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// One increment toward the target, stops only at floor/ceiling
    Incremental,
    /// One increment toward the target, never past the target itself
    IncrementalToTarget,
    /// Straight to the target, bounded by floor/ceiling
    SnapToTarget,
}

/// What the high-cost threshold is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighCostBasis {
    TotalCost,
    /// Cost per conversion, with zero conversions counted as one
    CostPerConversion,
}

/// Where the rate an entity is compared against comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineSource {
    /// Totals of the whole campaign
    CampaignTotal,
    /// One entity of the same campaign and dimension, matched by name; it is never adjusted itself
    Sibling(String),
}

/// Formula that turns observed performance into a desired bid
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, PartialEq)]
pub enum TargetFormula {
    CONVERSION_RATE_RATIO,
    REVENUE_PER_CLICK_RATIO,
    PROFIT_MARGIN_CPC {
        profit_margin_fraction: f64,
        aggressive: bool,
        /// Round the margin limit down to a quarter before stepping
        round_to_quarter: bool,
        /// Value of the one conversion a high-cost entity is assumed to be about to get, 0 disables
        assumed_conversion_value: f64,
    },
}

impl TargetFormula {
    /// Bid kind the formula produces values for
    pub fn bid_kind(&self) -> BidKind {
        match self {
            TargetFormula::CONVERSION_RATE_RATIO | TargetFormula::REVENUE_PER_CLICK_RATIO => BidKind::Modifier,
            TargetFormula::PROFIT_MARGIN_CPC { .. } => BidKind::AbsoluteCpc,
        }
    }
}

/// All tunables of one adjustment pass, passed explicitly into every call
#[derive(Debug, Clone, PartialEq)]
pub struct BidAdjustmentConfig {
    /// Step size, also the significance threshold (and the step cap for CPC targets)
    pub increment: f64,
    /// Conversions needed before the normal decision path runs
    pub min_conversions: u32,
    pub floor: f64,
    pub ceiling: f64,
    /// None disables the high-cost override
    pub high_cost_threshold: Option<f64>,
    pub high_cost_basis: HighCostBasis,
    pub step_mode: StepMode,
    pub clear_mark_on_override: bool,
    pub target_formula: TargetFormula,
    /// Decreasing a positive modifier drops it to at most 1.0 first
    pub reset_positive_on_decrease: bool,
    pub baseline_source: BaselineSource,
}

impl Default for BidAdjustmentConfig {
    fn default() -> Self {
        Self::device_modifiers()
    }
}

impl BidAdjustmentConfig {
    /// Device modifiers driven by conversion rate against the campaign
    pub fn device_modifiers() -> Self {
        Self {
            increment: 0.05,
            min_conversions: 10,
            floor: 0.10,
            ceiling: 1.90,
            high_cost_threshold: None,
            high_cost_basis: HighCostBasis::TotalCost,
            step_mode: StepMode::Incremental,
            clear_mark_on_override: false,
            target_formula: TargetFormula::CONVERSION_RATE_RATIO,
            reset_positive_on_decrease: false,
            baseline_source: BaselineSource::CampaignTotal,
        }
    }

    /// Mobile and tablet modifiers driven by conversion rate against desktop
    pub fn device_modifiers_against_desktop() -> Self {
        Self {
            baseline_source: BaselineSource::Sibling("Desktop".to_string()),
            ..Self::device_modifiers()
        }
    }

    /// Device modifiers driven by revenue per click, for value-tracked accounts
    pub fn device_revenue_modifiers() -> Self {
        Self {
            min_conversions: 5,
            target_formula: TargetFormula::REVENUE_PER_CLICK_RATIO,
            ..Self::device_modifiers()
        }
    }

    pub fn location_modifiers() -> Self {
        Self {
            min_conversions: 50,
            high_cost_threshold: Some(500.0),
            ..Self::device_modifiers()
        }
    }

    pub fn ad_schedule_modifiers() -> Self {
        Self {
            min_conversions: 10,
            ceiling: 1.50,
            high_cost_threshold: Some(100.0),
            reset_positive_on_decrease: true,
            ..Self::device_modifiers()
        }
    }

    /// Ad group CPC bounded by a minimum return on ad spend of 4 (25% cost of sales)
    pub fn ad_group_min_roas() -> Self {
        Self {
            increment: 0.10,
            min_conversions: 5,
            floor: 0.05,
            ceiling: 100.0,
            high_cost_threshold: Some(40.0),
            high_cost_basis: HighCostBasis::TotalCost,
            step_mode: StepMode::SnapToTarget,
            clear_mark_on_override: false,
            target_formula: TargetFormula::PROFIT_MARGIN_CPC {
                profit_margin_fraction: 0.25,
                aggressive: false,
                round_to_quarter: false,
                assumed_conversion_value: 40.0,
            },
            reset_positive_on_decrease: false,
            baseline_source: BaselineSource::CampaignTotal,
        }
    }

    /// Keyword CPC stepping by a quarter toward the conversion-value bid
    pub fn keyword_cpc() -> Self {
        Self {
            increment: 0.25,
            min_conversions: 20,
            floor: 0.01,
            ceiling: 100.0,
            high_cost_threshold: Some(40.0),
            high_cost_basis: HighCostBasis::CostPerConversion,
            step_mode: StepMode::IncrementalToTarget,
            clear_mark_on_override: false,
            target_formula: TargetFormula::PROFIT_MARGIN_CPC {
                profit_margin_fraction: 1.0,
                aggressive: false,
                round_to_quarter: true,
                assumed_conversion_value: 50.0,
            },
            reset_positive_on_decrease: false,
            baseline_source: BaselineSource::CampaignTotal,
        }
    }

    /// Reject anything that would make a pass ill-defined
    pub fn validate(&self, dimension: Dimension) -> BidResult<()> {
        if !self.increment.is_finite() || self.increment <= 0.0 {
            return Err(BidError::configuration(format!("increment must be positive, got {}", self.increment)));
        }
        if !self.floor.is_finite() || !self.ceiling.is_finite() {
            return Err(BidError::configuration("floor and ceiling must be finite"));
        }
        if self.floor < 0.0 {
            return Err(BidError::configuration(format!("floor must not be negative, got {}", self.floor)));
        }
        if self.floor > self.ceiling {
            return Err(BidError::configuration(format!("floor {} is above ceiling {}", self.floor, self.ceiling)));
        }
        if self.min_conversions == 0 {
            return Err(BidError::configuration("min_conversions must be at least 1"));
        }
        if let Some(threshold) = self.high_cost_threshold {
            if !(threshold >= 0.0) {
                return Err(BidError::configuration(format!("high cost threshold must not be negative, got {}", threshold)));
            }
        }
        if let TargetFormula::PROFIT_MARGIN_CPC { profit_margin_fraction, assumed_conversion_value, .. } = self.target_formula {
            if !(profit_margin_fraction > 0.0 && profit_margin_fraction <= 1.0) {
                return Err(BidError::configuration(format!(
                    "profit margin fraction must be in (0, 1], got {}",
                    profit_margin_fraction
                )));
            }
            if !(assumed_conversion_value >= 0.0 && assumed_conversion_value.is_finite()) {
                return Err(BidError::configuration(format!(
                    "assumed conversion value must be finite and not negative, got {}",
                    assumed_conversion_value
                )));
            }
        }
        if let BaselineSource::Sibling(name) = &self.baseline_source {
            if name.is_empty() {
                return Err(BidError::configuration("baseline sibling name must not be empty"));
            }
        }
        if self.target_formula.bid_kind() != dimension.bid_kind() {
            return Err(BidError::configuration(format!(
                "{:?} is not supported for {} bids",
                self.target_formula,
                dimension.name()
            )));
        }
        Ok(())
    }

    /// Validate the lookback windows of a pass
    pub fn validate_windows(windows: &[LookbackWindow]) -> BidResult<()> {
        if windows.is_empty() {
            return Err(BidError::configuration("at least one lookback window is required"));
        }
        if let Some(window) = windows.iter().find(|w| !w.is_valid()) {
            return Err(BidError::configuration(format!("window {} starts after it ends", window.name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_presets_are_valid_for_their_dimension() {
        assert!(BidAdjustmentConfig::device_modifiers().validate(Dimension::Device).is_ok());
        assert!(BidAdjustmentConfig::device_revenue_modifiers().validate(Dimension::Device).is_ok());
        assert!(BidAdjustmentConfig::device_modifiers_against_desktop().validate(Dimension::Device).is_ok());
        assert!(BidAdjustmentConfig::location_modifiers().validate(Dimension::Location).is_ok());
        assert!(BidAdjustmentConfig::ad_schedule_modifiers().validate(Dimension::AdSchedule).is_ok());
        assert!(BidAdjustmentConfig::ad_group_min_roas().validate(Dimension::AdGroup).is_ok());
        assert!(BidAdjustmentConfig::keyword_cpc().validate(Dimension::Keyword).is_ok());
    }

    #[test]
    fn test_floor_above_ceiling_rejected() {
        let config = BidAdjustmentConfig { floor: 2.0, ceiling: 1.0, ..BidAdjustmentConfig::device_modifiers() };
        assert!(matches!(config.validate(Dimension::Device), Err(BidError::Configuration(_))));
    }

    #[test]
    fn test_non_positive_increment_rejected() {
        for increment in [0.0, -0.05, f64::NAN] {
            let config = BidAdjustmentConfig { increment, ..BidAdjustmentConfig::device_modifiers() };
            assert!(config.validate(Dimension::Device).is_err());
        }
    }

    #[test]
    fn test_formula_must_match_dimension() {
        assert!(BidAdjustmentConfig::device_modifiers().validate(Dimension::Keyword).is_err());
        assert!(BidAdjustmentConfig::keyword_cpc().validate(Dimension::Location).is_err());
    }

    #[test]
    fn test_zero_min_conversions_rejected() {
        let config = BidAdjustmentConfig { min_conversions: 0, ..BidAdjustmentConfig::location_modifiers() };
        assert!(config.validate(Dimension::Location).is_err());
    }

    #[test]
    fn test_margin_fraction_range() {
        let config = BidAdjustmentConfig {
            target_formula: TargetFormula::PROFIT_MARGIN_CPC {
                profit_margin_fraction: 1.5,
                aggressive: false,
                round_to_quarter: false,
                assumed_conversion_value: 0.0,
            },
            ..BidAdjustmentConfig::ad_group_min_roas()
        };
        assert!(config.validate(Dimension::AdGroup).is_err());
    }

    #[test]
    fn test_negative_assumed_conversion_value_rejected() {
        let config = BidAdjustmentConfig {
            target_formula: TargetFormula::PROFIT_MARGIN_CPC {
                profit_margin_fraction: 0.25,
                aggressive: false,
                round_to_quarter: false,
                assumed_conversion_value: -40.0,
            },
            ..BidAdjustmentConfig::ad_group_min_roas()
        };
        assert!(matches!(config.validate(Dimension::AdGroup), Err(BidError::Configuration(_))));
    }

    #[test]
    fn test_empty_sibling_name_rejected() {
        let config = BidAdjustmentConfig {
            baseline_source: BaselineSource::Sibling(String::new()),
            ..BidAdjustmentConfig::device_modifiers()
        };
        assert!(config.validate(Dimension::Device).is_err());
    }

    #[test]
    fn test_keyword_preset_rounds_to_quarter() {
        assert!(matches!(
            BidAdjustmentConfig::keyword_cpc().target_formula,
            TargetFormula::PROFIT_MARGIN_CPC { round_to_quarter: true, .. }
        ));
    }

    #[test]
    fn test_windows_validation() {
        assert!(BidAdjustmentConfig::validate_windows(&[]).is_err());
        let start = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let backwards = LookbackWindow::new("BACKWARDS", start, end);
        assert!(BidAdjustmentConfig::validate_windows(&[backwards]).is_err());
    }
}
