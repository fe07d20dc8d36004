use crate::config::{BidAdjustmentConfig, StepMode};

/// Differences below this are float noise, not a bid change
pub const BID_EPSILON: f64 = 1e-9;

/// Step parameters extracted from a config, so the step function stays a pure calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub increment: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub mode: StepMode,
    pub reset_positive_on_decrease: bool,
}

impl StepParams {
    pub fn new(increment: f64, floor: f64, ceiling: f64, mode: StepMode) -> Self {
        Self {
            increment,
            floor,
            ceiling,
            mode,
            reset_positive_on_decrease: false,
        }
    }

    pub fn from_config(config: &BidAdjustmentConfig) -> Self {
        Self {
            increment: config.increment,
            floor: config.floor,
            ceiling: config.ceiling,
            mode: config.step_mode,
            reset_positive_on_decrease: config.reset_positive_on_decrease,
        }
    }
}

/// True when current and target differ by at least one increment
pub fn is_significant(current_bid: f64, target_bid: f64, increment: f64) -> bool {
    (current_bid - target_bid).abs() + BID_EPSILON >= increment
}

/// Bound a bid to [floor, ceiling]
pub fn clamp_bid(value: f64, floor: f64, ceiling: f64) -> f64 {
    value.max(floor).min(ceiling)
}

/// Move the current bid toward the target once
///
/// The result always lies in [floor, ceiling]; a current bid already outside
/// the bounds is pulled back inside even if that goes against the target.
pub fn step(current_bid: f64, target_bid: f64, params: &StepParams) -> f64 {
    if target_bid > current_bid {
        let raw = match params.mode {
            StepMode::Incremental => current_bid + params.increment,
            StepMode::IncrementalToTarget => (current_bid + params.increment).min(target_bid),
            StepMode::SnapToTarget => target_bid,
        };
        clamp_bid(raw, params.floor, params.ceiling)
    } else {
        decrease_toward(current_bid, Some(target_bid), params)
    }
}

/// The decrease branch on its own, used when no reliable target exists
pub fn forced_decrease(current_bid: f64, params: &StepParams) -> f64 {
    decrease_toward(current_bid, None, params)
}

/// Lower the bid straight to a target, never raising it
pub fn decrease_to(current_bid: f64, target_bid: f64, params: &StepParams) -> f64 {
    clamp_bid(target_bid.min(current_bid), params.floor, params.ceiling)
}

fn decrease_toward(current_bid: f64, target_bid: Option<f64>, params: &StepParams) -> f64 {
    let stepped = current_bid - params.increment;
    let mut raw = match (params.mode, target_bid) {
        (StepMode::IncrementalToTarget, Some(target)) => stepped.max(target),
        (StepMode::SnapToTarget, Some(target)) => target,
        _ => stepped,
    };
    if params.reset_positive_on_decrease {
        raw = raw.min(1.0);
    }
    clamp_bid(raw, params.floor, params.ceiling)
}
