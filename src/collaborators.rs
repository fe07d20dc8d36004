//! Interfaces of the services around the adjustment core.
//!
//! Selection, reporting, bid persistence and tagging all live behind these
//! traits; the core only ever talks to an account through them.

use crate::errors::BidResult;
use crate::types::{BidTarget, CampaignId, Dimension, EntityKey, PerformanceSnapshot};
use crate::windows::LookbackWindow;

/// Enumerates the entities a pass works on
pub trait TargetSelectorTrait {
    /// Display name of a campaign
    fn campaign_name(&self, campaign_id: CampaignId) -> String;

    /// Entities of one dimension under a campaign, with their current bids
    fn targets(&self, campaign_id: CampaignId, dimension: Dimension) -> BidResult<Vec<BidTarget>>;
}

/// Reporting service for performance statistics
pub trait MetricsReporterTrait {
    /// Entity statistics for a window, `NoData` when nothing matches
    fn fetch_performance(&self, target: &BidTarget, window: &LookbackWindow) -> BidResult<PerformanceSnapshot>;

    /// Campaign totals for a window, the baseline rate is derived from these
    fn fetch_baseline(&self, campaign_id: CampaignId, window: &LookbackWindow) -> BidResult<PerformanceSnapshot>;
}

/// Bid persistence
pub trait BidMutatorTrait {
    /// Persist a new bid or modifier, `Mutation` on failure
    fn apply_bid(&mut self, target: &BidTarget, new_value: f64) -> BidResult<()>;
}

/// Everything a pass needs from an account
pub trait AdsAccountTrait: TargetSelectorTrait + MetricsReporterTrait + BidMutatorTrait {}

impl<T: TargetSelectorTrait + MetricsReporterTrait + BidMutatorTrait> AdsAccountTrait for T {}

/// Optional persistence of processing marks, for runs resumed across process restarts
pub trait ProcessingTaggerTrait {
    fn mark_processing(&mut self, entities: &[EntityKey]) -> BidResult<()>;
    fn clear_processing(&mut self, entities: &[EntityKey]) -> BidResult<()>;
    fn is_marked(&self, entity: &EntityKey) -> bool;
}
