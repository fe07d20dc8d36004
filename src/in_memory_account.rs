//! In-memory account backing every collaborator trait.
//!
//! Used by the tests and by the daily simulation. Performance is recorded per
//! (entity, date range); campaign baselines default to the sum of the entities
//! recorded under the campaign.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::collaborators::{BidMutatorTrait, MetricsReporterTrait, ProcessingTaggerTrait, TargetSelectorTrait};
use crate::errors::{BidError, BidResult};
use crate::types::{BidTarget, CampaignId, Dimension, EntityKey, LocationType, PerformanceSnapshot};
use crate::windows::LookbackWindow;

type RangeKey = (NaiveDate, NaiveDate);

fn range_key(window: &LookbackWindow) -> RangeKey {
    (window.start, window.end)
}

struct CampaignRecord {
    name: String,
    targets: Vec<BidTarget>,
}

pub struct InMemoryAccount {
    campaigns: BTreeMap<CampaignId, CampaignRecord>,
    performance: HashMap<(EntityKey, RangeKey), PerformanceSnapshot>,
    baselines: HashMap<(CampaignId, RangeKey), PerformanceSnapshot>,
    failing: HashMap<EntityKey, String>,
    mutations: Vec<(EntityKey, f64)>,
}

impl InMemoryAccount {
    pub fn new() -> Self {
        Self {
            campaigns: BTreeMap::new(),
            performance: HashMap::new(),
            baselines: HashMap::new(),
            failing: HashMap::new(),
            mutations: Vec::new(),
        }
    }

    /// Add a campaign, ids follow insertion order
    pub fn add_campaign(&mut self, name: &str) -> CampaignId {
        let campaign_id = self.campaigns.len();
        self.campaigns.insert(campaign_id, CampaignRecord { name: name.to_string(), targets: Vec::new() });
        campaign_id
    }

    /// Add an entity under a campaign, target ids follow insertion order within the campaign
    pub fn add_target(&mut self, campaign_id: CampaignId, name: &str, dimension: Dimension, bid: f64) -> BidResult<EntityKey> {
        let record = self
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| BidError::no_data(format!("campaign {}", campaign_id)))?;
        let target = BidTarget::new(campaign_id, record.targets.len(), name, dimension, bid);
        let key = target.key;
        record.targets.push(target);
        Ok(key)
    }

    pub fn set_location_type(&mut self, key: EntityKey, location_type: LocationType) {
        if let Some(target) = self.target_mut(&key) {
            target.location_type = Some(location_type);
        }
    }

    pub fn add_label(&mut self, key: EntityKey, label: &str) {
        if let Some(target) = self.target_mut(&key) {
            if !target.has_label(label) {
                target.labels.push(label.to_string());
            }
        }
    }

    pub fn campaign_ids(&self) -> Vec<CampaignId> {
        self.campaigns.keys().copied().collect()
    }

    /// Campaign ids with their names, for name-filtered scopes
    pub fn campaigns(&self) -> Vec<(CampaignId, String)> {
        self.campaigns.iter().map(|(id, record)| (*id, record.name.clone())).collect()
    }

    pub fn set_performance(&mut self, key: EntityKey, window: &LookbackWindow, snapshot: PerformanceSnapshot) {
        self.performance.insert((key, range_key(window)), snapshot);
    }

    /// Override the baseline of a campaign instead of summing its entities
    pub fn set_baseline(&mut self, campaign_id: CampaignId, window: &LookbackWindow, snapshot: PerformanceSnapshot) {
        self.baselines.insert((campaign_id, range_key(window)), snapshot);
    }

    /// Forget every recorded snapshot and baseline
    pub fn clear_performance(&mut self) {
        self.performance.clear();
        self.baselines.clear();
    }

    /// Make every bid write for this entity fail
    pub fn fail_mutations_for(&mut self, key: EntityKey, reason: &str) {
        self.failing.insert(key, reason.to_string());
    }

    pub fn bid(&self, key: &EntityKey) -> Option<f64> {
        self.target(key).map(|t| t.current_bid)
    }

    pub fn target(&self, key: &EntityKey) -> Option<&BidTarget> {
        self.campaigns
            .get(&key.campaign_id)
            .and_then(|c| c.targets.get(key.target_id))
    }

    fn target_mut(&mut self, key: &EntityKey) -> Option<&mut BidTarget> {
        self.campaigns
            .get_mut(&key.campaign_id)
            .and_then(|c| c.targets.get_mut(key.target_id))
    }

    /// Successful writes in the order they happened
    pub fn mutations(&self) -> &[(EntityKey, f64)] {
        &self.mutations
    }
}

impl Default for InMemoryAccount {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSelectorTrait for InMemoryAccount {
    fn campaign_name(&self, campaign_id: CampaignId) -> String {
        self.campaigns
            .get(&campaign_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("Campaign {}", campaign_id))
    }

    fn targets(&self, campaign_id: CampaignId, dimension: Dimension) -> BidResult<Vec<BidTarget>> {
        let record = self
            .campaigns
            .get(&campaign_id)
            .ok_or_else(|| BidError::no_data(format!("campaign {}", campaign_id)))?;
        Ok(record.targets.iter().filter(|t| t.dimension == dimension).cloned().collect())
    }
}

impl MetricsReporterTrait for InMemoryAccount {
    fn fetch_performance(&self, target: &BidTarget, window: &LookbackWindow) -> BidResult<PerformanceSnapshot> {
        self.performance
            .get(&(target.key, range_key(window)))
            .copied()
            .ok_or_else(|| BidError::no_data(format!("{} in {}", target.label(), window)))
    }

    fn fetch_baseline(&self, campaign_id: CampaignId, window: &LookbackWindow) -> BidResult<PerformanceSnapshot> {
        if let Some(baseline) = self.baselines.get(&(campaign_id, range_key(window))) {
            return Ok(*baseline);
        }
        let range = range_key(window);
        let parts: Vec<&PerformanceSnapshot> = self
            .performance
            .iter()
            .filter(|((key, r), _)| key.campaign_id == campaign_id && *r == range)
            .map(|(_, snapshot)| snapshot)
            .collect();
        if parts.is_empty() {
            return Err(BidError::no_data(format!("campaign {} in {}", campaign_id, window)));
        }
        Ok(PerformanceSnapshot::aggregate(parts))
    }
}

impl BidMutatorTrait for InMemoryAccount {
    fn apply_bid(&mut self, target: &BidTarget, new_value: f64) -> BidResult<()> {
        if let Some(reason) = self.failing.get(&target.key) {
            return Err(BidError::Mutation {
                entity: target.label(),
                attempted: new_value,
                reason: reason.clone(),
            });
        }
        let stored = self
            .target_mut(&target.key)
            .ok_or_else(|| BidError::Mutation {
                entity: target.label(),
                attempted: new_value,
                reason: "unknown entity".to_string(),
            })?;
        stored.current_bid = new_value;
        self.mutations.push((target.key, new_value));
        Ok(())
    }
}

/// Tag store keeping processing marks in a set
#[derive(Default)]
pub struct InMemoryTagger {
    pub tags: BTreeSet<EntityKey>,
    /// Reject every mark request
    pub fail: bool,
}

impl ProcessingTaggerTrait for InMemoryTagger {
    fn mark_processing(&mut self, entities: &[EntityKey]) -> BidResult<()> {
        if self.fail {
            return Err(BidError::Tagging("label service unavailable".to_string()));
        }
        self.tags.extend(entities.iter().copied());
        Ok(())
    }

    fn clear_processing(&mut self, entities: &[EntityKey]) -> BidResult<()> {
        for key in entities {
            self.tags.remove(key);
        }
        Ok(())
    }

    fn is_marked(&self, entity: &EntityKey) -> bool {
        self.tags.contains(entity)
    }
}
