use std::fmt;

pub type CampaignId = usize;
pub type TargetId = usize;

/// Identity of one (campaign, dimension-target) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub campaign_id: CampaignId,
    pub target_id: TargetId,
}

impl EntityKey {
    pub fn new(campaign_id: CampaignId, target_id: TargetId) -> Self {
        Self { campaign_id, target_id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}/T{}", self.campaign_id, self.target_id)
    }
}

/// How a bid value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidKind {
    /// Multiplicative adjustment on top of a base bid (1.20 = +20%)
    Modifier,
    /// Absolute cost-per-click in account currency
    AbsoluteCpc,
}

/// Targeting dimension that carries a bid or a bid modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Device,
    Location,
    AdSchedule,
    Keyword,
    AdGroup,
}

impl Dimension {
    pub fn bid_kind(self) -> BidKind {
        match self {
            Dimension::Device | Dimension::Location | Dimension::AdSchedule => BidKind::Modifier,
            Dimension::Keyword | Dimension::AdGroup => BidKind::AbsoluteCpc,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Device => "device",
            Dimension::Location => "location",
            Dimension::AdSchedule => "ad schedule",
            Dimension::Keyword => "keyword",
            Dimension::AdGroup => "ad group",
        }
    }
}

/// Granularity of a targeted location, provinces and territories count as states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationType {
    Country,
    State,
    City,
}

/// Read/write view of one entity's bid for a single evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct BidTarget {
    pub key: EntityKey,
    pub name: String,
    pub dimension: Dimension,
    pub bid_kind: BidKind,
    pub current_bid: f64,
    /// Only set for location targets
    pub location_type: Option<LocationType>,
    pub labels: Vec<String>,
}

impl BidTarget {
    pub fn new(campaign_id: CampaignId, target_id: TargetId, name: &str, dimension: Dimension, current_bid: f64) -> Self {
        Self {
            key: EntityKey::new(campaign_id, target_id),
            name: name.to_string(),
            dimension,
            bid_kind: dimension.bid_kind(),
            current_bid,
            location_type: None,
            labels: Vec::new(),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Human readable identity used in logs and errors
    pub fn label(&self) -> String {
        format!("{} {} '{}'", self.key, self.dimension.name(), self.name)
    }
}

/// Measured performance for one (entity, date range) pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceSnapshot {
    pub clicks: u64,
    /// Fractional in revenue-attributed accounts
    pub conversions: f64,
    pub cost: f64,
    pub revenue: f64,
}

impl PerformanceSnapshot {
    pub fn new(clicks: u64, conversions: f64, cost: f64, revenue: f64) -> Self {
        Self { clicks, conversions, cost, revenue }
    }

    /// conversions / clicks, 0 without clicks
    pub fn conversion_rate(&self) -> f64 {
        if self.clicks == 0 {
            0.0
        } else {
            self.conversions / self.clicks as f64
        }
    }

    /// revenue / clicks, 0 without clicks
    pub fn revenue_per_click(&self) -> f64 {
        if self.clicks == 0 {
            0.0
        } else {
            self.revenue / self.clicks as f64
        }
    }

    /// cost / conversions, None without conversions
    pub fn cost_per_conversion(&self) -> Option<f64> {
        if self.conversions > 0.0 {
            Some(self.cost / self.conversions)
        } else {
            None
        }
    }

    /// cost / revenue, None without revenue
    pub fn cost_of_sales(&self) -> Option<f64> {
        if self.revenue > 0.0 {
            Some(self.cost / self.revenue)
        } else {
            None
        }
    }

    /// Sum of several snapshots (campaign totals from its targets)
    pub fn aggregate<'a, I: IntoIterator<Item = &'a PerformanceSnapshot>>(snapshots: I) -> Self {
        snapshots.into_iter().fold(Self::default(), |acc, s| Self {
            clicks: acc.clicks + s.clicks,
            conversions: acc.conversions + s.conversions,
            cost: acc.cost + s.cost,
            revenue: acc.revenue + s.revenue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_clicks_rates_are_zero() {
        let snapshot = PerformanceSnapshot::new(0, 0.0, 12.0, 0.0);
        assert_eq!(snapshot.conversion_rate(), 0.0);
        assert_eq!(snapshot.revenue_per_click(), 0.0);
        assert_eq!(snapshot.cost_per_conversion(), None);
        assert_eq!(snapshot.cost_of_sales(), None);
    }

    #[test]
    fn test_derived_rates() {
        let snapshot = PerformanceSnapshot::new(200, 8.0, 400.0, 1600.0);
        assert!((snapshot.conversion_rate() - 0.04).abs() < 1e-12);
        assert!((snapshot.revenue_per_click() - 8.0).abs() < 1e-12);
        assert_eq!(snapshot.cost_per_conversion(), Some(50.0));
        assert_eq!(snapshot.cost_of_sales(), Some(0.25));
    }

    #[test]
    fn test_aggregate_sums_fields() {
        let parts = vec![
            PerformanceSnapshot::new(100, 2.0, 50.0, 80.0),
            PerformanceSnapshot::new(300, 10.5, 150.0, 420.0),
        ];
        let total = PerformanceSnapshot::aggregate(&parts);
        assert_eq!(total, PerformanceSnapshot::new(400, 12.5, 200.0, 500.0));
    }

    #[test]
    fn test_dimension_bid_kinds() {
        assert_eq!(Dimension::Device.bid_kind(), BidKind::Modifier);
        assert_eq!(Dimension::AdSchedule.bid_kind(), BidKind::Modifier);
        assert_eq!(Dimension::Keyword.bid_kind(), BidKind::AbsoluteCpc);
        assert_eq!(BidTarget::new(1, 2, "Mobile", Dimension::Device, 1.0).label(), "C1/T2 device 'Mobile'");
    }
}
