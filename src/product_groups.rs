//! Shopping product-group trees and bid propagation from the ad group down to the leaves.

use crate::errors::{BidError, BidResult};
use crate::logger::{LogEvent, Logger};
use crate::{logln, warnln};

/// One node of a product-group tree
///
/// Only leaves carry a bid; inner nodes just subdivide. Excluded nodes carry
/// no bid and their whole subtree is left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductGroupNode {
    pub name: String,
    pub excluded: bool,
    pub max_cpc: Option<f64>,
    pub children: Vec<ProductGroupNode>,
}

impl ProductGroupNode {
    pub fn leaf(name: &str, max_cpc: Option<f64>) -> Self {
        Self { name: name.to_string(), excluded: false, max_cpc, children: Vec::new() }
    }

    pub fn excluded(name: &str) -> Self {
        Self { name: name.to_string(), excluded: true, max_cpc: None, children: Vec::new() }
    }

    pub fn subdivision(name: &str, children: Vec<ProductGroupNode>) -> Self {
        Self { name: name.to_string(), excluded: false, max_cpc: None, children }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Bids of the biddable leaves, depth first
    pub fn leaf_bids(&self) -> Vec<Option<f64>> {
        let mut bids = Vec::new();
        collect_leaf_bids(self, &mut bids);
        bids
    }
}

fn collect_leaf_bids(node: &ProductGroupNode, bids: &mut Vec<Option<f64>>) {
    if node.excluded {
        return;
    }
    if node.is_leaf() {
        bids.push(node.max_cpc);
    }
    for child in &node.children {
        collect_leaf_bids(child, bids);
    }
}

/// Shopping ad group with its CPC and the roots of its product-group tree
#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingAdGroup {
    pub name: String,
    pub cpc: f64,
    pub product_groups: Vec<ProductGroupNode>,
}

/// Set `bid` on every non-excluded leaf below `nodes`, depth first
///
/// # Returns
/// Number of leaves updated, or a `Configuration` error for a negative or non-finite bid
pub fn apply_ad_group_bid(nodes: &mut [ProductGroupNode], bid: f64) -> BidResult<usize> {
    if !bid.is_finite() || bid < 0.0 {
        return Err(BidError::configuration(format!("product group bid must be a non-negative number, got {}", bid)));
    }
    Ok(nodes.iter_mut().map(|node| set_leaf_bids(node, bid)).sum())
}

fn set_leaf_bids(node: &mut ProductGroupNode, bid: f64) -> usize {
    if node.excluded {
        return 0;
    }
    if node.is_leaf() {
        node.max_cpc = Some(bid);
        return 1;
    }
    node.children.iter_mut().map(|child| set_leaf_bids(child, bid)).sum()
}

/// Copy every ad group's CPC onto its product groups
///
/// An ad group with an unusable CPC is logged and left untouched; the others still get updated.
pub fn propagate_ad_group_bids(ad_groups: &mut [ShoppingAdGroup], logger: &mut Logger) -> usize {
    logln!(logger, LogEvent::Pass, "Total ad groups found: {}", ad_groups.len());
    let mut updated = 0;
    for ad_group in ad_groups.iter_mut() {
        match apply_ad_group_bid(&mut ad_group.product_groups, ad_group.cpc) {
            Ok(leaves) => {
                logln!(logger, LogEvent::Entity, "{}: {} product groups set to {:.2}", ad_group.name, leaves, ad_group.cpc);
                updated += leaves;
            }
            Err(e) => {
                warnln!(logger, LogEvent::Entity, "{}: {}", ad_group.name, e);
            }
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Vec<ProductGroupNode> {
        vec![ProductGroupNode::subdivision(
            "All products",
            vec![
                ProductGroupNode::subdivision(
                    "Shoes",
                    vec![ProductGroupNode::leaf("Running", Some(0.40)), ProductGroupNode::leaf("Hiking", None)],
                ),
                ProductGroupNode {
                    name: "Clearance".to_string(),
                    excluded: true,
                    max_cpc: None,
                    children: vec![ProductGroupNode::leaf("Old stock", Some(0.10))],
                },
                ProductGroupNode::leaf("Everything else", Some(0.25)),
            ],
        )]
    }

    #[test]
    fn test_bid_reaches_every_biddable_leaf() {
        let mut nodes = tree();
        assert_eq!(apply_ad_group_bid(&mut nodes, 0.75).unwrap(), 3);
        assert_eq!(nodes[0].leaf_bids(), vec![Some(0.75), Some(0.75), Some(0.75)]);
    }

    #[test]
    fn test_excluded_subtree_untouched() {
        let mut nodes = tree();
        apply_ad_group_bid(&mut nodes, 0.75).unwrap();
        let clearance = &nodes[0].children[1];
        assert_eq!(clearance.max_cpc, None);
        assert_eq!(clearance.children[0].max_cpc, Some(0.10));
        // inner nodes never get a bid
        assert_eq!(nodes[0].max_cpc, None);
        assert_eq!(nodes[0].children[0].max_cpc, None);
    }

    #[test]
    fn test_excluded_root_and_empty_tree() {
        let mut nodes = vec![ProductGroupNode::excluded("All products")];
        assert_eq!(apply_ad_group_bid(&mut nodes, 1.0).unwrap(), 0);
        assert_eq!(apply_ad_group_bid(&mut [], 1.0).unwrap(), 0);
    }

    #[test]
    fn test_invalid_bid_rejected() {
        let mut nodes = tree();
        assert!(matches!(apply_ad_group_bid(&mut nodes, -0.5), Err(BidError::Configuration(_))));
        assert!(apply_ad_group_bid(&mut nodes, f64::NAN).is_err());
        assert_eq!(nodes, tree());
    }

    #[test]
    fn test_propagate_skips_bad_ad_group() {
        let mut logger = Logger::new();
        let mut ad_groups = vec![
            ShoppingAdGroup { name: "Shoes".to_string(), cpc: 0.60, product_groups: tree() },
            ShoppingAdGroup { name: "Broken".to_string(), cpc: f64::INFINITY, product_groups: tree() },
        ];
        assert_eq!(propagate_ad_group_bids(&mut ad_groups, &mut logger), 3);
        assert_eq!(ad_groups[1].product_groups, tree());
    }
}
