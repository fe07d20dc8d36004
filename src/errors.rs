use thiserror::Error;

/// Result alias used throughout the crate
pub type BidResult<T> = Result<T, BidError>;

/// Errors raised by the adjustment core and its collaborators
///
/// `NoData` and `Mutation` are recovered per entity inside a pass.
/// `Configuration` aborts a pass before any entity is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BidError {
    #[error("no data for {what}")]
    NoData { what: String },

    #[error("failed to set bid {attempted:.4} on {entity}: {reason}")]
    Mutation { entity: String, attempted: f64, reason: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("processing tag error: {0}")]
    Tagging(String),
}

impl BidError {
    pub fn no_data(what: impl Into<String>) -> Self {
        BidError::NoData { what: what.into() }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        BidError::Configuration(msg.into())
    }

    /// True for errors that only skip one entity or campaign
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BidError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_message_names_entity_and_value() {
        let err = BidError::Mutation {
            entity: "Campaign 1 / Mobile".to_string(),
            attempted: 1.05,
            reason: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "failed to set bid 1.0500 on Campaign 1 / Mobile: quota exceeded");
    }

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(BidError::no_data("x").is_recoverable());
        assert!(BidError::Tagging("x".into()).is_recoverable());
        assert!(!BidError::configuration("floor > ceiling").is_recoverable());
    }
}
