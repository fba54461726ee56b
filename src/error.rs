use crate::models::Security;
use std::fmt;
use thiserror::Error;

/// Why the venue refused a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Quantity has more decimal places than the venue accepts
    InvalidIncrement,
    /// Sell submitted before the bought asset is spendable
    InsufficientHoldings,
    /// Cancel raced with a fill or another terminal transition
    NotCancelable,
    Other(String),
}

impl RejectReason {
    /// Classify a venue error message by substring
    pub fn classify(message: &str) -> Self {
        if message.contains("invalid increment")
            || message.contains("Ensure that there are no more than")
        {
            RejectReason::InvalidIncrement
        } else if message.contains("Insufficient holdings") {
            RejectReason::InsufficientHoldings
        } else if message.contains("cannot be canceled") {
            RejectReason::NotCancelable
        } else {
            RejectReason::Other(message.to_string())
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidIncrement => f.write_str("quantity has invalid increment"),
            RejectReason::InsufficientHoldings => f.write_str("insufficient holdings"),
            RejectReason::NotCancelable => f.write_str("order cannot be canceled"),
            RejectReason::Other(message) => f.write_str(message),
        }
    }
}

#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Order for {security} rejected: {reason}")]
    OrderRejected {
        security: Security,
        reason: RejectReason,
    },

    #[error("Quantity {quantity} for {security} cannot be reduced any further")]
    QuantityTooSmall { security: Security, quantity: f64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

impl TradeError {
    pub fn is_upstream(&self) -> bool {
        matches!(self, TradeError::UpstreamUnavailable(_))
    }
}

impl From<reqwest::Error> for TradeError {
    fn from(err: reqwest::Error) -> Self {
        TradeError::UpstreamUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for TradeError {
    fn from(err: redis::RedisError) -> Self {
        TradeError::Store(err.to_string())
    }
}

impl From<std::io::Error> for TradeError {
    fn from(err: std::io::Error) -> Self {
        TradeError::Store(err.to_string())
    }
}

impl From<config::ConfigError> for TradeError {
    fn from(err: config::ConfigError) -> Self {
        TradeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reject_messages() {
        assert_eq!(
            RejectReason::classify(
                "{\"non_field_errors\": [\"Order quantity has invalid increment.\"]}"
            ),
            RejectReason::InvalidIncrement
        );
        assert_eq!(
            RejectReason::classify("Ensure that there are no more than 8 decimal places."),
            RejectReason::InvalidIncrement
        );
        assert_eq!(
            RejectReason::classify("Insufficient holdings."),
            RejectReason::InsufficientHoldings
        );
        assert_eq!(
            RejectReason::classify("Order cannot be canceled at this time."),
            RejectReason::NotCancelable
        );
        assert_eq!(
            RejectReason::classify("Market closed"),
            RejectReason::Other("Market closed".to_string())
        );
    }

    #[test]
    fn test_upstream_detection() {
        assert!(TradeError::UpstreamUnavailable("timeout".into()).is_upstream());
        assert!(!TradeError::Store("disk full".into()).is_upstream());
    }
}
