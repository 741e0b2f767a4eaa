//! Error types for the order book and feed reconciliation.

use thiserror::Error;

use crate::order::{OrderId, Price};

/// Result type alias for order book operations.
pub type Result<T> = std::result::Result<T, LobError>;

/// Main error type.
///
/// A cancel or reprice naming an order that is not resting is *not* an
/// error: that order has usually just traded, so those calls return `false`.
#[derive(Error, Debug)]
pub enum LobError {
    /// Order that cannot enter the matching path
    #[error("Invalid order {order_id}: {reason}")]
    InvalidOrder { order_id: OrderId, reason: String },

    /// A Normal order reused the id of an order still resting
    #[error("Duplicate order ID: {0}")]
    DuplicateOrderId(OrderId),

    /// Message text that could not be decoded
    #[error("Malformed message `{line}`: {reason}")]
    MalformedMessage { line: String, reason: String },

    /// A trade price that is inconsistent with the book's best price
    #[error("Feed ordering anomaly: traded at {price} but best price is {best}")]
    FeedOrderingAnomaly { price: Price, best: Price },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LobError {
    pub fn malformed(line: &str, reason: impl Into<String>) -> Self {
        LobError::MalformedMessage {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_order(order_id: OrderId, reason: impl Into<String>) -> Self {
        LobError::InvalidOrder {
            order_id,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LobError {
    fn from(err: serde_json::Error) -> Self {
        LobError::Config(err.to_string())
    }
}
