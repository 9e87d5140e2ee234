//! Margin Calculator Port
//!
//! Optional per-broker contract translating canonical positions into the
//! broker's margin API request and parsing its response. Brokers without a
//! margin API register no calculator; asking the registry for one yields
//! `NotSupportedError`.

use crate::domain::margin::{MarginPosition, MarginSummary};

/// Margin calculation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarginError {
    /// Nothing to calculate.
    #[error("No positions supplied")]
    EmptyBasket,

    /// The broker response was not usable.
    #[error("Invalid margin response: {0}")]
    InvalidResponse(String),

    /// The broker reported an error.
    #[error("Broker rejected margin request: {0}")]
    Rejected(String),
}

/// Broker-specific margin request / response translation.
pub trait MarginCalculator: Send + Sync {
    /// Build the broker-native request body for a basket of positions.
    fn transform_positions(&self, positions: &[MarginPosition]) -> Result<serde_json::Value, MarginError>;

    /// Parse the broker-native response body.
    fn parse_response(&self, response: &serde_json::Value) -> Result<MarginSummary, MarginError>;
}
