//! Message Normalizer Port
//!
//! Per-broker translation between broker-native stream messages and the
//! canonical vocabulary, in both directions: inbound frames become
//! [`CanonicalEvent`]s, outbound subscription requests become native
//! frames.

use crate::domain::mapping::BrokerMappings;
use crate::domain::streaming::CanonicalEvent;
use crate::domain::vocabulary::FeedType;

/// An inbound message could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Frame is not valid JSON, or not the expected shape.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A required field is absent.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but unusable.
    #[error("Invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The native feed code maps to no canonical feed type.
    #[error("Unknown feed code: {0}")]
    UnknownFeed(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// A subscription request expressed in the broker's native codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSubscription {
    /// Native exchange / segment code.
    pub exchange: String,
    /// Symbol or instrument token, as the caller supplied it.
    pub symbol: String,
    /// Canonical feed type.
    pub feed_type: FeedType,
    /// Native feed code.
    pub feed_code: String,
    /// Order book levels requested; zero unless the feed is depth.
    pub depth_levels: u8,
}

impl NativeSubscription {
    /// Translate a canonical request through the broker's mapping tables.
    #[must_use]
    pub fn from_canonical(
        mappings: &BrokerMappings,
        exchange: &str,
        symbol: &str,
        feed_type: FeedType,
        depth_levels: u8,
    ) -> Self {
        Self {
            exchange: mappings.exchange.to_native(exchange).to_string(),
            symbol: symbol.to_string(),
            feed_type,
            feed_code: mappings.feed.to_native(feed_type.as_str()).to_string(),
            depth_levels: if feed_type == FeedType::Depth {
                depth_levels
            } else {
                0
            },
        }
    }
}

/// Inbound normalization for one broker.
pub trait MessageNormalizer: Send + Sync {
    /// Normalize one raw frame.
    ///
    /// Returns `Ok(None)` for control frames (heartbeats, acks) that carry
    /// no market data.
    fn normalize(
        &self,
        raw: &str,
        mappings: &BrokerMappings,
    ) -> Result<Option<CanonicalEvent>, ParseError>;
}

/// Outbound subscription framing for one broker.
pub trait SubscriptionEncoder: Send + Sync {
    /// Frame that starts a subscription.
    fn subscribe_frame(&self, request: &NativeSubscription) -> String;

    /// Frame that ends a subscription.
    fn unsubscribe_frame(&self, request: &NativeSubscription) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::MappingTable;

    fn mappings() -> BrokerMappings {
        BrokerMappings {
            exchange: MappingTable::from_pairs(&[("NSE", "nse_cm")]),
            feed: MappingTable::from_pairs(&[("LTP", "ltp"), ("DEPTH", "dps")]),
            ..BrokerMappings::default()
        }
    }

    #[test]
    fn native_subscription_translates_codes() {
        let native = NativeSubscription::from_canonical(&mappings(), "NSE", "RELIANCE", FeedType::Ltp, 5);

        assert_eq!(native.exchange, "nse_cm");
        assert_eq!(native.feed_code, "ltp");
        assert_eq!(native.symbol, "RELIANCE");
        assert_eq!(native.depth_levels, 0);
    }

    #[test]
    fn native_subscription_keeps_depth_for_depth_feed() {
        let native = NativeSubscription::from_canonical(&mappings(), "NSE", "RELIANCE", FeedType::Depth, 5);
        assert_eq!(native.feed_code, "dps");
        assert_eq!(native.depth_levels, 5);
    }

    #[test]
    fn native_subscription_passes_unknown_exchange_through() {
        let native = NativeSubscription::from_canonical(&mappings(), "NEW_SEG", "X", FeedType::Ltp, 0);
        assert_eq!(native.exchange, "NEW_SEG");
    }

    #[test]
    fn json_errors_become_malformed() {
        let err: ParseError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, ParseError::Malformed(_)));
    }
}
