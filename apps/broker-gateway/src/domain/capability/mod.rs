//! Capability Registry
//!
//! Static, per-broker declaration of which feed types, exchanges, and
//! optional operations a broker supports. Adapters consult it before
//! touching the network; callers consult it to branch on features
//! instead of hardcoding broker identities.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::vocabulary::{FeedType, Operation};

// =============================================================================
// Errors
// =============================================================================

/// A subscription asked for something the broker does not declare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Feed type not offered by this broker.
    #[error("broker '{broker}' does not support feed type {feed}")]
    FeedNotSupported {
        /// Broker identifier.
        broker: String,
        /// Requested feed type.
        feed: FeedType,
    },

    /// Exchange not offered by this broker.
    #[error("broker '{broker}' does not support exchange {exchange}")]
    ExchangeNotSupported {
        /// Broker identifier.
        broker: String,
        /// Requested canonical exchange.
        exchange: String,
    },
}

/// An optional operation was requested from a broker that lacks it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broker '{broker}' does not support {operation}")]
pub struct NotSupportedError {
    /// Broker identifier.
    pub broker: String,
    /// Requested operation.
    pub operation: Operation,
}

impl NotSupportedError {
    /// Create a new error.
    #[must_use]
    pub fn new(broker: impl Into<String>, operation: Operation) -> Self {
        Self {
            broker: broker.into(),
            operation,
        }
    }
}

// =============================================================================
// Capability Registry
// =============================================================================

/// What a single broker can do.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    broker: String,
    feeds: HashMap<FeedType, bool>,
    operations: HashSet<Operation>,
    exchanges: Option<HashSet<String>>,
    default_depth: u8,
    depth_overrides: HashMap<String, u8>,
}

impl CapabilityRegistry {
    /// Start declaring capabilities for a broker.
    #[must_use]
    pub fn builder(broker: impl Into<String>) -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder {
            registry: Self {
                broker: broker.into(),
                ..Self::default()
            },
        }
    }

    /// Broker this registry describes.
    #[must_use]
    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Whether the broker streams this feed type. Undeclared means no.
    #[must_use]
    pub fn supports_feed(&self, feed: FeedType) -> bool {
        self.feeds.get(&feed).copied().unwrap_or(false)
    }

    /// Whether the broker offers an optional operation.
    #[must_use]
    pub fn supports_operation(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// Whether the broker accepts subscriptions on a canonical exchange.
    ///
    /// A broker that declares no exchange list accepts any exchange.
    #[must_use]
    pub fn supports_exchange(&self, exchange: &str) -> bool {
        self.exchanges
            .as_ref()
            .is_none_or(|set| set.contains(&exchange.trim().to_ascii_uppercase()))
    }

    /// Order book levels streamed for a canonical exchange. Zero without depth.
    #[must_use]
    pub fn max_depth_levels(&self, exchange: &str) -> u8 {
        if !self.supports_feed(FeedType::Depth) {
            return 0;
        }
        self.depth_overrides
            .get(&exchange.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.default_depth)
    }

    /// Feed types the broker declares as supported.
    #[must_use]
    pub fn supported_feeds(&self) -> Vec<FeedType> {
        FeedType::ALL
            .into_iter()
            .filter(|feed| self.supports_feed(*feed))
            .collect()
    }

    /// Validate a subscription request against the declaration.
    pub fn check_subscription(&self, exchange: &str, feed: FeedType) -> Result<(), CapabilityError> {
        if !self.supports_feed(feed) {
            return Err(CapabilityError::FeedNotSupported {
                broker: self.broker.clone(),
                feed,
            });
        }
        if !self.supports_exchange(exchange) {
            return Err(CapabilityError::ExchangeNotSupported {
                broker: self.broker.clone(),
                exchange: exchange.to_string(),
            });
        }
        Ok(())
    }

    /// Require an optional operation.
    pub fn require_operation(&self, operation: Operation) -> Result<(), NotSupportedError> {
        if self.supports_operation(operation) {
            Ok(())
        } else {
            Err(NotSupportedError::new(self.broker.clone(), operation))
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Declarative builder for [`CapabilityRegistry`].
#[derive(Debug)]
pub struct CapabilityRegistryBuilder {
    registry: CapabilityRegistry,
}

impl CapabilityRegistryBuilder {
    /// Declare support (or explicit lack of support) for a feed type.
    #[must_use]
    pub fn feed(mut self, feed: FeedType, supported: bool) -> Self {
        self.registry.feeds.insert(feed, supported);
        self
    }

    /// Declare several supported feed types.
    #[must_use]
    pub fn feeds(self, feeds: impl IntoIterator<Item = FeedType>) -> Self {
        feeds.into_iter().fold(self, |b, feed| b.feed(feed, true))
    }

    /// Declare an optional operation as supported.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.registry.operations.insert(operation);
        self
    }

    /// Restrict subscriptions to these canonical exchanges.
    #[must_use]
    pub fn exchanges<'a>(mut self, exchanges: impl IntoIterator<Item = &'a str>) -> Self {
        let set = self.registry.exchanges.get_or_insert_with(HashSet::new);
        set.extend(exchanges.into_iter().map(|e| e.trim().to_ascii_uppercase()));
        self
    }

    /// Default order book depth when depth is supported.
    #[must_use]
    pub const fn depth_levels(mut self, levels: u8) -> Self {
        self.registry.default_depth = levels;
        self
    }

    /// Exchange-specific order book depth.
    #[must_use]
    pub fn depth_levels_for(mut self, exchange: &str, levels: u8) -> Self {
        self.registry
            .depth_overrides
            .insert(exchange.trim().to_ascii_uppercase(), levels);
        self
    }

    /// Finish the registry.
    #[must_use]
    pub fn build(self) -> CapabilityRegistry {
        self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CapabilityRegistry {
        CapabilityRegistry::builder("kotak")
            .feeds([FeedType::Ltp, FeedType::Quote, FeedType::Depth])
            .feed(FeedType::OrderUpdate, false)
            .operation(Operation::MarginCalculator)
            .exchanges(["NSE", "nfo"])
            .depth_levels(5)
            .depth_levels_for("NFO", 20)
            .build()
    }

    #[test]
    fn declared_feeds_are_supported() {
        let caps = sample();
        assert!(caps.supports_feed(FeedType::Ltp));
        assert!(caps.supports_feed(FeedType::Depth));
        assert!(!caps.supports_feed(FeedType::OrderUpdate));
    }

    #[test]
    fn undeclared_feed_is_unsupported() {
        let caps = CapabilityRegistry::builder("wisdom")
            .feed(FeedType::Ltp, true)
            .build();
        assert!(!caps.supports_feed(FeedType::Quote));
        assert_eq!(caps.supported_feeds(), vec![FeedType::Ltp]);
    }

    #[test]
    fn operations_are_opt_in() {
        let caps = sample();
        assert!(caps.supports_operation(Operation::MarginCalculator));
        assert!(caps.require_operation(Operation::MarginCalculator).is_ok());

        let caps = CapabilityRegistry::builder("wisdom").build();
        let err = caps.require_operation(Operation::MarginCalculator).unwrap_err();
        assert_eq!(err, NotSupportedError::new("wisdom", Operation::MarginCalculator));
    }

    #[test]
    fn exchange_list_is_case_insensitive() {
        let caps = sample();
        assert!(caps.supports_exchange("nse"));
        assert!(caps.supports_exchange("NFO"));
        assert!(!caps.supports_exchange("MCX"));
    }

    #[test]
    fn missing_exchange_list_accepts_everything() {
        let caps = CapabilityRegistry::builder("dhan").feeds([FeedType::Ltp]).build();
        assert!(caps.supports_exchange("ANY_NEW_SEGMENT"));
    }

    #[test]
    fn depth_levels_follow_exchange_overrides() {
        let caps = sample();
        assert_eq!(caps.max_depth_levels("NSE"), 5);
        assert_eq!(caps.max_depth_levels("nfo"), 20);
    }

    #[test]
    fn depth_levels_are_zero_without_depth_feed() {
        let caps = CapabilityRegistry::builder("wisdom")
            .feeds([FeedType::Ltp])
            .depth_levels(5)
            .build();
        assert_eq!(caps.max_depth_levels("NSE"), 0);
    }

    #[test]
    fn check_subscription_reports_feed_first() {
        let caps = sample();
        assert!(caps.check_subscription("NSE", FeedType::Ltp).is_ok());

        let err = caps
            .check_subscription("MCX", FeedType::OrderUpdate)
            .unwrap_err();
        assert!(matches!(err, CapabilityError::FeedNotSupported { feed: FeedType::OrderUpdate, .. }));

        let err = caps.check_subscription("MCX", FeedType::Ltp).unwrap_err();
        assert_eq!(
            err.to_string(),
            "broker 'kotak' does not support exchange MCX"
        );
    }
}
