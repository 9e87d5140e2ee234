//! Canonical Vocabulary
//!
//! The broker-neutral codes shared by every plugin: feed types, mapping
//! categories, and optional broker operations. Broker-native spellings
//! never leak past the mapping layer; everything above it speaks these.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Feed Type
// =============================================================================

/// Canonical streaming feed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedType {
    /// Last traded price only.
    Ltp,
    /// Top of book plus last trade and volume.
    Quote,
    /// Multi-level order book.
    Depth,
    /// Order lifecycle updates for the session's account.
    OrderUpdate,
}

impl FeedType {
    /// Every canonical feed type.
    pub const ALL: [Self; 4] = [Self::Ltp, Self::Quote, Self::Depth, Self::OrderUpdate];

    /// Canonical code used in mapping tables and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "LTP",
            Self::Quote => "QUOTE",
            Self::Depth => "DEPTH",
            Self::OrderUpdate => "ORDER_UPDATE",
        }
    }

    /// Parse a canonical code, ignoring ASCII case and surrounding whitespace.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|feed| feed.as_str().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a canonical feed type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feed type: {0}")]
pub struct UnknownFeedType(pub String);

impl FromStr for FeedType {
    type Err = UnknownFeedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| UnknownFeedType(s.to_string()))
    }
}

// =============================================================================
// Mapping Category
// =============================================================================

/// The vocabularies a broker translates between canonical and native codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingCategory {
    /// Exchange / segment codes (`NSE` → `nse_cm`).
    Exchange,
    /// Product types (`CNC`, `MIS`, `NRML`).
    Product,
    /// Order types (`LIMIT`, `MARKET`, `SL`, `SL-M`).
    OrderType,
    /// Streaming feed types.
    FeedType,
}

impl MappingCategory {
    /// Every mapping category.
    pub const ALL: [Self; 4] = [Self::Exchange, Self::Product, Self::OrderType, Self::FeedType];

    /// Category name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::Product => "product",
            Self::OrderType => "order_type",
            Self::FeedType => "feed_type",
        }
    }
}

impl fmt::Display for MappingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operation
// =============================================================================

/// Optional broker operations that a plugin may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Pre-trade margin requirement calculation.
    MarginCalculator,
}

impl Operation {
    /// Operation name for logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarginCalculator => "margin_calculator",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("LTP", FeedType::Ltp ; "upper")]
    #[test_case("quote", FeedType::Quote ; "lower")]
    #[test_case(" Depth ", FeedType::Depth ; "padded mixed case")]
    #[test_case("order_update", FeedType::OrderUpdate ; "snake case")]
    fn feed_type_parses_case_insensitively(code: &str, expected: FeedType) {
        assert_eq!(FeedType::from_code(code), Some(expected));
        assert_eq!(code.parse::<FeedType>(), Ok(expected));
    }

    #[test]
    fn feed_type_rejects_unknown_code() {
        assert_eq!(FeedType::from_code("candles"), None);
        assert_eq!(
            "candles".parse::<FeedType>(),
            Err(UnknownFeedType("candles".to_string()))
        );
    }

    #[test]
    fn feed_type_display_matches_code() {
        for feed in FeedType::ALL {
            assert_eq!(feed.to_string(), feed.as_str());
            assert_eq!(FeedType::from_code(feed.as_str()), Some(feed));
        }
    }

    #[test]
    fn feed_type_serializes_as_canonical_code() {
        let json = serde_json::to_string(&FeedType::OrderUpdate).unwrap();
        assert_eq!(json, "\"ORDER_UPDATE\"");
    }

    #[test]
    fn operation_names() {
        assert_eq!(Operation::MarginCalculator.to_string(), "margin_calculator");
        assert_eq!(MappingCategory::OrderType.to_string(), "order_type");
    }
}
