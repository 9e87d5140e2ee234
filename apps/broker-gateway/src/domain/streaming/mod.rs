//! Canonical Streaming Types
//!
//! The broker-neutral representation of streamed market data and order
//! updates. Every broker normalizer produces [`CanonicalEvent`]s; nothing
//! downstream ever sees a broker's native field names or codes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::subscription::SubscriptionKey;
use super::vocabulary::FeedType;

// =============================================================================
// Canonical Event
// =============================================================================

/// A normalized streaming event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Canonical exchange code.
    pub exchange: String,
    /// Trading symbol or broker instrument token.
    pub symbol: String,
    /// Feed that produced the event.
    pub feed_type: FeedType,
    /// Normalized payload.
    pub payload: EventPayload,
    /// Exchange timestamp, or receive time when the broker omits one.
    pub timestamp: DateTime<Utc>,
}

impl CanonicalEvent {
    /// Subscription this event belongs to.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.exchange, &self.symbol, self.feed_type)
    }

    /// Last traded price carried by the payload, if any.
    #[must_use]
    pub const fn last_price(&self) -> Option<Decimal> {
        match &self.payload {
            EventPayload::Ltp { ltp } => Some(*ltp),
            EventPayload::Quote(quote) => Some(quote.ltp),
            EventPayload::Depth(_) | EventPayload::OrderUpdate(_) => None,
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Feed-specific body of a canonical event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Last traded price.
    Ltp {
        /// Last traded price.
        ltp: Decimal,
    },
    /// Top of book quote.
    Quote(QuotePayload),
    /// Order book snapshot.
    Depth(DepthPayload),
    /// Order lifecycle update.
    OrderUpdate(OrderUpdatePayload),
}

/// Top of book plus last trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePayload {
    /// Last traded price.
    pub ltp: Decimal,
    /// Best bid price.
    pub bid: Option<Decimal>,
    /// Best ask price.
    pub ask: Option<Decimal>,
    /// Quantity at best bid, when reported.
    pub bid_qty: Option<u64>,
    /// Quantity at best ask, when reported.
    pub ask_qty: Option<u64>,
    /// Cumulative traded volume for the session, when reported.
    pub volume: Option<u64>,
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Price.
    pub price: Decimal,
    /// Aggregate quantity.
    pub quantity: u64,
    /// Number of orders, when the broker reports it.
    pub orders: Option<u32>,
}

/// Order book snapshot, best level first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthPayload {
    /// Bid levels.
    pub bids: Vec<DepthLevel>,
    /// Ask levels.
    pub asks: Vec<DepthLevel>,
}

impl DepthPayload {
    /// Keep at most `levels` per side.
    #[must_use]
    pub fn truncated(mut self, levels: usize) -> Self {
        self.bids.truncate(levels);
        self.asks.truncate(levels);
        self
    }
}

/// Canonical order update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdatePayload {
    /// Broker order id.
    pub order_id: String,
    /// Broker status text, lowercased.
    pub status: String,
    /// Canonical product code, when reported.
    pub product: Option<String>,
    /// Canonical order type, when reported.
    pub order_type: Option<String>,
    /// Filled quantity so far, when reported.
    pub filled_qty: Option<u64>,
    /// Average fill price, when filled.
    pub average_price: Option<Decimal>,
}

// =============================================================================
// Tests
// =============================================================================
