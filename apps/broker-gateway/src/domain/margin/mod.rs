//! Margin Calculator Types
//!
//! Canonical inputs and outputs of the optional pre-trade margin
//! calculation. Brokers translate positions into their native request
//! format and parse their native response back into a [`MarginSummary`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl TradeAction {
    /// Canonical action code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// One prospective position for margin calculation, in canonical codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginPosition {
    /// Symbol or broker instrument token.
    pub symbol: String,
    /// Canonical exchange code.
    pub exchange: String,
    /// Canonical product code.
    pub product: String,
    /// Canonical order type.
    pub order_type: String,
    /// Buy or sell.
    pub action: TradeAction,
    /// Quantity in units (not lots).
    pub quantity: u64,
    /// Limit price; zero for market orders.
    pub price: Decimal,
    /// Trigger price for stop orders.
    pub trigger_price: Option<Decimal>,
}

/// Canonical margin calculation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginSummary {
    /// Total margin required for the basket.
    pub total_margin: Decimal,
    /// SPAN component, when the broker breaks it out.
    pub span_margin: Option<Decimal>,
    /// Exposure component, when the broker breaks it out.
    pub exposure_margin: Option<Decimal>,
    /// Cash available in the account, when reported.
    pub available_cash: Option<Decimal>,
}

impl MarginSummary {
    /// Summary carrying only a total.
    #[must_use]
    pub const fn total(total_margin: Decimal) -> Self {
        Self {
            total_margin,
            span_margin: None,
            exposure_margin: None,
            available_cash: None,
        }
    }

    /// Shortfall against available cash, if cash is known and insufficient.
    #[must_use]
    pub fn shortfall(&self) -> Option<Decimal> {
        let cash = self.available_cash?;
        (self.total_margin > cash).then(|| self.total_margin - cash)
    }
}
