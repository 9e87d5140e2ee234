//! Dhan (sandbox)
//!
//! Dhan's v2 market feed in JSON mode. Instruments are addressed by
//! exchange segment and numeric security id; the token and client id
//! travel in the connection URL.
//!
//! # Wire Format (JSON)
//! ```json
//! {"RequestCode": "SUBSCRIBE", "Feed": "TICKER", "InstrumentList": [{"ExchangeSegment": "NSE_EQ", "SecurityId": "1333"}]}
//! {"ResponseCode": "TICKER", "ExchangeSegment": "NSE_EQ", "SecurityId": "1333", "LTP": 1650.2, "LTT": 1717400000}
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::common::{
    TokenAuthenticator, epoch_seconds, optional_price, optional_quantity, quantity, required,
};
use crate::application::ports::{
    BrokerSession, CredentialField, MessageNormalizer, NativeSubscription, ParseError,
    SubscriptionEncoder,
};
use crate::application::services::{
    BrokerProfile, PluginCatalog, PluginRegistration, StandardAdapterFactory,
};
use crate::domain::capability::CapabilityRegistry;
use crate::domain::mapping::{BrokerMappings, MappingTable};
use crate::domain::plugin::BrokerId;
use crate::domain::streaming::{CanonicalEvent, DepthLevel, DepthPayload, EventPayload, QuotePayload};
use crate::domain::vocabulary::FeedType;

/// Plugin identifier.
pub const BROKER: &str = "dhan_sandbox";

const STREAM_URL: &str = "wss://api-feed.dhan.co";
const CONTROL_CODES: [&str; 3] = ["HEARTBEAT", "ACK", "PONG"];

/// Register the Dhan sandbox plugin.
pub fn register(catalog: &mut PluginCatalog) {
    let Some(id) = BrokerId::parse(BROKER) else {
        return;
    };

    let profile = BrokerProfile {
        broker: id.clone(),
        mappings: mappings(),
        capabilities: capabilities(),
        normalizer: Arc::new(DhanNormalizer),
        encoder: Arc::new(DhanEncoder),
    };

    catalog.register(
        PluginRegistration::new(id.clone())
            .with_authenticator(Arc::new(TokenAuthenticator::new(
                id,
                &[CredentialField::ClientId],
            )))
            .with_adapter_factory(Arc::new(StandardAdapterFactory::new(profile, stream_url))),
    );
}

fn stream_url(session: &BrokerSession) -> String {
    format!(
        "{STREAM_URL}?version=2&token={}&clientId={}&authType=2",
        session.access_token,
        session.client_id.as_deref().unwrap_or_default()
    )
}

/// Dhan code tables.
#[must_use]
pub fn mappings() -> BrokerMappings {
    BrokerMappings {
        exchange: MappingTable::builder()
            .pair("NSE", "NSE_EQ")
            .pair("BSE", "BSE_EQ")
            .pair("NFO", "NSE_FNO")
            .pair("BFO", "BSE_FNO")
            .pair("CDS", "NSE_CURRENCY")
            .pair("BCD", "BSE_CURRENCY")
            .pair("MCX", "MCX_COMM")
            .pair("NSE_INDEX", "IDX_I")
            .alias("BSE_INDEX", "IDX_I")
            .build(),
        feed: MappingTable::from_pairs(&[("LTP", "TICKER"), ("QUOTE", "QUOTE"), ("DEPTH", "FULL")]),
        ..BrokerMappings::default()
    }
}

/// Dhan capabilities. Twenty-level depth is offered on NSE segments only.
#[must_use]
pub fn capabilities() -> CapabilityRegistry {
    CapabilityRegistry::builder(BROKER)
        .feeds([FeedType::Ltp, FeedType::Quote, FeedType::Depth])
        .feed(FeedType::OrderUpdate, false)
        .exchanges([
            "NSE",
            "BSE",
            "NFO",
            "BFO",
            "CDS",
            "BCD",
            "MCX",
            "NSE_INDEX",
            "BSE_INDEX",
        ])
        .depth_levels(5)
        .depth_levels_for("NSE", 20)
        .depth_levels_for("NFO", 20)
        .build()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DhanFrame {
    response_code: String,
    exchange_segment: Option<String>,
    security_id: Option<String>,
    #[serde(rename = "LTP")]
    ltp: Option<Decimal>,
    #[serde(rename = "LTT")]
    ltt: Option<i64>,
    best_bid: Option<Decimal>,
    best_ask: Option<Decimal>,
    bid_qty: Option<Decimal>,
    ask_qty: Option<Decimal>,
    volume: Option<Decimal>,
    depth: Option<DhanDepth>,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DhanDepth {
    #[serde(default)]
    bids: Vec<DhanLevel>,
    #[serde(default)]
    asks: Vec<DhanLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DhanLevel {
    price: Decimal,
    quantity: Decimal,
    orders: Option<u32>,
}

fn levels(raw: &[DhanLevel], field: &'static str) -> Result<Vec<DepthLevel>, ParseError> {
    raw.iter()
        .map(|level| {
            Ok(DepthLevel {
                price: level.price,
                quantity: quantity(level.quantity, field)?,
                orders: level.orders,
            })
        })
        .collect()
}

/// Parses Dhan JSON feed frames.
#[derive(Debug, Default)]
pub struct DhanNormalizer;

impl MessageNormalizer for DhanNormalizer {
    fn normalize(
        &self,
        raw: &str,
        mappings: &BrokerMappings,
    ) -> Result<Option<CanonicalEvent>, ParseError> {
        let frame: DhanFrame = serde_json::from_str(raw)?;
        let code = frame.response_code.to_ascii_uppercase();

        if CONTROL_CODES.contains(&code.as_str()) {
            return Ok(None);
        }
        if code == "DISCONNECT" {
            return Err(ParseError::InvalidField {
                field: "ResponseCode",
                reason: format!(
                    "feed disconnected: {}",
                    frame.reason.as_deref().unwrap_or("no reason given")
                ),
            });
        }

        let feed_type = FeedType::from_code(mappings.feed.to_canonical(&code))
            .ok_or_else(|| ParseError::UnknownFeed(frame.response_code.clone()))?;
        let exchange = mappings
            .exchange
            .to_canonical(required(frame.exchange_segment.as_deref(), "ExchangeSegment")?)
            .to_string();
        let symbol = required(frame.security_id.clone(), "SecurityId")?;
        let ltp = required(frame.ltp, "LTP")?;

        let payload = match feed_type {
            FeedType::Ltp => EventPayload::Ltp { ltp },
            FeedType::Quote => EventPayload::Quote(QuotePayload {
                ltp,
                bid: optional_price(frame.best_bid),
                ask: optional_price(frame.best_ask),
                bid_qty: optional_quantity(frame.bid_qty, "BidQty")?,
                ask_qty: optional_quantity(frame.ask_qty, "AskQty")?,
                volume: optional_quantity(frame.volume, "Volume")?,
            }),
            FeedType::Depth => {
                let depth = frame.depth.unwrap_or_default();
                EventPayload::Depth(DepthPayload {
                    bids: levels(&depth.bids, "Depth.Bids")?,
                    asks: levels(&depth.asks, "Depth.Asks")?,
                })
            }
            FeedType::OrderUpdate => return Err(ParseError::UnknownFeed(frame.response_code)),
        };

        Ok(Some(CanonicalEvent {
            exchange,
            symbol,
            feed_type,
            payload,
            timestamp: epoch_seconds(frame.ltt, "LTT")?,
        }))
    }
}

/// Builds Dhan subscription frames.
#[derive(Debug, Default)]
pub struct DhanEncoder;

impl DhanEncoder {
    fn frame(code: &str, request: &NativeSubscription) -> String {
        let mut frame = json!({
            "RequestCode": code,
            "Feed": request.feed_code,
            "InstrumentList": [{
                "ExchangeSegment": request.exchange,
                "SecurityId": request.symbol,
            }],
        });
        if request.depth_levels > 0 {
            frame["Depth"] = json!(request.depth_levels);
        }
        frame.to_string()
    }
}

impl SubscriptionEncoder for DhanEncoder {
    fn subscribe_frame(&self, request: &NativeSubscription) -> String {
        Self::frame("SUBSCRIBE", request)
    }

    fn unsubscribe_frame(&self, request: &NativeSubscription) -> String {
        Self::frame("UNSUBSCRIBE", request)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::Value;

    use super::*;

    #[test]
    fn index_segment_reverses_to_nse_index() {
        let mappings = mappings();
        assert_eq!(mappings.exchange.to_native("BSE_INDEX"), "IDX_I");
        assert_eq!(mappings.exchange.to_canonical("IDX_I"), "NSE_INDEX");
        assert_eq!(mappings.exchange.to_canonical("mcx_comm"), "MCX");
    }

    #[test]
    fn depth_levels_vary_by_exchange() {
        let caps = capabilities();
        assert_eq!(caps.max_depth_levels("NSE"), 20);
        assert_eq!(caps.max_depth_levels("nfo"), 20);
        assert_eq!(caps.max_depth_levels("BSE"), 5);
        assert!(!caps.supports_feed(FeedType::OrderUpdate));
    }

    #[test]
    fn stream_url_carries_token_and_client() {
        let session = BrokerSession::new(
            BrokerId::parse(BROKER).unwrap(),
            "tok123",
            Some("1100001".to_string()),
        );
        assert_eq!(
            stream_url(&session),
            "wss://api-feed.dhan.co?version=2&token=tok123&clientId=1100001&authType=2"
        );
    }

    #[test]
    fn normalizes_ticker() {
        let raw = r#"{"ResponseCode":"TICKER","ExchangeSegment":"NSE_EQ","SecurityId":"1333","LTP":1650.2,"LTT":1717400000}"#;
        let event = DhanNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        assert_eq!(event.exchange, "NSE");
        assert_eq!(event.symbol, "1333");
        assert_eq!(event.feed_type, FeedType::Ltp);
        assert_eq!(event.last_price(), Some(Decimal::from_str("1650.2").unwrap()));
    }

    #[test]
    fn normalizes_full_depth() {
        let raw = r#"{"ResponseCode":"FULL","ExchangeSegment":"NSE_FNO","SecurityId":"35012","LTP":"101.5",
            "Depth":{"Bids":[{"Price":"101.45","Quantity":300,"Orders":4}],"Asks":[{"Price":"101.55","Quantity":150}]}}"#;
        let event = DhanNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        assert_eq!(event.exchange, "NFO");
        let EventPayload::Depth(depth) = event.payload else {
            panic!("expected depth");
        };
        assert_eq!(depth.bids[0].orders, Some(4));
        assert_eq!(depth.asks[0].quantity, 150);
    }

    #[test]
    fn heartbeat_is_control() {
        let raw = r#"{"ResponseCode":"HEARTBEAT"}"#;
        assert_eq!(DhanNormalizer.normalize(raw, &mappings()).unwrap(), None);
    }

    #[test]
    fn disconnect_is_reported() {
        let raw = r#"{"ResponseCode":"DISCONNECT","Reason":"token expired"}"#;
        let err = DhanNormalizer.normalize(raw, &mappings()).unwrap_err();
        assert!(err.to_string().contains("token expired"));
    }

    #[test]
    fn missing_security_id_names_the_field() {
        let raw = r#"{"ResponseCode":"TICKER","ExchangeSegment":"NSE_EQ","LTP":1}"#;
        assert_eq!(
            DhanNormalizer.normalize(raw, &mappings()).unwrap_err(),
            ParseError::MissingField("SecurityId")
        );
    }

    #[test]
    fn encodes_depth_subscription() {
        let caps = capabilities();
        let request = NativeSubscription::from_canonical(
            &mappings(),
            "NSE",
            "1333",
            FeedType::Depth,
            caps.max_depth_levels("NSE"),
        );
        let frame: Value = serde_json::from_str(&DhanEncoder.subscribe_frame(&request)).unwrap();

        assert_eq!(frame["RequestCode"], "SUBSCRIBE");
        assert_eq!(frame["Feed"], "FULL");
        assert_eq!(frame["InstrumentList"][0]["ExchangeSegment"], "NSE_EQ");
        assert_eq!(frame["Depth"], 20);
    }
}
