//! Wisdom Capital (XTS)
//!
//! XTS market data over its JSON broadcast socket. Wisdom streams LTP
//! only and offers no margin calculator; the touchline code is mapped so
//! stray quote frames still normalize, but quote subscriptions are
//! rejected by capability.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use super::common::{TokenAuthenticator, epoch_seconds, optional_price, optional_quantity, required};
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
use crate::domain::streaming::{CanonicalEvent, EventPayload, QuotePayload};
use crate::domain::vocabulary::FeedType;

/// Plugin identifier.
pub const BROKER: &str = "wisdom";

const STREAM_URL: &str = "wss://trade.wisdomcapital.in/apimarketdata/socket.io/";

/// Register the Wisdom plugin. No margin calculator is registered.
pub fn register(catalog: &mut PluginCatalog) {
    let Some(id) = BrokerId::parse(BROKER) else {
        return;
    };

    let profile = BrokerProfile {
        broker: id.clone(),
        mappings: mappings(),
        capabilities: capabilities(),
        normalizer: Arc::new(XtsNormalizer),
        encoder: Arc::new(XtsEncoder),
    };

    catalog.register(
        PluginRegistration::new(id.clone())
            .with_authenticator(Arc::new(TokenAuthenticator::new(
                id,
                &[CredentialField::ApiKey, CredentialField::ApiSecret, CredentialField::ClientId],
            )))
            .with_adapter_factory(Arc::new(StandardAdapterFactory::new(profile, stream_url))),
    );
}

fn stream_url(session: &BrokerSession) -> String {
    format!(
        "{STREAM_URL}?token={}&userID={}&publishFormat=JSON&broadcastMode=Full&transport=websocket",
        session.access_token,
        session.client_id.as_deref().unwrap_or_default()
    )
}

/// XTS code tables.
#[must_use]
pub fn mappings() -> BrokerMappings {
    BrokerMappings {
        exchange: MappingTable::from_pairs(&[
            ("NSE", "NSECM"),
            ("BSE", "BSECM"),
            ("NFO", "NSEFO"),
            ("BFO", "BSEFO"),
            ("CDS", "NSECD"),
            ("MCX", "MCXFO"),
        ]),
        feed: MappingTable::from_pairs(&[("LTP", "1512"), ("QUOTE", "1501")]),
        ..BrokerMappings::default()
    }
}

/// Wisdom capabilities.
#[must_use]
pub fn capabilities() -> CapabilityRegistry {
    CapabilityRegistry::builder(BROKER)
        .feed(FeedType::Ltp, true)
        .feed(FeedType::Quote, false)
        .feed(FeedType::Depth, false)
        .exchanges(["NSE", "BSE", "NFO", "BFO", "CDS", "MCX"])
        .build()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XtsFrame {
    message_code: Option<Value>,
    exchange_segment: Option<String>,
    #[serde(rename = "ExchangeInstrumentID")]
    instrument_id: Option<Value>,
    last_traded_price: Option<Decimal>,
    last_update_time: Option<i64>,
    touchline: Option<XtsTouchline>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XtsTouchline {
    last_traded_price: Decimal,
    bid_info: Option<XtsBook>,
    ask_info: Option<XtsBook>,
    total_traded_quantity: Option<Decimal>,
    last_update_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XtsBook {
    price: Option<Decimal>,
    size: Option<Decimal>,
}

/// Numbers and strings both appear for codes and ids.
fn code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses XTS broadcast frames.
#[derive(Debug, Default)]
pub struct XtsNormalizer;

impl MessageNormalizer for XtsNormalizer {
    fn normalize(
        &self,
        raw: &str,
        mappings: &BrokerMappings,
    ) -> Result<Option<CanonicalEvent>, ParseError> {
        let frame: XtsFrame = serde_json::from_str(raw)?;
        let Some(message_code) = frame.message_code.as_ref().and_then(code) else {
            return Ok(None);
        };

        let feed_type = FeedType::from_code(mappings.feed.to_canonical(&message_code))
            .ok_or_else(|| ParseError::UnknownFeed(message_code.clone()))?;
        let exchange = mappings
            .exchange
            .to_canonical(required(frame.exchange_segment.as_deref(), "ExchangeSegment")?)
            .to_string();
        let symbol = required(frame.instrument_id.as_ref().and_then(code), "ExchangeInstrumentID")?;

        let (payload, updated) = match feed_type {
            FeedType::Ltp => (
                EventPayload::Ltp {
                    ltp: required(frame.last_traded_price, "LastTradedPrice")?,
                },
                frame.last_update_time,
            ),
            FeedType::Quote => {
                let touchline = required(frame.touchline, "Touchline")?;
                let bid = touchline.bid_info.unwrap_or_default();
                let ask = touchline.ask_info.unwrap_or_default();
                (
                    EventPayload::Quote(QuotePayload {
                        ltp: touchline.last_traded_price,
                        bid: optional_price(bid.price),
                        ask: optional_price(ask.price),
                        bid_qty: optional_quantity(bid.size, "BidInfo.Size")?,
                        ask_qty: optional_quantity(ask.size, "AskInfo.Size")?,
                        volume: optional_quantity(touchline.total_traded_quantity, "TotalTradedQuantity")?,
                    }),
                    touchline.last_update_time,
                )
            }
            FeedType::Depth | FeedType::OrderUpdate => {
                return Err(ParseError::UnknownFeed(message_code));
            }
        };

        Ok(Some(CanonicalEvent {
            exchange,
            symbol,
            feed_type,
            payload,
            timestamp: epoch_seconds(updated, "LastUpdateTime")?,
        }))
    }
}

/// Builds XTS subscription frames.
#[derive(Debug, Default)]
pub struct XtsEncoder;

impl XtsEncoder {
    fn frame(action: &str, request: &NativeSubscription) -> String {
        let message_code = request
            .feed_code
            .parse::<u32>()
            .map_or_else(|_| json!(request.feed_code), |n| json!(n));
        json!({
            "action": action,
            "instruments": [{
                "exchangeSegment": request.exchange,
                "exchangeInstrumentID": request.symbol,
            }],
            "xtsMessageCode": message_code,
        })
        .to_string()
    }
}

impl SubscriptionEncoder for XtsEncoder {
    fn subscribe_frame(&self, request: &NativeSubscription) -> String {
        Self::frame("subscribe", request)
    }

    fn unsubscribe_frame(&self, request: &NativeSubscription) -> String {
        Self::frame("unsubscribe", request)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::domain::capability::CapabilityError;

    #[test]
    fn streams_ltp_only() {
        let caps = capabilities();
        assert!(caps.supports_feed(FeedType::Ltp));
        assert_eq!(
            caps.check_subscription("NSE", FeedType::Quote),
            Err(CapabilityError::FeedNotSupported {
                broker: BROKER.to_string(),
                feed: FeedType::Quote,
            })
        );
        assert_eq!(caps.max_depth_levels("NSE"), 0);
    }

    #[test]
    fn normalizes_ltp_with_numeric_codes() {
        let raw = r#"{"MessageCode":1512,"ExchangeSegment":"NSECM","ExchangeInstrumentID":2885,"LastTradedPrice":2950.35,"LastUpdateTime":1717400000}"#;
        let event = XtsNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        assert_eq!(event.exchange, "NSE");
        assert_eq!(event.symbol, "2885");
        assert_eq!(event.last_price(), Some(Decimal::from_str("2950.35").unwrap()));
    }

    #[test]
    fn normalizes_touchline() {
        let raw = r#"{"MessageCode":"1501","ExchangeSegment":"NSEFO","ExchangeInstrumentID":"35012",
            "Touchline":{"LastTradedPrice":101.5,"BidInfo":{"Price":101.45,"Size":300},"AskInfo":{"Price":0,"Size":0},"TotalTradedQuantity":125000}}"#;
        let event = XtsNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        let EventPayload::Quote(quote) = event.payload else {
            panic!("expected quote");
        };
        assert_eq!(quote.bid_qty, Some(300));
        assert_eq!(quote.ask, None);
        assert_eq!(quote.volume, Some(125_000));
    }

    #[test]
    fn frames_without_message_code_are_control() {
        assert_eq!(
            XtsNormalizer.normalize(r#"{"type":"success","result":"joined"}"#, &mappings()).unwrap(),
            None
        );
    }

    #[test]
    fn unknown_message_code_is_reported() {
        let raw = r#"{"MessageCode":1105,"ExchangeSegment":"NSECM","ExchangeInstrumentID":1}"#;
        assert_eq!(
            XtsNormalizer.normalize(raw, &mappings()).unwrap_err(),
            ParseError::UnknownFeed("1105".to_string())
        );
    }

    #[test]
    fn encodes_numeric_message_code() {
        let request = NativeSubscription::from_canonical(&mappings(), "NSE", "2885", FeedType::Ltp, 0);
        let frame: Value = serde_json::from_str(&XtsEncoder.subscribe_frame(&request)).unwrap();

        assert_eq!(frame["xtsMessageCode"], 1512);
        assert_eq!(frame["instruments"][0]["exchangeSegment"], "NSECM");
        assert_eq!(frame["action"], "subscribe");
    }
}
