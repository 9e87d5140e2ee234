//! Kotak Neo
//!
//! Kotak's HSM socket speaks JSON frames tagged by `type`. Market data
//! frames carry the segment (`e`) and instrument token (`tk`); order
//! updates arrive on the same socket under `om`.
//!
//! # Wire Format (JSON)
//! ```json
//! {"type": "sub", "feed": "ltp", "scrips": "nse_cm|11536"}
//! {"type": "ltp", "e": "nse_cm", "tk": "11536", "ltp": "3512.45", "ft": 1717400000}
//! {"type": "hb"}
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use super::common::{
    TokenAuthenticator, epoch_seconds, optional_code, optional_price, optional_quantity, quantity,
    required,
};
use crate::application::ports::{
    BrokerSession, CredentialField, MarginCalculator, MarginError, MessageNormalizer,
    NativeSubscription, ParseError, SubscriptionEncoder,
};
use crate::application::services::{
    BrokerProfile, PluginCatalog, PluginRegistration, StandardAdapterFactory,
};
use crate::domain::capability::CapabilityRegistry;
use crate::domain::mapping::{BrokerMappings, MappingTable};
use crate::domain::margin::{MarginPosition, MarginSummary, TradeAction};
use crate::domain::plugin::BrokerId;
use crate::domain::streaming::{
    CanonicalEvent, DepthLevel, DepthPayload, EventPayload, OrderUpdatePayload, QuotePayload,
};
use crate::domain::vocabulary::{FeedType, Operation};

/// Plugin identifier.
pub const BROKER: &str = "kotak";

const STREAM_URL: &str = "wss://mlhsm.kotaksecurities.com";
const CONTROL_TYPES: [&str; 3] = ["hb", "cn", "ack"];
const DEPTH_LEVELS: u8 = 5;

/// Register the Kotak plugin.
pub fn register(catalog: &mut PluginCatalog) {
    let Some(id) = BrokerId::parse(BROKER) else {
        return;
    };

    let mappings = mappings();
    let profile = BrokerProfile {
        broker: id.clone(),
        mappings: mappings.clone(),
        capabilities: capabilities(),
        normalizer: Arc::new(KotakNormalizer),
        encoder: Arc::new(KotakEncoder),
    };

    catalog.register(
        PluginRegistration::new(id.clone())
            .with_authenticator(Arc::new(TokenAuthenticator::new(
                id,
                &[CredentialField::ApiKey, CredentialField::ClientId],
            )))
            .with_adapter_factory(Arc::new(StandardAdapterFactory::new(profile, stream_url)))
            .with_margin_calculator(Arc::new(KotakMarginCalculator::new(mappings))),
    );
}

fn stream_url(_session: &BrokerSession) -> String {
    STREAM_URL.to_string()
}

// =============================================================================
// Vocabulary
// =============================================================================

/// Kotak code tables.
#[must_use]
pub fn mappings() -> BrokerMappings {
    BrokerMappings {
        exchange: MappingTable::builder()
            .pair("NSE", "nse_cm")
            .pair("BSE", "bse_cm")
            .pair("NFO", "nse_fo")
            .pair("BFO", "bse_fo")
            .pair("CDS", "cde_fo")
            .pair("BCD", "bcs-fo")
            .pair("MCX", "mcx_fo")
            .alias("NSE_INDEX", "nse_cm")
            .alias("BSE_INDEX", "bse_cm")
            .build(),
        product: MappingTable::builder()
            .pair("NRML", "NRML")
            .pair("CNC", "CNC")
            .pair("MIS", "MIS")
            .pair("INTRADAY", "INTRADAY")
            .pair("CO", "CO")
            .pair("BO", "Bracket Order")
            .alias("Normal", "NRML")
            .alias("Cash and Carry", "CNC")
            .alias("Cover Order", "CO")
            .alias("Bracket Order", "Bracket Order")
            .build(),
        order_type: MappingTable::builder()
            .pair("LIMIT", "L")
            .pair("MARKET", "MKT")
            .pair("SL", "SL")
            .pair("SL-M", "SL-M")
            .pair("SPREAD", "SP")
            .pair("TWO_LEG", "2L")
            .pair("THREE_LEG", "3L")
            .alias("L", "L")
            .alias("MKT", "MKT")
            .alias("Stop loss limit", "SL")
            .alias("Stop loss market", "SL-M")
            .alias("SP", "SP")
            .alias("Two Leg", "2L")
            .alias("Three leg", "3L")
            .build(),
        feed: MappingTable::from_pairs(&[
            ("LTP", "ltp"),
            ("QUOTE", "mws"),
            ("DEPTH", "dps"),
            ("ORDER_UPDATE", "om"),
        ]),
    }
}

/// Kotak capabilities.
#[must_use]
pub fn capabilities() -> CapabilityRegistry {
    CapabilityRegistry::builder(BROKER)
        .feeds(FeedType::ALL)
        .operation(Operation::MarginCalculator)
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
        .depth_levels(DEPTH_LEVELS)
        .build()
}

// =============================================================================
// Streaming
// =============================================================================

#[derive(Debug, Deserialize)]
struct KotakFrame {
    #[serde(rename = "type")]
    kind: String,
    e: Option<String>,
    tk: Option<String>,
    ltp: Option<Decimal>,
    bp: Option<Decimal>,
    sp: Option<Decimal>,
    bq: Option<Decimal>,
    sq: Option<Decimal>,
    v: Option<Decimal>,
    ft: Option<i64>,
    #[serde(default)]
    bids: Vec<KotakLevel>,
    #[serde(default)]
    asks: Vec<KotakLevel>,
    #[serde(rename = "nOrdNo")]
    order_no: Option<String>,
    #[serde(rename = "ordSt")]
    order_status: Option<String>,
    prod: Option<String>,
    #[serde(rename = "prcTp")]
    price_type: Option<String>,
    #[serde(rename = "fldQty")]
    filled_qty: Option<Decimal>,
    #[serde(rename = "avgPrc")]
    average_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct KotakLevel {
    p: Decimal,
    q: Decimal,
    no: Option<u32>,
}

fn levels(raw: &[KotakLevel], field: &'static str) -> Result<Vec<DepthLevel>, ParseError> {
    raw.iter()
        .map(|level| {
            Ok(DepthLevel {
                price: level.p,
                quantity: quantity(level.q, field)?,
                orders: level.no,
            })
        })
        .collect()
}

/// Parses Kotak HSM frames.
#[derive(Debug, Default)]
pub struct KotakNormalizer;

impl MessageNormalizer for KotakNormalizer {
    fn normalize(
        &self,
        raw: &str,
        mappings: &BrokerMappings,
    ) -> Result<Option<CanonicalEvent>, ParseError> {
        let frame: KotakFrame = serde_json::from_str(raw)?;
        if CONTROL_TYPES
            .iter()
            .any(|control| frame.kind.trim().eq_ignore_ascii_case(control))
        {
            return Ok(None);
        }

        let feed_type = FeedType::from_code(mappings.feed.to_canonical(&frame.kind))
            .ok_or_else(|| ParseError::UnknownFeed(frame.kind.clone()))?;
        let exchange = mappings
            .exchange
            .to_canonical(required(frame.e.as_deref(), "e")?)
            .to_string();
        let symbol = required(frame.tk.clone(), "tk")?;

        let payload = match feed_type {
            FeedType::Ltp => EventPayload::Ltp {
                ltp: required(frame.ltp, "ltp")?,
            },
            FeedType::Quote => EventPayload::Quote(QuotePayload {
                ltp: required(frame.ltp, "ltp")?,
                bid: optional_price(frame.bp),
                ask: optional_price(frame.sp),
                bid_qty: optional_quantity(frame.bq, "bq")?,
                ask_qty: optional_quantity(frame.sq, "sq")?,
                volume: optional_quantity(frame.v, "v")?,
            }),
            FeedType::Depth => EventPayload::Depth(
                DepthPayload {
                    bids: levels(&frame.bids, "bids")?,
                    asks: levels(&frame.asks, "asks")?,
                }
                .truncated(usize::from(DEPTH_LEVELS)),
            ),
            FeedType::OrderUpdate => EventPayload::OrderUpdate(OrderUpdatePayload {
                order_id: required(frame.order_no.clone(), "nOrdNo")?,
                status: required(frame.order_status.as_deref(), "ordSt")?.to_lowercase(),
                product: optional_code(frame.prod.as_deref())
                    .map(|code| mappings.product.to_canonical(code).to_string()),
                order_type: optional_code(frame.price_type.as_deref())
                    .map(|code| mappings.order_type.to_canonical(code).to_string()),
                filled_qty: optional_quantity(frame.filled_qty, "fldQty")?,
                average_price: optional_price(frame.average_price),
            }),
        };

        Ok(Some(CanonicalEvent {
            exchange,
            symbol,
            feed_type,
            payload,
            timestamp: epoch_seconds(frame.ft, "ft")?,
        }))
    }
}

/// Builds Kotak subscription frames.
#[derive(Debug, Default)]
pub struct KotakEncoder;

impl KotakEncoder {
    fn frame(kind: &str, request: &NativeSubscription) -> String {
        let mut frame = json!({
            "type": kind,
            "feed": request.feed_code,
            "scrips": format!("{}|{}", request.exchange, request.symbol),
        });
        if request.depth_levels > 0 {
            frame["depth"] = json!(request.depth_levels);
        }
        frame.to_string()
    }
}

impl SubscriptionEncoder for KotakEncoder {
    fn subscribe_frame(&self, request: &NativeSubscription) -> String {
        Self::frame("sub", request)
    }

    fn unsubscribe_frame(&self, request: &NativeSubscription) -> String {
        Self::frame("unsub", request)
    }
}

// =============================================================================
// Margin
// =============================================================================

#[derive(Debug, Deserialize)]
struct KotakMarginResponse {
    stat: Option<String>,
    #[serde(rename = "errMsg")]
    err_msg: Option<String>,
    data: Option<KotakMarginData>,
}

#[derive(Debug, Deserialize)]
struct KotakMarginData {
    #[serde(rename = "totMrgnUsd")]
    total_margin: Option<Decimal>,
    #[serde(rename = "spanMrgn")]
    span_margin: Option<Decimal>,
    #[serde(rename = "expoMrgn")]
    exposure_margin: Option<Decimal>,
    #[serde(rename = "avlCash")]
    available_cash: Option<Decimal>,
}

/// Kotak margin API translation.
#[derive(Debug, Clone)]
pub struct KotakMarginCalculator {
    mappings: BrokerMappings,
}

impl KotakMarginCalculator {
    /// Create a calculator over Kotak's code tables.
    #[must_use]
    pub const fn new(mappings: BrokerMappings) -> Self {
        Self { mappings }
    }
}

impl MarginCalculator for KotakMarginCalculator {
    fn transform_positions(&self, positions: &[MarginPosition]) -> Result<Value, MarginError> {
        if positions.is_empty() {
            return Err(MarginError::EmptyBasket);
        }

        let orders: Vec<Value> = positions
            .iter()
            .map(|position| {
                json!({
                    "exSeg": self.mappings.exchange.to_native(&position.exchange),
                    "prod": self.mappings.product.to_native(&position.product),
                    "prcTp": self.mappings.order_type.to_native(&position.order_type),
                    "prc": position.price.to_string(),
                    "trgPrc": position.trigger_price.unwrap_or_default().to_string(),
                    "qty": position.quantity.to_string(),
                    "tok": position.symbol,
                    "trnsTp": match position.action {
                        TradeAction::Buy => "B",
                        TradeAction::Sell => "S",
                    },
                })
            })
            .collect();

        Ok(json!({ "orders": orders }))
    }

    fn parse_response(&self, response: &Value) -> Result<MarginSummary, MarginError> {
        let response: KotakMarginResponse = serde_json::from_value(response.clone())
            .map_err(|e| MarginError::InvalidResponse(e.to_string()))?;

        let stat = response.stat.as_deref().unwrap_or_default();
        if !stat.eq_ignore_ascii_case("ok") {
            return Err(MarginError::Rejected(
                response.err_msg.unwrap_or_else(|| format!("stat={stat}")),
            ));
        }

        let data = response
            .data
            .ok_or_else(|| MarginError::InvalidResponse("missing data".to_string()))?;
        let total_margin = data
            .total_margin
            .ok_or_else(|| MarginError::InvalidResponse("missing totMrgnUsd".to_string()))?;

        Ok(MarginSummary {
            total_margin,
            span_margin: data.span_margin,
            exposure_margin: data.exposure_margin,
            available_cash: data.available_cash,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::*;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    #[test_case("NSE", "nse_cm")]
    #[test_case("nfo", "nse_fo")]
    #[test_case("BCD", "bcs-fo")]
    #[test_case("NSE_INDEX", "nse_cm")]
    #[test_case("BSE_INDEX", "bse_cm")]
    #[test_case("NCO", "NCO" ; "unknown passes through")]
    fn exchange_to_native(canonical: &str, native: &str) {
        assert_eq!(mappings().exchange.to_native(canonical), native);
    }

    #[test]
    fn shared_segments_reverse_to_cash_exchange() {
        let mappings = mappings();
        assert_eq!(mappings.exchange.to_canonical("nse_cm"), "NSE");
        assert_eq!(mappings.exchange.to_canonical("bse_cm"), "BSE");
    }

    #[test_case("Normal", "NRML")]
    #[test_case("Cash and Carry", "CNC")]
    #[test_case("bo", "Bracket Order")]
    #[test_case("Cover Order", "CO")]
    fn product_aliases(canonical: &str, native: &str) {
        assert_eq!(mappings().product.to_native(canonical), native);
    }

    #[test]
    fn order_types_round_trip() {
        let table = mappings().order_type;
        for canonical in ["LIMIT", "MARKET", "SL", "SL-M", "SPREAD", "TWO_LEG", "THREE_LEG"] {
            assert_eq!(table.to_canonical(table.to_native(canonical)), canonical);
        }
        assert_eq!(table.to_native("Stop loss market"), "SL-M");
    }

    #[test]
    fn capabilities_declare_margin_and_depth() {
        let caps = capabilities();
        assert!(caps.supports_operation(Operation::MarginCalculator));
        assert_eq!(caps.max_depth_levels("NSE"), 5);
        assert!(caps.supports_exchange("nse_index"));
        assert!(!caps.supports_exchange("NYSE"));
    }

    #[test]
    fn normalizes_ltp() {
        let raw = r#"{"type":"ltp","e":"nse_cm","tk":"11536","ltp":"3512.45","ft":1717400000}"#;
        let event = KotakNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        assert_eq!(event.exchange, "NSE");
        assert_eq!(event.symbol, "11536");
        assert_eq!(event.feed_type, FeedType::Ltp);
        assert_eq!(event.last_price(), Some(dec("3512.45")));
        assert_eq!(event.timestamp.timestamp(), 1_717_400_000);
    }

    #[test]
    fn normalizes_quote_with_numeric_fields() {
        let raw = r#"{"type":"mws","e":"nse_fo","tk":"35012","ltp":101.5,"bp":101.45,"sp":101.55,"bq":"300","sq":150,"v":"125000"}"#;
        let event = KotakNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        assert_eq!(event.exchange, "NFO");
        let EventPayload::Quote(quote) = event.payload else {
            panic!("expected quote");
        };
        assert_eq!(quote.bid, Some(dec("101.45")));
        assert_eq!(quote.ask_qty, Some(150));
        assert_eq!(quote.volume, Some(125_000));
    }

    #[test]
    fn depth_is_capped_at_five_levels() {
        let bids: Vec<Value> = (0..7)
            .map(|i| json!({"p": format!("{}.00", 100 - i), "q": 10, "no": 1}))
            .collect();
        let raw = json!({"type": "dps", "e": "bse_cm", "tk": "500325", "bids": bids, "asks": []});
        let event = KotakNormalizer
            .normalize(&raw.to_string(), &mappings())
            .unwrap()
            .unwrap();

        let EventPayload::Depth(depth) = event.payload else {
            panic!("expected depth");
        };
        assert_eq!(depth.bids.len(), 5);
        assert_eq!(depth.bids[0].price, dec("100.00"));
        assert_eq!(event.exchange, "BSE");
    }

    #[test]
    fn normalizes_order_update_vocabulary() {
        let raw = r#"{"type":"om","e":"nse_cm","tk":"11536","nOrdNo":"240603000012345","ordSt":"COMPLETE","prod":"Bracket Order","prcTp":"L","fldQty":"10","avgPrc":"3510.10"}"#;
        let event = KotakNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        let EventPayload::OrderUpdate(update) = event.payload else {
            panic!("expected order update");
        };
        assert_eq!(update.status, "complete");
        assert_eq!(update.product.as_deref(), Some("BO"));
        assert_eq!(update.order_type.as_deref(), Some("LIMIT"));
        assert_eq!(update.filled_qty, Some(10));
    }

    #[test]
    fn quote_without_volume_leaves_it_unset() {
        let raw = r#"{"type":"mws","e":"nse_cm","tk":"11536","ltp":"3512.45","bq":"0"}"#;
        let event = KotakNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        let EventPayload::Quote(quote) = event.payload else {
            panic!("expected quote");
        };
        assert_eq!(quote.volume, None);
        assert_eq!(quote.ask_qty, None);
        assert_eq!(quote.bid_qty, Some(0));
    }

    #[test]
    fn order_update_without_product_or_fill() {
        let raw = r#"{"type":"om","e":"nse_cm","tk":"11536","nOrdNo":"1","ordSt":"open","prod":"","prcTp":"MKT"}"#;
        let event = KotakNormalizer.normalize(raw, &mappings()).unwrap().unwrap();

        let EventPayload::OrderUpdate(update) = event.payload else {
            panic!("expected order update");
        };
        assert_eq!(update.product, None);
        assert_eq!(update.order_type.as_deref(), Some("MARKET"));
        assert_eq!(update.filled_qty, None);
    }

    #[test_case(r#"{"type":"hb"}"# ; "heartbeat")]
    #[test_case(r#"{"type":"HB"}"# ; "uppercase heartbeat")]
    #[test_case(r#"{"type":"Ack","feed":"dps"}"# ; "mixed case ack")]
    #[test_case(r#"{"type":"cn","msg":"connected"}"# ; "connected")]
    #[test_case(r#"{"type":"ack","feed":"ltp"}"# ; "ack")]
    fn control_frames_are_not_events(raw: &str) {
        assert_eq!(KotakNormalizer.normalize(raw, &mappings()).unwrap(), None);
    }

    #[test]
    fn missing_price_names_the_field() {
        let raw = r#"{"type":"ltp","e":"nse_cm","tk":"11536"}"#;
        assert_eq!(
            KotakNormalizer.normalize(raw, &mappings()).unwrap_err(),
            ParseError::MissingField("ltp")
        );
    }

    #[test]
    fn unknown_type_is_unknown_feed() {
        let raw = r#"{"type":"news","e":"nse_cm","tk":"1"}"#;
        assert_eq!(
            KotakNormalizer.normalize(raw, &mappings()).unwrap_err(),
            ParseError::UnknownFeed("news".to_string())
        );
    }

    #[test]
    fn encodes_subscription_frames() {
        let request = NativeSubscription::from_canonical(&mappings(), "NSE", "11536", FeedType::Depth, 5);
        let frame: Value = serde_json::from_str(&KotakEncoder.subscribe_frame(&request)).unwrap();
        assert_eq!(frame, json!({"type": "sub", "feed": "dps", "scrips": "nse_cm|11536", "depth": 5}));

        let request = NativeSubscription::from_canonical(&mappings(), "NSE", "11536", FeedType::Ltp, 5);
        let frame: Value = serde_json::from_str(&KotakEncoder.unsubscribe_frame(&request)).unwrap();
        assert_eq!(frame, json!({"type": "unsub", "feed": "ltp", "scrips": "nse_cm|11536"}));
    }

    fn position(action: TradeAction) -> MarginPosition {
        MarginPosition {
            symbol: "35012".to_string(),
            exchange: "NFO".to_string(),
            product: "NRML".to_string(),
            order_type: "LIMIT".to_string(),
            action,
            quantity: 50,
            price: dec("101.5"),
            trigger_price: None,
        }
    }

    #[test]
    fn margin_request_uses_native_codes() {
        let calculator = KotakMarginCalculator::new(mappings());
        let request = calculator
            .transform_positions(&[position(TradeAction::Sell)])
            .unwrap();

        let order = &request["orders"][0];
        assert_eq!(order["exSeg"], "nse_fo");
        assert_eq!(order["prcTp"], "L");
        assert_eq!(order["trnsTp"], "S");
        assert_eq!(order["qty"], "50");
    }

    #[test]
    fn margin_rejects_empty_basket() {
        let calculator = KotakMarginCalculator::new(mappings());
        assert_eq!(calculator.transform_positions(&[]).unwrap_err(), MarginError::EmptyBasket);
    }

    #[test]
    fn margin_response_parses_totals() {
        let calculator = KotakMarginCalculator::new(mappings());
        let summary = calculator
            .parse_response(&json!({
                "stat": "Ok",
                "data": {"totMrgnUsd": "61250.75", "spanMrgn": "45000", "avlCash": "50000"}
            }))
            .unwrap();

        assert_eq!(summary.total_margin, dec("61250.75"));
        assert_eq!(summary.span_margin, Some(dec("45000")));
        assert_eq!(summary.shortfall(), Some(dec("11250.75")));
    }

    #[test]
    fn margin_error_status_is_rejected() {
        let calculator = KotakMarginCalculator::new(mappings());
        let err = calculator
            .parse_response(&json!({"stat": "Not_Ok", "errMsg": "Invalid token"}))
            .unwrap_err();
        assert_eq!(err, MarginError::Rejected("Invalid token".to_string()));
    }

    #[test]
    fn margin_response_without_total_is_invalid() {
        let calculator = KotakMarginCalculator::new(mappings());
        let err = calculator
            .parse_response(&json!({"stat": "Ok", "data": {}}))
            .unwrap_err();
        assert!(matches!(err, MarginError::InvalidResponse(_)));
    }
}
