//! Frame decoding for the venue's market channel.
//!
//! The venue pushes JSON frames keyed by `event_type` and `asset_id`,
//! singly or as arrays. Numbers arrive as strings. The decoder accepts
//! both full book snapshots and level deltas; anything unrecognized is
//! surfaced as `Unknown` so the caller can count it.

use crate::error::{WsError, WsResult};
use pulse_core::{PriceLevel, TradeSide};
use serde::Deserialize;
use serde_json::Value;

/// One side-tagged level change from a `price_change` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChange {
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
}

/// A decoded inbound event.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// Full book replace for one asset.
    BookSnapshot {
        asset_id: String,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ms: Option<i64>,
    },
    /// Level deltas for one asset (size 0 removes the level).
    PriceChange {
        asset_id: String,
        changes: Vec<LevelChange>,
        timestamp_ms: Option<i64>,
    },
    /// A trade print.
    Trade {
        asset_id: String,
        price: f64,
        size: f64,
        side: TradeSide,
        timestamp_ms: Option<i64>,
    },
    /// Server acknowledged or rejected a subscribe batch.
    SubscriptionAck { accepted: bool, detail: String },
    /// Heartbeat reply.
    Pong,
    /// Recognized JSON, unrecognized event type.
    Unknown { event_type: String },
}

impl WsEvent {
    /// Grouping key for batch dispatch.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BookSnapshot { .. } => "book",
            Self::PriceChange { .. } => "price_change",
            Self::Trade { .. } => "trade",
            Self::SubscriptionAck { .. } => "subscription",
            Self::Pong => "pong",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Asset id carried by market-data events.
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            Self::BookSnapshot { asset_id, .. }
            | Self::PriceChange { asset_id, .. }
            | Self::Trade { asset_id, .. } => Some(asset_id),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
    size: String,
}

impl RawLevel {
    fn to_level(&self) -> Option<PriceLevel> {
        Some(PriceLevel::new(
            self.price.parse().ok()?,
            self.size.parse().ok()?,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RawChange {
    price: String,
    size: String,
    side: String,
}

/// Decode one text frame into events.
///
/// The venue's PONG is a bare text frame; everything else is a JSON
/// object or an array of objects.
pub fn decode_frame(text: &str) -> WsResult<Vec<WsEvent>> {
    if text.eq_ignore_ascii_case("pong") {
        return Ok(vec![WsEvent::Pong]);
    }

    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) => items.into_iter().map(decode_value).collect(),
        obj @ Value::Object(_) => Ok(vec![decode_value(obj)?]),
        _ => Err(WsError::Protocol(format!(
            "unexpected frame shape: {}",
            text.chars().take(80).collect::<String>()
        ))),
    }
}

fn decode_value(value: Value) -> WsResult<WsEvent> {
    let event_type = value
        .get("event_type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let asset_id = value
        .get("asset_id")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let timestamp_ms = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .or_else(|| value.get("timestamp").and_then(|v| v.as_i64()));

    match event_type.as_str() {
        "book" => {
            let bids = parse_levels(value.get("bids"));
            let asks = parse_levels(value.get("asks"));
            Ok(WsEvent::BookSnapshot {
                asset_id,
                bids,
                asks,
                timestamp_ms,
            })
        }
        "price_change" => {
            let changes = value
                .get("changes")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|c| {
                            let raw: RawChange = serde_json::from_value(c.clone()).ok()?;
                            Some(LevelChange {
                                price: raw.price.parse().ok()?,
                                size: raw.size.parse().ok()?,
                                side: if raw.side.eq_ignore_ascii_case("sell") {
                                    TradeSide::Sell
                                } else {
                                    TradeSide::Buy
                                },
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(WsEvent::PriceChange {
                asset_id,
                changes,
                timestamp_ms,
            })
        }
        "last_trade_price" | "trade" => {
            let price = value
                .get("price")
                .and_then(parse_f64)
                .ok_or_else(|| WsError::Protocol("trade frame without price".to_string()))?;
            let size = value.get("size").and_then(parse_f64).unwrap_or(0.0);
            let side = match value.get("side").and_then(|v| v.as_str()) {
                Some(s) if s.eq_ignore_ascii_case("sell") => TradeSide::Sell,
                _ => TradeSide::Buy,
            };
            Ok(WsEvent::Trade {
                asset_id,
                price,
                size,
                side,
                timestamp_ms,
            })
        }
        "subscribed" => Ok(WsEvent::SubscriptionAck {
            accepted: true,
            detail: String::new(),
        }),
        "error" => Ok(WsEvent::SubscriptionAck {
            accepted: false,
            detail: value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        }),
        other => Ok(WsEvent::Unknown {
            event_type: other.to_string(),
        }),
    }
}

fn parse_levels(value: Option<&Value>) -> Vec<PriceLevel> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|l| {
                    let raw: RawLevel = serde_json::from_value(l.clone()).ok()?;
                    raw.to_level()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Build the initial subscribe payload for a chunk of asset ids.
pub fn subscribe_payload(asset_ids: &[String]) -> String {
    serde_json::json!({
        "type": "market",
        "assets_ids": asset_ids,
    })
    .to_string()
}

/// Build an incremental subscribe/unsubscribe payload.
pub fn operation_payload(asset_ids: &[String], subscribe: bool) -> String {
    serde_json::json!({
        "assets_ids": asset_ids,
        "operation": if subscribe { "subscribe" } else { "unsubscribe" },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_book_snapshot() {
        let text = r#"{"event_type":"book","asset_id":"tok1",
            "bids":[{"price":"0.45","size":"100"}],
            "asks":[{"price":"0.47","size":"80"}],
            "timestamp":"1700000000000"}"#;
        let events = decode_frame(text).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            WsEvent::BookSnapshot {
                asset_id,
                bids,
                asks,
                timestamp_ms,
            } => {
                assert_eq!(asset_id, "tok1");
                assert_eq!(bids.len(), 1);
                assert_eq!(asks[0].price, 0.47);
                assert_eq!(*timestamp_ms, Some(1700000000000));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_array_of_frames() {
        let text = r#"[
            {"event_type":"book","asset_id":"a","bids":[],"asks":[]},
            {"event_type":"last_trade_price","asset_id":"a","price":"0.46","size":"25","side":"SELL"}
        ]"#;
        let events = decode_frame(text).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            WsEvent::Trade { side, price, .. } => {
                assert_eq!(*side, TradeSide::Sell);
                assert_eq!(*price, 0.46);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_price_change() {
        let text = r#"{"event_type":"price_change","asset_id":"tok1",
            "changes":[{"price":"0.45","size":"0","side":"BUY"},
                       {"price":"0.48","size":"55","side":"SELL"}]}"#;
        let events = decode_frame(text).unwrap();
        match &events[0] {
            WsEvent::PriceChange { changes, .. } => {
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[0].size, 0.0);
                assert_eq!(changes[1].side, TradeSide::Sell);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_pong_and_unknown() {
        assert!(matches!(decode_frame("PONG").unwrap()[0], WsEvent::Pong));
        let events = decode_frame(r#"{"event_type":"tick_size_change","asset_id":"x"}"#).unwrap();
        assert!(matches!(&events[0], WsEvent::Unknown { event_type } if event_type == "tick_size_change"));
    }

    #[test]
    fn test_book_roundtrip_preserves_shape() {
        let text = r#"{"event_type":"book","asset_id":"tok1","bids":[{"price":"0.45","size":"100"}],"asks":[]}"#;
        let events = decode_frame(text).unwrap();
        // Re-encoding the decoded book yields the same levels.
        match &events[0] {
            WsEvent::BookSnapshot { bids, .. } => {
                assert_eq!(bids, &vec![PriceLevel::new(0.45, 100.0)]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_payloads() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let initial: Value = serde_json::from_str(&subscribe_payload(&ids)).unwrap();
        assert_eq!(initial["type"], "market");
        assert_eq!(initial["assets_ids"].as_array().unwrap().len(), 2);

        let op: Value = serde_json::from_str(&operation_payload(&ids, false)).unwrap();
        assert_eq!(op["operation"], "unsubscribe");
    }
}
