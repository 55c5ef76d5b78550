//! Raw venue payloads and normalization into core types.
//!
//! The venue's JSON is stringly typed: numbers arrive as strings, and
//! arrays sometimes arrive as JSON-encoded strings. Every numeric or
//! array field goes through a lenient deserializer.

use chrono::{DateTime, Utc};
use pulse_core::{Market, MarketTier, OpportunityScore, OrderbookSnapshot, PriceLevel, TradeSide, TradeTick};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Accept a JSON array, or a JSON array encoded as a string.
fn de_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Array(arr) => Ok(arr
            .into_iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()),
        Value::String(s) => {
            serde_json::from_str::<Vec<String>>(&s).map_err(serde::de::Error::custom)
        }
        Value::Null => Ok(Vec::new()),
        _ => Ok(Vec::new()),
    }
}

/// Accept a number, a numeric string, or null.
fn de_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s.parse::<f64>().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// Per-outcome token entry; the id field name varies by endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToken {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl RawToken {
    fn resolved_id(&self) -> Option<&str> {
        self.token_id
            .as_deref()
            .or(self.id.as_deref())
            .or(self.asset_id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// A market as returned by the events/markets endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMarket {
    #[serde(rename = "conditionId", alias = "condition_id", default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "de_string_vec")]
    pub outcomes: Vec<String>,
    #[serde(
        rename = "outcomePrices",
        alias = "outcome_prices",
        default,
        deserialize_with = "de_string_vec"
    )]
    pub outcome_prices: Vec<String>,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub volume: Option<f64>,
    #[serde(rename = "volumeNum", default, deserialize_with = "de_f64_opt")]
    pub volume_num: Option<f64>,
    #[serde(rename = "volumeClob", default, deserialize_with = "de_f64_opt")]
    pub volume_clob: Option<f64>,
    #[serde(rename = "volumeAmm", default, deserialize_with = "de_f64_opt")]
    pub volume_amm: Option<f64>,
    #[serde(rename = "volume24hr", default, deserialize_with = "de_f64_opt")]
    pub volume_24hr: Option<f64>,
    #[serde(rename = "volume1wk", default, deserialize_with = "de_f64_opt")]
    pub volume_1wk: Option<f64>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(rename = "endDate", alias = "end_date_iso", default)]
    pub end_date: Option<String>,
    #[serde(rename = "createdAt", alias = "created_at", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tokens: Vec<RawToken>,
    #[serde(rename = "assetId", alias = "asset_id", default)]
    pub asset_id: Option<String>,
    #[serde(
        rename = "outcomeTokens",
        alias = "outcome_tokens",
        default,
        deserialize_with = "de_string_vec"
    )]
    pub outcome_tokens: Vec<String>,
    #[serde(
        rename = "clobTokenIds",
        alias = "clob_token_ids",
        default,
        deserialize_with = "de_string_vec"
    )]
    pub clob_token_ids: Vec<String>,
}

impl RawMarket {
    /// Stable market id: conditionId, falling back to the row id.
    pub fn market_id(&self) -> Option<&str> {
        self.condition_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Volume fallback chain:
    /// volume -> volumeNum -> volumeClob+volumeAmm -> volume24hr -> volume1wk.
    pub fn resolved_volume(&self) -> f64 {
        if let Some(v) = self.volume {
            return v.max(0.0);
        }
        if let Some(v) = self.volume_num {
            return v.max(0.0);
        }
        match (self.volume_clob, self.volume_amm) {
            (Some(c), Some(a)) => return (c + a).max(0.0),
            (Some(c), None) => return c.max(0.0),
            (None, Some(a)) => return a.max(0.0),
            _ => {}
        }
        self.volume_24hr
            .or(self.volume_1wk)
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Asset-id fallback chain:
    /// tokens[*] -> assetId -> outcomeTokens -> clobTokenIds -> conditionId.
    ///
    /// The result is only kept when it is parallel to `outcomes`; anything
    /// else means the market cannot be subscribed and resolves to empty.
    pub fn resolved_asset_ids(&self) -> Vec<String> {
        let n = self.outcomes.len();

        let from_tokens: Vec<String> = self
            .tokens
            .iter()
            .filter_map(|t| t.resolved_id().map(str::to_string))
            .collect();
        for ids in [
            from_tokens,
            self.asset_id.clone().into_iter().collect(),
            self.outcome_tokens.clone(),
            self.clob_token_ids.clone(),
            self.market_id().map(str::to_string).into_iter().collect(),
        ] {
            if !ids.is_empty() && ids.len() == n {
                return ids;
            }
        }
        Vec::new()
    }

    /// Normalize into the core `Market` model.
    ///
    /// Returns None when the market lacks an id, a question, or a valid
    /// outcome/price pairing.
    pub fn normalize(&self, now: DateTime<Utc>) -> Option<Market> {
        let id = self.market_id()?.to_string();
        let question = self.question.clone().filter(|q| !q.is_empty())?;

        if self.outcomes.len() < 2 {
            debug!(market_id = %id, outcomes = self.outcomes.len(), "Skipping market with too few outcomes");
            return None;
        }
        let outcome_prices: Vec<f64> = self
            .outcome_prices
            .iter()
            .filter_map(|p| p.parse::<f64>().ok())
            .map(|p| p.clamp(0.0, 1.0))
            .collect();
        if outcome_prices.len() != self.outcomes.len() {
            debug!(
                market_id = %id,
                prices = outcome_prices.len(),
                outcomes = self.outcomes.len(),
                "Skipping market with mismatched prices"
            );
            return None;
        }

        let closed = self.closed.unwrap_or(false);
        let market = Market {
            id,
            question,
            outcomes: self.outcomes.clone(),
            outcome_prices,
            volume: self.resolved_volume(),
            volume_24hr: self.volume_24hr,
            active: self.active.unwrap_or(false) && !closed,
            closed,
            end_date: parse_ts(self.end_date.as_deref()),
            created_at: parse_ts(self.created_at.as_deref()),
            asset_ids: self.resolved_asset_ids(),
            category: None,
            category_score: 0.0,
            is_blacklisted: false,
            tier: MarketTier::Ignored,
            opportunity: OpportunityScore::default(),
            refreshed_at: now,
        };
        market.validate().ok()?;
        Some(market)
    }
}

fn parse_ts(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// An event row with its embedded markets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub markets: Vec<RawMarket>,
}

/// One raw book level (`price`/`size` as strings or numbers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLevel {
    #[serde(deserialize_with = "de_f64_req")]
    pub price: f64,
    #[serde(deserialize_with = "de_f64_req")]
    pub size: f64,
}

fn de_f64_req<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    de_f64_opt(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected number"))
}

/// REST orderbook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrderbook {
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl RawOrderbook {
    /// Into the core snapshot (sides sorted canonically).
    pub fn into_snapshot(self, market_id: String, asset_id: String) -> OrderbookSnapshot {
        let ts = self
            .timestamp
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ms| DateTime::from_timestamp_millis(ms))
            .unwrap_or_else(Utc::now);
        OrderbookSnapshot::new(
            market_id,
            asset_id,
            ts,
            self.bids
                .into_iter()
                .map(|l| PriceLevel::new(l.price, l.size))
                .collect(),
            self.asks
                .into_iter()
                .map(|l| PriceLevel::new(l.price, l.size))
                .collect(),
        )
    }
}

/// Recent trade row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrade {
    #[serde(default)]
    pub market: Option<String>,
    #[serde(deserialize_with = "de_f64_req")]
    pub price: f64,
    #[serde(deserialize_with = "de_f64_req")]
    pub size: f64,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "de_f64_opt")]
    pub timestamp: Option<f64>,
}

impl RawTrade {
    /// Into the core tick; unknown sides default to buy-aggressor.
    pub fn into_tick(self, market_id: String) -> TradeTick {
        let side = match self.side.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("sell") => TradeSide::Sell,
            _ => TradeSide::Buy,
        };
        let timestamp = self
            .timestamp
            .and_then(|s| DateTime::from_timestamp_millis((s * 1000.0) as i64))
            .unwrap_or_else(Utc::now);
        TradeTick {
            market_id,
            timestamp,
            price: self.price,
            size: self.size,
            side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_market_json() -> serde_json::Value {
        serde_json::json!({
            "conditionId": "0xabc",
            "question": "Will the Fed cut rates in March?",
            "outcomes": "[\"Yes\",\"No\"]",
            "outcomePrices": "[\"0.62\",\"0.38\"]",
            "volumeNum": "125000.5",
            "active": true,
            "closed": false,
            "clobTokenIds": "[\"111\",\"222\"]",
            "endDate": "2026-03-20T00:00:00Z"
        })
    }

    #[test]
    fn test_stringly_arrays_and_numbers() {
        let raw: RawMarket = serde_json::from_value(raw_market_json()).unwrap();
        assert_eq!(raw.outcomes, vec!["Yes", "No"]);
        assert_eq!(raw.resolved_volume(), 125000.5);
        assert_eq!(raw.resolved_asset_ids(), vec!["111", "222"]);
    }

    #[test]
    fn test_normalize_roundtrip() {
        let raw: RawMarket = serde_json::from_value(raw_market_json()).unwrap();
        let market = raw.normalize(Utc::now()).expect("normalized");
        assert_eq!(market.id, "0xabc");
        assert_eq!(market.outcome_prices, vec![0.62, 0.38]);
        assert!(market.active);
        assert!(market.is_subscribable());
        assert!(market.end_date.is_some());
        assert!(market.validate().is_ok());

        // transform(encode(m)) = m for normalized markets.
        let encoded = serde_json::to_value(&market).unwrap();
        let back: Market = serde_json::from_value(encoded).unwrap();
        assert_eq!(back.id, market.id);
        assert_eq!(back.outcome_prices, market.outcome_prices);
    }

    #[test]
    fn test_volume_fallback_chain() {
        let raw: RawMarket = serde_json::from_value(serde_json::json!({
            "conditionId": "0x1",
            "question": "q",
            "outcomes": ["Yes", "No"],
            "outcomePrices": ["0.5", "0.5"],
            "volumeClob": "300",
            "volumeAmm": 200
        }))
        .unwrap();
        assert_eq!(raw.resolved_volume(), 500.0);

        let raw: RawMarket = serde_json::from_value(serde_json::json!({
            "conditionId": "0x1",
            "question": "q",
            "outcomes": ["Yes", "No"],
            "outcomePrices": ["0.5", "0.5"],
            "volume24hr": "42"
        }))
        .unwrap();
        assert_eq!(raw.resolved_volume(), 42.0);
    }

    #[test]
    fn test_asset_id_chain_prefers_tokens() {
        let raw: RawMarket = serde_json::from_value(serde_json::json!({
            "conditionId": "0x1",
            "question": "q",
            "outcomes": ["Yes", "No"],
            "outcomePrices": ["0.5", "0.5"],
            "tokens": [{"token_id": "t1"}, {"id": "t2"}],
            "clobTokenIds": ["c1", "c2"]
        }))
        .unwrap();
        assert_eq!(raw.resolved_asset_ids(), vec!["t1", "t2"]);
    }

    #[test]
    fn test_mismatched_asset_ids_mean_unsubscribable() {
        let raw: RawMarket = serde_json::from_value(serde_json::json!({
            "conditionId": "0x1",
            "question": "q",
            "outcomes": ["Yes", "No"],
            "outcomePrices": ["0.5", "0.5"],
            "clobTokenIds": ["only-one"]
        }))
        .unwrap();
        assert!(raw.resolved_asset_ids().is_empty());
        let market = raw.normalize(Utc::now()).unwrap();
        assert!(!market.is_subscribable());
    }

    #[test]
    fn test_price_mismatch_dropped() {
        let raw: RawMarket = serde_json::from_value(serde_json::json!({
            "conditionId": "0x1",
            "question": "q",
            "outcomes": ["Yes", "No"],
            "outcomePrices": ["0.5"]
        }))
        .unwrap();
        assert!(raw.normalize(Utc::now()).is_none());
    }

    #[test]
    fn test_orderbook_frame_roundtrip() {
        let json = serde_json::json!({
            "bids": [{"price": "0.45", "size": "100"}, {"price": "0.44", "size": "50"}],
            "asks": [{"price": "0.47", "size": "80"}],
            "timestamp": "1700000000000"
        });
        let raw: RawOrderbook = serde_json::from_value(json.clone()).unwrap();
        // encode(decode(frame)) preserves the book shape.
        let encoded = serde_json::to_value(&raw).unwrap();
        assert_eq!(encoded["bids"].as_array().unwrap().len(), 2);

        let snap = raw.into_snapshot("m1".to_string(), "a1".to_string());
        assert_eq!(snap.best_bid().unwrap().price, 0.45);
        assert!((snap.spread().unwrap() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_trade_side_defaults_buy() {
        let raw: RawTrade = serde_json::from_value(serde_json::json!({
            "price": "0.47", "size": "25"
        }))
        .unwrap();
        let tick = raw.into_tick("m1".to_string());
        assert_eq!(tick.side, TradeSide::Buy);
    }
}
