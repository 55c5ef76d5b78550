//! The storage adapter.

use crate::error::{StorageError, StorageResult};
use crate::schema::SCHEMA;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_core::{EarlySignal, Market, OrderbookSnapshot, TradeTick};
use pulse_perf::SignalPerformanceRecord;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// A row bound for `system_alerts`.
#[derive(Debug, Clone)]
pub struct SystemAlertRow {
    pub name: String,
    pub level: String,
    pub message: String,
    pub component: String,
    pub operation: String,
    pub context: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// SQLite-backed storage.
///
/// The connection sits behind a mutex; concurrent writers serialize
/// here, which is fine because all hot-path writes arrive through the
/// single writer task.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.as_ref().display(), "Storage opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or update a market row. Idempotent.
    pub fn upsert_market(&self, market: &Market) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO markets (
                id, question, outcomes, outcome_prices, volume, active, closed,
                end_date, category, category_score, is_blacklisted, tier,
                tier_updated_at, opportunity_score, volume_score, edge_score,
                catalyst_score, quality_score, score_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(id) DO UPDATE SET
                question = excluded.question,
                outcomes = excluded.outcomes,
                outcome_prices = excluded.outcome_prices,
                volume = excluded.volume,
                active = excluded.active,
                closed = excluded.closed,
                end_date = excluded.end_date,
                category = excluded.category,
                category_score = excluded.category_score,
                is_blacklisted = excluded.is_blacklisted,
                tier = excluded.tier,
                tier_updated_at = excluded.tier_updated_at,
                opportunity_score = excluded.opportunity_score,
                volume_score = excluded.volume_score,
                edge_score = excluded.edge_score,
                catalyst_score = excluded.catalyst_score,
                quality_score = excluded.quality_score,
                score_updated_at = excluded.score_updated_at"#,
            params![
                market.id,
                market.question,
                serde_json::to_string(&market.outcomes)?,
                serde_json::to_string(&market.outcome_prices)?,
                market.volume,
                market.active,
                market.closed,
                market.end_date.map(|t| t.to_rfc3339()),
                market.category.map(|c| c.as_str()),
                market.category_score,
                market.is_blacklisted,
                market.tier.as_str(),
                market.refreshed_at.to_rfc3339(),
                market.opportunity.total,
                market.opportunity.volume,
                market.opportunity.edge,
                market.opportunity.catalyst,
                market.opportunity.quality,
                market.refreshed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Append one outcome price observation.
    pub fn append_price(
        &self,
        market_id: &str,
        timestamp: DateTime<Utc>,
        outcome_index: usize,
        price: f64,
        volume: f64,
    ) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT INTO market_prices (market_id, timestamp, outcome_index, price, volume)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                market_id,
                timestamp.to_rfc3339(),
                outcome_index as i64,
                price,
                volume
            ],
        )?;
        Ok(())
    }

    /// Append a down-sampled book snapshot (aggregates plus levels).
    pub fn append_orderbook_snapshot(&self, snapshot: &OrderbookSnapshot) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT INTO orderbook_snapshots
                 (market_id, timestamp, bids, asks, spread, mid_price, best_bid, best_ask)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snapshot.market_id,
                snapshot.timestamp.to_rfc3339(),
                serde_json::to_string(&snapshot.bids)?,
                serde_json::to_string(&snapshot.asks)?,
                snapshot.spread(),
                snapshot.mid_price(),
                snapshot.best_bid().map(|l| l.price),
                snapshot.best_ask().map(|l| l.price),
            ],
        )?;
        Ok(())
    }

    /// Append a sampled trade tick.
    pub fn append_trade_tick(&self, tick: &TradeTick) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT INTO trade_ticks (market_id, timestamp, price, size, side)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tick.market_id,
                tick.timestamp.to_rfc3339(),
                tick.price,
                tick.size,
                tick.side.as_str()
            ],
        )?;
        Ok(())
    }

    /// Insert an emitted signal. At-most-once by signal id.
    pub fn insert_signal(&self, signal: &EarlySignal) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO signals
                 (id, market_id, signal_type, confidence, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                signal.id,
                signal.market_id,
                signal.signal_type.as_str(),
                signal.confidence,
                signal.timestamp.to_rfc3339(),
                serde_json::to_string(&signal.metadata)?,
            ],
        )?;
        Ok(())
    }

    /// Upsert a performance record. At-least-once; later samples win.
    pub fn update_signal_performance(
        &self,
        record: &SignalPerformanceRecord,
    ) -> StorageResult<()> {
        let p = &record.horizon_prices;
        let n = &record.horizon_pnls;
        self.conn.lock().execute(
            r#"INSERT INTO signal_performance (
                signal_id, market_id, signal_type, confidence, entry_time,
                entry_price, entry_direction, market_volume,
                price_30min, price_1hr, price_4hr, price_24hr, price_7day,
                pnl_30min, pnl_1hr, pnl_4hr, pnl_24hr, pnl_7day,
                market_resolved, resolution_time, winning_outcome_index,
                final_pnl, was_correct, magnitude,
                max_favorable_move, max_adverse_move
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                      ?25, ?26)
            ON CONFLICT(signal_id) DO UPDATE SET
                price_30min = excluded.price_30min,
                price_1hr = excluded.price_1hr,
                price_4hr = excluded.price_4hr,
                price_24hr = excluded.price_24hr,
                price_7day = excluded.price_7day,
                pnl_30min = excluded.pnl_30min,
                pnl_1hr = excluded.pnl_1hr,
                pnl_4hr = excluded.pnl_4hr,
                pnl_24hr = excluded.pnl_24hr,
                pnl_7day = excluded.pnl_7day,
                market_resolved = excluded.market_resolved,
                resolution_time = excluded.resolution_time,
                winning_outcome_index = excluded.winning_outcome_index,
                final_pnl = excluded.final_pnl,
                was_correct = excluded.was_correct,
                magnitude = excluded.magnitude,
                max_favorable_move = excluded.max_favorable_move,
                max_adverse_move = excluded.max_adverse_move"#,
            params![
                record.signal_id,
                record.market_id,
                record.signal_type.as_str(),
                record.confidence,
                record.entry_time.to_rfc3339(),
                record.entry_price,
                record.direction.as_str(),
                record.market_volume,
                p[0], p[1], p[2], p[3], p[4],
                n[0], n[1], n[2], n[3], n[4],
                record.market_resolved,
                record.resolution_time.map(|t| t.to_rfc3339()),
                record.winning_outcome_index.map(|i| i as i64),
                record.final_pnl,
                record.was_correct,
                record.primary_pnl().map(f64::abs),
                record.max_favorable_move,
                record.max_adverse_move,
            ],
        )?;
        Ok(())
    }

    /// Insert a system alert row.
    pub fn insert_system_alert(&self, alert: &SystemAlertRow) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT INTO system_alerts
                 (name, level, message, component, operation, context, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alert.name,
                alert.level,
                alert.message,
                alert.component,
                alert.operation,
                alert
                    .context
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                alert.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Ad-hoc read query. SELECT only; rows come back as JSON objects.
    pub fn query(&self, sql: &str) -> StorageResult<Vec<serde_json::Map<String, Value>>> {
        let trimmed = sql.trim_start().to_lowercase();
        if !trimmed.starts_with("select") {
            return Err(StorageError::RejectedQuery(
                "only SELECT statements are allowed".to_string(),
            ));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut obj = serde_json::Map::new();
            for (i, col) in columns.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::from(v),
                    rusqlite::types::ValueRef::Real(v) => Value::from(v),
                    rusqlite::types::ValueRef::Text(v) => {
                        Value::from(String::from_utf8_lossy(v).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(_) => Value::Null,
                };
                obj.insert(col.clone(), value);
            }
            out.push(obj);
        }
        Ok(out)
    }
}
