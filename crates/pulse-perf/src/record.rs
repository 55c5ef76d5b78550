//! Per-signal performance records.

use chrono::{DateTime, Duration, Utc};
use pulse_core::{Direction, SignalType};
use serde::{Deserialize, Serialize};

/// Forward-sampling horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Min30,
    Hour1,
    Hour4,
    Hour24,
    Day7,
}

impl Horizon {
    pub const ALL: [Horizon; 5] = [
        Self::Min30,
        Self::Hour1,
        Self::Hour4,
        Self::Hour24,
        Self::Day7,
    ];

    /// Offset from signal entry.
    pub fn offset(&self) -> Duration {
        match self {
            Self::Min30 => Duration::minutes(30),
            Self::Hour1 => Duration::hours(1),
            Self::Hour4 => Duration::hours(4),
            Self::Hour24 => Duration::hours(24),
            Self::Day7 => Duration::days(7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min30 => "30min",
            Self::Hour1 => "1hr",
            Self::Hour4 => "4hr",
            Self::Hour24 => "24hr",
            Self::Day7 => "7day",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Min30 => 0,
            Self::Hour1 => 1,
            Self::Hour4 => 2,
            Self::Hour24 => 3,
            Self::Day7 => 4,
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-sampled performance of one signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPerformanceRecord {
    pub signal_id: String,
    pub market_id: String,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub direction: Direction,
    pub market_volume: f64,

    /// Prices at each horizon, indexed by `Horizon::index`.
    /// `None` means not yet sampled; `Some(None)` is modeled by the
    /// sampled flag below (price unavailable at sample time).
    pub horizon_prices: [Option<f64>; 5],
    pub horizon_pnls: [Option<f64>; 5],
    /// Whether each horizon has been sampled (even if unavailable).
    pub horizon_sampled: [bool; 5],

    pub market_resolved: bool,
    pub resolution_time: Option<DateTime<Utc>>,
    pub winning_outcome_index: Option<usize>,
    pub final_pnl: Option<f64>,
    pub was_correct: Option<bool>,

    /// Best and worst signed move seen across sampled horizons.
    pub max_favorable_move: f64,
    pub max_adverse_move: f64,
}

impl SignalPerformanceRecord {
    pub fn new(
        signal_id: String,
        market_id: String,
        signal_type: SignalType,
        confidence: f64,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        direction: Direction,
        market_volume: f64,
    ) -> Self {
        Self {
            signal_id,
            market_id,
            signal_type,
            confidence,
            entry_time,
            entry_price,
            direction,
            market_volume,
            horizon_prices: [None; 5],
            horizon_pnls: [None; 5],
            horizon_sampled: [false; 5],
            market_resolved: false,
            resolution_time: None,
            winning_outcome_index: None,
            final_pnl: None,
            was_correct: None,
            max_favorable_move: 0.0,
            max_adverse_move: 0.0,
        }
    }

    /// Signed pnl for a price at any horizon:
    /// `(price - entry) / entry * sign(direction)`.
    pub fn pnl_for(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * self.direction.sign()
    }

    /// Record a horizon sample. `price` is None when the market was not
    /// trading at sample time; the horizon still counts as sampled.
    ///
    /// `was_correct` is set from the first sampled horizon that carried
    /// a price, and never changes after that (resolution overrides).
    pub fn fill_horizon(&mut self, horizon: Horizon, price: Option<f64>) {
        let i = horizon.index();
        if self.horizon_sampled[i] {
            return;
        }
        self.horizon_sampled[i] = true;
        self.horizon_prices[i] = price;

        if let Some(p) = price {
            let pnl = self.pnl_for(p);
            self.horizon_pnls[i] = Some(pnl);
            self.max_favorable_move = self.max_favorable_move.max(pnl);
            self.max_adverse_move = self.max_adverse_move.min(pnl);
            if self.was_correct.is_none() && !self.market_resolved {
                self.was_correct = Some(pnl > 0.0);
            }
        }
    }

    /// Record market resolution. The winning outcome decides
    /// correctness for directional signals; the resolved primary price
    /// (1 for the primary outcome winning, 0 otherwise) decides pnl.
    pub fn resolve(&mut self, winning_outcome_index: usize, at: DateTime<Utc>) {
        if self.market_resolved {
            return;
        }
        self.market_resolved = true;
        self.resolution_time = Some(at);
        self.winning_outcome_index = Some(winning_outcome_index);

        let resolved_price = if winning_outcome_index == 0 { 1.0 } else { 0.0 };
        let pnl = self.pnl_for(resolved_price);
        self.final_pnl = Some(pnl);
        self.was_correct = Some(match self.direction {
            Direction::Bullish => winning_outcome_index == 0,
            Direction::Bearish => winning_outcome_index != 0,
            Direction::Neutral => pnl > 0.0,
        });
    }

    /// Horizons due at `now` and not yet sampled.
    pub fn due_horizons(&self, now: DateTime<Utc>) -> Vec<Horizon> {
        Horizon::ALL
            .into_iter()
            .filter(|h| !self.horizon_sampled[h.index()] && self.entry_time + h.offset() <= now)
            .collect()
    }

    /// Count of sampled horizons.
    pub fn sampled_count(&self) -> usize {
        self.horizon_sampled.iter().filter(|s| **s).count()
    }

    /// Fully sampled or resolved: nothing left to wait for.
    pub fn is_complete(&self) -> bool {
        self.market_resolved || self.horizon_sampled.iter().all(|s| *s)
    }

    /// The first defined horizon pnl, used for posterior returns.
    pub fn primary_pnl(&self) -> Option<f64> {
        self.horizon_pnls.iter().flatten().next().copied()
    }
}
