//! Core domain types for the market surveillance engine.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Market`: a tracked prediction market with category and tier
//! - `OrderbookSnapshot`, `TradeTick`: normalized market data events
//! - `EarlySignal`: a typed detection with per-type metadata
//! - `ErrorClass`: shared error taxonomy for retry/alert policy

pub mod error;
pub mod market;
pub mod orderbook;
pub mod signal;

pub use error::{CoreError, ErrorClass, Result};
pub use market::{Category, Market, MarketTier, OpportunityScore, TierDecision};
pub use orderbook::{OrderbookSnapshot, PriceLevel, TradeSide, TradeTick};
pub use signal::{ConfidenceTier, Direction, EarlySignal, SignalMetadata, SignalType};

/// Opaque market (condition) identifier.
pub type MarketId = String;

/// Opaque per-outcome token identifier used as the WebSocket subscription key.
pub type AssetId = String;
