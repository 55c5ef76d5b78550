//! Market discovery, categorization, and tier assignment.
//!
//! The discovery cycle pages the venue's events endpoint, normalizes
//! and deduplicates markets, assigns each a category from the keyword
//! categorizer, and recomputes monitoring tiers with opportunity
//! scores. The catalog keeps the previous set alive across REST
//! outages.

pub mod catalog;
pub mod categorizer;
pub mod config;
pub mod error;
pub mod tier;

pub use catalog::{CatalogDiff, MarketCatalog};
pub use categorizer::{categorize, Categorization};
pub use config::DiscoveryConfig;
pub use error::{DiscoveryError, DiscoveryResult};
pub use tier::TierAssigner;
