//! Venue REST client.
//!
//! Paged event listing, single-market fetch, orderbook snapshots and
//! recent trades, behind a token-bucket rate limit with classified
//! errors and capped exponential backoff.

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limit;

pub use client::{RestConfig, VenueRestClient};
pub use error::{RestError, RestResult};
pub use models::{RawEvent, RawMarket, RawOrderbook, RawTrade};
pub use rate_limit::RequestLimiter;
