//! Prioritized alert delivery.
//!
//! Scores each signal with the per-type posterior, maps the score to a
//! priority, deduplicates, reserves atomic rate-limit slots (released
//! on delivery failure), and posts embeds to the webhook sink.

pub mod config;
pub mod error;
pub mod limits;
pub mod notifier;
pub mod scorer;
pub mod webhook;

pub use config::NotifierConfig;
pub use error::{NotifyError, NotifyResult};
pub use limits::{AlertLimits, FilterReason, Reservation};
pub use notifier::{DeliveryOutcome, NotifierStats, PrioritizedNotifier};
pub use scorer::{AlertPriority, AlertScorer};
pub use webhook::{DiscordWebhook, EmbedPayload, WebhookSink};
