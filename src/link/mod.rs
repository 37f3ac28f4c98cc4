//! Radio link statistics.
//!
//! Tracks packets received and dropped on the heart-rate channel, both as
//! drain-on-read counters feeding the session and as lifetime totals that
//! survive restarts.

pub mod counters;

// Re-export commonly used types
pub use counters::{create_shared_counters, LinkCounters, LinkStats, SharedLinkCounters};
