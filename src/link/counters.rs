//! Packet counters for the radio link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Packet counters for the monitored channel.
///
/// `take_*` drain the pending counts: each call returns the packets counted
/// since the previous call and restarts from zero. They are the only
/// readers of the pending counts. Lifetime totals are kept
/// separately and can be persisted.
#[derive(Debug)]
pub struct LinkCounters {
    /// Packets received since the last drain
    pending_received: AtomicU64,
    /// Packets dropped since the last drain
    pending_dropped: AtomicU64,
    /// Packets received over the lifetime of the counters
    total_received: AtomicU64,
    /// Packets dropped over the lifetime of the counters
    total_dropped: AtomicU64,
    /// Sessions exported
    sessions_exported: AtomicU64,
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl LinkCounters {
    pub fn new() -> Self {
        Self {
            pending_received: AtomicU64::new(0),
            pending_dropped: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            sessions_exported: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create counters whose lifetime totals are loaded from and saved to
    /// `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut counters = Self::new();
        counters.persist_path = Some(path);

        if let Err(e) = counters.load() {
            warn!("Could not load previous link stats: {e}");
        }

        counters
    }

    /// Count one packet received.
    pub fn record_received(&self) {
        self.pending_received.fetch_add(1, Ordering::Relaxed);
        self.total_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one packet dropped (RX failure).
    pub fn record_dropped(&self) {
        self.pending_dropped.fetch_add(1, Ordering::Relaxed);
        self.total_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_exported(&self) {
        self.sessions_exported.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain and return the packets received since the last call.
    pub fn take_received(&self) -> u64 {
        self.pending_received.swap(0, Ordering::Relaxed)
    }

    /// Drain and return the packets dropped since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.pending_dropped.swap(0, Ordering::Relaxed)
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            pending_received: self.pending_received.load(Ordering::Relaxed),
            pending_dropped: self.pending_dropped.load(Ordering::Relaxed),
            total_received: self.total_received.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            sessions_exported: self.sessions_exported.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Link Statistics:\n\
             - Packets received: {}\n\
             - Packets dropped: {}\n\
             - Sessions exported: {}\n\
             - Uptime: {} seconds",
            stats.total_received, stats.total_dropped, stats.sessions_exported, stats.uptime_secs
        )
    }

    /// Save lifetime totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                total_received: stats.total_received,
                total_dropped: stats.total_dropped,
                sessions_exported: stats.sessions_exported,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.total_received
                    .store(persisted.total_received, Ordering::Relaxed);
                self.total_dropped
                    .store(persisted.total_dropped, Ordering::Relaxed);
                self.sessions_exported
                    .store(persisted.sessions_exported, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for LinkCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of link statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStats {
    pub pending_received: u64,
    pub pending_dropped: u64,
    pub total_received: u64,
    pub total_dropped: u64,
    pub sessions_exported: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    total_received: u64,
    total_dropped: u64,
    sessions_exported: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared counters.
pub type SharedLinkCounters = Arc<LinkCounters>;

/// Create shared counters, persisted at `path` when given.
pub fn create_shared_counters(path: Option<PathBuf>) -> SharedLinkCounters {
    match path {
        Some(path) => Arc::new(LinkCounters::with_persistence(path)),
        None => Arc::new(LinkCounters::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_drains_pending_counts() {
        let counters = LinkCounters::new();
        counters.record_received();
        counters.record_received();
        counters.record_dropped();

        assert_eq!(counters.take_received(), 2);
        assert_eq!(counters.take_received(), 0);
        assert_eq!(counters.take_dropped(), 1);
        assert_eq!(counters.take_dropped(), 0);

        let stats = counters.stats();
        assert_eq!(stats.total_received, 2);
        assert_eq!(stats.total_dropped, 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("hrmon-link-{}", uuid::Uuid::new_v4()))
            .join("link_stats.json");

        let counters = LinkCounters::with_persistence(path.clone());
        counters.record_received();
        counters.record_dropped();
        counters.record_session_exported();
        counters.save().unwrap();

        let reloaded = LinkCounters::with_persistence(path.clone());
        let stats = reloaded.stats();
        assert_eq!(stats.total_received, 1);
        assert_eq!(stats.total_dropped, 1);
        assert_eq!(stats.sessions_exported, 1);
        assert_eq!(stats.pending_received, 0);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = LinkCounters::new().summary();
        assert!(summary.contains("Packets received"));
        assert!(summary.contains("Packets dropped"));
    }
}
