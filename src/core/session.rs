//! Session aggregation of decoded telemetry.
//!
//! A session collects BPM, RR and RSSI samples along with the packet
//! counters of the radio link. Sessions are capped at
//! [`SESSION_TIME_LIMIT_MS`]; the limit is checked on every write, and the
//! first write past it stops the session without recording anything.

use crate::core::clock::Clock;
use crate::core::series::TimestampedSeries;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Hard ceiling on the duration of one session.
pub const SESSION_TIME_LIMIT_HOURS: u64 = 12;
pub const SESSION_TIME_LIMIT_MS: u64 = SESSION_TIME_LIMIT_HOURS * 3_600_000;

/// What happened to a sample handed to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Recorded,
    /// Session not running.
    Ignored,
    /// This write hit the time limit and stopped the session.
    LimitReached,
}

/// Series collected during a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSeries {
    pub bpm: TimestampedSeries<u8>,
    /// RR intervals in milliseconds.
    pub rr: TimestampedSeries<u32>,
    pub rssi: TimestampedSeries<i8>,
    pub packets_received: TimestampedSeries<u64>,
    pub packets_dropped: TimestampedSeries<u64>,
}

impl SessionSeries {
    fn clear(&mut self) {
        self.bpm.clear();
        self.rr.clear();
        self.rssi.clear();
        self.packets_received.clear();
        self.packets_dropped.clear();
    }
}

/// Aggregated statistics for one monitoring session.
pub struct SessionRecord {
    clock: Arc<dyn Clock>,
    started: bool,
    start_ms: u64,
    elapsed_ms: u64,
    packets_received: u64,
    packets_dropped: u64,
    throughput: u8,
    series: SessionSeries,
}

impl SessionRecord {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started: false,
            start_ms: 0,
            elapsed_ms: 0,
            packets_received: 0,
            packets_dropped: 0,
            throughput: 0,
            series: SessionSeries::default(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start recording. Samples already collected are kept; call
    /// [`clear`](Self::clear) first for a fresh session.
    pub fn start(&mut self) {
        self.started = true;
        self.start_ms = self.clock.now_ms();
        self.elapsed_ms = 0;
        info!("Session started");
    }

    /// Stop recording without discarding anything.
    pub fn stop(&mut self) {
        if self.started {
            self.elapsed_ms = self.elapsed_ms();
            self.started = false;
            info!(elapsed_ms = self.elapsed_ms, "Session stopped");
        }
    }

    /// Reset counters and series.
    pub fn clear(&mut self) {
        self.packets_received = 0;
        self.packets_dropped = 0;
        self.throughput = 0;
        self.elapsed_ms = 0;
        self.series.clear();
        debug!("Session cleared");
    }

    /// Time since start while running; frozen once stopped.
    pub fn elapsed_ms(&self) -> u64 {
        if self.started {
            self.clock.now_ms().saturating_sub(self.start_ms)
        } else {
            self.elapsed_ms
        }
    }

    /// Stop the session if it has run for the time limit. Returns whether
    /// this call stopped it.
    pub fn check_time_limit(&mut self) -> bool {
        if self.started && self.elapsed_ms() >= SESSION_TIME_LIMIT_MS {
            info!(
                limit_hours = SESSION_TIME_LIMIT_HOURS,
                "Session time limit reached"
            );
            self.stop();
            true
        } else {
            false
        }
    }

    pub fn add_bpm(&mut self, bpm: u8) -> SampleOutcome {
        self.record(|series, now| series.bpm.push(now, bpm))
    }

    pub fn add_rr(&mut self, rr_ms: u32) -> SampleOutcome {
        self.record(|series, now| series.rr.push(now, rr_ms))
    }

    pub fn add_rssi(&mut self, rssi: i8) -> SampleOutcome {
        self.record(|series, now| series.rssi.push(now, rssi))
    }

    pub fn add_packets_received(&mut self, count: u64) -> SampleOutcome {
        let outcome = self.record(|series, now| series.packets_received.push(now, count));
        if outcome == SampleOutcome::Recorded {
            self.packets_received += count;
            self.update_throughput();
        }
        outcome
    }

    pub fn add_packets_dropped(&mut self, count: u64) -> SampleOutcome {
        let outcome = self.record(|series, now| series.packets_dropped.push(now, count));
        if outcome == SampleOutcome::Recorded {
            self.packets_dropped += count;
            self.update_throughput();
        }
        outcome
    }

    fn record(&mut self, push: impl FnOnce(&mut SessionSeries, u64)) -> SampleOutcome {
        if self.check_time_limit() {
            return SampleOutcome::LimitReached;
        }
        if !self.started {
            return SampleOutcome::Ignored;
        }
        push(&mut self.series, self.clock.now_ms());
        SampleOutcome::Recorded
    }

    fn update_throughput(&mut self) {
        self.throughput = throughput_percent(self.packets_received, self.packets_dropped);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    pub fn packets_total(&self) -> u64 {
        self.packets_received + self.packets_dropped
    }

    /// Percentage of packets received, 0 when nothing was counted.
    pub fn throughput(&self) -> u8 {
        self.throughput
    }

    pub fn last_bpm(&self) -> u8 {
        self.series.bpm.last_value()
    }

    pub fn last_rr(&self) -> u32 {
        self.series.rr.last_value()
    }

    pub fn last_rssi(&self) -> i8 {
        self.series.rssi.last_value()
    }

    pub fn series(&self) -> &SessionSeries {
        &self.series
    }
}

/// `round(100 * received / (received + dropped))`, or 0 for no packets.
pub fn throughput_percent(received: u64, dropped: u64) -> u8 {
    let total = received + dropped;
    if total == 0 {
        return 0;
    }
    ((200 * received + total) / (2 * total)) as u8
}
