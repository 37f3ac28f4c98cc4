//! Core functionality for the heart-rate monitor agent.
//!
//! This module contains:
//! - Broadcast decoding into heart-rate telemetry
//! - Session aggregation into timestamped series
//! - Session export
//! - Clocks for timestamping samples

pub mod clock;
pub mod decoder;
pub mod export;
pub mod series;
pub mod session;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use decoder::{
    rr_interval_ms, BroadcastDecoder, BroadcastFrame, DataPage, DecodeError, HrmTelemetry,
    PageState, TelemetryEvent,
};
pub use export::{DeviceInfo, ExportBuilder, SessionExport, EXPORT_VERSION, PRODUCER_NAME};
pub use series::TimestampedSeries;
pub use session::{
    throughput_percent, SampleOutcome, SessionRecord, SessionSeries, SESSION_TIME_LIMIT_MS,
};
