//! Heart-rate monitor agent - channel engine for wireless heart-rate sensors.
//!
//! This library pairs with a heart-rate strap over a low-power radio channel,
//! decodes its broadcast data pages and aggregates the telemetry into
//! sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      HeartRateMonitor                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  RadioEvent queue                                             │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │   Channel   │──▶│  Broadcast  │──▶│   Session   │          │
//! │  │  Lifecycle  │   │   Decoder   │   │   Record    │          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘          │
//! │        │                                    │                 │
//! │        ▼                                    ▼                 │
//! │  ┌─────────────┐                     ┌─────────────┐          │
//! │  │ RadioCommand│                     │   Export    │          │
//! │  │  transport  │                     │   (JSON)    │          │
//! │  └─────────────┘                     └─────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hrmon_agent::{
//!     event_queue, HeartRateMonitor, SensorSettings, SimulatedRadio, SimulatedSensor,
//!     SystemClock,
//! };
//! use std::sync::Arc;
//!
//! let (tx, rx) = event_queue();
//! let radio = SimulatedRadio::new(tx.clone(), SimulatedSensor::new(0x1234, 64));
//! let mut monitor = HeartRateMonitor::new(
//!     radio,
//!     (tx, rx),
//!     SensorSettings::default(),
//!     Arc::new(SystemClock::new()),
//! );
//!
//! monitor.connect_sensor();
//! monitor.pump();
//! ```

pub mod channel;
pub mod config;
pub mod core;
pub mod link;
pub mod monitor;
pub mod transport;

// Re-export key types at crate root for convenience
pub use channel::{ChannelError, ChannelLifecycle, ChannelState, RadioState};
pub use config::{Config, ConfigError, SensorSettings};
pub use core::{
    BroadcastDecoder, Clock, HrmTelemetry, ManualClock, SessionExport, SessionRecord,
    SystemClock, TelemetryEvent, TimestampedSeries,
};
pub use link::{LinkCounters, SharedLinkCounters};
pub use monitor::{event_queue, HeartRateMonitor, MonitorError, MonitorEvent};
pub use transport::{
    QueueTransport, RadioCommand, RadioEvent, RadioTransport, SimulatedRadio, SimulatedSensor,
    TransportError,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
