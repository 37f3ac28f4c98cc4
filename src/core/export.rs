//! Session export.
//!
//! Produces a self-describing JSON document for one session: who produced
//! it, where it was received, the sensor that sent it, the link statistics
//! and every collected series.

use crate::core::decoder::HrmTelemetry;
use crate::core::session::{SessionRecord, SessionSeries};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Version of the export document layout.
pub const EXPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "hrmon-agent";

/// Producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProducer {
    pub name: String,
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// Sensor identification decoded from the data pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_number: u16,
    pub manufacturer_id: u8,
    pub serial_number: u32,
    pub hardware_version: u8,
    pub software_version: u8,
    pub model_number: u8,
    /// Cumulative operating time in seconds
    pub operating_time: u32,
}

impl From<&HrmTelemetry> for DeviceInfo {
    fn from(t: &HrmTelemetry) -> Self {
        Self {
            device_number: t.device_number,
            manufacturer_id: t.manufacturer_id,
            serial_number: t.serial_number,
            hardware_version: t.hardware_version,
            software_version: t.software_version,
            model_number: t.model_number,
            operating_time: t.operating_time,
        }
    }
}

/// Radio link statistics for the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStats {
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_total: u64,
    /// Percentage of packets received
    pub throughput: u8,
}

/// A complete exported session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub export_version: String,
    pub session_id: String,
    pub producer: ExportProducer,
    /// Host that received the sensor data
    pub receiving_host: String,
    /// Export time (RFC3339)
    pub exported_at: String,
    pub elapsed_ms: u64,
    pub device: DeviceInfo,
    pub link: LinkStats,
    pub series: SessionSeries,
}

impl SessionExport {
    /// Convert the export to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse an export from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to `dir` as `session_<timestamp>.json`, returning the path.
    pub fn save_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let stamp = DateTime::parse_from_rfc3339(&self.exported_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let path = dir.join(format!("session_{}.json", stamp.format("%Y%m%d_%H%M%S")));

        std::fs::create_dir_all(dir)?;
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Builder for session exports.
pub struct ExportBuilder {
    instance_id: Uuid,
    session_id: Uuid,
}

impl ExportBuilder {
    /// Create a builder with fresh instance and session ids.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        }
    }

    /// Use a specific session id.
    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Start a new session id (called when a session is restarted).
    pub fn next_session(&mut self) {
        self.session_id = Uuid::new_v4();
    }

    pub fn build(&self, session: &SessionRecord, telemetry: &HrmTelemetry) -> SessionExport {
        let receiving_host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        SessionExport {
            export_version: EXPORT_VERSION.to_string(),
            session_id: self.session_id.to_string(),
            producer: ExportProducer {
                name: PRODUCER_NAME.to_string(),
                version: crate::VERSION.to_string(),
                instance_id: self.instance_id.to_string(),
            },
            receiving_host,
            exported_at: Utc::now().to_rfc3339(),
            elapsed_ms: session.elapsed_ms(),
            device: DeviceInfo::from(telemetry),
            link: LinkStats {
                packets_received: session.packets_received(),
                packets_dropped: session.packets_dropped(),
                packets_total: session.packets_total(),
                throughput: session.throughput(),
            },
            series: session.series().clone(),
        }
    }
}

impl Default for ExportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
