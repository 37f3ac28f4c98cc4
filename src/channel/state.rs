//! Channel status, channel configuration and radio status types.

use serde::{Deserialize, Serialize};

/// Device number that pairs with any sensor.
pub const WILDCARD: u16 = 0;

/// Channel used for the heart-rate sensor.
pub const HRM_CHANNEL: u8 = 0;

/// Network the sensor broadcasts on (ANT+).
pub const HRM_NETWORK: u8 = 1;

/// Device type of a heart-rate sensor.
pub const HRM_DEVICE_TYPE: u8 = 0x78;

/// Channel period in 1/32768 s (~4.06 Hz).
pub const HRM_PERIOD: u16 = 8070;

/// RF frequency offset from 2400 MHz.
pub const HRM_RF_FREQUENCY: u8 = 57;

/// High-priority search timeout; zero disables high-priority search.
pub const HIGH_PRIORITY_SEARCH_TIMEOUT: u8 = 0;

/// Low-priority search timeout in 2.5 s units (30 s).
pub const LOW_PRIORITY_SEARCH_TIMEOUT: u8 = 12;

/// Lib-config flag requesting RSSI extended data on every broadcast.
pub const LIB_CONFIG_RSSI: u8 = 0x40;

/// Public status of the monitored channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Explicitly closed or never opened.
    Closed,
    /// Open requested; waiting for a reset or for the handshake to finish.
    PendingOpen,
    /// Open, nothing received yet.
    Searching,
    /// Open, most recently received status data.
    TrackingStatus,
    /// Open, most recently received measurement data.
    TrackingData,
    /// Closed by a search timeout.
    Offline,
}

impl ChannelState {
    /// The radio may be released only from these states.
    pub fn is_released(self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Offline)
    }

    pub fn is_tracking(self) -> bool {
        matches!(
            self,
            ChannelState::TrackingStatus | ChannelState::TrackingData
        )
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ChannelState::Closed => "closed",
            ChannelState::PendingOpen => "pending open",
            ChannelState::Searching => "searching",
            ChannelState::TrackingStatus => "tracking status",
            ChannelState::TrackingData => "tracking data",
            ChannelState::Offline => "offline",
        };
        f.write_str(text)
    }
}

/// Parameters the open handshake sends to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub device_number: u16,
    pub device_type: u8,
    pub transmission_type: u8,
    pub period: u16,
    pub frequency: u8,
    pub proximity_bin: u8,
    /// Open handshake in progress.
    pub initializing: bool,
    /// Close handshake in progress.
    pub deinitializing: bool,
}

impl ChannelConfig {
    /// Heart-rate channel parameters for the given pairing settings.
    /// Transmission type 0 searches for any transmission type.
    pub fn heart_rate(device_number: u16, proximity_bin: u8) -> Self {
        Self {
            device_number,
            device_type: HRM_DEVICE_TYPE,
            transmission_type: 0,
            period: HRM_PERIOD,
            frequency: HRM_RF_FREQUENCY,
            proximity_bin,
            initializing: false,
            deinitializing: false,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.device_number == WILDCARD
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::heart_rate(WILDCARD, 0)
    }
}

/// Radio-level preconditions tracked alongside the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioStatus {
    /// Assume disabled until the transport says otherwise.
    pub enabled: bool,
    pub enabling: bool,
    pub disabling: bool,
    pub interface_claimed: bool,
    pub airplane_mode: bool,
}

impl RadioStatus {
    /// Summarise the radio for display. Earlier conditions win.
    pub fn state(&self) -> RadioState {
        if self.airplane_mode {
            RadioState::AirplaneMode
        } else if self.enabling {
            RadioState::Enabling
        } else if self.disabling {
            RadioState::Disabling
        } else if !self.enabled {
            RadioState::Disabled
        } else if !self.interface_claimed {
            RadioState::InUse
        } else {
            RadioState::Ready
        }
    }

    /// Can the channel be configured right now?
    pub fn is_usable(&self) -> bool {
        self.state() == RadioState::Ready
    }
}

/// Radio summary shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioState {
    AirplaneMode,
    Enabling,
    Disabling,
    Disabled,
    /// Another application holds the radio interface.
    InUse,
    Ready,
}

impl std::fmt::Display for RadioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RadioState::AirplaneMode => "Airplane mode",
            RadioState::Enabling => "Enabling",
            RadioState::Disabling => "Disabling",
            RadioState::Disabled => "Disabled",
            RadioState::InUse => "In use by another application",
            RadioState::Ready => "Ready",
        };
        f.write_str(text)
    }
}
