//! Channel management for the heart-rate sensor.
//!
//! This module contains:
//! - Channel, channel configuration and radio status types
//! - The lifecycle state machine driving the open/close handshakes

pub mod lifecycle;
pub mod state;

// Re-export commonly used types
pub use lifecycle::{ChannelError, ChannelLifecycle, HandshakeStep, LifecycleNotice};
pub use state::{
    ChannelConfig, ChannelState, RadioState, RadioStatus, HRM_CHANNEL, HRM_DEVICE_TYPE,
    HRM_NETWORK, WILDCARD,
};
