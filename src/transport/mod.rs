//! Radio transport module.
//!
//! This module defines the narrow request/response/event interface the
//! engine consumes, plus two transports: a queue for an external radio
//! service and an in-process simulator.

pub mod queue;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use queue::QueueTransport;
pub use simulated::{SimulatedRadio, SimulatedSensor};
pub use types::{
    hex_string, ChannelEventCode, ChannelType, MessageId, RadioCommand, RadioEnablement,
    RadioEvent, RadioTransport, SearchPriority, TransportError, MESSAGE_DATA_OFFSET,
    MESSAGE_ID_OFFSET, RESPONSE_NO_ERROR,
};
