//! Message vocabulary shared between the engine and the radio transport.
//!
//! Every frame exchanged with the radio has the layout
//! `[length, message_id, channel, data...]`. Inbound frames are lifted into
//! [`RadioEvent`] and outbound requests are expressed as [`RadioCommand`].

use serde::{Deserialize, Serialize};

/// Offset of the message id in a raw frame.
pub const MESSAGE_ID_OFFSET: usize = 1;

/// Offset of the first data byte (the channel number) in a raw frame.
pub const MESSAGE_DATA_OFFSET: usize = 2;

/// Response code signalling success.
pub const RESPONSE_NO_ERROR: u8 = 0x00;

/// Message ids understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Marks a response frame as an unsolicited channel event.
    ChannelEvent,
    Version,
    ResponseEvent,
    UnassignChannel,
    AssignChannel,
    ChannelPeriod,
    SearchTimeout,
    RfFrequency,
    SystemReset,
    OpenChannel,
    CloseChannel,
    Request,
    BroadcastData,
    AcknowledgedData,
    BurstData,
    ChannelId,
    ChannelStatus,
    Capabilities,
    ExtBroadcastData,
    ExtAcknowledgedData,
    ExtBurstData,
    SerialNumber,
    LowPrioritySearchTimeout,
    LibConfig,
    Startup,
    ProximitySearch,
    EventBufferConfig,
    Unknown(u8),
}

impl MessageId {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => MessageId::ChannelEvent,
            0x3E => MessageId::Version,
            0x40 => MessageId::ResponseEvent,
            0x41 => MessageId::UnassignChannel,
            0x42 => MessageId::AssignChannel,
            0x43 => MessageId::ChannelPeriod,
            0x44 => MessageId::SearchTimeout,
            0x45 => MessageId::RfFrequency,
            0x4A => MessageId::SystemReset,
            0x4B => MessageId::OpenChannel,
            0x4C => MessageId::CloseChannel,
            0x4D => MessageId::Request,
            0x4E => MessageId::BroadcastData,
            0x4F => MessageId::AcknowledgedData,
            0x50 => MessageId::BurstData,
            0x51 => MessageId::ChannelId,
            0x52 => MessageId::ChannelStatus,
            0x54 => MessageId::Capabilities,
            0x5D => MessageId::ExtBroadcastData,
            0x5E => MessageId::ExtAcknowledgedData,
            0x5F => MessageId::ExtBurstData,
            0x61 => MessageId::SerialNumber,
            0x63 => MessageId::LowPrioritySearchTimeout,
            0x6E => MessageId::LibConfig,
            0x6F => MessageId::Startup,
            0x71 => MessageId::ProximitySearch,
            0x74 => MessageId::EventBufferConfig,
            other => MessageId::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            MessageId::ChannelEvent => 0x01,
            MessageId::Version => 0x3E,
            MessageId::ResponseEvent => 0x40,
            MessageId::UnassignChannel => 0x41,
            MessageId::AssignChannel => 0x42,
            MessageId::ChannelPeriod => 0x43,
            MessageId::SearchTimeout => 0x44,
            MessageId::RfFrequency => 0x45,
            MessageId::SystemReset => 0x4A,
            MessageId::OpenChannel => 0x4B,
            MessageId::CloseChannel => 0x4C,
            MessageId::Request => 0x4D,
            MessageId::BroadcastData => 0x4E,
            MessageId::AcknowledgedData => 0x4F,
            MessageId::BurstData => 0x50,
            MessageId::ChannelId => 0x51,
            MessageId::ChannelStatus => 0x52,
            MessageId::Capabilities => 0x54,
            MessageId::ExtBroadcastData => 0x5D,
            MessageId::ExtAcknowledgedData => 0x5E,
            MessageId::ExtBurstData => 0x5F,
            MessageId::SerialNumber => 0x61,
            MessageId::LowPrioritySearchTimeout => 0x63,
            MessageId::LibConfig => 0x6E,
            MessageId::Startup => 0x6F,
            MessageId::ProximitySearch => 0x71,
            MessageId::EventBufferConfig => 0x74,
            MessageId::Unknown(byte) => byte,
        }
    }
}

/// Unsolicited channel event codes carried in a response frame whose inner
/// message id is [`MessageId::ChannelEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEventCode {
    RxSearchTimeout,
    RxFail,
    Tx,
    TransferRxFailed,
    ChannelClosed,
    RxFailGoToSearch,
    ChannelCollision,
    Other(u8),
}

impl ChannelEventCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => ChannelEventCode::RxSearchTimeout,
            0x02 => ChannelEventCode::RxFail,
            0x03 => ChannelEventCode::Tx,
            0x04 => ChannelEventCode::TransferRxFailed,
            0x07 => ChannelEventCode::ChannelClosed,
            0x08 => ChannelEventCode::RxFailGoToSearch,
            0x09 => ChannelEventCode::ChannelCollision,
            other => ChannelEventCode::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            ChannelEventCode::RxSearchTimeout => 0x01,
            ChannelEventCode::RxFail => 0x02,
            ChannelEventCode::Tx => 0x03,
            ChannelEventCode::TransferRxFailed => 0x04,
            ChannelEventCode::ChannelClosed => 0x07,
            ChannelEventCode::RxFailGoToSearch => 0x08,
            ChannelEventCode::ChannelCollision => 0x09,
            ChannelEventCode::Other(byte) => byte,
        }
    }
}

/// Radio enablement transitions reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEnablement {
    Enabling,
    Enabled,
    Disabling,
    Disabled,
}

/// Events delivered by the radio transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEvent {
    /// The radio finished a system reset. `None` lets the channel lifecycle
    /// decide based on whether it issued the reset itself.
    Reset { solicited: Option<bool> },
    /// Response to a configuration request.
    Response {
        channel: u8,
        message_id: MessageId,
        code: u8,
    },
    /// Unsolicited event on a channel.
    ChannelEvent { channel: u8, code: ChannelEventCode },
    /// Broadcast or acknowledged data; `message` is the complete raw frame.
    BroadcastData { channel: u8, message: Vec<u8> },
    /// Channel id of the device paired on a channel.
    ChannelIdData { channel: u8, device_number: u16 },
    InterfaceClaimChanged { claimed: bool },
    EnablementChanged(RadioEnablement),
    AirplaneModeChanged { on: bool },
}

impl RadioEvent {
    /// Lift a raw radio frame into an event.
    ///
    /// Frames the engine has no use for (version, capabilities, burst data,
    /// ...) yield `Ok(None)`.
    pub fn from_message(message: &[u8]) -> Result<Option<Self>, TransportError> {
        if message.len() <= MESSAGE_DATA_OFFSET {
            return Err(TransportError::MalformedFrame(format!(
                "frame of {} bytes has no channel byte",
                message.len()
            )));
        }

        let channel = message[MESSAGE_DATA_OFFSET];
        let event = match MessageId::from_byte(message[MESSAGE_ID_OFFSET]) {
            MessageId::ResponseEvent => {
                let body = require(message, MESSAGE_DATA_OFFSET + 3, "response")?;
                let inner = MessageId::from_byte(body[MESSAGE_DATA_OFFSET + 1]);
                let code = body[MESSAGE_DATA_OFFSET + 2];
                if inner == MessageId::ChannelEvent {
                    RadioEvent::ChannelEvent {
                        channel,
                        code: ChannelEventCode::from_byte(code),
                    }
                } else {
                    RadioEvent::Response {
                        channel,
                        message_id: inner,
                        code,
                    }
                }
            }
            MessageId::BroadcastData | MessageId::AcknowledgedData => RadioEvent::BroadcastData {
                channel,
                message: message.to_vec(),
            },
            MessageId::ChannelId => {
                let body = require(message, MESSAGE_DATA_OFFSET + 3, "channel id")?;
                let device_number = u16::from_le_bytes([
                    body[MESSAGE_DATA_OFFSET + 1],
                    body[MESSAGE_DATA_OFFSET + 2],
                ]);
                RadioEvent::ChannelIdData {
                    channel,
                    device_number,
                }
            }
            MessageId::Startup => RadioEvent::Reset { solicited: None },
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

fn require<'a>(message: &'a [u8], len: usize, what: &str) -> Result<&'a [u8], TransportError> {
    if message.len() < len {
        Err(TransportError::MalformedFrame(format!(
            "{what} frame needs {len} bytes, got {}",
            message.len()
        )))
    } else {
        Ok(message)
    }
}

/// Channel direction requested at assignment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    /// Receive-only (slave) channel.
    Slave,
    Master,
}

impl ChannelType {
    pub fn as_byte(self) -> u8 {
        match self {
            ChannelType::Slave => 0x00,
            ChannelType::Master => 0x10,
        }
    }
}

/// Which search timeout a [`RadioCommand::SetSearchTimeout`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPriority {
    High,
    Low,
}

/// Requests issued to the radio. All are fire-and-forget; the outcome arrives
/// later as a [`RadioEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioCommand {
    AssignChannel {
        channel: u8,
        channel_type: ChannelType,
        network: u8,
    },
    SetChannelId {
        channel: u8,
        device_number: u16,
        device_type: u8,
        transmission_type: u8,
    },
    SetChannelPeriod { channel: u8, period: u16 },
    SetRfFrequency { channel: u8, frequency: u8 },
    SetSearchTimeout {
        channel: u8,
        priority: SearchPriority,
        timeout: u8,
    },
    SetProximitySearch { channel: u8, bin: u8 },
    OpenChannel { channel: u8 },
    CloseChannel { channel: u8 },
    UnassignChannel { channel: u8 },
    /// Pre-framed configuration message (`[length, message_id, payload...]`).
    SendRawConfig(Vec<u8>),
    RequestMessage { channel: u8, message_id: MessageId },
    ResetSystem,
    ConfigureEventBuffering { threshold: u16 },
    DisableEventBuffering,
    EnableRadio,
    DisableRadio,
}

impl RadioCommand {
    /// Message id the radio echoes when it responds to this command, if it
    /// responds with a response frame at all.
    pub fn response_id(&self) -> Option<MessageId> {
        match self {
            RadioCommand::AssignChannel { .. } => Some(MessageId::AssignChannel),
            RadioCommand::SetChannelId { .. } => Some(MessageId::ChannelId),
            RadioCommand::SetChannelPeriod { .. } => Some(MessageId::ChannelPeriod),
            RadioCommand::SetRfFrequency { .. } => Some(MessageId::RfFrequency),
            RadioCommand::SetSearchTimeout {
                priority: SearchPriority::High,
                ..
            } => Some(MessageId::SearchTimeout),
            RadioCommand::SetSearchTimeout {
                priority: SearchPriority::Low,
                ..
            } => Some(MessageId::LowPrioritySearchTimeout),
            RadioCommand::SetProximitySearch { .. } => Some(MessageId::ProximitySearch),
            RadioCommand::OpenChannel { .. } => Some(MessageId::OpenChannel),
            RadioCommand::CloseChannel { .. } => Some(MessageId::CloseChannel),
            RadioCommand::UnassignChannel { .. } => Some(MessageId::UnassignChannel),
            RadioCommand::SendRawConfig(bytes) => {
                bytes.get(MESSAGE_ID_OFFSET).map(|id| MessageId::from_byte(*id))
            }
            RadioCommand::ConfigureEventBuffering { .. } | RadioCommand::DisableEventBuffering => {
                Some(MessageId::EventBufferConfig)
            }
            RadioCommand::RequestMessage { .. }
            | RadioCommand::ResetSystem
            | RadioCommand::EnableRadio
            | RadioCommand::DisableRadio => None,
        }
    }

    /// Channel the command addresses, if any.
    pub fn channel(&self) -> Option<u8> {
        match self {
            RadioCommand::AssignChannel { channel, .. }
            | RadioCommand::SetChannelId { channel, .. }
            | RadioCommand::SetChannelPeriod { channel, .. }
            | RadioCommand::SetRfFrequency { channel, .. }
            | RadioCommand::SetSearchTimeout { channel, .. }
            | RadioCommand::SetProximitySearch { channel, .. }
            | RadioCommand::OpenChannel { channel }
            | RadioCommand::CloseChannel { channel }
            | RadioCommand::UnassignChannel { channel }
            | RadioCommand::RequestMessage { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

/// The narrow interface the engine needs from the radio.
pub trait RadioTransport {
    /// Issue a command. Returning `Ok` only means the request was accepted
    /// for delivery.
    fn send(&mut self, command: RadioCommand) -> Result<(), TransportError>;
}

/// Errors raised by a radio transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The radio service is not reachable.
    NotConnected,
    /// The transport refused the request.
    Rejected(String),
    /// An inbound frame could not be parsed.
    MalformedFrame(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Radio transport is not connected"),
            TransportError::Rejected(e) => write!(f, "Radio rejected request: {e}"),
            TransportError::MalformedFrame(e) => write!(f, "Malformed radio frame: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Render a frame as `[AA][BB]...` for trace logging.
pub fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("[{b:02X}]")).collect()
}
