//! Channel lifecycle state machine.
//!
//! Drives the open handshake (assign, channel id, period, frequency, search
//! timeouts, optional proximity search, open) and the close handshake
//! (close, channel-closed event, unassign). Each step is issued only after
//! the radio acknowledged the previous one. Any error response halts the
//! handshake; recovery is an explicit close/reopen or reset.
//!
//! The lifecycle never talks to consumers directly. Every observable change
//! is queued as a [`LifecycleNotice`] and collected with
//! [`ChannelLifecycle::take_notices`].

use crate::channel::state::{
    ChannelConfig, ChannelState, RadioState, RadioStatus, HIGH_PRIORITY_SEARCH_TIMEOUT,
    HRM_CHANNEL, HRM_NETWORK, LIB_CONFIG_RSSI, LOW_PRIORITY_SEARCH_TIMEOUT,
};
use crate::config::SensorSettings;
use crate::transport::{
    ChannelEventCode, ChannelType, MessageId, RadioCommand, RadioEnablement, RadioTransport,
    SearchPriority, TransportError, RESPONSE_NO_ERROR,
};
use tracing::{debug, error, info, warn};

/// One step of the open handshake, named after the request awaiting its
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    AssignChannel,
    ChannelId,
    Period,
    RfFrequency,
    HighPrioritySearchTimeout,
    LowPrioritySearchTimeout,
    ProximitySearch,
    OpenChannel,
}

impl HandshakeStep {
    /// Message id of the response that completes this step.
    pub fn response_id(self) -> MessageId {
        match self {
            HandshakeStep::AssignChannel => MessageId::AssignChannel,
            HandshakeStep::ChannelId => MessageId::ChannelId,
            HandshakeStep::Period => MessageId::ChannelPeriod,
            HandshakeStep::RfFrequency => MessageId::RfFrequency,
            HandshakeStep::HighPrioritySearchTimeout => MessageId::SearchTimeout,
            HandshakeStep::LowPrioritySearchTimeout => MessageId::LowPrioritySearchTimeout,
            HandshakeStep::ProximitySearch => MessageId::ProximitySearch,
            HandshakeStep::OpenChannel => MessageId::OpenChannel,
        }
    }

    fn is_handshake_message(message_id: MessageId) -> bool {
        [
            HandshakeStep::AssignChannel,
            HandshakeStep::ChannelId,
            HandshakeStep::Period,
            HandshakeStep::RfFrequency,
            HandshakeStep::HighPrioritySearchTimeout,
            HandshakeStep::LowPrioritySearchTimeout,
            HandshakeStep::ProximitySearch,
            HandshakeStep::OpenChannel,
        ]
        .iter()
        .any(|step| step.response_id() == message_id)
    }
}

/// Errors surfaced by the channel lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The radio answered a handshake request with a non-zero code.
    Protocol {
        channel: u8,
        message_id: MessageId,
        code: u8,
    },
    /// A request could not be handed to the transport.
    Transport(TransportError),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Protocol {
                channel,
                message_id,
                code,
            } => write!(
                f,
                "Error code {code:#04x} on message id {:#04x} on channel {channel}",
                message_id.as_byte()
            ),
            ChannelError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<TransportError> for ChannelError {
    fn from(e: TransportError) -> Self {
        ChannelError::Transport(e)
    }
}

/// Observable changes produced by the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleNotice {
    StateChanged(ChannelState),
    RadioStateChanged(RadioState),
    DeviceNumberLearned(u16),
    Error(ChannelError),
}

/// State machine for the single monitored channel.
pub struct ChannelLifecycle {
    channel: u8,
    network: u8,
    settings: SensorSettings,
    config: ChannelConfig,
    state: ChannelState,
    radio: RadioStatus,
    step: Option<HandshakeStep>,
    deferred_open: bool,
    reset_requested: bool,
    last_error: Option<ChannelError>,
    notices: Vec<LifecycleNotice>,
}

impl ChannelLifecycle {
    /// Create a lifecycle for the heart-rate channel.
    pub fn new(settings: SensorSettings) -> Self {
        Self {
            channel: HRM_CHANNEL,
            network: HRM_NETWORK,
            settings,
            config: ChannelConfig::heart_rate(settings.device_number, settings.proximity_bin),
            state: ChannelState::Closed,
            radio: RadioStatus::default(),
            step: None,
            deferred_open: false,
            reset_requested: false,
            last_error: None,
            notices: Vec::new(),
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn settings(&self) -> SensorSettings {
        self.settings
    }

    /// Replace the pairing settings. Takes effect on the next open.
    pub fn set_settings(&mut self, settings: SensorSettings) {
        self.settings = settings;
    }

    pub fn radio(&self) -> RadioStatus {
        self.radio
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio.state()
    }

    /// Handshake step currently awaiting a response.
    pub fn pending_step(&self) -> Option<HandshakeStep> {
        self.step
    }

    pub fn is_open_deferred(&self) -> bool {
        self.deferred_open
    }

    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    /// Whether the channel holds radio resources (anything but closed/offline).
    pub fn is_channel_open(&self) -> bool {
        !self.state.is_released()
    }

    /// Take the notices queued since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<LifecycleNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Open the channel.
    ///
    /// With `deferred` the open waits for the next solicited reset, since a
    /// reset wipes every channel assignment.
    pub fn open(&mut self, deferred: bool, transport: &mut dyn RadioTransport) {
        if deferred {
            info!(channel = self.channel, "Open deferred until next reset");
            self.deferred_open = true;
            self.set_state(ChannelState::PendingOpen);
            return;
        }

        self.config = ChannelConfig::heart_rate(
            self.settings.device_number,
            self.settings.proximity_bin,
        );
        self.config.initializing = true;
        self.config.deinitializing = false;
        self.last_error = None;
        self.set_state(ChannelState::PendingOpen);

        info!(
            channel = self.channel,
            device_number = self.config.device_number,
            "Starting open handshake"
        );

        // Ask for RSSI extended data on every broadcast.
        let lib_config = vec![0x02, MessageId::LibConfig.as_byte(), 0x00, LIB_CONFIG_RSSI];
        if !self.issue(transport, RadioCommand::SendRawConfig(lib_config)) {
            return;
        }

        self.step = Some(HandshakeStep::AssignChannel);
        self.issue(
            transport,
            RadioCommand::AssignChannel {
                channel: self.channel,
                channel_type: ChannelType::Slave,
                network: self.network,
            },
        );
    }

    /// Close the channel. The channel is unassigned once the radio reports it
    /// closed. No-op when already closed.
    pub fn close(&mut self, transport: &mut dyn RadioTransport) {
        match self.state {
            ChannelState::Closed => return,
            ChannelState::Offline => {
                // A search timeout already unassigned the channel.
                self.set_state(ChannelState::Closed);
                return;
            }
            _ => {}
        }

        if self.deferred_open && !self.config.initializing {
            info!(channel = self.channel, "Cancelling deferred open");
            self.deferred_open = false;
            self.set_state(ChannelState::Closed);
            return;
        }

        self.step = None;
        self.config.initializing = false;
        self.config.deinitializing = true;
        self.set_state(ChannelState::Closed);

        if let Err(e) = transport.send(RadioCommand::CloseChannel {
            channel: self.channel,
        }) {
            warn!(channel = self.channel, "Could not cleanly close channel: {e}");
            self.config.deinitializing = false;
            self.fail(ChannelError::Transport(e));
        }
    }

    /// Request a radio reset. A deferred open proceeds once it completes.
    pub fn request_reset(&mut self, transport: &mut dyn RadioTransport) {
        self.reset_requested = true;
        if let Err(e) = transport.send(RadioCommand::ResetSystem) {
            error!("Could not reset radio: {e}");
            self.reset_requested = false;
            if self.deferred_open {
                self.deferred_open = false;
                self.set_state(ChannelState::Closed);
            }
            self.fail(ChannelError::Transport(e));
        }
    }

    /// The radio completed a reset. `solicited` defaults to whether this
    /// lifecycle requested one.
    pub fn on_reset(&mut self, solicited: Option<bool>, transport: &mut dyn RadioTransport) {
        let solicited = solicited.unwrap_or(self.reset_requested);

        // A reset clears every channel assignment on the radio.
        self.step = None;
        self.config.initializing = false;
        self.config.deinitializing = false;

        if !solicited {
            info!("Unsolicited radio reset, closing channel");
            self.reset_requested = false;
            self.deferred_open = false;
            self.set_state(ChannelState::Closed);
            return;
        }

        debug!("Solicited radio reset completed");
        self.reset_requested = false;
        self.apply_radio_configuration(transport);

        if self.deferred_open {
            self.deferred_open = false;
            self.open(false, transport);
        } else if !self.state.is_released() {
            self.set_state(ChannelState::Closed);
        }
    }

    /// Dispatch a response to one of our requests.
    pub fn on_response(
        &mut self,
        channel: u8,
        message_id: MessageId,
        code: u8,
        transport: &mut dyn RadioTransport,
    ) {
        if channel != self.channel {
            debug!(channel, "Ignoring response for unmonitored channel");
            return;
        }

        if self.config.initializing {
            self.on_handshake_response(message_id, code, transport);
        } else if self.config.deinitializing {
            if message_id == MessageId::UnassignChannel && code == RESPONSE_NO_ERROR {
                debug!(channel, "Channel unassigned, close handshake complete");
                self.config.deinitializing = false;
            }
        } else if code != RESPONSE_NO_ERROR {
            warn!(
                channel,
                code,
                message_id = message_id.as_byte(),
                "Error response outside a handshake"
            );
        }
    }

    fn on_handshake_response(
        &mut self,
        message_id: MessageId,
        code: u8,
        transport: &mut dyn RadioTransport,
    ) {
        let Some(step) = self.step else {
            return;
        };

        if code != RESPONSE_NO_ERROR {
            if HandshakeStep::is_handshake_message(message_id) {
                error!(
                    "Error code({code:#04x}) on message ID({:#04x}) on channel {}",
                    message_id.as_byte(),
                    self.channel
                );
                self.step = None;
                self.config.initializing = false;
                self.fail(ChannelError::Protocol {
                    channel: self.channel,
                    message_id,
                    code,
                });
            } else {
                warn!(
                    code,
                    message_id = message_id.as_byte(),
                    "Configuration message rejected during handshake"
                );
            }
            return;
        }

        if message_id != step.response_id() {
            debug!(
                ?step,
                message_id = message_id.as_byte(),
                "Ignoring response out of handshake order"
            );
            return;
        }

        let channel = self.channel;
        let (next, command) = match step {
            HandshakeStep::AssignChannel => (
                HandshakeStep::ChannelId,
                RadioCommand::SetChannelId {
                    channel,
                    device_number: self.config.device_number,
                    device_type: self.config.device_type,
                    transmission_type: self.config.transmission_type,
                },
            ),
            HandshakeStep::ChannelId => (
                HandshakeStep::Period,
                RadioCommand::SetChannelPeriod {
                    channel,
                    period: self.config.period,
                },
            ),
            HandshakeStep::Period => (
                HandshakeStep::RfFrequency,
                RadioCommand::SetRfFrequency {
                    channel,
                    frequency: self.config.frequency,
                },
            ),
            HandshakeStep::RfFrequency => (
                HandshakeStep::HighPrioritySearchTimeout,
                RadioCommand::SetSearchTimeout {
                    channel,
                    priority: SearchPriority::High,
                    timeout: HIGH_PRIORITY_SEARCH_TIMEOUT,
                },
            ),
            HandshakeStep::HighPrioritySearchTimeout => (
                HandshakeStep::LowPrioritySearchTimeout,
                RadioCommand::SetSearchTimeout {
                    channel,
                    priority: SearchPriority::Low,
                    timeout: LOW_PRIORITY_SEARCH_TIMEOUT,
                },
            ),
            HandshakeStep::LowPrioritySearchTimeout if self.config.is_wildcard() => (
                HandshakeStep::ProximitySearch,
                RadioCommand::SetProximitySearch {
                    channel,
                    bin: self.config.proximity_bin,
                },
            ),
            HandshakeStep::LowPrioritySearchTimeout | HandshakeStep::ProximitySearch => {
                (HandshakeStep::OpenChannel, RadioCommand::OpenChannel { channel })
            }
            HandshakeStep::OpenChannel => {
                self.step = None;
                self.config.initializing = false;
                info!(channel, "Channel open, searching");
                self.set_state(ChannelState::Searching);
                return;
            }
        };

        debug!(?next, "Handshake advancing");
        self.step = Some(next);
        self.issue(transport, command);
    }

    /// Dispatch an unsolicited channel event.
    pub fn on_channel_event(
        &mut self,
        channel: u8,
        code: ChannelEventCode,
        transport: &mut dyn RadioTransport,
    ) {
        if channel != self.channel {
            return;
        }

        match code {
            ChannelEventCode::RxSearchTimeout => self.on_search_timeout(transport),
            ChannelEventCode::ChannelClosed if self.config.deinitializing => {
                debug!(channel, "Channel closed, unassigning");
                if let Err(e) = transport.send(RadioCommand::UnassignChannel { channel }) {
                    // Already closed; only the assignment is left behind.
                    warn!(channel, "Could not unassign closed channel: {e}");
                    self.config.deinitializing = false;
                }
            }
            _ => {}
        }
    }

    /// The sensor was not found in time: go offline and release the channel.
    pub fn on_search_timeout(&mut self, transport: &mut dyn RadioTransport) {
        info!(channel = self.channel, "Search timeout");
        self.step = None;
        self.config.initializing = false;
        self.config.deinitializing = false;
        self.set_state(ChannelState::Offline);

        if let Err(e) = transport.send(RadioCommand::UnassignChannel {
            channel: self.channel,
        }) {
            self.fail(ChannelError::Transport(e));
        }
    }

    /// Measurement data arrived on `channel`. Returns whether it belongs to
    /// the monitored channel.
    pub fn on_data(&mut self, channel: u8) -> bool {
        if channel != self.channel {
            return false;
        }
        if self.state != ChannelState::Closed {
            self.set_state(ChannelState::TrackingData);
        }
        true
    }

    /// The radio reported the id of the device paired on `channel`.
    pub fn on_channel_id(&mut self, channel: u8, device_number: u16) {
        if channel != self.channel || device_number == self.settings.device_number {
            return;
        }
        info!(device_number, "Learned sensor device number");
        self.settings.device_number = device_number;
        self.notices
            .push(LifecycleNotice::DeviceNumberLearned(device_number));
    }

    pub fn on_enablement_changed(&mut self, enablement: RadioEnablement) {
        let before = self.radio.state();
        match enablement {
            RadioEnablement::Enabling => {
                self.radio.enabling = true;
                self.radio.disabling = false;
            }
            RadioEnablement::Enabled => {
                self.radio.enabled = true;
                self.radio.enabling = false;
                self.radio.disabling = false;
            }
            RadioEnablement::Disabling => {
                self.radio.enabling = false;
                self.radio.disabling = true;
            }
            RadioEnablement::Disabled => {
                self.radio.enabled = false;
                self.radio.enabling = false;
                self.radio.disabling = false;
                self.force_closed();
            }
        }
        self.notify_radio(before);
    }

    pub fn on_interface_claim_changed(&mut self, claimed: bool) {
        let before = self.radio.state();
        let was_claimed = self.radio.interface_claimed;
        self.radio.interface_claimed = claimed;
        if was_claimed && !claimed {
            info!("Radio interface claimed by another application");
            self.force_closed();
        }
        self.notify_radio(before);
    }

    pub fn on_airplane_mode_changed(&mut self, on: bool) {
        let before = self.radio.state();
        self.radio.airplane_mode = on;
        if on {
            self.force_closed();
        }
        self.notify_radio(before);
    }

    /// Reset the channel to closed without talking to the radio (error
    /// recovery).
    pub fn clear_channel_state(&mut self) {
        self.force_closed();
    }

    fn force_closed(&mut self) {
        self.step = None;
        self.deferred_open = false;
        self.config.initializing = false;
        self.config.deinitializing = false;
        self.set_state(ChannelState::Closed);
    }

    /// Re-apply radio-wide settings wiped by a reset.
    fn apply_radio_configuration(&mut self, transport: &mut dyn RadioTransport) {
        if !(self.radio.enabled && self.radio.interface_claimed) {
            info!("Can't set event buffering right now");
            return;
        }

        let command = if self.settings.buffer_threshold > 0 {
            RadioCommand::ConfigureEventBuffering {
                threshold: self.settings.buffer_threshold,
            }
        } else {
            RadioCommand::DisableEventBuffering
        };
        if let Err(e) = transport.send(command) {
            error!("Could not configure event buffering: {e}");
        }
    }

    /// Send a handshake request; on failure the handshake halts.
    fn issue(&mut self, transport: &mut dyn RadioTransport, command: RadioCommand) -> bool {
        match transport.send(command) {
            Ok(()) => true,
            Err(e) => {
                error!(channel = self.channel, "Handshake request failed: {e}");
                self.step = None;
                self.config.initializing = false;
                self.fail(ChannelError::Transport(e));
                false
            }
        }
    }

    fn fail(&mut self, error: ChannelError) {
        self.last_error = Some(error.clone());
        self.notices.push(LifecycleNotice::Error(error));
    }

    fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            info!(channel = self.channel, from = %self.state, to = %state, "Channel state changed");
            self.state = state;
            self.notices.push(LifecycleNotice::StateChanged(state));
        }
    }

    fn notify_radio(&mut self, before: RadioState) {
        let after = self.radio.state();
        if after != before {
            info!(%after, "Radio state changed");
            self.notices.push(LifecycleNotice::RadioStateChanged(after));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::state::{HRM_DEVICE_TYPE, HRM_PERIOD, HRM_RF_FREQUENCY, WILDCARD};
    use crate::transport::QueueTransport;

    fn ok(lifecycle: &mut ChannelLifecycle, transport: &mut QueueTransport, id: MessageId) {
        lifecycle.on_response(HRM_CHANNEL, id, RESPONSE_NO_ERROR, transport);
    }

    fn settings(device_number: u16) -> SensorSettings {
        SensorSettings {
            device_number,
            ..SensorSettings::default()
        }
    }

    #[test]
    fn test_open_handshake_wildcard() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));

        lifecycle.open(false, &mut transport);
        assert_eq!(lifecycle.state(), ChannelState::PendingOpen);
        assert!(lifecycle.config().initializing);

        let sent = transport.drain();
        assert!(matches!(sent[0], RadioCommand::SendRawConfig(_)));
        assert_eq!(
            sent[1],
            RadioCommand::AssignChannel {
                channel: HRM_CHANNEL,
                channel_type: ChannelType::Slave,
                network: HRM_NETWORK,
            }
        );

        for id in [
            MessageId::AssignChannel,
            MessageId::ChannelId,
            MessageId::ChannelPeriod,
            MessageId::RfFrequency,
            MessageId::SearchTimeout,
            MessageId::LowPrioritySearchTimeout,
            MessageId::ProximitySearch,
        ] {
            ok(&mut lifecycle, &mut transport, id);
        }

        let sent = transport.drain();
        assert_eq!(
            sent,
            vec![
                RadioCommand::SetChannelId {
                    channel: HRM_CHANNEL,
                    device_number: WILDCARD,
                    device_type: HRM_DEVICE_TYPE,
                    transmission_type: 0,
                },
                RadioCommand::SetChannelPeriod {
                    channel: HRM_CHANNEL,
                    period: HRM_PERIOD,
                },
                RadioCommand::SetRfFrequency {
                    channel: HRM_CHANNEL,
                    frequency: HRM_RF_FREQUENCY,
                },
                RadioCommand::SetSearchTimeout {
                    channel: HRM_CHANNEL,
                    priority: SearchPriority::High,
                    timeout: HIGH_PRIORITY_SEARCH_TIMEOUT,
                },
                RadioCommand::SetSearchTimeout {
                    channel: HRM_CHANNEL,
                    priority: SearchPriority::Low,
                    timeout: LOW_PRIORITY_SEARCH_TIMEOUT,
                },
                RadioCommand::SetProximitySearch {
                    channel: HRM_CHANNEL,
                    bin: 7,
                },
                RadioCommand::OpenChannel {
                    channel: HRM_CHANNEL
                },
            ]
        );

        ok(&mut lifecycle, &mut transport, MessageId::OpenChannel);
        assert_eq!(lifecycle.state(), ChannelState::Searching);
        assert!(!lifecycle.config().initializing);
        assert_eq!(lifecycle.pending_step(), None);
    }

    #[test]
    fn test_paired_device_skips_proximity_search() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(4242));
        lifecycle.open(false, &mut transport);

        for id in [
            MessageId::AssignChannel,
            MessageId::ChannelId,
            MessageId::ChannelPeriod,
            MessageId::RfFrequency,
            MessageId::SearchTimeout,
            MessageId::LowPrioritySearchTimeout,
        ] {
            ok(&mut lifecycle, &mut transport, id);
        }

        let sent = transport.drain();
        assert_eq!(
            sent.last(),
            Some(&RadioCommand::OpenChannel {
                channel: HRM_CHANNEL
            })
        );
        assert!(!sent
            .iter()
            .any(|c| matches!(c, RadioCommand::SetProximitySearch { .. })));
    }

    #[test]
    fn test_out_of_order_response_does_not_advance() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);
        transport.drain();

        ok(&mut lifecycle, &mut transport, MessageId::OpenChannel);
        ok(&mut lifecycle, &mut transport, MessageId::ChannelPeriod);

        assert_eq!(lifecycle.state(), ChannelState::PendingOpen);
        assert_eq!(lifecycle.pending_step(), Some(HandshakeStep::AssignChannel));
        assert!(transport.drain().is_empty());
    }

    #[test]
    fn test_error_response_halts_handshake() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);
        ok(&mut lifecycle, &mut transport, MessageId::AssignChannel);
        transport.drain();
        lifecycle.take_notices();

        lifecycle.on_response(HRM_CHANNEL, MessageId::ChannelId, 0x15, &mut transport);

        assert!(!lifecycle.config().initializing);
        assert_eq!(lifecycle.pending_step(), None);
        assert_eq!(lifecycle.state(), ChannelState::PendingOpen);
        assert!(transport.drain().is_empty());
        assert_eq!(
            lifecycle.take_notices(),
            vec![LifecycleNotice::Error(ChannelError::Protocol {
                channel: HRM_CHANNEL,
                message_id: MessageId::ChannelId,
                code: 0x15,
            })]
        );

        // Later success responses are ignored.
        ok(&mut lifecycle, &mut transport, MessageId::ChannelId);
        assert!(transport.drain().is_empty());
    }

    #[test]
    fn test_lib_config_rejection_does_not_halt() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);
        lifecycle.on_response(HRM_CHANNEL, MessageId::LibConfig, 0x28, &mut transport);
        assert!(lifecycle.config().initializing);
        assert_eq!(lifecycle.pending_step(), Some(HandshakeStep::AssignChannel));
    }

    #[test]
    fn test_transport_failure_halts_open() {
        let mut transport = QueueTransport::new();
        transport.set_connected(false);
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);

        assert!(!lifecycle.config().initializing);
        assert_eq!(
            lifecycle.last_error(),
            Some(&ChannelError::Transport(TransportError::NotConnected))
        );
    }

    #[test]
    fn test_close_handshake() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);
        transport.drain();

        lifecycle.close(&mut transport);
        assert_eq!(lifecycle.state(), ChannelState::Closed);
        assert!(lifecycle.config().deinitializing);
        assert_eq!(
            transport.drain(),
            vec![RadioCommand::CloseChannel {
                channel: HRM_CHANNEL
            }]
        );

        lifecycle.on_channel_event(HRM_CHANNEL, ChannelEventCode::ChannelClosed, &mut transport);
        assert_eq!(
            transport.drain(),
            vec![RadioCommand::UnassignChannel {
                channel: HRM_CHANNEL
            }]
        );

        ok(&mut lifecycle, &mut transport, MessageId::UnassignChannel);
        assert!(!lifecycle.config().deinitializing);

        // Idempotent once closed.
        lifecycle.close(&mut transport);
        assert!(transport.drain().is_empty());
    }

    #[test]
    fn test_deferred_open_waits_for_solicited_reset() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));

        lifecycle.open(true, &mut transport);
        assert_eq!(lifecycle.state(), ChannelState::PendingOpen);
        assert!(transport.drain().is_empty());

        lifecycle.request_reset(&mut transport);
        assert_eq!(transport.drain(), vec![RadioCommand::ResetSystem]);

        lifecycle.on_reset(None, &mut transport);
        assert!(!lifecycle.is_open_deferred());
        assert!(lifecycle.config().initializing);
        assert!(transport
            .drain()
            .iter()
            .any(|c| matches!(c, RadioCommand::AssignChannel { .. })));
    }

    #[test]
    fn test_unsolicited_reset_cancels_pending_open() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(true, &mut transport);

        lifecycle.on_reset(None, &mut transport);
        assert_eq!(lifecycle.state(), ChannelState::Closed);
        assert!(!lifecycle.is_open_deferred());
        assert!(transport.drain().is_empty());
    }

    #[test]
    fn test_unsolicited_reset_clears_outstanding_request() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.on_enablement_changed(RadioEnablement::Enabled);
        lifecycle.on_interface_claim_changed(true);

        lifecycle.request_reset(&mut transport);
        transport.drain();
        lifecycle.on_reset(Some(false), &mut transport);

        // A later reset of unknown origin is not ours.
        lifecycle.on_reset(None, &mut transport);
        assert!(transport.drain().is_empty());
        assert_eq!(lifecycle.state(), ChannelState::Closed);
    }

    #[test]
    fn test_failed_reset_request_cancels_deferred_open() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(true, &mut transport);

        transport.set_connected(false);
        lifecycle.request_reset(&mut transport);
        assert_eq!(lifecycle.state(), ChannelState::Closed);
        assert!(!lifecycle.is_open_deferred());
    }

    #[test]
    fn test_solicited_reset_applies_event_buffering() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(SensorSettings {
            buffer_threshold: 5,
            ..SensorSettings::default()
        });
        lifecycle.on_enablement_changed(RadioEnablement::Enabled);
        lifecycle.on_interface_claim_changed(true);

        lifecycle.request_reset(&mut transport);
        lifecycle.on_reset(None, &mut transport);
        assert_eq!(
            transport.drain(),
            vec![
                RadioCommand::ResetSystem,
                RadioCommand::ConfigureEventBuffering { threshold: 5 }
            ]
        );
    }

    #[test]
    fn test_search_timeout_goes_offline() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);
        transport.drain();

        lifecycle.on_channel_event(HRM_CHANNEL, ChannelEventCode::RxSearchTimeout, &mut transport);
        assert_eq!(lifecycle.state(), ChannelState::Offline);
        assert!(!lifecycle.is_channel_open());
        assert_eq!(
            transport.drain(),
            vec![RadioCommand::UnassignChannel {
                channel: HRM_CHANNEL
            }]
        );
    }

    #[test]
    fn test_data_promotes_to_tracking_unless_closed() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));

        assert!(lifecycle.on_data(HRM_CHANNEL));
        assert_eq!(lifecycle.state(), ChannelState::Closed);

        lifecycle.open(false, &mut transport);
        lifecycle.on_data(HRM_CHANNEL);
        assert_eq!(lifecycle.state(), ChannelState::TrackingData);
        assert!(!lifecycle.on_data(3));
    }

    #[test]
    fn test_interface_loss_forces_closed() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.on_enablement_changed(RadioEnablement::Enabled);
        lifecycle.on_interface_claim_changed(true);
        lifecycle.open(false, &mut transport);
        lifecycle.on_data(HRM_CHANNEL);

        lifecycle.on_interface_claim_changed(false);
        assert_eq!(lifecycle.state(), ChannelState::Closed);
        assert_eq!(lifecycle.radio_state(), RadioState::InUse);
    }

    #[test]
    fn test_airplane_mode_and_disable_force_closed() {
        let mut transport = QueueTransport::new();
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.open(false, &mut transport);
        lifecycle.on_airplane_mode_changed(true);
        assert_eq!(lifecycle.state(), ChannelState::Closed);
        assert_eq!(lifecycle.radio_state(), RadioState::AirplaneMode);

        lifecycle.on_airplane_mode_changed(false);
        lifecycle.open(false, &mut transport);
        lifecycle.on_enablement_changed(RadioEnablement::Disabled);
        assert_eq!(lifecycle.state(), ChannelState::Closed);
    }

    #[test]
    fn test_channel_id_learned_once() {
        let mut lifecycle = ChannelLifecycle::new(settings(WILDCARD));
        lifecycle.on_channel_id(HRM_CHANNEL, 31337);
        lifecycle.on_channel_id(HRM_CHANNEL, 31337);
        assert_eq!(lifecycle.settings().device_number, 31337);
        assert_eq!(
            lifecycle.take_notices(),
            vec![LifecycleNotice::DeviceNumberLearned(31337)]
        );
    }
}
