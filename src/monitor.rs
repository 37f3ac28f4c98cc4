//! Heart-rate monitor engine.
//!
//! Wires the channel lifecycle, the broadcast decoder and the session
//! aggregator together behind a single ordered event queue. Radio events may
//! be produced on any thread, but they are only ever handled by
//! [`HeartRateMonitor::pump`] (or [`HeartRateMonitor::handle_event`]) on the
//! thread that owns the monitor, in arrival order.

use crate::channel::{ChannelError, ChannelLifecycle, ChannelState, LifecycleNotice, RadioState};
use crate::config::SensorSettings;
use crate::core::clock::Clock;
use crate::core::decoder::{BroadcastDecoder, DecodeError, HrmTelemetry, TelemetryEvent};
use crate::core::export::{DeviceInfo, ExportBuilder, SessionExport};
use crate::core::session::{SampleOutcome, SessionRecord};
use crate::link::{create_shared_counters, SharedLinkCounters};
use crate::transport::{
    ChannelEventCode, MessageId, RadioCommand, RadioEvent, RadioTransport, TransportError,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Events published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    ChannelStateChanged(ChannelState),
    RadioStateChanged(RadioState),
    NewBpm(u8),
    /// RR interval in milliseconds.
    NewRr(u32),
    NewRssi(i8),
    /// The paired sensor's device number was learned; persist it to pair
    /// with the same sensor next time.
    DeviceNumberLearned(u16),
    DeviceInfoChanged(DeviceInfo),
    /// The session hit its time limit; the sensor is being disconnected.
    SessionLimitReached,
    Error(MonitorError),
}

/// Errors published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    Channel(ChannelError),
    Decode(DecodeError),
    Transport(TransportError),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Channel(e) => write!(f, "Channel error: {e}"),
            MonitorError::Decode(e) => write!(f, "Decode error: {e}"),
            MonitorError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for MonitorError {}

/// Create the inbound event queue. Hand the sender to whatever delivers
/// radio events and the receiver to [`HeartRateMonitor::new`].
pub fn event_queue() -> (Sender<RadioEvent>, Receiver<RadioEvent>) {
    unbounded()
}

/// The heart-rate monitor engine.
pub struct HeartRateMonitor<T: RadioTransport> {
    transport: T,
    lifecycle: ChannelLifecycle,
    decoder: BroadcastDecoder,
    session: SessionRecord,
    counters: SharedLinkCounters,
    export: ExportBuilder,
    inbound_tx: Sender<RadioEvent>,
    inbound_rx: Receiver<RadioEvent>,
    subscribers: Vec<Sender<MonitorEvent>>,
}

impl<T: RadioTransport> HeartRateMonitor<T> {
    pub fn new(
        transport: T,
        queue: (Sender<RadioEvent>, Receiver<RadioEvent>),
        settings: SensorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = queue;
        Self {
            transport,
            lifecycle: ChannelLifecycle::new(settings),
            decoder: BroadcastDecoder::new(settings.device_number),
            session: SessionRecord::new(clock),
            counters: create_shared_counters(None),
            export: ExportBuilder::new(),
            inbound_tx,
            inbound_rx,
            subscribers: Vec::new(),
        }
    }

    /// Use `counters` for link statistics (e.g. persisted ones).
    pub fn with_counters(mut self, counters: SharedLinkCounters) -> Self {
        self.counters = counters;
        self
    }

    /// Sender for the inbound event queue.
    pub fn sender(&self) -> Sender<RadioEvent> {
        self.inbound_tx.clone()
    }

    /// Subscribe to monitor events. Events are delivered in the order they
    /// were produced.
    pub fn subscribe(&mut self) -> Receiver<MonitorEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Handle every queued radio event, including those queued while
    /// handling. Returns the number handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbound_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Handle one radio event.
    pub fn handle_event(&mut self, event: RadioEvent) {
        debug!(?event, "Radio event");
        match event {
            RadioEvent::Reset { solicited } => {
                self.lifecycle.on_reset(solicited, &mut self.transport);
            }
            RadioEvent::Response {
                channel,
                message_id,
                code,
            } => {
                self.lifecycle
                    .on_response(channel, message_id, code, &mut self.transport);
            }
            RadioEvent::ChannelEvent { channel, code } => {
                if channel == self.lifecycle.channel() && code == ChannelEventCode::RxFail {
                    self.counters.record_dropped();
                    let outcome = self.session.add_packets_dropped(1);
                    self.on_sample(outcome);
                }
                self.lifecycle
                    .on_channel_event(channel, code, &mut self.transport);
            }
            RadioEvent::BroadcastData { channel, message } => {
                self.on_broadcast(channel, &message);
            }
            RadioEvent::ChannelIdData {
                channel,
                device_number,
            } => self.lifecycle.on_channel_id(channel, device_number),
            RadioEvent::InterfaceClaimChanged { claimed } => {
                self.lifecycle.on_interface_claim_changed(claimed);
            }
            RadioEvent::EnablementChanged(enablement) => {
                self.lifecycle.on_enablement_changed(enablement);
            }
            RadioEvent::AirplaneModeChanged { on } => {
                self.lifecycle.on_airplane_mode_changed(on);
            }
        }
        self.dispatch_notices();
    }

    fn on_broadcast(&mut self, channel: u8, message: &[u8]) {
        if !self.lifecycle.on_data(channel) {
            return;
        }
        self.dispatch_notices();

        let events = match self.decoder.decode(message) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping broadcast: {e}");
                self.emit(MonitorEvent::Error(MonitorError::Decode(e)));
                return;
            }
        };

        self.counters.record_received();
        let outcome = self.session.add_packets_received(1);
        self.on_sample(outcome);
        if outcome == SampleOutcome::LimitReached {
            return;
        }

        if self.decoder.needs_channel_id() {
            debug!("Requesting device number");
            if let Err(e) = self.transport.send(RadioCommand::RequestMessage {
                channel,
                message_id: MessageId::ChannelId,
            }) {
                self.emit(MonitorEvent::Error(MonitorError::Transport(e)));
            }
        }

        for event in events {
            self.apply_telemetry(event);
        }
    }

    fn apply_telemetry(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::NewBpm(bpm) => {
                let outcome = self.session.add_bpm(bpm);
                self.emit(MonitorEvent::NewBpm(bpm));
                self.on_sample(outcome);
            }
            TelemetryEvent::NewRr(rr) => {
                let outcome = self.session.add_rr(rr);
                self.emit(MonitorEvent::NewRr(rr));
                self.on_sample(outcome);
            }
            TelemetryEvent::NewRssi(rssi) => {
                let outcome = self.session.add_rssi(rssi);
                self.emit(MonitorEvent::NewRssi(rssi));
                self.on_sample(outcome);
            }
            TelemetryEvent::OperatingTime(_)
            | TelemetryEvent::ManufacturerInfo { .. }
            | TelemetryEvent::ProductInfo { .. } => {
                let info = DeviceInfo::from(self.decoder.telemetry());
                self.emit(MonitorEvent::DeviceInfoChanged(info));
            }
        }
    }

    fn on_sample(&mut self, outcome: SampleOutcome) {
        if outcome == SampleOutcome::LimitReached {
            info!("Session time limit reached, disconnecting sensor");
            self.emit(MonitorEvent::SessionLimitReached);
            self.disconnect_sensor();
        }
    }

    fn dispatch_notices(&mut self) {
        for notice in self.lifecycle.take_notices() {
            let event = match notice {
                LifecycleNotice::StateChanged(state) => MonitorEvent::ChannelStateChanged(state),
                LifecycleNotice::RadioStateChanged(state) => MonitorEvent::RadioStateChanged(state),
                LifecycleNotice::DeviceNumberLearned(device_number) => {
                    self.decoder.set_device_number(device_number);
                    MonitorEvent::DeviceNumberLearned(device_number)
                }
                LifecycleNotice::Error(e) => MonitorEvent::Error(MonitorError::Channel(e)),
            };
            self.emit(event);
        }
    }

    fn emit(&mut self, event: MonitorEvent) {
        // Drop subscribers whose receiver is gone.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Enable the radio if needed and open the channel once the radio has
    /// been reset.
    pub fn connect_sensor(&mut self) {
        if !self.lifecycle.radio().enabled {
            info!("Enabling radio");
            if let Err(e) = self.transport.send(RadioCommand::EnableRadio) {
                warn!("Could not enable radio: {e}");
                self.emit(MonitorEvent::Error(MonitorError::Transport(e)));
                return;
            }
        }

        if !self.lifecycle.is_channel_open() {
            self.decoder.reset();
            self.lifecycle.open(true, &mut self.transport);
            self.lifecycle.request_reset(&mut self.transport);
        }
        self.dispatch_notices();
    }

    /// Close the channel if open and disable the radio.
    pub fn disconnect_sensor(&mut self) {
        if self.lifecycle.is_channel_open() {
            self.lifecycle.close(&mut self.transport);
        }

        if self.lifecycle.radio().enabled {
            info!("Disabling radio");
            if let Err(e) = self.transport.send(RadioCommand::DisableRadio) {
                warn!("Could not disable radio: {e}");
                self.emit(MonitorEvent::Error(MonitorError::Transport(e)));
            }
        }
        self.dispatch_notices();
    }

    /// Connect when the channel is released, disconnect otherwise.
    pub fn toggle_connection(&mut self) {
        if self.lifecycle.state().is_released() {
            self.connect_sensor();
        } else {
            self.disconnect_sensor();
        }
    }

    /// Start a fresh session.
    pub fn start_session(&mut self) {
        self.session.clear();
        self.export.next_session();
        self.session.start();
    }

    pub fn stop_session(&mut self) {
        self.session.stop();
    }

    /// Stop a running session, or start one if the sensor is tracking.
    /// Returns whether a session is running afterwards.
    pub fn toggle_session(&mut self) -> bool {
        if self.session.is_started() {
            self.stop_session();
        } else if self.lifecycle.state().is_tracking() {
            self.start_session();
        }
        self.session.is_started()
    }

    /// Disconnect and forget the paired sensor. Returns the new settings so
    /// they can be persisted.
    pub fn reset_pairing(&mut self) -> SensorSettings {
        self.disconnect_sensor();

        let mut settings = self.lifecycle.settings();
        settings.reset();
        self.set_settings(settings);
        settings
    }

    /// Replace the pairing settings. Takes effect on the next connect.
    pub fn set_settings(&mut self, settings: SensorSettings) {
        self.lifecycle.set_settings(settings);
        self.decoder.set_device_number(settings.device_number);
    }

    pub fn settings(&self) -> SensorSettings {
        self.lifecycle.settings()
    }

    pub fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }

    pub fn radio_state(&self) -> RadioState {
        self.lifecycle.radio_state()
    }

    pub fn lifecycle(&self) -> &ChannelLifecycle {
        &self.lifecycle
    }

    pub fn telemetry(&self) -> &HrmTelemetry {
        self.decoder.telemetry()
    }

    pub fn bpm(&self) -> u8 {
        self.decoder.telemetry().bpm
    }

    pub fn rr_interval(&self) -> u32 {
        self.decoder.telemetry().rr_interval
    }

    pub fn rssi(&self) -> i8 {
        self.decoder.telemetry().rssi
    }

    /// Drain and return the packets received since the last drain. The
    /// session keeps its own counts, so polling never affects throughput.
    pub fn take_packets_received(&self) -> u64 {
        self.counters.take_received()
    }

    /// Drain and return the packets dropped since the last drain.
    pub fn take_packets_dropped(&self) -> u64 {
        self.counters.take_dropped()
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    pub fn counters(&self) -> &SharedLinkCounters {
        &self.counters
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Snapshot the current session for export.
    pub fn export(&self) -> SessionExport {
        self.export.build(&self.session, self.decoder.telemetry())
    }

    /// Export the current session into `dir`.
    pub fn save_export(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = self.export().save_to_dir(dir)?;
        self.counters.record_session_exported();
        info!(path = %path.display(), "Session exported");
        Ok(path)
    }
}
