//! Integration tests driving the monitor end-to-end through the simulated radio

use crossbeam_channel::Receiver;
use hrmon_agent::channel::{ChannelError, ChannelState, RadioState, WILDCARD};
use hrmon_agent::core::{ManualClock, SESSION_TIME_LIMIT_MS};
use hrmon_agent::monitor::{event_queue, HeartRateMonitor, MonitorError, MonitorEvent};
use hrmon_agent::transport::{MessageId, RadioEvent, SimulatedRadio, SimulatedSensor};
use hrmon_agent::SensorSettings;
use std::sync::Arc;

const SENSOR: u16 = 0x1234;

/// Sensor message period in milliseconds, rounded.
const PERIOD_MS: u64 = 246;

struct Harness {
    monitor: HeartRateMonitor<SimulatedRadio>,
    events: Receiver<MonitorEvent>,
    clock: ManualClock,
}

impl Harness {
    fn new(settings: SensorSettings) -> Self {
        Self::with_radio(settings, |radio| radio)
    }

    fn with_radio(
        settings: SensorSettings,
        configure: impl FnOnce(SimulatedRadio) -> SimulatedRadio,
    ) -> Self {
        let (tx, rx) = event_queue();
        let radio = configure(SimulatedRadio::new(tx.clone(), SimulatedSensor::new(SENSOR, 64)));
        let clock = ManualClock::new(1_700_000_000_000);
        let mut monitor = HeartRateMonitor::new(radio, (tx, rx), settings, Arc::new(clock.clone()));
        let events = monitor.subscribe();
        Self {
            monitor,
            events,
            clock,
        }
    }

    fn connect(&mut self) {
        self.monitor.connect_sensor();
        self.monitor.pump();
    }

    fn tick(&mut self, n: usize) {
        for _ in 0..n {
            self.clock.advance_ms(PERIOD_MS);
            self.monitor.transport_mut().tick().unwrap();
            self.monitor.pump();
        }
    }

    fn drain(&self) -> Vec<MonitorEvent> {
        self.events.try_iter().collect()
    }
}

#[test]
fn test_connect_reaches_searching() {
    let mut h = Harness::new(SensorSettings::default());
    h.connect();

    assert_eq!(h.monitor.state(), ChannelState::Searching);
    assert_eq!(h.monitor.radio_state(), RadioState::Ready);
    assert!(!h.monitor.lifecycle().config().initializing);
    assert!(h.monitor.transport().is_open());

    let events = h.drain();
    assert!(events.contains(&MonitorEvent::RadioStateChanged(RadioState::Ready)));
    let states: Vec<ChannelState> = events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::ChannelStateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![ChannelState::PendingOpen, ChannelState::Searching]);
}

#[test]
fn test_wildcard_pairing_learns_device_number() {
    let mut h = Harness::new(SensorSettings::default());
    h.connect();
    h.tick(1);

    assert_eq!(h.monitor.state(), ChannelState::TrackingData);
    assert_eq!(h.monitor.settings().device_number, SENSOR);
    assert!(h
        .drain()
        .contains(&MonitorEvent::DeviceNumberLearned(SENSOR)));
}

#[test]
fn test_session_records_heart_rate() {
    let mut h = Harness::new(SensorSettings {
        device_number: SENSOR,
        ..SensorSettings::default()
    });
    h.connect();
    h.tick(1);
    assert!(h.monitor.toggle_session());
    h.tick(40);

    let session = h.monitor.session();
    assert_eq!(session.series().bpm.len(), 40);
    assert_eq!(session.last_bpm(), 64);
    assert_eq!(session.last_rssi(), -62);
    assert!(!session.series().rr.is_empty());
    // 60 / 64 s in 1/1024 s ticks is 960 ticks.
    assert!(session.series().rr.values().iter().all(|&rr| rr == 937));
    assert_eq!(session.throughput(), 100);
    assert_eq!(session.elapsed_ms(), 40 * PERIOD_MS);
}

#[test]
fn test_dropped_packets_lower_throughput() {
    let mut h = Harness::with_radio(
        SensorSettings {
            device_number: SENSOR,
            ..SensorSettings::default()
        },
        |radio| radio.with_drop_every(4),
    );
    h.connect();
    h.monitor.start_session();
    h.tick(41);

    let session = h.monitor.session();
    assert_eq!(session.packets_received(), 31);
    assert_eq!(session.packets_dropped(), 10);
    assert_eq!(session.throughput(), 76);
}

#[test]
fn test_extended_pages_report_device_info() {
    let mut h = Harness::new(SensorSettings {
        device_number: SENSOR,
        ..SensorSettings::default()
    });
    h.connect();
    // Pages 1, 2 and 3 each follow a run of 64 page-4 messages.
    h.tick(3 * 68);

    let telemetry = h.monitor.telemetry();
    assert!(telemetry.operating_time > 0);
    assert_eq!(telemetry.manufacturer_id, 1);
    assert_eq!(telemetry.serial_number, 0x0042_1234);
    assert_eq!(
        (
            telemetry.hardware_version,
            telemetry.software_version,
            telemetry.model_number
        ),
        (5, 12, 3)
    );

    // Repeated pages only report changes.
    let infos = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::DeviceInfoChanged(_)))
        .count();
    assert!(infos >= 3);
}

#[test]
fn test_legacy_sensor_reports_heart_rate_only() {
    let mut h = Harness::with_radio(
        SensorSettings {
            device_number: SENSOR,
            ..SensorSettings::default()
        },
        |mut radio| {
            radio.sensor_mut().legacy = true;
            radio
        },
    );
    h.connect();
    h.tick(3 * 68);

    assert_eq!(h.monitor.bpm(), 64);
    assert_eq!(h.monitor.telemetry().manufacturer_id, 0);
    assert!(!h
        .drain()
        .iter()
        .any(|e| matches!(e, MonitorEvent::DeviceInfoChanged(_))));
}

#[test]
fn test_handshake_error_halts() {
    let mut h = Harness::with_radio(SensorSettings::default(), |mut radio| {
        radio.fail_on(MessageId::ChannelPeriod);
        radio
    });
    h.connect();

    assert_eq!(h.monitor.state(), ChannelState::PendingOpen);
    assert!(!h.monitor.lifecycle().config().initializing);
    assert!(!h.monitor.transport().is_open());
    assert!(h.drain().contains(&MonitorEvent::Error(MonitorError::Channel(
        ChannelError::Protocol {
            channel: 0,
            message_id: MessageId::ChannelPeriod,
            code: 0x15,
        }
    ))));

    // Recovery is an explicit reconnect.
    h.monitor.disconnect_sensor();
    h.monitor.pump();
    assert_eq!(h.monitor.state(), ChannelState::Closed);
}

#[test]
fn test_search_timeout_goes_offline() {
    let mut h = Harness::new(SensorSettings {
        device_number: 999,
        ..SensorSettings::default()
    });
    h.connect();
    h.tick(122);

    assert_eq!(h.monitor.state(), ChannelState::Offline);
    assert!(!h.monitor.lifecycle().is_channel_open());
    assert!(!h.monitor.transport().is_open());

    // Pairing with the right sensor and toggling reconnects.
    h.monitor.set_settings(SensorSettings {
        device_number: SENSOR,
        ..SensorSettings::default()
    });
    h.monitor.toggle_connection();
    h.monitor.pump();
    h.tick(1);
    assert_eq!(h.monitor.state(), ChannelState::TrackingData);
}

#[test]
fn test_disconnect_closes_and_disables() {
    let mut h = Harness::new(SensorSettings::default());
    h.connect();
    h.tick(2);

    h.monitor.toggle_connection();
    h.monitor.pump();

    assert_eq!(h.monitor.state(), ChannelState::Closed);
    assert_eq!(h.monitor.radio_state(), RadioState::Disabled);
    assert!(!h.monitor.transport().is_enabled());
    assert!(!h
        .drain()
        .iter()
        .any(|e| matches!(e, MonitorEvent::Error(_))));
}

#[test]
fn test_session_limit_disconnects() {
    let mut h = Harness::new(SensorSettings {
        device_number: SENSOR,
        ..SensorSettings::default()
    });
    h.connect();
    h.tick(1);
    h.monitor.start_session();
    h.tick(4);
    let samples = h.monitor.session().series().bpm.len();

    h.clock.advance_ms(SESSION_TIME_LIMIT_MS);
    h.tick(1);

    assert!(h.drain().contains(&MonitorEvent::SessionLimitReached));
    assert!(!h.monitor.session().is_started());
    assert_eq!(h.monitor.session().series().bpm.len(), samples);
    assert_eq!(h.monitor.state(), ChannelState::Closed);
}

#[test]
fn test_unsolicited_reset_and_airplane_mode_close_channel() {
    let mut h = Harness::new(SensorSettings::default());
    h.connect();
    h.tick(1);

    let sender = h.monitor.sender();
    sender
        .send(RadioEvent::Reset {
            solicited: Some(false),
        })
        .unwrap();
    h.monitor.pump();
    assert_eq!(h.monitor.state(), ChannelState::Closed);

    h.connect();
    assert_eq!(h.monitor.state(), ChannelState::Searching);
    sender.send(RadioEvent::AirplaneModeChanged { on: true }).unwrap();
    h.monitor.pump();
    assert_eq!(h.monitor.state(), ChannelState::Closed);
    assert_eq!(h.monitor.radio_state(), RadioState::AirplaneMode);
}

#[test]
fn test_reset_pairing_forgets_sensor() {
    let mut h = Harness::new(SensorSettings::default());
    h.connect();
    h.tick(1);
    assert_eq!(h.monitor.settings().device_number, SENSOR);

    let settings = h.monitor.reset_pairing();
    h.monitor.pump();
    assert_eq!(settings.device_number, WILDCARD);
    assert_eq!(h.monitor.state(), ChannelState::Closed);
}

#[test]
fn test_export_after_session() {
    let mut h = Harness::new(SensorSettings {
        device_number: SENSOR,
        ..SensorSettings::default()
    });
    h.connect();
    h.monitor.start_session();
    h.tick(10);

    let export = h.monitor.export();
    assert_eq!(export.device.device_number, SENSOR);
    assert_eq!(export.series.bpm.len(), 10);
    assert_eq!(export.link.packets_received, 10);
    assert_eq!(export.elapsed_ms, 10 * PERIOD_MS);
}
