//! In-process radio simulator.
//!
//! Acknowledges every command the way a real radio does and, once the channel
//! is open, broadcasts heart-rate data pages from a synthetic sensor. Answers
//! are pushed into the monitor's inbound queue, so they are processed in the
//! same order a hardware radio would deliver them.

use crate::transport::types::{
    ChannelEventCode, MessageId, RadioCommand, RadioEnablement, RadioEvent, RadioTransport,
    TransportError, RESPONSE_NO_ERROR,
};
use crossbeam_channel::Sender;
use std::collections::HashSet;

/// Channel period of the sensor in 1/32768 s.
const SENSOR_PERIOD: u32 = 8070;

/// Response code used for injected failures (channel in wrong state).
pub const INJECTED_ERROR_CODE: u8 = 0x15;

/// Ticks without a matching sensor before the radio reports a search
/// timeout (~30 s at the sensor's message rate).
const SEARCH_TIMEOUT_TICKS: u32 = 122;

/// A synthetic heart-rate strap producing broadcast frames.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    pub device_number: u16,
    pub bpm: u8,
    pub rssi: i8,
    pub manufacturer_id: u8,
    pub serial_high: u16,
    pub hardware_version: u8,
    pub software_version: u8,
    pub model_number: u8,
    /// Only ever sends page 0 and never toggles (pre-paging straps).
    pub legacy: bool,
    /// Sensor clock in 1/32768 s.
    clock: u32,
    next_beat: u32,
    beat_time: u16,
    previous_beat_time: u16,
    beat_count: u8,
    message_count: u32,
    toggle: bool,
}

impl SimulatedSensor {
    pub fn new(device_number: u16, bpm: u8) -> Self {
        Self {
            device_number,
            bpm,
            rssi: -62,
            manufacturer_id: 1,
            serial_high: 0x0042,
            hardware_version: 5,
            software_version: 12,
            model_number: 3,
            legacy: false,
            clock: 0,
            next_beat: 0,
            beat_time: 0,
            previous_beat_time: 0,
            beat_count: 0,
            message_count: 0,
            toggle: false,
        }
    }

    fn beat_interval(&self) -> u32 {
        60 * 32_768 / u32::from(self.bpm.max(1))
    }

    /// Advance one channel period and produce the next 8-byte data page.
    pub fn next_page(&mut self) -> [u8; 8] {
        self.clock = self.clock.wrapping_add(SENSOR_PERIOD);
        while self.clock >= self.next_beat {
            self.previous_beat_time = self.beat_time;
            // 1/1024 s resolution, wrapping at 16 bits.
            self.beat_time = (self.next_beat / 32) as u16;
            self.beat_count = self.beat_count.wrapping_add(1);
            self.next_beat = self.next_beat.wrapping_add(self.beat_interval());
        }

        if self.message_count % 4 == 0 && self.message_count > 0 {
            self.toggle = !self.toggle;
        }
        let page = if self.legacy {
            0
        } else {
            match self.message_count % 68 {
                64..=67 => [1, 2, 3][((self.message_count / 68) % 3) as usize],
                _ => 4,
            }
        };
        self.message_count += 1;

        let mut data = [0u8; 8];
        data[0] = if self.toggle && !self.legacy {
            page | 0x80
        } else {
            page
        };
        match page {
            1 => {
                let operating = (self.clock / 32_768 / 2).to_le_bytes();
                data[1..4].copy_from_slice(&operating[..3]);
            }
            2 => {
                data[1] = self.manufacturer_id;
                data[2..4].copy_from_slice(&self.serial_high.to_le_bytes());
            }
            3 => {
                data[1] = self.hardware_version;
                data[2] = self.software_version;
                data[3] = self.model_number;
            }
            4 => {
                data[1] = 0xFF;
                data[2..4].copy_from_slice(&self.previous_beat_time.to_le_bytes());
            }
            _ => data[1..4].copy_from_slice(&[0xFF, 0xFF, 0xFF]),
        }
        data[4..6].copy_from_slice(&self.beat_time.to_le_bytes());
        data[6] = self.beat_count;
        data[7] = self.bpm;
        data
    }

    /// Frame the next data page as a broadcast message with RSSI extended data.
    pub fn next_frame(&mut self, channel: u8) -> Vec<u8> {
        let data = self.next_page();
        let mut frame = Vec::with_capacity(15);
        frame.push(13);
        frame.push(MessageId::BroadcastData.as_byte());
        frame.push(channel);
        frame.extend_from_slice(&data);
        // Flag byte (RSSI present), measurement type, RSSI, threshold.
        frame.extend_from_slice(&[0x40, 0x20, self.rssi as u8, 0xB0]);
        frame
    }
}

/// A simulated radio bound to one sensor.
pub struct SimulatedRadio {
    events: Sender<RadioEvent>,
    sensor: SimulatedSensor,
    enabled: bool,
    open_channel: Option<u8>,
    paired_device: u16,
    search_ticks: u32,
    ticks: u32,
    drop_every: Option<u32>,
    failing: HashSet<MessageId>,
}

impl SimulatedRadio {
    /// Create a radio that delivers its answers into `events`.
    pub fn new(events: Sender<RadioEvent>, sensor: SimulatedSensor) -> Self {
        Self {
            events,
            sensor,
            enabled: false,
            open_channel: None,
            paired_device: 0,
            search_ticks: 0,
            ticks: 0,
            drop_every: None,
            failing: HashSet::new(),
        }
    }

    /// Miss every `n`th broadcast (reported as an RX failure).
    pub fn with_drop_every(mut self, n: u32) -> Self {
        self.drop_every = Some(n.max(1));
        self
    }

    /// Answer commands with `message_id` using an error code.
    pub fn fail_on(&mut self, message_id: MessageId) {
        self.failing.insert(message_id);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_open(&self) -> bool {
        self.open_channel.is_some()
    }

    pub fn sensor(&self) -> &SimulatedSensor {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut SimulatedSensor {
        &mut self.sensor
    }

    /// Advance one channel period. Emits a broadcast, an RX failure or a
    /// search timeout when the channel is open.
    pub fn tick(&mut self) -> Result<(), TransportError> {
        let Some(channel) = self.open_channel else {
            return Ok(());
        };

        if self.paired_device != 0 && self.paired_device != self.sensor.device_number {
            self.search_ticks += 1;
            if self.search_ticks >= SEARCH_TIMEOUT_TICKS {
                self.open_channel = None;
                self.search_ticks = 0;
                self.emit(RadioEvent::ChannelEvent {
                    channel,
                    code: ChannelEventCode::RxSearchTimeout,
                })?;
            }
            return Ok(());
        }

        self.ticks += 1;
        let frame = self.sensor.next_frame(channel);
        match self.drop_every {
            Some(n) if self.ticks % n == 0 => self.emit(RadioEvent::ChannelEvent {
                channel,
                code: ChannelEventCode::RxFail,
            }),
            _ => self.emit(RadioEvent::BroadcastData {
                channel,
                message: frame,
            }),
        }
    }

    fn emit(&self, event: RadioEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .map_err(|_| TransportError::NotConnected)
    }

    fn respond(&self, channel: u8, message_id: MessageId) -> Result<(), TransportError> {
        let code = if self.failing.contains(&message_id) {
            INJECTED_ERROR_CODE
        } else {
            RESPONSE_NO_ERROR
        };
        self.emit(RadioEvent::Response {
            channel,
            message_id,
            code,
        })
    }
}

impl RadioTransport for SimulatedRadio {
    fn send(&mut self, command: RadioCommand) -> Result<(), TransportError> {
        match &command {
            RadioCommand::EnableRadio => {
                self.enabled = true;
                self.emit(RadioEvent::EnablementChanged(RadioEnablement::Enabling))?;
                self.emit(RadioEvent::EnablementChanged(RadioEnablement::Enabled))?;
                return self.emit(RadioEvent::InterfaceClaimChanged { claimed: true });
            }
            RadioCommand::DisableRadio => {
                self.enabled = false;
                self.open_channel = None;
                self.emit(RadioEvent::EnablementChanged(RadioEnablement::Disabling))?;
                return self.emit(RadioEvent::EnablementChanged(RadioEnablement::Disabled));
            }
            _ if !self.enabled => return Err(TransportError::NotConnected),
            RadioCommand::ResetSystem => {
                self.open_channel = None;
                return self.emit(RadioEvent::Reset { solicited: None });
            }
            RadioCommand::RequestMessage {
                channel,
                message_id: MessageId::ChannelId,
            } => {
                if self.open_channel == Some(*channel) {
                    return self.emit(RadioEvent::ChannelIdData {
                        channel: *channel,
                        device_number: self.sensor.device_number,
                    });
                }
                return Ok(());
            }
            RadioCommand::SetChannelId { device_number, .. } => {
                self.paired_device = *device_number;
            }
            _ => {}
        }

        let channel = command.channel().unwrap_or(0);
        if let Some(message_id) = command.response_id() {
            self.respond(channel, message_id)?;
            if self.failing.contains(&message_id) {
                return Ok(());
            }
        }

        match command {
            RadioCommand::OpenChannel { channel } => {
                self.open_channel = Some(channel);
                self.search_ticks = 0;
            }
            RadioCommand::CloseChannel { channel } => {
                self.open_channel = None;
                self.emit(RadioEvent::ChannelEvent {
                    channel,
                    code: ChannelEventCode::ChannelClosed,
                })?;
            }
            _ => {}
        }
        Ok(())
    }
}
