//! Heart-rate broadcast decoding.
//!
//! A broadcast frame has the layout
//! `[length, message_id, channel, page, d1, d2, d3, time_lsb, time_msb, count, bpm, ext...]`.
//! Every page carries the beat time (1/1024 s), the beat count and the
//! computed heart rate; `d1..d3` hold page-specific fields. When the radio
//! appends extended data (length > 10) the RSSI follows the flag and
//! measurement-type bytes.

use crate::channel::state::WILDCARD;
use crate::transport::types::hex_string;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Offset of the page byte (high bit is the toggle bit).
const PAGE_OFFSET: usize = 3;
const PAGE_DATA_OFFSET: usize = 4;
const BEAT_TIME_OFFSET: usize = 7;
const BEAT_COUNT_OFFSET: usize = 9;
const BPM_OFFSET: usize = 10;
const RSSI_OFFSET: usize = 13;

/// Length byte above which extended data is appended.
const EXTENDED_LENGTH: u8 = 10;

/// Bytes required for a standard frame and for one with extended data.
const MIN_FRAME_LEN: usize = BPM_OFFSET + 1;
const MIN_EXTENDED_FRAME_LEN: usize = RSSI_OFFSET + 1;

const TOGGLE_MASK: u8 = 0x80;

/// Beat time wraps at 2^16 ticks of 1/1024 s.
const BEAT_TIME_MODULUS: u32 = 65_536;
const TICKS_PER_SECOND: u32 = 1024;

/// Whether the sensor multiplexes auxiliary data pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageState {
    /// Nothing received yet.
    #[default]
    Init,
    /// Only one page number seen so far.
    Standard,
    /// Page changes observed; never left once entered.
    Extended,
}

/// Auxiliary content of a data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPage {
    /// Page 1: cumulative operating time in seconds.
    OperatingTime { seconds: u32 },
    /// Page 2: manufacturer id and serial number.
    ManufacturerInfo {
        manufacturer_id: u8,
        serial_number: u32,
    },
    /// Page 3: hardware/software version and model number.
    ProductInfo {
        hardware_version: u8,
        software_version: u8,
        model_number: u8,
    },
    /// Pages without auxiliary fields we use.
    Other(u8),
}

impl DataPage {
    /// Decode page-specific bytes `d1..d3`. The device number supplies the low
    /// half of the serial number.
    pub fn from_bytes(page: u8, data: [u8; 3], device_number: u16) -> Self {
        let [d1, d2, d3] = data;
        match page {
            1 => DataPage::OperatingTime {
                seconds: u32::from_le_bytes([d1, d2, d3, 0]) * 2,
            },
            2 => DataPage::ManufacturerInfo {
                manufacturer_id: d1,
                serial_number: (u32::from(d3) << 24)
                    | (u32::from(d2) << 16)
                    | u32::from(device_number),
            },
            3 => DataPage::ProductInfo {
                hardware_version: d1,
                software_version: d2,
                model_number: d3,
            },
            other => DataPage::Other(other),
        }
    }
}

/// Fields of one broadcast frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastFrame {
    /// Page number with the toggle bit cleared.
    pub page: u8,
    pub toggle: bool,
    pub page_data: [u8; 3],
    pub beat_time: u16,
    pub beat_count: u8,
    pub bpm: u8,
    /// Present only when the radio appended extended data.
    pub rssi: Option<i8>,
}

impl BroadcastFrame {
    /// Parse a raw broadcast or acknowledged data frame.
    pub fn parse(message: &[u8]) -> Result<Self, DecodeError> {
        if message.len() < MIN_FRAME_LEN {
            return Err(DecodeError::Truncated {
                expected: MIN_FRAME_LEN,
                actual: message.len(),
            });
        }

        let extended = message[0] > EXTENDED_LENGTH;
        if extended && message.len() < MIN_EXTENDED_FRAME_LEN {
            return Err(DecodeError::Truncated {
                expected: MIN_EXTENDED_FRAME_LEN,
                actual: message.len(),
            });
        }

        let page_byte = message[PAGE_OFFSET];
        Ok(Self {
            page: page_byte & !TOGGLE_MASK,
            toggle: page_byte & TOGGLE_MASK != 0,
            page_data: [
                message[PAGE_DATA_OFFSET],
                message[PAGE_DATA_OFFSET + 1],
                message[PAGE_DATA_OFFSET + 2],
            ],
            beat_time: u16::from_le_bytes([
                message[BEAT_TIME_OFFSET],
                message[BEAT_TIME_OFFSET + 1],
            ]),
            beat_count: message[BEAT_COUNT_OFFSET],
            bpm: message[BPM_OFFSET],
            rssi: extended.then(|| message[RSSI_OFFSET] as i8),
        })
    }
}

/// Telemetry reconstructed from the broadcast stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrmTelemetry {
    pub device_number: u16,
    /// Cumulative operating time in seconds.
    pub operating_time: u32,
    pub manufacturer_id: u8,
    pub serial_number: u32,
    pub hardware_version: u8,
    pub software_version: u8,
    pub model_number: u8,
    pub beat_count: u8,
    pub previous_beat_count: u8,
    /// Beat event time in 1/1024 s.
    pub beat_time: u16,
    pub previous_beat_time: u16,
    /// Last RR interval in milliseconds.
    pub rr_interval: u32,
    pub bpm: u8,
    pub rssi: i8,
}

/// One semantic change extracted from a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    NewBpm(u8),
    NewRr(u32),
    NewRssi(i8),
    OperatingTime(u32),
    ManufacturerInfo {
        manufacturer_id: u8,
        serial_number: u32,
    },
    ProductInfo {
        hardware_version: u8,
        software_version: u8,
        model_number: u8,
    },
}

/// Per-channel decoding context.
#[derive(Debug, Default)]
pub struct BroadcastDecoder {
    telemetry: HrmTelemetry,
    page_state: PageState,
    last_page: Option<u8>,
    has_previous_beat: bool,
}

impl BroadcastDecoder {
    pub fn new(device_number: u16) -> Self {
        Self {
            telemetry: HrmTelemetry {
                device_number,
                ..HrmTelemetry::default()
            },
            ..Self::default()
        }
    }

    pub fn telemetry(&self) -> &HrmTelemetry {
        &self.telemetry
    }

    pub fn page_state(&self) -> PageState {
        self.page_state
    }

    pub fn set_device_number(&mut self, device_number: u16) {
        self.telemetry.device_number = device_number;
    }

    /// Whether the paired device is still unknown and its channel id should
    /// be requested.
    pub fn needs_channel_id(&self) -> bool {
        self.telemetry.device_number == WILDCARD
    }

    /// Forget everything learned from the previous channel, keeping the
    /// device number.
    pub fn reset(&mut self) {
        *self = Self::new(self.telemetry.device_number);
    }

    /// Decode one frame, returning the events it produced in order.
    pub fn decode(&mut self, message: &[u8]) -> Result<Vec<TelemetryEvent>, DecodeError> {
        let frame = BroadcastFrame::parse(message)?;
        trace!(frame = %hex_string(message), "Decoding broadcast");

        let mut events = Vec::new();
        self.track_page(frame.page);

        if self.page_state == PageState::Extended {
            let page =
                DataPage::from_bytes(frame.page, frame.page_data, self.telemetry.device_number);
            self.apply_page(page, &mut events);
        }

        self.telemetry.bpm = frame.bpm;
        events.push(TelemetryEvent::NewBpm(frame.bpm));

        if let Some(rssi) = frame.rssi {
            self.telemetry.rssi = rssi;
            events.push(TelemetryEvent::NewRssi(rssi));
        }

        self.telemetry.beat_count = frame.beat_count;
        self.telemetry.beat_time = frame.beat_time;

        if self.has_previous_beat && frame.beat_count != self.telemetry.previous_beat_count {
            let delta = frame
                .beat_count
                .wrapping_sub(self.telemetry.previous_beat_count);
            if delta == 1 {
                let rr = rr_interval_ms(self.telemetry.previous_beat_time, frame.beat_time);
                self.telemetry.rr_interval = rr;
                events.push(TelemetryEvent::NewRr(rr));
            } else {
                debug!(delta, "Beat count skipped, no RR interval");
            }
        }

        self.telemetry.previous_beat_count = frame.beat_count;
        self.telemetry.previous_beat_time = frame.beat_time;
        self.has_previous_beat = true;

        Ok(events)
    }

    fn track_page(&mut self, page: u8) {
        match self.page_state {
            PageState::Init => self.page_state = PageState::Standard,
            PageState::Standard if self.last_page != Some(page) => {
                debug!(page, "Page change seen, decoding extended pages");
                self.page_state = PageState::Extended;
            }
            PageState::Standard | PageState::Extended => {}
        }
        self.last_page = Some(page);
    }

    fn apply_page(&mut self, page: DataPage, events: &mut Vec<TelemetryEvent>) {
        let t = &mut self.telemetry;
        match page {
            DataPage::OperatingTime { seconds } => {
                if t.operating_time != seconds {
                    t.operating_time = seconds;
                    events.push(TelemetryEvent::OperatingTime(seconds));
                }
            }
            DataPage::ManufacturerInfo {
                manufacturer_id,
                serial_number,
            } => {
                if (t.manufacturer_id, t.serial_number) != (manufacturer_id, serial_number) {
                    t.manufacturer_id = manufacturer_id;
                    t.serial_number = serial_number;
                    events.push(TelemetryEvent::ManufacturerInfo {
                        manufacturer_id,
                        serial_number,
                    });
                }
            }
            DataPage::ProductInfo {
                hardware_version,
                software_version,
                model_number,
            } => {
                let info = (hardware_version, software_version, model_number);
                if (t.hardware_version, t.software_version, t.model_number) != info {
                    t.hardware_version = hardware_version;
                    t.software_version = software_version;
                    t.model_number = model_number;
                    events.push(TelemetryEvent::ProductInfo {
                        hardware_version,
                        software_version,
                        model_number,
                    });
                }
            }
            DataPage::Other(_) => {}
        }
    }
}

/// RR interval in milliseconds between two beat times, correcting for the
/// 16-bit wrap when `current <= previous`.
pub fn rr_interval_ms(previous: u16, current: u16) -> u32 {
    let (previous, current) = (u32::from(previous), u32::from(current));
    let ticks = if current <= previous {
        current + (BEAT_TIME_MODULUS - previous)
    } else {
        current - previous
    };
    ticks * 1000 / TICKS_PER_SECOND
}

/// Broadcast decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated { expected: usize, actual: usize },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated { expected, actual } => {
                write!(f, "Truncated broadcast: expected {expected} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an extended broadcast frame.
    fn frame(page: u8, data: [u8; 3], time: u16, count: u8, bpm: u8, rssi: i8) -> Vec<u8> {
        let [lsb, msb] = time.to_le_bytes();
        vec![
            13, 0x4E, 0, page, data[0], data[1], data[2], lsb, msb, count, bpm, 0x40, 0x20,
            rssi as u8, 0,
        ]
    }

    fn rr_events(events: &[TelemetryEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::NewRr(rr) => Some(*rr),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rr_interval_examples() {
        assert_eq!(rr_interval_ms(1000, 1892), 870);
        assert_eq!(rr_interval_ms(65000, 500), 1011);
        assert_eq!(rr_interval_ms(300, 300), 64000);
    }

    #[test]
    fn test_rr_emitted_on_single_beat() {
        let mut decoder = BroadcastDecoder::new(1);
        let first = decoder.decode(&frame(0, [0; 3], 1000, 10, 70, -60)).unwrap();
        assert!(rr_events(&first).is_empty());

        let second = decoder.decode(&frame(0, [0; 3], 1892, 11, 71, -61)).unwrap();
        assert_eq!(
            second,
            vec![
                TelemetryEvent::NewBpm(71),
                TelemetryEvent::NewRssi(-61),
                TelemetryEvent::NewRr(870),
            ]
        );
        assert_eq!(decoder.telemetry().rr_interval, 870);
    }

    #[test]
    fn test_rr_across_wraps() {
        let mut decoder = BroadcastDecoder::new(1);
        decoder.decode(&frame(0, [0; 3], 65000, 255, 60, 0)).unwrap();
        let events = decoder.decode(&frame(0, [0; 3], 500, 0, 60, 0)).unwrap();
        assert_eq!(rr_events(&events), vec![1011]);
    }

    #[test]
    fn test_skipped_beats_produce_no_rr() {
        let mut decoder = BroadcastDecoder::new(1);
        decoder.decode(&frame(0, [0; 3], 1000, 10, 60, 0)).unwrap();
        let events = decoder.decode(&frame(0, [0; 3], 6000, 15, 64, 0)).unwrap();
        assert!(rr_events(&events).is_empty());
        assert!(events.contains(&TelemetryEvent::NewBpm(64)));

        // Previous beat is still updated.
        assert_eq!(decoder.telemetry().previous_beat_count, 15);
        let events = decoder.decode(&frame(0, [0; 3], 7024, 16, 64, 0)).unwrap();
        assert_eq!(rr_events(&events), vec![1000]);
    }

    #[test]
    fn test_repeated_beat_count_produces_no_rr() {
        let mut decoder = BroadcastDecoder::new(1);
        decoder.decode(&frame(0, [0; 3], 1000, 10, 60, 0)).unwrap();
        let events = decoder.decode(&frame(0, [0; 3], 1000, 10, 60, 0)).unwrap();
        assert!(rr_events(&events).is_empty());
    }

    #[test]
    fn test_page_state_is_monotonic() {
        let mut decoder = BroadcastDecoder::new(1);
        assert_eq!(decoder.page_state(), PageState::Init);

        decoder.decode(&frame(4, [0; 3], 0, 0, 60, 0)).unwrap();
        assert_eq!(decoder.page_state(), PageState::Standard);
        decoder.decode(&frame(0x84, [0; 3], 0, 0, 60, 0)).unwrap();
        assert_eq!(decoder.page_state(), PageState::Standard);

        decoder.decode(&frame(1, [0; 3], 0, 0, 60, 0)).unwrap();
        assert_eq!(decoder.page_state(), PageState::Extended);

        for page in [4, 4, 0x84, 4] {
            decoder.decode(&frame(page, [0; 3], 0, 0, 60, 0)).unwrap();
            assert_eq!(decoder.page_state(), PageState::Extended);
        }
    }

    #[test]
    fn test_extended_pages_decoded() {
        let mut decoder = BroadcastDecoder::new(0x1234);
        decoder.decode(&frame(4, [0; 3], 0, 0, 60, 0)).unwrap();

        let events = decoder
            .decode(&frame(0x81, [0x10, 0x00, 0x01], 0, 0, 60, 0))
            .unwrap();
        assert_eq!(events[0], TelemetryEvent::OperatingTime(0x010010 * 2));

        let events = decoder
            .decode(&frame(2, [7, 0x42, 0x00], 0, 0, 60, 0))
            .unwrap();
        assert_eq!(
            events[0],
            TelemetryEvent::ManufacturerInfo {
                manufacturer_id: 7,
                serial_number: 0x0042_1234,
            }
        );

        decoder.decode(&frame(3, [5, 12, 3], 0, 0, 60, 0)).unwrap();
        let t = decoder.telemetry();
        assert_eq!(
            (t.hardware_version, t.software_version, t.model_number),
            (5, 12, 3)
        );

        // Unchanged pages emit nothing extra.
        let events = decoder.decode(&frame(3, [5, 12, 3], 0, 0, 60, 0)).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_standard_frame_without_rssi() {
        let mut decoder = BroadcastDecoder::new(1);
        let message = [9, 0x4E, 0, 0, 0, 0, 0, 0x10, 0x00, 1, 80];
        let events = decoder.decode(&message).unwrap();
        assert_eq!(events, vec![TelemetryEvent::NewBpm(80)]);
    }

    #[test]
    fn test_truncated_frames_rejected() {
        let mut decoder = BroadcastDecoder::new(1);
        assert_eq!(
            decoder.decode(&[9, 0x4E, 0, 0]),
            Err(DecodeError::Truncated {
                expected: 11,
                actual: 4,
            })
        );

        let extended_short = [13, 0x4E, 0, 0, 0, 0, 0, 0, 0, 1, 80, 0x40];
        assert!(matches!(
            decoder.decode(&extended_short),
            Err(DecodeError::Truncated { expected: 14, .. })
        ));
        assert_eq!(decoder.page_state(), PageState::Init);
    }

    #[test]
    fn test_needs_channel_id_until_learned() {
        let mut decoder = BroadcastDecoder::new(WILDCARD);
        assert!(decoder.needs_channel_id());
        decoder.set_device_number(555);
        assert!(!decoder.needs_channel_id());
        decoder.reset();
        assert_eq!(decoder.telemetry().device_number, 555);
    }
}
