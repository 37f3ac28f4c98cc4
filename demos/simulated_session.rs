//! Demonstration of a heart-rate session against the simulated radio.
//!
//! This example shows how to:
//! 1. Wire a radio transport into the monitor's event queue
//! 2. Connect to a sensor and watch the channel come up
//! 3. Record a session once the sensor is tracked
//! 4. Consume monitor events on another thread
//! 5. Export the finished session
//!
//! Run with: cargo run --example simulated_session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hrmon_agent::{
    channel::ChannelState,
    core::SystemClock,
    monitor::{event_queue, HeartRateMonitor, MonitorEvent},
    transport::{SimulatedRadio, SimulatedSensor},
    SensorSettings,
};

/// Sensor message period (8070 / 32768 s).
const MESSAGE_PERIOD: Duration = Duration::from_micros(246_277);

fn main() {
    println!("Heart-Rate Monitor - Simulated Session");
    println!("======================================");
    println!();

    let (tx, rx) = event_queue();
    let mut sensor = SimulatedSensor::new(0x1234, 68);
    sensor.rssi = -55;
    let radio = SimulatedRadio::new(tx.clone(), sensor).with_drop_every(25);

    let mut monitor = HeartRateMonitor::new(
        radio,
        (tx, rx),
        SensorSettings::default(),
        Arc::new(SystemClock::new()),
    );

    // Print events as they arrive.
    let events = monitor.subscribe();
    let printer = thread::spawn(move || {
        for event in events {
            match event {
                MonitorEvent::ChannelStateChanged(state) => println!("  channel: {state}"),
                MonitorEvent::RadioStateChanged(state) => println!("  radio:   {state}"),
                MonitorEvent::NewBpm(bpm) => println!("  {bpm} bpm"),
                MonitorEvent::NewRr(rr) => println!("  rr {rr} ms"),
                MonitorEvent::DeviceNumberLearned(device) => {
                    println!("  paired with device {device}")
                }
                MonitorEvent::DeviceInfoChanged(info) => println!(
                    "  sensor: manufacturer {} serial {:#010x}",
                    info.manufacturer_id, info.serial_number
                ),
                MonitorEvent::Error(e) => println!("  error: {e}"),
                _ => {}
            }
        }
    });

    println!("Connecting for 20 seconds (Ctrl+C to stop early)...");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    monitor.connect_sensor();
    monitor.pump();

    let deadline = Instant::now() + Duration::from_secs(20);
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(MESSAGE_PERIOD);
        if let Err(e) = monitor.transport_mut().tick() {
            eprintln!("Radio error: {e}");
            break;
        }
        monitor.pump();

        if monitor.state() == ChannelState::TrackingData && !monitor.session().is_started() {
            monitor.start_session();
        }
    }

    monitor.stop_session();
    monitor.disconnect_sensor();
    monitor.pump();

    let export = monitor.export();
    drop(monitor);
    let _ = printer.join();

    println!();
    println!("Session summary:");
    println!("  samples:    {}", export.series.bpm.len());
    println!("  elapsed:    {} ms", export.elapsed_ms);
    println!(
        "  throughput: {}% ({} received, {} dropped)",
        export.link.throughput, export.link.packets_received, export.link.packets_dropped
    );
    println!();

    match export.to_json() {
        Ok(json) => println!("Export:\n{json}"),
        Err(e) => eprintln!("Error serializing export: {e}"),
    }
}
