//! Heart-rate monitor agent CLI
//!
//! Runs the channel engine against a simulated radio or a recorded stream
//! of radio frames, and manages the persisted pairing settings.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use hrmon_agent::{
    channel::{ChannelState, WILDCARD},
    config::Config,
    core::{Clock, ManualClock, SystemClock},
    link::create_shared_counters,
    monitor::{event_queue, HeartRateMonitor, MonitorEvent},
    transport::{hex_string, QueueTransport, RadioEvent, SimulatedRadio, SimulatedSensor},
    VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Sensor message period in microseconds (8070 / 32768 s).
const MESSAGE_PERIOD_US: u64 = 8070 * 1_000_000 / 32_768;

#[derive(Parser)]
#[command(name = "hrmon")]
#[command(version = VERSION)]
#[command(about = "Heart-rate sensor channel engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a simulated heart-rate sensor
    Simulate {
        /// Device number of the simulated sensor
        #[arg(long, default_value = "4660")]
        device: u16,

        /// Heart rate of the simulated sensor
        #[arg(long, default_value = "64")]
        bpm: u8,

        /// Drop every Nth broadcast (RX failure)
        #[arg(long)]
        drop_every: Option<u32>,

        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(long)]
        duration: Option<u64>,

        /// Time multiplier for the simulated sensor
        #[arg(long, default_value = "1")]
        speed: u32,

        /// Do not record a session once the sensor is tracked
        #[arg(long)]
        no_session: bool,
    },

    /// Replay recorded radio frames through the engine
    Replay {
        /// File with one frame per line
        #[arg(long, short)]
        input: PathBuf,

        /// Line format
        #[arg(long, value_enum, default_value = "hex")]
        format: ReplayFormat,

        /// Export the replayed session to the configured export path
        #[arg(long)]
        export: bool,
    },

    /// Pair with a sensor by device number, or forget the pairing
    Pair {
        /// Device number to pair with
        device: Option<u16>,

        /// Restore wildcard pairing and default settings
        #[arg(long, conflicts_with = "device")]
        reset: bool,
    },

    /// Show pairing and link statistics
    Status,

    /// Show configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReplayFormat {
    /// Raw frames as hex bytes (`0D 4E 00 ...` or `[0D][4E][00]...`)
    Hex,
    /// One JSON-encoded radio event per line
    Jsonl,
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    init_tracing(&config.log_filter);

    let result = match cli.command {
        Commands::Simulate {
            device,
            bpm,
            drop_every,
            duration,
            speed,
            no_session,
        } => cmd_simulate(config, device, bpm, drop_every, duration, speed, !no_session),
        Commands::Replay {
            input,
            format,
            export,
        } => cmd_replay(&config, &input, format, export),
        Commands::Pair { device, reset } => cmd_pair(config, device, reset),
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Config => cmd_config(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_simulate(
    mut config: Config,
    device: u16,
    bpm: u8,
    drop_every: Option<u32>,
    duration: Option<u64>,
    speed: u32,
    record_session: bool,
) -> anyhow::Result<()> {
    println!("Heart-rate monitor agent v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let (tx, rx) = event_queue();
    let mut radio = SimulatedRadio::new(tx.clone(), SimulatedSensor::new(device, bpm));
    if let Some(n) = drop_every {
        radio = radio.with_drop_every(n);
    }

    let counters = create_shared_counters(Some(config.data_path.join("link_stats.json")));
    let mut monitor = HeartRateMonitor::new(
        radio,
        (tx, rx),
        config.sensor,
        Arc::new(SystemClock::new()),
    )
    .with_counters(counters.clone());
    let events = monitor.subscribe();

    println!("Simulated sensor: device {device}, {bpm} bpm");
    if config.sensor.device_number == WILDCARD {
        println!("Pairing: wildcard (proximity bin {})", config.sensor.proximity_bin);
    } else {
        println!("Pairing: device {}", config.sensor.device_number);
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let period = Duration::from_micros(MESSAGE_PERIOD_US / u64::from(speed.max(1)));
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));

    monitor.connect_sensor();

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        if let Err(e) = monitor.transport_mut().tick() {
            warn!("Simulated radio tick failed: {e}");
        }
        monitor.pump();

        for event in events.try_iter() {
            print_event(&event);
            match event {
                MonitorEvent::ChannelStateChanged(ChannelState::TrackingData)
                    if record_session && !monitor.session().is_started() =>
                {
                    monitor.start_session();
                    println!("Session started");
                }
                MonitorEvent::DeviceNumberLearned(device_number) => {
                    config.sensor.device_number = device_number;
                    if let Err(e) = config.save() {
                        eprintln!("Warning: Could not save pairing: {e}");
                    }
                }
                MonitorEvent::SessionLimitReached => running.store(false, Ordering::SeqCst),
                _ => {}
            }
        }

        thread::sleep(period);
    }

    println!();
    println!("Stopping...");
    monitor.stop_session();
    monitor.disconnect_sensor();
    monitor.pump();

    let session = monitor.session();
    if !session.series().bpm.is_empty() {
        println!(
            "Session: {} s, last {} bpm, throughput {}%",
            session.elapsed_ms() / 1000,
            session.last_bpm(),
            session.throughput()
        );
        match monitor.save_export(&config.export_path) {
            Ok(path) => println!("Exported session to {path:?}"),
            Err(e) => eprintln!("Error writing session: {e}"),
        }
    }

    if let Err(e) = counters.save() {
        eprintln!("Warning: Could not save link statistics: {e}");
    }

    println!();
    println!("{}", counters.summary());
    Ok(())
}

fn cmd_replay(
    config: &Config,
    input: &Path,
    format: ReplayFormat,
    export: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;

    let clock = ManualClock::new(SystemClock::new().now_ms());
    let mut monitor = HeartRateMonitor::new(
        QueueTransport::new(),
        event_queue(),
        config.sensor,
        Arc::new(clock.clone()),
    );
    let events = monitor.subscribe();
    let sender = monitor.sender();
    monitor.start_session();

    let mut frames = 0usize;
    let mut issued = 0usize;
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event = match format {
            ReplayFormat::Hex => {
                let frame = parse_hex_frame(line)
                    .with_context(|| format!("line {}: invalid hex frame", number + 1))?;
                match RadioEvent::from_message(&frame) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(line = number + 1, frame = %hex_string(&frame), "Skipping frame: {e}");
                        continue;
                    }
                }
            }
            ReplayFormat::Jsonl => serde_json::from_str::<RadioEvent>(line)
                .with_context(|| format!("line {}: invalid radio event", number + 1))?,
        };

        if matches!(event, RadioEvent::BroadcastData { .. }) {
            clock.advance_ms(MESSAGE_PERIOD_US / 1000);
        }
        sender.send(event).context("event queue closed")?;
        frames += 1;
        monitor.pump();
        // Nothing answers these; count what the engine would have sent.
        issued += monitor.transport().drain().len();

        for event in events.try_iter() {
            print_event(&event);
        }
    }

    info!(frames, commands = issued, "Replay finished");

    monitor.stop_session();
    let session = monitor.session();
    println!();
    println!("Replayed {frames} frame(s)");
    println!("  BPM samples: {}", session.series().bpm.len());
    println!("  RR samples: {}", session.series().rr.len());
    println!(
        "  Packets: {} received, {} dropped ({}%)",
        session.packets_received(),
        session.packets_dropped(),
        session.throughput()
    );

    if export {
        let path = monitor
            .save_export(&config.export_path)
            .context("writing session export")?;
        println!("Exported session to {path:?}");
    }
    Ok(())
}

fn cmd_pair(mut config: Config, device: Option<u16>, reset: bool) -> anyhow::Result<()> {
    if reset {
        config.sensor.reset();
    } else if let Some(device) = device {
        config.sensor.device_number = device;
    } else {
        bail!("give a device number or --reset");
    }

    config.save().context("saving config")?;
    if config.sensor.is_paired() {
        println!("Paired with device {}", config.sensor.device_number);
    } else {
        println!("Pairing reset; the next connection pairs with the nearest sensor.");
    }
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Heart-Rate Monitor Agent Status");
    println!("===============================");
    println!();

    println!("Pairing:");
    if config.sensor.is_paired() {
        println!("  Device number: {}", config.sensor.device_number);
    } else {
        println!("  Device number: wildcard (not paired)");
    }
    println!("  Proximity bin: {}", config.sensor.proximity_bin);
    println!("  Buffer threshold: {}", config.sensor.buffer_threshold);
    println!();

    let stats_path = config.data_path.join("link_stats.json");
    if stats_path.exists() {
        let stats = create_shared_counters(Some(stats_path)).stats();
        println!("Cumulative Statistics:");
        println!("  Packets received: {}", stats.total_received);
        println!("  Packets dropped: {}", stats.total_dropped);
        println!("  Sessions exported: {}", stats.sessions_exported);
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::ChannelStateChanged(state) => println!("Channel: {state}"),
        MonitorEvent::RadioStateChanged(state) => println!("Radio: {state}"),
        MonitorEvent::NewBpm(_) | MonitorEvent::NewRssi(_) => {}
        MonitorEvent::NewRr(rr) => println!("RR: {rr} ms"),
        MonitorEvent::DeviceNumberLearned(n) => println!("Paired with device {n}"),
        MonitorEvent::DeviceInfoChanged(info) => println!(
            "Sensor: manufacturer {}, serial {}, hw {}, sw {}, model {}",
            info.manufacturer_id,
            info.serial_number,
            info.hardware_version,
            info.software_version,
            info.model_number
        ),
        MonitorEvent::SessionLimitReached => println!("Session time limit reached"),
        MonitorEvent::Error(e) => eprintln!("Error: {e}"),
    }
}

/// Parse `0D 4E 00`, `0d4e00` or `[0D][4E][00]` into bytes.
fn parse_hex_frame(line: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = line
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ' ' | ',' | ':'))
        .collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        bail!("expected pairs of hex digits");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(Into::into))
        .collect()
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
