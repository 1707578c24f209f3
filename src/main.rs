// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use uroflow::config::Config;
use uroflow::drivers::{available_ports, LinkBackend, SerialBackend, SimulatedBackend, StoreError};
use uroflow::report::NO_DATA_MESSAGE;
use uroflow::{
    summarize, CalibrationChannel, ConnectionMode, DeviceCommand, Engine, LinkSettings,
    PatientIdentity, SessionStore,
};

/// Flowmeter acquisition and session tool
#[derive(Parser)]
#[command(name = "uroflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, global = true, default_value = "uroflow.toml")]
    config: PathBuf,

    /// Serial port (overrides config)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Baud rate (overrides config)
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Use the built-in device simulator instead of the serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Directory holding session files (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports reported by the OS
    Ports,

    /// Acquire a session for a fixed duration, optionally saving it
    Monitor {
        /// Seconds to acquire
        #[arg(short, long, default_value = "60")]
        duration: u64,

        /// Patient id to save the session under
        #[arg(long, requires_all = ["first_name", "last_name"])]
        patient_id: Option<String>,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,
    },

    /// Print summary statistics of a stored session
    Report {
        #[arg(value_name = "PATIENT_ID")]
        patient_id: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List stored session keys
    Sessions,

    /// Device calibration
    Calibrate {
        #[command(subcommand)]
        action: CalibrateAction,
    },
}

#[derive(Subcommand)]
enum CalibrateAction {
    /// Send a calibration value (C<value>); blank means the default
    Send {
        #[arg(default_value = "")]
        value: String,
    },
    /// Zero the volume reading (T)
    Tare,
    /// Show live readings
    Live {
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },
}

struct Runtime {
    backend: Arc<dyn LinkBackend>,
    settings: LinkSettings,
    poll_interval: Duration,
    window_seconds: f64,
    capacity: usize,
    store: SessionStore,
}

impl Runtime {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config = if cli.config.exists() {
            Config::from_file(&cli.config)?
        } else {
            Config::default()
        };
        let mut settings = config.link_settings();
        if let Some(port) = &cli.port {
            settings.port = port.clone();
        }
        if let Some(baud) = cli.baud {
            settings.baud = baud;
        }
        let mode = if cli.simulate {
            ConnectionMode::Simulation
        } else {
            config.mode()
        };
        let backend: Arc<dyn LinkBackend> = match mode {
            ConnectionMode::Simulation => Arc::new(SimulatedBackend::default()),
            ConnectionMode::Hardware => Arc::new(SerialBackend),
        };
        info!("{mode:?} mode on {} at {} baud", settings.port, settings.baud);
        Ok(Self {
            backend,
            settings,
            poll_interval: config.poll_interval(),
            window_seconds: config.window_seconds(),
            capacity: config.channel_capacity(),
            store: SessionStore::new(cli.data_dir.clone().unwrap_or_else(|| config.data_dir())),
        })
    }

    fn engine(&self) -> Engine {
        Engine::new(
            Arc::clone(&self.backend),
            self.settings.clone(),
            self.capacity,
            self.window_seconds,
            self.store.clone(),
        )
    }

    fn calibration(&self) -> CalibrationChannel {
        CalibrationChannel::new(
            Arc::clone(&self.backend),
            self.settings.clone(),
            self.capacity,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let runtime = Runtime::from_cli(&cli)?;
    match cli.command {
        Commands::Ports => run_ports(),
        Commands::Monitor {
            duration,
            patient_id,
            first_name,
            last_name,
        } => {
            let identity = match (patient_id, first_name, last_name) {
                (Some(id), Some(first), Some(last)) => Some(PatientIdentity::new(id, first, last)),
                _ => None,
            };
            run_monitor(&runtime, Duration::from_secs(duration), identity)
        }
        Commands::Report { patient_id, json } => run_report(&runtime, &patient_id, json),
        Commands::Sessions => run_sessions(&runtime),
        Commands::Calibrate { action } => match action {
            CalibrateAction::Send { value } => {
                let command = DeviceCommand::calibration_from_input(&value)?;
                runtime
                    .calibration()
                    .send(command)
                    .with_context(|| format!("Failed to send calibration command {command}"))?;
                println!("Calibration command sent: \"{command}\"");
                Ok(())
            }
            CalibrateAction::Tare => {
                runtime
                    .calibration()
                    .send(DeviceCommand::Tare)
                    .context("Failed to send zero/tare command")?;
                println!("Zero tare command sent.");
                Ok(())
            }
            CalibrateAction::Live { duration } => {
                run_calibration_live(&runtime, Duration::from_secs(duration))
            }
        },
    }
}

fn run_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn run_monitor(
    runtime: &Runtime,
    duration: Duration,
    identity: Option<PatientIdentity>,
) -> Result<()> {
    let mut engine = runtime.engine();
    engine.start()?;
    let deadline = Instant::now() + duration;
    let mut last_print = Instant::now();
    let mut failure = None;
    while Instant::now() < deadline {
        thread::sleep(runtime.poll_interval);
        let tick = engine.tick();
        if let Some(reason) = tick.error {
            failure = Some(reason);
            break;
        }
        if let Some(reading) = tick.latest {
            if last_print.elapsed() >= Duration::from_secs(1) {
                println!(
                    "Flowmeter: {:.2}  Volume: {:.2}",
                    reading.flow, reading.volume
                );
                last_print = Instant::now();
            }
        }
    }
    let last = engine.stop();
    if failure.is_none() {
        failure = last.error;
    }

    if let Some(reason) = failure {
        error!("serial link failed: {reason}");
        if engine.recorder().is_empty() {
            bail!("Failed to acquire from {}: {reason}", runtime.settings.port);
        }
    }

    if let Some(identity) = identity {
        let key = engine.save(&identity).context("Failed to save session")?;
        println!(
            "Saved {} samples to {}",
            engine.recorder().len(),
            runtime.store.path_for(&key).display()
        );
    }
    println!("{}", engine.summary());
    Ok(())
}

fn run_report(runtime: &Runtime, patient_id: &str, json: bool) -> Result<()> {
    let samples = match runtime.store.decode(patient_id) {
        Ok(samples) => samples,
        Err(StoreError::NotFound { .. }) => {
            println!("{NO_DATA_MESSAGE}");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to load session"),
    };
    let summary = summarize(&samples);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}

fn run_sessions(runtime: &Runtime) -> Result<()> {
    for key in runtime.store.list()? {
        println!("{key}");
    }
    Ok(())
}

fn run_calibration_live(runtime: &Runtime, duration: Duration) -> Result<()> {
    let mut channel = runtime.calibration();
    channel.start()?;
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        thread::sleep(runtime.poll_interval);
        let poll = channel.poll();
        if let Some(reason) = poll.error {
            bail!("Serial link failed: {reason}");
        }
        if let Some(reading) = poll.latest {
            println!(
                "Flowmeter: {:.2}  Volume: {:.2}",
                reading.flow, reading.volume
            );
        }
    }
    channel.stop();
    Ok(())
}
