//! # Dengo Bridge
//!
//! Drive a train simulator with Densha de GO! controllers.
//!
//! Stand-in host for the input bridge: lists controllers, runs the
//! calibration wizard for classic adapters and runs a frame loop that logs
//! the commands a simulator would receive.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, timeout, Duration, Instant};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use dengo_bridge::bridge::{BridgeSettings, InputBridge};
use dengo_bridge::commands::CommandEvent;
use dengo_bridge::config::{Config, LoggingConfig};
use dengo_bridge::controller::decoder::Decoder;
use dengo_bridge::joystick::evdev_source::EvdevJoystickSource;
use dengo_bridge::notify::{Notifier, TracingNotifier};
use dengo_bridge::usb::libusb::LibUsbTransport;
use dengo_bridge::usb::poller::UsbPoller;

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Time between controller re-enumerations in the frame loop
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "dengo-bridge.log";

/// Drive a train simulator with Densha de GO! controllers.
#[derive(Debug, Parser)]
#[command(name = "dengo-bridge", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Print every detected controller as JSON
    List,
    /// Discover the raw inputs of a classic adapter and save them
    Calibrate,
    /// Run the frame loop and log host commands (default)
    Run,
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// Console logging plus an optional daily log file. The returned guard
/// flushes the file writer on drop.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn build_bridge(config: &Config) -> Result<InputBridge> {
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let usb = if config.usb.enabled {
        let poller = UsbPoller::spawn(
            LibUsbTransport::new(),
            Decoder::supported_usb_devices(),
            Arc::clone(&notifier),
            config.poller_config(),
        )
        .context("starting USB poll thread")?;
        Some(poller)
    } else {
        info!("Raw USB support disabled");
        None
    };

    Ok(InputBridge::new(
        BridgeSettings::from_config(config),
        Box::new(EvdevJoystickSource::new()),
        usb,
        notifier,
    ))
}

/// Refreshes twice so the poll thread gets one discovery pass in between.
async fn discover(bridge: &mut InputBridge, config: &Config) {
    bridge.refresh_controllers();
    if config.usb.enabled {
        tokio::time::sleep(config.poller_config().discovery_interval + config.poller_config().read_timeout).await;
        bridge.refresh_controllers();
    }
}

async fn list(mut bridge: InputBridge, config: &Config) -> Result<()> {
    discover(&mut bridge, config).await;
    println!("{}", serde_json::to_string_pretty(&bridge.controllers())?);
    bridge.shutdown();
    Ok(())
}

async fn calibrate(mut bridge: InputBridge, mut config: Config, path: &Path) -> Result<()> {
    discover(&mut bridge, &config).await;

    if bridge.active().is_none() {
        let candidate = bridge
            .controllers()
            .into_iter()
            .find(|c| c.connected && c.calibration_required)
            .context("no classic controller to calibrate")?;
        bridge.set_active(Some(&candidate.guid))?;
    }

    let mut prompt = bridge.begin_calibration()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let step_timeout = config.step_timeout();

    loop {
        println!("{} (press Enter)", prompt);
        match timeout(step_timeout, lines.next_line()).await {
            Ok(Ok(Some(_))) => {}
            Ok(Ok(None)) => {
                bridge.cancel_calibration();
                bail!("stdin closed during calibration");
            }
            Ok(Err(e)) => {
                bridge.cancel_calibration();
                return Err(e.into());
            }
            Err(_) => {
                bridge.cancel_calibration();
                bail!("calibration step timed out after {:?}", step_timeout);
            }
        }

        let progress = bridge.calibration_step()?;
        if progress.assigned.is_none() && progress.step.assigns() {
            warn!("No input changed for {:?}; the slot stays unassigned", progress.step);
        }
        if !bridge.is_calibrating() {
            break;
        }
        prompt = progress.next;
    }

    bridge.export_config(&mut config);
    config.save(path).with_context(|| format!("saving {}", path.display()))?;
    info!("Calibration saved to {}", path.display());
    bridge.shutdown();
    Ok(())
}

fn log_command(event: &CommandEvent) {
    match event {
        CommandEvent::Down(control) => info!("down {:?}({})", control.command, control.option),
        CommandEvent::Up(control) => debug!("up {:?}({})", control.command, control.option),
    }
}

async fn run(mut bridge: InputBridge, config: &Config) -> Result<()> {
    discover(&mut bridge, config).await;
    match bridge.active() {
        Some(active) => info!("Driving {}", active.name),
        None => warn!("No controller selected; set [general] controller (see `dengo-bridge list`)"),
    }

    let mut frame_interval = interval(config.frame_interval());
    let mut last_frame = Instant::now();
    let mut last_refresh = Instant::now();

    info!("Starting frame loop at {}Hz", config.general.frame_rate_hz);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = frame_interval.tick() => {
                let now = Instant::now();
                if now - last_refresh >= REFRESH_INTERVAL {
                    bridge.refresh_controllers();
                    last_refresh = now;
                }

                let frame = bridge.update(now - last_frame);
                last_frame = now;
                for event in &frame.commands {
                    log_command(event);
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    bridge.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    let _guard = init_logging(&config.logging);

    info!("Dengo Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let bridge = build_bridge(&config)?;
    match args.command.unwrap_or(Command::Run) {
        Command::List => list(bridge, &config).await,
        Command::Calibrate => calibrate(bridge, config.clone(), &args.config).await,
        Command::Run => run(bridge, &config).await,
    }
}
