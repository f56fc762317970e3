//! Falcon haptic driver.
//!
//! Brings the simulated Falcon up, then streams telemetry as JSON lines on
//! stdout and reads `{"x":..,"y":..,"z":..}` force commands from stdin until
//! Ctrl-C. Diagnostics go to stderr; set `RUST_LOG` to change verbosity.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use falcon_core::DeviceIndex;
use falcon_driver::{DriverConfig, FalconDriver, JsonLinesBus, force_channel, pump_force_commands};
use falcon_hardware::mock::{MockFalcon, SIMULATOR_FIRMWARE};
use falcon_hardware::{AnyFalconDevice, FirmwareImage};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Successful polls before the simulator reports itself homed.
const SIMULATOR_HOMING_POLLS: u32 = 2000;

/// Telemetry lines buffered for stdout before events are dropped.
const OUTPUT_QUEUE_CAPACITY: usize = 4096;

/// How long to wait for queued telemetry to reach stdout on exit.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "falcon-driver")]
#[command(version, about = "Novint Falcon haptic driver")]
struct Cli {
    /// Unit to open: `-l` for the left Falcon, `-r` for the right.
    /// Anything else opens the default unit.
    #[arg(allow_hyphen_values = true)]
    side: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let index = DeviceIndex::from_side_arg(cli.side.as_deref());
    let config = DriverConfig::from_env().context("Invalid FALCON_* environment")?;
    let firmware = match &config.firmware_path {
        Some(path) => FirmwareImage::from_file(path)
            .with_context(|| format!("Failed to read firmware {}", path.display()))?,
        None => FirmwareImage::from_static(SIMULATOR_FIRMWARE),
    };
    info!(%index, version = falcon_core::VERSION, "Starting Falcon driver");

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C, shutting down"),
        }
        on_signal.cancel();
    });

    let (inbox, gate) = force_channel(config.force_staleness);
    tokio::spawn(async move {
        match pump_force_commands(BufReader::new(tokio::io::stdin()), &inbox).await {
            Ok(delivered) => debug!(delivered, "stdin closed"),
            Err(e) => warn!(error = %e, "Failed to read force commands"),
        }
    });

    let (bus, writer) = JsonLinesBus::channel(OUTPUT_QUEUE_CAPACITY);
    let output = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        match writer.run(&mut stdout).await {
            Ok(lines) => debug!(lines, "stdout writer finished"),
            Err(e) => warn!(error = %e, "Failed to write telemetry"),
        }
    });

    let (falcon, _handle) = MockFalcon::simulator(SIMULATOR_HOMING_POLLS);
    let stats = FalconDriver::new(config, bus)
        .with_firmware(firmware)
        .run(AnyFalconDevice::from(falcon), index, gate, shutdown)
        .await
        .context("Falcon driver failed")?;
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, output).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "stdout writer task failed"),
        Err(_) => warn!("stdout not drained before exit"),
    }

    info!(
        cycles = stats.cycles,
        positions = stats.positions_published,
        button_events = stats.button_events,
        "Falcon driver stopped"
    );
    Ok(())
}
