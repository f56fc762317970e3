//! End-to-end lifecycle: open, firmware, homing, profile, control loop.

use falcon_core::DeviceIndex;
use falcon_hardware::{DeviceConnection, FalconDevice, FirmwareImage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::Bus;
use crate::config::DriverConfig;
use crate::control_loop::{ControlLoop, LoopStats};
use crate::error::{DriverError, Result};
use crate::firmware::FirmwareLoader;
use crate::force_gate::ForceGate;
use crate::homing::{Homed, HomingSequencer};

/// Brings a device up and runs it until shutdown.
///
/// # Examples
///
/// ```no_run
/// use falcon_driver::{DriverConfig, FalconDriver, RecordingBus, force_channel};
/// use falcon_hardware::mock::{MockFalcon, SIMULATOR_FIRMWARE};
/// use falcon_hardware::FirmwareImage;
/// use falcon_core::DeviceIndex;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> falcon_driver::Result<()> {
/// let config = DriverConfig::default();
/// let (_inbox, gate) = force_channel(config.force_staleness);
/// let (falcon, _handle) = MockFalcon::simulator(100);
///
/// let stats = FalconDriver::new(config, RecordingBus::new())
///     .with_firmware(FirmwareImage::from_static(SIMULATOR_FIRMWARE))
///     .run(falcon, DeviceIndex::new(0), gate, CancellationToken::new())
///     .await?;
/// println!("{} cycles", stats.cycles);
/// # Ok(())
/// # }
/// ```
pub struct FalconDriver<B: Bus> {
    config: DriverConfig,
    bus: B,
    firmware: Option<FirmwareImage>,
}

impl<B: Bus> FalconDriver<B> {
    pub fn new(config: DriverConfig, bus: B) -> Self {
        Self {
            config,
            bus,
            firmware: None,
        }
    }

    /// Image uploaded if the device has no firmware running.
    #[must_use]
    pub fn with_firmware(mut self, image: FirmwareImage) -> Self {
        self.firmware = Some(image);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Open the device at `index` and take it to a homed, configured state.
    ///
    /// On failure the connection, if it was opened, is closed before
    /// returning.
    ///
    /// # Errors
    ///
    /// - [`DriverError::Open`] if no device is attached at `index`.
    /// - [`DriverError::Firmware`] or [`DriverError::Homing`] from the
    ///   respective phase.
    /// - [`DriverError::Cancelled`] if `shutdown` fires while homing.
    pub async fn bring_up<D: FalconDevice>(
        &self,
        device: D,
        index: DeviceIndex,
        shutdown: &CancellationToken,
    ) -> Result<(DeviceConnection<D>, Homed)> {
        let mut conn = DeviceConnection::open(device, index)
            .await
            .map_err(DriverError::Open)?;

        match self.prepare(&mut conn, shutdown).await {
            Ok(homed) => Ok((conn, homed)),
            Err(e) => {
                if let Err(close_err) = conn.close().await {
                    warn!(error = %close_err, "Failed to close device after bring-up failure");
                }
                Err(e)
            }
        }
    }

    async fn prepare<D: FalconDevice>(
        &self,
        conn: &mut DeviceConnection<D>,
        shutdown: &CancellationToken,
    ) -> Result<Homed> {
        let ready = FirmwareLoader::from_config(&self.config)
            .ensure_firmware(conn, self.firmware.as_ref())
            .await?;

        let sequencer = HomingSequencer::from_config(&self.config);
        let homed = tokio::select! {
            result = sequencer.run(conn, &ready) => result?,
            () = shutdown.cancelled() => return Err(DriverError::Cancelled),
        };

        conn.configure(self.config.profile).await?;
        Ok(homed)
    }

    /// Bring the device up, then run the control loop until `shutdown`.
    ///
    /// A shutdown requested before the device is ready ends the run cleanly
    /// with empty statistics.
    ///
    /// # Errors
    ///
    /// Returns the first bring-up or control loop error.
    pub async fn run<D: FalconDevice>(
        self,
        device: D,
        index: DeviceIndex,
        gate: ForceGate,
        shutdown: CancellationToken,
    ) -> Result<LoopStats> {
        let (conn, homed) = match self.bring_up(device, index, &shutdown).await {
            Ok(ready) => ready,
            Err(DriverError::Cancelled) => {
                info!("Shutdown requested before the device was ready");
                return Ok(LoopStats::default());
            }
            Err(e) => return Err(e),
        };

        let control = ControlLoop::new(conn, homed, gate, self.bus, &self.config);
        Ok(control.run(shutdown).await?)
    }
}
