//! Owned connection to one physical device.
//!
//! [`DeviceConnection`] is the single handle through which the firmware
//! loader, the homing sequencer, and the control loop reach the device. It is
//! passed explicitly to each of them rather than living in global state, and
//! it enforces the lifecycle rules of the hardware:
//!
//! - `Opening → Open` on a successful [`open`](DeviceConnection::open);
//!   `Open → Closed` on [`close`](DeviceConnection::close).
//! - Once closed, every operation fails with [`HardwareError::Closed`],
//!   including a second `close()`.
//! - Homing cannot start until firmware is confirmed running.
//! - The actuation entry point refuses to run until the device is homed.
//!
//! # Examples
//!
//! ```
//! use falcon_hardware::connection::DeviceConnection;
//! use falcon_hardware::mock::MockFalcon;
//! use falcon_hardware::{ConnectionState, HardwareError};
//! use falcon_core::DeviceIndex;
//!
//! #[tokio::main]
//! async fn main() -> falcon_hardware::Result<()> {
//!     let (falcon, _handle) = MockFalcon::new();
//!     let mut conn = DeviceConnection::open(falcon, DeviceIndex::new(0)).await?;
//!     assert_eq!(conn.state(), ConnectionState::Open);
//!
//!     conn.close().await?;
//!     assert!(matches!(conn.poll().await, Err(HardwareError::Closed)));
//!     Ok(())
//! }
//! ```

use crate::devices::AnyFalconDevice;
use crate::error::{HardwareError, Result};
use crate::traits::FalconDevice;
use crate::types::{
    ConnectionState, DeviceProfile, FirmwareImage, FirmwareStatus, HomingStatus,
    LedColor,
};
use falcon_core::{ButtonMask, DeviceIndex, Force3, Position3};
use tracing::{debug, info, trace, warn};

/// Open connection to a Falcon.
#[derive(Debug)]
pub struct DeviceConnection<D: FalconDevice = AnyFalconDevice> {
    device: D,
    index: DeviceIndex,
    state: ConnectionState,
    firmware: FirmwareStatus,
    homing: HomingStatus,
    profile: Option<DeviceProfile>,
}

impl<D: FalconDevice> DeviceConnection<D> {
    /// Open the unit at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::NotFound`] if no unit is attached at `index`,
    /// or any transport error raised while opening.
    pub async fn open(device: D, index: DeviceIndex) -> Result<Self> {
        let mut conn = Self {
            device,
            index,
            state: ConnectionState::Opening,
            firmware: FirmwareStatus::NotLoaded,
            homing: HomingStatus::Unhomed,
            profile: None,
        };

        info!(%index, "Setting up device transport");
        conn.device.open(index).await?;
        conn.state = ConnectionState::Open;
        info!(%index, "Device found");

        Ok(conn)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closed => Err(HardwareError::Closed),
            ConnectionState::Opening => Err(HardwareError::NotOpen),
        }
    }

    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Firmware status as of the last [`refresh_firmware_status`](Self::refresh_firmware_status).
    pub fn firmware_status(&self) -> FirmwareStatus {
        self.firmware
    }

    pub fn homing_status(&self) -> HomingStatus {
        self.homing
    }

    /// Profile applied by [`configure`](Self::configure), if any.
    pub fn profile(&self) -> Option<DeviceProfile> {
        self.profile
    }

    /// Ask the device whether firmware is running and cache the answer.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close, or a transport error.
    pub async fn refresh_firmware_status(&mut self) -> Result<FirmwareStatus> {
        self.ensure_open()?;
        self.firmware = if self.device.is_firmware_loaded().await? {
            FirmwareStatus::Loaded
        } else {
            FirmwareStatus::NotLoaded
        };
        Ok(self.firmware)
    }

    /// Make a single firmware upload attempt.
    ///
    /// The cached status is not changed; confirm with
    /// [`refresh_firmware_status`](Self::refresh_firmware_status).
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::FirmwareUpload`] when the attempt is rejected.
    pub async fn upload_firmware(&mut self, image: &FirmwareImage, skip_checksum: bool) -> Result<()> {
        self.ensure_open()?;
        debug!(bytes = image.len(), skip_checksum, "Uploading firmware");
        self.device.load_firmware(image, skip_checksum).await
    }

    /// Enable homing mode and zero the firmware force registers.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::FirmwareNotLoaded`] unless firmware has been
    /// confirmed running.
    pub async fn begin_homing(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.firmware != FirmwareStatus::Loaded {
            return Err(HardwareError::FirmwareNotLoaded);
        }
        self.device.set_homing_mode(true).await?;
        self.device.clear_forces().await?;
        info!(index = %self.index, "Homing mode set");
        Ok(())
    }

    /// Fold the device's current homing flag into the session status.
    ///
    /// The status never moves back once `Homed` has been observed.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close.
    pub fn observe_homing(&mut self) -> Result<HomingStatus> {
        self.ensure_open()?;
        let next = self.homing.observe(self.device.is_homed());
        if next != self.homing {
            debug!(from = %self.homing, to = %next, "Homing status changed");
        }
        self.homing = next;
        Ok(self.homing)
    }

    /// Set the LED color.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close, or a transport error.
    pub async fn set_led(&mut self, color: LedColor) -> Result<()> {
        self.ensure_open()?;
        self.device.set_led(color).await
    }

    /// Apply the capability variants chosen at start-up.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close, or whatever the
    /// transport reports when it rejects the profile.
    pub async fn configure(&mut self, profile: DeviceProfile) -> Result<()> {
        self.ensure_open()?;
        self.device.configure(profile).await?;
        self.profile = Some(profile);
        info!(%profile, "Device profile applied");
        Ok(())
    }

    /// Run one I/O exchange; `Ok(false)` means no new data.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close, or a transport error.
    pub async fn poll(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.device.poll().await
    }

    /// Position from the last successful poll.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close.
    pub fn position(&self) -> Result<Position3> {
        self.ensure_open()?;
        Ok(self.device.position())
    }

    /// Grip inputs from the last successful poll.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] after close.
    pub fn button_mask(&self) -> Result<ButtonMask> {
        self.ensure_open()?;
        Ok(self.device.button_mask())
    }

    /// Actuation entry point.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::NotHomed`] until homing has completed,
    /// [`HardwareError::Closed`] after close, or a transport error.
    pub async fn set_force(&mut self, force: Force3) -> Result<()> {
        self.ensure_open()?;
        if !self.homing.is_homed() {
            return Err(HardwareError::NotHomed);
        }
        trace!(x = force.x, y = force.y, z = force.z, "Set force");
        self.device.set_force(force).await
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Closed`] if the connection is already closed.
    /// The connection is marked closed even if the transport reports an error.
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = ConnectionState::Closed;
        info!(index = %self.index, "Closing device");
        self.device.close().await
    }
}

impl<D: FalconDevice> Drop for DeviceConnection<D> {
    fn drop(&mut self) {
        if self.state == ConnectionState::Open {
            warn!(index = %self.index, "DeviceConnection dropped while open - transport handle released without close");
        }
    }
}
