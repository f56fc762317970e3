//! Enum wrapper for hardware device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn FalconDevice>`
//! is unavailable. [`AnyFalconDevice`] provides concrete dispatch instead;
//! the variant is chosen once at start-up and never re-checked in the
//! control loop.
//!
//! # Examples
//!
//! ```
//! use falcon_hardware::devices::AnyFalconDevice;
//! use falcon_hardware::mock::MockFalcon;
//!
//! let (falcon, _handle) = MockFalcon::new();
//! let device = AnyFalconDevice::Mock(falcon);
//! ```

use crate::mock::MockFalcon;
use crate::traits::FalconDevice;
use crate::{DeviceProfile, FirmwareImage, LedColor, Result};
use falcon_core::{ButtonMask, DeviceIndex, Force3, Position3};

/// Enum wrapper for Falcon device dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyFalconDevice {
    /// Mock device for development and testing.
    Mock(MockFalcon),
}

impl FalconDevice for AnyFalconDevice {
    async fn open(&mut self, index: DeviceIndex) -> Result<()> {
        match self {
            Self::Mock(device) => device.open(index).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.close().await,
        }
    }

    async fn is_firmware_loaded(&mut self) -> Result<bool> {
        match self {
            Self::Mock(device) => device.is_firmware_loaded().await,
        }
    }

    async fn load_firmware(&mut self, image: &FirmwareImage, skip_checksum: bool) -> Result<()> {
        match self {
            Self::Mock(device) => device.load_firmware(image, skip_checksum).await,
        }
    }

    async fn set_homing_mode(&mut self, enabled: bool) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_homing_mode(enabled).await,
        }
    }

    async fn clear_forces(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.clear_forces().await,
        }
    }

    async fn set_led(&mut self, color: LedColor) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_led(color).await,
        }
    }

    async fn configure(&mut self, profile: DeviceProfile) -> Result<()> {
        match self {
            Self::Mock(device) => device.configure(profile).await,
        }
    }

    async fn poll(&mut self) -> Result<bool> {
        match self {
            Self::Mock(device) => device.poll().await,
        }
    }

    fn position(&self) -> Position3 {
        match self {
            Self::Mock(device) => device.position(),
        }
    }

    fn button_mask(&self) -> ButtonMask {
        match self {
            Self::Mock(device) => device.button_mask(),
        }
    }

    fn is_homed(&self) -> bool {
        match self {
            Self::Mock(device) => device.is_homed(),
        }
    }

    async fn set_force(&mut self, force: Force3) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_force(force).await,
        }
    }
}

impl From<MockFalcon> for AnyFalconDevice {
    fn from(device: MockFalcon) -> Self {
        Self::Mock(device)
    }
}
