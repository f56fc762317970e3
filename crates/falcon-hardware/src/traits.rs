//! Hardware device trait definitions.
//!
//! This module defines the contract between the driver core and a haptic
//! device transport. The transport owns USB framing, the firmware upload
//! protocol, and the kinematic transform; the driver only sees the
//! operations below.
//!
//! All I/O methods use native `async fn` (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro. Accessors for the state
//! captured by the last successful [`poll`](FalconDevice::poll) are plain
//! functions because they never touch the transport.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{DeviceProfile, FirmwareImage, LedColor};
use falcon_core::{ButtonMask, DeviceIndex, Force3, Position3};

/// Haptic device abstraction.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic type parameters, or the enum wrapper
/// [`AnyFalconDevice`](crate::devices::AnyFalconDevice) when a concrete type
/// is needed.
///
/// # Examples
///
/// ```no_run
/// use falcon_hardware::traits::FalconDevice;
/// use falcon_hardware::error::Result;
/// use falcon_core::Position3;
///
/// async fn sample<D: FalconDevice>(device: &mut D) -> Result<Option<Position3>> {
///     if device.poll().await? {
///         Ok(Some(device.position()))
///     } else {
///         Ok(None)
///     }
/// }
/// ```
pub trait FalconDevice: Send + Sync {
    /// Open the unit at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::NotFound`](crate::HardwareError::NotFound)
    /// if no unit is attached at that index.
    async fn open(&mut self, index: DeviceIndex) -> Result<()>;

    /// Release the unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to release the handle.
    async fn close(&mut self) -> Result<()>;

    /// Query whether firmware is running on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs.
    async fn is_firmware_loaded(&mut self) -> Result<bool>;

    /// Make one attempt at uploading `image`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::FirmwareUpload`](crate::HardwareError::FirmwareUpload)
    /// if the attempt is rejected. Callers decide whether to retry.
    async fn load_firmware(&mut self, image: &FirmwareImage, skip_checksum: bool) -> Result<()>;

    /// Enable or disable firmware homing mode (encoder tracking).
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs.
    async fn set_homing_mode(&mut self, enabled: bool) -> Result<()>;

    /// Zero the raw firmware force registers.
    ///
    /// This is part of the homing handshake and does not go through the
    /// actuation path of [`set_force`](FalconDevice::set_force).
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs.
    async fn clear_forces(&mut self) -> Result<()>;

    /// Set the LED color.
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs.
    async fn set_led(&mut self, color: LedColor) -> Result<()>;

    /// Select the firmware, kinematic, and grip variants.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the profile.
    async fn configure(&mut self, profile: DeviceProfile) -> Result<()>;

    /// Run one I/O exchange with the device.
    ///
    /// Returns `true` iff new data arrived. A `false` result is not an error;
    /// the accessors keep returning the previous sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport itself fails.
    async fn poll(&mut self) -> Result<bool>;

    /// Position captured by the last successful poll.
    fn position(&self) -> Position3;

    /// Grip digital inputs captured by the last successful poll.
    fn button_mask(&self) -> ButtonMask;

    /// Homing flag captured by the last successful poll.
    fn is_homed(&self) -> bool;

    /// Set the force target applied on subsequent I/O exchanges.
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs.
    async fn set_force(&mut self, force: Force3) -> Result<()>;
}
