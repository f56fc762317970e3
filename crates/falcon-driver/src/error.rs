//! Error types for the driver lifecycle.
//!
//! Each phase has its own error enum so callers can tell a firmware problem
//! from a homing or control-loop problem. [`DriverError`] wraps all of them
//! for the top-level entry points.

use falcon_hardware::HardwareError;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Firmware bring-up failures.
#[derive(Debug, Error)]
pub enum FirmwareError {
    /// Firmware is not running and there is no image to upload.
    #[error("No firmware loaded on device and no firmware image available")]
    NoImage,

    /// Every upload attempt was rejected.
    #[error("Firmware failed to load after {attempts} attempts")]
    LoadFailed { attempts: u32 },

    /// An upload was accepted but the device does not report firmware running.
    #[error("Firmware upload accepted but device reports no firmware loaded")]
    NotConfirmed,

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Homing handshake failures.
#[derive(Debug, Error)]
pub enum HomingError {
    /// Homing was attempted before firmware was confirmed running.
    #[error("Cannot home device: firmware not loaded")]
    FirmwareNotLoaded,

    /// The configured homing deadline passed without the device reporting homed.
    #[error("Device not homed within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    #[error("Invalid homing transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Steady-state control loop failures.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The device stopped producing data for too many consecutive cycles.
    #[error("Device unresponsive: {missed} consecutive polls without data")]
    DeviceUnresponsive { missed: u32 },

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Top-level driver error.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The device could not be opened.
    #[error("Failed to open device: {0}")]
    Open(#[source] HardwareError),

    #[error("Firmware error: {0}")]
    Firmware(#[from] FirmwareError),

    #[error("Homing error: {0}")]
    Homing(#[from] HomingError),

    #[error("Control loop error: {0}")]
    Control(#[from] ControlError),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown was requested before the device was ready.
    #[error("Shut down before the device was ready")]
    Cancelled,
}
