//! Error types for hardware operations.
//!
//! This module defines error types specific to Falcon device operations,
//! covering a missing unit, use of a closed connection, transport failures,
//! and rejected firmware uploads.

use falcon_core::DeviceIndex;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No device is attached at the requested index.
    #[error("Device not found at index {index}")]
    NotFound { index: DeviceIndex },

    /// Operation attempted on a connection that has been closed.
    ///
    /// Seeing this outside of tests indicates a lifecycle defect.
    #[error("Device connection is closed")]
    Closed,

    /// Operation attempted before the device was opened.
    #[error("Device is not open")]
    NotOpen,

    /// Firmware must be running before this operation.
    #[error("Firmware not loaded")]
    FirmwareNotLoaded,

    /// Actuation attempted before homing completed.
    #[error("Device not homed")]
    NotHomed,

    /// A single firmware upload attempt was rejected.
    #[error("Firmware upload failed: {message}")]
    FirmwareUpload { message: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },
}

impl HardwareError {
    /// Create a new not-found error.
    pub fn not_found(index: DeviceIndex) -> Self {
        Self::NotFound { index }
    }

    /// Create a new firmware upload error.
    pub fn firmware_upload(message: impl Into<String>) -> Self {
        Self::FirmwareUpload {
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Whether this error reports use of a closed connection.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
