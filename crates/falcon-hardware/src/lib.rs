//! Hardware device abstraction layer for the Falcon haptic driver.
//!
//! This crate provides the trait-based abstraction over a Novint Falcon
//! transport, an owned connection type that enforces the device lifecycle,
//! and a scriptable mock for development and testing without hardware.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Explicit ownership**: A [`DeviceConnection`] is owned by whoever drives
//!   the device and passed along explicitly; there is no global device.
//! - **Fail fast**: A closed connection rejects every operation with
//!   [`HardwareError::Closed`].
//! - **Enum dispatch**: Transport variants are selected once through
//!   [`AnyFalconDevice`] instead of trait objects.
//!
//! # Example
//!
//! ```no_run
//! use falcon_hardware::{DeviceConnection, AnyFalconDevice, Result};
//! use falcon_hardware::mock::MockFalcon;
//! use falcon_core::DeviceIndex;
//!
//! async fn sample() -> Result<()> {
//!     let (falcon, _handle) = MockFalcon::new();
//!     let mut conn = DeviceConnection::open(AnyFalconDevice::Mock(falcon), DeviceIndex::new(0)).await?;
//!
//!     if conn.poll().await? {
//!         let position = conn.position()?;
//!         println!("x={} y={} z={}", position.x, position.y, position.z);
//!     }
//!
//!     conn.close().await
//! }
//! ```

pub mod connection;
pub mod devices;
pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use connection::DeviceConnection;
pub use devices::AnyFalconDevice;
pub use error::{HardwareError, Result};
pub use traits::FalconDevice;
pub use types::{
    ConnectionState, DeviceProfile, FirmwareImage, FirmwareKind, FirmwareStatus,
    GripKind, HomingStatus, KinematicKind, LedColor,
};
