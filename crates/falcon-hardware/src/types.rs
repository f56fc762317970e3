//! Common types shared across the hardware layer.
//!
//! This module defines LED colors, the firmware image,
//! lifecycle status enums, and the capability variants selected once at
//! start-up.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// LED color on the device body.
///
/// The homing handshake uses red for "needs homing" and blue for "ready".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedColor {
    #[default]
    Off,
    Red,
    Green,
    Blue,
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Red => write!(f, "red"),
            Self::Green => write!(f, "green"),
            Self::Blue => write!(f, "blue"),
        }
    }
}

/// Firmware binary uploaded to the device.
///
/// The blob is reference-counted and never mutated, so clones are cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: Bytes,
}

impl FirmwareImage {
    /// Wrap an owned firmware blob.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Wrap a firmware blob compiled into the binary.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(bytes),
        }
    }

    /// Read a firmware blob from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        std::fs::read(path).map(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Lifecycle state of a [`DeviceConnection`](crate::connection::DeviceConnection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
}

/// Whether firmware is running on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareStatus {
    #[default]
    NotLoaded,
    Loaded,
}

/// Encoder calibration state of the device.
///
/// Once `Homed` is reached it is never left for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomingStatus {
    #[default]
    Unhomed,
    AwaitingHome,
    Homed,
}

impl HomingStatus {
    /// Next status given what the device currently reports.
    ///
    /// ```
    /// use falcon_hardware::HomingStatus;
    ///
    /// assert_eq!(HomingStatus::Unhomed.observe(false), HomingStatus::AwaitingHome);
    /// assert_eq!(HomingStatus::AwaitingHome.observe(true), HomingStatus::Homed);
    /// assert_eq!(HomingStatus::Homed.observe(false), HomingStatus::Homed);
    /// ```
    #[must_use]
    pub fn observe(self, device_homed: bool) -> Self {
        match (self, device_homed) {
            (Self::Homed, _) | (_, true) => Self::Homed,
            (_, false) => Self::AwaitingHome,
        }
    }

    pub fn is_homed(self) -> bool {
        self == Self::Homed
    }
}

impl fmt::Display for HomingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unhomed => write!(f, "Unhomed"),
            Self::AwaitingHome => write!(f, "AwaitingHome"),
            Self::Homed => write!(f, "Homed"),
        }
    }
}

/// Firmware flavour running on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareKind {
    #[default]
    NovintSdk,
}

/// Kinematic model converting encoder ticks into positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KinematicKind {
    #[default]
    Stamper,
}

/// Grip attached to the end effector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripKind {
    #[default]
    FourButton,
}

/// Capability variants resolved once before the control loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub firmware: FirmwareKind,
    pub kinematic: KinematicKind,
    pub grip: GripKind,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?}",
            self.firmware, self.kinematic, self.grip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_image_static() {
        static BLOB: &[u8] = &[0xde, 0xad, 0xbe, 0xef];
        let image = FirmwareImage::from_static(BLOB);
        assert_eq!(image.len(), 4);
        assert!(!image.is_empty());
        assert_eq!(image.as_bytes(), BLOB);
        assert_eq!(image.clone(), image);
    }

    #[test]
    fn test_homing_status_never_leaves_homed() {
        let status = HomingStatus::Unhomed.observe(true);
        assert_eq!(status, HomingStatus::Homed);
        assert_eq!(status.observe(false).observe(false), HomingStatus::Homed);
    }

    #[test]
    fn test_default_profile() {
        let profile = DeviceProfile::default();
        assert_eq!(profile.firmware, FirmwareKind::NovintSdk);
        assert_eq!(profile.kinematic, KinematicKind::Stamper);
        assert_eq!(profile.grip, GripKind::FourButton);
        assert_eq!(profile.to_string(), "NovintSdk/Stamper/FourButton");
    }

    #[test]
    fn test_led_color_serialization() {
        let json = serde_json::to_string(&LedColor::Blue).unwrap();
        assert_eq!(json, "\"blue\"");
    }
}
