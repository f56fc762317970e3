//! Core constants for the Falcon driver.
//!
//! This module collects the timing, retry, and bit-layout constants shared by
//! the hardware layer and the driver. Values mirror the behavior of the Novint
//! Falcon bring-up procedure and the four-button grip.
//!
//! # Usage
//!
//! ```
//! use falcon_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(FIRMWARE_LOAD_ATTEMPTS, 20);
//!
//! let period = Duration::from_micros(1_000_000 / u64::from(DEFAULT_LOOP_RATE_HZ));
//! assert_eq!(period, Duration::from_millis(1));
//! ```

// ============================================================================
// Device Selection
// ============================================================================

/// Index opened when no side argument is given or it is not recognized.
pub const DEFAULT_DEVICE_INDEX: u32 = 0;

/// Index opened for the left-hand unit.
pub const LEFT_DEVICE_INDEX: u32 = 1;

/// Index opened for the right-hand unit.
pub const RIGHT_DEVICE_INDEX: u32 = 0;

// ============================================================================
// Firmware
// ============================================================================

/// Maximum number of firmware upload attempts before giving up.
///
/// Uploads over USB are timing-sensitive and fail transiently; the cap keeps
/// start-up from stalling forever on a broken link.
pub const FIRMWARE_LOAD_ATTEMPTS: u32 = 20;

// ============================================================================
// Homing
// ============================================================================

/// Delay after enabling homing mode before polling starts (milliseconds).
pub const HOMING_SETTLE_DELAY_MS: u64 = 100;

/// Pause between missed I/O polls while waiting for the user to home (milliseconds).
pub const HOMING_POLL_INTERVAL_MS: u64 = 1;

/// Maximum polls spent draining trailing I/O after homing completes.
pub const DRAIN_ATTEMPTS: u32 = 1000;

// ============================================================================
// Control Loop
// ============================================================================

/// Nominal control loop rate in Hz.
pub const DEFAULT_LOOP_RATE_HZ: u32 = 1000;

/// Consecutive missed polls after which the device is considered unresponsive.
///
/// 2000 misses is two seconds at the nominal loop rate.
pub const MAX_MISSED_POLLS: u32 = 2000;

/// Window after which an unrefreshed force command decays to zero (milliseconds).
pub const FORCE_STALENESS_MS: u64 = 300;

/// Reference frame label attached to published positions.
pub const DEFAULT_FRAME_ID: &str = "map";

// ============================================================================
// Bus Topics
// ============================================================================

/// Topic carrying position telemetry.
pub const TOPIC_POSITION: &str = "falconPos";

/// Topic carrying button edge events.
pub const TOPIC_BUTTONS: &str = "falcon_button";

/// Topic carrying inbound force commands.
pub const TOPIC_FORCE: &str = "falconForce";

// ============================================================================
// Four-Button Grip
// ============================================================================

/// Center button bit.
pub const BUTTON_CENTER: u8 = 0x01;

/// Minus button bit.
pub const BUTTON_MINUS: u8 = 0x02;

/// Plus button bit.
pub const BUTTON_PLUS: u8 = 0x04;

/// Forward button bit.
pub const BUTTON_FORWARD: u8 = 0x08;

/// All bits used by the four-button grip.
pub const BUTTON_MASK_ALL: u8 = BUTTON_CENTER | BUTTON_MINUS | BUTTON_PLUS | BUTTON_FORWARD;
