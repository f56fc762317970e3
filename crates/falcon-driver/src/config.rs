//! Driver configuration.
//!
//! [`DriverConfig`] gathers the timing and safety knobs of the bring-up and
//! control phases. Defaults match the stock Falcon bring-up; the builder and the
//! `FALCON_*` environment variables override individual values.
//!
//! | Variable | Field | Notes |
//! |----------|-------|-------|
//! | `FALCON_LOOP_RATE_HZ` | `loop_rate_hz` | |
//! | `FALCON_FORCE_STALENESS_MS` | `force_staleness` | `0` disables expiry |
//! | `FALCON_HOMING_TIMEOUT_MS` | `homing_timeout` | `0` waits forever |
//! | `FALCON_MAX_MISSED_POLLS` | `max_missed_polls` | `0` disables detection |
//! | `FALCON_FRAME_ID` | `frame_id` | |
//! | `FALCON_FIRMWARE` | `firmware_path` | path to a firmware blob |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use falcon_core::constants::{
    DEFAULT_FRAME_ID, DEFAULT_LOOP_RATE_HZ, DRAIN_ATTEMPTS, FIRMWARE_LOAD_ATTEMPTS,
    FORCE_STALENESS_MS, HOMING_POLL_INTERVAL_MS, HOMING_SETTLE_DELAY_MS, MAX_MISSED_POLLS,
};
use falcon_hardware::DeviceProfile;
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Upper bound accepted for the loop rate.
const MAX_LOOP_RATE_HZ: u32 = 10_000;

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Control loop rate in Hz.
    pub loop_rate_hz: u32,
    /// Pause after enabling homing mode before polling starts.
    pub settle_delay: Duration,
    /// Firmware upload attempts before giving up.
    pub firmware_attempts: u32,
    /// Skip the firmware checksum during upload.
    pub skip_checksum: bool,
    /// Unrefreshed force commands decay to zero after this long. `None` keeps them forever.
    pub force_staleness: Option<Duration>,
    /// Give up homing after this long. `None` waits for the user indefinitely.
    pub homing_timeout: Option<Duration>,
    /// Pause between missed polls while homing.
    pub homing_poll_interval: Duration,
    /// Polls spent draining trailing I/O after homing.
    pub drain_attempts: u32,
    /// Consecutive missed polls tolerated in the control loop. `None` tolerates any number.
    pub max_missed_polls: Option<u32>,
    /// Reference frame label on published positions.
    pub frame_id: String,
    /// Firmware blob to upload when the device has none running.
    pub firmware_path: Option<PathBuf>,
    /// Capability variants applied once homing completes.
    pub profile: DeviceProfile,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            loop_rate_hz: DEFAULT_LOOP_RATE_HZ,
            settle_delay: Duration::from_millis(HOMING_SETTLE_DELAY_MS),
            firmware_attempts: FIRMWARE_LOAD_ATTEMPTS,
            skip_checksum: false,
            force_staleness: Some(Duration::from_millis(FORCE_STALENESS_MS)),
            homing_timeout: None,
            homing_poll_interval: Duration::from_millis(HOMING_POLL_INTERVAL_MS),
            drain_attempts: DRAIN_ATTEMPTS,
            max_missed_polls: Some(MAX_MISSED_POLLS),
            frame_id: DEFAULT_FRAME_ID.to_string(),
            firmware_path: None,
            profile: DeviceProfile::default(),
        }
    }
}

impl DriverConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Defaults overridden by `FALCON_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if a variable does not parse or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `FALCON_*` key.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if a value does not parse or the
    /// resulting configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(rate) = parse_var::<u32>(&lookup, "FALCON_LOOP_RATE_HZ")? {
            config.loop_rate_hz = rate;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "FALCON_FORCE_STALENESS_MS")? {
            config.force_staleness = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "FALCON_HOMING_TIMEOUT_MS")? {
            config.homing_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(missed) = parse_var::<u32>(&lookup, "FALCON_MAX_MISSED_POLLS")? {
            config.max_missed_polls = (missed > 0).then_some(missed);
        }
        if let Some(frame_id) = lookup("FALCON_FRAME_ID") {
            config.frame_id = frame_id;
        }
        if let Some(path) = lookup("FALCON_FIRMWARE").filter(|p| !p.is_empty()) {
            config.firmware_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.loop_rate_hz == 0 || self.loop_rate_hz > MAX_LOOP_RATE_HZ {
            return Err(DriverError::Config(format!(
                "loop_rate_hz must be 1-{MAX_LOOP_RATE_HZ}, got {}",
                self.loop_rate_hz
            )));
        }
        if self.firmware_attempts == 0 {
            return Err(DriverError::Config(
                "firmware_attempts must be greater than 0".to_string(),
            ));
        }
        if self.force_staleness.is_some_and(|d| d.is_zero()) {
            return Err(DriverError::Config(
                "force_staleness must be greater than 0 (use None to disable)".to_string(),
            ));
        }
        if self.max_missed_polls == Some(0) {
            return Err(DriverError::Config(
                "max_missed_polls must be greater than 0 (use None to disable)".to_string(),
            ));
        }
        if self.frame_id.is_empty() {
            return Err(DriverError::Config("frame_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Duration of one control cycle.
    #[must_use]
    pub fn cycle_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.loop_rate_hz.max(1)))
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DriverError::Config(format!("{key}: cannot parse {raw:?}"))),
    }
}

/// Builder for [`DriverConfig`].
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    #[must_use]
    pub fn loop_rate_hz(mut self, hz: u32) -> Self {
        self.config.loop_rate_hz = hz;
        self
    }

    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn firmware_attempts(mut self, attempts: u32) -> Self {
        self.config.firmware_attempts = attempts;
        self
    }

    #[must_use]
    pub fn skip_checksum(mut self, skip: bool) -> Self {
        self.config.skip_checksum = skip;
        self
    }

    #[must_use]
    pub fn force_staleness(mut self, window: Option<Duration>) -> Self {
        self.config.force_staleness = window;
        self
    }

    #[must_use]
    pub fn homing_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.homing_timeout = timeout;
        self
    }

    #[must_use]
    pub fn homing_poll_interval(mut self, interval: Duration) -> Self {
        self.config.homing_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn drain_attempts(mut self, attempts: u32) -> Self {
        self.config.drain_attempts = attempts;
        self
    }

    #[must_use]
    pub fn max_missed_polls(mut self, missed: Option<u32>) -> Self {
        self.config.max_missed_polls = missed;
        self
    }

    #[must_use]
    pub fn frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.config.frame_id = frame_id.into();
        self
    }

    #[must_use]
    pub fn firmware_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.firmware_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.config.profile = profile;
        self
    }

    /// Build and validate.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
