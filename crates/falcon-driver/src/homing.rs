//! Homing handshake.
//!
//! The encoders of a freshly powered Falcon have no zero reference. The user
//! establishes one by sweeping the end effector through its range and pushing
//! it back to center; the firmware then reports the device as homed.
//!
//! # States
//!
//! - `Init`: homing mode not yet enabled
//! - `WaitingForFirstPoll`: homing mode enabled, no sample seen yet
//! - `AwaitingHome`: the device reported unhomed; the LED is red and the user
//!   has been prompted
//! - `Homed`: the device reported homed; the LED is blue
//!
//! # Valid Transitions
//!
//! - Init → WaitingForFirstPoll → AwaitingHome → Homed
//! - WaitingForFirstPoll → Homed (device was already homed)
//!
//! `Homed` is terminal. Later samples can never move the machine back.

use std::fmt;
use std::time::Duration;

use falcon_hardware::{DeviceConnection, FalconDevice, HardwareError, LedColor};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::HomingError;
use crate::firmware::FirmwareReady;

/// Phase of the homing handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HomingState {
    Init,
    WaitingForFirstPoll,
    AwaitingHome,
    Homed,
}

impl fmt::Display for HomingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            HomingState::Init => "Init",
            HomingState::WaitingForFirstPoll => "WaitingForFirstPoll",
            HomingState::AwaitingHome => "AwaitingHome",
            HomingState::Homed => "Homed",
        };
        write!(f, "{}", state_str)
    }
}

impl HomingState {
    /// Check if transition to `target` is valid from this state.
    ///
    /// ```
    /// use falcon_driver::homing::HomingState;
    ///
    /// assert!(HomingState::AwaitingHome.can_transition_to(&HomingState::Homed));
    /// assert!(!HomingState::Homed.can_transition_to(&HomingState::AwaitingHome));
    /// ```
    pub fn can_transition_to(&self, target: &HomingState) -> bool {
        matches!(
            (self, target),
            (HomingState::Init, HomingState::WaitingForFirstPoll)
                | (
                    HomingState::WaitingForFirstPoll,
                    HomingState::AwaitingHome | HomingState::Homed
                )
                | (HomingState::AwaitingHome, HomingState::Homed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == HomingState::Homed
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingTransition {
    pub from: HomingState,
    pub to: HomingState,
    pub at: Instant,
}

/// What a sample means for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingStep {
    /// First sample reported unhomed: prompt the user.
    NeedsHoming,
    /// Still waiting for the user.
    Waiting,
    /// This sample completed homing.
    JustHomed,
    /// Homing had already completed.
    AlreadyHomed,
}

/// Transition rules and history of the handshake, free of any I/O.
#[derive(Debug, Clone)]
pub struct HomingMachine {
    state: HomingState,
    history: Vec<HomingTransition>,
}

impl HomingMachine {
    pub fn new() -> Self {
        Self {
            state: HomingState::Init,
            history: Vec::with_capacity(3),
        }
    }

    pub fn state(&self) -> HomingState {
        self.state
    }

    pub fn history(&self) -> &[HomingTransition] {
        &self.history
    }

    /// Move to `target`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns [`HomingError::InvalidTransition`] if the move is not allowed.
    pub fn transition_to(&mut self, target: HomingState) -> Result<(), HomingError> {
        if !self.state.can_transition_to(&target) {
            return Err(HomingError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        debug!(from = %self.state, to = %target, "Homing state transition");
        self.history.push(HomingTransition {
            from: self.state,
            to: target,
            at: Instant::now(),
        });
        self.state = target;
        Ok(())
    }

    /// Fold one fresh sample into the machine.
    ///
    /// # Errors
    ///
    /// Returns [`HomingError::InvalidTransition`] if called before homing
    /// mode was entered.
    pub fn observe(&mut self, device_homed: bool) -> Result<HomingStep, HomingError> {
        match (self.state, device_homed) {
            (HomingState::Homed, _) => Ok(HomingStep::AlreadyHomed),
            (HomingState::AwaitingHome, false) => Ok(HomingStep::Waiting),
            (HomingState::WaitingForFirstPoll, false) => {
                self.transition_to(HomingState::AwaitingHome)?;
                Ok(HomingStep::NeedsHoming)
            }
            (_, true) => {
                self.transition_to(HomingState::Homed)?;
                Ok(HomingStep::JustHomed)
            }
            (HomingState::Init, false) => Err(HomingError::InvalidTransition {
                from: HomingState::Init.to_string(),
                to: HomingState::AwaitingHome.to_string(),
            }),
        }
    }
}

impl Default for HomingMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that a connection completed homing. Required by the control loop.
#[derive(Debug, Clone)]
pub struct Homed {
    polls: u64,
    waited: Duration,
    history: Vec<HomingTransition>,
}

impl Homed {
    /// Successful polls observed before homing completed.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Time from entering homing mode to the homed report.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn history(&self) -> &[HomingTransition] {
        &self.history
    }
}

/// Drives a connection through the homing handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingSequencer {
    settle_delay: Duration,
    poll_interval: Duration,
    timeout: Option<Duration>,
    drain_attempts: u32,
}

impl HomingSequencer {
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            settle_delay: config.settle_delay,
            poll_interval: config.homing_poll_interval,
            timeout: config.homing_timeout,
            drain_attempts: config.drain_attempts,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the handshake until the device reports homed.
    ///
    /// Without a timeout this waits as long as the user takes. Polls that
    /// return no data are retried after `homing_poll_interval`.
    ///
    /// # Errors
    ///
    /// - [`HomingError::Timeout`] if a timeout is configured and expires.
    /// - [`HomingError::FirmwareNotLoaded`] if the connection's firmware
    ///   status is not `Loaded`.
    /// - [`HomingError::Hardware`] for a closed connection or an LED failure.
    pub async fn run<D: FalconDevice>(
        &self,
        conn: &mut DeviceConnection<D>,
        _firmware: &FirmwareReady,
    ) -> Result<Homed, HomingError> {
        let mut machine = HomingMachine::new();

        conn.begin_homing().await.map_err(|e| match e {
            HardwareError::FirmwareNotLoaded => HomingError::FirmwareNotLoaded,
            other => HomingError::Hardware(other),
        })?;
        self.poll_once(conn).await?;
        machine.transition_to(HomingState::WaitingForFirstPoll)?;

        let started = Instant::now();
        sleep(self.settle_delay).await;

        let deadline = self.timeout.map(|timeout| started + timeout);
        let mut polls = 0u64;

        loop {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(waited_ms, state = %machine.state(), "Homing timed out");
                return Err(HomingError::Timeout { waited_ms });
            }

            if !self.poll_once(conn).await? {
                sleep(self.poll_interval).await;
                continue;
            }
            polls += 1;

            let status = conn.observe_homing()?;
            match machine.observe(status.is_homed())? {
                HomingStep::NeedsHoming => {
                    conn.set_led(LedColor::Red).await?;
                    warn!(
                        "Falcon not currently homed. Move the end effector through its full range, then push it straight in and back to center."
                    );
                }
                HomingStep::Waiting => {}
                HomingStep::JustHomed | HomingStep::AlreadyHomed => break,
            }
            sleep(self.poll_interval).await;
        }

        conn.set_led(LedColor::Blue).await?;
        let waited = started.elapsed();
        info!(polls, waited_ms = waited.as_millis() as u64, "Falcon homed");

        self.drain(conn).await?;

        Ok(Homed {
            polls,
            waited,
            history: machine.history().to_vec(),
        })
    }

    /// One poll, with transport failures counted as "no data".
    async fn poll_once<D: FalconDevice>(
        &self,
        conn: &mut DeviceConnection<D>,
    ) -> Result<bool, HomingError> {
        match conn.poll().await {
            Ok(fresh) => Ok(fresh),
            Err(e) if e.is_closed() => Err(e.into()),
            Err(e) => {
                debug!(error = %e, "Poll failed during homing, retrying");
                Ok(false)
            }
        }
    }

    /// Flush trailing I/O before handing the device to the control loop.
    async fn drain<D: FalconDevice>(&self, conn: &mut DeviceConnection<D>) -> Result<(), HomingError> {
        for _ in 0..self.drain_attempts {
            if self.poll_once(conn).await? {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
        warn!(attempts = self.drain_attempts, "No I/O completed while draining after homing");
        Ok(())
    }
}

impl Default for HomingSequencer {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}
