//! Steady-state control loop.
//!
//! Each cycle polls the device once. A cycle without fresh data does nothing
//! else. A fresh sample publishes the position and, when the grip mask
//! differs from the previous sample, one button event. Force commands are
//! applied as soon as they arrive, independent of the poll cadence.
//!
//! The loop stops when its [`CancellationToken`] is cancelled, checking it
//! once per cycle and while waiting for the next tick. On the way out it
//! writes zero force and closes the connection exactly once.

use std::time::Duration;

use chrono::Utc;
use falcon_core::{ButtonMask, Force3, FourButtonState};
use falcon_hardware::{AnyFalconDevice, DeviceConnection, FalconDevice};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{Bus, BusEvent, FourButtonDown, PositionStamped};
use crate::config::DriverConfig;
use crate::error::ControlError;
use crate::force_gate::{ForceCommand, ForceGate};
use crate::homing::Homed;

/// Tracks the previous grip mask and reports changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonEdgeDetector {
    previous: ButtonMask,
}

impl ButtonEdgeDetector {
    pub fn new(initial: ButtonMask) -> Self {
        Self { previous: initial }
    }

    pub fn previous(&self) -> ButtonMask {
        self.previous
    }

    /// Decoded state if `mask` differs from the previous one.
    pub fn observe(&mut self, mask: ButtonMask) -> Option<FourButtonState> {
        if mask == self.previous {
            return None;
        }
        self.previous = mask;
        Some(mask.decode())
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The poll produced no fresh data.
    NoData,
    /// A sample was published.
    Sample { button_event: bool },
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub cycles: u64,
    pub missed_polls: u64,
    pub positions_published: u64,
    pub button_events: u64,
    pub forces_applied: u64,
    pub forces_expired: u64,
}

enum Wake {
    Shutdown,
    Command(ForceCommand),
    Tick,
}

/// Read-and-publish loop over a homed connection.
pub struct ControlLoop<B: Bus, D: FalconDevice = AnyFalconDevice> {
    conn: DeviceConnection<D>,
    gate: ForceGate,
    bus: B,
    buttons: ButtonEdgeDetector,
    frame_id: String,
    rate_hz: u32,
    period: Duration,
    max_missed_polls: Option<u32>,
    consecutive_misses: u32,
    stats: LoopStats,
}

impl<B: Bus, D: FalconDevice> ControlLoop<B, D> {
    /// Take ownership of a homed connection and arm the force gate.
    pub fn new(
        conn: DeviceConnection<D>,
        _homed: Homed,
        mut gate: ForceGate,
        bus: B,
        config: &DriverConfig,
    ) -> Self {
        gate.arm();
        Self {
            conn,
            gate,
            bus,
            buttons: ButtonEdgeDetector::default(),
            frame_id: config.frame_id.clone(),
            rate_hz: config.loop_rate_hz,
            period: config.cycle_period(),
            max_missed_polls: config.max_missed_polls,
            consecutive_misses: 0,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn last_button_mask(&self) -> ButtonMask {
        self.buttons.previous()
    }

    pub fn connection(&self) -> &DeviceConnection<D> {
        &self.conn
    }

    /// Run one cycle: apply a pending command or expire a stale one, poll, publish.
    ///
    /// # Errors
    ///
    /// - [`ControlError::DeviceUnresponsive`] after too many consecutive
    ///   polls without data.
    /// - [`ControlError::Hardware`] if the connection is closed or refuses
    ///   a force.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, ControlError> {
        self.stats.cycles += 1;

        // A fresh command supersedes expiry of the one it replaces.
        if let Some(command) = self.gate.take_pending() {
            self.apply_command(command).await?;
        } else if let Some(zero) = self.gate.expire_stale(Instant::now()) {
            self.conn.set_force(zero).await?;
            self.stats.forces_expired += 1;
        }

        let fresh = match self.conn.poll().await {
            Ok(fresh) => fresh,
            Err(e) if e.is_closed() => return Err(e.into()),
            Err(e) => {
                debug!(error = %e, "Poll failed, skipping cycle");
                false
            }
        };

        if !fresh {
            self.stats.missed_polls += 1;
            self.consecutive_misses += 1;
            if let Some(max) = self.max_missed_polls
                && self.consecutive_misses >= max
            {
                error!(missed = self.consecutive_misses, "Device stopped producing data");
                return Err(ControlError::DeviceUnresponsive {
                    missed: self.consecutive_misses,
                });
            }
            return Ok(CycleOutcome::NoData);
        }
        self.consecutive_misses = 0;

        let position = self.conn.position()?;
        self.bus.publish(BusEvent::Position(PositionStamped::new(
            self.frame_id.as_str(),
            Utc::now(),
            position,
        )));
        self.stats.positions_published += 1;

        let mask = self.conn.button_mask()?;
        let button_event = match self.buttons.observe(mask) {
            Some(state) => {
                self.bus.publish(BusEvent::Buttons(FourButtonDown::from(state)));
                self.stats.button_events += 1;
                true
            }
            None => false,
        };

        Ok(CycleOutcome::Sample { button_event })
    }

    async fn apply_command(&mut self, command: ForceCommand) -> Result<(), ControlError> {
        self.gate.apply(&mut self.conn, command).await?;
        self.stats.forces_applied += 1;
        Ok(())
    }

    /// Run at the configured rate until `shutdown` is cancelled or a cycle fails.
    ///
    /// The connection is closed before returning in every case.
    ///
    /// # Errors
    ///
    /// Returns the first cycle error, or the close error if the loop itself
    /// ended cleanly.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<LoopStats, ControlError> {
        info!(
            index = %self.conn.index(),
            rate_hz = self.rate_hz,
            frame = %self.frame_id,
            "Control loop started"
        );

        let outcome = self.drive(&shutdown).await;
        if let Err(e) = &outcome {
            error!(error = %e, "Control loop failed");
        }
        let closed = self.finish().await;

        match (outcome, closed) {
            (Ok(()), closed) => closed,
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Close failed after control loop error");
                Err(e)
            }
        }
    }

    async fn drive(&mut self, shutdown: &CancellationToken) -> Result<(), ControlError> {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            self.run_cycle().await?;

            loop {
                let wake = tokio::select! {
                    biased;
                    () = shutdown.cancelled() => Wake::Shutdown,
                    _ = ticker.tick() => Wake::Tick,
                    command = self.gate.next_command() => Wake::Command(command),
                };
                match wake {
                    Wake::Shutdown => return Ok(()),
                    Wake::Command(command) => self.apply_command(command).await?,
                    Wake::Tick => break,
                }
            }
        }
    }

    /// Zero the force and close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Hardware`] if closing fails, including when
    /// the connection was already closed.
    pub async fn finish(mut self) -> Result<LoopStats, ControlError> {
        if let Err(e) = self.conn.set_force(Force3::ZERO).await {
            warn!(error = %e, "Failed to zero force before close");
        }
        self.conn.close().await?;

        let stats = self.stats;
        info!(
            cycles = stats.cycles,
            missed_polls = stats.missed_polls,
            positions = stats.positions_published,
            button_events = stats.button_events,
            forces_applied = stats.forces_applied,
            forces_expired = stats.forces_expired,
            "Control loop stopped"
        );
        Ok(stats)
    }
}
