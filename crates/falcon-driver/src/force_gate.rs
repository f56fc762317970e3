//! Safety layer between inbound force commands and device actuation.
//!
//! Force commands arrive asynchronously through a [`ForceInbox`] and land in
//! a single last-write-wins cell; a newer command replaces an older one that
//! has not been applied yet. The [`ForceGate`] owned by the control loop
//! reads that cell and forwards commands to the device, subject to two rules:
//!
//! - Nothing is forwarded until the gate is armed after homing. Commands that
//!   arrived earlier are discarded on arming.
//! - A non-zero force that is not refreshed within the staleness window is
//!   replaced by zero force.

use std::sync::Arc;
use std::time::Duration;

use falcon_core::Force3;
use falcon_hardware::{DeviceConnection, FalconDevice, HardwareError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// A force command together with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceCommand {
    pub force: Force3,
    pub received_at: Instant,
}

/// Create a connected inbox/gate pair.
///
/// `staleness` is how long an applied non-zero force may persist without a
/// refresh; `None` disables expiry.
pub fn force_channel(staleness: Option<Duration>) -> (ForceInbox, ForceGate) {
    let (tx, rx) = watch::channel(None);
    let inbox = ForceInbox { tx: Arc::new(tx) };
    let gate = ForceGate {
        rx,
        armed: false,
        staleness,
        active_since: None,
    };
    (inbox, gate)
}

/// Writing side of the force cell. Cheap to clone; hand one to each producer.
#[derive(Debug, Clone)]
pub struct ForceInbox {
    tx: Arc<watch::Sender<Option<ForceCommand>>>,
}

impl ForceInbox {
    /// Deliver a new force target, replacing any command not yet applied.
    ///
    /// # Errors
    ///
    /// Returns [`falcon_core::Error::InvalidForce`] if a component is not finite.
    pub fn on_force_command(&self, x: f64, y: f64, z: f64) -> falcon_core::Result<()> {
        let force = Force3::try_new(x, y, z)?;
        trace!(x, y, z, "Force command received");
        self.tx.send_replace(Some(ForceCommand {
            force,
            received_at: Instant::now(),
        }));
        Ok(())
    }

    /// Most recent command delivered, applied or not.
    pub fn latest(&self) -> Option<ForceCommand> {
        *self.tx.borrow()
    }
}

/// Reading side of the force cell, owned by the control loop.
#[derive(Debug)]
pub struct ForceGate {
    rx: watch::Receiver<Option<ForceCommand>>,
    armed: bool,
    staleness: Option<Duration>,
    active_since: Option<Instant>,
}

impl ForceGate {
    /// Start forwarding commands. Anything received before this call is dropped.
    pub fn arm(&mut self) {
        let discarded = self.rx.borrow_and_update().is_some();
        if discarded {
            debug!("Discarding force command received before homing");
        }
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether a non-zero force is currently applied.
    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    /// Take the command waiting in the cell, if any.
    ///
    /// Always `None` while disarmed.
    pub fn take_pending(&mut self) -> Option<ForceCommand> {
        if !self.armed {
            return None;
        }
        match self.rx.has_changed() {
            Ok(true) => *self.rx.borrow_and_update(),
            Ok(false) | Err(_) => None,
        }
    }

    /// Wait for the next command.
    ///
    /// Never completes while disarmed or once every [`ForceInbox`] has been
    /// dropped. Cancel safe.
    pub async fn next_command(&mut self) -> ForceCommand {
        loop {
            if !self.armed {
                std::future::pending::<()>().await;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            if let Some(command) = *self.rx.borrow_and_update() {
                return command;
            }
        }
    }

    /// Forward `command` to the device.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::NotHomed`] while the gate is disarmed, or
    /// whatever the connection reports.
    pub async fn apply<D: FalconDevice>(
        &mut self,
        conn: &mut DeviceConnection<D>,
        command: ForceCommand,
    ) -> Result<(), HardwareError> {
        if !self.armed {
            return Err(HardwareError::NotHomed);
        }
        conn.set_force(command.force).await?;
        self.active_since = (!command.force.is_zero()).then_some(command.received_at);
        Ok(())
    }

    /// Zero force to apply if the active command has outlived the window.
    ///
    /// Returns `Some` at most once per stale command.
    pub fn expire_stale(&mut self, now: Instant) -> Option<Force3> {
        let window = self.staleness?;
        let since = self.active_since?;
        if now.saturating_duration_since(since) < window {
            return None;
        }
        warn!(
            age_ms = now.saturating_duration_since(since).as_millis() as u64,
            "Force command not refreshed, decaying to zero"
        );
        self.active_since = None;
        Some(Force3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falcon_core::{ButtonMask, DeviceIndex, Position3};
    use falcon_hardware::mock::{MockFalcon, MockFalconHandle, MockFrame};
    use proptest::prelude::*;

    async fn homed_connection() -> (DeviceConnection<MockFalcon>, MockFalconHandle) {
        let (falcon, handle) = MockFalcon::new();
        let mut conn = DeviceConnection::open(falcon, DeviceIndex::new(0))
            .await
            .unwrap();
        handle.push_frames([MockFrame::new(Position3::default(), ButtonMask::NONE, true)]);
        conn.poll().await.unwrap();
        conn.observe_homing().unwrap();
        (conn, handle)
    }

    #[test]
    fn test_disarmed_gate_yields_nothing() {
        let (inbox, mut gate) = force_channel(None);
        inbox.on_force_command(1.0, 2.0, 3.0).unwrap();
        assert!(!gate.is_armed());
        assert_eq!(gate.take_pending(), None);
    }

    #[test]
    fn test_arm_discards_earlier_commands() {
        let (inbox, mut gate) = force_channel(None);
        inbox.on_force_command(1.0, 0.0, 0.0).unwrap();
        gate.arm();
        assert_eq!(gate.take_pending(), None);

        inbox.on_force_command(0.0, 0.0, 1.0).unwrap();
        let command = gate.take_pending().unwrap();
        assert_eq!(command.force, Force3::new(0.0, 0.0, 1.0));
        assert_eq!(gate.take_pending(), None);
    }

    #[test]
    fn test_rejects_non_finite() {
        let (inbox, _gate) = force_channel(None);
        assert!(inbox.on_force_command(f64::NAN, 0.0, 0.0).is_err());
        assert!(inbox.latest().is_none());
    }

    #[tokio::test]
    async fn test_apply_refused_while_disarmed() {
        let (conn_inbox, mut gate) = force_channel(None);
        let (mut conn, handle) = homed_connection().await;
        conn_inbox.on_force_command(1.0, 0.0, 0.0).unwrap();
        let command = conn_inbox.latest().unwrap();

        let err = gate.apply(&mut conn, command).await.unwrap_err();
        assert!(matches!(err, HardwareError::NotHomed));
        assert!(handle.forces().is_empty());
        conn.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_force_decays_once() {
        let (inbox, mut gate) = force_channel(Some(Duration::from_millis(300)));
        let (mut conn, handle) = homed_connection().await;
        gate.arm();

        inbox.on_force_command(0.5, 0.0, 0.0).unwrap();
        let command = gate.take_pending().unwrap();
        gate.apply(&mut conn, command).await.unwrap();
        assert!(gate.is_active());

        tokio::time::advance(Duration::from_millis(299)).await;
        assert_eq!(gate.expire_stale(Instant::now()), None);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(gate.expire_stale(Instant::now()), Some(Force3::ZERO));
        assert_eq!(gate.expire_stale(Instant::now()), None);
        assert!(!gate.is_active());
        assert_eq!(handle.forces(), vec![Force3::new(0.5, 0.0, 0.0)]);
        conn.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_command_is_never_stale() {
        let (inbox, mut gate) = force_channel(Some(Duration::from_millis(300)));
        let (mut conn, _handle) = homed_connection().await;
        gate.arm();

        inbox.on_force_command(0.0, 0.0, 0.0).unwrap();
        let command = gate.take_pending().unwrap();
        gate.apply(&mut conn, command).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(gate.expire_stale(Instant::now()), None);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_next_command_wakes_on_delivery() {
        let (inbox, mut gate) = force_channel(None);
        gate.arm();

        let producer = inbox.clone();
        tokio::spawn(async move {
            producer.on_force_command(0.0, -1.0, 0.0).unwrap();
        });

        let command = gate.next_command().await;
        assert_eq!(command.force, Force3::new(0.0, -1.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(
            commands in prop::collection::vec(
                (-10.0f64..10.0, -10.0f64..10.0, -10.0f64..10.0),
                1..20,
            )
        ) {
            let (inbox, mut gate) = force_channel(None);
            gate.arm();
            for (x, y, z) in &commands {
                inbox.on_force_command(*x, *y, *z).unwrap();
            }

            let (x, y, z) = commands[commands.len() - 1];
            let pending = gate.take_pending().map(|cmd| cmd.force);
            prop_assert_eq!(pending, Some(Force3::new(x, y, z)));
            prop_assert_eq!(gate.take_pending(), None);
        }
    }
}
