//! Lifecycle and control loop for a Novint Falcon haptic device.
//!
//! This crate takes an opened [`DeviceConnection`](falcon_hardware::DeviceConnection)
//! from power-on to a homed state and then runs the fixed-rate read/publish
//! loop:
//!
//! 1. [`FirmwareLoader`] makes sure firmware is running, retrying uploads a
//!    bounded number of times. It returns a [`FirmwareReady`] token.
//! 2. [`HomingSequencer`] walks the user through the homing gesture, driving
//!    the LED from red to blue. It needs a [`FirmwareReady`] and returns a
//!    [`Homed`] token.
//! 3. [`ControlLoop`] needs a [`Homed`] token. It polls the device, publishes
//!    positions and button edges on a [`Bus`], and forwards force commands
//!    through the [`ForceGate`].
//!
//! [`FalconDriver`] chains the three phases.
//!
//! # Example
//!
//! ```no_run
//! use falcon_driver::{DriverConfig, FalconDriver, JsonLinesBus, force_channel};
//! use falcon_hardware::mock::MockFalcon;
//! use falcon_core::DeviceIndex;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> falcon_driver::Result<()> {
//! let config = DriverConfig::from_env()?;
//! let (inbox, gate) = force_channel(config.force_staleness);
//! let shutdown = CancellationToken::new();
//!
//! let (falcon, _handle) = MockFalcon::simulator(500);
//! inbox.on_force_command(0.0, 0.0, 0.0).ok();
//!
//! let (bus, writer) = JsonLinesBus::channel(1024);
//! let output = tokio::spawn(async move { writer.run(&mut tokio::io::stdout()).await });
//!
//! FalconDriver::new(config, bus)
//!     .run(falcon, DeviceIndex::new(0), gate, shutdown)
//!     .await?;
//! output.await.ok();
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod control_loop;
pub mod driver;
pub mod error;
pub mod firmware;
pub mod force_gate;
pub mod homing;

pub use bus::{
    Bus, BusEvent, ChannelBus, FourButtonDown, ForceMessage, JsonLinesBus, JsonLinesWriter,
    PositionStamped, RecordingBus, pump_force_commands,
};
pub use config::{DriverConfig, DriverConfigBuilder};
pub use control_loop::{ButtonEdgeDetector, ControlLoop, CycleOutcome, LoopStats};
pub use driver::FalconDriver;
pub use error::{ControlError, DriverError, FirmwareError, HomingError, Result};
pub use firmware::{FirmwareLoader, FirmwareReady};
pub use force_gate::{ForceCommand, ForceGate, ForceInbox, force_channel};
pub use homing::{Homed, HomingMachine, HomingSequencer, HomingState, HomingStep};
