//! Common helpers for the driver integration tests.
//!
//! Helpers come in two tiers:
//!
//! 1. **Setup** (`open_*`, `homed_*`): build a connection or control loop over a
//!    scripted `MockFalcon` in a known lifecycle state.
//! 2. **Assertions** (`assert_*`): check the recorded device calls and bus
//!    traffic after a scenario has run.

#![allow(dead_code)]

use std::sync::Arc;

use falcon_core::{DeviceIndex, Force3};
use falcon_driver::{
    ControlLoop, DriverConfig, FirmwareLoader, ForceInbox, HomingSequencer, RecordingBus,
    force_channel,
};
use falcon_hardware::DeviceConnection;
use falcon_hardware::mock::{MockFalcon, MockFalconHandle, MockFrame};

/// Control loop over a homed mock, plus everything a test needs to drive it.
pub struct HomedLoop {
    pub control: ControlLoop<Arc<RecordingBus>, MockFalcon>,
    pub handle: MockFalconHandle,
    pub bus: Arc<RecordingBus>,
    pub inbox: ForceInbox,
}

/// Open a mock with firmware not yet loaded.
pub async fn open_mock() -> (DeviceConnection<MockFalcon>, MockFalconHandle) {
    let (falcon, handle) = MockFalcon::new();
    let conn = DeviceConnection::open(falcon, DeviceIndex::new(0))
        .await
        .expect("mock opens at index 0");
    (conn, handle)
}

/// Run firmware and homing on a mock that is already homed, then build a
/// control loop whose polls miss until the test scripts them.
pub async fn homed_loop(config: DriverConfig) -> HomedLoop {
    let (mut conn, handle) = open_mock().await;
    handle.set_firmware_loaded(true);
    handle.set_current_frame(MockFrame::buttons(0));

    let ready = FirmwareLoader::from_config(&config)
        .ensure_firmware(&mut conn, None)
        .await
        .expect("firmware already running");
    let homed = HomingSequencer::from_config(&config)
        .run(&mut conn, &ready)
        .await
        .expect("mock reports homed");
    handle.set_idle_data(false);

    let (inbox, gate) = force_channel(config.force_staleness);
    let bus = Arc::new(RecordingBus::new());
    let control = ControlLoop::new(conn, homed, gate, Arc::clone(&bus), &config);

    HomedLoop {
        control,
        handle,
        bus,
        inbox,
    }
}

/// Assert the device saw exactly `expected` force writes, in order.
pub fn assert_forces(handle: &MockFalconHandle, expected: &[Force3]) {
    assert_eq!(
        handle.forces(),
        expected,
        "unexpected actuation sequence on {}",
        handle.name()
    );
}

/// Assert the connection was closed exactly once.
pub fn assert_closed_once(handle: &MockFalconHandle) {
    assert_eq!(handle.close_calls(), 1, "device should be closed exactly once");
}
