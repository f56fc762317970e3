//! Full bring-up → control → shutdown runs over the simulator.

mod common;

use std::time::Duration;

use falcon_core::{DeviceIndex, Force3};
use falcon_driver::{
    BusEvent, ChannelBus, DriverConfig, DriverError, FalconDriver, FirmwareError, JsonLinesBus,
    force_channel, pump_force_commands,
};
use falcon_hardware::mock::{MockFalcon, SIMULATOR_FIRMWARE};
use falcon_hardware::{DeviceProfile, FirmwareImage, LedColor};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn simulator_runs_until_cancelled() {
    let config = DriverConfig::default();
    let bus = ChannelBus::new(4096);
    let mut events = bus.subscribe();
    let (inbox, gate) = force_channel(config.force_staleness);
    let shutdown = CancellationToken::new();

    let (falcon, handle) = MockFalcon::simulator(50);
    let driver = FalconDriver::new(config, bus)
        .with_firmware(FirmwareImage::from_static(SIMULATOR_FIRMWARE));
    let task = tokio::spawn(driver.run(falcon, DeviceIndex::new(1), gate, shutdown.clone()));

    // Homing takes the settle delay plus ~50 polls; commands sent now are dropped.
    inbox.on_force_command(9.0, 9.0, 9.0).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.leds(), vec![LedColor::Red, LedColor::Blue]);

    let commands: &[u8] = b"{\"x\":0.1,\"y\":0.0,\"z\":0.0}\n{\"x\":0.0,\"y\":0.2,\"z\":0.0}\n";
    assert_eq!(pump_force_commands(commands, &inbox).await.unwrap(), 2);
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let stats = task.await.unwrap().unwrap();
    assert!(stats.cycles > 100);
    assert!(stats.positions_published > 100);
    assert_eq!(stats.forces_applied, 1);

    let forces = handle.forces();
    assert_eq!(forces.first(), Some(&Force3::new(0.0, 0.2, 0.0)));
    assert_eq!(forces.last(), Some(&Force3::ZERO));
    assert!(!forces.contains(&Force3::new(9.0, 9.0, 9.0)));

    assert_eq!(handle.upload_attempts(), 1);
    assert_eq!(handle.profile(), Some(DeviceProfile::default()));
    common::assert_closed_once(&handle);

    let first = events.recv().await.unwrap();
    assert!(matches!(first, BusEvent::Position(p) if p.frame == "map"));
}

#[tokio::test(start_paused = true)]
async fn stale_force_decays_during_run() {
    let config = DriverConfig::default();
    let (inbox, gate) = force_channel(config.force_staleness);
    let shutdown = CancellationToken::new();

    let (falcon, handle) = MockFalcon::simulator(0);
    handle.set_firmware_loaded(true);
    let driver = FalconDriver::new(config, ChannelBus::new(16));
    let task = tokio::spawn(driver.run(falcon, DeviceIndex::new(0), gate, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    inbox.on_force_command(0.0, 0.0, -1.5).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.cancel();

    let stats = task.await.unwrap().unwrap();
    assert_eq!(stats.forces_applied, 1);
    assert_eq!(stats.forces_expired, 1);
    assert_eq!(
        handle.forces(),
        vec![Force3::new(0.0, 0.0, -1.5), Force3::ZERO, Force3::ZERO]
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_output_does_not_hold_force() {
    let config = DriverConfig::default();
    let (inbox, gate) = force_channel(config.force_staleness);
    let shutdown = CancellationToken::new();

    // The far end is never read, so the writer blocks once 64 bytes are queued.
    let (bus, writer) = JsonLinesBus::channel(32);
    let (mut near, _far) = tokio::io::duplex(64);
    let output = tokio::spawn(async move { writer.run(&mut near).await });

    let (falcon, handle) = MockFalcon::simulator(0);
    handle.set_firmware_loaded(true);
    let driver = FalconDriver::new(config, bus.clone());
    let task = tokio::spawn(driver.run(falcon, DeviceIndex::new(0), gate, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    inbox.on_force_command(0.0, 0.0, 2.0).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        handle.forces(),
        vec![Force3::new(0.0, 0.0, 2.0), Force3::ZERO]
    );
    assert!(bus.dropped() > 0);

    shutdown.cancel();
    let stats = task.await.unwrap().unwrap();
    assert_eq!(stats.forces_expired, 1);
    assert!(stats.positions_published > 300);
    common::assert_closed_once(&handle);
    output.abort();
}

#[tokio::test]
async fn missing_firmware_never_starts_the_loop() {
    let (inbox, gate) = force_channel(None);
    let (falcon, handle) = MockFalcon::simulator(0);

    let err = FalconDriver::new(DriverConfig::default(), ChannelBus::new(16))
        .run(falcon, DeviceIndex::new(0), gate, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Firmware(FirmwareError::NoImage)));
    assert_eq!(handle.upload_attempts(), 0);
    assert_eq!(handle.poll_calls(), 0);
    common::assert_closed_once(&handle);
    drop(inbox);
}

#[tokio::test]
async fn unknown_index_fails_to_open() {
    let (_inbox, gate) = force_channel(None);
    let (falcon, handle) = MockFalcon::simulator(0);

    let err = FalconDriver::new(DriverConfig::default(), ChannelBus::new(16))
        .with_firmware(FirmwareImage::from_static(SIMULATOR_FIRMWARE))
        .run(falcon, DeviceIndex::new(2), gate, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Open(_)));
    assert_eq!(handle.close_calls(), 0);
}
