//! Mock Falcon implementation for testing and development.
//!
//! This module provides a simulated haptic device whose poll results,
//! firmware upload outcomes, and homing flag are scripted through a
//! [`MockFalconHandle`]. Every call the driver makes is recorded so tests
//! can assert on actuation, LED signals, and close counts.

use crate::{
    HardwareError, Result,
    traits::FalconDevice,
    types::{DeviceProfile, FirmwareImage, LedColor},
};
use falcon_core::{ButtonMask, DeviceIndex, Force3, Position3};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Firmware image shipped with the simulator.
pub const SIMULATOR_FIRMWARE: &[u8] = b"falcon-simulator-firmware";

/// Sample delivered by a successful mock poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MockFrame {
    pub position: Position3,
    pub buttons: ButtonMask,
    pub homed: bool,
}

impl MockFrame {
    pub fn new(position: Position3, buttons: ButtonMask, homed: bool) -> Self {
        Self {
            position,
            buttons,
            homed,
        }
    }

    /// A homed frame at the origin carrying `buttons`.
    pub fn buttons(bits: u32) -> Self {
        Self {
            position: Position3::default(),
            buttons: ButtonMask::from_bits(bits),
            homed: true,
        }
    }
}

/// Scripted outcome of one mock poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockPoll {
    /// No new data this call.
    Miss,
    /// New data arrived.
    Data(MockFrame),
    /// The transport failed.
    Fail,
}

/// Shared state between the mock device and its handle.
#[derive(Debug)]
struct MockState {
    attached_units: u32,
    opened: Option<DeviceIndex>,
    open_calls: u32,
    close_calls: u32,

    firmware_loaded: bool,
    failing_uploads: u32,
    upload_attempts: u32,
    last_skip_checksum: Option<bool>,
    confirm_upload: bool,

    homing_mode: bool,
    clear_force_calls: u32,
    home_after_polls: Option<u32>,

    script: VecDeque<MockPoll>,
    idle_data: bool,
    poll_calls: u32,
    current: MockFrame,

    leds: Vec<LedColor>,
    forces: Vec<Force3>,
    profile: Option<DeviceProfile>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            attached_units: 1,
            opened: None,
            open_calls: 0,
            close_calls: 0,
            firmware_loaded: false,
            failing_uploads: 0,
            upload_attempts: 0,
            last_skip_checksum: None,
            confirm_upload: true,
            homing_mode: false,
            clear_force_calls: 0,
            home_after_polls: None,
            script: VecDeque::new(),
            idle_data: true,
            poll_calls: 0,
            current: MockFrame::default(),
            leds: Vec::new(),
            forces: Vec::new(),
            profile: None,
        }
    }
}

/// Mock Falcon device for testing and development.
///
/// # Examples
///
/// ```
/// use falcon_hardware::mock::{MockFalcon, MockFrame, MockPoll};
/// use falcon_hardware::traits::FalconDevice;
/// use falcon_core::DeviceIndex;
///
/// #[tokio::main]
/// async fn main() -> falcon_hardware::Result<()> {
///     let (mut falcon, handle) = MockFalcon::new();
///     handle.push_polls([MockPoll::Miss, MockPoll::Data(MockFrame::buttons(0b0010))]);
///
///     falcon.open(DeviceIndex::new(0)).await?;
///     assert!(!falcon.poll().await?);
///     assert!(falcon.poll().await?);
///     assert_eq!(falcon.button_mask().bits(), 0b0010);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockFalcon {
    state: Arc<Mutex<MockState>>,
}

impl MockFalcon {
    /// Create a new mock Falcon with the default name.
    ///
    /// Returns the device together with a handle for scripting and inspection.
    pub fn new() -> (Self, MockFalconHandle) {
        Self::with_name("Mock Falcon".to_string())
    }

    /// Create a new mock Falcon with a custom name.
    pub fn with_name(name: String) -> (Self, MockFalconHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));

        let falcon = Self {
            state: Arc::clone(&state),
        };

        let handle = MockFalconHandle { state, name };

        (falcon, handle)
    }

    /// Simulator used by the command-line driver.
    ///
    /// Two units are attached so both sides can be opened; firmware starts
    /// unloaded and the encoders report homed after `home_after_polls`
    /// successful polls.
    pub fn simulator(home_after_polls: u32) -> (Self, MockFalconHandle) {
        let (falcon, handle) = Self::with_name("Falcon Simulator".to_string());
        handle.set_attached_units(2);
        handle.home_after_polls(home_after_polls);
        (falcon, handle)
    }
}

impl Default for MockFalcon {
    fn default() -> Self {
        Self::new().0
    }
}

impl FalconDevice for MockFalcon {
    async fn open(&mut self, index: DeviceIndex) -> Result<()> {
        let mut state = self.state.lock();
        state.open_calls += 1;
        if index.as_u32() >= state.attached_units {
            return Err(HardwareError::not_found(index));
        }
        state.opened = Some(index);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        state.opened = None;
        Ok(())
    }

    async fn is_firmware_loaded(&mut self) -> Result<bool> {
        Ok(self.state.lock().firmware_loaded)
    }

    async fn load_firmware(&mut self, image: &FirmwareImage, skip_checksum: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.upload_attempts += 1;
        state.last_skip_checksum = Some(skip_checksum);
        if image.is_empty() {
            return Err(HardwareError::firmware_upload("empty image"));
        }
        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            return Err(HardwareError::firmware_upload("transfer interrupted"));
        }
        state.firmware_loaded = state.confirm_upload;
        Ok(())
    }

    async fn set_homing_mode(&mut self, enabled: bool) -> Result<()> {
        self.state.lock().homing_mode = enabled;
        Ok(())
    }

    async fn clear_forces(&mut self) -> Result<()> {
        self.state.lock().clear_force_calls += 1;
        Ok(())
    }

    async fn set_led(&mut self, color: LedColor) -> Result<()> {
        self.state.lock().leds.push(color);
        Ok(())
    }

    async fn configure(&mut self, profile: DeviceProfile) -> Result<()> {
        self.state.lock().profile = Some(profile);
        Ok(())
    }

    async fn poll(&mut self) -> Result<bool> {
        let mut state = self.state.lock();
        state.poll_calls += 1;

        let outcome = match state.script.pop_front() {
            Some(outcome) => outcome,
            None if state.idle_data => MockPoll::Data(state.current),
            None => MockPoll::Miss,
        };

        match outcome {
            MockPoll::Miss => Ok(false),
            MockPoll::Fail => Err(HardwareError::communication("simulated transport failure")),
            MockPoll::Data(mut frame) => {
                if let Some(remaining) = state.home_after_polls {
                    if remaining == 0 {
                        frame.homed = true;
                    } else {
                        state.home_after_polls = Some(remaining - 1);
                    }
                }
                state.current = frame;
                Ok(true)
            }
        }
    }

    fn position(&self) -> Position3 {
        self.state.lock().current.position
    }

    fn button_mask(&self) -> ButtonMask {
        self.state.lock().current.buttons
    }

    fn is_homed(&self) -> bool {
        self.state.lock().current.homed
    }

    async fn set_force(&mut self, force: Force3) -> Result<()> {
        self.state.lock().forces.push(force);
        Ok(())
    }
}

/// Handle for scripting and inspecting a mock Falcon.
///
/// The handle shares state with the device, so it stays valid after the
/// device has been moved into a connection. It can be cloned freely.
#[derive(Debug, Clone)]
pub struct MockFalconHandle {
    state: Arc<Mutex<MockState>>,
    name: String,
}

impl MockFalconHandle {
    /// Set how many units the transport reports.
    pub fn set_attached_units(&self, units: u32) {
        self.state.lock().attached_units = units;
    }

    /// Mark firmware as already running.
    pub fn set_firmware_loaded(&self, loaded: bool) {
        self.state.lock().firmware_loaded = loaded;
    }

    /// Reject the next `count` upload attempts. `u32::MAX` rejects all of them.
    pub fn fail_uploads(&self, count: u32) {
        self.state.lock().failing_uploads = count;
    }

    /// Control whether an accepted upload actually leaves firmware running.
    pub fn set_confirm_upload(&self, confirm: bool) {
        self.state.lock().confirm_upload = confirm;
    }

    /// Report homed on every successful poll after the next `polls` ones.
    pub fn home_after_polls(&self, polls: u32) {
        self.state.lock().home_after_polls = Some(polls);
    }

    /// Queue scripted poll outcomes.
    pub fn push_polls(&self, polls: impl IntoIterator<Item = MockPoll>) {
        self.state.lock().script.extend(polls);
    }

    /// Queue successful polls delivering `frames`.
    pub fn push_frames(&self, frames: impl IntoIterator<Item = MockFrame>) {
        self.push_polls(frames.into_iter().map(MockPoll::Data));
    }

    /// Behaviour once the script runs out: repeat the last frame (`true`) or miss (`false`).
    pub fn set_idle_data(&self, idle_data: bool) {
        self.state.lock().idle_data = idle_data;
    }

    /// Replace the sample repeated on idle polls.
    pub fn set_current_frame(&self, frame: MockFrame) {
        self.state.lock().current = frame;
    }

    pub fn pending_polls(&self) -> usize {
        self.state.lock().script.len()
    }

    pub fn opened_index(&self) -> Option<DeviceIndex> {
        self.state.lock().opened
    }

    pub fn open_calls(&self) -> u32 {
        self.state.lock().open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.state.lock().close_calls
    }

    pub fn upload_attempts(&self) -> u32 {
        self.state.lock().upload_attempts
    }

    /// Checksum flag passed with the most recent upload attempt.
    pub fn last_skip_checksum(&self) -> Option<bool> {
        self.state.lock().last_skip_checksum
    }

    pub fn firmware_loaded(&self) -> bool {
        self.state.lock().firmware_loaded
    }

    pub fn homing_mode(&self) -> bool {
        self.state.lock().homing_mode
    }

    pub fn clear_force_calls(&self) -> u32 {
        self.state.lock().clear_force_calls
    }

    pub fn poll_calls(&self) -> u32 {
        self.state.lock().poll_calls
    }

    /// Every LED color set so far, oldest first.
    pub fn leds(&self) -> Vec<LedColor> {
        self.state.lock().leds.clone()
    }

    /// Every force passed to the actuation entry point, oldest first.
    pub fn forces(&self) -> Vec<Force3> {
        self.state.lock().forces.clone()
    }

    pub fn profile(&self) -> Option<DeviceProfile> {
        self.state.lock().profile
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_open_out_of_range() {
        let (mut falcon, handle) = MockFalcon::new();

        let err = falcon.open(DeviceIndex::new(1)).await.unwrap_err();
        assert!(matches!(err, HardwareError::NotFound { .. }));
        assert_eq!(handle.opened_index(), None);

        falcon.open(DeviceIndex::new(0)).await.unwrap();
        assert_eq!(handle.opened_index(), Some(DeviceIndex::new(0)));
        assert_eq!(handle.open_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_upload_failures_then_success() {
        let (mut falcon, handle) = MockFalcon::new();
        let image = FirmwareImage::from_static(SIMULATOR_FIRMWARE);
        handle.fail_uploads(2);

        assert!(falcon.load_firmware(&image, false).await.is_err());
        assert!(falcon.load_firmware(&image, false).await.is_err());
        falcon.load_firmware(&image, true).await.unwrap();

        assert_eq!(handle.upload_attempts(), 3);
        assert_eq!(handle.last_skip_checksum(), Some(true));
        assert!(falcon.is_firmware_loaded().await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_rejects_empty_image() {
        let (mut falcon, _handle) = MockFalcon::new();
        let err = falcon
            .load_firmware(&FirmwareImage::new(Vec::new()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, HardwareError::FirmwareUpload { .. }));
    }

    #[tokio::test]
    async fn test_mock_poll_script_and_idle() {
        let (mut falcon, handle) = MockFalcon::new();
        let frame = MockFrame::new(Position3::new(0.1, 0.2, 0.3), ButtonMask::NONE, false);
        handle.push_polls([MockPoll::Miss, MockPoll::Data(frame), MockPoll::Fail]);

        assert!(!falcon.poll().await.unwrap());
        assert!(falcon.poll().await.unwrap());
        assert_eq!(falcon.position(), Position3::new(0.1, 0.2, 0.3));
        assert!(falcon.poll().await.is_err());

        // Script exhausted: idle polls repeat the last frame
        assert!(falcon.poll().await.unwrap());
        assert_eq!(falcon.position(), Position3::new(0.1, 0.2, 0.3));

        handle.set_idle_data(false);
        assert!(!falcon.poll().await.unwrap());
        assert_eq!(handle.poll_calls(), 5);
    }

    #[tokio::test]
    async fn test_mock_home_after_polls() {
        let (mut falcon, handle) = MockFalcon::new();
        handle.home_after_polls(2);

        falcon.poll().await.unwrap();
        assert!(!falcon.is_homed());
        falcon.poll().await.unwrap();
        assert!(!falcon.is_homed());
        falcon.poll().await.unwrap();
        assert!(falcon.is_homed());
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let (mut falcon, handle) = MockFalcon::new();

        falcon.set_led(LedColor::Red).await.unwrap();
        falcon.set_led(LedColor::Blue).await.unwrap();
        falcon.set_homing_mode(true).await.unwrap();
        falcon.clear_forces().await.unwrap();
        falcon.set_force(Force3::new(1.0, 0.0, 0.0)).await.unwrap();
        falcon.configure(DeviceProfile::default()).await.unwrap();
        falcon.close().await.unwrap();

        assert_eq!(handle.leds(), vec![LedColor::Red, LedColor::Blue]);
        assert!(handle.homing_mode());
        assert_eq!(handle.clear_force_calls(), 1);
        assert_eq!(handle.forces(), vec![Force3::new(1.0, 0.0, 0.0)]);
        assert_eq!(handle.profile(), Some(DeviceProfile::default()));
        assert_eq!(handle.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_simulator() {
        let (mut falcon, handle) = MockFalcon::simulator(5);
        assert_eq!(handle.name(), "Falcon Simulator");

        falcon.open(DeviceIndex::new(1)).await.unwrap();
        assert_eq!(handle.opened_index(), Some(DeviceIndex::new(1)));
        assert!(!falcon.is_firmware_loaded().await.unwrap());
    }
}
