use crate::{
    Result,
    constants::{
        BUTTON_CENTER, BUTTON_FORWARD, BUTTON_MASK_ALL, BUTTON_MINUS, BUTTON_PLUS,
        DEFAULT_DEVICE_INDEX, LEFT_DEVICE_INDEX, RIGHT_DEVICE_INDEX,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of the physical unit to open among the attached devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIndex(u32);

impl DeviceIndex {
    /// Create a device index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        DeviceIndex(index)
    }

    /// Get the raw index.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Resolve the index from the optional side argument.
    ///
    /// Falls back to [`DEFAULT_DEVICE_INDEX`] when the argument is absent or
    /// not recognized.
    ///
    /// ```
    /// use falcon_core::DeviceIndex;
    ///
    /// assert_eq!(DeviceIndex::from_side_arg(Some("-l")).as_u32(), 1);
    /// assert_eq!(DeviceIndex::from_side_arg(Some("-r")).as_u32(), 0);
    /// assert_eq!(DeviceIndex::from_side_arg(None).as_u32(), 0);
    /// ```
    #[must_use]
    pub fn from_side_arg(arg: Option<&str>) -> Self {
        arg.and_then(Side::from_arg)
            .map(Side::device_index)
            .unwrap_or_default()
    }
}

impl Default for DeviceIndex {
    fn default() -> Self {
        DeviceIndex(DEFAULT_DEVICE_INDEX)
    }
}

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(DeviceIndex)
            .map_err(|_| Error::InvalidDeviceIndex(s.to_string()))
    }
}

/// Which hand the unit is mounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Parse the side from a command-line style argument such as `-l` or `-r`.
    ///
    /// Only the second character is inspected, so `-left` and `-l` are equivalent.
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg.chars().nth(1) {
            Some('l') => Some(Side::Left),
            Some('r') => Some(Side::Right),
            _ => None,
        }
    }

    /// Device index conventionally used for this side.
    #[must_use]
    pub fn device_index(self) -> DeviceIndex {
        match self {
            Side::Left => DeviceIndex(LEFT_DEVICE_INDEX),
            Side::Right => DeviceIndex(RIGHT_DEVICE_INDEX),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Encoder-derived end-effector position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3 {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Force vector applied to the end effector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Force3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Force3 {
    /// No force on any axis.
    pub const ZERO: Force3 = Force3::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Create a force, rejecting NaN and infinite components.
    ///
    /// # Errors
    /// Returns `Error::InvalidForce` naming the first non-finite axis.
    pub fn try_new(x: f64, y: f64, z: f64) -> Result<Self> {
        for (axis, value) in [('x', x), ('y', y), ('z', z)] {
            if !value.is_finite() {
                return Err(Error::InvalidForce { axis, value });
            }
        }
        Ok(Self { x, y, z })
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// One of the four grip buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Center,
    Minus,
    Plus,
    Forward,
}

impl Button {
    /// Bit this button occupies in a [`ButtonMask`].
    #[must_use]
    pub fn bit(self) -> u8 {
        match self {
            Button::Center => BUTTON_CENTER,
            Button::Minus => BUTTON_MINUS,
            Button::Plus => BUTTON_PLUS,
            Button::Forward => BUTTON_FORWARD,
        }
    }
}

/// Digital input bitfield reported by the grip.
///
/// Bits outside the four grip buttons are discarded on construction so that
/// noise in unused bits never shows up as a button edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const NONE: ButtonMask = ButtonMask(0);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        ButtonMask((bits & BUTTON_MASK_ALL as u32) as u8)
    }

    #[must_use]
    pub fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_pressed(&self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    /// Decode into one flag per button.
    #[must_use]
    pub fn decode(&self) -> FourButtonState {
        FourButtonState {
            plus: self.is_pressed(Button::Plus),
            forward: self.is_pressed(Button::Forward),
            center: self.is_pressed(Button::Center),
            minus: self.is_pressed(Button::Minus),
        }
    }
}

impl fmt::Display for ButtonMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#06b}", self.0)
    }
}

/// Per-button pressed flags for the four-button grip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FourButtonState {
    pub plus: bool,
    pub forward: bool,
    pub center: bool,
    pub minus: bool,
}
