//! # Joystick Input Module
//!
//! Raw input from joystick-style devices: console adapters and the PC
//! controllers that enumerate as game controllers.
//!
//! This module handles:
//! - The [`JoystickSource`] seam between decoders and the platform
//! - Raw snapshots of buttons, normalized axes and hats
//! - Device descriptions used by the variant discovery routines
//!
//! The Linux implementation lives in [`evdev_source`].

pub mod evdev_source;

use serde::Serialize;

/// Position of a point-of-view hat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HatPosition {
    #[default]
    Centered,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl HatPosition {
    /// Builds a hat position from its two axes, negative meaning up/left.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::joystick::HatPosition;
    ///
    /// assert_eq!(HatPosition::from_axes(1, -1), HatPosition::UpRight);
    /// assert_eq!(HatPosition::from_axes(0, 0), HatPosition::Centered);
    /// ```
    #[must_use]
    pub fn from_axes(x: i32, y: i32) -> Self {
        match (x.signum(), y.signum()) {
            (0, -1) => HatPosition::Up,
            (1, -1) => HatPosition::UpRight,
            (1, 0) => HatPosition::Right,
            (1, 1) => HatPosition::DownRight,
            (0, 1) => HatPosition::Down,
            (-1, 1) => HatPosition::DownLeft,
            (-1, 0) => HatPosition::Left,
            (-1, -1) => HatPosition::UpLeft,
            _ => HatPosition::Centered,
        }
    }

    #[must_use]
    pub fn is_up(self) -> bool {
        matches!(self, HatPosition::Up | HatPosition::UpLeft | HatPosition::UpRight)
    }

    #[must_use]
    pub fn is_down(self) -> bool {
        matches!(self, HatPosition::Down | HatPosition::DownLeft | HatPosition::DownRight)
    }

    #[must_use]
    pub fn is_left(self) -> bool {
        matches!(self, HatPosition::Left | HatPosition::UpLeft | HatPosition::DownLeft)
    }

    #[must_use]
    pub fn is_right(self) -> bool {
        matches!(self, HatPosition::Right | HatPosition::UpRight | HatPosition::DownRight)
    }
}

/// Raw state of a joystick-style device at one instant.
///
/// Axes are normalized to `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoystickSnapshot {
    pub buttons: Vec<bool>,
    pub axes: Vec<f64>,
    pub hats: Vec<HatPosition>,
}

impl JoystickSnapshot {
    /// Raw button by index. Unassigned or out-of-range indices read as
    /// released.
    #[must_use]
    pub fn button(&self, index: Option<usize>) -> bool {
        index.and_then(|i| self.buttons.get(i).copied()).unwrap_or(false)
    }

    /// Raw axis by index, 0.0 when absent.
    #[must_use]
    pub fn axis(&self, index: usize) -> f64 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }

    /// Raw hat by index, centered when absent.
    #[must_use]
    pub fn hat(&self, index: usize) -> HatPosition {
        self.hats.get(index).copied().unwrap_or_default()
    }
}

/// Stable identifier of a joystick: vendor, product, version and the
/// device's unique (serial) string. The port it is plugged into is not part
/// of it.
///
/// # Examples
///
/// ```
/// use dengo_bridge::joystick::joystick_guid;
///
/// assert_eq!(joystick_guid(0x0ae4, 0x0003, 0x0110, None), "0ae4:0003:0110");
/// assert_eq!(joystick_guid(0x0f0d, 0x00c1, 0x0111, Some("ZK01")), "0f0d:00c1:0111:ZK01");
/// ```
#[must_use]
pub fn joystick_guid(vendor: u16, product: u16, version: u16, serial: Option<&str>) -> String {
    let base = format!("{:04x}:{:04x}:{:04x}", vendor, product, version);
    match serial.map(str::trim) {
        Some(serial) if !serial.is_empty() => format!("{}:{}", base, serial),
        _ => base,
    }
}

/// Static description of a joystick-style device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoystickInfo {
    /// Position in the source's device list, used to fetch snapshots
    pub slot: usize,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    /// See [`joystick_guid`]
    pub guid: String,
    /// Physical path of the port, informational only
    pub location: String,
    pub name: String,
    pub button_count: usize,
    pub axis_count: usize,
    pub hat_count: usize,
}

/// Provider of joystick-style devices.
pub trait JoystickSource: Send {
    /// Re-enumerates devices and returns the ones currently attached.
    fn refresh(&mut self) -> Vec<JoystickInfo>;

    /// Current raw state of the device in `slot`, `None` if it is gone.
    fn snapshot(&mut self, slot: usize) -> Option<JoystickSnapshot>;
}
