//! # evdev Joystick Source
//!
//! Reads joystick-style controllers through the Linux evdev interface.
//!
//! Buttons are every supported key at or above `BTN_MISC`, in key-code
//! order. Axes are every absolute axis except the hat axes, normalized with
//! the device's own min/max. Hats are rebuilt from the `ABS_HATnX`/`ABS_HATnY`
//! pairs.

use evdev::{AbsoluteAxisType, Device, Key};
use std::path::PathBuf;
use tracing::{debug, warn};

use super::{joystick_guid, HatPosition, JoystickInfo, JoystickSnapshot, JoystickSource};

/// First key code treated as a button (`BTN_MISC`).
const FIRST_BUTTON_CODE: u16 = 0x100;

/// Joystick and gamepad button block (`BTN_JOYSTICK..BTN_DIGI`).
const JOYSTICK_BUTTONS: std::ops::Range<u16> = 0x120..0x140;

/// First and last hat axis codes (`ABS_HAT0X..=ABS_HAT3Y`).
const HAT_AXES: std::ops::RangeInclusive<u16> = 0x10..=0x17;

/// Number of hats evdev can describe
const MAX_HATS: u16 = 4;

struct OpenDevice {
    path: PathBuf,
    device: Device,
    buttons: Vec<Key>,
    axes: Vec<AbsoluteAxisType>,
    hats: Vec<(AbsoluteAxisType, AbsoluteAxisType)>,
}

/// [`JoystickSource`] backed by `/dev/input/event*`.
#[derive(Default)]
pub struct EvdevJoystickSource {
    devices: Vec<OpenDevice>,
}

impl EvdevJoystickSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_joystick(device: &Device) -> bool {
        device
            .supported_keys()
            .is_some_and(|keys| keys.iter().any(|k| JOYSTICK_BUTTONS.contains(&k.code())))
    }

    fn describe(path: PathBuf, device: Device) -> OpenDevice {
        let mut buttons: Vec<Key> = device
            .supported_keys()
            .map(|keys| keys.iter().filter(|k| k.code() >= FIRST_BUTTON_CODE).collect())
            .unwrap_or_default();
        buttons.sort_by_key(|k| k.code());

        let supported_axes: Vec<AbsoluteAxisType> = device
            .supported_absolute_axes()
            .map(|axes| axes.iter().collect())
            .unwrap_or_default();

        let mut axes: Vec<AbsoluteAxisType> = supported_axes
            .iter()
            .copied()
            .filter(|a| !HAT_AXES.contains(&a.0))
            .collect();
        axes.sort_by_key(|a| a.0);

        let hats = (0..MAX_HATS)
            .map(|h| {
                (
                    AbsoluteAxisType(AbsoluteAxisType::ABS_HAT0X.0 + 2 * h),
                    AbsoluteAxisType(AbsoluteAxisType::ABS_HAT0Y.0 + 2 * h),
                )
            })
            .filter(|(x, _)| supported_axes.contains(x))
            .collect();

        OpenDevice { path, device, buttons, axes, hats }
    }

    fn info(slot: usize, open: &OpenDevice) -> JoystickInfo {
        let id = open.device.input_id();
        let location = open
            .device
            .physical_path()
            .map(str::to_string)
            .unwrap_or_else(|| open.path.to_string_lossy().to_string());

        JoystickInfo {
            slot,
            vendor: id.vendor(),
            product: id.product(),
            version: id.version(),
            guid: joystick_guid(id.vendor(), id.product(), id.version(), open.device.unique_name()),
            location,
            name: open.device.name().unwrap_or("Unknown").to_string(),
            button_count: open.buttons.len(),
            axis_count: open.axes.len(),
            hat_count: open.hats.len(),
        }
    }
}

/// Maps a raw axis reading onto `-1.0..=1.0`.
///
/// # Examples
///
/// ```
/// use dengo_bridge::joystick::evdev_source::normalize_axis;
///
/// assert_eq!(normalize_axis(0, 0, 255), -1.0);
/// assert_eq!(normalize_axis(255, 0, 255), 1.0);
/// ```
#[must_use]
pub fn normalize_axis(value: i32, minimum: i32, maximum: i32) -> f64 {
    if maximum <= minimum {
        return 0.0;
    }
    let span = f64::from(maximum) - f64::from(minimum);
    (2.0 * (f64::from(value) - f64::from(minimum)) / span - 1.0).clamp(-1.0, 1.0)
}

impl JoystickSource for EvdevJoystickSource {
    fn refresh(&mut self) -> Vec<JoystickInfo> {
        let mut found: Vec<(PathBuf, Device)> = evdev::enumerate()
            .filter(|(_, device)| Self::is_joystick(device))
            .collect();
        // Deterministic slot order across refreshes
        found.sort_by(|a, b| a.0.cmp(&b.0));

        self.devices = found.into_iter().map(|(p, d)| Self::describe(p, d)).collect();

        let infos: Vec<JoystickInfo> = self
            .devices
            .iter()
            .enumerate()
            .map(|(slot, open)| Self::info(slot, open))
            .collect();

        for info in &infos {
            debug!(
                "Joystick {} at slot {} (vendor: 0x{:04x}, product: 0x{:04x}, {} buttons, {} axes, {} hats)",
                info.name, info.slot, info.vendor, info.product,
                info.button_count, info.axis_count, info.hat_count
            );
        }
        infos
    }

    fn snapshot(&mut self, slot: usize) -> Option<JoystickSnapshot> {
        let open = self.devices.get(slot)?;

        let keys = match open.device.get_key_state() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to read buttons from {}: {}", open.path.display(), e);
                return None;
            }
        };
        let abs = match open.device.get_abs_state() {
            Ok(abs) => abs,
            Err(e) => {
                warn!("Failed to read axes from {}: {}", open.path.display(), e);
                return None;
            }
        };

        let buttons = open.buttons.iter().map(|&k| keys.contains(k)).collect();
        let axes = open
            .axes
            .iter()
            .map(|a| {
                let info = &abs[a.0 as usize];
                normalize_axis(info.value, info.minimum, info.maximum)
            })
            .collect();
        let hats = open
            .hats
            .iter()
            .map(|(x, y)| HatPosition::from_axes(abs[x.0 as usize].value, abs[y.0 as usize].value))
            .collect();

        Some(JoystickSnapshot { buttons, axes, hats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_axis_center() {
        let mid = normalize_axis(128, 0, 256);
        assert!(mid.abs() < 1e-9, "Midpoint should be 0.0, got {}", mid);
    }

    #[test]
    fn test_normalize_axis_byte_scale() {
        // Same scale the analog decoders use for their byte tables
        let value = normalize_axis(0x79, 0, 255);
        assert!((value - (0x79 as f64 * (2.0 / 255.0) - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_axis_degenerate_range() {
        assert_eq!(normalize_axis(5, 10, 10), 0.0);
    }

    #[test]
    fn test_normalize_axis_clamps() {
        assert_eq!(normalize_axis(-20, 0, 255), -1.0);
        assert_eq!(normalize_axis(300, 0, 255), 1.0);
    }

    #[test]
    #[ignore] // Requires real hardware
    fn test_enumerate_real_devices() {
        let mut source = EvdevJoystickSource::new();
        for info in source.refresh() {
            assert!(source.snapshot(info.slot).is_some());
        }
    }
}
