//! # Classic Console Adapter Decoder
//!
//! Decodes the original console controllers seen through third-party
//! adapters. The adapters report handles as ordinary buttons: the brake
//! handle drives four raw buttons and the power handle three, and every
//! notch is a distinct combination of them.
//!
//! ## Brake Combinations (Brake1=1, Brake2=2, Brake3=4, Brake4=8)
//!
//! | Notch | Bits | Value |
//! |-------|------|-------|
//! | Released | B2+B3+B4 | 14 |
//! | B1 | B1+B3+B4 | 13 |
//! | B2 | B3+B4 | 12 |
//! | B3 | B1+B2+B4 | 11 |
//! | B4 | B2+B4 | 10 |
//! | B5 | B1+B4 | 9 |
//! | B6 | B4 | 8 |
//! | B7 | B1+B2+B3 | 7 |
//! | B8 | B2+B3 | 6 |
//! | Emergency | none | 0 |
//!
//! ## Power Combinations (Power1=1, Power2=2, Power3=4)
//!
//! | Notch | Bits | Value |
//! |-------|------|-------|
//! | N | P2+P3 | 6 |
//! | P1 | P1+P3 | 5 |
//! | P2 | P3 | 4 |
//! | P3 | P1+P2 | 3 |
//! | P4 | P2 | 2 |
//! | P5 | P1 | 1 |
//!
//! Any other combination is a transition between notches and keeps the
//! previous value. Some adapters report Power2/Power3 on a hat or an axis
//! instead of buttons, which makes P4 and the transition state ambiguous;
//! those readings are resolved against the previous power notch.

use serde::{Deserialize, Serialize};

use super::state::{
    BrakeNotch, ButtonSet, Buttons, CanonicalState, ControllerButton, DecodedInput, PowerNotch,
};
use crate::joystick::{JoystickInfo, JoystickSnapshot};

const BRAKE1: u8 = 1;
const BRAKE2: u8 = 2;
const BRAKE3: u8 = 4;
const BRAKE4: u8 = 8;

const POWER1: u8 = 1;
const POWER2: u8 = 2;
const POWER3: u8 = 4;

/// Axis deflection treated as a pressed power bit
const AXIS_THRESHOLD: f64 = 0.5;

/// Brake service notches on classic controllers
pub const CLASSIC_BRAKE_NOTCHES: u8 = 8;

/// Power notches on classic controllers
pub const CLASSIC_POWER_NOTCHES: u8 = 5;

/// Maps a 4-bit brake combination to its notch.
#[must_use]
pub fn brake_from_bits(bits: u8) -> Option<BrakeNotch> {
    match bits {
        v if v == BRAKE2 | BRAKE3 | BRAKE4 => Some(BrakeNotch::Released),
        v if v == BRAKE1 | BRAKE3 | BRAKE4 => Some(BrakeNotch::Service(1)),
        v if v == BRAKE3 | BRAKE4 => Some(BrakeNotch::Service(2)),
        v if v == BRAKE1 | BRAKE2 | BRAKE4 => Some(BrakeNotch::Service(3)),
        v if v == BRAKE2 | BRAKE4 => Some(BrakeNotch::Service(4)),
        v if v == BRAKE1 | BRAKE4 => Some(BrakeNotch::Service(5)),
        v if v == BRAKE4 => Some(BrakeNotch::Service(6)),
        v if v == BRAKE1 | BRAKE2 | BRAKE3 => Some(BrakeNotch::Service(7)),
        v if v == BRAKE2 | BRAKE3 => Some(BrakeNotch::Service(8)),
        0 => Some(BrakeNotch::Emergency),
        _ => None,
    }
}

/// Maps a 3-bit power combination to its notch.
#[must_use]
pub fn power_from_bits(bits: u8) -> Option<PowerNotch> {
    let notch = match bits {
        v if v == POWER2 | POWER3 => 0,
        v if v == POWER1 | POWER3 => 1,
        v if v == POWER3 => 2,
        v if v == POWER1 | POWER2 => 3,
        v if v == POWER2 => 4,
        v if v == POWER1 => 5,
        _ => return None,
    };
    Some(PowerNotch::new(notch))
}

/// Where the adapter reports the Power2/Power3 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum PowerSource {
    /// Two ordinary buttons
    #[default]
    Buttons,
    /// Left/right of a hat
    Hat(usize),
    /// Negative/positive half of an axis
    Axis(usize),
}

/// Raw index assignments discovered by calibration.
///
/// `None` marks an index that was never assigned; it always reads as
/// released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassicMapping {
    pub select: Option<usize>,
    pub start: Option<usize>,
    pub a: Option<usize>,
    pub b: Option<usize>,
    pub c: Option<usize>,
    pub power1: Option<usize>,
    pub power2: Option<usize>,
    pub power3: Option<usize>,
    pub brake1: Option<usize>,
    pub brake2: Option<usize>,
    pub brake3: Option<usize>,
    pub brake4: Option<usize>,
    #[serde(default)]
    pub power_source: PowerSource,
}

impl ClassicMapping {
    /// True once both handles have at least one assigned input
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        let brake = [self.brake1, self.brake2, self.brake3, self.brake4];
        let power = [self.power1, self.power2, self.power3];
        brake.iter().any(Option::is_some)
            && (power.iter().any(Option::is_some) || self.power_source != PowerSource::Buttons)
    }
}

/// Decoder for classic console adapters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassicDecoder {
    mapping: ClassicMapping,
}

impl ClassicDecoder {
    #[must_use]
    pub fn new(mapping: ClassicMapping) -> Self {
        Self { mapping }
    }

    #[must_use]
    pub fn mapping(&self) -> &ClassicMapping {
        &self.mapping
    }

    /// Installs a new set of assignments, e.g. after calibration.
    pub fn set_mapping(&mut self, mapping: ClassicMapping) {
        self.mapping = mapping;
    }

    /// Buttons exposed by classic controllers
    #[must_use]
    pub fn capabilities() -> ButtonSet {
        ButtonSet::of(&[
            ControllerButton::Select,
            ControllerButton::Start,
            ControllerButton::A,
            ControllerButton::B,
            ControllerButton::C,
        ])
    }

    /// Discovery heuristic: classic adapters expose between 12 and 20
    /// buttons, or at least 10 buttons plus a hat.
    #[must_use]
    pub fn matches(info: &JoystickInfo) -> bool {
        let enough = info.button_count >= 12 || (info.button_count >= 10 && info.hat_count > 0);
        enough && info.button_count <= 20
    }

    fn brake_bits(&self, raw: &JoystickSnapshot) -> u8 {
        let m = &self.mapping;
        [(m.brake1, BRAKE1), (m.brake2, BRAKE2), (m.brake3, BRAKE3), (m.brake4, BRAKE4)]
            .iter()
            .filter(|(index, _)| raw.button(*index))
            .fold(0, |bits, (_, flag)| bits | flag)
    }

    fn power_bits(&self, raw: &JoystickSnapshot) -> u8 {
        let m = &self.mapping;
        let mut bits = if raw.button(m.power1) { POWER1 } else { 0 };
        let (power2, power3) = match m.power_source {
            PowerSource::Buttons => (raw.button(m.power2), raw.button(m.power3)),
            PowerSource::Hat(hat) => (raw.hat(hat).is_left(), raw.hat(hat).is_right()),
            PowerSource::Axis(axis) => {
                let value = raw.axis(axis);
                (value < -AXIS_THRESHOLD, value > AXIS_THRESHOLD)
            }
        };
        if power2 {
            bits |= POWER2;
        }
        if power3 {
            bits |= POWER3;
        }
        bits
    }

    fn decode_power(&self, bits: u8, previous: PowerNotch) -> Option<PowerNotch> {
        if self.mapping.power_source == PowerSource::Buttons {
            return power_from_bits(bits);
        }
        match bits {
            // P4 also shows up while a hat/axis rolls from N towards P1
            v if v == POWER2 => {
                if previous < PowerNotch::new(3) {
                    Some(PowerNotch::NEUTRAL)
                } else {
                    Some(PowerNotch::new(4))
                }
            }
            0 => {
                if previous < PowerNotch::new(2) {
                    Some(PowerNotch::NEUTRAL)
                } else {
                    None
                }
            }
            v => power_from_bits(v),
        }
    }

    /// Decodes one raw snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::classic::{ClassicDecoder, ClassicMapping};
    /// use dengo_bridge::controller::state::{BrakeNotch, CanonicalState};
    /// use dengo_bridge::joystick::JoystickSnapshot;
    ///
    /// let mapping = ClassicMapping {
    ///     brake1: Some(0), brake2: Some(1), brake3: Some(2), brake4: Some(3),
    ///     ..Default::default()
    /// };
    /// let decoder = ClassicDecoder::new(mapping);
    ///
    /// // Brake4 alone is B6
    /// let raw = JoystickSnapshot { buttons: vec![false, false, false, true], ..Default::default() };
    /// let decoded = decoder.decode(&raw, &CanonicalState::default());
    /// assert_eq!(decoded.brake, Some(BrakeNotch::Service(6)));
    /// ```
    #[must_use]
    pub fn decode(&self, raw: &JoystickSnapshot, previous: &CanonicalState) -> DecodedInput {
        let m = &self.mapping;
        let mut buttons = Buttons::default();
        buttons.set(ControllerButton::Select, raw.button(m.select));
        buttons.set(ControllerButton::Start, raw.button(m.start));
        buttons.set(ControllerButton::A, raw.button(m.a));
        buttons.set(ControllerButton::B, raw.button(m.b));
        buttons.set(ControllerButton::C, raw.button(m.c));

        DecodedInput {
            brake: brake_from_bits(self.brake_bits(raw)),
            power: self.decode_power(self.power_bits(raw), previous.power),
            reverser: None,
            buttons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joystick::mocks::joystick_info;
    use crate::joystick::HatPosition;
    use std::collections::HashSet;

    fn full_mapping() -> ClassicMapping {
        ClassicMapping {
            select: Some(8),
            start: Some(9),
            a: Some(10),
            b: Some(11),
            c: Some(12),
            power1: Some(0),
            power2: Some(1),
            power3: Some(2),
            brake1: Some(3),
            brake2: Some(4),
            brake3: Some(5),
            brake4: Some(6),
            power_source: PowerSource::Buttons,
        }
    }

    fn snapshot(pressed: &[usize]) -> JoystickSnapshot {
        let mut buttons = vec![false; 14];
        for &i in pressed {
            buttons[i] = true;
        }
        JoystickSnapshot { buttons, axes: vec![0.0; 2], hats: vec![HatPosition::Centered] }
    }

    fn with_power(previous: u8) -> CanonicalState {
        CanonicalState { power: PowerNotch::new(previous), ..Default::default() }
    }

    // ==================== Bit Table Tests ====================

    #[test]
    fn test_brake_combinations_are_distinct() {
        let notches: Vec<BrakeNotch> = (0u8..16).filter_map(brake_from_bits).collect();
        assert_eq!(notches.len(), 10, "nine notches plus emergency");
        let unique: HashSet<_> = notches.iter().collect();
        assert_eq!(unique.len(), notches.len());
    }

    #[test]
    fn test_brake_transitions_rejected() {
        for bits in [1u8, 2, 3, 4, 5, 15] {
            assert_eq!(brake_from_bits(bits), None, "bits {} should be a transition", bits);
        }
    }

    #[test]
    fn test_power_combinations_are_distinct() {
        let notches: Vec<PowerNotch> = (0u8..8).filter_map(power_from_bits).collect();
        assert_eq!(notches.len(), 6);
        let unique: HashSet<_> = notches.iter().collect();
        assert_eq!(unique.len(), 6);
        assert_eq!(power_from_bits(0), None);
        assert_eq!(power_from_bits(7), None);
    }

    // ==================== Decode Tests ====================

    #[test]
    fn test_decode_released_and_neutral() {
        let decoder = ClassicDecoder::new(full_mapping());
        // Brake2+Brake3+Brake4, Power2+Power3
        let raw = snapshot(&[4, 5, 6, 1, 2]);
        let decoded = decoder.decode(&raw, &CanonicalState::default());
        assert_eq!(decoded.brake, Some(BrakeNotch::Released));
        assert_eq!(decoded.power, Some(PowerNotch::NEUTRAL));
    }

    #[test]
    fn test_decode_emergency_when_nothing_pressed() {
        let decoder = ClassicDecoder::new(full_mapping());
        let decoded = decoder.decode(&snapshot(&[0]), &CanonicalState::default());
        assert_eq!(decoded.brake, Some(BrakeNotch::Emergency));
        assert_eq!(decoded.power, Some(PowerNotch::new(5)));
    }

    #[test]
    fn test_decode_transition_retains() {
        let decoder = ClassicDecoder::new(full_mapping());
        // All four brake bits and no power bits
        let decoded = decoder.decode(&snapshot(&[3, 4, 5, 6]), &with_power(3));
        assert_eq!(decoded.brake, None);
        assert_eq!(decoded.power, None);
    }

    #[test]
    fn test_decode_buttons() {
        let decoder = ClassicDecoder::new(full_mapping());
        let decoded = decoder.decode(&snapshot(&[8, 12]), &CanonicalState::default());
        assert!(decoded.buttons.is_pressed(ControllerButton::Select));
        assert!(decoded.buttons.is_pressed(ControllerButton::C));
        assert!(!decoded.buttons.is_pressed(ControllerButton::Start));
    }

    #[test]
    fn test_unassigned_indices_never_crash() {
        let decoder = ClassicDecoder::new(ClassicMapping::default());
        let decoded = decoder.decode(&JoystickSnapshot::default(), &CanonicalState::default());
        assert_eq!(decoded.brake, Some(BrakeNotch::Emergency));
        assert!(decoded.buttons.iter().all(|(_, pressed)| !pressed));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let decoder = ClassicDecoder::new(full_mapping());
        let raw = snapshot(&[3, 6, 2]);
        let first = decoder.decode(&raw, &CanonicalState::default()).apply_to(&CanonicalState::default());
        let second = decoder.decode(&raw, &first).apply_to(&first);
        assert_eq!(first, second);
    }

    // ==================== Hat / Axis Power Tests ====================

    #[test]
    fn test_hat_p4_resolves_against_previous() {
        let mut mapping = full_mapping();
        mapping.power_source = PowerSource::Hat(0);
        let decoder = ClassicDecoder::new(mapping);

        let mut raw = snapshot(&[]);
        raw.hats[0] = HatPosition::Left;

        assert_eq!(decoder.decode(&raw, &with_power(1)).power, Some(PowerNotch::NEUTRAL));
        assert_eq!(decoder.decode(&raw, &with_power(3)).power, Some(PowerNotch::new(4)));
    }

    #[test]
    fn test_hat_transition_resolves_against_previous() {
        let mut mapping = full_mapping();
        mapping.power_source = PowerSource::Hat(0);
        let decoder = ClassicDecoder::new(mapping);
        let raw = snapshot(&[]);

        assert_eq!(decoder.decode(&raw, &with_power(1)).power, Some(PowerNotch::NEUTRAL));
        assert_eq!(decoder.decode(&raw, &with_power(4)).power, None);
    }

    #[test]
    fn test_axis_power_bits() {
        let mut mapping = full_mapping();
        mapping.power_source = PowerSource::Axis(1);
        let decoder = ClassicDecoder::new(mapping);

        let mut raw = snapshot(&[]);
        raw.axes[1] = 0.9;
        assert_eq!(decoder.decode(&raw, &with_power(0)).power, Some(PowerNotch::new(2)));

        // Power1 plus negative axis is P3
        let mut raw = snapshot(&[0]);
        raw.axes[1] = -0.9;
        assert_eq!(decoder.decode(&raw, &with_power(2)).power, Some(PowerNotch::new(3)));
    }

    // ==================== Discovery Tests ====================

    #[test]
    fn test_discovery_heuristic() {
        assert!(ClassicDecoder::matches(&joystick_info(1, 1, "pad", 12, 2, 0)));
        assert!(ClassicDecoder::matches(&joystick_info(1, 1, "pad", 10, 2, 1)));
        assert!(!ClassicDecoder::matches(&joystick_info(1, 1, "pad", 10, 2, 0)));
        assert!(!ClassicDecoder::matches(&joystick_info(1, 1, "pad", 24, 2, 1)));
    }

    #[test]
    fn test_is_calibrated() {
        assert!(full_mapping().is_calibrated());
        assert!(!ClassicMapping::default().is_calibrated());
    }
}
