//! # Train-Sim Handle Decoder
//!
//! Decodes the one-handle master controllers sold for PC train simulators.
//! These report the whole handle travel as a single position byte and the
//! buttons as a 16-bit little-endian mask.
//!
//! ## Handle Byte
//!
//! With `B` brake notches and `P` power notches:
//!
//! | Value | Position |
//! |-------|----------|
//! | 1 | Emergency |
//! | 2..=B+1 | B(B)..B1 |
//! | B+2 | Neutral |
//! | B+3..=B+P+2 | P1..P(P) |
//!
//! Models with a reverser put it in the high nibble of the same byte.
//!
//! The door lamp is driven through a vendor control transfer on every
//! poll.

use super::state::{
    BrakeNotch, ButtonSet, Buttons, ControllerButton, DecodedInput, PowerNotch, ReverserPosition,
    BUTTON_COUNT,
};
use crate::usb::SetupPacket;

/// Offset of the handle byte in the input report
const HANDLE_OFFSET: usize = 1;

/// Offset of the low button byte
const BUTTONS_OFFSET: usize = 2;

/// Input report length
pub const REPORT_LEN: usize = 4;

/// Vendor request type used for the lamp control transfer
const LAMP_REQUEST_TYPE: u8 = 0x40;

/// Vendor request number used for the lamp control transfer
const LAMP_REQUEST: u8 = 0x50;

/// Lamp value while the doors are closed
const LAMP_ON: u16 = 0x10;

/// Button masks in canonical order. Zero marks a missing button.
const BUTTON_MASKS: [u16; BUTTON_COUNT] = [
    0x0200, // Select
    0x0100, // Start
    0x0004, // A
    0x0010, // B
    0x0020, // C
    0x0002, // D
    0x0000, // LDoor
    0x0000, // RDoor
    0x0400, // Up
    0x0800, // Down
    0x1000, // Left
    0x2000, // Right
    0x0000, // Pedal
    0x0001, // ATS
    0x0008, // A2
];

/// Known train-sim controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainSimModel {
    /// SOTP-031201 P4/B7
    P4B7,
    /// SOTP-031201 P4/B2-B7
    P4B2B7,
    /// SOTP-031201 P5/B7
    P5B7,
    /// SOTP-031201 P13/B7
    P13B7,
    /// COTM-02001 Train Mascon
    TrainMascon,
}

impl TrainSimModel {
    pub const ALL: [TrainSimModel; 5] = [
        TrainSimModel::P4B7,
        TrainSimModel::P4B2B7,
        TrainSimModel::P5B7,
        TrainSimModel::P13B7,
        TrainSimModel::TrainMascon,
    ];

    /// `(vendor, product, revision)` the model enumerates with
    #[must_use]
    pub fn usb_id(self) -> (u16, u16, u16) {
        match self {
            TrainSimModel::P4B7 => (0x0ae4, 0x0101, 0x012c),
            TrainSimModel::P4B2B7 => (0x0ae4, 0x0101, 0x0190),
            TrainSimModel::P5B7 => (0x0ae4, 0x0101, 0x0320),
            TrainSimModel::P13B7 => (0x0ae4, 0x0101, 0x03e8),
            TrainSimModel::TrainMascon => (0x1c06, 0x77a7, 0x0000),
        }
    }

    #[must_use]
    pub fn from_usb_id(vendor: u16, product: u16, revision: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.usb_id() == (vendor, product, revision))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TrainSimModel::P4B7 => "SOTP-031201 (P4/B7)",
            TrainSimModel::P4B2B7 => "SOTP-031201 (P4/B2-B7)",
            TrainSimModel::P5B7 => "SOTP-031201 (P5/B7)",
            TrainSimModel::P13B7 => "SOTP-031201 (P13/B7)",
            TrainSimModel::TrainMascon => "COTM-02001 (Train Mascon)",
        }
    }

    #[must_use]
    pub fn brake_notches(self) -> u8 {
        match self {
            TrainSimModel::P4B2B7 => 6,
            TrainSimModel::TrainMascon => 5,
            _ => 7,
        }
    }

    #[must_use]
    pub fn power_notches(self) -> u8 {
        match self {
            TrainSimModel::P4B7 | TrainSimModel::P4B2B7 => 4,
            TrainSimModel::P5B7 | TrainSimModel::TrainMascon => 5,
            TrainSimModel::P13B7 => 13,
        }
    }

    #[must_use]
    pub fn has_reverser(self) -> bool {
        matches!(self, TrainSimModel::P4B7 | TrainSimModel::P4B2B7 | TrainSimModel::TrainMascon)
    }

    #[must_use]
    pub fn capabilities(self) -> ButtonSet {
        ControllerButton::ALL
            .iter()
            .zip(BUTTON_MASKS.iter())
            .filter(|(_, mask)| **mask != 0)
            .fold(ButtonSet::default(), |set, (&button, _)| set.with(button))
    }

    /// Input report contents before the first read completes.
    #[must_use]
    pub fn initial_input(self) -> Vec<u8> {
        vec![0x01, 0x00, 0x00, 0x00]
    }

    /// Lamp control transfer for the current door state.
    #[must_use]
    pub fn lamp_setup(self, doors_closed: bool) -> SetupPacket {
        SetupPacket {
            request_type: LAMP_REQUEST_TYPE,
            request: LAMP_REQUEST,
            value: if doors_closed { LAMP_ON } else { 0 },
            index: 0,
        }
    }
}

/// Decodes a reverser nibble.
#[must_use]
pub fn reverser_from_code(code: u8) -> ReverserPosition {
    match code {
        2 | 8 => ReverserPosition::Forward,
        1 | 4 => ReverserPosition::Backward,
        _ => ReverserPosition::Neutral,
    }
}

/// Decoder for train-sim controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainSimDecoder {
    model: TrainSimModel,
}

impl TrainSimDecoder {
    #[must_use]
    pub fn new(model: TrainSimModel) -> Self {
        Self { model }
    }

    #[must_use]
    pub fn model(&self) -> TrainSimModel {
        self.model
    }

    /// Splits the handle byte into brake and power notches. Out-of-range
    /// values are `None` and keep the previous handle.
    #[must_use]
    pub fn decode_handle(&self, handle: u8) -> Option<(BrakeNotch, PowerNotch)> {
        let brake = self.model.brake_notches();
        let power = self.model.power_notches();
        if handle == 0 || u16::from(handle) >= u16::from(brake) + u16::from(power) + 3 {
            return None;
        }

        let neutral = brake + 2;
        let notches = if handle == 1 {
            (BrakeNotch::Emergency, PowerNotch::NEUTRAL)
        } else if handle < neutral {
            (BrakeNotch::Service(neutral - handle), PowerNotch::NEUTRAL)
        } else if handle > neutral {
            (BrakeNotch::Released, PowerNotch::new(handle - neutral))
        } else {
            (BrakeNotch::Released, PowerNotch::NEUTRAL)
        };
        Some(notches)
    }

    /// Decodes one input report.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::train_sim::{TrainSimDecoder, TrainSimModel};
    /// use dengo_bridge::controller::state::{BrakeNotch, PowerNotch, ReverserPosition};
    ///
    /// let decoder = TrainSimDecoder::new(TrainSimModel::P4B7);
    /// // Reverser forward (2), handle at P1 (B7 + 2 + 1 = 10)
    /// let decoded = decoder.decode(&[0x00, 0x2A, 0x00, 0x00]);
    /// assert_eq!(decoded.reverser, Some(ReverserPosition::Forward));
    /// assert_eq!(decoded.brake, Some(BrakeNotch::Released));
    /// assert_eq!(decoded.power, Some(PowerNotch::new(1)));
    /// ```
    #[must_use]
    pub fn decode(&self, report: &[u8]) -> DecodedInput {
        if report.len() < REPORT_LEN {
            return DecodedInput::default();
        }

        let mut handle = report[HANDLE_OFFSET];
        let mut reverser = None;
        if self.model.has_reverser() {
            reverser = Some(reverser_from_code((handle >> 4) & 0x0F));
            handle &= 0x0F;
        }
        let notches = self.decode_handle(handle);

        let mask = u16::from_le_bytes([report[BUTTONS_OFFSET], report[BUTTONS_OFFSET + 1]]);
        let mut buttons = Buttons::default();
        for (&button, &bit) in ControllerButton::ALL.iter().zip(BUTTON_MASKS.iter()) {
            buttons.set(button, bit != 0 && mask & bit != 0);
        }

        DecodedInput {
            brake: notches.map(|(b, _)| b),
            power: notches.map(|(_, p)| p),
            reverser,
            buttons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Handle Tests ====================

    #[test]
    fn test_handle_positions_p4b7() {
        let decoder = TrainSimDecoder::new(TrainSimModel::P4B7);
        assert_eq!(decoder.decode_handle(1), Some((BrakeNotch::Emergency, PowerNotch::NEUTRAL)));
        assert_eq!(decoder.decode_handle(2), Some((BrakeNotch::Service(7), PowerNotch::NEUTRAL)));
        assert_eq!(decoder.decode_handle(8), Some((BrakeNotch::Service(1), PowerNotch::NEUTRAL)));
        assert_eq!(decoder.decode_handle(9), Some((BrakeNotch::Released, PowerNotch::NEUTRAL)));
        assert_eq!(decoder.decode_handle(13), Some((BrakeNotch::Released, PowerNotch::new(4))));
    }

    #[test]
    fn test_handle_out_of_range_retains() {
        let decoder = TrainSimDecoder::new(TrainSimModel::P4B7);
        assert_eq!(decoder.decode_handle(0), None);
        assert_eq!(decoder.decode_handle(14), None);
    }

    #[test]
    fn test_handle_p13_uses_full_byte() {
        let decoder = TrainSimDecoder::new(TrainSimModel::P13B7);
        // Neutral = 9, P13 = 22, which needs more than a nibble
        let decoded = decoder.decode(&[0x00, 22, 0x00, 0x00]);
        assert_eq!(decoded.power, Some(PowerNotch::new(13)));
        assert_eq!(decoded.reverser, None);
    }

    #[test]
    fn test_every_position_is_distinct() {
        for model in TrainSimModel::ALL {
            let decoder = TrainSimDecoder::new(model);
            let total = model.brake_notches() + model.power_notches() + 2;
            let positions: Vec<_> = (1..=total).filter_map(|h| decoder.decode_handle(h)).collect();
            assert_eq!(positions.len(), total as usize, "{:?}", model);
            for (i, a) in positions.iter().enumerate() {
                assert!(!positions[i + 1..].contains(a), "{:?} repeats {:?}", model, a);
            }
        }
    }

    // ==================== Reverser Tests ====================

    #[test]
    fn test_reverser_codes() {
        assert_eq!(reverser_from_code(2), ReverserPosition::Forward);
        assert_eq!(reverser_from_code(8), ReverserPosition::Forward);
        assert_eq!(reverser_from_code(1), ReverserPosition::Backward);
        assert_eq!(reverser_from_code(4), ReverserPosition::Backward);
        assert_eq!(reverser_from_code(0), ReverserPosition::Neutral);
        assert_eq!(reverser_from_code(3), ReverserPosition::Neutral);
    }

    #[test]
    fn test_reverser_nibble_stripped() {
        let decoder = TrainSimDecoder::new(TrainSimModel::TrainMascon);
        // Backward (1) with handle at EB
        let decoded = decoder.decode(&[0x00, 0x11, 0x00, 0x00]);
        assert_eq!(decoded.reverser, Some(ReverserPosition::Backward));
        assert_eq!(decoded.brake, Some(BrakeNotch::Emergency));
    }

    // ==================== Button Tests ====================

    #[test]
    fn test_buttons_little_endian() {
        let decoder = TrainSimDecoder::new(TrainSimModel::P5B7);
        // 0x0201 = Select + ATS
        let decoded = decoder.decode(&[0x00, 0x08, 0x01, 0x02]);
        assert!(decoded.buttons.is_pressed(ControllerButton::Select));
        assert!(decoded.buttons.is_pressed(ControllerButton::Ats));
        assert!(!decoded.buttons.is_pressed(ControllerButton::Start));
    }

    #[test]
    fn test_capabilities_exclude_missing() {
        let caps = TrainSimModel::P4B7.capabilities();
        assert!(caps.contains(ControllerButton::A2));
        assert!(!caps.contains(ControllerButton::Pedal));
        assert!(!caps.contains(ControllerButton::LDoor));
    }

    // ==================== Lamp Tests ====================

    #[test]
    fn test_lamp_setup_packet() {
        let on = TrainSimModel::P4B7.lamp_setup(true);
        assert_eq!((on.request_type, on.request, on.value), (0x40, 0x50, 0x10));
        assert_eq!(TrainSimModel::P4B7.lamp_setup(false).value, 0);
    }

    #[test]
    fn test_model_lookup() {
        assert_eq!(TrainSimModel::from_usb_id(0x0ae4, 0x0101, 0x03e8), Some(TrainSimModel::P13B7));
        assert_eq!(TrainSimModel::from_usb_id(0x0ae4, 0x0101, 0x0001), None);
    }
}
