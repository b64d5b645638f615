//! # Byte-Range Decoder
//!
//! Decodes the USB controllers that report each handle as a single byte.
//! Every notch owns a closed `[min, max]` byte interval in a per-model
//! table; the last brake interval is the emergency position. A byte that
//! falls in no interval is a handle in motion and keeps the previous notch.
//!
//! ## Supported Models
//!
//! | Model | Id | Brake | Power | Report |
//! |-------|----|-------|-------|--------|
//! | TCPP-20009 Type II | 0ae4:0004 | 8 | 5 | 6 bytes |
//! | TCPP-20011 Shinkansen | 0ae4:0005 | 7 | 13 | 6 bytes |
//! | TCPP-20014 Ryojouhen | 0ae4:0007 | 6 | 4 | 8 bytes |
//!
//! The D-pad byte is a compass position `0..=7` clockwise from up, with 8
//! meaning centered. The pedal reads pressed when its byte is `0x00`.

use super::state::{
    BrakeNotch, ButtonSet, Buttons, ControllerButton, DecodedInput, PowerNotch,
};

/// Closed byte interval owned by one notch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotchRange {
    pub min: u8,
    pub max: u8,
}

impl NotchRange {
    #[must_use]
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Single-byte interval
    #[must_use]
    pub const fn exact(value: u8) -> Self {
        Self { min: value, max: value }
    }

    #[must_use]
    pub fn contains(&self, byte: u8) -> bool {
        (self.min..=self.max).contains(&byte)
    }
}

/// Ordered notch intervals for one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTable(&'static [NotchRange]);

impl RangeTable {
    /// Position of the first interval containing `byte`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::byte_range::{NotchRange, RangeTable};
    ///
    /// static TABLE: [NotchRange; 2] = [NotchRange::new(0x00, 0x10), NotchRange::exact(0x20)];
    /// let table = RangeTable::new(&TABLE);
    /// assert_eq!(table.lookup(0x08), Some(0));
    /// assert_eq!(table.lookup(0x20), Some(1));
    /// assert_eq!(table.lookup(0x18), None);
    /// ```
    #[must_use]
    pub const fn new(ranges: &'static [NotchRange]) -> Self {
        Self(ranges)
    }

    #[must_use]
    pub fn lookup(&self, byte: u8) -> Option<usize> {
        self.0.iter().position(|range| range.contains(byte))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn ranges(&self) -> &'static [NotchRange] {
        self.0
    }
}

/// Decodes the D-pad compass byte.
///
/// Returns `(up, right, down, left)`.
#[must_use]
pub fn dpad_from_byte(value: u8) -> (bool, bool, bool, bool) {
    let up = value <= 1 || value == 7;
    let right = (1..=3).contains(&value);
    let down = (3..=5).contains(&value);
    let left = (5..=7).contains(&value);
    (up, right, down, left)
}

/// Writes the four D-pad buttons into `buttons`.
pub fn apply_dpad(buttons: &mut Buttons, value: u8) {
    let (up, right, down, left) = dpad_from_byte(value);
    buttons.set(ControllerButton::Up, up);
    buttons.set(ControllerButton::Right, right);
    buttons.set(ControllerButton::Down, down);
    buttons.set(ControllerButton::Left, left);
}

/// Byte offsets inside an input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReportLayout {
    brake: usize,
    power: usize,
    pedal: usize,
    dpad: usize,
    buttons: usize,
}

/// Known byte-range controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteRangeModel {
    TypeII,
    Shinkansen,
    Ryojouhen,
}

/// Button bitmasks against the button byte, indexed Select, Start, A, B,
/// C, D, LDoor, RDoor. A zero mask is a button the model lacks.
type ButtonMasks = [u8; 8];

const MASKED_BUTTONS: [ControllerButton; 8] = [
    ControllerButton::Select,
    ControllerButton::Start,
    ControllerButton::A,
    ControllerButton::B,
    ControllerButton::C,
    ControllerButton::D,
    ControllerButton::LDoor,
    ControllerButton::RDoor,
];

static TYPE2_BRAKE: [NotchRange; 10] = [
    NotchRange::exact(0x79),
    NotchRange::exact(0x8A),
    NotchRange::exact(0x94),
    NotchRange::exact(0x9A),
    NotchRange::exact(0xA2),
    NotchRange::exact(0xA8),
    NotchRange::exact(0xAF),
    NotchRange::exact(0xB2),
    NotchRange::exact(0xB5),
    NotchRange::exact(0xB9),
];

static TYPE2_POWER: [NotchRange; 6] = [
    NotchRange::exact(0x81),
    NotchRange::exact(0x6D),
    NotchRange::exact(0x54),
    NotchRange::exact(0x3F),
    NotchRange::exact(0x21),
    NotchRange::exact(0x00),
];

static SHINKANSEN_BRAKE: [NotchRange; 9] = [
    NotchRange::exact(0x1C),
    NotchRange::exact(0x38),
    NotchRange::exact(0x54),
    NotchRange::exact(0x70),
    NotchRange::exact(0x8B),
    NotchRange::exact(0xA7),
    NotchRange::exact(0xC3),
    NotchRange::exact(0xDF),
    NotchRange::exact(0xFB),
];

static SHINKANSEN_POWER: [NotchRange; 14] = [
    NotchRange::exact(0x12),
    NotchRange::exact(0x24),
    NotchRange::exact(0x36),
    NotchRange::exact(0x48),
    NotchRange::exact(0x5A),
    NotchRange::exact(0x6C),
    NotchRange::exact(0x7E),
    NotchRange::exact(0x90),
    NotchRange::exact(0xA2),
    NotchRange::exact(0xB4),
    NotchRange::exact(0xC6),
    NotchRange::exact(0xD7),
    NotchRange::exact(0xE9),
    NotchRange::exact(0xFB),
];

static RYOJOUHEN_BRAKE: [NotchRange; 8] = [
    NotchRange::new(0x23, 0x2C),
    NotchRange::new(0x2D, 0x3E),
    NotchRange::new(0x3F, 0x4E),
    NotchRange::new(0x4F, 0x63),
    NotchRange::new(0x64, 0x8A),
    NotchRange::new(0x8B, 0xB0),
    NotchRange::new(0xB1, 0xD4),
    NotchRange::new(0xD5, 0xDF),
];

static RYOJOUHEN_POWER: [NotchRange; 5] = [
    NotchRange::exact(0x00),
    NotchRange::exact(0x3C),
    NotchRange::exact(0x78),
    NotchRange::exact(0xB4),
    NotchRange::exact(0xF0),
];

impl ByteRangeModel {
    /// Every model, for registry lookups
    pub const ALL: [ByteRangeModel; 3] =
        [ByteRangeModel::TypeII, ByteRangeModel::Shinkansen, ByteRangeModel::Ryojouhen];

    /// `(vendor, product)` the model enumerates with
    #[must_use]
    pub fn usb_id(self) -> (u16, u16) {
        match self {
            ByteRangeModel::TypeII => (0x0ae4, 0x0004),
            ByteRangeModel::Shinkansen => (0x0ae4, 0x0005),
            ByteRangeModel::Ryojouhen => (0x0ae4, 0x0007),
        }
    }

    #[must_use]
    pub fn from_usb_id(vendor: u16, product: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.usb_id() == (vendor, product))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ByteRangeModel::TypeII => "TCPP-20009 (Type II)",
            ByteRangeModel::Shinkansen => "TCPP-20011 (Shinkansen)",
            ByteRangeModel::Ryojouhen => "TCPP-20014 (Ryojouhen)",
        }
    }

    fn brake_table(self) -> RangeTable {
        match self {
            ByteRangeModel::TypeII => RangeTable::new(&TYPE2_BRAKE),
            ByteRangeModel::Shinkansen => RangeTable::new(&SHINKANSEN_BRAKE),
            ByteRangeModel::Ryojouhen => RangeTable::new(&RYOJOUHEN_BRAKE),
        }
    }

    fn power_table(self) -> RangeTable {
        match self {
            ByteRangeModel::TypeII => RangeTable::new(&TYPE2_POWER),
            ByteRangeModel::Shinkansen => RangeTable::new(&SHINKANSEN_POWER),
            ByteRangeModel::Ryojouhen => RangeTable::new(&RYOJOUHEN_POWER),
        }
    }

    fn masks(self) -> ButtonMasks {
        match self {
            ByteRangeModel::TypeII => [0x10, 0x20, 0x02, 0x01, 0x04, 0x08, 0x00, 0x00],
            ByteRangeModel::Shinkansen => [0x10, 0x20, 0x08, 0x04, 0x02, 0x01, 0x00, 0x00],
            ByteRangeModel::Ryojouhen => [0x20, 0x40, 0x04, 0x02, 0x01, 0x00, 0x10, 0x08],
        }
    }

    fn layout(self) -> ReportLayout {
        match self {
            ByteRangeModel::TypeII => {
                ReportLayout { brake: 1, power: 2, pedal: 3, dpad: 4, buttons: 5 }
            }
            ByteRangeModel::Shinkansen | ByteRangeModel::Ryojouhen => {
                ReportLayout { brake: 0, power: 1, pedal: 2, dpad: 3, buttons: 4 }
            }
        }
    }

    /// Input report contents before the first read completes.
    #[must_use]
    pub fn initial_input(self) -> Vec<u8> {
        match self {
            ByteRangeModel::TypeII => vec![0x01, 0x00, 0x00, 0xFF, 0x08, 0x00],
            ByteRangeModel::Shinkansen => vec![0x00, 0x00, 0xFF, 0x08, 0x00, 0x00],
            ByteRangeModel::Ryojouhen => vec![0x00, 0x00, 0xFF, 0x08, 0x00, 0x00, 0x00, 0x00],
        }
    }

    /// Service brake notches (table minus released and emergency)
    #[must_use]
    pub fn brake_notches(self) -> u8 {
        self.brake_table().len().saturating_sub(2) as u8
    }

    /// Power notches (table minus neutral)
    #[must_use]
    pub fn power_notches(self) -> u8 {
        self.power_table().len().saturating_sub(1) as u8
    }

    #[must_use]
    pub fn capabilities(self) -> ButtonSet {
        let masks = self.masks();
        MASKED_BUTTONS
            .iter()
            .zip(masks.iter())
            .filter(|(_, mask)| **mask != 0)
            .fold(ButtonSet::default(), |set, (&button, _)| set.with(button))
            .with_dpad()
            .with(ControllerButton::Pedal)
    }
}

/// Decoder for byte-range USB controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRangeDecoder {
    model: ByteRangeModel,
}

impl ByteRangeDecoder {
    #[must_use]
    pub fn new(model: ByteRangeModel) -> Self {
        Self { model }
    }

    #[must_use]
    pub fn model(&self) -> ByteRangeModel {
        self.model
    }

    fn decode_brake(&self, byte: u8) -> Option<BrakeNotch> {
        let table = self.model.brake_table();
        let index = table.lookup(byte)?;
        if index + 1 == table.len() {
            Some(BrakeNotch::Emergency)
        } else {
            Some(BrakeNotch::from_index(index))
        }
    }

    fn decode_power(&self, byte: u8) -> Option<PowerNotch> {
        self.model.power_table().lookup(byte).map(|i| PowerNotch::new(i as u8))
    }

    /// Decodes one input report. A report shorter than the model's layout
    /// keeps both handles and releases every button.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::byte_range::{ByteRangeDecoder, ByteRangeModel};
    /// use dengo_bridge::controller::state::BrakeNotch;
    ///
    /// let decoder = ByteRangeDecoder::new(ByteRangeModel::TypeII);
    /// let decoded = decoder.decode(&[0x01, 0x8A, 0x81, 0xFF, 0x08, 0x00]);
    /// assert_eq!(decoded.brake, Some(BrakeNotch::Service(1)));
    /// ```
    #[must_use]
    pub fn decode(&self, report: &[u8]) -> DecodedInput {
        let layout = self.model.layout();
        let last = [layout.brake, layout.power, layout.pedal, layout.dpad, layout.buttons]
            .into_iter()
            .max()
            .unwrap_or(0);
        if report.len() <= last {
            return DecodedInput::default();
        }

        let mut buttons = Buttons::default();
        let button_byte = report[layout.buttons];
        for (&button, &mask) in MASKED_BUTTONS.iter().zip(self.model.masks().iter()) {
            buttons.set(button, mask != 0 && button_byte & mask != 0);
        }
        buttons.set(ControllerButton::Pedal, report[layout.pedal] == 0x00);
        apply_dpad(&mut buttons, report[layout.dpad]);

        DecodedInput {
            brake: self.decode_brake(report[layout.brake]),
            power: self.decode_power(report[layout.power]),
            reverser: None,
            buttons,
        }
    }
}
