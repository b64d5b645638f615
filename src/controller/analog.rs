//! # Analog Axis Decoder
//!
//! Decodes controllers that report their handles as joystick axes: the
//! PC releases of the console controllers ("unbalance" models) and the
//! Zuiki one-handle mascon.
//!
//! Handle positions are documented by the byte the hardware reports for
//! each notch. A byte `b` maps onto the axis as `round(b * (2/255) - 1, 4)`
//! and owns a window of one byte on either side. The first window in notch
//! order containing the live axis value wins, so overlaps resolve to the
//! lower notch.
//!
//! ## Layouts
//!
//! - Unbalance models: brake on axis 0, power on axis 1
//! - Zuiki: one combined handle on axis 1, emergency at byte `0x00` and
//!   top power at byte `0xFF`

use super::state::{
    BrakeNotch, ButtonSet, Buttons, ControllerButton, DecodedInput, PowerNotch,
};
use crate::joystick::{JoystickInfo, JoystickSnapshot};

/// Controller name that selects the Select+button D-pad chord
pub const PLUG_AND_PLAY_NAME: &str = "TAITO Densha de Go! Plug & Play";

const AXIS_SCALE: f64 = 2.0 / 255.0;

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Axis value the hardware reports for `byte`.
///
/// # Examples
///
/// ```
/// use dengo_bridge::controller::analog::axis_from_byte;
///
/// assert_eq!(axis_from_byte(0x00), -1.0);
/// assert_eq!(axis_from_byte(0xFF), 1.0);
/// assert_eq!(axis_from_byte(0x79), -0.051);
/// ```
#[must_use]
pub fn axis_from_byte(byte: u8) -> f64 {
    round4(f64::from(byte) * AXIS_SCALE - 1.0)
}

fn window(byte: u8) -> (f64, f64) {
    let b = f64::from(byte);
    (round4((b - 1.0) * AXIS_SCALE - 1.0), round4((b + 1.0) * AXIS_SCALE - 1.0))
}

/// Notch bytes for one handle, in notch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisTable(&'static [u8]);

impl AxisTable {
    #[must_use]
    pub const fn new(bytes: &'static [u8]) -> Self {
        Self(bytes)
    }

    /// Position of the first notch whose window contains `value`.
    #[must_use]
    pub fn lookup(&self, value: f64) -> Option<usize> {
        self.0.iter().position(|&b| {
            let (min, max) = window(b);
            value >= min && value <= max
        })
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
    pub fn bytes(&self) -> &'static [u8] {
        self.0
    }
}

static DGC255_BRAKE: [u8; 10] = [0x79, 0x8A, 0x94, 0x9A, 0xA2, 0xA8, 0xAF, 0xB2, 0xB5, 0xB9];
static DGC255_POWER: [u8; 6] = [0x81, 0x6D, 0x54, 0x3F, 0x21, 0x00];
static DRC184_POWER: [u8; 5] = [0x00, 0x3C, 0x78, 0xB4, 0xF0];
static ZUIKI_BRAKE: [u8; 10] = [0x80, 0x6F, 0x60, 0x51, 0x42, 0x33, 0x24, 0x15, 0x07, 0x00];
static ZUIKI_POWER: [u8; 6] = [0x80, 0x9F, 0xB7, 0xCE, 0xE6, 0xFF];

/// Known analog-axis controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogModel {
    /// DGC-255 / DGOC-44U / TAITO Plug & Play
    Dgc255,
    /// DRC-184 / DYC-288
    Drc184,
    /// Zuiki one-handle mascon
    Zuiki,
}

/// Raw button positions in the order Select, Start, A, B, C, D, LDoor,
/// RDoor.
type ButtonIndices = [Option<usize>; 8];

const INDEXED_BUTTONS: [ControllerButton; 8] = [
    ControllerButton::Select,
    ControllerButton::Start,
    ControllerButton::A,
    ControllerButton::B,
    ControllerButton::C,
    ControllerButton::D,
    ControllerButton::LDoor,
    ControllerButton::RDoor,
];

impl AnalogModel {
    pub const ALL: [AnalogModel; 3] = [AnalogModel::Dgc255, AnalogModel::Drc184, AnalogModel::Zuiki];

    /// `(vendor, product)` the model enumerates with
    #[must_use]
    pub fn usb_id(self) -> (u16, u16) {
        match self {
            AnalogModel::Dgc255 => (0x0ae4, 0x0003),
            AnalogModel::Drc184 => (0x0ae4, 0x0008),
            AnalogModel::Zuiki => (0x0f0d, 0x00c1),
        }
    }

    #[must_use]
    pub fn from_usb_id(vendor: u16, product: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.usb_id() == (vendor, product))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            AnalogModel::Dgc255 => "DGC-255 / DGOC-44U",
            AnalogModel::Drc184 => "DRC-184 / DYC-288",
            AnalogModel::Zuiki => "Zuiki one-handle mascon",
        }
    }

    #[must_use]
    pub fn brake_table(self) -> AxisTable {
        match self {
            AnalogModel::Dgc255 => AxisTable::new(&DGC255_BRAKE),
            AnalogModel::Drc184 => AxisTable::new(&[]),
            AnalogModel::Zuiki => AxisTable::new(&ZUIKI_BRAKE),
        }
    }

    #[must_use]
    pub fn power_table(self) -> AxisTable {
        match self {
            AnalogModel::Dgc255 => AxisTable::new(&DGC255_POWER),
            AnalogModel::Drc184 => AxisTable::new(&DRC184_POWER),
            AnalogModel::Zuiki => AxisTable::new(&ZUIKI_POWER),
        }
    }

    fn button_indices(self) -> ButtonIndices {
        match self {
            AnalogModel::Dgc255 => [Some(4), Some(5), Some(1), Some(0), Some(2), Some(3), None, None],
            AnalogModel::Drc184 => [Some(5), Some(6), Some(2), Some(1), Some(0), None, Some(4), Some(3)],
            AnalogModel::Zuiki => [Some(8), Some(9), Some(0), Some(1), Some(2), Some(3), None, None],
        }
    }

    #[must_use]
    pub fn brake_notches(self) -> u8 {
        self.brake_table().len().saturating_sub(2) as u8
    }

    #[must_use]
    pub fn power_notches(self) -> u8 {
        self.power_table().len().saturating_sub(1) as u8
    }
}

/// Source of the four directional buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpadSource {
    /// Model has no D-pad
    None,
    /// First hat
    Hat,
    /// Select held together with D/B/A/C
    Chord,
}

/// Decoder for analog-axis controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalogDecoder {
    model: AnalogModel,
    dpad: DpadSource,
}

impl AnalogDecoder {
    #[must_use]
    pub fn new(model: AnalogModel, dpad: DpadSource) -> Self {
        Self { model, dpad }
    }

    /// Builds a decoder for `info` if it is a known analog model.
    #[must_use]
    pub fn discover(info: &JoystickInfo) -> Option<Self> {
        let model = AnalogModel::from_usb_id(info.vendor, info.product)?;
        let dpad = match model {
            AnalogModel::Dgc255 if info.name == PLUG_AND_PLAY_NAME => DpadSource::Chord,
            AnalogModel::Dgc255 if info.hat_count == 0 => DpadSource::None,
            _ => DpadSource::Hat,
        };
        Some(Self::new(model, dpad))
    }

    #[must_use]
    pub fn model(&self) -> AnalogModel {
        self.model
    }

    #[must_use]
    pub fn capabilities(&self) -> ButtonSet {
        let set = INDEXED_BUTTONS
            .iter()
            .zip(self.model.button_indices().iter())
            .filter(|(_, index)| index.is_some())
            .fold(ButtonSet::default(), |set, (&button, _)| set.with(button));
        match self.dpad {
            DpadSource::None => set,
            DpadSource::Hat | DpadSource::Chord => set.with_dpad(),
        }
    }

    fn decode_split(&self, raw: &JoystickSnapshot) -> (Option<BrakeNotch>, Option<PowerNotch>) {
        let brake_table = self.model.brake_table();
        let brake = brake_table.lookup(raw.axis(0)).map(|i| {
            if i + 1 == brake_table.len() {
                BrakeNotch::Emergency
            } else {
                BrakeNotch::from_index(i)
            }
        });
        let power = self.model.power_table().lookup(raw.axis(1)).map(|i| PowerNotch::new(i as u8));
        (brake, power)
    }

    fn decode_combined(&self, raw: &JoystickSnapshot) -> (Option<BrakeNotch>, Option<PowerNotch>) {
        let value = raw.axis(1);
        let brake_table = self.model.brake_table();
        match brake_table.lookup(value) {
            Some(0) => return (Some(BrakeNotch::Released), Some(PowerNotch::NEUTRAL)),
            Some(i) if i + 1 == brake_table.len() => {
                return (Some(BrakeNotch::Emergency), Some(PowerNotch::NEUTRAL))
            }
            Some(i) => return (Some(BrakeNotch::from_index(i)), Some(PowerNotch::NEUTRAL)),
            None => {}
        }
        match self.model.power_table().lookup(value) {
            Some(i) => (Some(BrakeNotch::Released), Some(PowerNotch::new(i as u8))),
            None => (None, None),
        }
    }

    fn apply_chord(buttons: &mut Buttons) {
        let select = buttons.is_pressed(ControllerButton::Select);
        let up = select && buttons.is_pressed(ControllerButton::D);
        let down = select && buttons.is_pressed(ControllerButton::B);
        let left = select && buttons.is_pressed(ControllerButton::A);
        let right = select && buttons.is_pressed(ControllerButton::C);
        let any = up || down || left || right;

        buttons.set(ControllerButton::Up, up);
        buttons.set(ControllerButton::Down, down);
        buttons.set(ControllerButton::Left, left);
        buttons.set(ControllerButton::Right, right);

        // Chorded buttons are consumed by the D-pad
        buttons.set(ControllerButton::Select, select ^ any);
        for (button, chorded) in [
            (ControllerButton::A, left),
            (ControllerButton::B, down),
            (ControllerButton::C, right),
            (ControllerButton::D, up),
        ] {
            let pressed = buttons.is_pressed(button);
            buttons.set(button, pressed ^ chorded);
        }
    }

    /// Decodes one raw snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::analog::{axis_from_byte, AnalogDecoder, AnalogModel, DpadSource};
    /// use dengo_bridge::controller::state::{BrakeNotch, PowerNotch};
    /// use dengo_bridge::joystick::JoystickSnapshot;
    ///
    /// let decoder = AnalogDecoder::new(AnalogModel::Zuiki, DpadSource::Hat);
    /// let raw = JoystickSnapshot { axes: vec![0.0, axis_from_byte(0xFF)], ..Default::default() };
    /// let decoded = decoder.decode(&raw);
    /// assert_eq!(decoded.power, Some(PowerNotch::new(5)));
    /// assert_eq!(decoded.brake, Some(BrakeNotch::Released));
    /// ```
    #[must_use]
    pub fn decode(&self, raw: &JoystickSnapshot) -> DecodedInput {
        let (brake, power) = match self.model {
            AnalogModel::Zuiki => self.decode_combined(raw),
            AnalogModel::Dgc255 | AnalogModel::Drc184 => self.decode_split(raw),
        };

        let mut buttons = Buttons::default();
        for (&button, &index) in INDEXED_BUTTONS.iter().zip(self.model.button_indices().iter()) {
            buttons.set(button, raw.button(index));
        }

        match self.dpad {
            DpadSource::None => {}
            DpadSource::Hat => {
                let hat = raw.hat(0);
                buttons.set(ControllerButton::Up, hat.is_up());
                buttons.set(ControllerButton::Down, hat.is_down());
                buttons.set(ControllerButton::Left, hat.is_left());
                buttons.set(ControllerButton::Right, hat.is_right());
            }
            DpadSource::Chord => Self::apply_chord(&mut buttons),
        }

        DecodedInput { brake, power, reverser: None, buttons }
    }
}
