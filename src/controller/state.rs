//! # Canonical Controller State
//!
//! Hardware-independent representation of a train controller: brake notch,
//! power notch, reverser position and a fixed vector of canonical buttons.
//!
//! Every decoder produces a [`DecodedInput`] which is folded into a
//! [`StateBuffer`]. The buffer keeps the current and previous snapshot so
//! that edge transitions can be reported as [`InputEvent`]s.
//!
//! ## Canonical Button Order
//!
//! | Index | Button |
//! |-------|--------|
//! | 0 | Select |
//! | 1 | Start |
//! | 2..=5 | A, B, C, D |
//! | 6, 7 | LDoor, RDoor |
//! | 8..=11 | Up, Down, Left, Right |
//! | 12 | Pedal |
//! | 13, 14 | ATS, A2 |

use serde::Serialize;
use std::fmt;

/// Highest service brake notch any supported controller reports.
pub const MAX_BRAKE_NOTCHES: u8 = 8;

/// Highest power notch any supported controller reports.
pub const MAX_POWER_NOTCHES: u8 = 13;

/// Number of canonical buttons.
pub const BUTTON_COUNT: usize = 15;

/// Brake handle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum BrakeNotch {
    /// Brakes released
    #[default]
    Released,
    /// Service brake notch, `1..=MAX_BRAKE_NOTCHES`
    Service(u8),
    /// Emergency brake
    Emergency,
}

impl BrakeNotch {
    /// Builds a notch from its table position: 0 is released, anything
    /// above is the matching service notch.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::state::BrakeNotch;
    ///
    /// assert_eq!(BrakeNotch::from_index(0), BrakeNotch::Released);
    /// assert_eq!(BrakeNotch::from_index(3), BrakeNotch::Service(3));
    /// ```
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => BrakeNotch::Released,
            n => BrakeNotch::Service(n.min(MAX_BRAKE_NOTCHES as usize) as u8),
        }
    }

    /// Position in a brake command table. Emergency sits one past the
    /// controller's last service notch.
    #[must_use]
    pub fn table_index(self, service_notches: u8) -> usize {
        match self {
            BrakeNotch::Released => 0,
            BrakeNotch::Service(n) => n as usize,
            BrakeNotch::Emergency => service_notches as usize + 1,
        }
    }
}

impl fmt::Display for BrakeNotch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrakeNotch::Released => write!(f, "Released"),
            BrakeNotch::Service(n) => write!(f, "B{}", n),
            BrakeNotch::Emergency => write!(f, "EB"),
        }
    }
}

/// Power handle position, 0 being neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct PowerNotch(u8);

impl PowerNotch {
    /// Neutral (no power)
    pub const NEUTRAL: PowerNotch = PowerNotch(0);

    /// Creates a power notch, clamped to [`MAX_POWER_NOTCHES`].
    #[must_use]
    pub fn new(notch: u8) -> Self {
        PowerNotch(notch.min(MAX_POWER_NOTCHES))
    }

    /// Numeric notch, 0 for neutral
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PowerNotch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "N")
        } else {
            write!(f, "P{}", self.0)
        }
    }
}

/// Reverser handle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ReverserPosition {
    Forward,
    #[default]
    Neutral,
    Backward,
}

impl ReverserPosition {
    /// Host option value: 1 forward, 0 neutral, -1 backward.
    #[must_use]
    pub fn option(self) -> i32 {
        match self {
            ReverserPosition::Forward => 1,
            ReverserPosition::Neutral => 0,
            ReverserPosition::Backward => -1,
        }
    }
}

/// Canonical controller buttons, in canonical index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ControllerButton {
    Select,
    Start,
    A,
    B,
    C,
    D,
    LDoor,
    RDoor,
    Up,
    Down,
    Left,
    Right,
    Pedal,
    Ats,
    A2,
}

impl ControllerButton {
    /// Every button in canonical order
    pub const ALL: [ControllerButton; BUTTON_COUNT] = [
        ControllerButton::Select,
        ControllerButton::Start,
        ControllerButton::A,
        ControllerButton::B,
        ControllerButton::C,
        ControllerButton::D,
        ControllerButton::LDoor,
        ControllerButton::RDoor,
        ControllerButton::Up,
        ControllerButton::Down,
        ControllerButton::Left,
        ControllerButton::Right,
        ControllerButton::Pedal,
        ControllerButton::Ats,
        ControllerButton::A2,
    ];

    /// Directional pad buttons
    pub const DPAD: [ControllerButton; 4] = [
        ControllerButton::Up,
        ControllerButton::Down,
        ControllerButton::Left,
        ControllerButton::Right,
    ];

    /// Canonical index of this button
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name used in configuration files.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            ControllerButton::Select => "select",
            ControllerButton::Start => "start",
            ControllerButton::A => "a",
            ControllerButton::B => "b",
            ControllerButton::C => "c",
            ControllerButton::D => "d",
            ControllerButton::LDoor => "ldoor",
            ControllerButton::RDoor => "rdoor",
            ControllerButton::Up => "up",
            ControllerButton::Down => "down",
            ControllerButton::Left => "left",
            ControllerButton::Right => "right",
            ControllerButton::Pedal => "pedal",
            ControllerButton::Ats => "ats",
            ControllerButton::A2 => "a2",
        }
    }
}

impl fmt::Display for ControllerButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key().to_uppercase())
    }
}

/// Set of canonical buttons a controller physically has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ButtonSet(u16);

impl ButtonSet {
    /// Builds a set from a list of buttons.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::state::{ButtonSet, ControllerButton};
    ///
    /// let set = ButtonSet::of(&[ControllerButton::A, ControllerButton::Start]);
    /// assert!(set.contains(ControllerButton::A));
    /// assert!(!set.contains(ControllerButton::B));
    /// ```
    #[must_use]
    pub fn of(buttons: &[ControllerButton]) -> Self {
        let mut set = ButtonSet(0);
        for &button in buttons {
            set = set.with(button);
        }
        set
    }

    /// Returns a copy with `button` added.
    #[must_use]
    pub fn with(self, button: ControllerButton) -> Self {
        ButtonSet(self.0 | (1 << button.index()))
    }

    /// Returns a copy with the four directional buttons added.
    #[must_use]
    pub fn with_dpad(self) -> Self {
        ControllerButton::DPAD.iter().fold(self, |set, &b| set.with(b))
    }

    #[must_use]
    pub fn contains(self, button: ControllerButton) -> bool {
        self.0 & (1 << button.index()) != 0
    }

    /// Iterates the contained buttons in canonical order.
    pub fn iter(self) -> impl Iterator<Item = ControllerButton> {
        ControllerButton::ALL.into_iter().filter(move |&b| self.contains(b))
    }
}

/// Pressed state of every canonical button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons([bool; BUTTON_COUNT]);

impl Buttons {
    #[must_use]
    pub fn is_pressed(&self, button: ControllerButton) -> bool {
        self.0[button.index()]
    }

    pub fn set(&mut self, button: ControllerButton, pressed: bool) {
        self.0[button.index()] = pressed;
    }

    /// Iterates `(button, pressed)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (ControllerButton, bool)> + '_ {
        ControllerButton::ALL.iter().map(move |&b| (b, self.0[b.index()]))
    }

    /// Clears every button not in `supported`.
    #[must_use]
    pub fn masked(mut self, supported: ButtonSet) -> Self {
        for button in ControllerButton::ALL {
            if !supported.contains(button) {
                self.set(button, false);
            }
        }
        self
    }
}

/// Complete canonical snapshot of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanonicalState {
    pub brake: BrakeNotch,
    pub power: PowerNotch,
    pub reverser: ReverserPosition,
    pub buttons: Buttons,
}

/// Output of a single decode pass.
///
/// A `None` handle value means the raw reading was ambiguous (a transition
/// between notches) and the previous value must be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodedInput {
    pub brake: Option<BrakeNotch>,
    pub power: Option<PowerNotch>,
    pub reverser: Option<ReverserPosition>,
    pub buttons: Buttons,
}

impl DecodedInput {
    /// Folds this reading into `previous`, keeping every value that was
    /// not decoded.
    #[must_use]
    pub fn apply_to(&self, previous: &CanonicalState) -> CanonicalState {
        CanonicalState {
            brake: self.brake.unwrap_or(previous.brake),
            power: self.power.unwrap_or(previous.power),
            reverser: self.reverser.unwrap_or(previous.reverser),
            buttons: self.buttons,
        }
    }
}

/// Edge transition between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    BrakeChanged { from: BrakeNotch, to: BrakeNotch },
    PowerChanged { from: PowerNotch, to: PowerNotch },
    ReverserChanged { from: ReverserPosition, to: ReverserPosition },
    ButtonPressed(ControllerButton),
    ButtonReleased(ControllerButton),
}

/// Double-buffered canonical state.
#[derive(Debug, Clone, Default)]
pub struct StateBuffer {
    current: CanonicalState,
    previous: CanonicalState,
}

impl StateBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current snapshot to the previous slot and folds `decoded`
    /// into the current one.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::state::{BrakeNotch, DecodedInput, StateBuffer};
    ///
    /// let mut buffer = StateBuffer::new();
    /// let decoded = DecodedInput { brake: Some(BrakeNotch::Service(2)), ..Default::default() };
    /// buffer.update(&decoded);
    /// assert_eq!(buffer.current().brake, BrakeNotch::Service(2));
    /// assert_eq!(buffer.previous().brake, BrakeNotch::Released);
    /// ```
    pub fn update(&mut self, decoded: &DecodedInput) -> &CanonicalState {
        self.previous = self.current;
        self.current = decoded.apply_to(&self.previous);
        &self.current
    }

    /// Resets both slots, e.g. when the active controller changes.
    pub fn reset(&mut self) {
        self.current = CanonicalState::default();
        self.previous = CanonicalState::default();
    }

    #[must_use]
    pub fn current(&self) -> &CanonicalState {
        &self.current
    }

    #[must_use]
    pub fn previous(&self) -> &CanonicalState {
        &self.previous
    }

    #[must_use]
    pub fn was_pressed(&self, button: ControllerButton) -> bool {
        self.current.buttons.is_pressed(button) && !self.previous.buttons.is_pressed(button)
    }

    #[must_use]
    pub fn was_released(&self, button: ControllerButton) -> bool {
        !self.current.buttons.is_pressed(button) && self.previous.buttons.is_pressed(button)
    }

    /// Edge transitions between the previous and current snapshot.
    #[must_use]
    pub fn events(&self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let (prev, cur) = (&self.previous, &self.current);

        if prev.brake != cur.brake {
            events.push(InputEvent::BrakeChanged { from: prev.brake, to: cur.brake });
        }
        if prev.power != cur.power {
            events.push(InputEvent::PowerChanged { from: prev.power, to: cur.power });
        }
        if prev.reverser != cur.reverser {
            events.push(InputEvent::ReverserChanged { from: prev.reverser, to: cur.reverser });
        }
        for button in ControllerButton::ALL {
            if self.was_pressed(button) {
                events.push(InputEvent::ButtonPressed(button));
            } else if self.was_released(button) {
                events.push(InputEvent::ButtonReleased(button));
            }
        }
        events
    }
}
