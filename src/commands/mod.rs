//! # Host Commands
//!
//! Translation from canonical controller state to the abstract command
//! vocabulary of the host simulator.
//!
//! - [`notch`] - notch tables (pass-through, scaled, hold brake, air brake)
//! - [`buttons`] - per-button bindings and key repeat
//!
//! The [`CommandTranslator`] combines both into a per-frame stream of
//! [`CommandEvent`]s. Every key-down is matched by a key-up at the start of
//! the following frame.

pub mod buttons;
pub mod notch;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::controller::state::CanonicalState;
use buttons::{ButtonBindings, ButtonRepeater, RepeatTiming};
use notch::NotchMapper;

/// Abstract command understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    #[default]
    None,
    PowerIncrease,
    PowerDecrease,
    BrakeIncrease,
    BrakeDecrease,
    BrakeEmergency,
    /// Option carries the power notch
    PowerAnyNotch,
    /// Option carries the brake notch
    BrakeAnyNotch,
    /// Option carries 1 / 0 / -1
    ReverserAnyPosition,
    HoldBrake,
    ReverserForward,
    ReverserBackward,
    DoorsLeft,
    DoorsRight,
    HornPrimary,
    HornSecondary,
    HornMusic,
    DeviceConstSpeed,
    CameraInterior,
    CameraExterior,
    TimetableToggle,
    MiscClock,
    MiscPause,
    MenuActivate,
    MenuUp,
    MenuDown,
    MenuEnter,
    MenuBack,
    SecurityS,
    SecurityA1,
    SecurityA2,
    SecurityB1,
    SecurityB2,
    SecurityC1,
    SecurityC2,
    SecurityD,
    SecurityE,
    SecurityF,
    SecurityG,
    SecurityH,
    SecurityI,
    SecurityJ,
    SecurityK,
    SecurityL,
    Headlights,
    RaisePantograph,
    LowerPantograph,
    MainBreaker,
}

/// A command with its integer option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InputControl {
    pub command: HostCommand,
    pub option: i32,
}

impl InputControl {
    #[must_use]
    pub fn new(command: HostCommand, option: i32) -> Self {
        Self { command, option }
    }
}

/// Key transition sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandEvent {
    Down(InputControl),
    Up(InputControl),
}

/// Per-frame command generation for the active controller.
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    mapper: NotchMapper,
    bindings: ButtonBindings,
    repeater: ButtonRepeater,
    has_reverser: bool,
    pending_up: Vec<InputControl>,
    first_frame: bool,
}

impl CommandTranslator {
    #[must_use]
    pub fn new(mapper: NotchMapper, bindings: ButtonBindings, timing: RepeatTiming) -> Self {
        Self {
            mapper,
            bindings,
            repeater: ButtonRepeater::new(timing),
            has_reverser: false,
            pending_up: Vec::new(),
            first_frame: true,
        }
    }

    /// Swaps in new notch tables, e.g. after the active controller or the
    /// train changed. The next frame re-emits the current notches.
    pub fn reconfigure(&mut self, mapper: NotchMapper, has_reverser: bool) {
        self.mapper = mapper;
        self.has_reverser = has_reverser;
        self.reset();
    }

    pub fn set_bindings(&mut self, bindings: ButtonBindings) {
        self.bindings = bindings;
    }

    pub fn set_timing(&mut self, timing: RepeatTiming) {
        self.repeater.set_timing(timing);
    }

    #[must_use]
    pub fn mapper(&self) -> &NotchMapper {
        &self.mapper
    }

    /// Restarts repeat timers and schedules a full notch re-emit. Key-ups
    /// still owed to the host are kept.
    pub fn reset(&mut self) {
        self.repeater.reset();
        self.first_frame = true;
    }

    /// Produces the command events for one frame.
    ///
    /// Order: owed key-ups, brake, power, reverser, buttons.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::commands::buttons::{ButtonBindings, RepeatTiming};
    /// use dengo_bridge::commands::notch::{MappingOptions, NotchMapper, TrainSpecs};
    /// use dengo_bridge::commands::{CommandEvent, CommandTranslator, HostCommand};
    /// use dengo_bridge::controller::state::{BrakeNotch, CanonicalState};
    /// use std::time::Duration;
    ///
    /// let mapper = NotchMapper::new(8, 5, &TrainSpecs::default(), &MappingOptions::default());
    /// let mut translator = CommandTranslator::new(mapper, ButtonBindings::default(), RepeatTiming::default());
    ///
    /// let idle = CanonicalState::default();
    /// assert_eq!(translator.translate(&idle, &idle, Duration::ZERO).len(), 2);
    ///
    /// let braking = CanonicalState { brake: BrakeNotch::Service(3), ..idle };
    /// let events = translator.translate(&idle, &braking, Duration::from_millis(16));
    /// assert!(events.iter().any(|e| matches!(e,
    ///     CommandEvent::Down(c) if c.command == HostCommand::BrakeAnyNotch && c.option == 3)));
    /// ```
    pub fn translate(
        &mut self,
        previous: &CanonicalState,
        current: &CanonicalState,
        elapsed: Duration,
    ) -> Vec<CommandEvent> {
        let mut events: Vec<CommandEvent> = self.pending_up.drain(..).map(CommandEvent::Up).collect();
        let all = std::mem::replace(&mut self.first_frame, false);

        if all || previous.brake != current.brake {
            self.press(&mut events, self.mapper.brake_control(current.brake));
        }
        if all || previous.power != current.power {
            self.press(&mut events, self.mapper.power_control(current.power));
        }
        if self.has_reverser && (all || previous.reverser != current.reverser) {
            self.press(&mut events, self.mapper.reverser_control(current.reverser));
        }

        for button in self.repeater.update(&current.buttons, elapsed) {
            let command = self.bindings.get(button);
            if command != HostCommand::None {
                debug!("{} -> {:?}", button, command);
                self.press(&mut events, InputControl::new(command, 0));
            }
        }
        events
    }

    fn press(&mut self, events: &mut Vec<CommandEvent>, control: InputControl) {
        if control.command == HostCommand::None {
            return;
        }
        events.push(CommandEvent::Down(control));
        self.pending_up.push(control);
    }
}
