//! # Calibration Module
//!
//! Discovers which raw inputs a classic console adapter uses for each
//! button and handle bit.
//!
//! The user is walked through a fixed sequence of prompts. After each one
//! the caller hands in a fresh [`JoystickSnapshot`]; the session diffs it
//! against the previous snapshot and assigns the first raw button whose
//! state changed and that no earlier step already claimed.
//!
//! ## Prompt Sequence
//!
//! | Step | Prompt | Assigns |
//! |------|--------|---------|
//! | 1-5 | press Select, Start, A, B, C | the button |
//! | 6 | brake to EMG | baseline |
//! | 7 | brake to B6 | Brake4 |
//! | 8 | brake to B5 | Brake1 |
//! | 9 | brake to B4 | Brake2 |
//! | 10 | brake to B8 | Brake3 |
//! | 11 | power to P5 | baseline |
//! | 12 | power to N | baseline |
//! | 13 | power to P2 | Power2, or the hat/axis carrying Power2/Power3 |
//! | 14 | power to P1 | Power1 |
//! | 15 | power to P5 | Power3 |
//!
//! ## Usage
//!
//! ```
//! use dengo_bridge::controller::calibration::{CalibrationSession, Prompt};
//! use dengo_bridge::controller::state::ControllerButton;
//! use dengo_bridge::joystick::JoystickSnapshot;
//! use std::time::Duration;
//!
//! let idle = JoystickSnapshot { buttons: vec![false; 12], ..Default::default() };
//! let mut session = CalibrationSession::begin(idle.clone(), Duration::from_secs(30));
//! assert_eq!(session.current_prompt(), Prompt::PressButton(ControllerButton::Select));
//!
//! let mut select = idle.clone();
//! select.buttons[8] = true;
//! let progress = session.next_step(select).unwrap();
//! assert_eq!(progress.assigned, Some(8));
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::classic::{ClassicMapping, PowerSource};
use super::state::{BrakeNotch, ControllerButton, PowerNotch};
use crate::error::{DengoError, Result};
use crate::joystick::{HatPosition, JoystickSnapshot};

/// Axis movement treated as deliberate rather than noise
const AXIS_CHANGE_THRESHOLD: f64 = 0.25;

/// Default time the user gets for each prompt
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// One position in the prompt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    Select,
    Start,
    A,
    B,
    C,
    BrakeEmergency,
    BrakeB6,
    BrakeB5,
    BrakeB4,
    BrakeB8,
    PowerP5Baseline,
    PowerNeutral,
    PowerP2,
    PowerP1,
    PowerP5,
    Done,
}

const SEQUENCE: [CalibrationStep; 16] = [
    CalibrationStep::Select,
    CalibrationStep::Start,
    CalibrationStep::A,
    CalibrationStep::B,
    CalibrationStep::C,
    CalibrationStep::BrakeEmergency,
    CalibrationStep::BrakeB6,
    CalibrationStep::BrakeB5,
    CalibrationStep::BrakeB4,
    CalibrationStep::BrakeB8,
    CalibrationStep::PowerP5Baseline,
    CalibrationStep::PowerNeutral,
    CalibrationStep::PowerP2,
    CalibrationStep::PowerP1,
    CalibrationStep::PowerP5,
    CalibrationStep::Done,
];

impl CalibrationStep {
    /// What the user is asked to do.
    #[must_use]
    pub fn prompt(self) -> Prompt {
        match self {
            CalibrationStep::Select => Prompt::PressButton(ControllerButton::Select),
            CalibrationStep::Start => Prompt::PressButton(ControllerButton::Start),
            CalibrationStep::A => Prompt::PressButton(ControllerButton::A),
            CalibrationStep::B => Prompt::PressButton(ControllerButton::B),
            CalibrationStep::C => Prompt::PressButton(ControllerButton::C),
            CalibrationStep::BrakeEmergency => Prompt::MoveBrake(BrakeNotch::Emergency),
            CalibrationStep::BrakeB6 => Prompt::MoveBrake(BrakeNotch::Service(6)),
            CalibrationStep::BrakeB5 => Prompt::MoveBrake(BrakeNotch::Service(5)),
            CalibrationStep::BrakeB4 => Prompt::MoveBrake(BrakeNotch::Service(4)),
            CalibrationStep::BrakeB8 => Prompt::MoveBrake(BrakeNotch::Service(8)),
            CalibrationStep::PowerP5Baseline | CalibrationStep::PowerP5 => {
                Prompt::MovePower(PowerNotch::new(5))
            }
            CalibrationStep::PowerNeutral => Prompt::MovePower(PowerNotch::NEUTRAL),
            CalibrationStep::PowerP2 => Prompt::MovePower(PowerNotch::new(2)),
            CalibrationStep::PowerP1 => Prompt::MovePower(PowerNotch::new(1)),
            CalibrationStep::Done => Prompt::Done,
        }
    }

    /// Baseline steps only record the snapshot.
    #[must_use]
    pub fn assigns(self) -> bool {
        !matches!(
            self,
            CalibrationStep::BrakeEmergency
                | CalibrationStep::PowerP5Baseline
                | CalibrationStep::PowerNeutral
                | CalibrationStep::Done
        )
    }

    fn slot(self, mapping: &mut ClassicMapping) -> Option<&mut Option<usize>> {
        match self {
            CalibrationStep::Select => Some(&mut mapping.select),
            CalibrationStep::Start => Some(&mut mapping.start),
            CalibrationStep::A => Some(&mut mapping.a),
            CalibrationStep::B => Some(&mut mapping.b),
            CalibrationStep::C => Some(&mut mapping.c),
            CalibrationStep::BrakeB6 => Some(&mut mapping.brake4),
            CalibrationStep::BrakeB5 => Some(&mut mapping.brake1),
            CalibrationStep::BrakeB4 => Some(&mut mapping.brake2),
            CalibrationStep::BrakeB8 => Some(&mut mapping.brake3),
            CalibrationStep::PowerP2 => Some(&mut mapping.power2),
            CalibrationStep::PowerP1 => Some(&mut mapping.power1),
            CalibrationStep::PowerP5 => Some(&mut mapping.power3),
            _ => None,
        }
    }
}

/// Instruction shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    PressButton(ControllerButton),
    MoveBrake(BrakeNotch),
    MovePower(PowerNotch),
    Done,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::PressButton(button) => {
                write!(f, "Hold {} and confirm", button.key().to_uppercase())
            }
            Prompt::MoveBrake(notch) => write!(f, "Move the brake handle to {} and confirm", notch),
            Prompt::MovePower(notch) => write!(f, "Move the power handle to {} and confirm", notch),
            Prompt::Done => write!(f, "Calibration complete"),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationProgress {
    /// Step that was just completed
    pub step: CalibrationStep,
    /// Raw index assigned by this step, `None` when nothing changed or the
    /// step only records a baseline
    pub assigned: Option<usize>,
    /// Next instruction
    pub next: Prompt,
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationResult {
    pub mapping: ClassicMapping,
    /// Assigning steps that found no changed input
    pub unassigned: Vec<CalibrationStep>,
}

/// An in-progress calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    cursor: usize,
    ignored: Vec<usize>,
    previous: JoystickSnapshot,
    mapping: ClassicMapping,
    unassigned: Vec<CalibrationStep>,
    step_timeout: Duration,
    deadline: Instant,
}

impl CalibrationSession {
    /// Starts a session from the controller's idle state.
    #[must_use]
    pub fn begin(initial: JoystickSnapshot, step_timeout: Duration) -> Self {
        info!("Calibration started");
        Self {
            cursor: 0,
            ignored: Vec::new(),
            previous: initial,
            mapping: ClassicMapping::default(),
            unassigned: Vec::new(),
            step_timeout,
            deadline: Instant::now() + step_timeout,
        }
    }

    #[must_use]
    pub fn current_step(&self) -> CalibrationStep {
        SEQUENCE[self.cursor.min(SEQUENCE.len() - 1)]
    }

    #[must_use]
    pub fn current_prompt(&self) -> Prompt {
        self.current_step().prompt()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.current_step() == CalibrationStep::Done
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        !self.is_done() && now >= self.deadline
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left for the current prompt
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Raw indices already claimed
    #[must_use]
    pub fn ignored(&self) -> &[usize] {
        &self.ignored
    }

    fn changed_button(&self, snapshot: &JoystickSnapshot) -> Option<usize> {
        (0..snapshot.buttons.len())
            .filter(|i| !self.ignored.contains(i))
            .find(|&i| snapshot.button(Some(i)) != self.previous.button(Some(i)))
    }

    fn changed_axis(&self, snapshot: &JoystickSnapshot) -> Option<usize> {
        (0..snapshot.axes.len())
            .find(|&i| (snapshot.axis(i) - self.previous.axis(i)).abs() >= AXIS_CHANGE_THRESHOLD)
    }

    fn changed_hat(&self, snapshot: &JoystickSnapshot) -> Option<usize> {
        (0..snapshot.hats.len()).find(|&i| {
            let before = self.previous.hats.get(i).copied().unwrap_or(HatPosition::Centered);
            snapshot.hat(i) != before
        })
    }

    /// Completes the current prompt with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`DengoError::CalibrationTimeout`] if the prompt's deadline
    /// passed, or [`DengoError::Calibration`] if the session already
    /// finished.
    pub fn next_step(&mut self, snapshot: JoystickSnapshot) -> Result<CalibrationProgress> {
        self.next_step_at(snapshot, Instant::now())
    }

    /// [`next_step`](Self::next_step) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`next_step`](Self::next_step).
    pub fn next_step_at(&mut self, snapshot: JoystickSnapshot, now: Instant) -> Result<CalibrationProgress> {
        let step = self.current_step();
        if step == CalibrationStep::Done {
            return Err(DengoError::Calibration("calibration already finished".to_string()));
        }
        if self.is_expired_at(now) {
            return Err(DengoError::CalibrationTimeout);
        }

        let mut assigned = None;
        if step.assigns() {
            assigned = self.changed_button(&snapshot);
            if let Some(index) = assigned {
                self.ignored.push(index);
            } else {
                self.unassigned.push(step);
            }
            if let Some(slot) = step.slot(&mut self.mapping) {
                *slot = assigned;
            }

            if step == CalibrationStep::PowerP2 {
                if let Some(axis) = self.changed_axis(&snapshot) {
                    self.mapping.power_source = PowerSource::Axis(axis);
                } else if let Some(hat) = self.changed_hat(&snapshot) {
                    self.mapping.power_source = PowerSource::Hat(hat);
                }
            }
        }
        debug!("Calibration step {:?} assigned {:?}", step, assigned);

        self.previous = snapshot;
        self.cursor += 1;
        self.deadline = now + self.step_timeout;

        Ok(CalibrationProgress { step, assigned, next: self.current_prompt() })
    }

    /// Consumes a finished session.
    ///
    /// # Errors
    ///
    /// Returns [`DengoError::Calibration`] if prompts remain.
    pub fn finish(self) -> Result<CalibrationResult> {
        if !self.is_done() {
            return Err(DengoError::Calibration(format!(
                "calibration stopped at {:?}",
                self.current_step()
            )));
        }
        info!("Calibration finished ({} unassigned)", self.unassigned.len());
        Ok(CalibrationResult { mapping: self.mapping, unassigned: self.unassigned })
    }
}
