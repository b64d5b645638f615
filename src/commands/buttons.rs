//! Button bindings and key repeat

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::HostCommand;
use crate::controller::state::{Buttons, ControllerButton, BUTTON_COUNT};

/// Default wait before a held button starts repeating
pub const DEFAULT_REPEAT_DELAY: Duration = Duration::from_millis(500);

/// Default gap between repeats
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Host command bound to each canonical button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonBindings([HostCommand; BUTTON_COUNT]);

impl ButtonBindings {
    #[must_use]
    pub fn get(&self, button: ControllerButton) -> HostCommand {
        self.0[button.index()]
    }

    pub fn set(&mut self, button: ControllerButton, command: HostCommand) {
        self.0[button.index()] = command;
    }

    /// Bound buttons in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (ControllerButton, HostCommand)> + '_ {
        ControllerButton::ALL
            .into_iter()
            .map(|b| (b, self.get(b)))
            .filter(|(_, command)| *command != HostCommand::None)
    }
}

/// Repeat timing for held buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTiming {
    pub delay: Duration,
    pub interval: Duration,
}

impl Default for RepeatTiming {
    fn default() -> Self {
        Self { delay: DEFAULT_REPEAT_DELAY, interval: DEFAULT_REPEAT_INTERVAL }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RepeatTimer {
    remaining: Duration,
    repeating: bool,
}

/// Turns held buttons into a stream of key-downs.
///
/// A fresh press fires at once, the first repeat comes after
/// [`RepeatTiming::delay`] and later ones every [`RepeatTiming::interval`].
///
/// # Examples
///
/// ```
/// use dengo_bridge::commands::buttons::{ButtonRepeater, RepeatTiming};
/// use dengo_bridge::controller::state::{Buttons, ControllerButton};
/// use std::time::Duration;
///
/// let mut repeater = ButtonRepeater::new(RepeatTiming::default());
/// let mut held = Buttons::default();
/// held.set(ControllerButton::A, true);
///
/// assert_eq!(repeater.update(&held, Duration::ZERO), vec![ControllerButton::A]);
/// assert!(repeater.update(&held, Duration::from_millis(100)).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ButtonRepeater {
    timing: RepeatTiming,
    timers: [RepeatTimer; BUTTON_COUNT],
}

impl ButtonRepeater {
    #[must_use]
    pub fn new(timing: RepeatTiming) -> Self {
        Self { timing, timers: [RepeatTimer::default(); BUTTON_COUNT] }
    }

    pub fn set_timing(&mut self, timing: RepeatTiming) {
        self.timing = timing;
    }

    /// Advances the timers by `elapsed` and returns the buttons that fire
    /// this frame.
    pub fn update(&mut self, buttons: &Buttons, elapsed: Duration) -> Vec<ControllerButton> {
        let mut fired = Vec::new();
        for (button, pressed) in buttons.iter() {
            let timer = &mut self.timers[button.index()];
            if !pressed {
                *timer = RepeatTimer::default();
                continue;
            }
            timer.remaining = timer.remaining.saturating_sub(elapsed);
            if timer.remaining.is_zero() {
                fired.push(button);
                timer.remaining = if timer.repeating { self.timing.interval } else { self.timing.delay };
                timer.repeating = true;
            }
        }
        fired
    }

    /// Forgets every held button.
    pub fn reset(&mut self) {
        self.timers = [RepeatTimer::default(); BUTTON_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(button: ControllerButton) -> Buttons {
        let mut buttons = Buttons::default();
        buttons.set(button, true);
        buttons
    }

    // ==================== Binding Tests ====================

    #[test]
    fn test_default_bindings_are_unbound() {
        let bindings = ButtonBindings::default();
        assert_eq!(bindings.iter().count(), 0);
    }

    #[test]
    fn test_set_binding() {
        let mut bindings = ButtonBindings::default();
        bindings.set(ControllerButton::Pedal, HostCommand::HornPrimary);
        assert_eq!(bindings.get(ControllerButton::Pedal), HostCommand::HornPrimary);
        assert_eq!(bindings.iter().collect::<Vec<_>>(), vec![(ControllerButton::Pedal, HostCommand::HornPrimary)]);
    }

    // ==================== Repeat Tests ====================

    #[test]
    fn test_repeat_schedule() {
        let mut repeater = ButtonRepeater::new(RepeatTiming::default());
        let a = held(ControllerButton::A);
        let step = Duration::from_millis(50);

        let mut fired_at = Vec::new();
        for frame in 0..=16u64 {
            let elapsed = if frame == 0 { Duration::ZERO } else { step };
            if !repeater.update(&a, elapsed).is_empty() {
                fired_at.push(frame * 50);
            }
        }
        assert_eq!(fired_at, vec![0, 500, 600, 700, 800]);
    }

    #[test]
    fn test_release_resets_timer() {
        let mut repeater = ButtonRepeater::new(RepeatTiming::default());
        let a = held(ControllerButton::A);
        assert_eq!(repeater.update(&a, Duration::ZERO).len(), 1);
        assert!(repeater.update(&Buttons::default(), Duration::from_millis(10)).is_empty());
        assert_eq!(repeater.update(&a, Duration::from_millis(10)).len(), 1, "re-press fires at once");
    }

    #[test]
    fn test_custom_timing() {
        let timing = RepeatTiming { delay: Duration::from_millis(200), interval: Duration::from_millis(50) };
        let mut repeater = ButtonRepeater::new(timing);
        let b = held(ControllerButton::B);
        repeater.update(&b, Duration::ZERO);
        assert!(repeater.update(&b, Duration::from_millis(150)).is_empty());
        assert_eq!(repeater.update(&b, Duration::from_millis(50)), vec![ControllerButton::B]);
        assert_eq!(repeater.update(&b, Duration::from_millis(50)), vec![ControllerButton::B]);
    }
}
