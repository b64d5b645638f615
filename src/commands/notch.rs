//! # Notch Conversion
//!
//! Maps controller notches onto the notches of the train being driven.
//! Controllers and trains rarely agree on notch counts, so the tables can
//! either pass notches through (clamped to the train) or scale them.
//!
//! ## Examples
//!
//! ```
//! use dengo_bridge::commands::notch::{MappingOptions, NotchMapper, TrainSpecs};
//! use dengo_bridge::commands::{HostCommand, InputControl};
//! use dengo_bridge::controller::state::BrakeNotch;
//!
//! let train = TrainSpecs { brake_notches: 5, ..Default::default() };
//! let options = MappingOptions { convert_notches: true, ..Default::default() };
//! let mapper = NotchMapper::new(8, 5, &train, &options);
//!
//! // round(5 / 8 * 4) = round(2.5) = 3
//! assert_eq!(
//!     mapper.brake_control(BrakeNotch::Service(4)),
//!     InputControl::new(HostCommand::BrakeAnyNotch, 3)
//! );
//! ```

use serde::{Deserialize, Serialize};

use super::{HostCommand, InputControl};
use crate::controller::state::{BrakeNotch, PowerNotch, ReverserPosition};

/// Brake system of the train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeType {
    #[default]
    ElectromagneticStraightAirBrake,
    ElectricCommandBrake,
    /// Release / Lap / Service only
    AutomaticAirBrake,
}

/// Notch layout of the train, supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSpecs {
    pub power_notches: u8,
    pub brake_notches: u8,
    pub brake_type: BrakeType,
    pub has_hold_brake: bool,
}

impl Default for TrainSpecs {
    fn default() -> Self {
        Self {
            power_notches: 5,
            brake_notches: 8,
            brake_type: BrakeType::default(),
            has_hold_brake: false,
        }
    }
}

/// User options for the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingOptions {
    /// Scale controller notches to the train's range
    pub convert_notches: bool,
    /// Pin the first and last controller notch to the train's first and last
    pub keep_max_min: bool,
    /// Use controller B1 as the hold brake on trains that have one
    pub map_hold_brake: bool,
}

/// Lookup tables from controller notch to host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotchMapper {
    brake: Vec<InputControl>,
    power: Vec<InputControl>,
}

fn scaled(step: f64, slot: usize) -> i32 {
    (step * slot as f64).round() as i32
}

fn any_brake(notch: i32) -> InputControl {
    InputControl::new(HostCommand::BrakeAnyNotch, notch)
}

fn any_power(notch: i32) -> InputControl {
    InputControl::new(HostCommand::PowerAnyNotch, notch)
}

impl NotchMapper {
    /// Builds the tables for a controller with `controller_brake` service
    /// notches and `controller_power` power notches.
    #[must_use]
    pub fn new(
        controller_brake: u8,
        controller_power: u8,
        train: &TrainSpecs,
        options: &MappingOptions,
    ) -> Self {
        Self {
            brake: Self::build_brake(controller_brake, train, options),
            power: Self::build_power(controller_power, train, options),
        }
    }

    fn build_brake(cb: u8, train: &TrainSpecs, options: &MappingOptions) -> Vec<InputControl> {
        let cb = cb as usize;
        let tb = i32::from(train.brake_notches);
        let hold = options.map_hold_brake && train.has_hold_brake;
        let mut table = Vec::with_capacity(cb + 2);

        if train.brake_type == BrakeType::AutomaticAirBrake {
            table.push(any_brake(0));
            for i in 1..=cb {
                table.push(any_brake(if i * 2 <= cb { 1 } else { 2 }));
            }
            table.push(InputControl::new(HostCommand::BrakeEmergency, 0));
            return table;
        }

        table.push(any_brake(0));
        let first = if hold {
            if cb >= 1 {
                table.push(InputControl::new(HostCommand::HoldBrake, 0));
            }
            2
        } else {
            1
        };

        if options.convert_notches {
            let (step, shift) = if hold {
                let span = cb.saturating_sub(1).max(1) as f64;
                (f64::from(tb - 1) / span, 1)
            } else {
                (f64::from(tb) / cb.max(1) as f64, 0)
            };
            for i in first..=cb {
                let mut notch = scaled(step, i - shift);
                if notch == 0 && tb > 0 {
                    notch = 1;
                }
                if options.keep_max_min && i == first {
                    notch = tb.min(1);
                }
                if options.keep_max_min && i == cb {
                    notch = tb;
                }
                table.push(any_brake(notch));
            }
            table.push(InputControl::new(HostCommand::BrakeEmergency, 0));
        } else {
            for i in first..=cb {
                let slot = if hold { i - 1 } else { i };
                table.push(any_brake((slot as i32).min(tb)));
            }
            if tb <= cb as i32 {
                table.push(InputControl::new(HostCommand::BrakeEmergency, 0));
            } else {
                table.push(any_brake(cb as i32 + 1));
            }
        }
        table
    }

    fn build_power(cp: u8, train: &TrainSpecs, options: &MappingOptions) -> Vec<InputControl> {
        let cp = cp as usize;
        let tp = i32::from(train.power_notches);
        let mut table = Vec::with_capacity(cp + 1);
        table.push(any_power(0));

        if options.convert_notches {
            let step = f64::from(tp) / cp.max(1) as f64;
            for i in 1..=cp {
                let mut notch = scaled(step, i);
                if notch == 0 && tp > 0 {
                    notch = 1;
                }
                if options.keep_max_min && i == 1 {
                    notch = tp.min(1);
                }
                if options.keep_max_min && i == cp {
                    notch = tp;
                }
                table.push(any_power(notch));
            }
        } else {
            for i in 1..=cp {
                table.push(any_power((i as i32).min(tp)));
            }
        }
        table
    }

    /// Command for a brake position; positions past the table clamp to its
    /// last entry.
    #[must_use]
    pub fn brake_control(&self, notch: BrakeNotch) -> InputControl {
        let service = self.brake.len().saturating_sub(2) as u8;
        let index = notch.table_index(service).min(self.brake.len().saturating_sub(1));
        self.brake.get(index).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn power_control(&self, notch: PowerNotch) -> InputControl {
        let index = (notch.get() as usize).min(self.power.len().saturating_sub(1));
        self.power.get(index).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn reverser_control(&self, position: ReverserPosition) -> InputControl {
        InputControl::new(HostCommand::ReverserAnyPosition, position.option())
    }

    /// Brake table: released, service notches, emergency
    #[must_use]
    pub fn brake_table(&self) -> &[InputControl] {
        &self.brake
    }

    /// Power table: neutral, then each notch
    #[must_use]
    pub fn power_table(&self) -> &[InputControl] {
        &self.power
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(convert: bool, keep: bool, hold: bool) -> MappingOptions {
        MappingOptions { convert_notches: convert, keep_max_min: keep, map_hold_brake: hold }
    }

    fn train(brake: u8, power: u8) -> TrainSpecs {
        TrainSpecs { brake_notches: brake, power_notches: power, ..Default::default() }
    }

    fn options_of(table: &[InputControl]) -> Vec<i32> {
        table.iter().map(|c| c.option).collect()
    }

    // ==================== Unconverted Tests ====================

    #[test]
    fn test_unconverted_clamps_to_train() {
        let mapper = NotchMapper::new(8, 5, &train(5, 4), &options(false, false, false));
        assert_eq!(options_of(&mapper.brake_table()[..9]), vec![0, 1, 2, 3, 4, 5, 5, 5, 5]);
        assert_eq!(mapper.brake_control(BrakeNotch::Emergency).command, HostCommand::BrakeEmergency);
        assert_eq!(options_of(mapper.power_table()), vec![0, 1, 2, 3, 4, 4]);
    }

    #[test]
    fn test_unconverted_emergency_on_bigger_train() {
        let mapper = NotchMapper::new(8, 5, &train(10, 5), &options(false, false, false));
        assert_eq!(mapper.brake_control(BrakeNotch::Emergency), any_brake(9));
    }

    #[test]
    fn test_unconverted_hold_brake_shifts() {
        let mut specs = train(8, 5);
        specs.has_hold_brake = true;
        let mapper = NotchMapper::new(8, 5, &specs, &options(false, false, true));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(1)).command, HostCommand::HoldBrake);
        assert_eq!(mapper.brake_control(BrakeNotch::Service(2)), any_brake(1));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(8)), any_brake(7));
    }

    #[test]
    fn test_hold_brake_needs_train_support() {
        let mapper = NotchMapper::new(8, 5, &train(8, 5), &options(false, false, true));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(1)), any_brake(1));
    }

    // ==================== Converted Tests ====================

    #[test]
    fn test_converted_scenario() {
        let mapper = NotchMapper::new(8, 5, &train(5, 5), &options(true, false, false));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(4)), any_brake(3));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(8)), any_brake(5));

        let keep = NotchMapper::new(8, 5, &train(5, 5), &options(true, true, false));
        assert_eq!(keep.brake_control(BrakeNotch::Service(8)), any_brake(5));
        assert_eq!(keep.brake_control(BrakeNotch::Service(1)), any_brake(1));
    }

    #[test]
    fn test_converted_zero_becomes_one() {
        // 2 / 8 * 1 = 0.25 rounds to 0 but B1 must still brake
        let mapper = NotchMapper::new(8, 5, &train(2, 5), &options(true, false, false));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(1)), any_brake(1));
    }

    #[test]
    fn test_converted_power_scales_up() {
        let mapper = NotchMapper::new(8, 5, &train(8, 13), &options(true, false, false));
        assert_eq!(options_of(mapper.power_table()), vec![0, 3, 5, 8, 10, 13]);
    }

    #[test]
    fn test_converted_hold_brake() {
        let mut specs = train(7, 5);
        specs.has_hold_brake = true;
        let mapper = NotchMapper::new(8, 5, &specs, &options(true, true, true));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(1)).command, HostCommand::HoldBrake);
        assert_eq!(mapper.brake_control(BrakeNotch::Service(2)), any_brake(1));
        assert_eq!(mapper.brake_control(BrakeNotch::Service(8)), any_brake(7));
        assert_eq!(mapper.brake_control(BrakeNotch::Emergency).command, HostCommand::BrakeEmergency);
    }

    #[test]
    fn test_keep_max_min_boundaries_all_pairs() {
        for controller in 1..=16u8 {
            for train_notches in 1..=16u8 {
                let specs = train(train_notches, train_notches);
                let mapper = NotchMapper::new(controller, controller, &specs, &options(true, true, false));

                let top = i32::from(train_notches);
                let brake = mapper.brake_table();
                let power = mapper.power_table();
                assert_eq!(brake[controller as usize].option, top, "brake top {}->{}", controller, train_notches);
                assert_eq!(power[controller as usize].option, top, "power top {}->{}", controller, train_notches);
                if controller > 1 {
                    assert_eq!(brake[1].option, 1, "brake first {}->{}", controller, train_notches);
                    assert_eq!(power[1].option, 1, "power first {}->{}", controller, train_notches);
                }
            }
        }
    }

    #[test]
    fn test_zero_notch_controller() {
        let mapper = NotchMapper::new(0, 4, &train(8, 5), &options(true, true, false));
        assert_eq!(mapper.brake_table().len(), 2);
        assert_eq!(mapper.brake_control(BrakeNotch::Service(3)).command, HostCommand::BrakeEmergency);
    }

    // ==================== Air Brake Tests ====================

    #[test]
    fn test_automatic_air_brake_collapse() {
        let specs = TrainSpecs { brake_type: BrakeType::AutomaticAirBrake, ..Default::default() };
        let mapper = NotchMapper::new(8, 5, &specs, &options(true, true, false));
        assert_eq!(options_of(&mapper.brake_table()[..9]), vec![0, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(mapper.brake_control(BrakeNotch::Emergency).command, HostCommand::BrakeEmergency);
    }

    // ==================== Reverser Tests ====================

    #[test]
    fn test_reverser_options() {
        let mapper = NotchMapper::new(8, 5, &TrainSpecs::default(), &MappingOptions::default());
        assert_eq!(mapper.reverser_control(ReverserPosition::Forward).option, 1);
        assert_eq!(mapper.reverser_control(ReverserPosition::Neutral).option, 0);
        assert_eq!(mapper.reverser_control(ReverserPosition::Backward).option, -1);
    }
}
