//! # Configuration Module
//!
//! Handles loading, validating and saving configuration as TOML.
//!
//! Every section and field is optional; a missing file section falls back to
//! its defaults. Calibration writes the discovered raw indices back into
//! `[classic]` through [`Config::save`].

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commands::buttons::{ButtonBindings, RepeatTiming};
use crate::commands::notch::{MappingOptions, TrainSpecs};
use crate::commands::HostCommand;
use crate::controller::classic::{ClassicMapping, PowerSource};
use crate::controller::state::{ControllerButton, MAX_BRAKE_NOTCHES, MAX_POWER_NOTCHES};
use crate::error::{DengoError, Result};
use crate::usb::poller::PollerConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub train: TrainSpecs,

    #[serde(default)]
    pub handles: MappingOptions,

    /// Host command per canonical button, keyed by button name
    #[serde(default)]
    pub buttons: BTreeMap<String, HostCommand>,

    #[serde(default)]
    pub repeat: RepeatConfig,

    #[serde(default)]
    pub classic: ClassicMapping,

    #[serde(default)]
    pub usb: UsbConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GeneralConfig {
    /// Stable identifier of the controller to drive
    #[serde(default)]
    pub controller: Option<String>,

    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,
}

/// Key repeat configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RepeatConfig {
    #[serde(default = "default_repeat_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_repeat_interval_ms")]
    pub interval_ms: u64,
}

/// Raw USB configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UsbConfig {
    #[serde(default = "default_usb_enabled")]
    pub enabled: bool,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
}

/// Calibration wizard configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    #[serde(default = "default_step_timeout_s")]
    pub step_timeout_s: u64,
}

/// Log file configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LoggingConfig {
    /// Directory for daily log files, console only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_frame_rate_hz() -> u32 { 60 }

fn default_repeat_delay_ms() -> u64 { 500 }
fn default_repeat_interval_ms() -> u64 { 100 }

fn default_usb_enabled() -> bool { true }
fn default_read_timeout_ms() -> u64 { 10 }
fn default_discovery_interval_ms() -> u64 { 1000 }

fn default_step_timeout_s() -> u64 { 30 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { controller: None, frame_rate_hz: default_frame_rate_hz() }
    }
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self { delay_ms: default_repeat_delay_ms(), interval_ms: default_repeat_interval_ms() }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            enabled: default_usb_enabled(),
            read_timeout_ms: default_read_timeout_ms(),
            discovery_interval_ms: default_discovery_interval_ms(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { step_timeout_s: default_step_timeout_s() }
    }
}

fn invalid(message: impl std::fmt::Display) -> DengoError {
    DengoError::Config(toml::de::Error::custom(message))
}

fn button_by_key(key: &str) -> Option<ControllerButton> {
    ControllerButton::ALL.into_iter().find(|b| b.key() == key)
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dengo_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a TOML file, replacing it.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, cannot be serialized
    /// or the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.general.frame_rate_hz == 0 || self.general.frame_rate_hz > 1000 {
            return Err(invalid("frame_rate_hz must be between 1 and 1000"));
        }

        if matches!(&self.general.controller, Some(guid) if guid.trim().is_empty()) {
            return Err(invalid("controller cannot be empty; omit it to select none"));
        }

        if self.train.brake_notches > MAX_BRAKE_NOTCHES * 2 || self.train.power_notches > MAX_POWER_NOTCHES * 2 {
            return Err(invalid(format!(
                "train notches must be at most {} brake and {} power",
                MAX_BRAKE_NOTCHES * 2,
                MAX_POWER_NOTCHES * 2
            )));
        }

        for key in self.buttons.keys() {
            if button_by_key(key).is_none() {
                return Err(invalid(format!("unknown button '{}' in [buttons]", key)));
            }
        }

        if self.repeat.delay_ms == 0 || self.repeat.delay_ms > 10000 {
            return Err(invalid("repeat delay_ms must be between 1 and 10000"));
        }

        if self.repeat.interval_ms == 0 || self.repeat.interval_ms > 10000 {
            return Err(invalid("repeat interval_ms must be between 1 and 10000"));
        }

        // Raw indices must be distinct, otherwise one input drives two notches
        let mut seen: Vec<(&str, usize)> = Vec::new();
        for (name, index) in self.classic_indices() {
            if let Some(&(other, _)) = seen.iter().find(|(_, i)| *i == index) {
                return Err(invalid(format!("classic {} and {} share raw index {}", other, name, index)));
            }
            seen.push((name, index));
        }

        if self.usb.read_timeout_ms == 0 || self.usb.read_timeout_ms > 1000 {
            return Err(invalid("read_timeout_ms must be between 1 and 1000"));
        }

        if self.usb.discovery_interval_ms < 100 || self.usb.discovery_interval_ms > 60000 {
            return Err(invalid("discovery_interval_ms must be between 100 and 60000"));
        }

        if self.calibration.step_timeout_s == 0 || self.calibration.step_timeout_s > 600 {
            return Err(invalid("step_timeout_s must be between 1 and 600"));
        }

        if matches!(&self.logging.dir, Some(dir) if dir.as_os_str().is_empty()) {
            return Err(invalid("logging dir cannot be empty; omit it to log to the console only"));
        }

        Ok(())
    }

    fn classic_indices(&self) -> Vec<(&'static str, usize)> {
        let c = &self.classic;
        let mut named = vec![
            ("select", c.select),
            ("start", c.start),
            ("a", c.a),
            ("b", c.b),
            ("c", c.c),
            ("power1", c.power1),
            ("brake1", c.brake1),
            ("brake2", c.brake2),
            ("brake3", c.brake3),
            ("brake4", c.brake4),
        ];
        if c.power_source == PowerSource::Buttons {
            named.push(("power2", c.power2));
            named.push(("power3", c.power3));
        }
        named.into_iter().filter_map(|(name, index)| index.map(|i| (name, i))).collect()
    }

    /// Button bindings with unknown keys skipped
    #[must_use]
    pub fn button_bindings(&self) -> ButtonBindings {
        let mut bindings = ButtonBindings::default();
        for (key, command) in &self.buttons {
            if let Some(button) = button_by_key(key) {
                bindings.set(button, *command);
            }
        }
        bindings
    }

    /// Replaces `[buttons]` with the bound entries of `bindings`.
    pub fn set_button_bindings(&mut self, bindings: &ButtonBindings) {
        self.buttons = bindings.iter().map(|(b, command)| (b.key().to_string(), command)).collect();
    }

    #[must_use]
    pub fn repeat_timing(&self) -> RepeatTiming {
        RepeatTiming {
            delay: Duration::from_millis(self.repeat.delay_ms),
            interval: Duration::from_millis(self.repeat.interval_ms),
        }
    }

    #[must_use]
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            read_timeout: Duration::from_millis(self.usb.read_timeout_ms),
            discovery_interval: Duration::from_millis(self.usb.discovery_interval_ms),
            ..PollerConfig::default()
        }
    }

    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.calibration.step_timeout_s)
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.general.frame_rate_hz.max(1)
    }
}
