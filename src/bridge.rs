//! # Input Bridge
//!
//! Host-facing facade. The host calls [`InputBridge::update`] once per
//! frame; everything else (controller discovery, the active selection,
//! calibration, train data for the controller displays) goes through the
//! other methods between frames.
//!
//! Joystick-style controllers are read synchronously inside `update`.
//! USB controllers are read by the [`UsbPoller`] thread; `update` only
//! picks up its latest report.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::commands::buttons::{ButtonBindings, RepeatTiming};
use crate::commands::notch::{MappingOptions, NotchMapper, TrainSpecs};
use crate::commands::{CommandEvent, CommandTranslator};
use crate::config::Config;
use crate::controller::calibration::{CalibrationProgress, CalibrationSession, Prompt, DEFAULT_STEP_TIMEOUT};
use crate::controller::classic::ClassicMapping;
use crate::controller::decoder::{Decoder, RawInput};
use crate::controller::display::TrainStatus;
use crate::controller::registry::{ControllerDescriptor, ControllerRegistry, ControllerSource, ControllerSummary};
use crate::controller::state::{CanonicalState, DecodedInput, InputEvent, StateBuffer};
use crate::error::{DengoError, Result};
use crate::joystick::{JoystickSnapshot, JoystickSource};
use crate::notify::Notifier;
use crate::usb::poller::UsbPoller;

/// Everything the bridge needs from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub train: TrainSpecs,
    pub options: MappingOptions,
    pub bindings: ButtonBindings,
    pub repeat: RepeatTiming,
    /// Saved assignments for the preferred classic controller
    pub classic: ClassicMapping,
    /// Controller to activate as soon as it shows up
    pub preferred: Option<String>,
    pub step_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            train: TrainSpecs::default(),
            options: MappingOptions::default(),
            bindings: ButtonBindings::default(),
            repeat: RepeatTiming::default(),
            classic: ClassicMapping::default(),
            preferred: None,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl BridgeSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            train: config.train,
            options: config.handles,
            bindings: config.button_bindings(),
            repeat: config.repeat_timing(),
            classic: config.classic,
            preferred: config.general.controller.clone(),
            step_timeout: config.step_timeout(),
        }
    }
}

/// Result of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameUpdate {
    /// Canonical state after this frame
    pub state: CanonicalState,
    /// Edge transitions since the previous frame
    pub events: Vec<InputEvent>,
    /// Commands for the host, key-ups first
    pub commands: Vec<CommandEvent>,
}

/// Controller input subsystem.
pub struct InputBridge {
    joysticks: Box<dyn JoystickSource>,
    usb: Option<UsbPoller>,
    registry: ControllerRegistry,
    active: Option<String>,
    state: StateBuffer,
    translator: CommandTranslator,
    settings: BridgeSettings,
    status: TrainStatus,
    calibration: Option<CalibrationSession>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for InputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBridge")
            .field("active", &self.active)
            .field("controllers", &self.registry.len())
            .field("calibrating", &self.calibration.is_some())
            .finish_non_exhaustive()
    }
}

fn mapper_for(decoder: &Decoder, settings: &BridgeSettings) -> NotchMapper {
    NotchMapper::new(decoder.brake_notches(), decoder.power_notches(), &settings.train, &settings.options)
}

impl InputBridge {
    /// Creates the bridge. `usb` is `None` when raw USB support is off.
    #[must_use]
    pub fn new(
        settings: BridgeSettings,
        joysticks: Box<dyn JoystickSource>,
        usb: Option<UsbPoller>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let translator = CommandTranslator::new(
            NotchMapper::new(0, 0, &settings.train, &settings.options),
            settings.bindings,
            settings.repeat,
        );
        Self {
            joysticks,
            usb,
            registry: ControllerRegistry::new(),
            active: None,
            state: StateBuffer::new(),
            translator,
            settings,
            status: TrainStatus::default(),
            calibration: None,
            notifier,
        }
    }

    /// Re-enumerates joysticks and picks up the poller's USB device list.
    /// Activates the preferred controller once it appears.
    pub fn refresh_controllers(&mut self) {
        let joysticks = self.joysticks.refresh();
        self.registry.sync_joysticks(&joysticks);
        if let Some(usb) = &self.usb {
            self.registry.sync_usb(&usb.devices());
        }

        let Some(preferred) = self.settings.preferred.clone() else {
            return;
        };
        if let Some(descriptor) = self.registry.get_mut(&preferred) {
            if descriptor.calibration_required() && self.settings.classic.is_calibrated() {
                debug!("Applying saved calibration to {}", preferred);
                descriptor.decoder.set_classic_mapping(self.settings.classic);
            }
            if descriptor.connected && self.active.is_none() {
                if let Err(e) = self.set_active(Some(&preferred)) {
                    warn!("Failed to activate {}: {}", preferred, e);
                }
            }
        }
    }

    /// Every controller seen so far, connected or cached.
    #[must_use]
    pub fn controllers(&self) -> Vec<ControllerSummary> {
        self.registry.list()
    }

    #[must_use]
    pub fn active(&self) -> Option<&ControllerDescriptor> {
        self.active.as_deref().and_then(|guid| self.registry.get(guid))
    }

    /// Selects the controller to drive, or `None` for no controller.
    ///
    /// # Errors
    ///
    /// Returns [`DengoError::ControllerNotFound`] for an unknown guid, or
    /// [`DengoError::Transport`] for a USB controller while USB support is
    /// off.
    pub fn set_active(&mut self, guid: Option<&str>) -> Result<()> {
        self.calibration = None;
        self.state.reset();

        let Some(guid) = guid else {
            if let Some(usb) = &self.usb {
                usb.set_active(None);
            }
            self.active = None;
            info!("No active controller");
            return Ok(());
        };

        let descriptor = self
            .registry
            .get(guid)
            .ok_or_else(|| DengoError::ControllerNotFound(guid.to_string()))?;

        match (&descriptor.source, &self.usb) {
            (ControllerSource::Usb(info), Some(usb)) => {
                usb.set_output(descriptor.decoder.output_report(&self.status));
                usb.set_active(descriptor.decoder.usb_profile(info));
            }
            (ControllerSource::Usb(_), None) => {
                return Err(DengoError::Transport("USB support is disabled".to_string()));
            }
            (ControllerSource::Joystick { .. }, usb) => {
                if let Some(usb) = usb {
                    usb.set_active(None);
                }
            }
        }

        self.translator
            .reconfigure(mapper_for(&descriptor.decoder, &self.settings), descriptor.decoder.has_reverser());
        info!("Active controller: {} [{}]", descriptor.name, descriptor.decoder.name());
        self.active = Some(guid.to_string());
        Ok(())
    }

    fn rebuild_mapper(&mut self) {
        if let Some(descriptor) = self.active.as_deref().and_then(|guid| self.registry.get(guid)) {
            self.translator
                .reconfigure(mapper_for(&descriptor.decoder, &self.settings), descriptor.decoder.has_reverser());
        }
    }

    /// New train: rebuilds the notch tables.
    pub fn set_train_specs(&mut self, train: TrainSpecs) {
        self.settings.train = train;
        self.rebuild_mapper();
    }

    pub fn set_mapping_options(&mut self, options: MappingOptions) {
        self.settings.options = options;
        self.rebuild_mapper();
    }

    pub fn set_bindings(&mut self, bindings: ButtonBindings) {
        self.settings.bindings = bindings;
        self.translator.set_bindings(bindings);
    }

    pub fn set_repeat_timing(&mut self, timing: RepeatTiming) {
        self.settings.repeat = timing;
        self.translator.set_timing(timing);
    }

    /// Train data for USB controllers with lamps or displays.
    pub fn set_train_status(&mut self, status: TrainStatus) {
        self.status = status;
        if let (Some(usb), Some(descriptor)) = (&self.usb, self.active.as_deref().and_then(|g| self.registry.get(g))) {
            usb.set_output(descriptor.decoder.output_report(&status));
        }
    }

    /// True once the USB layer stopped after a hardware fault
    #[must_use]
    pub fn usb_degraded(&self) -> bool {
        self.usb.as_ref().is_some_and(UsbPoller::is_degraded)
    }

    fn joystick_snapshot(&mut self, guid: &str) -> Option<JoystickSnapshot> {
        let descriptor = self.registry.get(guid)?;
        match descriptor.source {
            ControllerSource::Joystick { slot } if descriptor.connected => self.joysticks.snapshot(slot),
            _ => None,
        }
    }

    fn read_active(&mut self, guid: &str) -> DecodedInput {
        let previous = *self.state.current();
        let Some(descriptor) = self.registry.get(guid).filter(|d| d.connected) else {
            return DecodedInput::default();
        };

        match &descriptor.source {
            ControllerSource::Joystick { slot } => {
                match self.joysticks.snapshot(*slot) {
                    Some(snapshot) => descriptor.decoder.decode(RawInput::Joystick(&snapshot), &previous),
                    None => DecodedInput::default(),
                }
            }
            ControllerSource::Usb(_) => {
                let Some(usb) = self.usb.as_ref().filter(|usb| !usb.is_degraded()) else {
                    return DecodedInput::default();
                };
                match usb.latest_report() {
                    Some(report) if report.guid == guid => {
                        descriptor.decoder.decode(RawInput::Usb(&report.data), &previous)
                    }
                    _ => DecodedInput::default(),
                }
            }
        }
    }

    /// Runs one frame: reads the active controller, updates the canonical
    /// state and produces host commands.
    ///
    /// Undecodable readings keep the previous notches. With no raw input
    /// at all (controller gone, USB degraded) every button reads released.
    /// No commands are produced while a calibration runs.
    pub fn update(&mut self, elapsed: Duration) -> FrameUpdate {
        let Some(guid) = self.active.clone() else {
            return FrameUpdate::default();
        };
        if self.calibration.is_some() {
            return FrameUpdate { state: *self.state.current(), ..FrameUpdate::default() };
        }

        let decoded = self.read_active(&guid);
        self.state.update(&decoded);
        let (previous, current) = (*self.state.previous(), *self.state.current());
        FrameUpdate {
            state: current,
            events: self.state.events(),
            commands: self.translator.translate(&previous, &current, elapsed),
        }
    }

    /// Starts calibrating the active classic controller from its current
    /// (idle) state.
    ///
    /// # Errors
    ///
    /// Returns [`DengoError::NoActiveController`], [`DengoError::Calibration`]
    /// for controllers that need no calibration, or
    /// [`DengoError::ControllerNotFound`] if the controller cannot be read.
    pub fn begin_calibration(&mut self) -> Result<Prompt> {
        let guid = self.active.clone().ok_or(DengoError::NoActiveController)?;
        let requires = self.registry.get(&guid).is_some_and(|d| d.decoder.requires_calibration());
        if !requires {
            return Err(DengoError::Calibration("controller does not need calibration".to_string()));
        }
        let snapshot = self
            .joystick_snapshot(&guid)
            .ok_or_else(|| DengoError::ControllerNotFound(guid.clone()))?;

        let session = CalibrationSession::begin(snapshot, self.settings.step_timeout);
        let prompt = session.current_prompt();
        self.calibration = Some(session);
        self.notifier.status(&prompt.to_string());
        Ok(prompt)
    }

    /// Confirms the current prompt with the controller's present state.
    ///
    /// When the last prompt is confirmed the discovered assignments are
    /// installed on the controller.
    ///
    /// # Errors
    ///
    /// Returns [`DengoError::Calibration`] without a running session,
    /// [`DengoError::CalibrationTimeout`] if the prompt expired (the session
    /// is then cancelled), or [`DengoError::ControllerNotFound`] if the
    /// controller vanished.
    pub fn calibration_step(&mut self) -> Result<CalibrationProgress> {
        let guid = self.active.clone().ok_or(DengoError::NoActiveController)?;
        if self.calibration.is_none() {
            return Err(DengoError::Calibration("no calibration in progress".to_string()));
        }
        let snapshot = self
            .joystick_snapshot(&guid)
            .ok_or_else(|| DengoError::ControllerNotFound(guid.clone()))?;

        let Some(session) = self.calibration.as_mut() else {
            return Err(DengoError::Calibration("no calibration in progress".to_string()));
        };
        let progress = match session.next_step(snapshot) {
            Ok(progress) => progress,
            Err(e) => {
                if matches!(e, DengoError::CalibrationTimeout) {
                    self.calibration = None;
                    self.notifier.error("Calibration timed out");
                }
                return Err(e);
            }
        };

        if session.is_done() {
            if let Some(session) = self.calibration.take() {
                let result = session.finish()?;
                for step in &result.unassigned {
                    warn!("Calibration found no input for {:?}", step);
                }
                if let Some(descriptor) = self.registry.get_mut(&guid) {
                    descriptor.decoder.set_classic_mapping(result.mapping);
                }
                self.settings.classic = result.mapping;
                self.state.reset();
                self.translator.reset();
            }
        }
        self.notifier.status(&progress.next.to_string());
        Ok(progress)
    }

    /// Abandons a running calibration; the controller keeps its previous
    /// assignments.
    pub fn cancel_calibration(&mut self) {
        if self.calibration.take().is_some() {
            info!("Calibration cancelled");
        }
    }

    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// Writes the active selection, calibration and mapping options into
    /// `config`.
    pub fn export_config(&self, config: &mut Config) {
        if let Some(guid) = &self.active {
            config.general.controller = Some(guid.clone());
            if let Some(mapping) = self.registry.get(guid).and_then(|d| d.decoder.classic_mapping()) {
                config.classic = *mapping;
            }
        }
        config.train = self.settings.train;
        config.handles = self.settings.options;
        config.set_button_bindings(&self.settings.bindings);
        config.repeat.delay_ms = u64::try_from(self.settings.repeat.delay.as_millis()).unwrap_or(u64::MAX);
        config.repeat.interval_ms = u64::try_from(self.settings.repeat.interval.as_millis()).unwrap_or(u64::MAX);
    }

    /// Stops the USB thread, unloading the open device.
    pub fn shutdown(&mut self) {
        if let Some(usb) = self.usb.as_mut() {
            usb.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::notch::BrakeType;
    use crate::commands::{HostCommand, InputControl};
    use crate::controller::calibration::CalibrationStep;
    use crate::controller::state::{BrakeNotch, ControllerButton, PowerNotch};
    use crate::joystick::mocks::{joystick_info, MockJoystickSource};
    use crate::joystick::HatPosition;
    use crate::notify::MockNotifier;
    use crate::usb::poller::PollerConfig;
    use crate::usb::port_trait::mocks::{MockUsbTransport, UsbCall};
    use crate::usb::UsbDeviceInfo;
    use std::thread;
    use std::time::Instant;

    const FRAME: Duration = Duration::from_millis(16);

    fn quiet_notifier() -> Arc<dyn Notifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_error().never();
        notifier.expect_status().returning(|_| ());
        Arc::new(notifier)
    }

    fn adapter() -> crate::joystick::JoystickInfo {
        joystick_info(0x0079, 0x0006, "Adapter", 14, 2, 1)
    }

    fn snapshot(pressed: &[usize]) -> JoystickSnapshot {
        let mut buttons = vec![false; 14];
        for &i in pressed {
            buttons[i] = true;
        }
        JoystickSnapshot { buttons, axes: vec![0.0; 2], hats: vec![HatPosition::Centered] }
    }

    fn calibrated() -> ClassicMapping {
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
            ..Default::default()
        }
    }

    fn joystick_bridge(settings: BridgeSettings) -> (InputBridge, MockJoystickSource) {
        let source = MockJoystickSource::new();
        let bridge = InputBridge::new(settings, Box::new(source.clone()), None, quiet_notifier());
        (bridge, source)
    }

    fn type2() -> UsbDeviceInfo {
        UsbDeviceInfo {
            vendor: 0x0ae4,
            product: 0x0004,
            revision: 0x0102,
            path: "mock-type2".to_string(),
            name: String::new(),
            serial: None,
        }
    }

    fn fast() -> PollerConfig {
        PollerConfig {
            read_timeout: Duration::from_millis(1),
            discovery_interval: Duration::from_millis(5),
            idle_sleep: Duration::from_millis(1),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    // ==================== Selection Tests ====================

    #[test]
    fn test_no_active_controller_is_idle() {
        let (mut bridge, _) = joystick_bridge(BridgeSettings::default());
        assert_eq!(bridge.update(FRAME), FrameUpdate::default());
    }

    #[test]
    fn test_unknown_controller_rejected() {
        let (mut bridge, _) = joystick_bridge(BridgeSettings::default());
        assert!(matches!(bridge.set_active(Some("nope")), Err(DengoError::ControllerNotFound(_))));
    }

    #[test]
    fn test_preferred_controller_activates_with_saved_mapping() {
        let settings = BridgeSettings {
            preferred: Some(adapter().guid),
            classic: calibrated(),
            ..Default::default()
        };
        let (mut bridge, source) = joystick_bridge(settings);
        source.attach(adapter(), snapshot(&[4, 5, 6, 1, 2]));
        bridge.refresh_controllers();

        let active = bridge.active().unwrap();
        assert_eq!(active.identity.guid, adapter().guid);
        assert!(!active.calibration_required());
        assert_eq!(bridge.controllers().len(), 1);
    }

    #[test]
    fn test_usb_controller_needs_usb_support() {
        let (mut bridge, _) = joystick_bridge(BridgeSettings::default());
        // USB devices only reach the registry through the poller
        assert!(bridge.registry.is_empty());
        bridge.registry.sync_usb(&[type2()]);
        assert!(matches!(bridge.set_active(Some(&type2().guid())), Err(DengoError::Transport(_))));
    }

    // ==================== Frame Tests ====================

    #[test]
    fn test_classic_frame_produces_commands() {
        let settings = BridgeSettings { classic: calibrated(), preferred: Some(adapter().guid), ..Default::default() };
        let (mut bridge, source) = joystick_bridge(settings);
        // Released brake (B2+B3+B4) and neutral power (P2+P3)
        source.attach(adapter(), snapshot(&[4, 5, 6, 1, 2]));
        bridge.refresh_controllers();

        let first = bridge.update(Duration::ZERO);
        assert_eq!(first.state.brake, BrakeNotch::Released);
        assert_eq!(first.state.power, PowerNotch::NEUTRAL);
        assert!(first.commands.contains(&CommandEvent::Down(InputControl::new(HostCommand::BrakeAnyNotch, 0))));

        // B6 (B4 only), P2 (P3 only), Select held
        source.set_snapshot(0, snapshot(&[6, 2, 8]));
        let frame = bridge.update(FRAME);
        assert_eq!(frame.state.brake, BrakeNotch::Service(6));
        assert_eq!(frame.state.power, PowerNotch::new(2));
        assert!(frame.state.buttons.is_pressed(ControllerButton::Select));
        assert!(frame.events.contains(&InputEvent::ButtonPressed(ControllerButton::Select)));
        assert!(frame.commands.contains(&CommandEvent::Down(InputControl::new(HostCommand::BrakeAnyNotch, 6))));
        assert!(frame.commands.contains(&CommandEvent::Down(InputControl::new(HostCommand::PowerAnyNotch, 2))));

        let same = bridge.update(FRAME);
        assert!(same.events.is_empty(), "identical input yields no edges");
    }

    #[test]
    fn test_disconnected_controller_releases_buttons() {
        let settings = BridgeSettings { classic: calibrated(), preferred: Some(adapter().guid), ..Default::default() };
        let (mut bridge, source) = joystick_bridge(settings);
        source.attach(adapter(), snapshot(&[6, 2, 8]));
        bridge.refresh_controllers();
        bridge.update(FRAME);

        source.detach_all();
        bridge.refresh_controllers();
        let frame = bridge.update(FRAME);
        assert_eq!(frame.state.brake, BrakeNotch::Service(6), "notches are retained");
        assert!(!frame.state.buttons.is_pressed(ControllerButton::Select));
        assert!(!bridge.controllers()[0].connected);
    }

    #[test]
    fn test_train_change_rebuilds_tables() {
        let settings = BridgeSettings { classic: calibrated(), preferred: Some(adapter().guid), ..Default::default() };
        let (mut bridge, source) = joystick_bridge(settings);
        source.attach(adapter(), snapshot(&[6, 2]));
        bridge.refresh_controllers();
        bridge.update(FRAME);

        bridge.set_train_specs(TrainSpecs { brake_type: BrakeType::AutomaticAirBrake, ..Default::default() });
        bridge.set_mapping_options(MappingOptions { convert_notches: true, ..Default::default() });
        let frame = bridge.update(FRAME);
        // B6 of 8 sits in the upper half: Service
        assert!(frame.commands.contains(&CommandEvent::Down(InputControl::new(HostCommand::BrakeAnyNotch, 2))));
    }

    // ==================== Calibration Tests ====================

    #[test]
    fn test_calibration_discovers_mapping() {
        let (mut bridge, source) = joystick_bridge(BridgeSettings::default());
        source.attach(adapter(), snapshot(&[]));
        bridge.refresh_controllers();
        bridge.set_active(Some(&adapter().guid)).unwrap();
        assert!(bridge.active().unwrap().calibration_required());

        assert_eq!(bridge.begin_calibration().unwrap(), Prompt::PressButton(ControllerButton::Select));
        assert!(bridge.update(FRAME).commands.is_empty());

        let steps: [&[usize]; 15] = [
            &[8],
            &[9],
            &[10],
            &[11],
            &[12],
            &[],
            &[6],
            &[3, 6],
            &[4, 6],
            &[4, 5],
            &[0, 4, 5, 6],
            &[1, 2, 4, 5, 6],
            &[2, 4, 5, 6],
            &[0, 2, 4, 5, 6],
            &[0, 4, 5, 6],
        ];
        let mut last = None;
        for pressed in steps {
            source.set_snapshot(0, snapshot(pressed));
            last = Some(bridge.calibration_step().unwrap());
        }

        let last = last.unwrap();
        assert_eq!(last.step, CalibrationStep::PowerP5);
        assert_eq!(last.next, Prompt::Done);
        assert!(!bridge.is_calibrating());

        let mapping = *bridge.active().unwrap().decoder.classic_mapping().unwrap();
        assert_eq!(mapping, calibrated());

        let mut config = Config::default();
        bridge.export_config(&mut config);
        assert_eq!(config.classic, calibrated());
        assert_eq!(config.general.controller, Some(adapter().guid));
    }

    #[test]
    fn test_calibration_needs_classic_controller() {
        let (mut bridge, _) = joystick_bridge(BridgeSettings::default());
        assert!(matches!(bridge.begin_calibration(), Err(DengoError::NoActiveController)));
        assert!(matches!(bridge.calibration_step(), Err(DengoError::NoActiveController)));
    }

    #[test]
    fn test_calibration_timeout_cancels() {
        let mut notifier = MockNotifier::new();
        notifier.expect_status().returning(|_| ());
        notifier.expect_error().times(1).returning(|_| ());
        let source = MockJoystickSource::new();
        let settings = BridgeSettings { step_timeout: Duration::ZERO, ..Default::default() };
        let mut bridge = InputBridge::new(settings, Box::new(source.clone()), None, Arc::new(notifier));

        source.attach(adapter(), snapshot(&[]));
        bridge.refresh_controllers();
        bridge.set_active(Some(&adapter().guid)).unwrap();
        bridge.begin_calibration().unwrap();

        assert!(matches!(bridge.calibration_step(), Err(DengoError::CalibrationTimeout)));
        assert!(!bridge.is_calibrating());
        assert!(bridge.active().unwrap().calibration_required());
    }

    #[test]
    fn test_cancel_keeps_previous_mapping() {
        let settings = BridgeSettings { classic: calibrated(), preferred: Some(adapter().guid), ..Default::default() };
        let (mut bridge, source) = joystick_bridge(settings);
        source.attach(adapter(), snapshot(&[]));
        bridge.refresh_controllers();

        bridge.begin_calibration().unwrap();
        source.set_snapshot(0, snapshot(&[13]));
        bridge.calibration_step().unwrap();
        bridge.cancel_calibration();

        assert!(!bridge.is_calibrating());
        assert_eq!(bridge.active().unwrap().decoder.classic_mapping(), Some(&calibrated()));
    }

    // ==================== USB Tests ====================

    #[test]
    fn test_usb_controller_end_to_end() {
        let transport = MockUsbTransport::new();
        transport.attach(type2());
        // Brake B1, power P5
        transport.push_read(vec![0x01, 0x8A, 0x00, 0xFF, 0x08, 0x00]);

        let poller = UsbPoller::spawn(transport.clone(), Decoder::supported_usb_devices(), quiet_notifier(), fast()).unwrap();
        let settings = BridgeSettings { preferred: Some(type2().guid()), ..Default::default() };
        let mut bridge = InputBridge::new(settings, Box::new(MockJoystickSource::new()), Some(poller), quiet_notifier());

        assert!(wait_for(|| {
            bridge.refresh_controllers();
            bridge.active().is_some()
        }));
        assert!(wait_for(|| bridge.update(FRAME).state.brake == BrakeNotch::Service(1)));
        assert_eq!(bridge.update(FRAME).state.power, PowerNotch::new(5));

        bridge.set_train_status(TrainStatus { in_game: true, doors_closed: true, ..Default::default() });
        bridge.shutdown();

        let calls = transport.get_calls();
        assert_eq!(calls.last(), Some(&UsbCall::Close("mock-type2".to_string())));
        assert!(!bridge.usb_degraded());
    }

    #[test]
    fn test_usb_replug_on_another_port_keeps_selection() {
        let transport = MockUsbTransport::new();
        transport.attach(type2());
        // Brake B1, power N
        transport.push_read(vec![0x01, 0x8A, 0x81, 0xFF, 0x08, 0x00]);

        let poller = UsbPoller::spawn(transport.clone(), Decoder::supported_usb_devices(), quiet_notifier(), fast()).unwrap();
        let settings = BridgeSettings { preferred: Some(type2().guid()), ..Default::default() };
        let mut bridge = InputBridge::new(settings, Box::new(MockJoystickSource::new()), Some(poller), quiet_notifier());

        assert!(wait_for(|| {
            bridge.refresh_controllers();
            bridge.active().is_some()
        }));
        assert!(wait_for(|| bridge.update(FRAME).state.brake == BrakeNotch::Service(1)));

        transport.detach_all();
        assert!(wait_for(|| {
            bridge.refresh_controllers();
            bridge.active().is_some_and(|d| !d.connected)
        }));
        assert_eq!(bridge.update(FRAME).state.brake, BrakeNotch::Service(1), "notches held while unplugged");

        let mut moved = type2();
        moved.path = "mock-type2-port4".to_string();
        transport.attach(moved.clone());
        // Brake B2
        transport.push_read(vec![0x01, 0x94, 0x81, 0xFF, 0x08, 0x00]);

        assert!(wait_for(|| {
            bridge.refresh_controllers();
            bridge.active().is_some_and(|d| d.connected)
        }));
        assert_eq!(bridge.controllers().len(), 1);
        assert_eq!(bridge.active().map(|d| d.identity.guid.clone()), Some(type2().guid()));
        assert!(wait_for(|| bridge.update(FRAME).state.brake == BrakeNotch::Service(2)));
        assert!(transport.get_calls().contains(&UsbCall::Open(moved.path)));

        bridge.shutdown();
        assert!(!bridge.usb_degraded());
    }

    #[test]
    fn test_export_saturates_huge_repeat_timing() {
        let (mut bridge, _source) = joystick_bridge(BridgeSettings::default());
        bridge.set_repeat_timing(RepeatTiming { delay: Duration::MAX, interval: Duration::from_millis(120) });

        let mut config = Config::default();
        bridge.export_config(&mut config);
        assert_eq!(config.repeat.delay_ms, u64::MAX);
        assert_eq!(config.repeat.interval_ms, 120);
    }
}
