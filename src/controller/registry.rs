//! # Controller Registry
//!
//! Every controller ever seen during this run, keyed by its stable
//! identifier. Entries are never removed: an unplugged controller is marked
//! disconnected and keeps its decoder (and so its calibration) until it
//! comes back.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::decoder::Decoder;
use super::state::ButtonSet;
use crate::joystick::JoystickInfo;
use crate::usb::UsbDeviceInfo;

/// Hardware identity of a controller. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerIdentity {
    pub vendor: u16,
    pub product: u16,
    pub revision: u16,
    /// Platform-stable unique identifier
    pub guid: String,
}

/// How the controller is currently reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerSource {
    /// evdev joystick at this slot of the last refresh
    Joystick { slot: usize },
    /// Raw USB device
    Usb(UsbDeviceInfo),
}

/// A connected or cached controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerDescriptor {
    pub identity: ControllerIdentity,
    pub name: String,
    pub connected: bool,
    pub source: ControllerSource,
    pub decoder: Decoder,
}

impl ControllerDescriptor {
    /// True while a classic controller has no usable handle assignment
    #[must_use]
    pub fn calibration_required(&self) -> bool {
        self.decoder
            .classic_mapping()
            .is_some_and(|mapping| !mapping.is_calibrated())
    }

    #[must_use]
    pub fn summary(&self) -> ControllerSummary {
        ControllerSummary {
            guid: self.identity.guid.clone(),
            name: self.name.clone(),
            model: self.decoder.name(),
            vendor: self.identity.vendor,
            product: self.identity.product,
            revision: self.identity.revision,
            connected: self.connected,
            calibration_required: self.calibration_required(),
            has_reverser: self.decoder.has_reverser(),
            brake_notches: self.decoder.brake_notches(),
            power_notches: self.decoder.power_notches(),
            buttons: self.decoder.capabilities(),
        }
    }
}

/// Listing entry handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSummary {
    pub guid: String,
    pub name: String,
    pub model: &'static str,
    pub vendor: u16,
    pub product: u16,
    pub revision: u16,
    pub connected: bool,
    pub calibration_required: bool,
    pub has_reverser: bool,
    pub brake_notches: u8,
    pub power_notches: u8,
    pub buttons: ButtonSet,
}

/// Arena of descriptors keyed by guid.
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    controllers: BTreeMap<String, ControllerDescriptor>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sighting. Known controllers are updated in place; new ones
    /// get `decoder`. Returns true for a new controller.
    pub fn observe(
        &mut self,
        identity: ControllerIdentity,
        name: &str,
        source: ControllerSource,
        decoder: impl FnOnce() -> Decoder,
    ) -> bool {
        if let Some(existing) = self.controllers.get_mut(&identity.guid) {
            if !existing.connected {
                info!("Controller reconnected: {} ({})", existing.name, identity.guid);
            }
            existing.connected = true;
            existing.source = source;
            return false;
        }

        let decoder = decoder();
        info!("Controller found: {} [{}] ({})", name, decoder.name(), identity.guid);
        self.controllers.insert(
            identity.guid.clone(),
            ControllerDescriptor {
                identity,
                name: name.to_string(),
                connected: true,
                source,
                decoder,
            },
        );
        true
    }

    /// Reconciles joystick-backed entries against a fresh enumeration.
    pub fn sync_joysticks(&mut self, devices: &[JoystickInfo]) {
        for device in devices {
            if let Some(decoder) = Decoder::for_joystick(device) {
                let identity = ControllerIdentity {
                    vendor: device.vendor,
                    product: device.product,
                    revision: device.version,
                    guid: device.guid.clone(),
                };
                self.observe(identity, &device.name, ControllerSource::Joystick { slot: device.slot }, || decoder);
            }
        }
        self.mark_missing(devices.iter().map(|d| d.guid.as_str()).collect(), |source| {
            matches!(source, ControllerSource::Joystick { .. })
        });
    }

    /// Reconciles USB-backed entries against the poller's device list.
    pub fn sync_usb(&mut self, devices: &[UsbDeviceInfo]) {
        let mut seen = Vec::with_capacity(devices.len());
        for device in devices {
            if let Some(decoder) = Decoder::for_usb(device) {
                let identity = ControllerIdentity {
                    vendor: device.vendor,
                    product: device.product,
                    revision: device.revision,
                    guid: device.guid(),
                };
                seen.push(identity.guid.clone());
                let name = if device.name.is_empty() { decoder.name() } else { device.name.as_str() };
                self.observe(identity, name, ControllerSource::Usb(device.clone()), || decoder);
            }
        }
        self.mark_missing(seen.iter().map(String::as_str).collect(), |source| {
            matches!(source, ControllerSource::Usb(_))
        });
    }

    fn mark_missing(&mut self, seen: Vec<&str>, kind: impl Fn(&ControllerSource) -> bool) {
        for descriptor in self.controllers.values_mut() {
            if descriptor.connected
                && kind(&descriptor.source)
                && !seen.contains(&descriptor.identity.guid.as_str())
            {
                debug!("Controller disconnected: {}", descriptor.identity.guid);
                descriptor.connected = false;
            }
        }
    }

    /// Marks one controller disconnected.
    pub fn mark_disconnected(&mut self, guid: &str) {
        if let Some(descriptor) = self.controllers.get_mut(guid) {
            descriptor.connected = false;
        }
    }

    #[must_use]
    pub fn get(&self, guid: &str) -> Option<&ControllerDescriptor> {
        self.controllers.get(guid)
    }

    pub fn get_mut(&mut self, guid: &str) -> Option<&mut ControllerDescriptor> {
        self.controllers.get_mut(guid)
    }

    /// Every known controller, connected or not, ordered by guid.
    #[must_use]
    pub fn list(&self) -> Vec<ControllerSummary> {
        self.controllers.values().map(ControllerDescriptor::summary).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
