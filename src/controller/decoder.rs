//! # Decoder Dispatch
//!
//! [`Decoder`] is the closed set of hardware families. Everything that
//! differs between families (discovery, decode, output reports, notch
//! counts) is answered here with one `match`.

use super::analog::AnalogDecoder;
use super::byte_range::{ByteRangeDecoder, ByteRangeModel};
use super::classic::{ClassicDecoder, ClassicMapping, CLASSIC_BRAKE_NOTCHES, CLASSIC_POWER_NOTCHES};
use super::display::{self, TrainStatus};
use super::state::{ButtonSet, CanonicalState, DecodedInput};
use super::train_sim::{TrainSimDecoder, TrainSimModel};
use crate::joystick::{JoystickInfo, JoystickSnapshot};
use crate::usb::{OutputReport, SupportedDevice, UsbDeviceInfo, UsbProfile};

/// Raw input handed to a decoder.
#[derive(Debug, Clone, Copy)]
pub enum RawInput<'a> {
    /// Button, axis and hat snapshot from a joystick device
    Joystick(&'a JoystickSnapshot),
    /// Latest input report from a USB device
    Usb(&'a [u8]),
}

/// One decoder per hardware family.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoder {
    Classic(ClassicDecoder),
    ByteRange(ByteRangeDecoder),
    TrainSim(TrainSimDecoder),
    Analog(AnalogDecoder),
}

impl Decoder {
    /// Picks a decoder for a joystick device. Known analog models win over
    /// the generic classic-adapter heuristic.
    #[must_use]
    pub fn for_joystick(info: &JoystickInfo) -> Option<Self> {
        if let Some(analog) = AnalogDecoder::discover(info) {
            return Some(Decoder::Analog(analog));
        }
        if ClassicDecoder::matches(info) {
            return Some(Decoder::Classic(ClassicDecoder::new(ClassicMapping::default())));
        }
        None
    }

    /// Picks a decoder for a raw USB device.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::controller::decoder::Decoder;
    /// use dengo_bridge::usb::UsbDeviceInfo;
    ///
    /// let info = UsbDeviceInfo {
    ///     vendor: 0x0ae4, product: 0x0005, revision: 0x0100,
    ///     path: "1-1".to_string(), name: String::new(), serial: None,
    /// };
    /// let decoder = Decoder::for_usb(&info).unwrap();
    /// assert_eq!(decoder.brake_notches(), 7);
    /// assert_eq!(decoder.power_notches(), 13);
    /// ```
    #[must_use]
    pub fn for_usb(info: &UsbDeviceInfo) -> Option<Self> {
        if let Some(model) = ByteRangeModel::from_usb_id(info.vendor, info.product) {
            return Some(Decoder::ByteRange(ByteRangeDecoder::new(model)));
        }
        TrainSimModel::from_usb_id(info.vendor, info.product, info.revision)
            .map(|model| Decoder::TrainSim(TrainSimDecoder::new(model)))
    }

    /// Every `(vendor, product[, revision])` the USB poller should watch for
    #[must_use]
    pub fn supported_usb_devices() -> Vec<SupportedDevice> {
        let byte_range = ByteRangeModel::ALL.into_iter().map(|m| {
            let (vendor, product) = m.usb_id();
            SupportedDevice { vendor, product, revision: None }
        });
        let train_sim = TrainSimModel::ALL.into_iter().map(|m| {
            let (vendor, product, revision) = m.usb_id();
            SupportedDevice { vendor, product, revision: Some(revision) }
        });
        byte_range.chain(train_sim).collect()
    }

    /// Decodes one raw reading. A reading of the wrong kind decodes to
    /// "retain everything, nothing pressed".
    #[must_use]
    pub fn decode(&self, raw: RawInput<'_>, previous: &CanonicalState) -> DecodedInput {
        let mut decoded = match (self, raw) {
            (Decoder::Classic(d), RawInput::Joystick(snapshot)) => d.decode(snapshot, previous),
            (Decoder::Analog(d), RawInput::Joystick(snapshot)) => d.decode(snapshot),
            (Decoder::ByteRange(d), RawInput::Usb(report)) => d.decode(report),
            (Decoder::TrainSim(d), RawInput::Usb(report)) => d.decode(report),
            _ => DecodedInput::default(),
        };
        decoded.buttons = decoded.buttons.masked(self.capabilities());
        if !self.has_reverser() {
            decoded.reverser = None;
        }
        decoded
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Decoder::Classic(_) => "Classic controller",
            Decoder::ByteRange(d) => d.model().name(),
            Decoder::TrainSim(d) => d.model().name(),
            Decoder::Analog(d) => d.model().name(),
        }
    }

    /// True for decoders driven through the USB poller
    #[must_use]
    pub fn is_usb(&self) -> bool {
        matches!(self, Decoder::ByteRange(_) | Decoder::TrainSim(_))
    }

    #[must_use]
    pub fn requires_calibration(&self) -> bool {
        matches!(self, Decoder::Classic(_))
    }

    #[must_use]
    pub fn has_reverser(&self) -> bool {
        match self {
            Decoder::TrainSim(d) => d.model().has_reverser(),
            _ => false,
        }
    }

    /// Service brake notches
    #[must_use]
    pub fn brake_notches(&self) -> u8 {
        match self {
            Decoder::Classic(_) => CLASSIC_BRAKE_NOTCHES,
            Decoder::ByteRange(d) => d.model().brake_notches(),
            Decoder::TrainSim(d) => d.model().brake_notches(),
            Decoder::Analog(d) => d.model().brake_notches(),
        }
    }

    #[must_use]
    pub fn power_notches(&self) -> u8 {
        match self {
            Decoder::Classic(_) => CLASSIC_POWER_NOTCHES,
            Decoder::ByteRange(d) => d.model().power_notches(),
            Decoder::TrainSim(d) => d.model().power_notches(),
            Decoder::Analog(d) => d.model().power_notches(),
        }
    }

    /// Canonical buttons the hardware can report
    #[must_use]
    pub fn capabilities(&self) -> ButtonSet {
        match self {
            Decoder::Classic(_) => ClassicDecoder::capabilities(),
            Decoder::ByteRange(d) => d.model().capabilities(),
            Decoder::TrainSim(d) => d.model().capabilities(),
            Decoder::Analog(d) => d.capabilities(),
        }
    }

    /// Output written on every poll for the current train status.
    #[must_use]
    pub fn output_report(&self, status: &TrainStatus) -> OutputReport {
        match self {
            Decoder::ByteRange(d) => match d.model() {
                ByteRangeModel::TypeII => OutputReport {
                    data: display::type2_output(status),
                    setup: None,
                },
                ByteRangeModel::Shinkansen => OutputReport {
                    data: display::shinkansen_output(status),
                    setup: None,
                },
                ByteRangeModel::Ryojouhen => OutputReport::default(),
            },
            Decoder::TrainSim(d) => OutputReport {
                data: Vec::new(),
                setup: Some(d.model().lamp_setup(status.in_game && status.doors_closed)),
            },
            Decoder::Classic(_) | Decoder::Analog(_) => OutputReport::default(),
        }
    }

    /// Output written when the device is unloaded.
    #[must_use]
    pub fn unload_report(&self) -> OutputReport {
        self.output_report(&TrainStatus::default())
    }

    /// Poller profile for a USB decoder, `None` for joystick decoders.
    #[must_use]
    pub fn usb_profile(&self, info: &UsbDeviceInfo) -> Option<UsbProfile> {
        let initial_input = match self {
            Decoder::ByteRange(d) => d.model().initial_input(),
            Decoder::TrainSim(d) => d.model().initial_input(),
            Decoder::Classic(_) | Decoder::Analog(_) => return None,
        };
        Some(UsbProfile {
            guid: info.guid(),
            initial_input,
            unload: self.unload_report(),
        })
    }

    /// Installs calibrated indices; no-op for other families.
    pub fn set_classic_mapping(&mut self, mapping: ClassicMapping) {
        if let Decoder::Classic(d) = self {
            d.set_mapping(mapping);
        }
    }

    #[must_use]
    pub fn classic_mapping(&self) -> Option<&ClassicMapping> {
        match self {
            Decoder::Classic(d) => Some(d.mapping()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::{BrakeNotch, ControllerButton, PowerNotch};
    use crate::controller::display::{SHINKANSEN_BLANK, TYPE2_IDLE};
    use crate::joystick::mocks::joystick_info;

    fn usb(vendor: u16, product: u16, revision: u16) -> UsbDeviceInfo {
        UsbDeviceInfo { vendor, product, revision, path: "p".to_string(), name: String::new(), serial: None }
    }

    // ==================== Discovery Tests ====================

    #[test]
    fn test_analog_wins_over_classic() {
        let info = joystick_info(0x0ae4, 0x0003, "DGC-255", 14, 2, 1);
        assert!(matches!(Decoder::for_joystick(&info), Some(Decoder::Analog(_))));
    }

    #[test]
    fn test_classic_heuristic() {
        let info = joystick_info(0x0079, 0x0006, "Generic USB Joystick", 13, 2, 0);
        let decoder = Decoder::for_joystick(&info).unwrap();
        assert!(decoder.requires_calibration());
        assert_eq!(decoder.brake_notches(), 8);
        assert_eq!(decoder.power_notches(), 5);

        let gamepad = joystick_info(0x054c, 0x0ce6, "Wireless Controller", 8, 6, 0);
        assert!(Decoder::for_joystick(&gamepad).is_none());
    }

    #[test]
    fn test_train_sim_needs_revision() {
        assert!(matches!(Decoder::for_usb(&usb(0x0ae4, 0x0101, 0x03e8)), Some(Decoder::TrainSim(_))));
        assert!(Decoder::for_usb(&usb(0x0ae4, 0x0101, 0x0999)).is_none());
    }

    #[test]
    fn test_supported_usb_devices_cover_all_models() {
        let supported = Decoder::supported_usb_devices();
        assert_eq!(supported.len(), ByteRangeModel::ALL.len() + TrainSimModel::ALL.len());
        assert!(supported.iter().any(|s| s.matches(&usb(0x0ae4, 0x0004, 0x1234))));
        assert!(supported.iter().any(|s| s.matches(&usb(0x1c06, 0x77a7, 0x0000))));
    }

    // ==================== Decode Tests ====================

    #[test]
    fn test_type2_scenarios() {
        let decoder = Decoder::for_usb(&usb(0x0ae4, 0x0004, 0)).unwrap();
        let prev = CanonicalState { brake: BrakeNotch::Service(3), ..Default::default() };
        let report = |brake: u8| vec![0x01, brake, 0x81, 0xFF, 0x08, 0x00];

        let cases = [
            (0x8A, Some(BrakeNotch::Service(1))),
            (0x79, Some(BrakeNotch::Released)),
            (0xB9, Some(BrakeNotch::Emergency)),
            (0x85, None),
        ];
        for (byte, expected) in cases {
            let decoded = decoder.decode(RawInput::Usb(&report(byte)), &prev);
            assert_eq!(decoded.brake, expected, "brake byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_wrong_raw_kind_retains() {
        let decoder = Decoder::for_usb(&usb(0x0ae4, 0x0004, 0)).unwrap();
        let snapshot = JoystickSnapshot::default();
        let decoded = decoder.decode(RawInput::Joystick(&snapshot), &CanonicalState::default());
        assert_eq!(decoded, DecodedInput::default());
    }

    #[test]
    fn test_decode_is_idempotent() {
        let decoder = Decoder::for_usb(&usb(0x0ae4, 0x0005, 0)).unwrap();
        let report = [0x1C, 0x12, 0xFF, 0x08, 0x10, 0x00];
        let first = decoder.decode(RawInput::Usb(&report), &CanonicalState::default());
        let state = first.apply_to(&CanonicalState::default());
        let second = decoder.decode(RawInput::Usb(&report), &state);
        assert_eq!(second.apply_to(&state), state);
    }

    #[test]
    fn test_unsupported_buttons_masked() {
        let decoder = Decoder::for_usb(&usb(0x0ae4, 0x0004, 0)).unwrap();
        let decoded = decoder.decode(RawInput::Usb(&[0x01, 0x79, 0x81, 0xFF, 0x08, 0xFF]), &CanonicalState::default());
        assert!(!decoded.buttons.is_pressed(ControllerButton::LDoor));
        assert!(!decoded.buttons.is_pressed(ControllerButton::Ats));
        assert_eq!(decoded.power, Some(PowerNotch::NEUTRAL));
    }

    // ==================== Output Tests ====================

    #[test]
    fn test_unload_reports() {
        let type2 = Decoder::for_usb(&usb(0x0ae4, 0x0004, 0)).unwrap();
        assert_eq!(type2.unload_report().data, TYPE2_IDLE.to_vec());

        let shinkansen = Decoder::for_usb(&usb(0x0ae4, 0x0005, 0)).unwrap();
        assert_eq!(shinkansen.unload_report().data, SHINKANSEN_BLANK.to_vec());

        let ryojouhen = Decoder::for_usb(&usb(0x0ae4, 0x0007, 0)).unwrap();
        assert!(ryojouhen.unload_report().is_empty());

        let mascon = Decoder::for_usb(&usb(0x1c06, 0x77a7, 0)).unwrap();
        let setup = mascon.unload_report().setup.unwrap();
        assert_eq!((setup.request_type, setup.request, setup.value), (0x40, 0x50, 0x00));
    }

    #[test]
    fn test_train_sim_lamp_follows_doors() {
        let mascon = Decoder::for_usb(&usb(0x1c06, 0x77a7, 0)).unwrap();
        let status = TrainStatus { in_game: true, doors_closed: true, ..Default::default() };
        assert_eq!(mascon.output_report(&status).setup.unwrap().value, 0x10);
    }

    #[test]
    fn test_joystick_decoders_have_no_usb_profile() {
        let info = joystick_info(0x0f0d, 0x00c1, "Zuiki", 14, 4, 1);
        let decoder = Decoder::for_joystick(&info).unwrap();
        assert!(decoder.usb_profile(&usb(0, 0, 0)).is_none());
        assert!(!decoder.is_usb());
    }
}
