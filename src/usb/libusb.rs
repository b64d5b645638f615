//! libusb backend for [`UsbTransport`]
//!
//! The byte-range and train-sim controllers are vendor-class devices, so
//! they are driven with plain interrupt and control transfers on interface
//! 0 rather than through the HID stack.

use rusb::{
    Device, DeviceDescriptor, DeviceHandle, Direction, GlobalContext, TransferType, Version,
};
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

use super::port_trait::{UsbDevice, UsbTransport};
use super::{SetupPacket, UsbDeviceInfo};

/// Interface holding the controller's endpoints
const INTERFACE: u8 = 0;

/// Bound on writes and control transfers
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Timeout for reading string descriptors during enumeration
const STRING_TIMEOUT: Duration = Duration::from_millis(100);

fn to_io(e: rusb::Error) -> io::Error {
    let kind = match e {
        rusb::Error::NoDevice => io::ErrorKind::NotConnected,
        rusb::Error::Timeout => io::ErrorKind::TimedOut,
        rusb::Error::Access => io::ErrorKind::PermissionDenied,
        rusb::Error::NotFound => io::ErrorKind::NotFound,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

/// Raw `bcdDevice` value. rusb decodes the major part as two BCD digits.
fn bcd_device(version: Version) -> u16 {
    let major = u16::from(version.major());
    ((major / 10) << 12)
        | ((major % 10) << 8)
        | (u16::from(version.minor()) << 4)
        | u16::from(version.sub_minor())
}

/// `bus-port.port...`, the same form the kernel uses in sysfs.
fn bus_path(device: &Device<GlobalContext>) -> String {
    match device.port_numbers() {
        Ok(ports) if !ports.is_empty() => {
            let ports: Vec<String> = ports.iter().map(u8::to_string).collect();
            format!("{}-{}", device.bus_number(), ports.join("."))
        }
        _ => format!("{}:{}", device.bus_number(), device.address()),
    }
}

/// Product and serial strings of one attachment.
#[derive(Debug, Clone, Default)]
struct Strings {
    name: String,
    serial: Option<String>,
}

/// Transport over libusb.
///
/// String descriptors need an open handle, so they are read once per
/// attachment (bus address) and cached.
#[derive(Debug, Default)]
pub struct LibUsbTransport {
    strings: HashMap<(u8, u8), Strings>,
}

impl LibUsbTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_strings(device: &Device<GlobalContext>, descriptor: &DeviceDescriptor) -> Strings {
        if descriptor.product_string_index().is_none() && descriptor.serial_number_string_index().is_none() {
            return Strings::default();
        }
        let handle = match device.open() {
            Ok(handle) => handle,
            Err(e) => {
                debug!("Cannot read strings of {}: {}", bus_path(device), e);
                return Strings::default();
            }
        };
        let language = match handle.read_languages(STRING_TIMEOUT) {
            Ok(languages) => languages.first().copied(),
            Err(_) => None,
        };
        let Some(language) = language else {
            return Strings::default();
        };
        Strings {
            name: handle
                .read_product_string(language, descriptor, STRING_TIMEOUT)
                .unwrap_or_default(),
            serial: handle
                .read_serial_number_string(language, descriptor, STRING_TIMEOUT)
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    fn find(info: &UsbDeviceInfo) -> io::Result<Device<GlobalContext>> {
        for device in rusb::devices().map_err(to_io)?.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if descriptor.vendor_id() == info.vendor
                && descriptor.product_id() == info.product
                && bus_path(&device) == info.path
            {
                return Ok(device);
            }
        }
        Err(io::Error::new(io::ErrorKind::NotConnected, format!("{} is gone", info.path)))
    }
}

impl UsbTransport for LibUsbTransport {
    fn enumerate(&mut self) -> io::Result<Vec<UsbDeviceInfo>> {
        let devices = rusb::devices().map_err(to_io)?;
        let mut found = Vec::with_capacity(devices.len());
        let mut live = Vec::with_capacity(devices.len());

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!("Skipping {}: {}", bus_path(&device), e);
                    continue;
                }
            };
            let key = (device.bus_number(), device.address());
            live.push(key);
            let strings = self
                .strings
                .entry(key)
                .or_insert_with(|| Self::read_strings(&device, &descriptor))
                .clone();

            found.push(UsbDeviceInfo {
                vendor: descriptor.vendor_id(),
                product: descriptor.product_id(),
                revision: bcd_device(descriptor.device_version()),
                path: bus_path(&device),
                name: strings.name,
                serial: strings.serial,
            });
        }

        // Addresses are reused after an unplug
        self.strings.retain(|key, _| live.contains(key));
        Ok(found)
    }

    fn open(&mut self, info: &UsbDeviceInfo) -> io::Result<Box<dyn UsbDevice>> {
        let device = Self::find(info)?;
        let config = device.active_config_descriptor().map_err(to_io)?;

        let mut read_endpoint = None;
        let mut write_endpoint = None;
        for interface in config.interfaces().filter(|i| i.number() == INTERFACE) {
            for setting in interface.descriptors() {
                for endpoint in setting.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Interrupt {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => read_endpoint = read_endpoint.or(Some(endpoint.address())),
                        Direction::Out => write_endpoint = write_endpoint.or(Some(endpoint.address())),
                    }
                }
            }
        }
        let read_endpoint = read_endpoint.ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, format!("{} has no interrupt IN endpoint", info.path))
        })?;

        let mut handle = device.open().map_err(to_io)?;
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }
        handle.claim_interface(INTERFACE).map_err(to_io)?;
        debug!(
            "libusb opened {} (in {:#04x}, out {:?})",
            info.path, read_endpoint, write_endpoint
        );

        Ok(Box::new(LibUsbDevice { handle, read_endpoint, write_endpoint }))
    }
}

/// An open device with interface 0 claimed.
pub struct LibUsbDevice {
    handle: DeviceHandle<GlobalContext>,
    read_endpoint: u8,
    write_endpoint: Option<u8>,
}

impl UsbDevice for LibUsbDevice {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match self.handle.read_interrupt(self.read_endpoint, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(to_io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.write_endpoint {
            Some(endpoint) => self.handle.write_interrupt(endpoint, data, WRITE_TIMEOUT).map_err(to_io),
            None => Ok(0),
        }
    }

    fn control_transfer(&mut self, setup: SetupPacket, data: &[u8]) -> io::Result<usize> {
        self.handle
            .write_control(setup.request_type, setup.request, setup.value, setup.index, data, WRITE_TIMEOUT)
            .map_err(to_io)
    }
}

impl Drop for LibUsbDevice {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(INTERFACE) {
            warn!("Failed to release USB interface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_device_round_trip() {
        for raw in [0x0000, 0x0100, 0x0102, 0x012c, 0x0190, 0x0320, 0x03e8, 0x1234] {
            assert_eq!(bcd_device(Version::from_bcd(raw)), raw, "{:#06x}", raw);
        }
    }

    #[test]
    fn test_unplug_maps_to_not_connected() {
        assert_eq!(to_io(rusb::Error::NoDevice).kind(), io::ErrorKind::NotConnected);
        assert_eq!(to_io(rusb::Error::Access).kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(to_io(rusb::Error::Pipe).kind(), io::ErrorKind::Other);
    }

    #[test]
    #[ignore] // Requires libusb and real hardware
    fn test_enumerate_real_bus() {
        let mut transport = LibUsbTransport::new();
        let devices = transport.enumerate().unwrap();
        println!("{} USB devices", devices.len());
    }
}
