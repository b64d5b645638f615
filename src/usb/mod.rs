//! # USB Transport Module
//!
//! Raw USB access for the controllers that bypass the joystick layer.
//!
//! This module handles:
//! - The registry of supported `(vendor, product[, revision])` ids
//! - Device handles with read, write and unload buffers
//! - The background polling thread ([`poller`])
//! - The libusb backend ([`libusb`])

pub mod libusb;
pub mod poller;
pub mod port_trait;

use serde::Serialize;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

use port_trait::{UsbDevice, UsbTransport};

/// Vendor control transfer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

/// An attached USB device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbDeviceInfo {
    pub vendor: u16,
    pub product: u16,
    pub revision: u16,
    /// Bus location used to open the device. Changes when the device is
    /// plugged into another port.
    pub path: String,
    pub name: String,
    /// iSerialNumber string, when the device reports one
    pub serial: Option<String>,
}

impl UsbDeviceInfo {
    /// Stable identifier: vendor, product, revision and serial number. The
    /// bus location is not part of it, so a replugged controller keeps its
    /// identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use dengo_bridge::usb::UsbDeviceInfo;
    ///
    /// let mut info = UsbDeviceInfo {
    ///     vendor: 0x0ae4, product: 0x0004, revision: 0x0102,
    ///     path: "1-2".to_string(), name: "TCPP-20009".to_string(), serial: None,
    /// };
    /// assert_eq!(info.guid(), "usb:0ae4:0004:0102");
    ///
    /// info.serial = Some("A01234".to_string());
    /// assert_eq!(info.guid(), "usb:0ae4:0004:0102:A01234");
    /// ```
    #[must_use]
    pub fn guid(&self) -> String {
        let base = format!("usb:{:04x}:{:04x}:{:04x}", self.vendor, self.product, self.revision);
        match self.serial.as_deref().map(str::trim) {
            Some(serial) if !serial.is_empty() => format!("{}:{}", base, serial),
            _ => base,
        }
    }
}

/// One entry of the supported-device registry. `None` revision matches
/// any revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedDevice {
    pub vendor: u16,
    pub product: u16,
    pub revision: Option<u16>,
}

impl SupportedDevice {
    #[must_use]
    pub fn matches(&self, info: &UsbDeviceInfo) -> bool {
        self.vendor == info.vendor
            && self.product == info.product
            && self.revision.map_or(true, |r| r == info.revision)
    }
}

/// Bytes written to a device: an output report and an optional control
/// transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputReport {
    pub data: Vec<u8>,
    pub setup: Option<SetupPacket>,
}

impl OutputReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.setup.is_none()
    }
}

/// Everything the poller needs to drive one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbProfile {
    /// Identity of the device to open
    pub guid: String,
    /// Input report contents before the first read
    pub initial_input: Vec<u8>,
    /// Written when the handle is unloaded
    pub unload: OutputReport,
}

/// An open device plus its buffers.
///
/// Dropping a handle that is still open unloads it.
pub struct UsbDeviceHandle {
    info: UsbDeviceInfo,
    device: Option<Box<dyn UsbDevice>>,
    read_buffer: Vec<u8>,
    unload: OutputReport,
}

impl std::fmt::Debug for UsbDeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbDeviceHandle")
            .field("guid", &self.info.guid())
            .field("open", &self.device.is_some())
            .finish_non_exhaustive()
    }
}

impl UsbDeviceHandle {
    /// Opens `info` through `transport`.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error if the device cannot be opened.
    pub fn open(
        transport: &mut dyn UsbTransport,
        info: &UsbDeviceInfo,
        profile: &UsbProfile,
    ) -> io::Result<Self> {
        let device = transport.open(info)?;
        info!("Opened USB controller {} ({})", info.name, info.guid());
        Ok(Self {
            info: info.clone(),
            device: Some(device),
            read_buffer: profile.initial_input.clone(),
            unload: profile.unload.clone(),
        })
    }

    #[must_use]
    pub fn info(&self) -> &UsbDeviceInfo {
        &self.info
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Latest input report
    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.read_buffer
    }

    fn write_report(device: &mut dyn UsbDevice, report: &OutputReport) -> io::Result<()> {
        if !report.data.is_empty() {
            device.write(&report.data)?;
        }
        if let Some(setup) = report.setup {
            device.control_transfer(setup, &[])?;
        }
        Ok(())
    }

    /// One poll cycle: a bounded read followed immediately by writing
    /// `output`. Returns true when a new input report arrived.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the device; the handle stays open and the
    /// caller decides whether to release it.
    pub fn sync(&mut self, output: &OutputReport, timeout: Duration) -> io::Result<bool> {
        let device = match self.device.as_mut() {
            Some(device) => device,
            None => return Ok(false),
        };

        let mut buf = vec![0u8; self.read_buffer.len().max(1)];
        let n = device.read(&mut buf, timeout)?.min(self.read_buffer.len());
        // Short reads keep the tail of the previous report
        self.read_buffer[..n].copy_from_slice(&buf[..n]);

        Self::write_report(&mut **device, output)?;
        Ok(n > 0)
    }

    /// Writes the unload report and closes the device.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from writing the unload report. The device is
    /// closed either way.
    pub fn unload(&mut self) -> io::Result<()> {
        let Some(mut device) = self.device.take() else {
            return Ok(());
        };
        debug!("Unloading USB controller {}", self.info.guid());
        Self::write_report(&mut *device, &self.unload)
    }

    /// Closes the device without writing anything, for devices that are
    /// gone or faulted.
    pub fn release(&mut self) {
        if self.device.take().is_some() {
            debug!("Released USB controller {}", self.info.guid());
        }
    }
}

impl Drop for UsbDeviceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.unload() {
            warn!("Failed to unload USB controller {}: {}", self.info.guid(), e);
        }
    }
}
