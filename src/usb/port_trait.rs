//! Trait abstraction for raw USB operations to enable testing

use std::io;
use std::time::Duration;

use super::{SetupPacket, UsbDeviceInfo};

/// An opened USB device. Dropping it closes the device.
pub trait UsbDevice: Send {
    /// Read one input report, waiting at most `timeout`. Returns 0 when
    /// nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write one output report
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Issue a vendor control transfer
    fn control_transfer(&mut self, setup: SetupPacket, data: &[u8]) -> io::Result<usize>;
}

/// Enumerates and opens USB devices.
pub trait UsbTransport: Send {
    /// List attached devices
    fn enumerate(&mut self) -> io::Result<Vec<UsbDeviceInfo>>;

    /// Open an attached device
    fn open(&mut self, info: &UsbDeviceInfo) -> io::Result<Box<dyn UsbDevice>>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Every call the mock saw, in order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum UsbCall {
        Enumerate,
        Open(String),
        Read(String),
        Write(String, Vec<u8>),
        Control(String, SetupPacket),
        Close(String),
    }

    /// Mock USB transport for testing
    #[derive(Clone, Default)]
    pub struct MockUsbTransport {
        pub devices: Arc<Mutex<Vec<UsbDeviceInfo>>>,
        pub reads: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub calls: Arc<Mutex<Vec<UsbCall>>>,
        pub read_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub enumerate_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub hardware_calls: Arc<AtomicUsize>,
    }

    impl MockUsbTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn attach(&self, info: UsbDeviceInfo) {
            self.devices.lock().unwrap().push(info);
        }

        pub fn detach_all(&self) {
            self.devices.lock().unwrap().clear();
        }

        pub fn push_read(&self, report: Vec<u8>) {
            self.reads.lock().unwrap().push_back(report);
        }

        pub fn set_read_error(&self, error: io::ErrorKind) {
            *self.read_error.lock().unwrap() = Some(error);
        }

        pub fn set_enumerate_error(&self, error: io::ErrorKind) {
            *self.enumerate_error.lock().unwrap() = Some(error);
        }

        pub fn get_calls(&self) -> Vec<UsbCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn hardware_call_count(&self) -> usize {
            self.hardware_calls.load(Ordering::SeqCst)
        }
    }

    impl UsbTransport for MockUsbTransport {
        fn enumerate(&mut self) -> io::Result<Vec<UsbDeviceInfo>> {
            self.hardware_calls.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(UsbCall::Enumerate);
            if let Some(error) = *self.enumerate_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock enumerate error"));
            }
            Ok(self.devices.lock().unwrap().clone())
        }

        fn open(&mut self, info: &UsbDeviceInfo) -> io::Result<Box<dyn UsbDevice>> {
            self.hardware_calls.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(UsbCall::Open(info.path.clone()));
            Ok(Box::new(MockUsbDevice { path: info.path.clone(), transport: self.clone() }))
        }
    }

    /// Device half of [`MockUsbTransport`]
    pub struct MockUsbDevice {
        path: String,
        transport: MockUsbTransport,
    }

    impl UsbDevice for MockUsbDevice {
        fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            self.transport.hardware_calls.fetch_add(1, Ordering::SeqCst);
            self.transport.calls.lock().unwrap().push(UsbCall::Read(self.path.clone()));
            if let Some(error) = *self.transport.read_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock read error"));
            }
            match self.transport.reads.lock().unwrap().pop_front() {
                Some(report) => {
                    let n = report.len().min(buf.len());
                    buf[..n].copy_from_slice(&report[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.transport.hardware_calls.fetch_add(1, Ordering::SeqCst);
            self.transport
                .calls
                .lock()
                .unwrap()
                .push(UsbCall::Write(self.path.clone(), data.to_vec()));
            Ok(data.len())
        }

        fn control_transfer(&mut self, setup: SetupPacket, data: &[u8]) -> io::Result<usize> {
            self.transport.hardware_calls.fetch_add(1, Ordering::SeqCst);
            self.transport.calls.lock().unwrap().push(UsbCall::Control(self.path.clone(), setup));
            Ok(data.len())
        }
    }

    impl Drop for MockUsbDevice {
        fn drop(&mut self) {
            if let Ok(mut calls) = self.transport.calls.lock() {
                calls.push(UsbCall::Close(self.path.clone()));
            }
        }
    }
}
