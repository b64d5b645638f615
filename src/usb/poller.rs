//! # USB Polling Thread
//!
//! One background thread owns every USB handle. It periodically rescans
//! for supported devices, and while a USB controller is active it loops on
//! a bounded read followed by a write of the current output report.
//!
//! Each piece of shared state has exactly one writer:
//!
//! | Channel | Writer | Reader |
//! |---------|--------|--------|
//! | active profile | frame side | poll thread |
//! | output report | frame side | poll thread |
//! | latest input report | poll thread | frame side |
//! | attached devices | poll thread | frame side |
//!
//! The first hardware error flips the poller into a degraded state: the
//! user is notified once, all handles are released and the thread stops
//! touching the hardware.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::port_trait::UsbTransport;
use super::{OutputReport, SupportedDevice, UsbDeviceHandle, UsbDeviceInfo, UsbProfile};
use crate::notify::Notifier;

/// Timing knobs for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Upper bound on a single blocking read
    pub read_timeout: Duration,
    /// Time between enumeration passes
    pub discovery_interval: Duration,
    /// Sleep while no device is open
    pub idle_sleep: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(10),
            discovery_interval: Duration::from_millis(1000),
            idle_sleep: Duration::from_millis(10),
        }
    }
}

/// An input report received from the active device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbReport {
    /// Device that produced the report
    pub guid: String,
    pub data: Vec<u8>,
    /// Increments with every report
    pub sequence: u64,
}

/// Handle to the background poll thread.
pub struct UsbPoller {
    active_tx: watch::Sender<Option<UsbProfile>>,
    output_tx: watch::Sender<OutputReport>,
    report_rx: watch::Receiver<Option<UsbReport>>,
    devices_rx: watch::Receiver<Vec<UsbDeviceInfo>>,
    degraded: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for UsbPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbPoller")
            .field("degraded", &self.is_degraded())
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

impl UsbPoller {
    /// Starts the poll thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS refuses to create the thread.
    pub fn spawn<T>(
        transport: T,
        supported: Vec<SupportedDevice>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
    ) -> io::Result<Self>
    where
        T: UsbTransport + 'static,
    {
        let (active_tx, active_rx) = watch::channel(None);
        let (output_tx, output_rx) = watch::channel(OutputReport::default());
        let (report_tx, report_rx) = watch::channel(None);
        let (devices_tx, devices_rx) = watch::channel(Vec::new());
        let degraded = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = PollWorker {
            transport: Box::new(transport),
            supported,
            notifier,
            config,
            active_rx,
            output_rx,
            report_tx,
            devices_tx,
            degraded: Arc::clone(&degraded),
            shutdown: Arc::clone(&shutdown),
            handle: None,
            attached: Vec::new(),
            sequence: 0,
        };

        let thread = thread::Builder::new()
            .name("usb-poll".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            active_tx,
            output_tx,
            report_rx,
            devices_rx,
            degraded,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Selects the device to drive, or `None` to close whatever is open.
    pub fn set_active(&self, profile: Option<UsbProfile>) {
        self.active_tx.send_if_modified(|current| {
            if *current == profile {
                false
            } else {
                *current = profile;
                true
            }
        });
    }

    /// Replaces the report written after every read.
    pub fn set_output(&self, report: OutputReport) {
        self.output_tx.send_if_modified(|current| {
            if *current == report {
                false
            } else {
                *current = report;
                true
            }
        });
    }

    /// Most recent input report from the active device
    #[must_use]
    pub fn latest_report(&self) -> Option<UsbReport> {
        self.report_rx.borrow().clone()
    }

    /// Supported devices seen on the last enumeration pass
    #[must_use]
    pub fn devices(&self) -> Vec<UsbDeviceInfo> {
        self.devices_rx.borrow().clone()
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Stops the thread and waits for it to unload the open device.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("USB poll thread panicked");
            }
        }
    }
}

impl Drop for UsbPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PollWorker {
    transport: Box<dyn UsbTransport>,
    supported: Vec<SupportedDevice>,
    notifier: Arc<dyn Notifier>,
    config: PollerConfig,
    active_rx: watch::Receiver<Option<UsbProfile>>,
    output_rx: watch::Receiver<OutputReport>,
    report_tx: watch::Sender<Option<UsbReport>>,
    devices_tx: watch::Sender<Vec<UsbDeviceInfo>>,
    degraded: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    handle: Option<UsbDeviceHandle>,
    attached: Vec<UsbDeviceInfo>,
    sequence: u64,
}

impl PollWorker {
    fn run(mut self) {
        debug!("USB poll thread started");
        let mut last_discovery: Option<Instant> = None;

        while !self.shutdown.load(Ordering::SeqCst) {
            if last_discovery.map_or(true, |t| t.elapsed() >= self.config.discovery_interval) {
                last_discovery = Some(Instant::now());
                if let Err(e) = self.discover() {
                    self.fail("USB enumeration failed", &e);
                    return;
                }
            }

            if let Err(e) = self.reconcile_active() {
                self.fail("Failed to switch USB controller", &e);
                return;
            }

            match self.poll_once() {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.config.idle_sleep),
                Err(e) if e.kind() == io::ErrorKind::NotConnected => self.forget_unplugged(),
                Err(e) => {
                    self.fail("USB controller I/O failed", &e);
                    return;
                }
            }
        }

        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.unload() {
                warn!("Failed to unload {} on shutdown: {}", handle.info().guid(), e);
            }
        }
        debug!("USB poll thread stopped");
    }

    fn discover(&mut self) -> io::Result<()> {
        let found: Vec<UsbDeviceInfo> = self
            .transport
            .enumerate()?
            .into_iter()
            .filter(|d| self.supported.iter().any(|s| s.matches(d)))
            .collect();

        if found != self.attached {
            debug!("USB devices changed: {} supported attached", found.len());
            self.attached = found.clone();
            self.devices_tx.send_replace(found);
        }

        // A replug elsewhere keeps the guid but moves the path
        if let Some(handle) = self.handle.as_mut() {
            let open = handle.info();
            if !self.attached.iter().any(|d| d.guid() == open.guid() && d.path == open.path) {
                info!("USB controller {} disconnected from {}", open.guid(), open.path);
                handle.release();
                self.handle = None;
            }
        }
        Ok(())
    }

    /// The open device went away between two discovery passes. Not a fault:
    /// the handle is released and the device stays unlisted until the next
    /// pass sees it again.
    fn forget_unplugged(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        info!("USB controller {} unplugged", handle.info().guid());
        handle.release();
        let gone = handle.info().clone();
        self.attached.retain(|d| *d != gone);
        self.devices_tx.send_replace(self.attached.clone());
    }

    fn reconcile_active(&mut self) -> io::Result<()> {
        let wanted = self.active_rx.borrow_and_update().clone();
        let current = self.handle.as_ref().map(|h| h.info().guid());

        if current.is_some() && current.as_deref() != wanted.as_ref().map(|p| p.guid.as_str()) {
            if let Some(mut old) = self.handle.take() {
                old.unload()?;
            }
        }

        if self.handle.is_none() {
            if let Some(profile) = wanted {
                if let Some(info) = self.attached.iter().find(|d| d.guid() == profile.guid).cloned() {
                    match UsbDeviceHandle::open(&mut *self.transport, &info, &profile) {
                        Ok(handle) => self.handle = Some(handle),
                        Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                            debug!("USB controller {} left before it was opened", info.guid());
                            self.attached.retain(|d| *d != info);
                            self.devices_tx.send_replace(self.attached.clone());
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns false when no device is open.
    fn poll_once(&mut self) -> io::Result<bool> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(false);
        };

        let output = self.output_rx.borrow().clone();
        if handle.sync(&output, self.config.read_timeout)? {
            self.sequence += 1;
            self.report_tx.send_replace(Some(UsbReport {
                guid: handle.info().guid(),
                data: handle.input().to_vec(),
                sequence: self.sequence,
            }));
        }
        Ok(true)
    }

    fn fail(&mut self, context: &str, error: &io::Error) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!("{}: {}", context, error);
            self.notifier
                .error(&format!("{}: {}. USB controllers are disabled until restart.", context, error));
        }
    }
}
