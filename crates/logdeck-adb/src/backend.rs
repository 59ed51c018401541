//! Device control backend seam
//!
//! [`DeviceBackend`] is the capability boundary between the session layer
//! and whatever actually talks to devices. Production uses
//! [`AdbBackend`](crate::adb::AdbBackend); tests substitute a fake that
//! scripts connect results and log lines.

use tokio::sync::{mpsc, oneshot};

use logdeck_core::prelude::*;
use logdeck_core::UsbDevice;

/// A long-lived stream of decoded log lines from one device.
///
/// Dropping the stream (or calling [`LogStream::shutdown`]) tears down the
/// producer: for the adb backend that kills the logcat child process; for
/// fakes it just closes the channel.
#[derive(Debug)]
pub struct LogStream {
    lines: mpsc::Receiver<String>,
    stop: Option<oneshot::Sender<()>>,
}

impl LogStream {
    /// Build a stream from a line channel and a stop handle.
    ///
    /// The producer should terminate when `stop` fires or when the line
    /// sender is dropped.
    pub fn new(lines: mpsc::Receiver<String>, stop: oneshot::Sender<()>) -> Self {
        Self {
            lines,
            stop: Some(stop),
        }
    }

    /// Next decoded line, or `None` when the producer has gone away
    /// (process exited, pipe closed).
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Explicitly stop the producer. Also happens on drop.
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Capability to enumerate, connect, and stream logs from devices.
///
/// All methods are suspension points with bounded internal timeouts; none
/// of them blocks a thread.
#[trait_variant::make(DeviceBackend: Send)]
pub trait LocalDeviceBackend {
    /// Establish connectivity to a network device (`host:port`)
    async fn connect(&self, addr: &str) -> Result<()>;

    /// Drop connectivity to a network device
    async fn disconnect(&self, addr: &str) -> Result<()>;

    /// Resolve the human-readable name of a device
    async fn device_name(&self, id: &str) -> Result<String>;

    /// Enumerate directly-attached devices
    async fn list_usb_devices(&self) -> Result<Vec<UsbDevice>>;

    /// Promote a directly-attached device to network mode.
    /// Returns the device's network address (`host:port`).
    async fn enable_wifi(&self, serial: &str, port: u16) -> Result<String>;

    /// Open a long-lived log stream for a device
    async fn open_log_stream(&self, id: &str) -> Result<LogStream>;
}
