//! Scriptable fake backend for session and server tests
//!
//! Only compiled for tests or with the `test-helpers` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use logdeck_core::prelude::*;
use logdeck_core::UsbDevice;

use crate::backend::{DeviceBackend, LogStream};

/// Script for one `open_log_stream` call
#[derive(Debug, Clone)]
pub struct ScriptedStream {
    /// Lines delivered in order
    pub lines: Vec<String>,

    /// After the lines: stay open until the stream is dropped (`true`),
    /// or end immediately as if the process exited (`false`)
    pub stay_open: bool,
}

impl ScriptedStream {
    pub fn ending_with_eof(lines: Vec<String>) -> Self {
        Self {
            lines,
            stay_open: false,
        }
    }

    pub fn staying_open(lines: Vec<String>) -> Self {
        Self {
            lines,
            stay_open: true,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    connect_failures_remaining: usize,
    device_name: Option<String>,
    name_hangs: bool,
    usb_devices: Vec<UsbDevice>,
    wifi_address: Option<String>,
    streams: VecDeque<ScriptedStream>,
}

/// A [`DeviceBackend`] whose behavior is scripted up front.
///
/// Counts connect attempts and stream opens, and tracks how many scripted
/// streams are live at once, so tests can pin down the session state
/// machine's reconnect and cancellation behavior.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    connect_attempts: Arc<AtomicUsize>,
    stream_opens: Arc<AtomicUsize>,
    active_streams: Arc<AtomicUsize>,
    max_active_streams: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect calls fail
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().unwrap().connect_failures_remaining = n;
    }

    pub fn set_device_name(&self, name: impl Into<String>) {
        self.state.lock().unwrap().device_name = Some(name.into());
    }

    /// Make `device_name` hang forever, for name-resolution timeout tests
    pub fn hang_device_name(&self) {
        self.state.lock().unwrap().name_hangs = true;
    }

    pub fn set_usb_devices(&self, devices: Vec<UsbDevice>) {
        self.state.lock().unwrap().usb_devices = devices;
    }

    pub fn set_wifi_address(&self, addr: impl Into<String>) {
        self.state.lock().unwrap().wifi_address = Some(addr.into());
    }

    /// Queue the script for the next `open_log_stream` call
    pub fn push_stream(&self, script: ScriptedStream) {
        self.state.lock().unwrap().streams.push_back(script);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    /// Streams currently live (opened and not yet ended or dropped)
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// High-water mark of concurrently live streams
    pub fn max_active_streams(&self) -> usize {
        self.max_active_streams.load(Ordering::SeqCst)
    }
}

impl DeviceBackend for FakeBackend {
    async fn connect(&self, addr: &str) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if state.connect_failures_remaining > 0 {
            state.connect_failures_remaining -= 1;
            return Err(Error::connect_failed(addr, "scripted failure"));
        }
        Ok(())
    }

    async fn disconnect(&self, _addr: &str) -> Result<()> {
        Ok(())
    }

    async fn device_name(&self, id: &str) -> Result<String> {
        let (name, hangs) = {
            let state = self.state.lock().unwrap();
            (state.device_name.clone(), state.name_hangs)
        };

        if hangs {
            // Never resolves; the caller's timeout decides
            std::future::pending::<()>().await;
        }

        name.ok_or_else(|| Error::backend(format!("no name scripted for {}", id)))
    }

    async fn list_usb_devices(&self) -> Result<Vec<UsbDevice>> {
        Ok(self.state.lock().unwrap().usb_devices.clone())
    }

    async fn enable_wifi(&self, serial: &str, _port: u16) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .wifi_address
            .clone()
            .ok_or_else(|| Error::backend(format!("no wifi address scripted for {}", serial)))
    }

    async fn open_log_stream(&self, _id: &str) -> Result<LogStream> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);

        let script = self
            .state
            .lock()
            .unwrap()
            .streams
            .pop_front()
            .unwrap_or_else(|| ScriptedStream::staying_open(Vec::new()));

        let active = Arc::clone(&self.active_streams);
        let max_active = Arc::clone(&self.max_active_streams);
        let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now_active, Ordering::SeqCst);

        let (line_tx, line_rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        tokio::spawn(async move {
            for line in script.lines {
                tokio::select! {
                    result = line_tx.send(line) => {
                        if result.is_err() {
                            break;
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }

            if script.stay_open {
                // Hold the sender open until the consumer goes away
                tokio::select! {
                    _ = line_tx.closed() => {}
                    _ = &mut stop_rx => {}
                }
            }

            active.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(LogStream::new(line_rx, stop_tx))
    }
}
