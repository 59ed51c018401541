//! Device session state machine
//!
//! One [`DeviceSession`] owns a device's connection lifecycle:
//! `offline → connecting → online`, back to `connecting` on stream drops,
//! and to `offline` on failure or explicit disconnect. The streaming loop
//! runs as a single cancellable task; `disconnect` fires a shutdown signal
//! and joins the task, so no event for the device can be emitted after
//! `disconnect` returns, and a subsequent `connect` can never race a stale
//! loop.
//!
//! Every status transition is broadcast as a `device_update`; that is the
//! only channel through which device state reaches observers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use logdeck_core::prelude::*;
use logdeck_core::{ConnectionType, Device, DeviceStatus, LogParser, LogRecord, ServerEvent};

use logdeck_adb::DeviceBackend;

use crate::broadcast::Broadcaster;

/// Pause between stream-open attempts after a drop
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Bound on backend name resolution
pub const NAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Placeholder when name resolution fails or times out
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown device";

/// Device state shared between the registry and the session task.
/// Locked only for short, synchronous critical sections.
pub type SharedDevice = Arc<Mutex<Device>>;

/// Timing knobs, overridable in tests
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub backoff: Duration,
    pub name_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            backoff: RECONNECT_BACKOFF,
            name_timeout: NAME_TIMEOUT,
        }
    }
}

struct RunningLoop {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The live connection/state-machine/streaming-loop bound to one device
pub struct DeviceSession<B> {
    device: SharedDevice,
    backend: B,
    broadcaster: Broadcaster,
    parser: Arc<LogParser>,
    timing: SessionTiming,
    task: AsyncMutex<Option<RunningLoop>>,
}

impl<B> DeviceSession<B>
where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    pub fn new(
        device: Device,
        backend: B,
        broadcaster: Broadcaster,
        parser: Arc<LogParser>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            backend,
            broadcaster,
            parser,
            timing,
            task: AsyncMutex::new(None),
        }
    }

    /// Point-in-time copy of the device state
    pub fn snapshot(&self) -> Device {
        self.device.lock().expect("device lock poisoned").clone()
    }

    /// Mutate the device and broadcast the resulting snapshot
    pub fn update_device(&self, f: impl FnOnce(&mut Device)) -> Device {
        let snapshot = {
            let mut device = self.device.lock().expect("device lock poisoned");
            f(&mut device);
            device.clone()
        };
        self.broadcaster
            .broadcast(ServerEvent::DeviceUpdate(snapshot.clone()));
        snapshot
    }

    /// Start the connection attempt and streaming loop.
    ///
    /// No-op if a loop is already running (connecting or online). On
    /// backend connect failure the loop ends by itself after transitioning
    /// back to offline; no retry is scheduled.
    pub async fn connect(&self) {
        let mut slot = self.task.lock().await;

        if let Some(running) = slot.as_ref() {
            if !running.handle.is_finished() {
                debug!("connect: session already running, ignoring");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let device = Arc::clone(&self.device);
        let backend = self.backend.clone();
        let broadcaster = self.broadcaster.clone();
        let parser = Arc::clone(&self.parser);
        let timing = self.timing;

        let handle = tokio::spawn(async move {
            let mut shutdown_rx = shutdown_rx;
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("session loop cancelled");
                }
                _ = streaming_loop(&device, backend, &broadcaster, parser, timing) => {
                    // Natural end: the initial connect failed
                }
            }
            // Whichever way the loop ended, leave the device offline.
            set_status(&device, &broadcaster, DeviceStatus::Offline);
        });

        *slot = Some(RunningLoop {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Cancel the streaming loop and wait for its teardown.
    ///
    /// After this returns, no further events are emitted for this device
    /// until the next `connect`.
    pub async fn disconnect(&self) {
        let mut slot = self.task.lock().await;

        if let Some(running) = slot.take() {
            // The task may have already finished; both sends can fail benignly.
            let _ = running.shutdown.send(());
            if let Err(e) = running.handle.await {
                error!("session task join failed: {}", e);
            }
        }

        // Release the backend-level connection for network devices
        let (id, connection_type) = {
            let device = self.device.lock().expect("device lock poisoned");
            (device.id.clone(), device.connection_type)
        };
        if connection_type == ConnectionType::Network {
            if let Err(e) = self.backend.disconnect(&id).await {
                debug!("backend disconnect for {} failed: {}", id, e);
            }
        }

        // Covers the case where no loop was running at all
        set_status(&self.device, &self.broadcaster, DeviceStatus::Offline);
    }
}

/// Set the device status; broadcast a `device_update` only on change.
/// Returns the transition's visibility.
fn set_status(device: &SharedDevice, broadcaster: &Broadcaster, status: DeviceStatus) -> bool {
    let snapshot = {
        let mut device = device.lock().expect("device lock poisoned");
        if device.status == status {
            return false;
        }
        device.status = status;
        device.clone()
    };

    trace!("device {} -> {:?}", snapshot.id, status);
    broadcaster.broadcast(ServerEvent::DeviceUpdate(snapshot));
    true
}

/// The session body: initial connect, then the stream-open/read/backoff
/// loop. Cancelled wholesale by the shutdown select in `connect`; every
/// await point in here is a safe cancellation point (dropping a
/// `LogStream` tears down its producer).
async fn streaming_loop<B>(
    device: &SharedDevice,
    backend: B,
    broadcaster: &Broadcaster,
    parser: Arc<LogParser>,
    timing: SessionTiming,
) where
    B: DeviceBackend,
{
    let (id, connection_type) = {
        let device = device.lock().expect("device lock poisoned");
        (device.id.clone(), device.connection_type)
    };

    set_status(device, broadcaster, DeviceStatus::Connecting);

    // Network devices need explicit connectivity; direct (USB) devices are
    // assumed reachable.
    if connection_type == ConnectionType::Network {
        if let Err(e) = backend.connect(&id).await {
            warn!("connect failed for {}: {}", id, e);
            return;
        }
    }

    let name = match timeout(timing.name_timeout, backend.device_name(&id)).await {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            debug!("name resolution failed for {}: {}", id, e);
            UNKNOWN_DEVICE_NAME.to_string()
        }
        Err(_) => {
            warn!("name resolution timed out for {}", id);
            UNKNOWN_DEVICE_NAME.to_string()
        }
    };

    let snapshot = {
        let mut device = device.lock().expect("device lock poisoned");
        device.name = name;
        device.status = DeviceStatus::Online;
        device.last_seen = Some(Utc::now());
        device.clone()
    };
    info!("device {} online as '{}'", id, snapshot.display_name());
    broadcaster.broadcast(ServerEvent::DeviceUpdate(snapshot));

    loop {
        let mut stream = match backend.open_log_stream(&id).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("failed to open log stream for {}: {}", id, e);
                set_status(device, broadcaster, DeviceStatus::Connecting);
                sleep(timing.backoff).await;
                continue;
            }
        };

        // Recovering from a stream drop
        set_status(device, broadcaster, DeviceStatus::Online);

        while let Some(line) = stream.next_line().await {
            if let Some(record) = parser.parse(&line) {
                let record = stamp_record(device, record);
                broadcaster.broadcast(ServerEvent::Log(record));
            }
        }

        info!("log stream for {} ended, retrying in {:?}", id, timing.backoff);
        set_status(device, broadcaster, DeviceStatus::Connecting);
        sleep(timing.backoff).await;
    }
}

/// Stamp device metadata onto a parsed record and update the counters
fn stamp_record(device: &SharedDevice, mut record: LogRecord) -> LogRecord {
    let mut device = device.lock().expect("device lock poisoned");
    record.device_id = Some(device.id.clone());
    record.device_name = Some(device.display_name().to_string());
    record.device_color = Some(device.color.clone());
    device.stats.record(record.level);
    device.last_seen = Some(Utc::now());
    record
}
