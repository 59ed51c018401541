//! Device registry
//!
//! Owns the set of known devices and their sessions, hands out palette
//! colors, and persists membership across restarts. All mutating
//! operations re-save the state file, so a crash never loses more than the
//! in-flight change.
//!
//! The session map lock is a plain mutex held only for map access; session
//! work happens on cloned `Arc`s after the lock is released.
//!
//! ## Public API
//!
//! - [`Registry`] - Device CRUD, lookup, and aggregate stats
//! - [`PersistedDevice`] - On-disk form of a registry entry

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use logdeck_core::prelude::*;
use logdeck_core::{
    normalize_device_id, ConnectionType, Device, LogParser, LogStats, ServerEvent, DEVICE_COLORS,
};

use logdeck_adb::DeviceBackend;

use crate::broadcast::Broadcaster;
use crate::session::{DeviceSession, SessionTiming};

/// What survives a restart: identity and user-assigned naming.
/// Status, stats, and colors are rebuilt at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDevice {
    pub id: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub connection_type: ConnectionType,
}

/// The set of known devices and their sessions
pub struct Registry<B> {
    backend: B,
    broadcaster: Broadcaster,
    parser: Arc<LogParser>,
    timing: SessionTiming,
    sessions: Mutex<HashMap<String, Arc<DeviceSession<B>>>>,
    color_cursor: AtomicUsize,
    state_file: PathBuf,
}

/// Default state file location: `<data dir>/logdeck/devices.json`
pub fn default_state_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logdeck")
        .join("devices.json")
}

impl<B> Registry<B>
where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    pub fn new(
        backend: B,
        broadcaster: Broadcaster,
        parser: Arc<LogParser>,
        timing: SessionTiming,
        state_file: PathBuf,
    ) -> Self {
        Self {
            backend,
            broadcaster,
            parser,
            timing,
            sessions: Mutex::new(HashMap::new()),
            color_cursor: AtomicUsize::new(0),
            state_file,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register a device and immediately attempt to connect it.
    ///
    /// Bare network addresses get the default port appended; direct (USB)
    /// serials are kept verbatim. Re-adding a known id does not create a
    /// duplicate; it just retriggers a connect.
    pub async fn add_device(
        &self,
        raw_id: &str,
        connection_type: ConnectionType,
    ) -> Result<Device> {
        let raw = raw_id.trim();
        let id = match connection_type {
            ConnectionType::Network => normalize_device_id(raw),
            ConnectionType::Direct => raw.to_string(),
        };
        if id.is_empty() || id.starts_with(':') {
            return Err(Error::config(format!("invalid device id: {:?}", raw_id)));
        }

        let (session, created) = self.get_or_insert(&id, connection_type);
        let snapshot = session.snapshot();

        if created {
            info!("device {} added", id);
            self.save();
            self.broadcaster
                .broadcast(ServerEvent::DeviceAdded(snapshot.clone()));
        }

        session.connect().await;
        Ok(snapshot)
    }

    /// Start (or restart) the session for a known device
    pub async fn connect(&self, device_id: &str) -> Result<()> {
        let session = self.lookup(device_id)?;
        session.connect().await;
        Ok(())
    }

    /// Stop the session for a known device; it stays registered
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        let session = self.lookup(device_id)?;
        session.disconnect().await;
        Ok(())
    }

    /// Disconnect and forget a device
    pub async fn remove(&self, device_id: &str) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.lock().expect("session lock poisoned");
            sessions
                .remove(device_id)
                .ok_or_else(|| Error::unknown_device(device_id))?
        };

        session.disconnect().await;
        self.save();

        info!("device {} removed", device_id);
        self.broadcaster.broadcast(ServerEvent::DeviceRemoved {
            id: device_id.to_string(),
        });
        Ok(())
    }

    /// Set or clear the user-assigned name. An empty nickname clears it.
    pub fn set_nickname(&self, device_id: &str, nickname: &str) -> Result<()> {
        let session = self.lookup(device_id)?;

        let nickname = nickname.trim();
        session.update_device(|device| {
            device.nickname = if nickname.is_empty() {
                None
            } else {
                Some(nickname.to_string())
            };
        });

        self.save();
        Ok(())
    }

    /// Zero one device's counters
    pub fn clear_stats(&self, device_id: &str) -> Result<()> {
        let session = self.lookup(device_id)?;
        session.update_device(|device| device.stats.reset());
        Ok(())
    }

    /// Snapshot of every registered device, ordered by id
    pub fn device_list(&self) -> Vec<Device> {
        let sessions = self.sessions.lock().expect("session lock poisoned");
        let mut devices: Vec<Device> = sessions.values().map(|s| s.snapshot()).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Counters summed across all registered devices
    pub fn aggregate_stats(&self) -> LogStats {
        let mut total = LogStats::default();
        for device in self.device_list() {
            let stats = device.stats;
            total.verbose += stats.verbose;
            total.debug += stats.debug;
            total.info += stats.info;
            total.warning += stats.warning;
            total.error += stats.error;
            total.fatal += stats.fatal;
            total.total += stats.total;
        }
        total
    }

    /// Load the persisted membership and start connection attempts for
    /// every restored device. Called once at startup, before observers
    /// can connect.
    pub async fn restore(&self) {
        let persisted = load_state_file(&self.state_file);
        if persisted.is_empty() {
            return;
        }

        info!("restoring {} persisted device(s)", persisted.len());
        for entry in persisted {
            let (session, _) = self.get_or_insert(&entry.id, entry.connection_type);
            if let Some(nickname) = entry.nickname {
                session.update_device(|device| device.nickname = Some(nickname));
            }
            session.connect().await;
        }
    }

    fn lookup(&self, device_id: &str) -> Result<Arc<DeviceSession<B>>> {
        let sessions = self.sessions.lock().expect("session lock poisoned");
        sessions
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::unknown_device(device_id))
    }

    fn get_or_insert(
        &self,
        id: &str,
        connection_type: ConnectionType,
    ) -> (Arc<DeviceSession<B>>, bool) {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        if let Some(session) = sessions.get(id) {
            return (Arc::clone(session), false);
        }

        let color = self.next_color();
        let device = Device::new(id, connection_type, color);
        let session = Arc::new(DeviceSession::new(
            device,
            self.backend.clone(),
            self.broadcaster.clone(),
            Arc::clone(&self.parser),
            self.timing,
        ));
        sessions.insert(id.to_string(), Arc::clone(&session));
        (session, true)
    }

    fn next_color(&self) -> &'static str {
        let index = self.color_cursor.fetch_add(1, Ordering::Relaxed);
        DEVICE_COLORS[index % DEVICE_COLORS.len()]
    }

    /// Write the current membership to the state file. Best-effort: a
    /// write failure is logged, not surfaced, since the in-memory registry
    /// stays authoritative.
    fn save(&self) {
        let entries: Vec<PersistedDevice> = {
            let sessions = self.sessions.lock().expect("session lock poisoned");
            let mut entries: Vec<PersistedDevice> = sessions
                .values()
                .map(|session| {
                    let device = session.snapshot();
                    PersistedDevice {
                        id: device.id,
                        nickname: device.nickname,
                        connection_type: device.connection_type,
                    }
                })
                .collect();
            entries.sort_by(|a, b| a.id.cmp(&b.id));
            entries
        };

        if let Err(e) = write_state_file(&self.state_file, &entries) {
            warn!("failed to persist device registry: {}", e);
        }
    }
}

/// Read the state file, tolerating absence and corruption: both yield an
/// empty registry rather than a startup failure.
fn load_state_file(path: &Path) -> Vec<PersistedDevice> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_str(&contents) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("ignoring corrupt state file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

fn write_state_file(path: &Path, entries: &[PersistedDevice]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use logdeck_adb::{FakeBackend, ScriptedStream};
    use logdeck_core::DeviceStatus;
    use tempfile::TempDir;

    fn test_registry(backend: FakeBackend, dir: &TempDir) -> (Registry<FakeBackend>, Broadcaster) {
        let broadcaster = Broadcaster::new();
        let registry = Registry::new(
            backend,
            broadcaster.clone(),
            Arc::new(LogParser::new()),
            SessionTiming::default(),
            dir.path().join("devices.json"),
        );
        (registry, broadcaster)
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_device_normalizes_and_persists() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.push_stream(ScriptedStream::staying_open(vec![]));

        let (registry, broadcaster) = test_registry(backend.clone(), &dir);
        let (_id, mut rx) = broadcaster.add_observer();

        let device = registry.add_device("10.0.0.5", ConnectionType::Network).await.unwrap();
        assert_eq!(device.id, "10.0.0.5:5555");
        assert_eq!(device.connection_type, ConnectionType::Network);

        // device_added precedes any session transition
        match rx.recv().await.unwrap() {
            ServerEvent::DeviceAdded(d) => assert_eq!(d.id, "10.0.0.5:5555"),
            other => panic!("unexpected event: {:?}", other),
        }

        let persisted = load_state_file(&dir.path().join("devices.json"));
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, "10.0.0.5:5555");

        registry.disconnect("10.0.0.5:5555").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_device_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.push_stream(ScriptedStream::staying_open(vec![]));

        let (registry, _broadcaster) = test_registry(backend.clone(), &dir);

        registry.add_device("10.0.0.5", ConnectionType::Network).await.unwrap();
        registry.add_device("10.0.0.5:5555", ConnectionType::Network).await.unwrap();

        // Let the spawned session task reach its backend connect
        tokio::task::yield_now().await;

        assert_eq!(registry.device_list().len(), 1);
        // The second add hit the already-running session
        assert_eq!(backend.connect_attempts(), 1);

        registry.disconnect("10.0.0.5:5555").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_direct_device_keeps_serial() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.set_device_name("Pixel 8");
        backend.push_stream(ScriptedStream::staying_open(vec![]));

        let (registry, _broadcaster) = test_registry(backend.clone(), &dir);

        let device = registry
            .add_device("2B0YC1GF7G", ConnectionType::Direct)
            .await
            .unwrap();

        // A USB serial is not an address: no port suffix, no network typing
        assert_eq!(device.id, "2B0YC1GF7G");
        assert_eq!(device.connection_type, ConnectionType::Direct);

        // The connection type survives a restart
        let persisted = load_state_file(&dir.path().join("devices.json"));
        assert_eq!(persisted[0].id, "2B0YC1GF7G");
        assert_eq!(persisted[0].connection_type, ConnectionType::Direct);

        // Direct devices never go through backend connect
        assert_eq!(backend.connect_attempts(), 0);

        registry.disconnect("2B0YC1GF7G").await.unwrap();
    }

    #[tokio::test]
    async fn test_add_device_rejects_empty_id() {
        let dir = TempDir::new().unwrap();
        let (registry, _) = test_registry(FakeBackend::new(), &dir);

        assert!(registry.add_device("", ConnectionType::Network).await.is_err());
        assert!(registry.add_device("   ", ConnectionType::Network).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_colors_assigned_round_robin() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.fail_next_connects(16);

        let (registry, _) = test_registry(backend, &dir);

        let a = registry.add_device("10.0.0.1", ConnectionType::Network).await.unwrap();
        let b = registry.add_device("10.0.0.2", ConnectionType::Network).await.unwrap();
        let c = registry.add_device("10.0.0.3", ConnectionType::Network).await.unwrap();

        assert_eq!(a.color, DEVICE_COLORS[0]);
        assert_eq!(b.color, DEVICE_COLORS[1]);
        assert_eq!(c.color, DEVICE_COLORS[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_broadcasts_and_persists() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.push_stream(ScriptedStream::staying_open(vec![]));

        let (registry, broadcaster) = test_registry(backend, &dir);
        registry.add_device("10.0.0.5", ConnectionType::Network).await.unwrap();

        let (_id, mut rx) = broadcaster.add_observer();
        registry.remove("10.0.0.5:5555").await.unwrap();

        // The offline transition from teardown may arrive first
        loop {
            match rx.recv().await.unwrap() {
                ServerEvent::DeviceRemoved { id } => {
                    assert_eq!(id, "10.0.0.5:5555");
                    break;
                }
                ServerEvent::DeviceUpdate(_) => continue,
                other => panic!("unexpected event: {:?}", other),
            }
        }

        assert!(registry.device_list().is_empty());
        assert!(load_state_file(&dir.path().join("devices.json")).is_empty());
    }

    #[tokio::test]
    async fn test_operations_on_unknown_device_fail() {
        let dir = TempDir::new().unwrap();
        let (registry, _) = test_registry(FakeBackend::new(), &dir);

        assert!(matches!(
            registry.connect("nope").await,
            Err(Error::UnknownDevice { .. })
        ));
        assert!(matches!(
            registry.remove("nope").await,
            Err(Error::UnknownDevice { .. })
        ));
        assert!(matches!(
            registry.set_nickname("nope", "x"),
            Err(Error::UnknownDevice { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nickname_set_clear_and_persist() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.fail_next_connects(1);

        let (registry, _) = test_registry(backend, &dir);
        registry.add_device("10.0.0.5", ConnectionType::Network).await.unwrap();

        registry.set_nickname("10.0.0.5:5555", "Left rig").unwrap();
        let persisted = load_state_file(&dir.path().join("devices.json"));
        assert_eq!(persisted[0].nickname.as_deref(), Some("Left rig"));

        // Empty clears
        registry.set_nickname("10.0.0.5:5555", "  ").unwrap();
        assert!(registry.device_list()[0].nickname.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_rebuilds_membership() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("devices.json");

        let entries = vec![
            PersistedDevice {
                id: "10.0.0.5:5555".to_string(),
                nickname: Some("Left rig".to_string()),
                connection_type: ConnectionType::Network,
            },
            PersistedDevice {
                id: "10.0.0.6:5555".to_string(),
                nickname: None,
                connection_type: ConnectionType::Network,
            },
        ];
        write_state_file(&state, &entries).unwrap();

        let backend = FakeBackend::new();
        backend.fail_next_connects(2);

        let broadcaster = Broadcaster::new();
        let registry = Registry::new(
            backend.clone(),
            broadcaster,
            Arc::new(LogParser::new()),
            SessionTiming::default(),
            state,
        );
        registry.restore().await;

        // Let the spawned session tasks reach their backend connects
        tokio::task::yield_now().await;

        let devices = registry.device_list();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].nickname.as_deref(), Some("Left rig"));
        // Reconnection was attempted for each restored device
        assert_eq!(backend.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_state_file_yields_empty_registry() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("devices.json");
        std::fs::write(&state, "{not json!").unwrap();

        assert!(load_state_file(&state).is_empty());
    }

    #[tokio::test]
    async fn test_missing_state_file_yields_empty_registry() {
        let dir = TempDir::new().unwrap();
        assert!(load_state_file(&dir.path().join("devices.json")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_stats_sums_devices() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.set_device_name("Quest 3");
        backend.push_stream(ScriptedStream::staying_open(vec![
            "01-15 10:23:45.123  1  2 E Unity   : boom".to_string(),
            "01-15 10:23:45.124  1  2 I Unity   : ok".to_string(),
        ]));
        backend.push_stream(ScriptedStream::staying_open(vec![
            "01-15 10:23:45.125  1  2 E Unity   : boom again".to_string(),
        ]));

        let (registry, broadcaster) = test_registry(backend, &dir);
        let (_id, mut rx) = broadcaster.add_observer();

        registry.add_device("10.0.0.5", ConnectionType::Network).await.unwrap();
        registry.add_device("10.0.0.6", ConnectionType::Network).await.unwrap();

        // Wait until all three lines have been counted
        let mut logs = 0;
        while logs < 3 {
            if let Some(ServerEvent::Log(_)) = rx.recv().await {
                logs += 1;
            }
        }

        let stats = registry.aggregate_stats();
        assert_eq!(stats.error, 2);
        assert_eq!(stats.info, 1);
        assert_eq!(stats.total, 3);

        registry.disconnect("10.0.0.5:5555").await.unwrap();
        registry.disconnect("10.0.0.6:5555").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_stats_zeroes_one_device() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::new();
        backend.set_device_name("Quest 3");
        backend.push_stream(ScriptedStream::staying_open(vec![
            "01-15 10:23:45.123  1  2 W Unity   : careful".to_string(),
        ]));

        let (registry, broadcaster) = test_registry(backend, &dir);
        let (_id, mut rx) = broadcaster.add_observer();

        registry.add_device("10.0.0.5", ConnectionType::Network).await.unwrap();
        loop {
            if let Some(ServerEvent::Log(_)) = rx.recv().await {
                break;
            }
        }

        registry.clear_stats("10.0.0.5:5555").unwrap();
        let devices = registry.device_list();
        assert_eq!(devices[0].stats, LogStats::default());
        // Still registered and online
        assert_eq!(devices[0].status, DeviceStatus::Online);

        registry.disconnect("10.0.0.5:5555").await.unwrap();
    }
}
