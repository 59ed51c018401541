//! Command dispatch
//!
//! Maps one inbound [`Command`] to registry/backend operations. Lifecycle
//! commands mutate shared state and answer through broadcast events; query
//! commands reply directly to the requesting observer.
//!
//! Command failures never produce an error reply on the wire. A command
//! naming an unknown device, or a backend refusal, is logged and dropped;
//! observers learn about state only through the event stream.

use std::sync::Arc;
use std::time::Duration;

use logdeck_core::prelude::*;
use logdeck_core::{Command, ConnectionType, ScanState, ServerEvent, DEFAULT_DEVICE_PORT};

use logdeck_adb::{local_ipv4, scan, subnet_candidates, DeviceBackend, DEFAULT_PROBE_TIMEOUT};

use crate::broadcast::{Broadcaster, ObserverId};
use crate::registry::Registry;

/// Discovery parameters, fixed at startup
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Local IPv4 override; auto-detected when `None`
    pub local_addr: Option<String>,
    /// Port probed on each candidate host
    pub port: u16,
    pub probe_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            local_addr: None,
            port: DEFAULT_DEVICE_PORT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Routes observer commands to the registry and backend
pub struct Dispatcher<B> {
    registry: Arc<Registry<B>>,
    broadcaster: Broadcaster,
    scan_config: ScanConfig,
}

impl<B> Dispatcher<B>
where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    pub fn new(
        registry: Arc<Registry<B>>,
        broadcaster: Broadcaster,
        scan_config: ScanConfig,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            scan_config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry<B>> {
        &self.registry
    }

    /// Handle one command on behalf of `observer`
    pub async fn handle(&self, observer: ObserverId, command: Command) {
        debug!("observer {}: {:?}", observer, command);

        match command {
            Command::Scan => self.spawn_scan(observer),

            Command::AddDevice {
                device_id,
                connection_type,
            } => {
                let connection_type = connection_type.unwrap_or(ConnectionType::Network);
                if let Err(e) = self.registry.add_device(&device_id, connection_type).await {
                    warn!("add_device {:?} failed: {}", device_id, e);
                }
            }

            Command::Connect { device_id } => {
                if let Err(e) = self.registry.connect(&device_id).await {
                    warn!("connect {} failed: {}", device_id, e);
                }
            }

            Command::Disconnect { device_id } => {
                if let Err(e) = self.registry.disconnect(&device_id).await {
                    warn!("disconnect {} failed: {}", device_id, e);
                }
            }

            Command::Remove { device_id } => {
                if let Err(e) = self.registry.remove(&device_id).await {
                    warn!("remove {} failed: {}", device_id, e);
                }
            }

            Command::SetNickname {
                device_id,
                nickname,
            } => {
                if let Err(e) = self.registry.set_nickname(&device_id, &nickname) {
                    warn!("set_nickname {} failed: {}", device_id, e);
                }
            }

            Command::ClearStats { device_id } => {
                if let Err(e) = self.registry.clear_stats(&device_id) {
                    warn!("clear_stats {} failed: {}", device_id, e);
                }
            }

            Command::GetUsbDevices => {
                let devices = match self.registry.backend().list_usb_devices().await {
                    Ok(devices) => devices,
                    Err(e) => {
                        warn!("usb enumeration failed: {}", e);
                        Vec::new()
                    }
                };
                self.broadcaster
                    .send_to(observer, ServerEvent::UsbDevices(devices));
            }

            Command::EnableWifi { device_id } => {
                let event = self.enable_wifi(&device_id).await;
                self.broadcaster.send_to(observer, event);
            }

            Command::GetStats => {
                self.broadcaster
                    .send_to(observer, ServerEvent::Stats(self.registry.aggregate_stats()));
            }

            Command::GetDevices => {
                self.broadcaster
                    .send_to(observer, ServerEvent::DeviceList(self.registry.device_list()));
            }
        }
    }

    /// Promote a directly-attached device to network mode, then register
    /// the resulting network address like any other added device.
    async fn enable_wifi(&self, serial: &str) -> ServerEvent {
        match self
            .registry
            .backend()
            .enable_wifi(serial, DEFAULT_DEVICE_PORT)
            .await
        {
            Ok(addr) => {
                info!("device {} promoted to network mode at {}", serial, addr);
                if let Err(e) = self.registry.add_device(&addr, ConnectionType::Network).await {
                    warn!("registering promoted device {} failed: {}", addr, e);
                }
                ServerEvent::WifiEnabled {
                    device_id: serial.to_string(),
                    success: true,
                    ip: Some(addr),
                    error: None,
                }
            }
            Err(e) => {
                warn!("wifi promotion for {} failed: {}", serial, e);
                ServerEvent::WifiEnabled {
                    device_id: serial.to_string(),
                    success: false,
                    ip: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run discovery as an independent task so a slow scan never stalls
    /// command processing. Results are broadcast, not replied, so every
    /// observer sees the same scan lifecycle.
    fn spawn_scan(&self, observer: ObserverId) {
        let broadcaster = self.broadcaster.clone();
        let config = self.scan_config.clone();

        tokio::spawn(async move {
            let local_addr = match config.local_addr.or_else(local_ipv4) {
                Some(addr) => addr,
                None => {
                    warn!("scan requested but no local IPv4 address detected");
                    broadcaster.send_to(
                        observer,
                        ServerEvent::ScanResult {
                            devices: Vec::new(),
                        },
                    );
                    return;
                }
            };

            let subnet = match subnet_candidates(&local_addr) {
                Some((subnet, _)) => subnet,
                None => {
                    warn!("scan requested with invalid local address {:?}", local_addr);
                    broadcaster.send_to(
                        observer,
                        ServerEvent::ScanResult {
                            devices: Vec::new(),
                        },
                    );
                    return;
                }
            };

            broadcaster.broadcast(ServerEvent::ScanStatus {
                status: ScanState::Started,
                subnet: subnet.clone(),
            });

            let devices = match scan(&local_addr, config.port, config.probe_timeout).await {
                Ok(outcome) => outcome.devices,
                Err(e) => {
                    warn!("scan failed: {}", e);
                    Vec::new()
                }
            };

            broadcaster.broadcast(ServerEvent::ScanResult { devices });
            broadcaster.broadcast(ServerEvent::ScanStatus {
                status: ScanState::Complete,
                subnet,
            });
        });
    }
}
