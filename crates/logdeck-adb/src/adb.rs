//! adb command execution and output parsing
//!
//! [`AdbBackend`] is the production [`DeviceBackend`]: every capability is
//! an `adb` invocation with a bounded timeout and tolerant output parsing.
//! adb is famously loose with exit codes (`adb connect` exits 0 on failure),
//! so success is judged from stdout where necessary.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use logdeck_core::prelude::*;
use logdeck_core::UsbDevice;

use crate::backend::{DeviceBackend, LogStream};
use crate::logcat::spawn_logcat;

/// Timeout for adb connect (TCP handshake against a possibly-dead host)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for name resolution and other short shell commands
const SHELL_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for device enumeration
const DEVICES_TIMEOUT: Duration = Duration::from_secs(10);

/// Production backend shelling out to `adb`
#[derive(Debug, Clone)]
pub struct AdbBackend {
    /// logcat filterspec arguments, e.g. `["Unity:V", "*:S"]`
    logcat_filter: Vec<String>,
}

impl AdbBackend {
    /// Create a backend with a logcat filterspec (whitespace-separated,
    /// e.g. `"Unity:V *:S"`). An empty spec streams everything.
    pub fn new(logcat_filter: impl Into<String>) -> Self {
        Self {
            logcat_filter: logcat_filter
                .into()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl DeviceBackend for AdbBackend {
    async fn connect(&self, addr: &str) -> Result<()> {
        let output = run_adb(&["connect", addr], CONNECT_TIMEOUT).await?;

        // adb connect exits 0 even when the host refused; stdout is the truth.
        // Success lines: "connected to X" / "already connected to X"
        if output.stdout.contains("connected to") {
            Ok(())
        } else {
            Err(Error::connect_failed(addr, output.stdout.trim()))
        }
    }

    async fn disconnect(&self, addr: &str) -> Result<()> {
        // "error: no such device" just means we were already disconnected
        let _ = run_adb(&["disconnect", addr], CONNECT_TIMEOUT).await?;
        Ok(())
    }

    async fn device_name(&self, id: &str) -> Result<String> {
        let output = run_adb(
            &["-s", id, "shell", "getprop", "ro.product.model"],
            SHELL_TIMEOUT,
        )
        .await?;

        let name = output.stdout.trim();
        if name.is_empty() {
            Err(Error::backend(format!("empty model name for {}", id)))
        } else {
            Ok(name.to_string())
        }
    }

    async fn list_usb_devices(&self) -> Result<Vec<UsbDevice>> {
        let output = run_adb(&["devices", "-l"], DEVICES_TIMEOUT).await?;
        Ok(parse_devices_output(&output.stdout))
    }

    async fn enable_wifi(&self, serial: &str, port: u16) -> Result<String> {
        let port_arg = port.to_string();
        let output = run_adb(&["-s", serial, "tcpip", &port_arg], SHELL_TIMEOUT).await?;
        if !output.stdout.contains("restarting in TCP mode") && !output.status_success {
            return Err(Error::backend(format!(
                "tcpip failed for {}: {}",
                serial,
                output.stdout.trim()
            )));
        }

        let route = run_adb(&["-s", serial, "shell", "ip", "route"], SHELL_TIMEOUT).await?;
        let ip = parse_wlan_address(&route.stdout)
            .ok_or_else(|| Error::backend(format!("no wlan address found for {}", serial)))?;

        Ok(format!("{}:{}", ip, port))
    }

    async fn open_log_stream(&self, id: &str) -> Result<LogStream> {
        spawn_logcat(id, &self.logcat_filter)
    }
}

struct AdbOutput {
    stdout: String,
    #[allow(dead_code)]
    stderr: String,
    status_success: bool,
}

/// Run an adb command with a timeout, capturing output.
async fn run_adb(args: &[&str], timeout_duration: Duration) -> Result<AdbOutput> {
    debug!("Running: adb {}", args.join(" "));

    let future = Command::new("adb")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = timeout(timeout_duration, future)
        .await
        .map_err(|_| Error::backend_timeout(format!("adb {}", args.join(" "))))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::AdbNotFound
            } else {
                Error::backend(format!("failed to run adb: {}", e))
            }
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    trace!("adb stdout: {}", stdout);
    if !stderr.is_empty() {
        trace!("adb stderr: {}", stderr);
    }

    Ok(AdbOutput {
        stdout,
        stderr,
        status_success: output.status.success(),
    })
}

/// Parse `adb devices -l` output into directly-attached devices.
///
/// Network endpoints (serials of the form `host:port`) are excluded; those
/// belong to the registry, not to USB enumeration.
fn parse_devices_output(output: &str) -> Vec<UsbDevice> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<UsbDevice> {
    let mut parts = line.split_whitespace();
    let serial = parts.next()?;
    let state = parts.next()?;

    if serial.contains(':') {
        return None; // network endpoint, not USB
    }

    let model = parts
        .find_map(|token| token.strip_prefix("model:"))
        .map(str::to_string);

    Some(UsbDevice {
        serial: serial.to_string(),
        model,
        state: state.to_string(),
    })
}

/// Extract the device's WLAN address from `ip route` output.
///
/// Looks for the `src` address on a `wlan` interface line, e.g.
/// `192.168.1.0/24 dev wlan0 proto kernel scope link src 192.168.1.42`.
fn parse_wlan_address(output: &str) -> Option<String> {
    for line in output.lines() {
        if !line.contains("wlan") {
            continue;
        }
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "src" {
                if let Some(addr) = tokens.next() {
                    return Some(addr.to_string());
                }
            }
        }
    }
    None
}
