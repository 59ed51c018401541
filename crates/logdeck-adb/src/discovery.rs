//! Network discovery
//!
//! Probes the local /24 subnet for devices accepting connections on the
//! device port. A probe that completes the TCP handshake counts as found;
//! refusal or timeout counts as not found. The scan runs as its own task
//! and never touches session state.

use std::net::Ipv4Addr;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use logdeck_core::prelude::*;

/// Per-probe connect timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Concurrent probes in flight
const PROBE_CONCURRENCY: usize = 128;

/// Result of a subnet scan
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The subnet that was probed, e.g. `10.0.0.0/24`
    pub subnet: String,

    /// Reachable `host:port` addresses, ordered by host
    pub devices: Vec<String>,
}

/// Derive the /24 subnet label and its 254 candidate hosts from a local
/// address. Returns `None` if the address is not a dotted IPv4 quad.
pub fn subnet_candidates(local_addr: &str) -> Option<(String, Vec<Ipv4Addr>)> {
    let ip: Ipv4Addr = local_addr.trim().parse().ok()?;
    let [a, b, c, _] = ip.octets();

    let subnet = format!("{}.{}.{}.0/24", a, b, c);
    let hosts = (1..=254).map(|d| Ipv4Addr::new(a, b, c, d)).collect();

    Some((subnet, hosts))
}

/// Scan the local /24 for hosts accepting connections on `port`.
///
/// All 254 probes run concurrently with a bounded per-probe timeout, so a
/// full scan completes in roughly one timeout interval.
pub async fn scan(local_addr: &str, port: u16, probe_timeout: Duration) -> Result<ScanOutcome> {
    let (subnet, hosts) = subnet_candidates(local_addr)
        .ok_or_else(|| Error::config(format!("not an IPv4 address: {}", local_addr)))?;

    info!("Scanning {} on port {}", subnet, port);

    let mut found: Vec<Ipv4Addr> = stream::iter(hosts)
        .map(|host| async move {
            probe(host, port, probe_timeout).await.then_some(host)
        })
        .buffer_unordered(PROBE_CONCURRENCY)
        .filter_map(|result| async move { result })
        .collect()
        .await;

    found.sort();

    let devices: Vec<String> = found
        .into_iter()
        .map(|host| format!("{}:{}", host, port))
        .collect();

    info!("Scan of {} complete: {} device(s) found", subnet, devices.len());

    Ok(ScanOutcome { subnet, devices })
}

/// One TCP connect probe. Any successful handshake counts, regardless of
/// what is listening; an unreachable host is simply "not found".
async fn probe(host: Ipv4Addr, port: u16, probe_timeout: Duration) -> bool {
    matches!(
        timeout(probe_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Best-effort detection of the machine's outbound IPv4 address.
///
/// Connecting a UDP socket sends no packets; it only asks the kernel which
/// source address it would route from.
pub fn local_ipv4() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_subnet_candidates() {
        let (subnet, hosts) = subnet_candidates("10.0.0.17").unwrap();

        assert_eq!(subnet, "10.0.0.0/24");
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(10, 0, 0, 254));
    }

    #[test]
    fn test_subnet_candidates_invalid() {
        assert!(subnet_candidates("not-an-ip").is_none());
        assert!(subnet_candidates("fe80::1").is_none());
        assert!(subnet_candidates("10.0.0").is_none());
    }

    #[tokio::test]
    async fn test_scan_finds_single_listener() {
        // The whole 127.0.0.0/8 block is loopback on Linux, so binding one
        // specific address makes exactly that host reachable.
        let listener = TcpListener::bind("127.0.0.5:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = scan("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();

        assert_eq!(outcome.subnet, "127.0.0.0/24");
        assert_eq!(outcome.devices, vec![format!("127.0.0.5:{}", port)]);
    }

    #[tokio::test]
    async fn test_scan_unreachable_hosts_are_not_errors() {
        // Nothing listens on this port anywhere in the subnet
        let outcome = scan("127.0.0.1", 1, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(outcome.devices.is_empty());
    }

    #[tokio::test]
    async fn test_scan_invalid_local_address() {
        let result = scan("bogus", 5555, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
