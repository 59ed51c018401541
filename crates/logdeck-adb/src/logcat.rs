//! logcat child process management
//!
//! Spawns `adb logcat` for one device and exposes its output as a
//! [`LogStream`]. The child is owned by a dedicated wait task; the reader
//! task forwards decoded lines until EOF. Stopping the stream signals the
//! wait task, which kills the child and reaps it.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use logdeck_core::prelude::*;

use crate::backend::LogStream;

/// Line channel depth. A full channel applies backpressure to the reader,
/// never to the device.
const LINE_BUFFER: usize = 256;

/// Spawn `adb -s <id> logcat -v threadtime <filter...>` and wire its stdout
/// into a [`LogStream`].
pub fn spawn_logcat(device_id: &str, filter_args: &[String]) -> Result<LogStream> {
    let mut args = vec![
        "-s".to_string(),
        device_id.to_string(),
        "logcat".to_string(),
        "-v".to_string(),
        "threadtime".to_string(),
    ];
    args.extend_from_slice(filter_args);

    info!("Spawning logcat: adb {}", args.join(" "));

    let mut child = Command::new("adb")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true) // Critical: cleanup on drop
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::AdbNotFound
            } else {
                Error::ProcessSpawn {
                    reason: e.to_string(),
                }
            }
        })?;

    debug!("logcat for {} started with PID {:?}", device_id, child.id());

    let stdout = child.stdout.take().expect("stdout was configured");
    let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(stdout_reader(stdout, line_tx));

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(wait_for_exit(child, stop_rx, device_id.to_string()));

    Ok(LogStream::new(line_rx, stop_tx))
}

/// Read raw lines from the logcat stdout and forward them decoded.
///
/// Decoding is lossy: malformed bytes become U+FFFD instead of killing the
/// stream. The parser downstream only ever sees valid strings.
async fn stdout_reader(stdout: ChildStdout, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break, // EOF: process exited or pipe closed
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    debug!("line channel closed, stopping logcat reader");
                    break;
                }
            }
            Err(e) => {
                warn!("logcat read error: {}", e);
                break;
            }
        }
    }

    debug!("logcat stdout reader finished");
}

/// Background task: owns the child, waits for it to exit.
///
/// Two ways out: the process exits naturally (EOF already ended the reader),
/// or the stop signal fires and we kill the child before reaping it.
async fn wait_for_exit(mut child: Child, stop_rx: oneshot::Receiver<()>, device_id: String) {
    tokio::select! {
        result = child.wait() => match result {
            Ok(status) => info!("logcat for {} exited with status {:?}", device_id, status),
            Err(e) => error!("error waiting for logcat ({}): {}", device_id, e),
        },
        _ = stop_rx => {
            debug!("stop signal received, killing logcat for {}", device_id);
            if let Err(e) = child.kill().await {
                error!("failed to kill logcat for {}: {}", device_id, e);
            }
            let _ = child.wait().await;
        }
    }
}
