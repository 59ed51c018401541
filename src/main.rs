//! logdeck - multi-device logcat aggregation server
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use logdeck_adb::AdbBackend;
use logdeck_core::prelude::*;
use logdeck_core::{logging, LogParser};
use logdeck_server::{
    default_state_file, Broadcaster, Dispatcher, Registry, ScanConfig, Server, SessionTiming,
};

/// Default observer listen address
const DEFAULT_BIND: &str = "0.0.0.0:8765";

/// Default logcat filterspec: Unity output only
const DEFAULT_LOGCAT_FILTER: &str = "Unity:V *:S";

/// logdeck - multi-device logcat aggregation server
#[derive(Parser, Debug)]
#[command(name = "logdeck")]
#[command(about = "Aggregates logcat streams from many devices over one WebSocket", long_about = None)]
struct Args {
    /// Observer listen address
    #[arg(long, default_value = DEFAULT_BIND, value_name = "ADDR")]
    bind: String,

    /// logcat filterspec passed to every device stream
    #[arg(long, default_value = DEFAULT_LOGCAT_FILTER, value_name = "FILTER")]
    logcat_filter: String,

    /// Device registry state file (defaults to the platform data directory)
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Local IPv4 used to derive the scan subnet (auto-detected by default)
    #[arg(long, value_name = "ADDR")]
    local_addr: Option<String>,
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    logging::init()?;

    let state_file = args.state_file.unwrap_or_else(default_state_file);
    info!("device registry state file: {}", state_file.display());

    let backend = AdbBackend::new(args.logcat_filter.as_str());
    let broadcaster = Broadcaster::new();
    let parser = Arc::new(LogParser::new());

    let registry = Arc::new(Registry::new(
        backend,
        broadcaster.clone(),
        parser,
        SessionTiming::default(),
        state_file,
    ));
    registry.restore().await;

    let scan_config = ScanConfig {
        local_addr: args.local_addr,
        ..ScanConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(registry, broadcaster.clone(), scan_config));

    let server = Server::bind(&args.bind, dispatcher, broadcaster).await?;
    eprintln!("logdeck listening on ws://{}", server.local_addr()?);

    server.run().await?;
    Ok(())
}
