//! txclient - robot vision client daemon
//!
//! Connects to the robot's table broker, opens the configured cameras, and
//! runs the mode loop until the connection drops or a signal arrives.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::Ordering;

use tx_vision::config::ClientConfig;
use tx_vision::stream::{MjpegServer, StreamConfig};
use tx_vision::table::{MqttTable, TableChannel};
use tx_vision::VisionClient;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, env = "TXVISION_CONFIG")]
    config: Option<String>,
    /// Table broker address, host:port.
    #[arg(long, env = "TXVISION_TABLE_SERVER")]
    server: Option<String>,
    /// Left camera identifier (stub://…, /dev/videoN, index, or pipeline).
    #[arg(long, env = "TXVISION_LEFT_CAMERA")]
    left_camera: Option<String>,
    /// Right camera identifier.
    #[arg(long, env = "TXVISION_RIGHT_CAMERA")]
    right_camera: Option<String>,
    /// Disable the MJPEG dashboard stream.
    #[arg(long)]
    no_stream: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // `--config` reuses the env-var path so ClientConfig::load sees it.
    if let Some(path) = &args.config {
        std::env::set_var("TXVISION_CONFIG", path);
    }
    let mut cfg = ClientConfig::load().context("load client configuration")?;
    if let Some(server) = args.server {
        cfg.table.server = server;
    }
    if let Some(left) = args.left_camera {
        cfg.left_camera = tx_vision::config::expand_platform_alias(&left);
    }
    if let Some(right) = args.right_camera {
        cfg.right_camera = tx_vision::config::expand_platform_alias(&right);
    }

    let mut table = MqttTable::open(&cfg.table).context("open table channel")?;
    table
        .wait_connected(cfg.table.connect_timeout)
        .context("connect to table broker")?;
    log::info!("table: connected to {}", cfg.table.server);

    let stream = if cfg.stream.enabled && !args.no_stream {
        let handle = MjpegServer::new(StreamConfig {
            addr: cfg.stream.addr.clone(),
            quality: cfg.stream.quality,
        })
        .spawn()
        .context("start mjpeg stream")?;
        Some(handle)
    } else {
        None
    };

    let mut client = VisionClient::new(table, &cfg, stream);
    let running = client.shutdown_flag();
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("install signal handler")?;

    client.run();
    Ok(())
}
