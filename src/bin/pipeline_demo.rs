//! pipeline_demo - run the vision loop offline
//!
//! Drives the mode loop against an in-process table and synthetic cameras,
//! then prints what would have been published. Useful for tuning thresholds
//! without a broker or hardware.

use anyhow::Result;
use clap::Parser;

use tx_vision::config::{CameraSettings, ClientConfig, StreamSettings, TableSettings};
use tx_vision::pipeline::DetectParams;
use tx_vision::table::{LocalTable, TableChannel, TableValue};
use tx_vision::VisionClient;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Synthetic scene for the left camera.
    #[arg(long, default_value = "stub://moving")]
    scene: String,
    /// Mode flag to run under (0=test, 1=single, 2=dual, 3=stream).
    #[arg(long, default_value_t = 1.0)]
    mode: f64,
    /// Number of loop iterations.
    #[arg(long, default_value_t = 30)]
    iterations: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = ClientConfig {
        table: TableSettings {
            server: "local".to_string(),
            topic_prefix: "SmartDashboard".to_string(),
            client_id: "demo".to_string(),
            connect_timeout: std::time::Duration::from_secs(1),
        },
        left_camera: args.scene.clone(),
        right_camera: "stub://empty".to_string(),
        camera: CameraSettings::default(),
        params: DetectParams::default(),
        tracking: false,
        stream: StreamSettings {
            addr: "127.0.0.1:0".to_string(),
            quality: 75,
            enabled: false,
        },
    };

    let mut table = LocalTable::new();
    table.put_number("Mode", args.mode);
    table.put_bool("Enabled", true);

    let mut client = VisionClient::new(table, &cfg, None);
    for i in 0..args.iterations {
        client.step();
        let direction = client.table().raw("Direction").cloned();
        let distance = client.table().raw("Camera Distance").cloned();
        match (direction, distance) {
            (Some(TableValue::Number(dir)), Some(TableValue::Number(dist))) => {
                println!("iter {:3}: direction {:7.2} deg  distance {:7.2}", i, dir, dist);
            }
            _ => println!("iter {:3}: no target", i),
        }
    }
    Ok(())
}
