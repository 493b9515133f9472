//! Client configuration.
//!
//! Loaded from a TOML file named by `TXVISION_CONFIG`, then overridden by
//! individual environment variables, then validated. Every field has a
//! default so a bare environment boots against a local broker with stub
//! cameras.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::VisionError;
use crate::pipeline::{ContourFilter, DetectParams, HsvRange, Reduction};

const DEFAULT_TABLE_SERVER: &str = "127.0.0.1:1883";
const DEFAULT_TOPIC_PREFIX: &str = "SmartDashboard";
const DEFAULT_CLIENT_ID: &str = "txclient";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LEFT_CAMERA: &str = "stub://target";
const DEFAULT_RIGHT_CAMERA: &str = "stub://empty";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_STREAM_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_STREAM_QUALITY: u8 = 75;

/// Capture description for the embedded platform's onboard camera.
const JETSON_PIPELINE: &str = "nvcamerasrc ! video/x-raw(memory:NVMM), width=(int)640, \
     height=(int)480, format=(string)I420, framerate=(fraction)30/1 ! nvvidconv \
     flip-method=0 ! video/x-raw, format=(string)I420 ! videoconvert ! \
     video/x-raw, format=(string)BGR ! appsink";

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    table: Option<TableConfigFile>,
    cameras: Option<CamerasConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TableConfigFile {
    server: Option<String>,
    topic_prefix: Option<String>,
    client_id: Option<String>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CamerasConfigFile {
    left: Option<String>,
    right: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    hue: Option<[u8; 2]>,
    sat: Option<[u8; 2]>,
    val: Option<[u8; 2]>,
    min_area: Option<f64>,
    blur_radius: Option<u32>,
    reduction: Option<String>,
    distance_constant: Option<f64>,
    tracking: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    addr: Option<String>,
    quality: Option<u8>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TableSettings {
    pub server: String,
    pub topic_prefix: String,
    pub client_id: String,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            fps: DEFAULT_CAMERA_FPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub addr: String,
    pub quality: u8,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub table: TableSettings,
    pub left_camera: String,
    pub right_camera: String,
    pub camera: CameraSettings,
    pub params: DetectParams,
    /// When set, single-camera mode runs cam-shift tracking and publishes
    /// `Angle` instead of the contour outputs.
    pub tracking: bool,
    pub stream: StreamSettings,
}

impl ClientConfig {
    /// Load from `TXVISION_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TXVISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => ClientConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Result<Self> {
        let table_file = file.table.unwrap_or_default();
        let table = TableSettings {
            server: table_file
                .server
                .unwrap_or_else(|| DEFAULT_TABLE_SERVER.to_string()),
            topic_prefix: table_file
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            client_id: table_file
                .client_id
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            connect_timeout: Duration::from_secs(
                table_file
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        };

        let cameras = file.cameras.unwrap_or_default();
        let left_camera = expand_platform_alias(
            &cameras
                .left
                .unwrap_or_else(|| DEFAULT_LEFT_CAMERA.to_string()),
        );
        let right_camera = expand_platform_alias(
            &cameras
                .right
                .unwrap_or_else(|| DEFAULT_RIGHT_CAMERA.to_string()),
        );
        let camera = CameraSettings {
            width: cameras.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: cameras.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            fps: cameras.fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };

        let pipeline = file.pipeline.unwrap_or_default();
        let defaults = DetectParams::default();
        let reduction = match pipeline.reduction.as_deref() {
            Some("mean") => Reduction::Mean,
            Some("sum") | None => Reduction::Sum,
            Some(other) => {
                return Err(VisionError::MalformedConfig {
                    detail: format!("reduction '{}' is neither 'sum' nor 'mean'", other),
                }
                .into());
            }
        };
        let params = DetectParams {
            hsv: HsvRange {
                hue: pipeline.hue.map(|[a, b]| (a, b)).unwrap_or(defaults.hsv.hue),
                sat: pipeline.sat.map(|[a, b]| (a, b)).unwrap_or(defaults.hsv.sat),
                val: pipeline.val.map(|[a, b]| (a, b)).unwrap_or(defaults.hsv.val),
            },
            filter: ContourFilter {
                min_area: pipeline.min_area.unwrap_or(defaults.filter.min_area),
                ..defaults.filter
            },
            blur_radius: pipeline.blur_radius.unwrap_or(defaults.blur_radius),
            reduction,
            distance_constant: pipeline
                .distance_constant
                .unwrap_or(defaults.distance_constant),
            ..defaults
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            addr: stream_file
                .addr
                .unwrap_or_else(|| DEFAULT_STREAM_ADDR.to_string()),
            quality: stream_file.quality.unwrap_or(DEFAULT_STREAM_QUALITY),
            enabled: stream_file.enabled.unwrap_or(true),
        };

        Ok(Self {
            table,
            left_camera,
            right_camera,
            camera,
            params,
            tracking: pipeline.tracking.unwrap_or(false),
            stream,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(server) = std::env::var("TXVISION_TABLE_SERVER") {
            self.table.server = server;
        }
        if let Ok(prefix) = std::env::var("TXVISION_TOPIC_PREFIX") {
            self.table.topic_prefix = prefix;
        }
        if let Ok(left) = std::env::var("TXVISION_LEFT_CAMERA") {
            self.left_camera = expand_platform_alias(&left);
        }
        if let Ok(right) = std::env::var("TXVISION_RIGHT_CAMERA") {
            self.right_camera = expand_platform_alias(&right);
        }
        if let Ok(addr) = std::env::var("TXVISION_STREAM_ADDR") {
            self.stream.addr = addr;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.table.topic_prefix.is_empty() || self.table.topic_prefix.contains('#') {
            return Err(VisionError::MalformedConfig {
                detail: format!("topic prefix '{}' is not usable", self.table.topic_prefix),
            }
            .into());
        }
        if self.stream.quality == 0 || self.stream.quality > 100 {
            return Err(VisionError::MalformedConfig {
                detail: format!("stream quality {} outside 1..=100", self.stream.quality),
            }
            .into());
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(VisionError::MalformedConfig {
                detail: "camera dimensions must be nonzero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
}

/// Expand the historical platform names into raw camera identifiers.
pub fn expand_platform_alias(identifier: &str) -> String {
    match identifier {
        "usb-linux" => "/dev/video1".to_string(),
        "usb-index" => "0".to_string(),
        "jetson" => JETSON_PIPELINE.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_boot_with_stub_cameras() {
        let cfg = ClientConfig::from_file(ClientConfigFile::default()).expect("defaults");
        assert_eq!(cfg.table.server, "127.0.0.1:1883");
        assert_eq!(cfg.left_camera, "stub://target");
        assert_eq!(cfg.params.resize_width, 280);
        assert_eq!(cfg.params.reduction, Reduction::Sum);
        assert!(!cfg.tracking);
        cfg.validate().expect("valid");
    }

    #[test]
    fn platform_aliases_expand_to_identifiers() {
        assert_eq!(expand_platform_alias("usb-linux"), "/dev/video1");
        assert_eq!(expand_platform_alias("usb-index"), "0");
        assert!(expand_platform_alias("jetson").contains("nvcamerasrc"));
        assert_eq!(expand_platform_alias("/dev/video2"), "/dev/video2");
    }

    #[test]
    fn file_values_override_defaults() {
        let file: ClientConfigFile = toml::from_str(
            r#"
            [table]
            server = "10.55.49.2:1883"

            [pipeline]
            hue = [30, 60]
            reduction = "mean"
            distance_constant = 14.0

            [stream]
            enabled = false
            "#,
        )
        .expect("parse");
        let cfg = ClientConfig::from_file(file).expect("fold");
        assert_eq!(cfg.table.server, "10.55.49.2:1883");
        assert_eq!(cfg.params.hsv.hue, (30, 60));
        assert_eq!(cfg.params.reduction, Reduction::Mean);
        assert_eq!(cfg.params.distance_constant, 14.0);
        assert!(!cfg.stream.enabled);
    }

    #[test]
    fn unknown_reduction_is_malformed_config() {
        let file: ClientConfigFile = toml::from_str(
            r#"
            [pipeline]
            reduction = "median"
            "#,
        )
        .expect("parse");
        let err = ClientConfig::from_file(file).unwrap_err();
        let vision = err.downcast_ref::<VisionError>().expect("typed error");
        assert!(matches!(vision, VisionError::MalformedConfig { .. }));
    }
}
