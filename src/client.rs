//! The mode-driven control loop.
//!
//! One blocking read-eval-publish loop. Each iteration: heartbeat, read
//! `Mode` off the table, dispatch, publish, repeat until the table reports
//! disconnected or shutdown is requested. Everything the loop touches -- the
//! table, the cameras, the tracking state -- is owned here exclusively; there
//! is no concurrency to coordinate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::frame::Frame;
use crate::pipeline::{self, track, DetectParams, Rect};
use crate::source::CameraSource;
use crate::stream::MjpegHandle;
use crate::table::TableChannel;

// Keys read from the table.
const KEY_MODE: &str = "Mode";
const KEY_ENABLED: &str = "Enabled";
const KEY_CAMERA_STREAM: &str = "CameraStream";
const KEY_CAMERA_SELECT: &str = "Camera";
const KEY_TEST_NUMBER: &str = "Number";

// Keys written back.
const KEY_HEARTBEAT: &str = "tableExists";
const KEY_DIRECTION: &str = "Direction";
const KEY_DISTANCE: &str = "Camera Distance";
const KEY_CONTOUR_CENTERS: &str = "contour centers";
const KEY_ALL_CENTERS: &str = "all visible contour centers";
const KEY_ALL_DIMENSIONS: &str = "all contour dimensions";
const KEY_ANGLE: &str = "Angle";

/// Behavior selected by the `Mode` number on the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Test,
    SingleCamera,
    DualCamera,
    StreamOnly,
    Idle,
}

impl Mode {
    /// `0`=Test, `1`=single-camera vision, `2`=dual-camera vision,
    /// `3`=stream passthrough. Anything else is idle.
    pub fn from_flag(value: f64) -> Mode {
        if value == 0.0 {
            Mode::Test
        } else if value == 1.0 {
            Mode::SingleCamera
        } else if value == 2.0 {
            Mode::DualCamera
        } else if value == 3.0 {
            Mode::StreamOnly
        } else {
            Mode::Idle
        }
    }
}

struct TrackState {
    window: Rect,
    histogram: track::HueHistogram,
}

pub struct VisionClient<T: TableChannel> {
    table: T,
    left: Option<CameraSource>,
    right: Option<CameraSource>,
    left_identifier: String,
    right_identifier: String,
    params: DetectParams,
    tracking_mode: bool,
    stream: Option<MjpegHandle>,
    track_state: Option<TrackState>,
    is_reset: bool,
    resets_fired: u64,
    running: Arc<AtomicBool>,
}

impl<T: TableChannel> VisionClient<T> {
    /// Build the loop around an already-opened table channel. Cameras that
    /// fail to open degrade to placeholder frames rather than failing the
    /// client.
    pub fn new(table: T, cfg: &ClientConfig, stream: Option<MjpegHandle>) -> Self {
        let left = open_or_warn(&cfg.left_camera, cfg);
        let right = open_or_warn(&cfg.right_camera, cfg);
        Self {
            table,
            left,
            right,
            left_identifier: cfg.left_camera.clone(),
            right_identifier: cfg.right_camera.clone(),
            params: cfg.params.clone(),
            tracking_mode: cfg.tracking,
            stream,
            track_state: None,
            // No reset owed until Enabled has been observed high.
            is_reset: true,
            resets_fired: 0,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag checked each iteration; hand this to a signal handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }

    /// Number of times the falling-edge reset hook has fired.
    pub fn resets_fired(&self) -> u64 {
        self.resets_fired
    }

    /// Run until the table disconnects or shutdown is requested.
    pub fn run(&mut self) {
        log::info!(
            "loop: running (left='{}', right='{}')",
            self.left_identifier,
            self.right_identifier
        );
        while self.step() {
            std::thread::sleep(Duration::from_millis(10));
        }
        if let Some(left) = &self.left {
            let stats = left.stats();
            log::info!(
                "loop: exiting; '{}' captured {} frames",
                stats.identifier,
                stats.frames_captured
            );
        }
    }

    /// One iteration. Returns `false` when the loop should stop.
    pub fn step(&mut self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            log::info!("loop: shutdown requested");
            return false;
        }
        if !self.table.connected() {
            log::warn!("loop: table disconnected");
            return false;
        }

        self.table.put_bool(KEY_HEARTBEAT, true);

        let mode = Mode::from_flag(self.table.get_number(KEY_MODE, -1.0));
        match mode {
            Mode::Test => self.test_mode(),
            Mode::SingleCamera => self.single_camera_mode(),
            Mode::DualCamera => self.dual_camera_mode(),
            Mode::StreamOnly => self.stream_only_mode(),
            Mode::Idle => {}
        }
        true
    }

    /// Echo check for bring-up: a `Number` of 1 is acknowledged by writing 0.
    fn test_mode(&mut self) {
        if self.table.get_number(KEY_TEST_NUMBER, 0.0) == 1.0 {
            self.table.put_number(KEY_TEST_NUMBER, 0.0);
        }
    }

    fn single_camera_mode(&mut self) {
        if !self.gate_enabled() {
            return;
        }
        let frame = read_or_placeholder(&mut self.left);
        if self.tracking_mode {
            self.track_iteration(&frame);
        } else {
            self.contour_iteration(&frame, None);
        }
        self.maybe_stream(&frame);
    }

    fn dual_camera_mode(&mut self) {
        if !self.gate_enabled() {
            return;
        }
        let left = read_or_placeholder(&mut self.left);
        let right = read_or_placeholder(&mut self.right);
        self.contour_iteration(&left, Some("Left"));
        self.contour_iteration(&right, Some("Right"));
        self.maybe_stream(&left);
    }

    /// Passthrough: always stream the `Camera`-selected feed. `CameraStream`
    /// only gates the vision modes.
    fn stream_only_mode(&mut self) {
        let frame = if self.table.get_number(KEY_CAMERA_SELECT, 0.0) == 0.0 {
            read_or_placeholder(&mut self.left)
        } else {
            read_or_placeholder(&mut self.right)
        };
        // Passthrough mode streams at capture resolution.
        let Some(stream) = &self.stream else {
            return;
        };
        if let Err(err) = stream.push_frame(&frame) {
            log::warn!("loop: stream push failed: {}", err);
        }
    }

    /// True when the pipeline should run. On the falling edge of `Enabled`
    /// the reset hook fires exactly once.
    fn gate_enabled(&mut self) -> bool {
        if self.table.get_bool(KEY_ENABLED, false) {
            self.is_reset = false;
            return true;
        }
        if !self.is_reset {
            self.vis_reset();
            self.is_reset = true;
        }
        false
    }

    /// Falling-edge hook: drop per-run pipeline state.
    fn vis_reset(&mut self) {
        self.track_state = None;
        self.resets_fired += 1;
        log::info!("loop: vision state reset");
    }

    /// Run the contour family and publish. `prefix` switches between the
    /// single-camera keys and the `Left`/`Right` dual-camera keys.
    fn contour_iteration(&mut self, frame: &Frame, prefix: Option<&str>) {
        let report = pipeline::detect(frame, &self.params);
        match pipeline::estimate_target(&report, &self.params) {
            Ok(est) => {
                let (direction_key, distance_key) = match prefix {
                    Some(side) => (
                        format!("{} Camera Direction", side),
                        format!("{} Camera Distance", side),
                    ),
                    None => (KEY_DIRECTION.to_string(), KEY_DISTANCE.to_string()),
                };
                self.table.put_number(&direction_key, est.direction_degrees);
                self.table.put_number(&distance_key, est.distance);

                if prefix.is_none() {
                    let reduced = [report.reduced_center.0, report.reduced_center.1];
                    self.table.put_number_array(KEY_CONTOUR_CENTERS, &reduced);

                    let mut centers = Vec::with_capacity(report.centers.len() * 2);
                    for (x, y) in &report.centers {
                        centers.push(*x);
                        centers.push(*y);
                    }
                    self.table.put_number_array(KEY_ALL_CENTERS, &centers);

                    let mut dims = Vec::with_capacity(report.boxes.len() * 4);
                    for b in &report.boxes {
                        dims.extend_from_slice(&[
                            b.x as f64, b.y as f64, b.w as f64, b.h as f64,
                        ]);
                    }
                    self.table.put_number_array(KEY_ALL_DIMENSIONS, &dims);
                }
            }
            Err(err) if err.is_recoverable() => {
                log::debug!("loop: {}; skipping publish", err);
            }
            Err(err) => {
                log::warn!("loop: detection failed: {}", err);
            }
        }
    }

    /// Cam-shift tracking. The histogram is built once from a centered
    /// window on the first enabled frame and held for the rest of the run.
    fn track_iteration(&mut self, frame: &Frame) {
        if frame.is_placeholder() {
            log::debug!("loop: placeholder frame, tracking skipped");
            return;
        }
        let state = self.track_state.get_or_insert_with(|| {
            let window = Rect::centered_in(frame.width, frame.height, frame.width / 4, frame.height / 4);
            let histogram = track::HueHistogram::from_roi(frame, window, &self.params.hsv);
            log::info!("loop: tracking initialized at {:?}", window);
            TrackState { window, histogram }
        });

        let density = track::back_project(frame, &state.histogram);
        let result = track::cam_shift(&density, state.window);
        state.window = result.window;
        let angle = track::orientation_angle(&result.points);
        self.table.put_number(KEY_ANGLE, angle);
    }

    /// Push the pipeline-resolution view of a frame when streaming is on.
    fn maybe_stream(&mut self, frame: &Frame) {
        if self.table.get_bool(KEY_CAMERA_STREAM, false) {
            self.push_stream(frame);
        }
    }

    fn push_stream(&mut self, frame: &Frame) {
        let Some(stream) = &self.stream else {
            return;
        };
        let resized = pipeline::ops::resize(frame, self.params.resize_width, self.params.resize_height);
        if let Err(err) = stream.push_frame(&resized) {
            log::warn!("loop: stream push failed: {}", err);
        }
    }
}

fn open_or_warn(identifier: &str, cfg: &ClientConfig) -> Option<CameraSource> {
    match CameraSource::open(identifier, &cfg.camera) {
        Ok(source) => Some(source),
        Err(err) => {
            log::warn!("loop: {} (placeholder frames substituted)", err);
            None
        }
    }
}

/// Read from a source, or substitute the placeholder when the camera never
/// opened or the read fails.
fn read_or_placeholder(source: &mut Option<CameraSource>) -> Frame {
    match source {
        Some(source) => source.read().1,
        None => Frame::placeholder(),
    }
}
