//! Synthetic frame source for tests and the offline demo.
//!
//! The scene is selected by the stub URL:
//!
//! - `stub://target` — one tape-colored block centered in the frame
//! - `stub://moving` — the block drifts horizontally over time
//! - `stub://empty` (or anything else) — background only
//!
//! The backdrop is dark gray with a little luma noise; gray never passes the
//! saturation threshold, so only the block is detectable.

use rand::Rng;

use crate::config::CameraSettings;
use crate::frame::Frame;

/// RGB of the synthetic vision target. Sits at hue 75 on the OpenCV scale,
/// inside the default [64, 88] threshold band.
pub const TARGET_RGB: (u8, u8, u8) = (0, 255, 128);

const BACKDROP: u8 = 40;

enum Scene {
    Target,
    Moving,
    Empty,
}

pub struct SyntheticSource {
    scene: Scene,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(identifier: &str, settings: &CameraSettings) -> Self {
        let scene = match identifier {
            "stub://target" => Scene::Target,
            "stub://moving" => Scene::Moving,
            _ => Scene::Empty,
        };
        Self {
            scene,
            width: settings.width,
            height: settings.height,
            frame_count: 0,
        }
    }

    pub fn next_frame(&mut self) -> Frame {
        self.frame_count += 1;
        let mut frame = Frame::black(self.width, self.height);
        let mut rng = rand::thread_rng();
        for y in 0..self.height {
            for x in 0..self.width {
                let v = BACKDROP.saturating_add(rng.gen_range(0..4));
                frame.put_rgb(x, y, (v, v, v));
            }
        }

        let block_w = self.width / 5;
        let block_h = self.height / 5;
        match self.scene {
            Scene::Target => {
                frame.fill_rect(
                    (self.width - block_w) / 2,
                    (self.height - block_h) / 2,
                    block_w,
                    block_h,
                    TARGET_RGB,
                );
            }
            Scene::Moving => {
                let span = self.width - block_w;
                let x = ((self.frame_count * 7) % span as u64) as u32;
                frame.fill_rect(x, (self.height - block_h) / 2, block_w, block_h, TARGET_RGB);
            }
            Scene::Empty => {}
        }
        frame
    }
}
