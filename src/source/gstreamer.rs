//! GStreamer pipeline backend (feature: `camera-gstreamer`).
//!
//! The identifier is a full launch description, e.g. the embedded-platform
//! capture string `nvcamerasrc ! … ! appsink`. When the description does not
//! already end in an appsink, one is appended so frames can be pulled as
//! packed RGB.

use std::time::Duration;

use anyhow::Context;
use gstreamer::prelude::*;

use crate::config::CameraSettings;
use crate::error::VisionError;
use crate::frame::Frame;

pub struct GstSource {
    identifier: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_timeout: Duration,
}

impl GstSource {
    pub fn open(description: &str, settings: &CameraSettings) -> Result<Self, VisionError> {
        Self::build(description, settings).map_err(|err| VisionError::DeviceUnavailable {
            identifier: description.to_string(),
            reason: format!("{:#}", err),
        })
    }

    fn build(description: &str, settings: &CameraSettings) -> anyhow::Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let launch = if description.contains("appsink") {
            description.to_string()
        } else {
            format!(
                "{} ! videoconvert ! video/x-raw,format=RGB ! \
                 appsink name=appsink sync=false max-buffers=1 drop=true",
                description
            )
        };
        let pipeline = gstreamer::parse::launch(&launch)
            .context("build capture pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("capture description is not a pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set capture pipeline to Playing")?;

        let frame_timeout = if settings.fps == 0 {
            Duration::from_millis(500)
        } else {
            Duration::from_millis(((1000 / settings.fps).saturating_mul(4)).max(500) as u64)
        };

        Ok(Self {
            identifier: description.to_string(),
            pipeline,
            appsink,
            frame_timeout,
        })
    }

    pub fn next_frame(&mut self) -> Result<Frame, VisionError> {
        self.poll_bus();

        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(
                self.frame_timeout.as_millis() as u64,
            ))
            .ok_or_else(|| VisionError::DeviceUnavailable {
                identifier: self.identifier.clone(),
                reason: "stream stalled".to_string(),
            })?;

        sample_to_frame(&sample).map_err(|err| VisionError::DeviceUnavailable {
            identifier: self.identifier.clone(),
            reason: format!("{:#}", err),
        })
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    log::warn!(
                        "camera '{}': gstreamer error from {:?}: {}",
                        self.identifier,
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                }
                MessageView::Eos(..) => {
                    log::warn!("camera '{}': stream ended", self.identifier);
                }
                _ => {}
            }
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> anyhow::Result<Frame> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map capture buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok(Frame::from_rgb(data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).context("buffer row out of bounds")?);
    }
    Ok(Frame::from_rgb(pixels, width, height))
}
