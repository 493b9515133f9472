//! Camera frame sources.
//!
//! A [`CameraSource`] is opened from an opaque identifier string:
//!
//! - `stub://…` — synthetic scenes for tests and the offline demo
//! - `/dev/videoN` or a bare integer index — V4L2 device (feature: `camera-v4l2`)
//! - a GStreamer launch description containing ` ! ` — embedded-platform
//!   capture pipelines (feature: `camera-gstreamer`)
//!
//! Open failures surface as [`VisionError::DeviceUnavailable`]; the loop then
//! substitutes the 1x1x3 placeholder frame instead of propagating the error.
//! A source that starts failing reads is not reopened automatically.

#[cfg(feature = "camera-gstreamer")]
mod gstreamer;
mod synthetic;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

use crate::config::CameraSettings;
use crate::error::VisionError;
use crate::frame::Frame;

use synthetic::SyntheticSource;

pub struct CameraSource {
    backend: Backend,
    identifier: String,
    frames_captured: u64,
}

impl std::fmt::Debug for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSource")
            .field("identifier", &self.identifier)
            .field("frames_captured", &self.frames_captured)
            .finish_non_exhaustive()
    }
}

enum Backend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "camera-v4l2")]
    V4l2(v4l2::V4l2Source),
    #[cfg(feature = "camera-gstreamer")]
    Gstreamer(gstreamer::GstSource),
}

/// Per-source counters, logged with the identifier.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub identifier: String,
}

impl CameraSource {
    /// Open a camera from its identifier string.
    pub fn open(identifier: &str, settings: &CameraSettings) -> Result<Self, VisionError> {
        let backend = if identifier.starts_with("stub://") {
            Backend::Synthetic(SyntheticSource::new(identifier, settings))
        } else if identifier.contains(" ! ") {
            #[cfg(feature = "camera-gstreamer")]
            {
                Backend::Gstreamer(gstreamer::GstSource::open(identifier, settings)?)
            }
            #[cfg(not(feature = "camera-gstreamer"))]
            {
                return Err(VisionError::DeviceUnavailable {
                    identifier: identifier.to_string(),
                    reason: "built without the camera-gstreamer feature".to_string(),
                });
            }
        } else if identifier.starts_with("/dev/") || identifier.parse::<u32>().is_ok() {
            let device = match identifier.parse::<u32>() {
                Ok(index) => format!("/dev/video{}", index),
                Err(_) => identifier.to_string(),
            };
            #[cfg(feature = "camera-v4l2")]
            {
                Backend::V4l2(v4l2::V4l2Source::open(&device, settings)?)
            }
            #[cfg(not(feature = "camera-v4l2"))]
            {
                return Err(VisionError::DeviceUnavailable {
                    identifier: device,
                    reason: "built without the camera-v4l2 feature".to_string(),
                });
            }
        } else {
            return Err(VisionError::DeviceUnavailable {
                identifier: identifier.to_string(),
                reason: "unrecognized identifier".to_string(),
            });
        };

        log::info!("camera: opened '{}'", identifier);
        Ok(Self {
            backend,
            identifier: identifier.to_string(),
            frames_captured: 0,
        })
    }

    /// Read the next frame. On failure returns `(false, placeholder)`; the
    /// source stays in its failed state until reopened by the caller.
    pub fn read(&mut self) -> (bool, Frame) {
        let result: Result<Frame, VisionError> = match &mut self.backend {
            Backend::Synthetic(source) => Ok(source.next_frame()),
            #[cfg(feature = "camera-v4l2")]
            Backend::V4l2(source) => source.next_frame(),
            #[cfg(feature = "camera-gstreamer")]
            Backend::Gstreamer(source) => source.next_frame(),
        };
        match result {
            Ok(frame) => {
                self.frames_captured += 1;
                (true, frame)
            }
            Err(err) => {
                log::warn!("camera '{}': read failed: {}", self.identifier, err);
                (false, Frame::placeholder())
            }
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            identifier: self.identifier.clone(),
        }
    }
}
