//! V4L2 camera backend (feature: `camera-v4l2`).

use anyhow::Context;
use ouroboros::self_referencing;

use crate::config::CameraSettings;
use crate::error::VisionError;
use crate::frame::Frame;

pub struct V4l2Source {
    device: String,
    width: u32,
    height: u32,
    state: Option<V4l2State>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn open(device_path: &str, settings: &CameraSettings) -> Result<Self, VisionError> {
        let mut source = Self {
            device: device_path.to_string(),
            width: settings.width,
            height: settings.height,
            state: None,
        };
        source.connect(settings).map_err(|err| {
            VisionError::DeviceUnavailable {
                identifier: device_path.to_string(),
                reason: format!("{:#}", err),
            }
        })?;
        Ok(source)
    }

    fn connect(&mut self, settings: &CameraSettings) -> anyhow::Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("camera '{}': failed to set format: {}", self.device, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if settings.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("camera '{}': failed to set fps: {}", self.device, err);
            }
        }

        self.width = format.width;
        self.height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "camera '{}': v4l2 capture at {}x{}",
            self.device,
            self.width,
            self.height
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame, VisionError> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| VisionError::DeviceUnavailable {
                identifier: self.device.clone(),
                reason: "not connected".to_string(),
            })?;
        let (buf, _meta) =
            state
                .with_mut(|fields| fields.stream.next())
                .map_err(|err| VisionError::DeviceUnavailable {
                    identifier: self.device.clone(),
                    reason: format!("capture failed: {}", err),
                })?;
        Ok(Frame::from_rgb(buf.to_vec(), self.width, self.height))
    }
}
