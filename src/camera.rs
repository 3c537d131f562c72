use crate::config::Config;
use crate::error::{FaceGateError, Result};
use image::{DynamicImage, ImageBuffer, Luma};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// V4L2 camera handle. Frames stream through a [`CameraSession`]; dropping
/// the session releases the mmap buffers, dropping the camera releases the
/// device.
pub struct Camera {
    device: Device,
    config: Config,
}

pub struct CameraSession<'a> {
    stream: v4l::io::mmap::Stream<'a>,
    format: v4l::Format,
}

impl Camera {
    pub fn new(config: &Config) -> Result<Self> {
        let index = config.camera.device_index;
        tracing::debug!("Opening camera device {}", index);

        let device = Device::new(index as usize)
            .map_err(|e| FaceGateError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device
            .query_caps()
            .map_err(|e| FaceGateError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!(
                "Device {} may not support standard video capture: {:?}",
                index,
                caps.capabilities
            );
        }

        let mut fmt = device
            .format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get format: {}", e)))?;

        fmt.width = config.camera.width;
        fmt.height = config.camera.height;

        // Keep GREY for IR cameras, otherwise request MJPG
        if fmt.fourcc.str().unwrap_or("") != "GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let final_fmt = device
            .format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get final format: {}", e)))?;
        tracing::debug!(
            "Camera format: {}x{} {}",
            final_fmt.width,
            final_fmt.height,
            final_fmt.fourcc.str().unwrap_or("?")
        );

        Ok(Self {
            device,
            config: config.clone(),
        })
    }

    /// Starts a streaming session, discarding the configured number of
    /// warmup frames before handing control to the caller.
    pub fn start_session(&mut self) -> Result<CameraSession<'_>> {
        let fmt = self
            .device
            .format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get format: {}", e)))?;

        let warmup_frames = self.config.camera.warmup_frames;
        let warmup_delay_ms = self.config.camera.warmup_delay_ms;

        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| FaceGateError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..warmup_frames {
            stream.next().map_err(|e| {
                FaceGateError::Camera(format!("Failed to capture warmup frame {}: {}", i, e))
            })?;
            std::thread::sleep(std::time::Duration::from_millis(warmup_delay_ms));
        }

        Ok(CameraSession {
            stream,
            format: fmt,
        })
    }
}

impl<'a> CameraSession<'a> {
    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| FaceGateError::Camera(format!("Failed to read frame: {}", e)))?;

        match self.format.fourcc.str().unwrap_or("") {
            "GREY" => grey_to_image(buf, self.format.width, self.format.height),
            "MJPG" => Ok(image::load_from_memory(buf)?),
            other => Err(FaceGateError::Camera(format!(
                "Unsupported pixel format: {}",
                other
            ))),
        }
    }
}

fn grey_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let img_buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.to_vec())
        .ok_or_else(|| FaceGateError::Camera("Failed to create grayscale image buffer".into()))?;

    Ok(DynamicImage::ImageLuma8(img_buffer))
}
