use super::CaptureProfile;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameFormat;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[cfg(not(all(feature = "camera", target_os = "linux")))]
use tracing::warn;

#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::prelude::*;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::Pipeline;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer_app::AppSink;
#[cfg(all(feature = "camera", target_os = "linux"))]
use tracing::{debug, info};

/// Capture backend seam. The production implementation drives the camera
/// through GStreamer; the synthetic implementation generates frames in
/// memory for tests and platforms without camera hardware.
#[async_trait]
pub trait CameraDevice: Send {
    /// Reconfigure the device for a new capture profile. Any in-flight
    /// capture must be finished or cancelled before this returns.
    async fn configure(&mut self, profile: &CaptureProfile) -> Result<(), CameraError>;

    /// Read the next frame's raw bytes at the configured profile.
    async fn read_frame(&mut self, profile: &CaptureProfile) -> Result<Vec<u8>, CameraError>;
}

/// Open the best camera backend for this platform.
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn open_device(config: &CameraConfig) -> Result<Box<dyn CameraDevice>, CameraError> {
    Ok(Box::new(GstCamera::new(config)?))
}

/// Open the best camera backend for this platform.
#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn open_device(_config: &CameraConfig) -> Result<Box<dyn CameraDevice>, CameraError> {
    warn!("Camera backend unavailable on this platform; using synthetic frames");
    Ok(Box::new(SyntheticCamera::new()))
}

/// GStreamer-backed camera capture via libcamera.
///
/// Each capture profile gets its own pipeline; a mode switch tears the old
/// pipeline down to NULL before the new one starts, so frames can never mix
/// resolutions.
#[cfg(all(feature = "camera", target_os = "linux"))]
pub struct GstCamera {
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    vflip: bool,
}

#[cfg(all(feature = "camera", target_os = "linux"))]
impl GstCamera {
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::DeviceOpen {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        Ok(Self {
            pipeline: None,
            appsink: None,
            vflip: config.vflip,
        })
    }

    fn build_pipeline_string(&self, profile: &CaptureProfile) -> Result<String, CameraError> {
        let format = match profile.format {
            FrameFormat::Yuv420 => "I420",
            FrameFormat::Rgb24 => "RGB",
            FrameFormat::Mjpeg => {
                return Err(CameraError::Configuration {
                    details: "MJPEG capture profiles are not supported".to_string(),
                })
            }
        };

        let flip = if self.vflip {
            "videoflip method=vertical-flip ! "
        } else {
            ""
        };

        Ok(format!(
            "libcamerasrc ! video/x-raw,framerate={fps}/1 ! \
             {flip}videoconvert ! videoscale ! \
             video/x-raw,width={width},height={height},format={format} ! \
             appsink name=sink sync=false max-buffers=1 drop=true",
            fps = profile.fps,
            width = profile.width,
            height = profile.height,
            format = format,
            flip = flip,
        ))
    }

    fn teardown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping capture pipeline");
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
        self.appsink = None;
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
#[async_trait]
impl CameraDevice for GstCamera {
    async fn configure(&mut self, profile: &CaptureProfile) -> Result<(), CameraError> {
        self.teardown();

        let pipeline_desc = self.build_pipeline_string(profile)?;
        info!("Creating capture pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::ModeSwitch {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::ModeSwitch {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::ModeSwitch {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::ModeSwitch {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::ModeSwitch {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        Ok(())
    }

    async fn read_frame(&mut self, profile: &CaptureProfile) -> Result<Vec<u8>, CameraError> {
        let appsink = self.appsink.as_ref().ok_or(CameraError::Capture {
            details: "Capture pipeline not configured".to_string(),
        })?;

        // Allow three frame intervals before declaring the read failed
        let timeout_ms = (3000 / profile.fps.max(1) as u64).max(1000);
        let timeout = gstreamer::ClockTime::from_mseconds(timeout_ms);

        let sample = appsink
            .try_pull_sample(timeout)
            .ok_or_else(|| CameraError::Capture {
                details: format!("No sample within {}ms", timeout_ms),
            })?;

        let buffer = sample.buffer().ok_or_else(|| CameraError::Capture {
            details: "No buffer in sample".to_string(),
        })?;

        let map = buffer.map_readable().map_err(|e| CameraError::Capture {
            details: format!("Failed to map buffer: {}", e),
        })?;

        Ok(map.as_slice().to_vec())
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
impl Drop for GstCamera {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// In-memory camera that renders flat YUV scenes and RGB test patterns.
///
/// The scene brightness can be changed through a `SceneHandle` while the
/// device is owned by a frame source, which is how tests provoke motion.
pub struct SyntheticCamera {
    luma: Arc<AtomicU8>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            luma: Arc::new(AtomicU8::new(128)),
        }
    }

    /// Handle for mutating the rendered scene from outside the device.
    pub fn scene(&self) -> SceneHandle {
        SceneHandle(Arc::clone(&self.luma))
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

/// External control over a `SyntheticCamera`'s rendered scene.
#[derive(Clone)]
pub struct SceneHandle(Arc<AtomicU8>);

impl SceneHandle {
    pub fn set_luma(&self, value: u8) {
        self.0.store(value, Ordering::Relaxed);
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    async fn configure(&mut self, _profile: &CaptureProfile) -> Result<(), CameraError> {
        Ok(())
    }

    async fn read_frame(&mut self, profile: &CaptureProfile) -> Result<Vec<u8>, CameraError> {
        let luma = self.luma.load(Ordering::Relaxed);
        let pixels = profile.width as usize * profile.height as usize;

        match profile.format {
            FrameFormat::Yuv420 => {
                let mut data = vec![luma; pixels];
                data.extend(vec![128u8; pixels / 2]);
                Ok(data)
            }
            FrameFormat::Rgb24 => {
                let mut data = Vec::with_capacity(pixels * 3);
                for y in 0..profile.height {
                    for x in 0..profile.width {
                        data.push((x * 255 / profile.width) as u8);
                        data.push(luma);
                        data.push((y * 255 / profile.height) as u8);
                    }
                }
                Ok(data)
            }
            FrameFormat::Mjpeg => Err(CameraError::Capture {
                details: "Synthetic camera cannot produce MJPEG".to_string(),
            }),
        }
    }
}
