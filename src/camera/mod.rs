mod device;

pub use device::{open_device, CameraDevice, SceneHandle, SyntheticCamera};

use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::{Frame, FrameFormat, ResolutionClass};
use std::time::SystemTime;
use tracing::{debug, info};

/// Capture mode of the single physical camera. Exactly one mode is active
/// at any instant; switching reconfigures the device completely before the
/// next capture starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Low-resolution YUV capture for motion sampling
    Idle,
    /// High-resolution capture for live streaming
    Active,
}

/// Concrete capture parameters for one mode, derived from configuration.
#[derive(Debug, Clone)]
pub struct CaptureProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: FrameFormat,
    pub class: ResolutionClass,
}

impl CaptureProfile {
    pub fn for_mode(config: &CameraConfig, mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Idle => Self {
                width: config.low_resolution.0,
                height: config.low_resolution.1,
                fps: config.low_fps,
                format: FrameFormat::Yuv420,
                class: ResolutionClass::Low,
            },
            CaptureMode::Active => Self {
                width: config.high_resolution.0,
                height: config.high_resolution.1,
                fps: config.high_fps,
                format: FrameFormat::Rgb24,
                class: ResolutionClass::High,
            },
        }
    }
}

/// Exclusive owner of the camera device.
///
/// All hardware access funnels through `&mut self` methods, so the
/// single-caller discipline is enforced by ownership: the coordinator holds
/// the `FrameSource` by value and nothing else can reach the device.
/// Dropping the source releases the device.
pub struct FrameSource {
    config: CameraConfig,
    device: Box<dyn CameraDevice>,
    mode: CaptureMode,
    profile: CaptureProfile,
    frame_counter: u64,
}

impl FrameSource {
    /// Open the platform camera backend and configure it for idle-mode
    /// motion sampling.
    pub async fn open(config: CameraConfig) -> Result<Self> {
        let device = open_device(&config)?;
        Self::with_device(config, device).await
    }

    /// Build a frame source around an explicit device backend.
    pub async fn with_device(
        config: CameraConfig,
        mut device: Box<dyn CameraDevice>,
    ) -> Result<Self> {
        let profile = CaptureProfile::for_mode(&config, CaptureMode::Idle);
        device.configure(&profile).await?;

        info!(
            "Camera opened in {:?} mode ({}x{} @ {}fps)",
            CaptureMode::Idle,
            profile.width,
            profile.height,
            profile.fps
        );

        Ok(Self {
            config,
            device,
            mode: CaptureMode::Idle,
            profile,
            frame_counter: 0,
        })
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Switch capture modes. A no-op when the requested mode is already
    /// active. The device is fully reconfigured before this returns, so no
    /// capture can straddle two resolutions.
    pub async fn set_mode(&mut self, mode: CaptureMode) -> std::result::Result<(), CameraError> {
        if mode == self.mode {
            return Ok(());
        }

        let profile = CaptureProfile::for_mode(&self.config, mode);
        debug!(
            "Switching capture mode {:?} -> {:?} ({}x{} @ {}fps)",
            self.mode, mode, profile.width, profile.height, profile.fps
        );

        self.device.configure(&profile).await?;
        self.mode = mode;
        self.profile = profile;

        info!("Capture mode is now {:?}", mode);
        Ok(())
    }

    /// Capture the next frame at the current mode. Blocks the calling task
    /// until the device produces a frame or the read times out.
    pub async fn capture_frame(&mut self) -> std::result::Result<Frame, CameraError> {
        let data = self.device.read_frame(&self.profile).await?;

        self.frame_counter += 1;
        Ok(Frame::new(
            self.frame_counter,
            SystemTime::now(),
            data,
            self.profile.width,
            self.profile.height,
            self.profile.format,
            self.profile.class,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WakecamConfig;

    fn camera_config() -> CameraConfig {
        let mut config = WakecamConfig::default().camera;
        config.low_resolution = (32, 24);
        config.high_resolution = (64, 48);
        config
    }

    async fn synthetic_source() -> FrameSource {
        FrameSource::with_device(camera_config(), Box::new(SyntheticCamera::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_opens_in_idle_mode() {
        let mut source = synthetic_source().await;
        assert_eq!(source.mode(), CaptureMode::Idle);

        let frame = source.capture_frame().await.unwrap();
        assert_eq!(frame.class, ResolutionClass::Low);
        assert_eq!(frame.format, FrameFormat::Yuv420);
        assert_eq!((frame.width, frame.height), (32, 24));
        assert!(frame.validate_size());
    }

    #[tokio::test]
    async fn test_mode_switch_changes_capture_profile() {
        let mut source = synthetic_source().await;

        source.set_mode(CaptureMode::Active).await.unwrap();
        assert_eq!(source.mode(), CaptureMode::Active);

        let frame = source.capture_frame().await.unwrap();
        assert_eq!(frame.class, ResolutionClass::High);
        assert_eq!(frame.format, FrameFormat::Rgb24);
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.validate_size());

        source.set_mode(CaptureMode::Idle).await.unwrap();
        let frame = source.capture_frame().await.unwrap();
        assert_eq!(frame.class, ResolutionClass::Low);
    }

    #[tokio::test]
    async fn test_redundant_mode_switch_is_noop() {
        let mut source = synthetic_source().await;
        source.set_mode(CaptureMode::Idle).await.unwrap();
        assert_eq!(source.mode(), CaptureMode::Idle);
    }

    #[tokio::test]
    async fn test_frame_ids_are_monotonic() {
        let mut source = synthetic_source().await;
        let first = source.capture_frame().await.unwrap();
        let second = source.capture_frame().await.unwrap();
        assert!(second.id > first.id);
    }
}
