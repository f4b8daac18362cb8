use crate::camera::{CaptureMode, FrameSource};
use crate::config::WakecamConfig;
use crate::detector::MotionDetector;
use crate::display::DisplayController;
use crate::encoder::{FramePublisher, StreamEncoder};
use crate::frame::Frame;
use crate::health::DeviceHealth;
use crate::viewers::ViewerRegistry;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Top-level control loop tying capture, detection, display power and
/// streaming together.
///
/// The coordinator owns the frame source outright, so every camera access
/// is serialized through its tick by construction. Each tick decides the
/// capture mode from viewer and display activity, captures one frame, and
/// hands it to exactly one consumer: the motion detector in idle mode or
/// the stream encoder in active mode.
pub struct ActivityCoordinator {
    source: FrameSource,
    detector: MotionDetector,
    display: DisplayController,
    encoder: StreamEncoder,
    publisher: FramePublisher,
    viewers: ViewerRegistry,
    health: DeviceHealth,
    motion_tx: watch::Sender<bool>,
    previous: Option<Frame>,
    idle_interval: Duration,
    active_interval: Duration,
}

impl ActivityCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &WakecamConfig,
        source: FrameSource,
        display: DisplayController,
        publisher: FramePublisher,
        viewers: ViewerRegistry,
        health: DeviceHealth,
        motion_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            source,
            detector: MotionDetector::new(&config.motion),
            display,
            encoder: StreamEncoder::new(&config.stream),
            publisher,
            viewers,
            health,
            motion_tx,
            previous: None,
            idle_interval: Duration::from_millis(config.system.idle_tick_ms),
            active_interval: Duration::from_millis(config.system.active_tick_ms),
        }
    }

    /// Run the tick loop until shutdown is requested. Dropping out of the
    /// loop releases the camera and ends all viewer streams.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Activity coordinator started (idle tick {:?}, active tick {:?})",
            self.idle_interval, self.active_interval
        );

        loop {
            self.tick().await;

            let interval = match self.source.mode() {
                CaptureMode::Idle => self.idle_interval,
                CaptureMode::Active => self.active_interval,
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Activity coordinator stopped; releasing camera");
    }

    /// One iteration of the control loop.
    pub async fn tick(&mut self) {
        self.tick_at(Instant::now()).await;
    }

    /// Tick with an explicit notion of "now", so timeout behavior is
    /// testable without waiting out real intervals.
    pub(crate) async fn tick_at(&mut self, now: Instant) {
        let viewer_count = self.viewers.drain();

        let desired = if viewer_count > 0 || self.display.is_on() {
            CaptureMode::Active
        } else {
            CaptureMode::Idle
        };

        if desired != self.source.mode() {
            debug!(
                "Mode decision: {:?} ({} viewers, display {:?})",
                desired,
                viewer_count,
                self.display.power()
            );
            if let Err(e) = self.source.set_mode(desired).await {
                warn!("Capture mode switch failed: {}", e);
                self.health.record_failure();
                return;
            }
            // The retained frame is from the other resolution; comparing
            // against it would fabricate motion on the next idle tick.
            self.previous = None;
        }

        let frame = match self.source.capture_frame().await {
            Ok(frame) => {
                self.health.record_success();
                frame
            }
            Err(e) => {
                warn!("Frame capture failed, retrying next tick: {}", e);
                self.health.record_failure();
                return;
            }
        };

        match self.source.mode() {
            CaptureMode::Idle => {
                match self.detector.detect(self.previous.as_ref(), &frame) {
                    Ok(motion) => {
                        if motion.changed {
                            debug!("Motion detected (score {:.2})", motion.score);
                        }
                        self.display.on_motion(motion.changed, now);
                        self.motion_tx.send_replace(motion.changed);
                    }
                    Err(e) => {
                        error!("Motion detection rejected frame {}: {}", frame.id, e);
                        debug_assert!(false, "idle capture produced an undetectable frame: {}", e);
                    }
                }
                self.previous = Some(frame);
            }
            CaptureMode::Active => {
                match self.encoder.encode(&frame) {
                    Ok(payload) => self.publisher.publish(payload),
                    Err(e) => {
                        error!("Stream encoding rejected frame {}: {}", frame.id, e);
                        debug_assert!(false, "active capture produced an unencodable frame: {}", e);
                    }
                }
                // The inactivity timeout keeps running while streaming, so
                // an unwatched display still powers off mid-stream.
                self.display.on_motion(false, now);
            }
        }
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.source.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SceneHandle, SyntheticCamera};
    use crate::config::WakecamConfig;
    use crate::display::{DisplayPower, RecordingBacklight};
    use crate::error::CameraError;
    use crate::viewers::{self, ViewerTracker};
    use async_trait::async_trait;

    struct Harness {
        coordinator: ActivityCoordinator,
        scene: SceneHandle,
        sink: RecordingBacklight,
        tracker: ViewerTracker,
        motion_rx: watch::Receiver<bool>,
        health_rx: watch::Receiver<crate::health::HealthStatus>,
    }

    fn test_config() -> WakecamConfig {
        let mut config = WakecamConfig::default();
        config.camera.low_resolution = (32, 24);
        config.camera.high_resolution = (64, 48);
        config.motion.threshold = 10.0;
        config.display.initial_power = DisplayPower::Off;
        config.display.inactivity_timeout_seconds = 15;
        config.system.device_failure_threshold = 3;
        config
    }

    async fn harness(config: WakecamConfig) -> Harness {
        let camera = SyntheticCamera::new();
        let scene = camera.scene();
        let source = FrameSource::with_device(config.camera.clone(), Box::new(camera))
            .await
            .unwrap();

        let sink = RecordingBacklight::new();
        let display = DisplayController::new(&config.display, Box::new(sink.clone()));

        let (tracker, registry) = viewers::channel();
        let (health, health_rx) = DeviceHealth::new(config.system.device_failure_threshold);
        let (motion_tx, motion_rx) = watch::channel(false);
        let publisher = FramePublisher::new(config.system.publisher_capacity);

        let coordinator = ActivityCoordinator::new(
            &config, source, display, publisher, registry, health, motion_tx,
        );

        Harness {
            coordinator,
            scene,
            sink,
            tracker,
            motion_rx,
            health_rx,
        }
    }

    #[tokio::test]
    async fn test_motion_powers_display_and_activates_streaming() {
        let mut h = harness(test_config()).await;
        let t0 = Instant::now();

        // Settle: first tick has no previous frame, second sees no change
        h.coordinator.tick_at(t0).await;
        h.coordinator.tick_at(t0 + Duration::from_secs(1)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Idle);
        assert!(!*h.motion_rx.borrow());

        // Brighten the scene by 15 luma steps: score 15 >= threshold 10
        h.scene.set_luma(143);
        h.coordinator.tick_at(t0 + Duration::from_secs(2)).await;

        assert!(*h.motion_rx.borrow());
        let power_ons = h.sink.commands().iter().filter(|&&on| on).count();
        assert_eq!(power_ons, 1);

        // Display on pulls capture into active mode on the following tick
        h.coordinator.tick_at(t0 + Duration::from_secs(3)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Active);
    }

    #[tokio::test]
    async fn test_first_tick_reports_no_motion() {
        let mut h = harness(test_config()).await;

        // A bright scene on the very first tick has nothing to compare to
        h.scene.set_luma(255);
        h.coordinator.tick_at(Instant::now()).await;

        assert!(!*h.motion_rx.borrow());
        assert_eq!(h.sink.commands(), vec![false]);
    }

    #[tokio::test]
    async fn test_viewer_attach_activates_within_one_tick() {
        let mut h = harness(test_config()).await;
        let t0 = Instant::now();

        h.coordinator.tick_at(t0).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Idle);

        let guard = h.tracker.attach();
        h.coordinator.tick_at(t0 + Duration::from_secs(1)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Active);

        // Detach with the display off reverts within one tick
        drop(guard);
        h.coordinator.tick_at(t0 + Duration::from_secs(2)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Idle);
    }

    #[tokio::test]
    async fn test_active_mode_publishes_encoded_frames() {
        let mut h = harness(test_config()).await;
        let t0 = Instant::now();

        let _guard = h.tracker.attach();
        h.coordinator.tick_at(t0).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Active);

        let mut rx = h.coordinator.publisher.subscribe();
        h.coordinator.tick_at(t0 + Duration::from_millis(100)).await;

        let payload = rx.try_recv().unwrap();
        assert_eq!(&payload.data[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&payload.data).unwrap();
        assert_eq!(image::GenericImageView::dimensions(&decoded), (64, 48));
    }

    #[tokio::test]
    async fn test_display_times_out_while_streaming() {
        let mut h = harness(test_config()).await;
        let t0 = Instant::now();

        // Motion turns the display on, capture goes active
        h.coordinator.tick_at(t0).await;
        h.scene.set_luma(200);
        h.coordinator.tick_at(t0 + Duration::from_secs(1)).await;
        h.coordinator.tick_at(t0 + Duration::from_secs(2)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Active);

        // No viewers; once the timeout elapses the display powers off even
        // though streaming is underway, and capture falls back to idle
        h.coordinator.tick_at(t0 + Duration::from_secs(17)).await;
        assert_eq!(h.sink.commands().last(), Some(&false));

        h.coordinator.tick_at(t0 + Duration::from_secs(18)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Idle);
    }

    #[tokio::test]
    async fn test_mode_switch_suppresses_stale_comparison() {
        let mut h = harness(test_config()).await;
        let t0 = Instant::now();

        h.coordinator.tick_at(t0).await;
        let guard = h.tracker.attach();
        h.coordinator.tick_at(t0 + Duration::from_secs(1)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Active);

        // Change the scene while streaming, then drop back to idle: the
        // first idle tick has no previous frame and must stay quiet
        h.scene.set_luma(250);
        drop(guard);
        h.coordinator.tick_at(t0 + Duration::from_secs(2)).await;
        assert_eq!(h.coordinator.capture_mode(), CaptureMode::Idle);
        assert!(!*h.motion_rx.borrow());
    }

    struct FailingCamera;

    #[async_trait]
    impl crate::camera::CameraDevice for FailingCamera {
        async fn configure(
            &mut self,
            _profile: &crate::camera::CaptureProfile,
        ) -> Result<(), CameraError> {
            Ok(())
        }

        async fn read_frame(
            &mut self,
            _profile: &crate::camera::CaptureProfile,
        ) -> Result<Vec<u8>, CameraError> {
            Err(CameraError::Capture {
                details: "device busy".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_sustained_capture_failure_degrades_health() {
        let config = test_config();
        let source = FrameSource::with_device(config.camera.clone(), Box::new(FailingCamera))
            .await
            .unwrap();

        let sink = RecordingBacklight::new();
        let display = DisplayController::new(&config.display, Box::new(sink.clone()));
        let (_tracker, registry) = viewers::channel();
        let (health, health_rx) = DeviceHealth::new(config.system.device_failure_threshold);
        let (motion_tx, _motion_rx) = watch::channel(false);
        let publisher = FramePublisher::new(config.system.publisher_capacity);

        let mut coordinator = ActivityCoordinator::new(
            &config, source, display, publisher, registry, health, motion_tx,
        );

        let t0 = Instant::now();
        for i in 0..3 {
            coordinator.tick_at(t0 + Duration::from_secs(i)).await;
        }

        assert_eq!(*health_rx.borrow(), crate::health::HealthStatus::Degraded);
        // Failed ticks mutate nothing: the display never saw a command
        // beyond its initial state
        assert_eq!(sink.commands(), vec![false]);
    }

    #[tokio::test]
    async fn test_failed_ticks_recover_on_next_success() {
        let mut h = harness(test_config()).await;
        let t0 = Instant::now();

        h.coordinator.tick_at(t0).await;
        assert_eq!(
            *h.health_rx.borrow(),
            crate::health::HealthStatus::Healthy
        );
    }
}
