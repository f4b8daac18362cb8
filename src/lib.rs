pub mod camera;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod display;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod health;
pub mod streaming;
pub mod viewers;

pub use camera::{CameraDevice, CaptureMode, CaptureProfile, FrameSource, SyntheticCamera};
pub use config::WakecamConfig;
pub use coordinator::ActivityCoordinator;
pub use detector::MotionDetector;
pub use display::{
    BacklightSink, DisplayController, DisplayPower, RecordingBacklight, SysfsBacklight,
};
pub use encoder::{EncodedPayload, FramePublisher, StreamEncoder};
pub use error::{Result, WakecamError};
pub use frame::{Frame, FrameFormat, MotionState, ResolutionClass};
pub use health::{DeviceHealth, HealthStatus};
pub use streaming::{ServerState, StreamServer};
pub use viewers::{ViewerEvent, ViewerGuard, ViewerRegistry, ViewerTracker};
