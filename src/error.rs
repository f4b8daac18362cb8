use thiserror::Error;

/// Camera device and capture failures. Retried by the coordinator on the
/// next tick; escalated to a degraded health status after repeated failures.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("failed to open camera device: {details}")]
    DeviceOpen { details: String },

    #[error("camera configuration failed: {details}")]
    Configuration { details: String },

    #[error("capture mode switch failed: {details}")]
    ModeSwitch { details: String },

    #[error("frame capture failed: {details}")]
    Capture { details: String },

    #[error("camera backend not available on this platform")]
    NotAvailable,
}

/// Invalid input handed to the motion detector. This indicates a wiring
/// mistake rather than a runtime condition.
#[derive(Error, Debug)]
pub enum MotionError {
    #[error("invalid detector input: {details}")]
    InvalidInput { details: String },
}

/// Backlight hardware failures. Non-fatal: the display state machine
/// proceeds and the failure is logged.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open backlight device {device}: {source}")]
    BacklightOpen {
        device: String,
        source: std::io::Error,
    },

    #[error("backlight write failed: {source}")]
    BacklightWrite { source: std::io::Error },
}

/// Streaming and encoding failures.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("invalid frame for encoding: {details}")]
    InvalidFrame { details: String },

    #[error("JPEG encoding failed: {details}")]
    Encoding { details: String },

    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("stream server error: {details}")]
    Serve { details: String },
}

#[derive(Error, Debug)]
pub enum WakecamError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("motion detector error: {0}")]
    Motion(#[from] MotionError),

    #[error("display error: {0}")]
    Display(#[from] DisplayError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("system error: {message}")]
    System { message: String },
}

impl WakecamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WakecamError>;
