use crate::display::DisplayPower;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WakecamConfig {
    pub camera: CameraConfig,
    pub motion: MotionConfig,
    pub display: DisplayConfig,
    pub stream: StreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Resolution used for idle-mode motion sampling (width, height)
    #[serde(default = "default_low_resolution")]
    pub low_resolution: (u32, u32),

    /// Resolution used for active-mode streaming (width, height)
    #[serde(default = "default_high_resolution")]
    pub high_resolution: (u32, u32),

    /// Frame rate in idle mode
    #[serde(default = "default_low_fps")]
    pub low_fps: u32,

    /// Frame rate in active mode
    #[serde(default = "default_high_fps")]
    pub high_fps: u32,

    /// Flip the image vertically (camera mounted upside down)
    #[serde(default = "default_vflip")]
    pub vflip: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Mean absolute luma difference at or above which a frame pair
    /// counts as motion
    #[serde(default = "default_motion_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    /// Backlight power control file
    #[serde(default = "default_backlight_device")]
    pub backlight_device: String,

    /// Seconds without motion before the display powers off
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,

    /// Display power state applied at startup
    #[serde(default = "default_initial_power")]
    pub initial_power: DisplayPower,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_stream_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_stream_port")]
    pub port: u16,

    /// JPEG quality for stream encoding (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Basic-auth credentials for the stream endpoints. When either field is
/// missing the stream is served unauthenticated (a warning is logged).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Milliseconds between idle-mode sampling ticks
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,

    /// Milliseconds between active-mode streaming ticks
    #[serde(default = "default_active_tick_ms")]
    pub active_tick_ms: u64,

    /// Payload fan-out channel capacity (frames buffered per viewer)
    #[serde(default = "default_publisher_capacity")]
    pub publisher_capacity: usize,

    /// Consecutive capture failures before health degrades
    #[serde(default = "default_failure_threshold")]
    pub device_failure_threshold: u32,
}

impl WakecamConfig {
    /// Load configuration from the default file and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("wakecam.toml")
    }

    /// Load configuration from a specific file path. The file is optional;
    /// environment variables with the `WAKECAM_` prefix override it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "camera.low_resolution",
                vec![default_low_resolution().0, default_low_resolution().1],
            )?
            .set_default(
                "camera.high_resolution",
                vec![default_high_resolution().0, default_high_resolution().1],
            )?
            .set_default("camera.low_fps", default_low_fps())?
            .set_default("camera.high_fps", default_high_fps())?
            .set_default("camera.vflip", default_vflip())?
            .set_default("motion.threshold", default_motion_threshold())?
            .set_default("display.backlight_device", default_backlight_device())?
            .set_default(
                "display.inactivity_timeout_seconds",
                default_inactivity_timeout() as i64,
            )?
            .set_default("stream.ip", default_stream_ip())?
            .set_default("stream.port", default_stream_port() as i64)?
            .set_default("stream.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("system.idle_tick_ms", default_idle_tick_ms() as i64)?
            .set_default("system.active_tick_ms", default_active_tick_ms() as i64)?
            .set_default(
                "system.publisher_capacity",
                default_publisher_capacity() as i64,
            )?
            .set_default(
                "system.device_failure_threshold",
                default_failure_threshold() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("WAKECAM").separator("_"))
            .build()?;

        let config: WakecamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values. Runs once at startup; the loaded
    /// configuration is immutable for the process lifetime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.low_resolution.0 == 0 || self.camera.low_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera low resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.high_resolution.0 == 0 || self.camera.high_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera high resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.low_fps == 0 || self.camera.high_fps == 0 {
            return Err(ConfigError::Message(
                "Camera frame rates must be greater than 0".to_string(),
            ));
        }

        if self.motion.threshold < 0.0 {
            return Err(ConfigError::Message(
                "Motion threshold must not be negative".to_string(),
            ));
        }

        if self.display.inactivity_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Display inactivity timeout must be greater than 0".to_string(),
            ));
        }

        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Stream JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.system.idle_tick_ms == 0 || self.system.active_tick_ms == 0 {
            return Err(ConfigError::Message(
                "Tick intervals must be greater than 0".to_string(),
            ));
        }

        if self.system.publisher_capacity == 0 {
            return Err(ConfigError::Message(
                "Publisher capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.device_failure_threshold == 0 {
            return Err(ConfigError::Message(
                "Device failure threshold must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for WakecamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                low_resolution: default_low_resolution(),
                high_resolution: default_high_resolution(),
                low_fps: default_low_fps(),
                high_fps: default_high_fps(),
                vflip: default_vflip(),
            },
            motion: MotionConfig {
                threshold: default_motion_threshold(),
            },
            display: DisplayConfig {
                backlight_device: default_backlight_device(),
                inactivity_timeout_seconds: default_inactivity_timeout(),
                initial_power: default_initial_power(),
            },
            stream: StreamConfig {
                ip: default_stream_ip(),
                port: default_stream_port(),
                jpeg_quality: default_jpeg_quality(),
            },
            auth: AuthConfig::default(),
            system: SystemConfig {
                idle_tick_ms: default_idle_tick_ms(),
                active_tick_ms: default_active_tick_ms(),
                publisher_capacity: default_publisher_capacity(),
                device_failure_threshold: default_failure_threshold(),
            },
        }
    }
}

// Default value functions
fn default_low_resolution() -> (u32, u32) {
    (320, 180)
}
fn default_high_resolution() -> (u32, u32) {
    (1920, 1080)
}
fn default_low_fps() -> u32 {
    2
}
fn default_high_fps() -> u32 {
    10
}
fn default_vflip() -> bool {
    false
}

fn default_motion_threshold() -> f64 {
    10.0
}

fn default_backlight_device() -> String {
    "/sys/class/backlight/rpi_backlight/bl_power".to_string()
}
fn default_inactivity_timeout() -> u64 {
    15
}
fn default_initial_power() -> DisplayPower {
    DisplayPower::On
}

fn default_stream_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    8080
}
fn default_jpeg_quality() -> u8 {
    75
}

fn default_idle_tick_ms() -> u64 {
    1000
}
fn default_active_tick_ms() -> u64 {
    100
}
fn default_publisher_capacity() -> usize {
    16
}
fn default_failure_threshold() -> u32 {
    5
}
