use crate::config::DisplayConfig;
use crate::error::DisplayError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Display power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayPower {
    On,
    Off,
}

/// Write-only sink for backlight power commands.
///
/// The sysfs implementation is the production path; `RecordingBacklight`
/// stands in for it in tests and on development machines.
pub trait BacklightSink: Send {
    fn set_power(&mut self, on: bool) -> Result<(), DisplayError>;
}

/// Sysfs-backed backlight control. The kernel convention for `bl_power`
/// is inverted: "0" powers the panel on, "1" powers it off.
pub struct SysfsBacklight {
    path: PathBuf,
}

impl SysfsBacklight {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl BacklightSink for SysfsBacklight {
    fn set_power(&mut self, on: bool) -> Result<(), DisplayError> {
        let value = if on { "0" } else { "1" };

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| DisplayError::BacklightOpen {
                device: self.path.display().to_string(),
                source: e,
            })?;

        file.write_all(value.as_bytes())
            .map_err(|e| DisplayError::BacklightWrite { source: e })?;

        debug!(
            "Backlight set to {} (power value: {})",
            if on { "ON" } else { "OFF" },
            value
        );
        Ok(())
    }
}

/// Backlight sink that records commands instead of touching hardware.
/// Used by the state-machine tests and as a fallback on platforms
/// without a sysfs backlight.
#[derive(Default, Clone)]
pub struct RecordingBacklight {
    commands: std::sync::Arc<std::sync::Mutex<Vec<bool>>>,
}

impl RecordingBacklight {
    pub fn new() -> Self {
        Self::default()
    }

    /// All power commands issued so far, in order (`true` = on).
    pub fn commands(&self) -> Vec<bool> {
        self.commands.lock().unwrap().clone()
    }
}

impl BacklightSink for RecordingBacklight {
    fn set_power(&mut self, on: bool) -> Result<(), DisplayError> {
        self.commands.lock().unwrap().push(on);
        Ok(())
    }
}

/// Two-state display power state machine with inactivity hysteresis.
///
/// Motion powers the display on immediately; absence of motion powers it
/// off only once the inactivity timeout has fully elapsed. All mutation
/// goes through `on_motion`, invoked once per tick from the coordinator's
/// thread of control.
pub struct DisplayController {
    state: DisplayPower,
    last_motion_at: Instant,
    inactivity_timeout: Duration,
    sink: Box<dyn BacklightSink>,
}

impl DisplayController {
    /// Create the controller and apply the configured startup power state
    /// so the bookkeeping and the panel agree from the first tick.
    pub fn new(config: &DisplayConfig, mut sink: Box<dyn BacklightSink>) -> Self {
        let state = config.initial_power;

        if let Err(e) = sink.set_power(state == DisplayPower::On) {
            warn!("Failed to apply initial display power state: {}", e);
        }
        info!(
            "Display controller initialized: {:?}, inactivity timeout {}s",
            state, config.inactivity_timeout_seconds
        );

        Self {
            state,
            last_motion_at: Instant::now(),
            inactivity_timeout: Duration::from_secs(config.inactivity_timeout_seconds),
            sink,
        }
    }

    /// Feed one tick's motion signal into the state machine.
    ///
    /// Detected motion refreshes the activity timestamp unconditionally and
    /// powers the display on if it was off. Without motion, the display
    /// powers off once `now - last_motion_at` reaches the timeout. A failed
    /// backlight write is logged; the state transition is kept so the
    /// machine stays consistent even when the hardware misbehaves.
    pub fn on_motion(&mut self, detected: bool, now: Instant) {
        if detected {
            self.last_motion_at = now;

            if self.state == DisplayPower::Off {
                info!("Motion detected - powering display on");
                if let Err(e) = self.sink.set_power(true) {
                    warn!("Backlight power-on failed: {}", e);
                }
                self.state = DisplayPower::On;
            }
            return;
        }

        if self.state == DisplayPower::On
            && now.duration_since(self.last_motion_at) >= self.inactivity_timeout
        {
            info!(
                "No motion for {}s - powering display off",
                self.inactivity_timeout.as_secs()
            );
            if let Err(e) = self.sink.set_power(false) {
                warn!("Backlight power-off failed: {}", e);
            }
            self.state = DisplayPower::Off;
        }
    }

    pub fn power(&self) -> DisplayPower {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state == DisplayPower::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(
        initial: DisplayPower,
        timeout_seconds: u64,
    ) -> (DisplayController, RecordingBacklight) {
        let sink = RecordingBacklight::new();
        let config = DisplayConfig {
            backlight_device: "/dev/null".to_string(),
            inactivity_timeout_seconds: timeout_seconds,
            initial_power: initial,
        };
        let controller = DisplayController::new(&config, Box::new(sink.clone()));
        (controller, sink)
    }

    #[test]
    fn test_motion_powers_on_exactly_once() {
        let (mut controller, sink) = controller(DisplayPower::Off, 15);
        let t0 = Instant::now();

        controller.on_motion(true, t0);
        assert!(controller.is_on());

        // Repeated motion while already on issues no further commands
        controller.on_motion(true, t0 + Duration::from_secs(1));
        controller.on_motion(true, t0 + Duration::from_secs(2));

        let power_ons = sink.commands().iter().filter(|&&on| on).count();
        assert_eq!(power_ons, 1);
    }

    #[test]
    fn test_stays_on_until_timeout_elapses() {
        let (mut controller, _sink) = controller(DisplayPower::Off, 300);
        let t0 = Instant::now();

        controller.on_motion(true, t0);
        assert!(controller.is_on());

        controller.on_motion(false, t0 + Duration::from_secs(299));
        assert!(controller.is_on());

        controller.on_motion(false, t0 + Duration::from_secs(300));
        assert_eq!(controller.power(), DisplayPower::Off);
    }

    #[test]
    fn test_repeated_motion_refreshes_activity_timestamp() {
        let (mut controller, _sink) = controller(DisplayPower::Off, 10);
        let t0 = Instant::now();

        controller.on_motion(true, t0);
        controller.on_motion(true, t0 + Duration::from_secs(8));

        // Ten seconds past the first motion, but only two past the refresh
        controller.on_motion(false, t0 + Duration::from_secs(10));
        assert!(controller.is_on());

        controller.on_motion(false, t0 + Duration::from_secs(18));
        assert_eq!(controller.power(), DisplayPower::Off);
    }

    #[test]
    fn test_motion_after_power_off_reactivates() {
        let (mut controller, sink) = controller(DisplayPower::Off, 5);
        let t0 = Instant::now();

        controller.on_motion(true, t0);
        controller.on_motion(false, t0 + Duration::from_secs(5));
        assert_eq!(controller.power(), DisplayPower::Off);

        controller.on_motion(true, t0 + Duration::from_secs(20));
        assert!(controller.is_on());

        // Initial off, on, off, on
        assert_eq!(sink.commands(), vec![false, true, false, true]);
    }

    #[test]
    fn test_initial_state_applied_to_sink() {
        let (controller, sink) = controller(DisplayPower::On, 15);
        assert!(controller.is_on());
        assert_eq!(sink.commands(), vec![true]);
    }

    #[test]
    fn test_off_controller_stays_off_without_motion() {
        let (mut controller, sink) = controller(DisplayPower::Off, 5);
        let t0 = Instant::now();

        controller.on_motion(false, t0 + Duration::from_secs(60));
        assert_eq!(controller.power(), DisplayPower::Off);

        // Only the initial state command was issued
        assert_eq!(sink.commands(), vec![false]);
    }
}
