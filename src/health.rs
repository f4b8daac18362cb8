use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Overall device health as exposed to the process supervisor and the
/// HTTP health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Tracks consecutive camera failures and escalates once a sustained
/// outage is observed. A single failed capture is an expected transient;
/// the coordinator retries on the next tick. Crossing the configured
/// threshold flips the published status to degraded until a capture
/// succeeds again.
pub struct DeviceHealth {
    consecutive_failures: u32,
    failure_threshold: u32,
    tx: watch::Sender<HealthStatus>,
}

impl DeviceHealth {
    pub fn new(failure_threshold: u32) -> (Self, watch::Receiver<HealthStatus>) {
        let (tx, rx) = watch::channel(HealthStatus::Healthy);
        (
            Self {
                consecutive_failures: 0,
                failure_threshold,
                tx,
            },
            rx,
        )
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;

        if self.consecutive_failures == self.failure_threshold {
            error!(
                "Camera degraded: {} consecutive capture failures",
                self.consecutive_failures
            );
            let _ = self.tx.send(HealthStatus::Degraded);
        } else if self.consecutive_failures < self.failure_threshold {
            warn!(
                "Capture failure {}/{} before degradation",
                self.consecutive_failures, self.failure_threshold
            );
        }
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures >= self.failure_threshold {
            info!(
                "Camera recovered after {} consecutive failures",
                self.consecutive_failures
            );
            let _ = self.tx.send(HealthStatus::Healthy);
        }
        self.consecutive_failures = 0;
    }

    pub fn status(&self) -> HealthStatus {
        *self.tx.borrow()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
