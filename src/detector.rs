use crate::config::MotionConfig;
use crate::error::MotionError;
use crate::frame::{Frame, FrameFormat, MotionState, ResolutionClass};
use tracing::trace;

/// Frame-pair motion detector.
///
/// Computes the mean absolute luma difference between two consecutive
/// low-resolution frames and compares it against a fixed threshold. Pure
/// computation with no hardware access, so it is testable without a camera.
pub struct MotionDetector {
    threshold: f64,
}

impl MotionDetector {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            threshold: config.threshold,
        }
    }

    /// Score the current frame against the previous one.
    ///
    /// Both frames must be low-resolution YUV with matching dimensions.
    /// With no previous frame (the first tick after startup or a mode
    /// switch) the result is deterministically "no motion".
    pub fn detect(
        &self,
        previous: Option<&Frame>,
        current: &Frame,
    ) -> Result<MotionState, MotionError> {
        let current_luma = Self::require_luma(current)?;

        let previous = match previous {
            Some(prev) => prev,
            None => {
                trace!("no previous frame; reporting no motion");
                return Ok(MotionState {
                    changed: false,
                    score: 0.0,
                    timestamp: current.timestamp,
                });
            }
        };

        let previous_luma = Self::require_luma(previous)?;

        if previous.width != current.width || previous.height != current.height {
            return Err(MotionError::InvalidInput {
                details: format!(
                    "frame dimensions differ: {}x{} vs {}x{}",
                    previous.width, previous.height, current.width, current.height
                ),
            });
        }

        let total: u64 = previous_luma
            .iter()
            .zip(current_luma.iter())
            .map(|(&a, &b)| a.abs_diff(b) as u64)
            .sum();

        let score = total as f64 / current_luma.len() as f64;
        let changed = score >= self.threshold;

        trace!(score, changed, "frame pair scored");

        Ok(MotionState {
            changed,
            score,
            timestamp: current.timestamp,
        })
    }

    fn require_luma(frame: &Frame) -> Result<&[u8], MotionError> {
        if frame.class != ResolutionClass::Low {
            return Err(MotionError::InvalidInput {
                details: format!("expected a low-resolution frame, got {:?}", frame.class),
            });
        }
        if frame.format != FrameFormat::Yuv420 {
            return Err(MotionError::InvalidInput {
                details: format!("expected a YUV frame, got {:?}", frame.format),
            });
        }
        frame.luma_plane().ok_or_else(|| MotionError::InvalidInput {
            details: format!(
                "frame buffer too short for {}x{} luma plane",
                frame.width, frame.height
            ),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    const WIDTH: u32 = 16;
    const HEIGHT: u32 = 12;

    fn low_frame(id: u64, luma: u8) -> Frame {
        let pixels = (WIDTH * HEIGHT) as usize;
        let mut data = vec![luma; pixels];
        data.extend(vec![128u8; pixels / 2]);
        Frame::new(
            id,
            SystemTime::now(),
            data,
            WIDTH,
            HEIGHT,
            FrameFormat::Yuv420,
            ResolutionClass::Low,
        )
    }

    fn detector(threshold: f64) -> MotionDetector {
        MotionDetector::new(&MotionConfig { threshold })
    }

    #[test]
    fn test_identical_frames_report_no_motion() {
        let detector = detector(10.0);
        let a = low_frame(1, 100);
        let b = low_frame(2, 100);

        let state = detector.detect(Some(&a), &b).unwrap();
        assert!(!state.changed);
        assert_eq!(state.score, 0.0);
    }

    #[test]
    fn test_score_above_threshold_reports_motion() {
        let detector = detector(10.0);
        let a = low_frame(1, 100);
        let b = low_frame(2, 115);

        let state = detector.detect(Some(&a), &b).unwrap();
        assert!(state.changed);
        assert_eq!(state.score, 15.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let detector = detector(10.0);
        let a = low_frame(1, 100);
        let exactly = low_frame(2, 110);
        let just_under = low_frame(3, 109);

        // Score equal to the threshold counts as motion
        assert!(detector.detect(Some(&a), &exactly).unwrap().changed);
        assert!(!detector.detect(Some(&a), &just_under).unwrap().changed);
    }

    #[test]
    fn test_first_tick_never_reports_motion() {
        let detector = detector(0.0);
        let current = low_frame(1, 255);

        // Even with a zero threshold the first tick is quiet
        let state = detector.detect(None, &current).unwrap();
        assert!(!state.changed);
        assert_eq!(state.score, 0.0);
    }

    #[test]
    fn test_rejects_wrong_resolution_class() {
        let detector = detector(10.0);
        let high = Frame::new(
            1,
            SystemTime::now(),
            vec![0u8; (WIDTH * HEIGHT * 3) as usize],
            WIDTH,
            HEIGHT,
            FrameFormat::Rgb24,
            ResolutionClass::High,
        );

        assert!(detector.detect(None, &high).is_err());
    }

    #[test]
    fn test_rejects_mismatched_dimensions() {
        let detector = detector(10.0);
        let a = low_frame(1, 100);
        let pixels = 8 * 6;
        let mut data = vec![100u8; pixels];
        data.extend(vec![128u8; pixels / 2]);
        let smaller = Frame::new(
            2,
            SystemTime::now(),
            data,
            8,
            6,
            FrameFormat::Yuv420,
            ResolutionClass::Low,
        );

        assert!(detector.detect(Some(&a), &smaller).is_err());
    }
}
