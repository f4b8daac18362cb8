use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// YUV 4:2:0 planar (I420) - luma plane first, used for motion sampling
    Yuv420,
    /// RGB24 - uncompressed RGB data, used for the streaming path
    Rgb24,
    /// Motion JPEG - already compressed JPEG frames
    Mjpeg,
}

impl FrameFormat {
    /// Expected buffer size in bytes for the given dimensions, or `None`
    /// for compressed formats with variable size.
    pub fn buffer_size(&self, width: u32, height: u32) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match self {
            FrameFormat::Yuv420 => Some(pixels * 3 / 2),
            FrameFormat::Rgb24 => Some(pixels * 3),
            FrameFormat::Mjpeg => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Resolution class a frame was captured at. Low frames feed the motion
/// detector, high frames feed the stream encoder - never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionClass {
    Low,
    High,
}

/// A single captured image buffer. Immutable once captured; the data is
/// shared via `Arc` so retaining the previous idle frame is cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic frame identifier assigned by the frame source
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Resolution class the frame was captured at
    pub class: ResolutionClass,
}

impl Frame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
        class: ResolutionClass,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
            class,
        }
    }

    /// The luma (Y) plane of a planar YUV frame. `None` for other formats
    /// or if the buffer is too short to contain a full plane.
    pub fn luma_plane(&self) -> Option<&[u8]> {
        if self.format != FrameFormat::Yuv420 {
            return None;
        }
        let len = self.width as usize * self.height as usize;
        self.data.get(..len)
    }

    /// Validate the buffer length against the format's expected size.
    /// Compressed formats always validate.
    pub fn validate_size(&self) -> bool {
        match self.format.buffer_size(self.width, self.height) {
            Some(expected) => self.data.len() == expected,
            None => true,
        }
    }
}

/// Derived, ephemeral result of comparing two consecutive low-res frames.
#[derive(Debug, Clone, Copy)]
pub struct MotionState {
    /// Whether the change score reached the configured threshold
    pub changed: bool,
    /// Mean absolute luma difference between the two frames
    pub score: f64,
    /// Capture timestamp of the current frame
    pub timestamp: SystemTime,
}
