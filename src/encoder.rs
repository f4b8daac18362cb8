use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::frame::{Frame, FrameFormat, ResolutionClass};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::trace;

/// One JPEG image ready for delivery to stream viewers.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    pub frame_id: u64,
    pub timestamp: SystemTime,
    pub data: Bytes,
}

/// Stateless per-frame JPEG encoder for the streaming path.
///
/// Each high-resolution frame is encoded independently; frames the camera
/// already delivers as JPEG pass through untouched.
pub struct StreamEncoder {
    quality: u8,
}

impl StreamEncoder {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            quality: config.jpeg_quality,
        }
    }

    pub fn encode(&self, frame: &Frame) -> Result<EncodedPayload, StreamError> {
        if frame.class != ResolutionClass::High {
            return Err(StreamError::InvalidFrame {
                details: format!("expected a high-resolution frame, got {:?}", frame.class),
            });
        }

        let data = match frame.format {
            FrameFormat::Mjpeg => Bytes::copy_from_slice(&frame.data),
            FrameFormat::Rgb24 => {
                let img = RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
                    .ok_or_else(|| StreamError::InvalidFrame {
                        details: format!(
                            "RGB buffer too short for {}x{} frame",
                            frame.width, frame.height
                        ),
                    })?;

                let mut buf = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
                encoder
                    .encode_image(&img)
                    .map_err(|e| StreamError::Encoding {
                        details: e.to_string(),
                    })?;
                Bytes::from(buf)
            }
            FrameFormat::Yuv420 => {
                return Err(StreamError::InvalidFrame {
                    details: "YUV frames are not streamable".to_string(),
                });
            }
        };

        trace!(
            "encoded frame {} ({} bytes, quality {})",
            frame.id,
            data.len(),
            self.quality
        );

        Ok(EncodedPayload {
            frame_id: frame.id,
            timestamp: frame.timestamp,
            data,
        })
    }
}

/// Live payload fan-out to stream viewers.
///
/// Built on a bounded broadcast channel: each viewer attaches at the
/// current point in the sequence and receives payloads from there on. A
/// viewer that falls behind loses its oldest buffered frames rather than
/// growing an unbounded backlog.
#[derive(Clone)]
pub struct FramePublisher {
    tx: broadcast::Sender<EncodedPayload>,
}

impl FramePublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach at the current point in the live sequence. No catch-up
    /// semantics: payloads published before the call are not delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<EncodedPayload> {
        self.tx.subscribe()
    }

    /// Publish a payload to all attached viewers. Delivery is best-effort;
    /// with no viewers attached the payload is dropped silently.
    pub fn publish(&self, payload: EncodedPayload) {
        let _ = self.tx.send(payload);
    }

    pub fn viewer_streams(&self) -> usize {
        self.tx.receiver_count()
    }
}
