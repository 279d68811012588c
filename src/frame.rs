use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::SystemTime;

/// A single uncompressed RGB24 video frame as produced by a hardware stream
/// and held by the video sink. Pixel data is shared, never copied per reader.
#[derive(Debug, Clone)]
pub struct FramePixels {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Raw RGB24 data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Timestamp when the frame was produced
    pub timestamp: SystemTime,
}

impl FramePixels {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::new(data),
            timestamp: SystemTime::now(),
        }
    }

    /// Expected buffer length for RGB24
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Validate frame data size against dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Degenerate frames (0x0, 1x1, 2x2) are a known transient state on some
    /// devices and must never be treated as renderable.
    pub fn is_degenerate(&self, min_dimension: u32) -> bool {
        self.width <= min_dimension || self.height <= min_dimension
    }
}

/// An immutable still image captured from a single sink frame, encoded as
/// base64 JPEG. Created exactly once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    width: u32,
    height: u32,
    encoded: String,
    captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    /// Build a captured frame from raw JPEG bytes. Returns `None` for an
    /// empty payload - an empty encoding means the draw produced nothing.
    pub fn from_jpeg_bytes(width: u32, height: u32, jpeg: &[u8]) -> Option<Self> {
        if jpeg.is_empty() {
            return None;
        }

        Some(Self {
            width,
            height,
            encoded: base64::engine::general_purpose::STANDARD.encode(jpeg),
            captured_at: Utc::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Base64 payload without any data-URL prefix, the form the analysis
    /// backend expects in its JSON requests.
    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    /// Data-URL form for direct display in an image element.
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.encoded)
    }

    /// Length of the encoded payload in characters
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }
}
