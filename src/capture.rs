use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::frame::{CapturedFrame, FramePixels};
use crate::sink::{SinkReadyState, VideoSink};
use image::codecs::jpeg::JpegEncoder;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Offscreen surface a sink frame is drawn into before encoding. The
/// capturer always resizes it to the live frame dimensions first, so
/// implementations never see a stale size.
pub trait DrawSurface: Send {
    fn set_dimensions(&mut self, width: u32, height: u32);

    fn dimensions(&self) -> (u32, u32);

    /// Draw one frame into the surface. The frame dimensions always match
    /// the surface dimensions when called through the capturer.
    fn draw(&mut self, frame: &FramePixels) -> Result<(), CaptureError>;

    /// Encode the drawn contents as JPEG at the given quality (1-100)
    fn encode_jpeg(&mut self, quality: u8) -> Result<Vec<u8>, CaptureError>;
}

/// In-memory RGB surface backed by the image crate
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Option<Vec<u8>>,
}

impl RasterSurface {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: None,
        }
    }
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawSurface for RasterSurface {
    fn set_dimensions(&mut self, width: u32, height: u32) {
        if (self.width, self.height) != (width, height) {
            self.width = width;
            self.height = height;
            self.pixels = None;
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw(&mut self, frame: &FramePixels) -> Result<(), CaptureError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(CaptureError::DrawFailed {
                details: format!(
                    "frame {}x{} does not match surface {}x{}",
                    frame.width, frame.height, self.width, self.height
                ),
            });
        }
        if !frame.validate_size() {
            return Err(CaptureError::DrawFailed {
                details: format!(
                    "frame buffer of {} bytes does not match {}x{} RGB24",
                    frame.data.len(),
                    frame.width,
                    frame.height
                ),
            });
        }

        self.pixels = Some(frame.data.as_ref().clone());
        Ok(())
    }

    fn encode_jpeg(&mut self, quality: u8) -> Result<Vec<u8>, CaptureError> {
        let pixels = self
            .pixels
            .as_ref()
            .ok_or(CaptureError::InsufficientData)?;

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode(pixels, self.width, self.height, image::ColorType::Rgb8)
            .map_err(|e| CaptureError::EncodingFailed {
                details: e.to_string(),
            })?;

        Ok(out)
    }
}

/// Produces a single still image from the current sink frame. All
/// precondition failures yield `None`, never an error - deciding whether a
/// missed capture is worth reporting is the caller's business.
pub struct FrameCapturer {
    config: CaptureConfig,
    min_dimension: u32,
    sink: Arc<VideoSink>,
    surface: Mutex<Option<Box<dyn DrawSurface>>>,
}

impl FrameCapturer {
    pub fn new(config: CaptureConfig, min_dimension: u32, sink: Arc<VideoSink>) -> Self {
        Self {
            config,
            min_dimension,
            sink,
            surface: Mutex::new(Some(Box::new(RasterSurface::new()))),
        }
    }

    /// Replace the drawing surface, or remove it entirely
    pub fn set_surface(&self, surface: Option<Box<dyn DrawSurface>>) {
        *self.surface.lock() = surface;
    }

    /// Snapshot the current frame as a base64 JPEG. Preconditions, checked
    /// in order: a surface and a sink frame exist, the sink holds enough
    /// data to draw, and the reported dimensions are non-degenerate.
    pub fn capture(&self) -> Option<CapturedFrame> {
        let mut surface_slot = self.surface.lock();
        let Some(surface) = surface_slot.as_mut() else {
            debug!("Capture skipped: no drawing surface");
            return None;
        };

        let Some(frame) = self.sink.latest_frame() else {
            debug!("Capture skipped: sink has no frame");
            return None;
        };

        let ready = self.sink.ready_state();
        if ready < SinkReadyState::HaveCurrentData {
            debug!("Capture skipped: sink ready state {:?}", ready);
            return None;
        }

        let Some((width, height)) = self.sink.dimensions() else {
            debug!("Capture skipped: sink reports no dimensions");
            return None;
        };
        if width <= self.min_dimension || height <= self.min_dimension {
            debug!(
                "Capture skipped: degenerate dimensions {}x{}",
                width, height
            );
            return None;
        }

        // Always size to the live frame, never a cached dimension
        surface.set_dimensions(frame.width, frame.height);

        if let Err(e) = surface.draw(&frame) {
            debug!("Capture draw failed: {}", e);
            return None;
        }

        let jpeg = match surface.encode_jpeg(self.config.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Capture encoding failed: {}", e);
                return None;
            }
        };

        match CapturedFrame::from_jpeg_bytes(frame.width, frame.height, &jpeg) {
            Some(captured) => {
                trace!(
                    "Captured {}x{} frame, {} base64 chars",
                    captured.width(),
                    captured.height(),
                    captured.encoded_len()
                );
                Some(captured)
            }
            None => {
                debug!("Capture rejected: empty encoded payload");
                None
            }
        }
    }

    /// Diagnostic: report whether a capture would currently succeed,
    /// without surfacing the image
    pub fn test_capture(&self) -> bool {
        let ok = self.capture().is_some();
        info!("Test capture {}", if ok { "succeeded" } else { "failed" });
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{HardwareStream, MediaTrack};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::watch;

    /// Surface that records calls and returns a scripted payload
    struct MockSurface {
        dims: (u32, u32),
        draw_calls: Arc<AtomicU32>,
        last_draw_dims: Arc<Mutex<Option<(u32, u32)>>>,
        payload: Vec<u8>,
    }

    impl DrawSurface for MockSurface {
        fn set_dimensions(&mut self, width: u32, height: u32) {
            self.dims = (width, height);
        }

        fn dimensions(&self) -> (u32, u32) {
            self.dims
        }

        fn draw(&mut self, frame: &FramePixels) -> Result<(), CaptureError> {
            self.draw_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_draw_dims.lock() = Some((frame.width, frame.height));
            Ok(())
        }

        fn encode_jpeg(&mut self, _quality: u8) -> Result<Vec<u8>, CaptureError> {
            Ok(self.payload.clone())
        }
    }

    fn frame(width: u32, height: u32) -> FramePixels {
        FramePixels::new(width, height, vec![128u8; (width * height * 3) as usize])
    }

    async fn sink_with_frames(frames: &[FramePixels]) -> Arc<VideoSink> {
        let sink = Arc::new(VideoSink::new());
        let (tx, rx) = watch::channel(None);
        let track = MediaTrack::new("test", None, None, None);
        let stream = HardwareStream::new(vec![track], rx);
        sink.attach(&stream);
        for f in frames {
            tx.send(Some(f.clone())).unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        sink
    }

    fn capturer(sink: Arc<VideoSink>) -> FrameCapturer {
        FrameCapturer::new(CaptureConfig::default(), 2, sink)
    }

    #[tokio::test]
    async fn test_capture_happy_path_draws_once_at_frame_size() {
        let sink = sink_with_frames(&[frame(640, 480), frame(640, 480)]).await;
        let cap = capturer(Arc::clone(&sink));

        let draw_calls = Arc::new(AtomicU32::new(0));
        let last_dims = Arc::new(Mutex::new(None));
        cap.set_surface(Some(Box::new(MockSurface {
            dims: (0, 0),
            draw_calls: Arc::clone(&draw_calls),
            last_draw_dims: Arc::clone(&last_dims),
            payload: vec![0xFF, 0xD8, 0xFF],
        })));

        let captured = cap.capture().expect("capture should succeed");
        assert_eq!(captured.width(), 640);
        assert_eq!(captured.height(), 480);
        assert!(!captured.as_base64().is_empty());
        assert_eq!(draw_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*last_dims.lock(), Some((640, 480)));
    }

    #[tokio::test]
    async fn test_capture_none_without_surface() {
        let sink = sink_with_frames(&[frame(640, 480), frame(640, 480)]).await;
        let cap = capturer(sink);
        cap.set_surface(None);
        assert!(cap.capture().is_none());
    }

    #[tokio::test]
    async fn test_capture_none_without_frame() {
        let sink = Arc::new(VideoSink::new());
        let cap = capturer(sink);
        assert!(cap.capture().is_none());
        assert!(!cap.test_capture());
    }

    #[tokio::test]
    async fn test_capture_none_before_data_loaded() {
        // One frame only reaches the metadata rung
        let sink = sink_with_frames(&[frame(640, 480)]).await;
        assert_eq!(sink.ready_state(), SinkReadyState::HaveMetadata);
        let cap = capturer(sink);
        assert!(cap.capture().is_none());
    }

    #[tokio::test]
    async fn test_capture_none_on_degenerate_dimensions() {
        let sink = sink_with_frames(&[frame(2, 2), frame(2, 2), frame(2, 2)]).await;
        let cap = capturer(sink);
        assert!(cap.capture().is_none());
    }

    #[tokio::test]
    async fn test_capture_rejects_empty_payload() {
        let sink = sink_with_frames(&[frame(640, 480), frame(640, 480)]).await;
        let cap = capturer(sink);
        cap.set_surface(Some(Box::new(MockSurface {
            dims: (0, 0),
            draw_calls: Arc::new(AtomicU32::new(0)),
            last_draw_dims: Arc::new(Mutex::new(None)),
            payload: Vec::new(),
        })));

        assert!(cap.capture().is_none());
    }

    #[tokio::test]
    async fn test_raster_surface_encodes_real_jpeg() {
        let sink = sink_with_frames(&[frame(32, 24), frame(32, 24)]).await;
        let cap = capturer(sink);

        let captured = cap.capture().expect("capture should succeed");
        assert_eq!(captured.width(), 32);
        assert_eq!(captured.height(), 24);

        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(captured.as_base64())
            .unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_raster_surface_rejects_mismatched_frame() {
        let mut surface = RasterSurface::new();
        surface.set_dimensions(640, 480);
        let err = surface.draw(&frame(320, 240)).unwrap_err();
        assert!(matches!(err, CaptureError::DrawFailed { .. }));
    }

    #[test]
    fn test_raster_surface_requires_draw_before_encode() {
        let mut surface = RasterSurface::new();
        surface.set_dimensions(640, 480);
        let err = surface.encode_jpeg(92).unwrap_err();
        assert_eq!(err, CaptureError::InsufficientData);
    }
}
