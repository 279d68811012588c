use crate::config::ReadinessConfig;
use crate::error::AcquireError;
use crate::sink::{SinkSignal, VideoSink};
use crate::stream::HardwareStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

/// Progress from camera-session start to a confirmed-renderable state.
/// Transitions only move forward, except `Error` (reachable from any
/// non-terminal state) and `Idle` (the terminal state after an explicit
/// stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Idle,
    Starting,
    StreamObtained,
    Ready,
    Playing,
    Error,
}

impl ReadinessState {
    fn rank(&self) -> u8 {
        match self {
            ReadinessState::Idle => 0,
            ReadinessState::Starting => 1,
            ReadinessState::StreamObtained => 2,
            ReadinessState::Ready => 3,
            ReadinessState::Playing => 4,
            ReadinessState::Error => 5,
        }
    }
}

/// Decides when the sink is actually producing valid frames. A stream being
/// obtained does not imply renderable: dimension and decode latency vary by
/// platform, so the detector combines sink signals with polled re-checks,
/// all converging on one idempotent mark-ready transition.
pub struct ReadinessDetector {
    config: ReadinessConfig,
    sink: Arc<VideoSink>,
    state: Mutex<ReadinessState>,
    ready: AtomicBool,
    signal_seen: AtomicBool,
    /// Bumped on every reset; observers carrying an older epoch become
    /// no-ops instead of relying on timer cancellation.
    epoch: AtomicU64,
}

impl ReadinessDetector {
    pub fn new(config: ReadinessConfig, sink: Arc<VideoSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(ReadinessState::Idle),
            ready: AtomicBool::new(false),
            signal_seen: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ReadinessState {
        *self.state.lock()
    }

    /// True once valid, non-degenerate frames have been confirmed at least once
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Forward-only transition; moving backwards is silently refused
    pub fn advance(&self, to: ReadinessState) {
        let mut state = self.state.lock();
        if to.rank() > state.rank() {
            trace!("Readiness {:?} -> {:?}", *state, to);
            *state = to;
        }
    }

    /// Enter the error state from any non-terminal state
    pub fn fail(&self, error: &AcquireError) {
        let mut state = self.state.lock();
        if *state == ReadinessState::Idle {
            return;
        }
        warn!("Readiness error from {:?}: {}", *state, error);
        *state = ReadinessState::Error;
    }

    /// Return to idle after an explicit stop. Outstanding observers and
    /// timers become no-ops.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        self.signal_seen.store(false, Ordering::SeqCst);
        *self.state.lock() = ReadinessState::Idle;
        debug!("Readiness reset to idle");
    }

    /// Dimensions the rest of the system should assume for this stream:
    /// track settings first (the sink can lag or misreport), then capability
    /// ranges (ideal, max, min), then the sink's own report, then the
    /// configured fallback.
    pub fn resolve_dimensions(&self, stream: &HardwareStream) -> (u32, u32) {
        self.observed_dimensions(stream)
            .unwrap_or(self.config.fallback_resolution)
    }

    /// Dimensions actually observed from the stream or sink, without the
    /// fallback. Readiness is judged on these: the fallback constant must
    /// never make a stream look renderable.
    fn observed_dimensions(&self, stream: &HardwareStream) -> Option<(u32, u32)> {
        if let Some(settings) = stream.primary_settings() {
            if let (Some(w), Some(h)) = (settings.width, settings.height) {
                return Some((w, h));
            }
        }

        if let Some(caps) = stream.primary_capabilities() {
            if let (Some(w), Some(h)) = (caps.width.preferred(), caps.height.preferred()) {
                return Some((w, h));
            }
        }

        self.sink.dimensions()
    }

    /// The single guarded transition every trigger converges on. Idempotent:
    /// once ready, further invocations are no-ops.
    fn try_mark_ready(&self, epoch: u64, stream: &HardwareStream) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        if self.ready.load(Ordering::SeqCst) {
            return true;
        }
        if !self.signal_seen.load(Ordering::SeqCst) {
            return false;
        }

        let min = self.config.min_dimension;
        match self.observed_dimensions(stream) {
            Some((w, h)) if w > min && h > min => {
                if self.ready.swap(true, Ordering::SeqCst) {
                    return true;
                }
                self.advance(ReadinessState::Ready);
                info!("Sink confirmed renderable at {}x{}", w, h);
                true
            }
            other => {
                trace!("Dimensions not yet valid: {:?}", other);
                false
            }
        }
    }

    /// Watch the attached stream until it is confirmed renderable or the
    /// final timeout expires. `on_timeout` fires at most once per epoch.
    pub fn observe<F>(self: &Arc<Self>, stream: HardwareStream, on_timeout: F)
    where
        F: Fn(AcquireError) + Send + Sync + 'static,
    {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let start = Instant::now();

        // Signal listener: every sink signal is a trigger, and canplay or
        // metadata with a paused sink also restarts playback. The sink is
        // never reloaded here - a reload would drop the attached source.
        {
            let detector = Arc::clone(self);
            let stream = stream.clone();
            let mut signals = self.sink.subscribe();
            tokio::spawn(async move {
                while let Ok(signal) = signals.recv().await {
                    if detector.epoch.load(Ordering::SeqCst) != epoch {
                        break;
                    }
                    detector.signal_seen.store(true, Ordering::SeqCst);

                    if matches!(signal, SinkSignal::MetadataLoaded | SinkSignal::CanPlay)
                        && detector.sink.is_paused()
                    {
                        debug!("Sink paused at {:?}, requesting playback", signal);
                        detector.sink.play();
                    }

                    detector.try_mark_ready(epoch, &stream);

                    if signal == SinkSignal::Playing && detector.is_ready() {
                        detector.advance(ReadinessState::Playing);
                    }
                }
            });
        }

        // Polled re-checks at increasing offsets, for platforms where the
        // signals fire before dimensions settle
        {
            let detector = Arc::clone(self);
            let stream = stream.clone();
            let schedule = self.config.recheck_schedule();
            tokio::spawn(async move {
                for offset in schedule {
                    sleep_until(start + offset).await;
                    if detector.epoch.load(Ordering::SeqCst) != epoch
                        || detector.ready.load(Ordering::SeqCst)
                    {
                        return;
                    }
                    trace!("Scheduled readiness re-check at {:?}", offset);
                    detector.try_mark_ready(epoch, &stream);
                }
            });
        }

        // Final deadline
        {
            let detector = Arc::clone(self);
            let stream = stream.clone();
            let timeout = self.config.render_timeout();
            let timeout_ms = self.config.render_timeout_ms;
            tokio::spawn(async move {
                sleep_until(start + timeout).await;
                if detector.epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                // One last chance before declaring failure
                if detector.try_mark_ready(epoch, &stream) {
                    return;
                }
                let error = AcquireError::RenderTimeout { timeout_ms };
                detector.fail(&error);
                on_timeout(error);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FramePixels;
    use crate::stream::{MediaTrack, TrackSettings};
    use std::time::Duration;
    use tokio::sync::watch;

    fn detector(sink: &Arc<VideoSink>) -> Arc<ReadinessDetector> {
        Arc::new(ReadinessDetector::new(ReadinessConfig::default(), Arc::clone(sink)))
    }

    fn stream_with_settings(
        settings: Option<TrackSettings>,
    ) -> (watch::Sender<Option<FramePixels>>, HardwareStream) {
        let (tx, rx) = watch::channel(None);
        let track = MediaTrack::new("test", None, settings, None);
        (tx, HardwareStream::new(vec![track], rx))
    }

    fn frame(width: u32, height: u32) -> FramePixels {
        FramePixels::new(width, height, vec![0u8; (width * height * 3) as usize])
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_forward_only_transitions() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);

        det.advance(ReadinessState::Starting);
        det.advance(ReadinessState::StreamObtained);
        assert_eq!(det.state(), ReadinessState::StreamObtained);

        // Backwards moves are refused
        det.advance(ReadinessState::Starting);
        assert_eq!(det.state(), ReadinessState::StreamObtained);

        det.advance(ReadinessState::Ready);
        det.advance(ReadinessState::Playing);
        assert_eq!(det.state(), ReadinessState::Playing);
    }

    #[test]
    fn test_error_unreachable_from_idle() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);

        det.fail(&AcquireError::DeviceNotFound);
        assert_eq!(det.state(), ReadinessState::Idle);

        det.advance(ReadinessState::Starting);
        det.fail(&AcquireError::DeviceNotFound);
        assert_eq!(det.state(), ReadinessState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_ready_from_signals() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);
        let (tx, stream) = stream_with_settings(Some(TrackSettings {
            width: Some(640),
            height: Some(480),
            ..Default::default()
        }));

        det.advance(ReadinessState::Starting);
        det.advance(ReadinessState::StreamObtained);
        sink.attach(&stream);
        det.observe(stream.clone(), |_| panic!("no timeout expected"));

        for _ in 0..4 {
            tx.send(Some(frame(640, 480))).unwrap();
            settle().await;
        }

        assert!(det.is_ready());
        assert_eq!(det.state(), ReadinessState::Playing);
        assert_eq!(det.resolve_dimensions(&stream), (640, 480));
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_stream_times_out() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);
        // No settings, no capabilities: only the sink's degenerate report
        let (tx, stream) = stream_with_settings(None);

        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&timed_out);

        det.advance(ReadinessState::Starting);
        det.advance(ReadinessState::StreamObtained);
        sink.attach(&stream);
        det.observe(stream.clone(), move |err| {
            assert!(matches!(err, AcquireError::RenderTimeout { .. }));
            flag.store(true, Ordering::SeqCst);
        });

        // Degenerate frames only, past the full timeout window
        for _ in 0..8 {
            tx.send(Some(frame(0, 0))).unwrap();
            tokio::time::sleep(Duration::from_millis(800)).await;
        }

        assert!(timed_out.load(Ordering::SeqCst));
        assert!(!det.is_ready());
        assert_eq!(det.state(), ReadinessState::Error);
        // Fallback is for consumers, never for the readiness decision
        assert_eq!(det.resolve_dimensions(&stream), (640, 480));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_preferred_over_lagging_sink() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);
        // Track settings carry the truth even while the sink reports 0x0
        let (tx, stream) = stream_with_settings(Some(TrackSettings {
            width: Some(1280),
            height: Some(720),
            ..Default::default()
        }));

        det.advance(ReadinessState::Starting);
        sink.attach(&stream);
        det.observe(stream.clone(), |_| panic!("no timeout expected"));

        tx.send(Some(frame(0, 0))).unwrap();
        settle().await;

        assert!(det.is_ready());
        assert_eq!(det.resolve_dimensions(&stream), (1280, 720));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_poll_picks_up_late_dimensions() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);
        let (tx, stream) = stream_with_settings(None);

        det.advance(ReadinessState::Starting);
        sink.attach(&stream);
        det.observe(stream.clone(), |_| panic!("no timeout expected"));

        // First signal arrives with degenerate dimensions
        tx.send(Some(frame(0, 0))).unwrap();
        settle().await;
        assert!(!det.is_ready());

        // Dimensions become valid later; a scheduled re-check finds them
        tx.send(Some(frame(640, 480))).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(det.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_sink_gets_play_request() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);
        let (tx, stream) = stream_with_settings(Some(TrackSettings {
            width: Some(640),
            height: Some(480),
            ..Default::default()
        }));

        det.advance(ReadinessState::Starting);
        sink.attach(&stream);
        sink.pause();
        det.observe(stream.clone(), |_| panic!("no timeout expected"));

        for _ in 0..5 {
            tx.send(Some(frame(640, 480))).unwrap();
            settle().await;
        }

        // The detector resumed playback when it saw signals on a paused sink
        assert!(!sink.is_paused());
        assert!(det.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_makes_timers_no_ops() {
        let sink = Arc::new(VideoSink::new());
        let det = detector(&sink);
        let (tx, stream) = stream_with_settings(None);

        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&timed_out);

        det.advance(ReadinessState::Starting);
        sink.attach(&stream);
        det.observe(stream.clone(), move |_| {
            flag.store(true, Ordering::SeqCst);
        });

        tx.send(Some(frame(0, 0))).unwrap();
        settle().await;

        // Stop before the deadline: the timeout timer must become a no-op
        det.reset();
        tokio::time::sleep(Duration::from_millis(6000)).await;

        assert!(!timed_out.load(Ordering::SeqCst));
        assert_eq!(det.state(), ReadinessState::Idle);
        assert!(!det.is_ready());
    }
}
