use crate::frame::FramePixels;
use crate::stream::HardwareStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// How much decodable data the sink currently holds, mirroring the
/// readyState ladder of a video element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SinkReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Signals the sink emits as decode progresses. Any single signal is
/// unreliable across platforms, so the readiness detector listens to all of
/// them and additionally polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSignal {
    MetadataLoaded,
    DataLoaded,
    CanPlay,
    Playing,
}

#[derive(Default)]
struct SinkState {
    source: Option<HardwareStream>,
    dimensions: Option<(u32, u32)>,
    ready_state: Option<SinkReadyState>,
    paused: bool,
    latest_frame: Option<FramePixels>,
}

/// Rendering target a hardware stream is attached to. Holds a non-owning
/// back-reference to the current stream - the lifecycle manager remains the
/// sole owner and the only component allowed to stop tracks.
pub struct VideoSink {
    state: Mutex<SinkState>,
    signals: broadcast::Sender<SinkSignal>,
    /// Bumped on every attach/detach; a pump started for an older generation
    /// exits without touching sink state.
    generation: AtomicU64,
}

impl Default for VideoSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(32);
        Self {
            state: Mutex::new(SinkState::default()),
            signals,
            generation: AtomicU64::new(0),
        }
    }

    /// Attach a stream as the sink's source and begin following its frame
    /// feed. Any previously attached source is implicitly superseded.
    pub fn attach(self: &Arc<Self>, stream: &HardwareStream) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = self.state.lock();
            state.source = Some(stream.clone());
            state.dimensions = None;
            state.latest_frame = None;
            state.ready_state = Some(SinkReadyState::HaveNothing);
            state.paused = false;
        }

        debug!("Sink attached to stream {} (generation {})", stream.id(), generation);

        let sink = Arc::clone(self);
        let stream = stream.clone();
        tokio::spawn(async move {
            let mut feed = stream.frame_feed();
            loop {
                if feed.changed().await.is_err() {
                    trace!("Frame feed closed for stream {}", stream.id());
                    break;
                }
                if sink.generation.load(Ordering::SeqCst) != generation {
                    trace!("Sink pump superseded for stream {}", stream.id());
                    break;
                }
                let frame = feed.borrow_and_update().clone();
                if let Some(frame) = frame {
                    sink.ingest_frame(generation, frame);
                }
            }
        });
    }

    /// Clear the sink's source reference and all derived state
    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(stream) = state.source.take() {
            debug!("Sink detached from stream {}", stream.id());
        }
        state.dimensions = None;
        state.latest_frame = None;
        state.ready_state = None;
        state.paused = false;
    }

    /// Resume a paused sink. If enough data is already buffered this emits
    /// the playing signal immediately.
    pub fn play(&self) {
        let emit = {
            let mut state = self.state.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
            if state.ready_state >= Some(SinkReadyState::HaveFutureData) {
                state.ready_state = Some(SinkReadyState::HaveEnoughData);
                true
            } else {
                false
            }
        };

        if emit {
            let _ = self.signals.send(SinkSignal::Playing);
        }
    }

    /// Pause rendering. The ready state ladder stalls below the playing
    /// level until `play()` is called.
    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    /// One frame arrived from the attached stream's feed. Advances the ready
    /// state ladder one rung per frame and emits the matching signal.
    fn ingest_frame(&self, generation: u64, frame: FramePixels) {
        let signal = {
            let mut state = self.state.lock();

            // Re-check under the lock: a detach may have won the race
            if self.generation.load(Ordering::SeqCst) != generation || state.source.is_none() {
                return;
            }

            state.dimensions = Some((frame.width, frame.height));
            state.latest_frame = Some(frame);

            match state.ready_state {
                Some(SinkReadyState::HaveNothing) => {
                    state.ready_state = Some(SinkReadyState::HaveMetadata);
                    Some(SinkSignal::MetadataLoaded)
                }
                Some(SinkReadyState::HaveMetadata) => {
                    state.ready_state = Some(SinkReadyState::HaveCurrentData);
                    Some(SinkSignal::DataLoaded)
                }
                Some(SinkReadyState::HaveCurrentData) => {
                    state.ready_state = Some(SinkReadyState::HaveFutureData);
                    Some(SinkSignal::CanPlay)
                }
                Some(SinkReadyState::HaveFutureData) if !state.paused => {
                    state.ready_state = Some(SinkReadyState::HaveEnoughData);
                    Some(SinkSignal::Playing)
                }
                _ => None,
            }
        };

        if let Some(signal) = signal {
            trace!("Sink signal: {:?}", signal);
            let _ = self.signals.send(signal);
        }
    }

    /// Subscribe to sink signals
    pub fn subscribe(&self) -> broadcast::Receiver<SinkSignal> {
        self.signals.subscribe()
    }

    pub fn source(&self) -> Option<HardwareStream> {
        self.state.lock().source.clone()
    }

    pub fn has_source(&self) -> bool {
        self.state.lock().source.is_some()
    }

    /// Dimensions as reported by the sink itself. These can lag behind the
    /// stream's track settings on some platforms.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.state.lock().dimensions
    }

    pub fn ready_state(&self) -> SinkReadyState {
        self.state
            .lock()
            .ready_state
            .unwrap_or(SinkReadyState::HaveNothing)
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// The most recent frame delivered by the attached stream
    pub fn latest_frame(&self) -> Option<FramePixels> {
        self.state.lock().latest_frame.clone()
    }
}
