use crate::frame::FramePixels;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Ready-state of a single media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Track is delivering media
    Live,
    /// Track has been stopped and will never deliver media again
    Ended,
}

/// Dimension range reported by track capabilities (ideal, then max, then min
/// is the preference order when settings are absent)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionRange {
    pub ideal: Option<u32>,
    pub max: Option<u32>,
    pub min: Option<u32>,
}

impl DimensionRange {
    /// Best available value in preference order
    pub fn preferred(&self) -> Option<u32> {
        self.ideal.or(self.max).or(self.min)
    }
}

/// Actual settings the device applied to a track. Preferred over
/// sink-reported dimensions, which can lag or misreport on some platforms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub facing_mode: Option<String>,
}

/// Capability ranges the device advertises for a track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackCapabilities {
    pub width: DimensionRange,
    pub height: DimensionRange,
}

/// A single media channel (one camera feed) within a stream
#[derive(Clone)]
pub struct MediaTrack {
    id: Uuid,
    label: String,
    device_id: Option<String>,
    state: Arc<Mutex<TrackState>>,
    settings: Option<TrackSettings>,
    capabilities: Option<TrackCapabilities>,
}

impl MediaTrack {
    pub fn new(
        label: impl Into<String>,
        device_id: Option<String>,
        settings: Option<TrackSettings>,
        capabilities: Option<TrackCapabilities>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            device_id,
            state: Arc::new(Mutex::new(TrackState::Live)),
            settings,
            capabilities,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn state(&self) -> TrackState {
        *self.state.lock()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    pub fn settings(&self) -> Option<&TrackSettings> {
        self.settings.as_ref()
    }

    pub fn capabilities(&self) -> Option<&TrackCapabilities> {
        self.capabilities.as_ref()
    }

    /// Transition the track to ended. Restricted to the lifecycle manager;
    /// no other component may end tracks directly.
    pub(crate) fn stop(&self) {
        let mut state = self.state.lock();
        if *state == TrackState::Live {
            debug!("Stopping track {} ({})", self.id, self.label);
            *state = TrackState::Ended;
        }
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish()
    }
}

struct StreamInner {
    id: Uuid,
    tracks: Vec<MediaTrack>,
    feed: watch::Receiver<Option<FramePixels>>,
}

/// Ownership handle to a live video source. Cheap to clone; clones refer to
/// the same underlying tracks. Exactly one stream is "current" at a time and
/// the lifecycle manager exclusively owns it - other components only observe.
#[derive(Clone)]
pub struct HardwareStream {
    inner: Arc<StreamInner>,
}

impl HardwareStream {
    pub fn new(tracks: Vec<MediaTrack>, feed: watch::Receiver<Option<FramePixels>>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4(),
                tracks,
                feed,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    /// An active stream has at least one track whose ready-state is not ended
    pub fn is_active(&self) -> bool {
        self.inner.tracks.iter().any(|t| t.is_live())
    }

    /// Handle identity: do two handles refer to the same underlying stream
    pub fn same_stream(&self, other: &HardwareStream) -> bool {
        self.inner.id == other.inner.id
    }

    /// Settings of the first video track, if any
    pub fn primary_settings(&self) -> Option<&TrackSettings> {
        self.inner.tracks.first().and_then(|t| t.settings())
    }

    /// Capabilities of the first video track, if any
    pub fn primary_capabilities(&self) -> Option<&TrackCapabilities> {
        self.inner.tracks.first().and_then(|t| t.capabilities())
    }

    /// Subscribe to the latest-frame feed the device publishes into
    pub fn frame_feed(&self) -> watch::Receiver<Option<FramePixels>> {
        self.inner.feed.clone()
    }

    /// Stop every track. Restricted to the lifecycle manager.
    pub(crate) fn stop_tracks(&self) {
        for track in &self.inner.tracks {
            track.stop();
        }
    }
}

impl fmt::Debug for HardwareStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks.len())
            .field("active", &self.is_active())
            .finish()
    }
}
