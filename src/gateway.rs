use crate::config::FacingMode;
use crate::error::AcquireError;
use crate::frame::FramePixels;
use crate::stream::{
    DimensionRange, HardwareStream, MediaTrack, TrackCapabilities, TrackSettings,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Failure reason reported by the platform media layer for a single
/// acquisition attempt (the analog of a DOMException name).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no matching device")]
    NotFound,

    #[error("device busy")]
    Busy,

    #[error("constraints not satisfiable")]
    Overconstrained,

    #[error("request aborted")]
    Aborted,

    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Map a per-attempt gateway failure onto the user-facing taxonomy
    pub fn to_acquire_error(&self) -> AcquireError {
        match self {
            GatewayError::PermissionDenied => AcquireError::PermissionDenied,
            GatewayError::NotFound => AcquireError::DeviceNotFound,
            GatewayError::Busy => AcquireError::DeviceBusy,
            GatewayError::Overconstrained => AcquireError::ConstraintsNotSatisfiable,
            GatewayError::Aborted => AcquireError::Other {
                details: "request aborted".to_string(),
            },
            GatewayError::Other(details) => AcquireError::Other {
                details: details.clone(),
            },
        }
    }
}

/// Constraint profile for one acquisition attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamConstraints {
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
    pub facing_mode: Option<FacingMode>,
    pub device_id: Option<String>,
}

impl StreamConstraints {
    /// Target resolution plus preferred facing mode
    pub fn ideal(resolution: (u32, u32), facing: FacingMode) -> Self {
        Self {
            ideal_width: Some(resolution.0),
            ideal_height: Some(resolution.1),
            facing_mode: Some(facing),
            device_id: None,
        }
    }

    /// Any video source, no constraints at all
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// One specific device by id
    pub fn exact_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }
}

/// One available video input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInputInfo {
    pub device_id: String,
    pub label: String,
}

/// Completion callback for the legacy acquisition entry point, which predates
/// promise-style APIs. The strategy chain adapts it via a oneshot channel.
pub type LegacyCallback =
    Box<dyn FnOnce(Result<HardwareStream, GatewayError>) + Send + 'static>;

/// Platform seam for hardware media access. Implementations wrap whatever
/// the host environment provides; [`SimulatedGateway`] ships in-crate for
/// tests and diagnostics.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Whether the execution context is secure (secure transport or loopback)
    fn is_secure_context(&self) -> bool;

    /// Whether the modern acquisition API exists
    fn has_media_api(&self) -> bool;

    /// Whether the legacy acquisition entry point exists
    fn has_legacy_api(&self) -> bool;

    /// Request a stream matching the given constraints
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<HardwareStream, GatewayError>;

    /// Enumerate available video input devices
    async fn enumerate_video_inputs(&self) -> Result<Vec<VideoInputInfo>, GatewayError>;

    /// Legacy callback-style request; completion is delivered to `callback`
    fn request_stream_legacy(&self, constraints: &StreamConstraints, callback: LegacyCallback);
}

/// Behavior profile of one simulated video input device
#[derive(Debug, Clone)]
pub struct SimulatedDeviceProfile {
    pub device_id: String,
    pub label: String,
    pub resolution: (u32, u32),
    pub frame_rate: f64,
    /// Number of degenerate (0x0) frames published before real frames start,
    /// reproducing the transient state seen on slow devices
    pub degenerate_lead_in: u32,
    /// Whether track settings carry the applied dimensions
    pub report_settings: bool,
    /// Whether track capabilities carry dimension ranges
    pub report_capabilities: bool,
}

impl Default for SimulatedDeviceProfile {
    fn default() -> Self {
        Self {
            device_id: "sim-video-0".to_string(),
            label: "Simulated Camera".to_string(),
            resolution: (640, 480),
            frame_rate: 30.0,
            degenerate_lead_in: 0,
            report_settings: true,
            report_capabilities: true,
        }
    }
}

impl SimulatedDeviceProfile {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1.0))
    }

    fn track_settings(&self) -> Option<TrackSettings> {
        self.report_settings.then(|| TrackSettings {
            width: Some(self.resolution.0),
            height: Some(self.resolution.1),
            frame_rate: Some(self.frame_rate),
            facing_mode: Some("user".to_string()),
        })
    }

    fn track_capabilities(&self) -> Option<TrackCapabilities> {
        self.report_capabilities.then(|| TrackCapabilities {
            width: DimensionRange {
                ideal: Some(self.resolution.0),
                max: Some(self.resolution.0),
                min: Some(160),
            },
            height: DimensionRange {
                ideal: Some(self.resolution.1),
                max: Some(self.resolution.1),
                min: Some(120),
            },
        })
    }
}

/// Scripted failures for each request shape, letting tests drive the
/// strategy chain down any path
#[derive(Debug, Clone, Default)]
pub struct SimulatedFailures {
    /// Failure for constrained requests (resolution/facing hints present)
    pub constrained: Option<GatewayError>,
    /// Failure for fully unconstrained requests
    pub unconstrained: Option<GatewayError>,
    /// Failure for exact-device requests
    pub exact_device: Option<GatewayError>,
    /// Failure for device enumeration
    pub enumerate: Option<GatewayError>,
    /// Failure for the legacy entry point
    pub legacy: Option<GatewayError>,
}

/// In-process media gateway producing synthetic frames, used by the test
/// suite and the diagnostic binary when no real platform layer is wired in
pub struct SimulatedGateway {
    secure_context: bool,
    media_api: bool,
    legacy_api: bool,
    devices: Vec<SimulatedDeviceProfile>,
    failures: Mutex<SimulatedFailures>,
    attempts: AtomicU32,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            secure_context: true,
            media_api: true,
            legacy_api: true,
            devices: vec![SimulatedDeviceProfile::default()],
            failures: Mutex::new(SimulatedFailures::default()),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn with_devices(mut self, devices: Vec<SimulatedDeviceProfile>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_failures(self, failures: SimulatedFailures) -> Self {
        *self.failures.lock() = failures;
        self
    }

    pub fn insecure(mut self) -> Self {
        self.secure_context = false;
        self
    }

    pub fn without_media_api(mut self) -> Self {
        self.media_api = false;
        self
    }

    pub fn without_legacy_api(mut self) -> Self {
        self.legacy_api = false;
        self
    }

    /// Total acquisition attempts served (successes and failures)
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn pick_device(&self, constraints: &StreamConstraints) -> Option<SimulatedDeviceProfile> {
        match &constraints.device_id {
            Some(id) => self.devices.iter().find(|d| &d.device_id == id).cloned(),
            None => self.devices.first().cloned(),
        }
    }

    fn open_device(&self, profile: SimulatedDeviceProfile) -> HardwareStream {
        let (feed_tx, feed_rx) = watch::channel(None);
        let track = MediaTrack::new(
            profile.label.clone(),
            Some(profile.device_id.clone()),
            profile.track_settings(),
            profile.track_capabilities(),
        );
        let stream = HardwareStream::new(vec![track.clone()], feed_rx);

        debug!(
            "Simulated device {} opened ({}x{} @ {}fps, {} degenerate lead-in frames)",
            profile.device_id,
            profile.resolution.0,
            profile.resolution.1,
            profile.frame_rate,
            profile.degenerate_lead_in
        );

        tokio::spawn(run_device(profile, track, feed_tx));
        stream
    }

    fn serve(
        &self,
        constraints: &StreamConstraints,
        scripted: Option<GatewayError>,
    ) -> Result<HardwareStream, GatewayError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        if let Some(err) = scripted {
            trace!("Simulated gateway failing request with {:?}", err);
            return Err(err);
        }

        match self.pick_device(constraints) {
            Some(profile) => Ok(self.open_device(profile)),
            None => Err(GatewayError::NotFound),
        }
    }
}

/// Frame pump for one simulated device. Publishes degenerate frames during
/// the lead-in, then solid-color frames at the device rate, and stops as
/// soon as the track is ended or the stream handle is gone.
async fn run_device(
    profile: SimulatedDeviceProfile,
    track: MediaTrack,
    feed: watch::Sender<Option<FramePixels>>,
) {
    let (width, height) = profile.resolution;
    let mut timer = tokio::time::interval(profile.frame_interval());
    let mut frame_id: u64 = 0;

    while track.is_live() {
        timer.tick().await;

        if !track.is_live() {
            break;
        }

        let frame = if frame_id < profile.degenerate_lead_in as u64 {
            FramePixels::new(0, 0, Vec::new())
        } else {
            let shade = (frame_id % 256) as u8;
            FramePixels::new(width, height, vec![shade; (width * height * 3) as usize])
        };

        if feed.send(Some(frame)).is_err() {
            break;
        }
        frame_id += 1;
    }

    trace!(
        "Simulated device {} stopped after {} frames",
        profile.device_id,
        frame_id
    );
}

#[async_trait]
impl MediaGateway for SimulatedGateway {
    fn is_secure_context(&self) -> bool {
        self.secure_context
    }

    fn has_media_api(&self) -> bool {
        self.media_api
    }

    fn has_legacy_api(&self) -> bool {
        self.legacy_api
    }

    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<HardwareStream, GatewayError> {
        let scripted = {
            let failures = self.failures.lock();
            if constraints.device_id.is_some() {
                failures.exact_device.clone()
            } else if constraints.is_unconstrained() {
                failures.unconstrained.clone()
            } else {
                failures.constrained.clone()
            }
        };

        self.serve(constraints, scripted)
    }

    async fn enumerate_video_inputs(&self) -> Result<Vec<VideoInputInfo>, GatewayError> {
        if let Some(err) = self.failures.lock().enumerate.clone() {
            return Err(err);
        }

        Ok(self
            .devices
            .iter()
            .map(|d| VideoInputInfo {
                device_id: d.device_id.clone(),
                label: d.label.clone(),
            })
            .collect())
    }

    fn request_stream_legacy(&self, constraints: &StreamConstraints, callback: LegacyCallback) {
        let scripted = self.failures.lock().legacy.clone();
        let result = self.serve(constraints, scripted);
        callback(result);
    }
}
