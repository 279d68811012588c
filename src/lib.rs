pub mod acquire;
pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod lifecycle;
pub mod readiness;
pub mod session;
pub mod sink;
pub mod stream;

pub use acquire::{Acquisition, AcquisitionChain, StrategyKind};
pub use analysis::{
    AnalysisRequest, DetectionResponse, EmotionResponse, FaceBox, RegistrationRequest,
    VerificationResponse,
};
pub use capture::{DrawSurface, FrameCapturer, RasterSurface};
pub use config::{AcquisitionConfig, CaptureConfig, FacingMode, MoodcamConfig, ReadinessConfig};
pub use error::{AcquireError, CaptureError, MoodcamError, Result};
pub use frame::{CapturedFrame, FramePixels};
pub use gateway::{
    GatewayError, MediaGateway, SimulatedDeviceProfile, SimulatedFailures, SimulatedGateway,
    StreamConstraints, VideoInputInfo,
};
pub use lifecycle::{StartOutcome, StopOutcome, StreamLifecycle};
pub use readiness::{ReadinessDetector, ReadinessState};
pub use session::{CameraSession, SessionCallbacks};
pub use sink::{SinkReadyState, SinkSignal, VideoSink};
pub use stream::{
    DimensionRange, HardwareStream, MediaTrack, TrackCapabilities, TrackSettings, TrackState,
};
