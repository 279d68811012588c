use thiserror::Error;

/// Errors raised while acquiring a hardware video stream or waiting for it
/// to become renderable. Each variant maps to a distinct, actionable
/// user-facing message via [`AcquireError::user_message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    DeviceNotFound,

    #[error("camera device is busy")]
    DeviceBusy,

    #[error("requested camera constraints not satisfiable")]
    ConstraintsNotSatisfiable,

    #[error("media access requires a secure or loopback origin")]
    InsecureContext,

    #[error("no media acquisition API available on this platform")]
    UnsupportedPlatform,

    #[error("stream acquired but no valid frames within {timeout_ms}ms")]
    RenderTimeout { timeout_ms: u64 },

    #[error("acquisition failed: {details}")]
    Other { details: String },
}

impl AcquireError {
    /// Actionable message suitable for direct display, never raw error text.
    pub fn user_message(&self) -> &'static str {
        match self {
            AcquireError::PermissionDenied => {
                "Camera access was denied. Please allow camera access in your browser or system settings."
            }
            AcquireError::DeviceNotFound => {
                "No camera was found. Please connect a camera and try again."
            }
            AcquireError::DeviceBusy => {
                "The camera is in use by another application or tab. Close it and try again."
            }
            AcquireError::ConstraintsNotSatisfiable => {
                "The camera does not support the requested resolution. Try again with default settings."
            }
            AcquireError::InsecureContext => {
                "Camera access requires a secure (HTTPS or localhost) connection."
            }
            AcquireError::UnsupportedPlatform => {
                "This browser or platform does not support camera access."
            }
            AcquireError::RenderTimeout { .. } => {
                "The camera started but is not producing video. Check that it is not covered or disabled."
            }
            AcquireError::Other { .. } => {
                "The camera could not be started. Please try again."
            }
        }
    }

    /// Relative specificity used to pick which failure to surface after the
    /// strategy chain is exhausted. Higher wins.
    pub fn specificity(&self) -> u8 {
        match self {
            AcquireError::InsecureContext => 7,
            AcquireError::UnsupportedPlatform => 7,
            AcquireError::PermissionDenied => 6,
            AcquireError::DeviceBusy => 5,
            AcquireError::DeviceNotFound => 4,
            AcquireError::ConstraintsNotSatisfiable => 3,
            AcquireError::RenderTimeout { .. } => 2,
            AcquireError::Other { .. } => 1,
        }
    }
}

/// Errors internal to the frame capturer. These never escape `capture()`,
/// which maps them to `None`; they exist so the surface implementations can
/// report what went wrong to the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("drawing surface unavailable")]
    SurfaceUnavailable,

    #[error("sink has no decodable frame data")]
    InsufficientData,

    #[error("degenerate frame dimensions {width}x{height}")]
    DegenerateDimensions { width: u32, height: u32 },

    #[error("frame draw failed: {details}")]
    DrawFailed { details: String },

    #[error("JPEG encoding failed: {details}")]
    EncodingFailed { details: String },

    #[error("encoded payload was empty")]
    EmptyPayload,
}

#[derive(Error, Debug)]
pub enum MoodcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl MoodcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Message safe to hand to the `on_error` callback.
    pub fn user_message(&self) -> String {
        match self {
            MoodcamError::Acquire(e) => e.user_message().to_string(),
            MoodcamError::Capture(_) => {
                "Could not capture an image from the camera. Please try again.".to_string()
            }
            other => format!("Camera error: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MoodcamError>;
