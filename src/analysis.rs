//! Request and response shapes of the face/mood analysis backend the
//! captured frames are posted to. The engine itself never performs this
//! exchange - it only hands back the encoded frame - but callers need the
//! shapes, so they live here next to the capture types.

use crate::frame::CapturedFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body for the `detect` and `analyze` endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Base64 encoded JPEG, no data-URL prefix
    pub image: String,
}

impl AnalysisRequest {
    pub fn from_capture(frame: &CapturedFrame) -> Self {
        Self {
            image: frame.as_base64().to_string(),
        }
    }
}

/// Body for the `register` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub image: String,
    /// Optional reference image to verify against during registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_image: Option<String>,
}

/// Bounding box of one detected face, in pixel coordinates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f64,
}

/// Response of the `detect` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub success: bool,
    #[serde(default)]
    pub faces: Vec<FaceBox>,
}

/// Response of the `verify` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub verified: bool,
    pub confidence: f64,
}

/// Response of the `analyze` endpoint: per-emotion scores in 0..1 plus the
/// dominant label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionResponse {
    pub success: bool,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub all_emotions: HashMap<String, f64>,
}
