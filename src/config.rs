use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Preferred camera facing direction, mirroring the facing-mode hint of
/// browser media constraints.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front-facing camera (selfie view) - the default for face analysis.
    User,
    /// Rear-facing camera.
    Environment,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MoodcamConfig {
    pub acquisition: AcquisitionConfig,
    pub readiness: ReadinessConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// Ideal resolution hint (width, height) for the first strategy
    #[serde(default = "default_ideal_resolution")]
    pub ideal_resolution: (u32, u32),

    /// Preferred camera facing direction
    #[serde(default = "default_facing_mode")]
    pub facing_mode: FacingMode,

    /// Start acquisition as soon as the session is created
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    /// Delay between failed acquisition strategies in milliseconds.
    /// Some drivers need release time between failed opens.
    #[serde(default = "default_inter_attempt_delay_ms")]
    pub inter_attempt_delay_ms: u64,

    /// Delay after releasing a stale stream before reacquiring, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Streams younger than this window (milliseconds) are protected from
    /// guarded stop calls
    #[serde(default = "default_protect_window_ms")]
    pub protect_window_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReadinessConfig {
    /// Frames with width or height at or below this are rejected as degenerate
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Re-check delays (milliseconds) applied when dimensions are still
    /// invalid after the initial signal
    #[serde(default = "default_recheck_schedule_ms")]
    pub recheck_schedule_ms: Vec<u64>,

    /// Final deadline (milliseconds) before declaring a render timeout
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Resolution assumed when neither track settings nor capabilities nor
    /// the sink report usable dimensions
    #[serde(default = "default_fallback_resolution")]
    pub fallback_resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// JPEG quality (1-100) for captured frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl MoodcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("moodcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "acquisition.ideal_resolution",
                vec![
                    default_ideal_resolution().0,
                    default_ideal_resolution().1,
                ],
            )?
            .set_default("acquisition.facing_mode", "user")?
            .set_default("acquisition.auto_start", default_auto_start())?
            .set_default(
                "acquisition.inter_attempt_delay_ms",
                default_inter_attempt_delay_ms(),
            )?
            .set_default("acquisition.settle_delay_ms", default_settle_delay_ms())?
            .set_default("acquisition.protect_window_ms", default_protect_window_ms())?
            .set_default("readiness.min_dimension", default_min_dimension())?
            .set_default(
                "readiness.recheck_schedule_ms",
                default_recheck_schedule_ms(),
            )?
            .set_default("readiness.render_timeout_ms", default_render_timeout_ms())?
            .set_default(
                "readiness.fallback_resolution",
                vec![
                    default_fallback_resolution().0,
                    default_fallback_resolution().1,
                ],
            )?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("MOODCAM").separator("_"))
            .build()?;

        let config: MoodcamConfig = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.ideal_resolution.0 == 0 || self.acquisition.ideal_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "acquisition.ideal_resolution must be non-zero".to_string(),
            ));
        }

        if self.readiness.min_dimension == 0 {
            return Err(ConfigError::Message(
                "readiness.min_dimension must be at least 1".to_string(),
            ));
        }

        if self.readiness.render_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "readiness.render_timeout_ms must be non-zero".to_string(),
            ));
        }

        if let Some(last) = self.readiness.recheck_schedule_ms.last() {
            if *last >= self.readiness.render_timeout_ms {
                return Err(ConfigError::Message(
                    "readiness.recheck_schedule_ms must end before render_timeout_ms".to_string(),
                ));
            }
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "capture.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize the configuration to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for MoodcamConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            readiness: ReadinessConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            ideal_resolution: default_ideal_resolution(),
            facing_mode: default_facing_mode(),
            auto_start: default_auto_start(),
            inter_attempt_delay_ms: default_inter_attempt_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            protect_window_ms: default_protect_window_ms(),
        }
    }
}

impl AcquisitionConfig {
    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn protect_window(&self) -> Duration {
        Duration::from_millis(self.protect_window_ms)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            min_dimension: default_min_dimension(),
            recheck_schedule_ms: default_recheck_schedule_ms(),
            render_timeout_ms: default_render_timeout_ms(),
            fallback_resolution: default_fallback_resolution(),
        }
    }
}

impl ReadinessConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn recheck_schedule(&self) -> Vec<Duration> {
        self.recheck_schedule_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_ideal_resolution() -> (u32, u32) {
    (1280, 720)
}

fn default_facing_mode() -> FacingMode {
    FacingMode::User
}

fn default_auto_start() -> bool {
    true
}

fn default_inter_attempt_delay_ms() -> u64 {
    300
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_protect_window_ms() -> u64 {
    2000
}

fn default_min_dimension() -> u32 {
    2
}

fn default_recheck_schedule_ms() -> Vec<u64> {
    vec![500, 1000, 2000, 3000]
}

fn default_render_timeout_ms() -> u64 {
    5000
}

fn default_fallback_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_jpeg_quality() -> u8 {
    92
}
