use crate::config::AcquisitionConfig;
use crate::error::AcquireError;
use crate::gateway::{GatewayError, MediaGateway, StreamConstraints};
use crate::stream::HardwareStream;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One specific method of requesting hardware media access, tried in a
/// fixed fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Target resolution plus preferred facing mode
    IdealConstraints,
    /// Any video source, no constraints
    Unconstrained,
    /// Enumerate video inputs and request the first one by exact id
    ExplicitDevice,
    /// Legacy callback-style entry point for very old platforms
    LegacyApi,
}

impl StrategyKind {
    /// Fixed priority order of the fallback chain
    pub const ORDER: [StrategyKind; 4] = [
        StrategyKind::IdealConstraints,
        StrategyKind::Unconstrained,
        StrategyKind::ExplicitDevice,
        StrategyKind::LegacyApi,
    ];

    pub fn describe(&self) -> &'static str {
        match self {
            StrategyKind::IdealConstraints => "ideal-constrained request",
            StrategyKind::Unconstrained => "unconstrained request",
            StrategyKind::ExplicitDevice => "explicit-device request",
            StrategyKind::LegacyApi => "legacy API request",
        }
    }
}

/// Result of a successful chain run
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub stream: HardwareStream,
    pub strategy: StrategyKind,
}

/// Ordered fallback chain for obtaining a working hardware stream despite
/// heterogeneous platform support. Per-strategy failures are swallowed and
/// logged; only the most specific failure survives exhaustion.
pub struct AcquisitionChain {
    config: AcquisitionConfig,
    gateway: Arc<dyn MediaGateway>,
}

impl AcquisitionChain {
    pub fn new(config: AcquisitionConfig, gateway: Arc<dyn MediaGateway>) -> Self {
        Self { config, gateway }
    }

    /// Run the chain until a strategy succeeds. Fails fast, before any
    /// strategy is attempted, when the context is insecure or no acquisition
    /// API exists at all - those conditions are reported distinctly.
    pub async fn acquire(&self) -> Result<Acquisition, AcquireError> {
        if !self.gateway.is_secure_context() {
            warn!("Refusing acquisition: execution context is not secure");
            return Err(AcquireError::InsecureContext);
        }

        if !self.gateway.has_media_api() && !self.gateway.has_legacy_api() {
            warn!("Refusing acquisition: no media API present, including legacy");
            return Err(AcquireError::UnsupportedPlatform);
        }

        let mut most_specific: Option<AcquireError> = None;
        let mut attempted = 0u32;

        for strategy in StrategyKind::ORDER {
            if !self.is_applicable(strategy) {
                debug!("Skipping {}: API not present", strategy.describe());
                continue;
            }

            if attempted > 0 {
                // Some drivers need release time between failed opens
                sleep(self.config.inter_attempt_delay()).await;
            }
            attempted += 1;

            debug!("Attempting {}", strategy.describe());
            match self.attempt(strategy).await {
                Ok(stream) => {
                    info!(
                        "Acquired stream {} via {}",
                        stream.id(),
                        strategy.describe()
                    );
                    return Ok(Acquisition { stream, strategy });
                }
                Err(err) => {
                    warn!("{} failed: {}", strategy.describe(), err);
                    let candidate = err.to_acquire_error();
                    let keep = match &most_specific {
                        Some(current) => candidate.specificity() > current.specificity(),
                        None => true,
                    };
                    if keep {
                        most_specific = Some(candidate);
                    }
                }
            }
        }

        Err(most_specific.unwrap_or(AcquireError::DeviceNotFound))
    }

    fn is_applicable(&self, strategy: StrategyKind) -> bool {
        match strategy {
            StrategyKind::LegacyApi => self.gateway.has_legacy_api(),
            _ => self.gateway.has_media_api(),
        }
    }

    async fn attempt(&self, strategy: StrategyKind) -> Result<HardwareStream, GatewayError> {
        match strategy {
            StrategyKind::IdealConstraints => {
                let constraints = StreamConstraints::ideal(
                    self.config.ideal_resolution,
                    self.config.facing_mode,
                );
                self.gateway.request_stream(&constraints).await
            }
            StrategyKind::Unconstrained => {
                self.gateway
                    .request_stream(&StreamConstraints::unconstrained())
                    .await
            }
            StrategyKind::ExplicitDevice => {
                let devices = self.gateway.enumerate_video_inputs().await?;
                let first = devices.first().ok_or(GatewayError::NotFound)?;
                debug!(
                    "Explicit-device attempt using {} ({})",
                    first.device_id, first.label
                );
                self.gateway
                    .request_stream(&StreamConstraints::exact_device(&first.device_id))
                    .await
            }
            StrategyKind::LegacyApi => {
                // Callback-to-promise adaptation for the pre-promise API
                let (tx, rx) = oneshot::channel();
                self.gateway.request_stream_legacy(
                    &StreamConstraints::unconstrained(),
                    Box::new(move |result| {
                        let _ = tx.send(result);
                    }),
                );
                match rx.await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Aborted),
                }
            }
        }
    }
}
