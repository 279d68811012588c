use crate::acquire::{AcquisitionChain, StrategyKind};
use crate::config::AcquisitionConfig;
use crate::error::AcquireError;
use crate::gateway::MediaGateway;
use crate::sink::VideoSink;
use crate::stream::HardwareStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// The one current stream, with the bookkeeping needed to referee races
struct CurrentStream {
    stream: HardwareStream,
    generation: u64,
    acquired_at: Instant,
}

/// How a start call concluded
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// An active current stream was reused; no strategy was invoked
    Reused(HardwareStream),
    /// A new stream was acquired and attached
    Acquired {
        stream: HardwareStream,
        strategy: StrategyKind,
    },
    /// The acquisition resolved after being superseded by a stop or a newer
    /// start; the obtained stream was released instead of attached
    Superseded,
}

/// How a stop call concluded. Stop never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No current stream existed
    NoStream,
    /// The preserve handle matched the current stream
    Preserved,
    /// The current stream was younger than the protect window
    Protected,
    /// All tracks stopped and the current handle cleared
    Stopped,
}

/// Exclusive owner of the current hardware stream. All track stopping and
/// sink source changes go through here; other components only ask.
pub struct StreamLifecycle {
    config: AcquisitionConfig,
    chain: AcquisitionChain,
    sink: Arc<VideoSink>,
    current: Mutex<Option<CurrentStream>>,
    /// Intent counter: every start and stop bumps it, and an acquisition
    /// only registers if the generation it started under is still current.
    /// This replaces guessing from timing whether an in-flight acquisition
    /// was abandoned.
    generation: AtomicU64,
}

impl StreamLifecycle {
    pub fn new(
        config: AcquisitionConfig,
        gateway: Arc<dyn MediaGateway>,
        sink: Arc<VideoSink>,
    ) -> Self {
        let chain = AcquisitionChain::new(config.clone(), gateway);
        Self {
            config,
            chain,
            sink,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Obtain and attach a stream, reusing the current one when it is still
    /// active. On success the new stream is registered as current before the
    /// sink is touched, so a concurrent stop always has something to target.
    pub async fn start(&self) -> Result<StartOutcome, AcquireError> {
        // Reuse path: never redundantly stop and reacquire a live stream
        {
            let current = self.current.lock();
            if let Some(existing) = current.as_ref() {
                if existing.stream.is_active() {
                    debug!(
                        "Reusing active stream {} (age {:?})",
                        existing.stream.id(),
                        existing.acquired_at.elapsed()
                    );
                    // A guarded stop may have cleared the sink while leaving
                    // the protected stream current; restore the attachment
                    let attached = self
                        .sink
                        .source()
                        .is_some_and(|s| s.same_stream(&existing.stream));
                    if !attached {
                        self.sink.attach(&existing.stream);
                    }
                    return Ok(StartOutcome::Reused(existing.stream.clone()));
                }
            }
        }

        // Release whatever stale handle is left before reacquiring
        let released = {
            let mut current = self.current.lock();
            match current.take() {
                Some(stale) => {
                    debug!("Releasing stale stream {}", stale.stream.id());
                    stale.stream.stop_tracks();
                    self.sink.detach();
                    true
                }
                None => false,
            }
        };

        if released {
            // Give the driver time to actually let go of the device
            sleep(self.config.settle_delay()).await;
        }

        let intended = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let acquisition = self.chain.acquire().await?;

        let mut current = self.current.lock();

        // The acquisition may have been superseded while it was in flight;
        // attaching now would leak a stream nobody owns or clobber a newer
        // one. Release what we just obtained instead.
        let superseded = self.generation.load(Ordering::SeqCst) != intended
            || current
                .as_ref()
                .is_some_and(|c| c.stream.is_active());
        if superseded {
            warn!(
                "Acquisition of stream {} superseded before registration, releasing it",
                acquisition.stream.id()
            );
            acquisition.stream.stop_tracks();
            return Ok(StartOutcome::Superseded);
        }

        *current = Some(CurrentStream {
            stream: acquisition.stream.clone(),
            generation: intended,
            acquired_at: Instant::now(),
        });

        // Attach while still registered: the sink never carries two streams,
        // and a concurrent stop now operates on this handle
        self.sink.attach(&acquisition.stream);
        drop(current);

        info!(
            "Stream {} is current and attached (via {})",
            acquisition.stream.id(),
            acquisition.strategy.describe()
        );

        Ok(StartOutcome::Acquired {
            stream: acquisition.stream,
            strategy: acquisition.strategy,
        })
    }

    /// Stop the current stream's tracks and clear the handle. A matching
    /// `preserve` handle makes this a no-op, protecting a stream that is
    /// mid-attach from an overlapping lifecycle event; a stream younger than
    /// the protect window is likewise left running, because an async ready
    /// callback may still be working against it. Idempotent, never fails.
    pub fn stop(&self, preserve: Option<&HardwareStream>) -> StopOutcome {
        // Any in-flight acquisition is superseded from this point on
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut current = self.current.lock();
        let Some(existing) = current.as_ref() else {
            debug!("Stop with no current stream: no-op");
            return StopOutcome::NoStream;
        };

        if let Some(keep) = preserve {
            if keep.same_stream(&existing.stream) {
                debug!("Stop skipped: stream {} is preserved", existing.stream.id());
                return StopOutcome::Preserved;
            }
        }

        let age = existing.acquired_at.elapsed();
        if age < self.config.protect_window() {
            debug!(
                "Stop skipped: stream {} is only {:?} old (protect window {:?})",
                existing.stream.id(),
                age,
                self.config.protect_window()
            );
            return StopOutcome::Protected;
        }

        if let Some(stale) = current.take() {
            info!("Stopping stream {} after {:?}", stale.stream.id(), age);
            stale.stream.stop_tracks();
        }
        self.sink.detach();
        StopOutcome::Stopped
    }

    /// Unconditional release on owner teardown: every track of the current
    /// stream is stopped and the sink cleared, regardless of preserve flags
    /// or freshness - the owning context no longer exists.
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let taken = self.current.lock().take();
        if let Some(existing) = taken {
            info!("Teardown: stopping stream {}", existing.stream.id());
            existing.stream.stop_tracks();
        }
        self.sink.detach();
    }

    /// The current stream, if any
    pub fn current_stream(&self) -> Option<HardwareStream> {
        self.current.lock().as_ref().map(|c| c.stream.clone())
    }

    /// Age of the current stream, if any
    pub fn current_age(&self) -> Option<Duration> {
        self.current.lock().as_ref().map(|c| c.acquired_at.elapsed())
    }
}
