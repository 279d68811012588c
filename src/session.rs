use crate::capture::FrameCapturer;
use crate::config::MoodcamConfig;
use crate::error::{MoodcamError, Result};
use crate::frame::CapturedFrame;
use crate::gateway::MediaGateway;
use crate::lifecycle::{StartOutcome, StreamLifecycle};
use crate::readiness::{ReadinessDetector, ReadinessState};
use crate::sink::VideoSink;
use crate::stream::HardwareStream;
use std::sync::Arc;
use tracing::{info, warn};

type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;
type StreamReadyCallback = Arc<dyn Fn(&HardwareStream) + Send + Sync>;

/// Hooks the embedding UI provides. Both are optional.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    on_error: Option<ErrorCallback>,
    on_stream_ready: Option<StreamReadyCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with a user-facing message whenever acquisition or readiness
    /// fails. Per-strategy failures are not reported here; only the final,
    /// most specific one.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called once per start with the stream that became current
    pub fn on_stream_ready<F>(mut self, f: F) -> Self
    where
        F: Fn(&HardwareStream) + Send + Sync + 'static,
    {
        self.on_stream_ready = Some(Arc::new(f));
        self
    }
}

/// Facade tying the strategy chain, lifecycle manager, readiness detector
/// and frame capturer together behind the four calls a UI needs
pub struct CameraSession {
    lifecycle: Arc<StreamLifecycle>,
    detector: Arc<ReadinessDetector>,
    capturer: FrameCapturer,
    sink: Arc<VideoSink>,
    callbacks: SessionCallbacks,
}

impl CameraSession {
    pub fn new(
        config: MoodcamConfig,
        gateway: Arc<dyn MediaGateway>,
        callbacks: SessionCallbacks,
    ) -> Arc<Self> {
        let sink = Arc::new(VideoSink::new());
        let lifecycle = Arc::new(StreamLifecycle::new(
            config.acquisition.clone(),
            gateway,
            Arc::clone(&sink),
        ));
        let detector = Arc::new(ReadinessDetector::new(
            config.readiness.clone(),
            Arc::clone(&sink),
        ));
        let capturer = FrameCapturer::new(
            config.capture.clone(),
            config.readiness.min_dimension,
            Arc::clone(&sink),
        );

        Arc::new(Self {
            lifecycle,
            detector,
            capturer,
            sink,
            callbacks,
        })
    }

    /// Create a session and, if the configuration says so, start it
    /// immediately. A failed auto-start is reported through `on_error` and
    /// does not prevent the session from being handed back.
    pub async fn launch(
        config: MoodcamConfig,
        gateway: Arc<dyn MediaGateway>,
        callbacks: SessionCallbacks,
    ) -> Arc<Self> {
        let auto_start = config.acquisition.auto_start;
        let session = Self::new(config, gateway, callbacks);

        if auto_start {
            if let Err(e) = session.start_camera().await {
                warn!("Auto-start failed: {}", e);
            }
        }

        session
    }

    /// Start (or resume) the camera. Reuses an active current stream without
    /// touching the hardware; otherwise runs the acquisition chain and
    /// begins readiness observation. The final failure, if any, is also
    /// delivered to `on_error`.
    pub async fn start_camera(self: &Arc<Self>) -> Result<()> {
        if self.state() == ReadinessState::Error {
            // A failed run ended in a dead state; begin a fresh epoch
            self.detector.reset();
        }
        self.detector.advance(ReadinessState::Starting);

        match self.lifecycle.start().await {
            Ok(StartOutcome::Superseded) => {
                info!("Start superseded; nothing attached");
                Ok(())
            }
            Ok(outcome) => {
                let stream = match outcome {
                    StartOutcome::Reused(stream) => stream,
                    StartOutcome::Acquired { stream, .. } => stream,
                    StartOutcome::Superseded => unreachable!(),
                };

                self.detector.advance(ReadinessState::StreamObtained);

                if let Some(cb) = &self.callbacks.on_stream_ready {
                    cb(&stream);
                }

                let on_error = self.callbacks.on_error.clone();
                self.detector.observe(stream, move |err| {
                    if let Some(cb) = &on_error {
                        cb(err.user_message().to_string());
                    }
                });

                Ok(())
            }
            Err(err) => {
                self.detector.fail(&err);
                if let Some(cb) = &self.callbacks.on_error {
                    cb(err.user_message().to_string());
                }
                Err(MoodcamError::Acquire(err))
            }
        }
    }

    /// Stop the camera. The readiness flag drops and the sink is cleared
    /// unconditionally; the tracks themselves go through the guarded
    /// lifecycle stop, which leaves a very fresh stream running to dodge
    /// teardown racing an async ready callback.
    pub fn stop_camera(&self) {
        self.detector.reset();
        self.sink.detach();
        let outcome = self.lifecycle.stop(None);
        info!("Camera stopped ({:?})", outcome);
    }

    /// Owner teardown: stop everything regardless of freshness or preserve
    /// flags. The owning context is gone, so nothing is worth protecting.
    pub fn shutdown(&self) {
        self.detector.reset();
        self.lifecycle.teardown();
        info!("Camera session shut down");
    }

    /// Capture the current frame as base64 JPEG. `None` until the readiness
    /// detector has confirmed valid frames, and on any capturer
    /// precondition failure.
    pub fn capture_image(&self) -> Option<CapturedFrame> {
        if !self.detector.is_ready() {
            return None;
        }
        self.capturer.capture()
    }

    /// Diagnostic: whether a capture would currently succeed
    pub fn test_capture(&self) -> bool {
        self.detector.is_ready() && self.capturer.test_capture()
    }

    pub fn state(&self) -> ReadinessState {
        self.detector.state()
    }

    pub fn is_ready(&self) -> bool {
        self.detector.is_ready()
    }

    pub fn current_stream(&self) -> Option<HardwareStream> {
        self.lifecycle.current_stream()
    }

    pub fn sink(&self) -> &Arc<VideoSink> {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{
        GatewayError, SimulatedDeviceProfile, SimulatedFailures, SimulatedGateway,
    };
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_config() -> MoodcamConfig {
        let mut config = MoodcamConfig::default();
        config.acquisition.auto_start = false;
        config.acquisition.inter_attempt_delay_ms = 10;
        config.acquisition.settle_delay_ms = 1;
        config
    }

    async fn wait_ready(session: &Arc<CameraSession>) {
        timeout(Duration::from_secs(5), async {
            while !session.is_ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session should become ready");
    }

    #[tokio::test]
    async fn test_full_start_ready_capture_stop() {
        let gateway = Arc::new(SimulatedGateway::new());
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        );

        assert_eq!(session.state(), ReadinessState::Idle);
        session.start_camera().await.unwrap();
        wait_ready(&session).await;

        let captured = timeout(Duration::from_secs(2), async {
            loop {
                if let Some(c) = session.capture_image() {
                    return c;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("capture should succeed once ready");

        assert_eq!(captured.width(), 640);
        assert_eq!(captured.height(), 480);
        assert!(!captured.as_base64().is_empty());
        assert!(session.test_capture());

        session.stop_camera();
        assert!(!session.is_ready());
        assert_eq!(session.state(), ReadinessState::Idle);
        assert!(!session.sink().has_source());
        assert!(session.capture_image().is_none());
    }

    #[tokio::test]
    async fn test_repeated_start_reuses_fresh_stream() {
        let gateway = Arc::new(SimulatedGateway::new());
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        );

        session.start_camera().await.unwrap();
        let first = session.current_stream().unwrap();
        let attempts = gateway.attempt_count();

        for _ in 0..3 {
            session.start_camera().await.unwrap();
        }

        assert_eq!(gateway.attempt_count(), attempts);
        assert!(session.current_stream().unwrap().same_stream(&first));
        assert!(first.is_active());
    }

    #[tokio::test]
    async fn test_fallback_to_explicit_device_ends_ready() {
        let gateway = Arc::new(
            SimulatedGateway::new()
                .with_devices(vec![SimulatedDeviceProfile {
                    device_id: "lab-cam-7".to_string(),
                    ..Default::default()
                }])
                .with_failures(SimulatedFailures {
                    constrained: Some(GatewayError::PermissionDenied),
                    unconstrained: Some(GatewayError::Overconstrained),
                    ..Default::default()
                }),
        );
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        );

        session.start_camera().await.unwrap();
        wait_ready(&session).await;

        let stream = session.current_stream().unwrap();
        assert_eq!(stream.tracks()[0].device_id(), Some("lab-cam-7"));
    }

    #[tokio::test]
    async fn test_total_failure_reports_once_via_callback() {
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_msgs = Arc::clone(&messages);

        let gateway = Arc::new(
            SimulatedGateway::new()
                .with_devices(vec![])
                .with_failures(SimulatedFailures {
                    constrained: Some(GatewayError::PermissionDenied),
                    unconstrained: Some(GatewayError::PermissionDenied),
                    legacy: Some(GatewayError::PermissionDenied),
                    ..Default::default()
                }),
        );
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new().on_error(move |msg| sink_msgs.lock().push(msg)),
        );

        let err = session.start_camera().await.unwrap_err();
        assert!(matches!(
            err,
            MoodcamError::Acquire(crate::error::AcquireError::PermissionDenied)
        ));
        assert_eq!(session.state(), ReadinessState::Error);

        let recorded = messages.lock().clone();
        assert_eq!(recorded.len(), 1, "exactly one user-facing report");
        assert!(recorded[0].contains("denied"));
    }

    #[tokio::test]
    async fn test_on_stream_ready_fires() {
        let seen: Arc<Mutex<Option<uuid::Uuid>>> = Arc::new(Mutex::new(None));
        let sink_seen = Arc::clone(&seen);

        let gateway = Arc::new(SimulatedGateway::new());
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new().on_stream_ready(move |stream| {
                *sink_seen.lock() = Some(stream.id());
            }),
        );

        session.start_camera().await.unwrap();
        let current = session.current_stream().unwrap();
        assert_eq!(*seen.lock(), Some(current.id()));
    }

    #[tokio::test]
    async fn test_shutdown_stops_fresh_stream_unconditionally() {
        let gateway = Arc::new(SimulatedGateway::new());
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        );

        session.start_camera().await.unwrap();
        let stream = session.current_stream().unwrap();
        assert!(stream.is_active());

        // The stream is well inside the protect window, but teardown does
        // not negotiate
        session.shutdown();
        assert!(!stream.is_active());
        assert!(session.current_stream().is_none());
        assert!(!session.sink().has_source());
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn test_stop_twice_is_idempotent() {
        let gateway = Arc::new(SimulatedGateway::new());
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        );

        session.start_camera().await.unwrap();
        session.stop_camera();
        let state_once = (session.is_ready(), session.sink().has_source());
        session.stop_camera();
        let state_twice = (session.is_ready(), session.sink().has_source());

        assert_eq!(state_once, state_twice);
        assert_eq!(session.state(), ReadinessState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_stop_reattaches_sink() {
        let gateway = Arc::new(SimulatedGateway::new());
        let session = CameraSession::new(
            test_config(),
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        );

        session.start_camera().await.unwrap();
        let first = session.current_stream().unwrap();

        // Guarded stop leaves the fresh stream current but clears the sink
        session.stop_camera();
        assert!(!session.sink().has_source());
        assert!(first.is_active());

        session.start_camera().await.unwrap();
        wait_ready(&session).await;
        assert!(session.sink().source().unwrap().same_stream(&first));
    }

    #[tokio::test]
    async fn test_launch_with_auto_start() {
        let gateway = Arc::new(SimulatedGateway::new());
        let mut config = test_config();
        config.acquisition.auto_start = true;

        let session = CameraSession::launch(
            config,
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new(),
        )
        .await;

        assert!(session.current_stream().is_some());
        wait_ready(&session).await;
    }

    #[tokio::test]
    async fn test_render_timeout_reported_as_camera_not_working() {
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_msgs = Arc::clone(&messages);

        // Device that never leaves the degenerate lead-in, with no settings
        // or capabilities to fall back on
        let gateway = Arc::new(SimulatedGateway::new().with_devices(vec![
            SimulatedDeviceProfile {
                degenerate_lead_in: u32::MAX,
                report_settings: false,
                report_capabilities: false,
                ..Default::default()
            },
        ]));

        let mut config = test_config();
        config.readiness.render_timeout_ms = 300;
        config.readiness.recheck_schedule_ms = vec![50, 100, 200];

        let session = CameraSession::new(
            config,
            Arc::clone(&gateway) as Arc<dyn MediaGateway>,
            SessionCallbacks::new().on_error(move |msg| sink_msgs.lock().push(msg)),
        );

        session.start_camera().await.unwrap();

        timeout(Duration::from_secs(2), async {
            while messages.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timeout error should be reported");

        assert!(!session.is_ready());
        assert_eq!(session.state(), ReadinessState::Error);
        assert!(messages.lock()[0].contains("not producing video"));
    }
}
