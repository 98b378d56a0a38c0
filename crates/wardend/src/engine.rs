use crate::config::Config;
use crate::evidence::EvidenceStore;
use crate::notify::Alert;
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use uuid::Uuid;
use warden_core::annotate::annotate;
use warden_core::{
    CascadeDetector, CooldownPolicy, CooldownTracker, FaceClassifier, FaceLocator, IdentityClassifier,
    LabelMapping, LbphRecognizer,
};
use warden_hw::{Camera, Frame, FrameSource};

/// Pause between attempts after a failed frame read.
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] warden_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] warden_core::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] warden_core::RecognizerError),
    #[error("label mapping error: {0}")]
    LabelMapping(#[from] warden_core::LabelMappingError),
    #[error("failed to spawn detection thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

/// Why the detection loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The operator asked to stop.
    Stopped,
    /// The frame source failed too many times in a row.
    SourceFailed { failures: usize, last_error: String },
}

/// Cooperative stop request, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one frame produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub faces: usize,
    pub known: usize,
    pub unknown: usize,
    pub skipped: usize,
    pub alerts: usize,
}

/// Frame-at-a-time detection: locate, classify, annotate, gate, capture, alert.
pub struct DetectionLoop<S, L, C> {
    source: S,
    locator: L,
    classifier: C,
    policy: CooldownPolicy,
    tracker: CooldownTracker,
    evidence: EvidenceStore,
    alerts: mpsc::Sender<Alert>,
    stop: StopSignal,
    max_frame_failures: usize,
    state: watch::Sender<LoopState>,
}

impl<S, L, C> DetectionLoop<S, L, C>
where
    S: FrameSource,
    L: FaceLocator,
    C: IdentityClassifier,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        locator: L,
        classifier: C,
        policy: CooldownPolicy,
        tracker: CooldownTracker,
        evidence: EvidenceStore,
        alerts: mpsc::Sender<Alert>,
        stop: StopSignal,
        max_frame_failures: usize,
    ) -> Self {
        Self {
            source,
            locator,
            classifier,
            policy,
            tracker,
            evidence,
            alerts,
            stop,
            max_frame_failures: max_frame_failures.max(1),
            state: watch::channel(LoopState::Initializing).0,
        }
    }

    /// Follow state changes, including the final `Stopped` after `run` returns.
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    fn transition(&self, to: LoopState) {
        let from = self.state.send_replace(to);
        tracing::info!(from = ?from, to = ?to, "detection loop state");
    }

    /// Process one frame. Boxes and captions are drawn into `frame` before
    /// any evidence is captured, so saved images show every face of the frame.
    pub fn process_frame(&mut self, frame: &mut Frame, now: Instant) -> FrameReport {
        let regions = match self.locator.locate(&frame.gray) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence, "face location failed; treating frame as empty");
                Vec::new()
            }
        };

        let mut report = FrameReport {
            faces: regions.len(),
            ..FrameReport::default()
        };
        if regions.is_empty() {
            return report;
        }

        let mut classified = Vec::with_capacity(regions.len());
        for region in &regions {
            match self.classifier.classify(&frame.gray, region) {
                Ok(result) => classified.push((*region, result)),
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(face = region.index, error = %e, "classification failed; skipping face");
                }
            }
        }

        for (region, result) in &classified {
            if result.is_known() {
                report.known += 1;
                tracing::info!(
                    name = result.display_name(),
                    face = region.index,
                    confidence = result.confidence,
                    "recognized"
                );
            } else {
                report.unknown += 1;
                tracing::info!(
                    face = region.index,
                    label = result.label,
                    confidence = result.confidence,
                    "unrecognized face"
                );
            }
            if let Err(e) = annotate(&mut frame.image, region, result) {
                tracing::warn!(face = region.index, error = %e, "failed to annotate frame");
            }
        }

        for (region, result) in classified.iter().filter(|(_, r)| !r.is_known()) {
            let key = self.policy.key_for(region, result);
            if !self.tracker.should_alert(&key, now) {
                tracing::debug!(key = %key, "cooldown active; alert suppressed");
                continue;
            }

            let detected_at = Local::now();
            let evidence = match self.evidence.capture_still(frame, detected_at) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to save intruder image; alerting without it");
                    None
                }
            };

            let alert = Alert {
                id: Uuid::new_v4(),
                key,
                label: result.label,
                confidence: result.confidence,
                detected_at,
                evidence,
            };
            tracing::warn!(alert = %alert.id, key = %alert.key, "intruder detected");

            match self.alerts.try_send(alert) {
                Ok(()) => report.alerts += 1,
                Err(TrySendError::Full(alert)) => {
                    tracing::error!(alert = %alert.id, "alert queue full; alert dropped");
                }
                Err(TrySendError::Closed(alert)) => {
                    tracing::error!(alert = %alert.id, "alert dispatcher gone; alert dropped");
                }
            }
        }

        report
    }

    /// Run until stopped or the source gives out. Consumes the loop so the
    /// source (and with it the camera device) is released on return.
    pub fn run(mut self) -> LoopExit {
        self.transition(LoopState::Running);
        tracing::info!(source = %self.source.describe(), "detection loop running");

        let mut failures = 0usize;
        let exit = loop {
            if self.stop.is_stopped() {
                break LoopExit::Stopped;
            }

            match self.source.next_frame() {
                Ok(mut frame) => {
                    failures = 0;
                    let report = self.process_frame(&mut frame, Instant::now());
                    if report.faces > 0 {
                        tracing::debug!(
                            sequence = frame.sequence,
                            faces = report.faces,
                            known = report.known,
                            unknown = report.unknown,
                            skipped = report.skipped,
                            alerts = report.alerts,
                            "frame processed"
                        );
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, max = self.max_frame_failures, "frame read failed");
                    if failures >= self.max_frame_failures {
                        break LoopExit::SourceFailed {
                            failures,
                            last_error: e.to_string(),
                        };
                    }
                    std::thread::sleep(FRAME_RETRY_DELAY);
                }
            }
        };

        self.transition(LoopState::Stopping);
        let Self { source, alerts, state, .. } = self;
        drop(source);
        drop(alerts);
        tracing::info!(exit = ?exit, "frame source released");
        state.send_replace(LoopState::Stopped);
        tracing::info!(from = ?LoopState::Stopping, to = ?LoopState::Stopped, "detection loop state");
        exit
    }
}

/// The production loop: V4L2 camera, Haar cascade, LBPH classifier.
pub type CameraLoop = DetectionLoop<Camera, CascadeDetector, FaceClassifier>;

/// Load every resource the loop needs, failing fast on the first problem.
///
/// Order: label mapping, recognition model, cascade, camera, warmup.
pub fn initialize(config: &Config, alerts: mpsc::Sender<Alert>, stop: StopSignal) -> Result<CameraLoop, EngineError> {
    let mapping = LabelMapping::load(&config.label_mapping_path)?;
    let recognizer = LbphRecognizer::load(&config.model_path)?;
    let classifier = FaceClassifier::new(recognizer, mapping, config.confidence_threshold);
    let detector = CascadeDetector::load(&config.cascade_path, config.detector_params())?;

    let mut camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        camera.warmup(config.warmup_frames);
    }

    let evidence = EvidenceStore::new(&config.log_dir);
    tracing::info!(dir = %evidence.images_dir().display(), "intruder images directory");

    Ok(DetectionLoop::new(
        camera,
        detector,
        classifier,
        config.cooldown_policy,
        CooldownTracker::new(config.alert_cooldown()),
        evidence,
        alerts,
        stop,
        config.max_frame_failures,
    ))
}

/// Run the loop on a dedicated OS thread.
pub fn spawn<S, L, C>(detection: DetectionLoop<S, L, C>) -> Result<std::thread::JoinHandle<LoopExit>, EngineError>
where
    S: FrameSource + Send + 'static,
    L: FaceLocator + Send + 'static,
    C: IdentityClassifier + Send + 'static,
{
    std::thread::Builder::new()
        .name("warden-detect".into())
        .spawn(move || {
            tracing::info!("detection thread started");
            let exit = detection.run();
            tracing::info!("detection thread exiting");
            exit
        })
        .map_err(EngineError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{AlertDispatcher, Notification, Notifier, NotifyError};
    use async_trait::async_trait;
    use opencv::core::{Mat, Vec3b};
    use opencv::prelude::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use warden_core::{FaceRegion, Identity, IdentityKey, IdentityResult, RecognizerError};
    use warden_hw::CameraError;

    const WIDTH: u32 = 320;
    const HEIGHT: u32 = 120;
    const BACKGROUND: [u8; 3] = [128, 128, 128];
    const GREEN: [u8; 3] = [0, 255, 0];
    const RED: [u8; 3] = [0, 0, 255];

    struct ScriptedSource {
        frames: VecDeque<Result<Frame, CameraError>>,
        /// Raised once the script runs out, so `run` ends cleanly.
        stop: StopSignal,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            let next = self.frames.pop_front();
            if self.frames.is_empty() {
                self.stop.stop();
            }
            next.unwrap_or_else(|| Err(CameraError::CaptureFailed("script exhausted".into())))
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct FixedLocator(Vec<FaceRegion>);

    impl FaceLocator for FixedLocator {
        fn locate(&mut self, _: &Mat) -> Result<Vec<FaceRegion>, warden_core::DetectorError> {
            Ok(self.0.clone())
        }
    }

    /// Per face index: `Some(true)` known, `Some(false)` unknown, `None` error.
    struct FixedClassifier {
        verdicts: Vec<Option<bool>>,
        calls: usize,
    }

    impl IdentityClassifier for FixedClassifier {
        fn classify(&mut self, _: &Mat, region: &FaceRegion) -> Result<IdentityResult, RecognizerError> {
            self.calls += 1;
            match self.verdicts.get(region.index).copied().flatten() {
                Some(true) => Ok(IdentityResult {
                    identity: Identity::Known { name: "alice".into() },
                    label: 0,
                    confidence: 20.0,
                }),
                Some(false) => Ok(IdentityResult {
                    identity: Identity::Unknown,
                    label: region.index as i32 + 10,
                    confidence: 80.0,
                }),
                None => Err(RecognizerError::EmptyRegion),
            }
        }
    }

    /// Counts attempts and keeps the bodies; fails every time when `fail` is set.
    struct CountingChannel {
        name: &'static str,
        fail: bool,
        attempts: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Notifier for CountingChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(notification.body.clone());
            if self.fail {
                Err(NotifyError::Transport("smtp unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    fn counting(name: &'static str, fail: bool) -> (Box<dyn Notifier>, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let channel = CountingChannel {
            name,
            fail,
            attempts: Arc::clone(&attempts),
            bodies: Arc::clone(&bodies),
        };
        (Box::new(channel), attempts, bodies)
    }

    fn region(index: usize, x: u32) -> FaceRegion {
        FaceRegion { x, y: 60, width: 30, height: 30, index }
    }

    fn frame() -> Frame {
        Frame::from_gray(&vec![128; (WIDTH * HEIGHT) as usize], WIDTH, HEIGHT, 0).unwrap()
    }

    fn bgr(frame: &Frame, x: i32, y: i32) -> [u8; 3] {
        frame.image.at_2d::<Vec3b>(y, x).unwrap().0
    }

    /// Pixels in the rectangle that no longer show the background.
    fn changed(frame: &Frame, xs: std::ops::Range<i32>, ys: std::ops::Range<i32>) -> Vec<[u8; 3]> {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .map(|(x, y)| bgr(frame, x, y))
            .filter(|px| *px != BACKGROUND)
            .collect()
    }

    fn evidence_count(log_dir: &Path) -> usize {
        std::fs::read_dir(log_dir.join("intruder_images"))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    type TestLoop = DetectionLoop<ScriptedSource, FixedLocator, FixedClassifier>;

    struct Harness {
        detection: TestLoop,
        rx: mpsc::Receiver<Alert>,
        stop: StopSignal,
        released: Arc<AtomicBool>,
    }

    fn harness(
        log_dir: &Path,
        regions: Vec<FaceRegion>,
        verdicts: Vec<Option<bool>>,
        policy: CooldownPolicy,
        frames: Vec<Result<Frame, CameraError>>,
    ) -> Harness {
        let stop = StopSignal::new();
        let released = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(16);
        let source = ScriptedSource {
            frames: frames.into(),
            stop: stop.clone(),
            released: Arc::clone(&released),
        };
        let detection = DetectionLoop::new(
            source,
            FixedLocator(regions),
            FixedClassifier { verdicts, calls: 0 },
            policy,
            CooldownTracker::new(Duration::from_secs(30)),
            EvidenceStore::new(log_dir),
            tx,
            stop.clone(),
            3,
        );
        Harness {
            detection,
            rx,
            stop,
            released,
        }
    }

    #[test]
    fn test_zero_faces_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path(), vec![], vec![], CooldownPolicy::Global, vec![]);
        let mut f = frame();
        let before = f.image.try_clone().unwrap();

        let report = h.detection.process_frame(&mut f, Instant::now());

        assert_eq!(report, FrameReport::default());
        assert_eq!(h.detection.classifier.calls, 0);
        assert_eq!(f.image.data_bytes().unwrap(), before.data_bytes().unwrap());
        assert!(h.rx.try_recv().is_err());
        assert!(h.detection.tracker.should_alert(&IdentityKey::Session, Instant::now()), "nothing recorded");
    }

    #[test]
    fn test_known_face_gets_green_box_and_no_alert() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path(), vec![region(0, 4)], vec![Some(true)], CooldownPolicy::Global, vec![]);
        let mut f = frame();

        let report = h.detection.process_frame(&mut f, Instant::now());

        assert_eq!((report.known, report.unknown, report.alerts), (1, 0, 0));
        assert_eq!(bgr(&f, 15, 60), GREEN);
        assert!(h.rx.try_recv().is_err());
        assert!(!dir.path().join("intruder_images").exists());
    }

    #[test]
    fn test_unknown_face_alerts_with_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(
            dir.path(),
            vec![region(0, 200), region(1, 10)],
            vec![Some(true), Some(false)],
            CooldownPolicy::Global,
            vec![],
        );
        let mut f = frame();

        let report = h.detection.process_frame(&mut f, Instant::now());

        assert_eq!((report.faces, report.known, report.unknown, report.alerts), (2, 1, 1, 1));
        assert_eq!(bgr(&f, 210, 60), GREEN);
        assert_eq!(bgr(&f, 25, 60), RED);

        // "Intruder" is written above the red box, clear of the known caption.
        let caption = changed(&f, 10..190, 25..57);
        assert!(!caption.is_empty(), "caption drawn above the unknown face");
        assert!(caption.iter().all(|px| *px == RED), "caption uses the box colour");

        let alert = h.rx.try_recv().unwrap();
        assert_eq!(alert.key, IdentityKey::Session);
        assert_eq!(alert.label, 11);
        let evidence = alert.evidence.unwrap();
        assert!(evidence.starts_with(dir.path().join("intruder_images")));
        assert!(evidence.exists());
    }

    #[test]
    fn test_one_alert_per_cooldown_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path(), vec![region(0, 4)], vec![Some(false)], CooldownPolicy::Global, vec![]);
        let t0 = Instant::now();

        assert_eq!(h.detection.process_frame(&mut frame(), t0).alerts, 1);
        assert_eq!(h.detection.process_frame(&mut frame(), t0 + Duration::from_secs(1)).alerts, 0);
        assert_eq!(h.detection.process_frame(&mut frame(), t0 + Duration::from_secs(29)).alerts, 0);
        assert_eq!(h.detection.process_frame(&mut frame(), t0 + Duration::from_secs(30)).alerts, 1);

        assert!(h.rx.try_recv().is_ok());
        assert!(h.rx.try_recv().is_ok());
        assert!(h.rx.try_recv().is_err());
    }

    #[test]
    fn test_global_policy_alerts_once_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![region(0, 4), region(1, 200)];
        let mut h = harness(dir.path(), regions, vec![Some(false), Some(false)], CooldownPolicy::Global, vec![]);
        let report = h.detection.process_frame(&mut frame(), Instant::now());
        assert_eq!((report.unknown, report.alerts), (2, 1));
    }

    #[test]
    fn test_face_index_policy_alerts_per_face() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![region(0, 4), region(1, 200)];
        let mut h = harness(dir.path(), regions, vec![Some(false), Some(false)], CooldownPolicy::FaceIndex, vec![]);
        let report = h.detection.process_frame(&mut frame(), Instant::now());
        assert_eq!(report.alerts, 2);

        let keys: Vec<IdentityKey> = (0..2).map(|_| h.rx.try_recv().unwrap().key).collect();
        assert_eq!(keys, vec![IdentityKey::FaceIndex(0), IdentityKey::FaceIndex(1)]);
    }

    #[test]
    fn test_classification_error_skips_face() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![region(0, 4), region(1, 200)];
        let mut h = harness(dir.path(), regions, vec![None, Some(false)], CooldownPolicy::Global, vec![]);
        let mut f = frame();

        let report = h.detection.process_frame(&mut f, Instant::now());

        assert_eq!((report.skipped, report.unknown, report.alerts), (1, 1, 1));
        assert_eq!(bgr(&f, 15, 60), BACKGROUND, "skipped face is not annotated");
        assert_eq!(bgr(&f, 215, 60), RED);
    }

    #[test]
    fn test_run_stops_on_signal_and_releases_source() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![Ok(frame()), Ok(frame())];
        let h = harness(dir.path(), vec![region(0, 4)], vec![Some(false)], CooldownPolicy::Global, frames);
        let Harness {
            detection,
            mut rx,
            released,
            ..
        } = h;
        let state = detection.watch_state();

        assert_eq!(*state.borrow(), LoopState::Initializing);
        assert_eq!(detection.run(), LoopExit::Stopped);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(*state.borrow(), LoopState::Stopped);

        // One alert for the first frame, suppressed on the second; then the
        // sender is gone so the channel reports closed.
        assert!(rx.try_recv().is_ok());
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn test_stop_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), vec![], vec![], CooldownPolicy::Global, vec![Ok(frame())]);
        h.stop.stop();
        assert_eq!(h.detection.run(), LoopExit::Stopped);
    }

    #[test]
    fn test_consecutive_failures_abort() {
        let dir = tempfile::tempdir().unwrap();
        let fail = || Err(CameraError::CaptureFailed("dequeue".into()));
        let frames = vec![fail(), fail(), Ok(frame()), fail(), fail(), fail(), Ok(frame())];
        let h = harness(dir.path(), vec![], vec![], CooldownPolicy::Global, frames);
        let state = h.detection.watch_state();

        match h.detection.run() {
            LoopExit::SourceFailed { failures, last_error } => {
                assert_eq!(failures, 3);
                assert!(last_error.contains("dequeue"));
            }
            other => panic!("unexpected exit: {other:?}"),
        }
        assert!(h.released.load(Ordering::SeqCst));
        assert_eq!(*state.borrow(), LoopState::Stopped);
    }

    #[test]
    fn test_closed_dispatcher_does_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path(), vec![region(0, 4)], vec![Some(false)], CooldownPolicy::Global, vec![]);
        h.rx.close();
        let report = h.detection.process_frame(&mut frame(), Instant::now());
        assert_eq!((report.unknown, report.alerts), (1, 0));
    }

    #[tokio::test]
    async fn test_intruder_reaches_every_channel_once_per_window() {
        let dir = tempfile::tempdir().unwrap();
        let Harness { mut detection, rx, .. } =
            harness(dir.path(), vec![region(0, 4)], vec![Some(false)], CooldownPolicy::Global, vec![]);

        let (email, email_attempts, _) = counting("email", true);
        let (whatsapp, whatsapp_attempts, whatsapp_bodies) = counting("whatsapp", false);
        let dispatcher = AlertDispatcher::new(vec![email, whatsapp], Duration::from_secs(5));
        let dispatching = tokio::spawn(dispatcher.run(rx));

        let t0 = Instant::now();
        let first = detection.process_frame(&mut frame(), t0);
        assert_eq!((first.unknown, first.alerts), (1, 1));
        assert_eq!(evidence_count(dir.path()), 1);

        for _ in 0..200 {
            if email_attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(email_attempts.load(Ordering::SeqCst), 1, "email attempted and failed");

        // The failed email leaves the loop untouched; the same face five
        // seconds later is still processed but stays inside the cooldown.
        let later = detection.process_frame(&mut frame(), t0 + Duration::from_secs(5));
        assert_eq!((later.faces, later.unknown, later.alerts), (1, 1, 0));

        drop(detection);
        assert_eq!(dispatching.await.unwrap(), 1);
        assert_eq!(email_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(whatsapp_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(evidence_count(dir.path()), 1);
        assert!(whatsapp_bodies.lock().unwrap()[0].contains("distance 80.0"));
    }
}
