//! Capture loop and subscriber fan-out.
//!
//! A [`Tracker`] owns one [`FrameSource`] and, while started, a `tracking`
//! thread that reads frames, detects markers and pushes every non-empty
//! detection to its subscribers. Raw subscribers share the detection through
//! an `Arc`; processed subscribers receive [`MarkerBorders`]. Queues are
//! bounded and the loop never blocks on a slow reader: the oldest queued item
//! is dropped instead.

use crate::subscription::{Outbox, Subscription, SubscriptionId};
use fiducial_rig_aruco::{marker_borders, Board, MarkerBorders, MarkerDetector, RawDetection};
use fiducial_rig_core::{
    to_gray, CameraModel, CaptureError, CaptureSettings, FrameSource, GrayImage, RgbImage,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("tracker is already running")]
    AlreadyRunning,
    #[error("giving up after {0} consecutive failed frame reads")]
    TooManyFailedReads(u32),
    #[error("no subscription {0}")]
    InvalidIndex(SubscriptionId),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("frame source was lost when the tracking thread panicked")]
    SourceLost,
    #[error("failed to spawn tracking thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("tracking thread panicked")]
    Panicked,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    /// Consecutive failed reads that end the loop.
    pub max_failed_read: u32,
    pub capture: CaptureSettings,
    /// Pause after a failed read.
    pub backoff: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_failed_read: 10,
            capture: CaptureSettings::fixed_optics(),
            backoff: Duration::from_millis(10),
        }
    }
}

enum Outlet {
    Raw(Outbox<Arc<RawDetection>>),
    Processed(Outbox<Vec<MarkerBorders>>),
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    next_id: AtomicU64,
    outlets: RwLock<BTreeMap<SubscriptionId, Outlet>>,
    frame_size: RwLock<(u32, u32)>,
    gray: RwLock<Option<Arc<GrayImage>>>,
    color: RwLock<Option<Arc<RgbImage>>>,
}

impl Shared {
    fn register(&self, outlet: Outlet) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.outlets.write().insert(id, outlet);
        log::debug!("subscription {id} registered");
        id
    }

    fn notify(&self, detection: RawDetection) {
        let outlets = self.outlets.read();
        if outlets.is_empty() {
            return;
        }
        let raw = Arc::new(detection);
        let mut processed: Option<Vec<MarkerBorders>> = None;
        for (id, outlet) in outlets.iter() {
            let dropped = match outlet {
                Outlet::Raw(outbox) => outbox.push(Arc::clone(&raw)),
                Outlet::Processed(outbox) => {
                    let borders = processed.get_or_insert_with(|| marker_borders(&raw));
                    outbox.push(borders.clone())
                }
            };
            if dropped {
                log::trace!("subscription {id} is behind, dropped its oldest item");
            }
        }
    }
}

/// Everything the loop needs besides the source.
struct Pipeline {
    detector: Arc<dyn MarkerDetector>,
    board: Board,
    camera: Option<CameraModel>,
    max_failed_read: u32,
    backoff: Duration,
}

impl Pipeline {
    fn detect(&self, gray: &GrayImage) -> RawDetection {
        let detection = self.detector.detect(gray, self.board.dictionary());
        self.detector
            .refine(gray, &self.board, detection, self.camera.as_ref())
    }

    fn run(&self, shared: &Shared, source: &mut dyn FrameSource) -> Result<(), TrackerError> {
        let mut failed = 0u32;
        while shared.running.load(Ordering::Acquire) {
            if failed >= self.max_failed_read {
                return Err(TrackerError::TooManyFailedReads(failed));
            }
            let color = match source.read() {
                Ok(frame) => {
                    failed = 0;
                    frame
                }
                Err(e) => {
                    failed += 1;
                    log::debug!("frame read failed ({failed}/{}): {e}", self.max_failed_read);
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                    continue;
                }
            };

            let gray = Arc::new(to_gray(&color));
            *shared.color.write() = Some(Arc::new(color));
            *shared.gray.write() = Some(Arc::clone(&gray));

            let detection = self.detect(&gray);
            if !detection.is_empty() {
                shared.notify(detection);
            }
        }
        Ok(())
    }
}

type Exit = (Box<dyn FrameSource>, Result<(), TrackerError>);

enum Worker {
    Idle(Box<dyn FrameSource>),
    Running(JoinHandle<Exit>),
    Lost,
}

pub struct Tracker {
    shared: Arc<Shared>,
    worker: Mutex<Worker>,
    detector: Arc<dyn MarkerDetector>,
    board: Board,
    camera: Option<CameraModel>,
    settings: TrackerSettings,
}

impl Tracker {
    pub fn new<S>(
        source: S,
        detector: Arc<dyn MarkerDetector>,
        board: Board,
        settings: TrackerSettings,
    ) -> Self
    where
        S: FrameSource + 'static,
    {
        Self {
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(Worker::Idle(Box::new(source))),
            detector,
            board,
            camera: None,
            settings,
        }
    }

    /// Use calibration data when refining detections.
    pub fn with_camera(mut self, camera: CameraModel) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Frame size reported by the source when it was last opened.
    pub fn frame_size(&self) -> (u32, u32) {
        *self.shared.frame_size.read()
    }

    /// Open the source and spawn the tracking thread.
    pub fn start(&self) -> Result<(), TrackerError> {
        let mut worker = self.worker.lock();
        let mut source = match std::mem::replace(&mut *worker, Worker::Lost) {
            Worker::Idle(source) => source,
            Worker::Running(handle) if handle.is_finished() => {
                let (next, result) = reap(handle);
                if let Err(e) = result {
                    log::debug!("previous tracking run ended with: {e}");
                }
                match next {
                    Worker::Idle(source) => source,
                    other => {
                        *worker = other;
                        return Err(TrackerError::SourceLost);
                    }
                }
            }
            Worker::Running(handle) => {
                *worker = Worker::Running(handle);
                return Err(TrackerError::AlreadyRunning);
            }
            Worker::Lost => return Err(TrackerError::SourceLost),
        };

        if let Err(e) = source.open() {
            *worker = Worker::Idle(source);
            return Err(e.into());
        }
        if let Err(e) = source.apply_settings(&self.settings.capture) {
            log::warn!("capture settings not applied: {e}");
        }
        let size = source.frame_size();
        *self.shared.frame_size.write() = size;
        log::info!("tracking {}x{} frames", size.0, size.1);

        let pipeline = Pipeline {
            detector: Arc::clone(&self.detector),
            board: self.board.clone(),
            camera: self.camera,
            max_failed_read: self.settings.max_failed_read,
            backoff: self.settings.backoff,
        };
        let shared = Arc::clone(&self.shared);
        shared.running.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name("tracking".to_string())
            .spawn(move || {
                let result = pipeline.run(&shared, source.as_mut());
                shared.running.store(false, Ordering::Release);
                source.release();
                match &result {
                    Ok(()) => log::info!("tracking stopped"),
                    Err(e) => log::warn!("tracking ended: {e}"),
                }
                (source, result)
            });

        match spawned {
            Ok(handle) => {
                *worker = Worker::Running(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(TrackerError::Spawn(e))
            }
        }
    }

    /// Ask the loop to finish and wait for it. Safe to call when stopped.
    pub fn stop(&self) -> Result<(), TrackerError> {
        self.shared.running.store(false, Ordering::Release);
        self.join()
    }

    /// Wait for the loop to end on its own and return how it ended.
    pub fn join(&self) -> Result<(), TrackerError> {
        let mut worker = self.worker.lock();
        match std::mem::replace(&mut *worker, Worker::Lost) {
            Worker::Running(handle) => {
                let (next, result) = reap(handle);
                *worker = next;
                result
            }
            other => {
                *worker = other;
                Ok(())
            }
        }
    }

    /// Subscribe to per-frame [`MarkerBorders`].
    pub fn subscribe(&self, capacity: usize) -> Subscription<Vec<MarkerBorders>> {
        let (outbox, rx) = Outbox::new(capacity);
        let id = self.shared.register(Outlet::Processed(outbox));
        Subscription::new(id, self.frame_size(), rx)
    }

    /// Subscribe to the detector's output as is.
    pub fn subscribe_raw(&self, capacity: usize) -> Subscription<Arc<RawDetection>> {
        let (outbox, rx) = Outbox::new(capacity);
        let id = self.shared.register(Outlet::Raw(outbox));
        Subscription::new(id, self.frame_size(), rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TrackerError> {
        match self.shared.outlets.write().remove(&id) {
            Some(_) => {
                log::debug!("subscription {id} removed");
                Ok(())
            }
            None => Err(TrackerError::InvalidIndex(id)),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.outlets.read().len()
    }

    /// Fan a detection out to every subscriber.
    ///
    /// May run alongside the tracking loop; each queue still drops its
    /// oldest items first.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(markers = detection.len())))]
    pub fn notify(&self, detection: RawDetection) {
        self.shared.notify(detection);
    }

    /// Latest grayscale frame.
    pub fn frame(&self) -> Option<Arc<GrayImage>> {
        self.shared.gray.read().clone()
    }

    /// Latest color frame.
    pub fn color_frame(&self) -> Option<Arc<RgbImage>> {
        self.shared.color.read().clone()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::debug!("tracker dropped after: {e}");
        }
    }
}

fn reap(handle: JoinHandle<Exit>) -> (Worker, Result<(), TrackerError>) {
    match handle.join() {
        Ok((source, result)) => (Worker::Idle(source), result),
        Err(_) => (Worker::Lost, Err(TrackerError::Panicked)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducial_rig_aruco::{make_board, BoardCorners, DetectedMarker, Dictionary};
    use nalgebra::Point2;

    struct Blank;

    impl FrameSource for Blank {
        fn open(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        fn frame_size(&self) -> (u32, u32) {
            (8, 6)
        }

        fn read(&mut self) -> Result<RgbImage, CaptureError> {
            thread::sleep(Duration::from_millis(1));
            Ok(RgbImage::new(8, 6))
        }
    }

    struct Nothing;

    impl MarkerDetector for Nothing {
        fn detect(&self, _image: &GrayImage, _dictionary: Dictionary) -> RawDetection {
            RawDetection::default()
        }

        fn interpolate_corners(
            &self,
            _image: &GrayImage,
            _board: &Board,
            _detection: &RawDetection,
        ) -> BoardCorners {
            BoardCorners::default()
        }
    }

    fn tracker() -> Tracker {
        let board = make_board(3, 3, Dictionary::Dict4X4_50, 0.09, 0.01).expect("board");
        Tracker::new(Blank, Arc::new(Nothing), board, TrackerSettings::default())
    }

    fn detection(id: u32) -> RawDetection {
        RawDetection {
            markers: vec![DetectedMarker {
                id,
                corners: [
                    Point2::new(0.0, 0.0),
                    Point2::new(10.0, 0.0),
                    Point2::new(10.0, 10.0),
                    Point2::new(0.0, 10.0),
                ],
            }],
            ..RawDetection::default()
        }
    }

    #[test]
    fn notify_reaches_raw_and_processed_subscribers() {
        let tracker = tracker();
        let raw = tracker.subscribe_raw(2);
        let processed = tracker.subscribe(2);
        tracker.notify(detection(7));

        let got = raw.try_recv().expect("raw");
        assert_eq!(got.ids().collect::<Vec<_>>(), vec![7]);
        let borders = processed.try_recv().expect("processed");
        assert_eq!(borders[0].id, 7);
        assert_eq!(borders[0].center, Point2::new(5, 5));
    }

    #[test]
    fn unsubscribe_removes_only_that_subscription() {
        let tracker = tracker();
        let a = tracker.subscribe(1);
        let b = tracker.subscribe(1);
        tracker.unsubscribe(a.id()).expect("unsubscribe");
        assert_eq!(tracker.subscriber_count(), 1);

        tracker.notify(detection(1));
        assert!(b.try_recv().is_some());
        assert!(a.try_recv().is_none());
        assert!(matches!(
            tracker.unsubscribe(a.id()),
            Err(TrackerError::InvalidIndex(id)) if id == a.id()
        ));
    }

    #[test]
    fn subscription_ids_are_not_reused() {
        let tracker = tracker();
        let a = tracker.subscribe(1).id();
        tracker.unsubscribe(a).expect("unsubscribe");
        let b = tracker.subscribe(1).id();
        assert!(b > a);
    }

    #[test]
    fn start_twice_is_rejected_and_stop_is_idempotent() {
        let tracker = tracker();
        tracker.start().expect("start");
        assert!(matches!(tracker.start(), Err(TrackerError::AlreadyRunning)));
        assert_eq!(tracker.frame_size(), (8, 6));
        tracker.stop().expect("stop");
        tracker.stop().expect("second stop");
        assert!(!tracker.is_running());
        assert!(tracker.frame().is_some());
        assert_eq!(tracker.color_frame().expect("color").dimensions(), (8, 6));

        tracker.start().expect("restart");
        tracker.stop().expect("stop again");
    }
}
