mod common;

use common::*;
use fiducial_rig::calib::{CalibrationResult, NoPrompt};
use fiducial_rig::{
    make_board, CalibrationEngine, CalibrationMode, Dictionary, MarkerPose, RigConfig, Tracker,
    TrackerError, TrackerSettings, Transformer,
};
use nalgebra::{Matrix3, Point2, Vector3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn tracker_with(source: ScriptedSource, detector: FixedDetector, max_failed_read: u32) -> Tracker {
    let board = make_board(3, 3, Dictionary::Dict4X4_50, 0.09, 0.01).expect("board");
    let settings = TrackerSettings {
        max_failed_read,
        backoff: Duration::ZERO,
        ..TrackerSettings::default()
    };
    Tracker::new(source, Arc::new(detector), board, settings)
}

#[test]
fn three_good_frames_then_failures_end_the_loop() {
    let source = ScriptedSource::new(3);
    let reads = Arc::clone(&source.reads);
    let detector = FixedDetector(detection(vec![square(5, 10.0, 10.0, 20.0)]));
    let tracker = tracker_with(source, detector, 2);

    let processed = tracker.subscribe(8);
    let raw = tracker.subscribe_raw(8);
    tracker.start().expect("start");

    assert!(matches!(
        tracker.join(),
        Err(TrackerError::TooManyFailedReads(2))
    ));
    assert!(!tracker.is_running());
    assert_eq!(reads.load(Ordering::SeqCst), 5);

    let poses: Vec<MarkerPose> = std::iter::from_fn(|| processed.try_recv())
        .map(|batch| {
            assert_eq!(batch.len(), 1);
            batch[0].pose()
        })
        .collect();
    assert_eq!(poses.len(), 3);
    for pose in &poses {
        assert_eq!(pose.id, 5);
        assert_eq!(pose.center, Point2::new(20, 20));
        assert_eq!(pose, &poses[0]);
    }
    assert_eq!(std::iter::from_fn(|| raw.try_recv()).count(), 3);
}

#[test]
fn slow_subscriber_keeps_only_the_newest_items() {
    let detector = FixedDetector(detection(vec![square(9, 0.0, 0.0, 4.0)]));
    let tracker = tracker_with(ScriptedSource::new(6), detector, 1);
    let sub = tracker.subscribe(2);
    tracker.start().expect("start");
    assert!(tracker.join().is_err());
    assert_eq!(sub.len(), 2);
    assert!(sub.latest().is_some());
    assert!(sub.is_empty());
}

#[test]
fn unopenable_source_fails_to_start() {
    let board = make_board(3, 3, Dictionary::Dict4X4_50, 0.09, 0.01).expect("board");
    let tracker = Tracker::new(
        DeadSource,
        Arc::new(FixedDetector(detection(Vec::new()))),
        board,
        TrackerSettings::default(),
    );
    assert!(matches!(tracker.start(), Err(TrackerError::Capture(_))));
    assert!(!tracker.is_running());
    tracker.stop().expect("stop when never started");
}

#[test]
fn transformer_publishes_a_correction_from_live_corners() {
    let cam = common::camera();
    let corners = detection(vec![
        projected_marker(&cam, 0, -3.0, -2.0),
        projected_marker(&cam, 1, 3.0, -2.0),
        projected_marker(&cam, 2, 3.0, 2.0),
        projected_marker(&cam, 3, -3.0, 2.0),
        projected_marker(&cam, 12, 0.0, 0.0),
    ]);
    let tracker = Arc::new(tracker_with(
        ScriptedSource::endless(),
        FixedDetector(corners),
        3,
    ));
    tracker.start().expect("tracker");

    let mut transformer =
        Transformer::new(Arc::clone(&tracker), cam, Duration::from_millis(5));
    let handle = transformer.handle();
    transformer.start().expect("transformer");
    assert_eq!(tracker.subscriber_count(), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.load().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let state = handle.load().expect("transform published");
    // Outer corners are 7 units apart horizontally, 5 vertically, at f/z = 50.
    assert!((state.width as i32 - 350).abs() <= 2, "width {}", state.width);
    assert!((state.height as i32 - 250).abs() <= 2, "height {}", state.height);

    transformer.stop();
    transformer.stop();
    assert!(!transformer.is_running());
    assert_eq!(tracker.subscriber_count(), 0);
    tracker.stop().expect("stop");
}

#[test]
fn transformer_retries_until_every_corner_is_seen() {
    let cam = common::camera();
    let corner = |id, x, y| projected_marker(&cam, id, x, y);
    let partial = detection(vec![
        corner(0, -3.0, -2.0),
        corner(1, 3.0, -2.0),
        corner(3, -3.0, 2.0),
        corner(12, 0.0, 0.0),
    ]);
    let mut full = partial.clone();
    full.markers.push(corner(2, 3.0, 2.0));
    let complete = Arc::new(AtomicBool::new(false));

    let board = make_board(3, 3, Dictionary::Dict4X4_50, 0.09, 0.01).expect("board");
    let detector = GatedDetector {
        partial,
        full,
        complete: Arc::clone(&complete),
    };
    let tracker = Arc::new(Tracker::new(
        ScriptedSource::endless(),
        Arc::new(detector),
        board,
        TrackerSettings::default(),
    ));
    tracker.start().expect("tracker");

    let mut transformer =
        Transformer::new(Arc::clone(&tracker), cam, Duration::from_millis(5));
    let handle = transformer.handle();
    transformer.start().expect("transformer");

    // Many cycles on batches without marker 2.
    std::thread::sleep(Duration::from_millis(150));
    assert!(transformer.is_running());
    assert!(handle.load().is_none());

    complete.store(true, Ordering::SeqCst);
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.load().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let state = handle.load().expect("published once marker 2 showed up");
    assert!((state.width as i32 - 350).abs() <= 2, "width {}", state.width);
    assert!(transformer.is_running());

    transformer.stop();
    tracker.stop().expect("stop");
}

#[test]
fn existing_calibration_is_loaded_instead_of_recalibrating() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = RigConfig::default();
    cfg.capture.path = dir.path().to_path_buf();
    cfg.validate().expect("valid");

    let stored = CalibrationResult {
        camera_matrix: Matrix3::new(800.0, 0.0, 320.0, 0.0, 810.0, 240.0, 0.0, 0.0, 1.0),
        distortion: vec![0.01, -0.002, 0.0, 0.0, 0.0],
        rotation_vectors: vec![Vector3::new(0.1, 0.2, 0.3)],
        translation_vectors: vec![Vector3::new(0.0, 0.0, 0.5)],
    };
    stored.save(cfg.calibration_path()).expect("save");

    let mut engine = CalibrationEngine::new(
        cfg.calibration_board().expect("board"),
        Arc::new(FixedDetector(detection(Vec::new()))),
        cfg.calibration_params(),
    );
    let loaded = engine
        .load_or_run(
            cfg.calibration_path(),
            false,
            CalibrationMode::Automatic,
            &mut DeadSource,
            &mut NoPrompt,
        )
        .expect("load");
    assert_eq!(loaded, stored);
    assert_eq!(loaded.camera().intrinsics.fy, 810.0);

    assert!(engine
        .load_or_run(
            cfg.calibration_path(),
            true,
            CalibrationMode::Automatic,
            &mut DeadSource,
            &mut NoPrompt,
        )
        .is_err());
}
