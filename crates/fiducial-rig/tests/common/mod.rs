#![allow(dead_code)]

use fiducial_rig::aruco::{BoardCorners, DetectedMarker};
use fiducial_rig::core::{
    CameraIntrinsics, CaptureError, Distortion, FrameSource, GrayImage, Pose, RgbImage,
};
use fiducial_rig::{axis_template, Board, CameraModel, Dictionary, MarkerDetector, RawDetection};
use fiducial_rig::{Display, Key, RenderError};
use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion, Vector3};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// `good` readable frames, then failures forever.
pub struct ScriptedSource {
    pub good: usize,
    pub reads: Arc<AtomicUsize>,
    pub size: (u32, u32),
    pub pace: Duration,
}

impl ScriptedSource {
    pub fn new(good: usize) -> Self {
        Self {
            good,
            reads: Arc::new(AtomicUsize::new(0)),
            size: (64, 48),
            pace: Duration::ZERO,
        }
    }

    pub fn endless() -> Self {
        Self {
            pace: Duration::from_millis(2),
            ..Self::new(usize::MAX)
        }
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn frame_size(&self) -> (u32, u32) {
        self.size
    }

    fn read(&mut self) -> Result<RgbImage, CaptureError> {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if n < self.good {
            Ok(RgbImage::new(self.size.0, self.size.1))
        } else {
            Err(CaptureError::ReadFailed)
        }
    }
}

/// Source that cannot be opened.
pub struct DeadSource;

impl FrameSource for DeadSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::Open("no camera".into()))
    }

    fn frame_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn read(&mut self) -> Result<RgbImage, CaptureError> {
        Err(CaptureError::ReadFailed)
    }
}

/// Detector that reports the same markers for every frame.
pub struct FixedDetector(pub RawDetection);

impl MarkerDetector for FixedDetector {
    fn detect(&self, _image: &GrayImage, _dictionary: Dictionary) -> RawDetection {
        self.0.clone()
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

/// Reports `partial` until `complete` is set, then `full`.
pub struct GatedDetector {
    pub partial: RawDetection,
    pub full: RawDetection,
    pub complete: Arc<AtomicBool>,
}

impl MarkerDetector for GatedDetector {
    fn detect(&self, _image: &GrayImage, _dictionary: Dictionary) -> RawDetection {
        if self.complete.load(Ordering::SeqCst) {
            self.full.clone()
        } else {
            self.partial.clone()
        }
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

/// Axis-aligned marker quad with its top-left corner at `(x, y)`.
pub fn square(id: u32, x: f32, y: f32, side: f32) -> DetectedMarker {
    DetectedMarker {
        id,
        corners: [
            Point2::new(x, y),
            Point2::new(x + side, y),
            Point2::new(x + side, y + side),
            Point2::new(x, y + side),
        ],
    }
}

pub fn detection(markers: Vec<DetectedMarker>) -> RawDetection {
    RawDetection {
        markers,
        ..RawDetection::default()
    }
}

pub fn camera() -> CameraModel {
    CameraModel::new(
        CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        },
        Distortion::default(),
    )
}

/// Unit marker facing `cam` at `(x, y, 10)`, as the detector would see it.
pub fn projected_marker(cam: &CameraModel, id: u32, x: f64, y: f64) -> DetectedMarker {
    let pose: Pose = Isometry3::from_parts(
        Translation3::new(x, y, 10.0),
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI),
    );
    let v = axis_template();
    let img = cam.project(&pose, &[v[1], v[2], v[3], v[0]]);
    DetectedMarker {
        id,
        corners: [img[0], img[1], img[2], img[3]],
    }
}

/// Display that records frames and replays a key script, quitting when the
/// script runs out.
#[derive(Default)]
pub struct ScriptedDisplay {
    pub keys: VecDeque<Option<Key>>,
    pub frames: Vec<RgbImage>,
    pub fullscreen: Vec<bool>,
}

impl ScriptedDisplay {
    pub fn new(keys: impl IntoIterator<Item = Option<Key>>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Display for ScriptedDisplay {
    fn present(&mut self, frame: &RgbImage) -> Result<(), RenderError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        std::thread::sleep(timeout);
        self.keys.pop_front().unwrap_or(Some(Key::Quit))
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen.push(fullscreen);
    }
}
