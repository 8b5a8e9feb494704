//! Perspective correction anchored on the four corner markers.
//!
//! Markers `0..=3` frame the projection surface (TL, TR, BR, BL). Each one's
//! pose is estimated with a unit side, a unit cube is projected through it and
//! the outer vertex of every corner marker becomes a corner of the surface.
//! The homography from that quad to an axis-aligned rectangle is what the
//! renderer warps with.

use crate::subscription::SubscriptionId;
use crate::tracker::Tracker;
use crossbeam_channel::{RecvTimeoutError, Sender};
use fiducial_rig_aruco::{MarkerBorders, RawDetection};
use fiducial_rig_core::{homography_from_4pt, CameraModel, Homography};
use nalgebra::{Point2, Point3};
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Ids of the markers that frame the surface, in TL, TR, BR, BL order.
pub const CORNER_MARKER_IDS: [u32; 4] = [0, 1, 2, 3];

/// Which cube vertex is taken as the outer corner of each corner marker.
pub const CORNER_VERTICES: [usize; 4] = [1, 2, 3, 0];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("transformer is already running")]
    AlreadyRunning,
    #[error("failed to spawn transform thread: {0}")]
    Spawn(String),
    #[error("detection has no markers")]
    NoMarkers,
    #[error("corner marker {0} not detected")]
    MissingCorner(u32),
    #[error("pose of marker {0} could not be estimated")]
    Pose(u32),
    #[error("corner quad collapses to {width}x{height}")]
    Degenerate { width: u32, height: u32 },
    #[error("corner quad has no perspective solution")]
    Singular,
}

impl From<io::Error> for TransformError {
    fn from(e: io::Error) -> Self {
        TransformError::Spawn(e.to_string())
    }
}

/// One published correction.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformState {
    /// TL, TR, BR, BL in camera pixels.
    pub corner_transform: [Point2<f32>; 4],
    /// Camera pixels to output pixels.
    pub homography: Homography,
    pub width: u32,
    pub height: u32,
}

fn distance(a: Point2<f32>, b: Point2<f32>) -> f32 {
    (b - a).norm()
}

/// Rectify `corners` (TL, TR, BR, BL) into a `w x h` rectangle where the
/// sides are the longer of each opposing pair, truncated to whole pixels.
pub fn compute_homography(corners: &[Point2<f32>; 4]) -> Result<TransformState, TransformError> {
    let [tl, tr, br, bl] = *corners;
    let width = (distance(tl, tr) as u32).max(distance(bl, br) as u32);
    let height = (distance(tl, bl) as u32).max(distance(tr, br) as u32);
    if width < 2 || height < 2 {
        return Err(TransformError::Degenerate { width, height });
    }

    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let dst = [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, h),
        Point2::new(0.0, h),
    ];
    let homography = homography_from_4pt(corners, &dst).ok_or(TransformError::Singular)?;
    Ok(TransformState {
        corner_transform: *corners,
        homography,
        width,
        height,
    })
}

/// Unit cube standing on a marker of side 1: base `v0..v3`, top `v4..v7`.
pub fn axis_template() -> [Point3<f64>; 8] {
    [
        Point3::new(-0.5, -0.5, 0.0),
        Point3::new(-0.5, 0.5, 0.0),
        Point3::new(0.5, 0.5, 0.0),
        Point3::new(0.5, -0.5, 0.0),
        Point3::new(-0.5, -0.5, 1.0),
        Point3::new(-0.5, 0.5, 1.0),
        Point3::new(0.5, 0.5, 1.0),
        Point3::new(0.5, -0.5, 1.0),
    ]
}

/// Project the axis template through the pose of one marker quad.
pub fn marker_axis(corners: &[Point2<f32>; 4], camera: &CameraModel) -> Option<[Point2<f32>; 8]> {
    let pose = camera.estimate_square_pose(corners, 1.0)?;
    let projected = camera.project(&pose, &axis_template());
    projected.try_into().ok()
}

/// Outer corners of the four corner markers.
pub fn corner_transform(
    detection: &RawDetection,
    camera: &CameraModel,
) -> Result<[Point2<f32>; 4], TransformError> {
    if detection.is_empty() {
        return Err(TransformError::NoMarkers);
    }
    let mut out = [Point2::origin(); 4];
    for ((slot, id), vertex) in out.iter_mut().zip(CORNER_MARKER_IDS).zip(CORNER_VERTICES) {
        let marker = detection.find(id).ok_or(TransformError::MissingCorner(id))?;
        let axis = marker_axis(&marker.corners, camera).ok_or(TransformError::Pose(id))?;
        *slot = axis[vertex];
    }
    Ok(out)
}

/// Full correction for one detection.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(markers = detection.len())))]
pub fn transform_from_detection(
    detection: &RawDetection,
    camera: &CameraModel,
) -> Result<TransformState, TransformError> {
    compute_homography(&corner_transform(detection, camera)?)
}

/// Camera-to-output scale from the top-left corners of the four corner
/// markers, averaging opposite edges. `None` until all four are seen.
pub fn reference_scaling(markers: &[MarkerBorders], width: u32, height: u32) -> Option<(f64, f64)> {
    let mut found = [None; 4];
    for m in markers {
        if let Some(slot) = found.get_mut(m.id as usize) {
            slot.get_or_insert(m.corners[0]);
        }
    }
    let [p0, p1, p2, p3] = found;
    let (p0, p1, p2, p3) = (p0?, p1?, p2?, p3?);

    let avg_width = f64::from((p1.x - p0.x) + (p2.x - p3.x)) / 2.0;
    let avg_height = f64::from((p3.y - p0.y) + (p2.y - p1.y)) / 2.0;
    if avg_width <= 0.0 || avg_height <= 0.0 {
        return None;
    }
    Some((f64::from(width) / avg_width, f64::from(height) / avg_height))
}

/// Shared slot holding the newest [`TransformState`].
#[derive(Clone, Debug, Default)]
pub struct TransformHandle(Arc<RwLock<Option<Arc<TransformState>>>>);

impl TransformHandle {
    pub fn load(&self) -> Option<Arc<TransformState>> {
        self.0.read().clone()
    }

    pub fn store(&self, state: TransformState) -> Arc<TransformState> {
        let state = Arc::new(state);
        *self.0.write() = Some(Arc::clone(&state));
        state
    }

    pub fn clear(&self) {
        self.0.write().take();
    }
}

struct Running {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
    subscription: SubscriptionId,
}

/// Recomputes the correction from the tracker's raw stream every `interval`.
pub struct Transformer {
    tracker: Arc<Tracker>,
    camera: CameraModel,
    interval: Duration,
    state: TransformHandle,
    running: Option<Running>,
}

impl Transformer {
    pub fn new(tracker: Arc<Tracker>, camera: CameraModel, interval: Duration) -> Self {
        Self {
            tracker,
            camera,
            interval,
            state: TransformHandle::default(),
            running: None,
        }
    }

    /// Handle for readers of the published correction.
    pub fn handle(&self) -> TransformHandle {
        self.state.clone()
    }

    pub fn snapshot(&self) -> Option<Arc<TransformState>> {
        self.state.load()
    }

    /// Started and the thread has not exited.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Compute and publish a correction from `detection` right away.
    pub fn update(&self, detection: &RawDetection) -> Result<Arc<TransformState>, TransformError> {
        let state = transform_from_detection(detection, &self.camera)?;
        log::debug!("transform updated: {}x{}", state.width, state.height);
        Ok(self.state.store(state))
    }

    pub fn start(&mut self) -> Result<(), TransformError> {
        if self.running.is_some() {
            return Err(TransformError::AlreadyRunning);
        }
        let subscription = self.tracker.subscribe_raw(1);
        let sub_id = subscription.id();
        let (shutdown, stopped) = crossbeam_channel::bounded::<()>(1);
        let camera = self.camera;
        let interval = self.interval;
        let state = self.state.clone();

        let spawned = thread::Builder::new()
            .name("transform".to_string())
            .spawn(move || loop {
                if let Some(detection) = subscription.latest() {
                    match transform_from_detection(&detection, &camera) {
                        Ok(next) => {
                            log::debug!("transform updated: {}x{}", next.width, next.height);
                            state.store(next);
                        }
                        Err(e) => log::debug!("transform skipped: {e}"),
                    }
                }
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                log::info!("transform running every {:?}", self.interval);
                self.running = Some(Running {
                    shutdown,
                    handle,
                    subscription: sub_id,
                });
                Ok(())
            }
            Err(e) => {
                if let Err(e) = self.tracker.unsubscribe(sub_id) {
                    log::debug!("{e}");
                }
                Err(e.into())
            }
        }
    }

    /// Wake the thread, wait for it and drop the tracker subscription.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.try_send(());
        drop(running.shutdown);
        if running.handle.join().is_err() {
            log::warn!("transform thread panicked");
        }
        if let Err(e) = self.tracker.unsubscribe(running.subscription) {
            log::debug!("transform subscription already gone: {e}");
        }
        log::info!("transform stopped");
    }
}

impl Drop for Transformer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fiducial_rig_aruco::DetectedMarker;
    use fiducial_rig_core::{CameraIntrinsics, Distortion, Pose};
    use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

    fn camera() -> CameraModel {
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

    /// Marker facing the camera, upright in the image.
    fn marker_at(cam: &CameraModel, id: u32, x: f64, y: f64) -> DetectedMarker {
        let pose: Pose = Isometry3::from_parts(
            Translation3::new(x, y, 10.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI),
        );
        let base = &axis_template()[..4];
        let object = [base[1], base[2], base[3], base[0]];
        let img = cam.project(&pose, &object);
        DetectedMarker {
            id,
            corners: [img[0], img[1], img[2], img[3]],
        }
    }

    fn corner_detection(cam: &CameraModel) -> RawDetection {
        RawDetection {
            markers: vec![
                marker_at(cam, 7, 0.0, 0.0),
                marker_at(cam, 2, 3.0, 2.0),
                marker_at(cam, 0, -3.0, -2.0),
                marker_at(cam, 3, -3.0, 2.0),
                marker_at(cam, 1, 3.0, -2.0),
            ],
            ..RawDetection::default()
        }
    }

    #[test]
    fn axis_aligned_square_maps_to_its_own_size() {
        let corners = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 100.0),
            Point2::new(0.0, 100.0),
        ];
        let state = compute_homography(&corners).expect("homography");
        assert_eq!((state.width, state.height), (100, 100));
        let expected = [(0.0, 0.0), (99.0, 0.0), (99.0, 99.0), (0.0, 99.0)];
        for (c, (x, y)) in corners.iter().zip(expected) {
            let p = state.homography.apply(*c);
            assert_relative_eq!(p.x, x, epsilon = 1e-3);
            assert_relative_eq!(p.y, y, epsilon = 1e-3);
        }
    }

    #[test]
    fn sides_use_the_longer_of_each_pair() {
        let corners = [
            Point2::new(10.0, 10.0),
            Point2::new(210.5, 10.0),
            Point2::new(190.0, 130.0),
            Point2::new(30.0, 120.0),
        ];
        let state = compute_homography(&corners).expect("homography");
        assert_eq!(state.width, 200);
        assert_eq!(state.height, 121);
    }

    #[test]
    fn collapsed_quad_is_rejected() {
        let p = Point2::new(5.0, 5.0);
        assert_eq!(
            compute_homography(&[p; 4]),
            Err(TransformError::Degenerate {
                width: 0,
                height: 0
            })
        );
    }

    #[test]
    fn corner_vertices_are_the_outer_marker_corners() {
        let cam = camera();
        let detection = corner_detection(&cam);
        let corners = corner_transform(&detection, &cam).expect("corners");
        let expected = [
            detection.find(0).expect("0").corners[0],
            detection.find(1).expect("1").corners[1],
            detection.find(2).expect("2").corners[2],
            detection.find(3).expect("3").corners[3],
        ];
        for (got, want) in corners.iter().zip(expected) {
            assert!(distance(*got, want) < 0.5, "{got:?} vs {want:?}");
        }
        assert!(corners[0].x < corners[1].x && corners[0].y < corners[3].y);
    }

    #[test]
    fn missing_corner_marker_is_reported() {
        let cam = camera();
        let mut detection = corner_detection(&cam);
        detection.markers.retain(|m| m.id != 2);
        assert_eq!(
            transform_from_detection(&detection, &cam),
            Err(TransformError::MissingCorner(2))
        );
        assert_eq!(
            transform_from_detection(&RawDetection::default(), &cam),
            Err(TransformError::NoMarkers)
        );
    }

    #[test]
    fn reference_scaling_averages_opposite_edges() {
        let at = |id, x, y| MarkerBorders {
            id,
            center: Point2::new(x + 5, y + 5),
            angle: 0.0,
            corners: [
                Point2::new(x, y),
                Point2::new(x + 10, y),
                Point2::new(x + 10, y + 10),
                Point2::new(x, y + 10),
            ],
        };
        let markers = [at(9, 0, 0), at(0, 10, 10), at(1, 110, 10), at(2, 130, 60), at(3, 10, 60)];
        let (sx, sy) = reference_scaling(&markers, 1100, 500).expect("scaling");
        assert_relative_eq!(sx, 10.0);
        assert_relative_eq!(sy, 10.0);
        assert!(reference_scaling(&markers[..3], 1100, 500).is_none());
    }
}
