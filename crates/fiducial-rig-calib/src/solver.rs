//! Intrinsics and per-view pose from ChArUco corner observations.

use crate::{CalibrationError, CalibrationResult};
use fiducial_rig_aruco::{Board, BoardCorners};
use fiducial_rig_core::{estimate_homography, pose_from_homography, rotation_vector};
use nalgebra::{DMatrix, Matrix3, Point2, SVector};

/// Interpolated board corners from one accepted view.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardObservation {
    pub corners: BoardCorners,
    pub image_size: (u32, u32),
}

/// Turns accepted views into a [`CalibrationResult`].
pub trait CalibrationSolver: Send {
    fn calibrate(
        &self,
        board: &Board,
        views: &[BoardObservation],
        image_size: (u32, u32),
    ) -> Result<CalibrationResult, CalibrationError>;
}

/// Linear planar calibration without distortion.
///
/// Three or more views use Zhang's closed form for the full `K`. With fewer,
/// the principal point is pinned to the image center, skew to zero and
/// `fx == fy`, leaving a single focal length that a tilted view constrains.
/// A fronto-parallel single view cannot be fitted.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanarCalibrationSolver;

fn fit_failed(msg: impl Into<String>) -> CalibrationError {
    CalibrationError::CalibrationFitFailed(msg.into())
}

fn view_homography(board: &Board, view: &BoardObservation) -> Option<Matrix3<f64>> {
    let (object, image): (Vec<Point2<f32>>, Vec<Point2<f32>>) = view
        .corners
        .ids
        .iter()
        .zip(&view.corners.points)
        .filter_map(|(&id, &p)| Some((board.corner_object_xy(id)?, p)))
        .unzip();
    estimate_homography(&object, &image).map(|h| h.h)
}

/// Zhang's `v_ij` row for homography columns `i`, `j`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

fn zhang_intrinsics(hs: &[Matrix3<f64>]) -> Option<Matrix3<f64>> {
    let mut v = DMatrix::<f64>::zeros(2 * hs.len(), 6);
    for (k, h) in hs.iter().enumerate() {
        v.row_mut(2 * k).copy_from(&v_ij(h, 0, 1).transpose());
        v.row_mut(2 * k + 1)
            .copy_from(&(v_ij(h, 0, 0) - v_ij(h, 1, 1)).transpose());
    }

    let v_t = v.svd(false, true).v_t?;
    let b = v_t.row(v_t.nrows().checked_sub(1)?);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let scale = b11 * b11 + b22 * b22;
    if scale <= 0.0 || denom.abs() / scale < 1e-6 {
        return None;
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return None;
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Some(Matrix3::new(alpha, gamma, u0, 0.0, beta, v0, 0.0, 0.0, 1.0))
}

/// Focal length with a known principal point, from the orthogonality and
/// equal-norm constraints on the first two rotation columns.
fn focal_with_center(hs: &[Matrix3<f64>], center: (f64, f64)) -> Option<Matrix3<f64>> {
    let shift = Matrix3::new(1.0, 0.0, -center.0, 0.0, 1.0, -center.1, 0.0, 0.0, 1.0);
    // Each constraint reads p / f² + q = 0.
    let (mut pq, mut pp) = (0.0, 0.0);
    for h in hs {
        let a = shift * h;
        let p = [
            a[(0, 0)] * a[(0, 1)] + a[(1, 0)] * a[(1, 1)],
            a[(0, 0)].powi(2) + a[(1, 0)].powi(2) - a[(0, 1)].powi(2) - a[(1, 1)].powi(2),
        ];
        let q = [
            a[(2, 0)] * a[(2, 1)],
            a[(2, 0)].powi(2) - a[(2, 1)].powi(2),
        ];
        for (p, q) in p.iter().zip(q) {
            pq += p * q;
            pp += p * p;
        }
    }
    if pp <= 0.0 {
        return None;
    }
    let inv_f2 = -pq / pp;
    if !inv_f2.is_finite() || inv_f2 <= 1e-18 {
        return None;
    }
    let f = inv_f2.sqrt().recip();
    Some(Matrix3::new(f, 0.0, center.0, 0.0, f, center.1, 0.0, 0.0, 1.0))
}

impl CalibrationSolver for PlanarCalibrationSolver {
    fn calibrate(
        &self,
        board: &Board,
        views: &[BoardObservation],
        image_size: (u32, u32),
    ) -> Result<CalibrationResult, CalibrationError> {
        if views.is_empty() {
            return Err(fit_failed("no views to fit"));
        }
        let hs = views
            .iter()
            .enumerate()
            .map(|(i, v)| {
                view_homography(board, v)
                    .ok_or_else(|| fit_failed(format!("view {i}: fewer than 4 usable corners")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let k = if hs.len() >= 3 {
            zhang_intrinsics(&hs)
        } else {
            let center = (image_size.0 as f64 * 0.5, image_size.1 as f64 * 0.5);
            focal_with_center(&hs, center)
        }
        .ok_or_else(|| fit_failed("degenerate view geometry"))?;
        log::debug!(
            "intrinsics from {} view(s): fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            hs.len(),
            k[(0, 0)],
            k[(1, 1)],
            k[(0, 2)],
            k[(1, 2)]
        );

        let mut rotation_vectors = Vec::with_capacity(hs.len());
        let mut translation_vectors = Vec::with_capacity(hs.len());
        for (i, h) in hs.iter().enumerate() {
            let pose = pose_from_homography(&k, h)
                .ok_or_else(|| fit_failed(format!("view {i}: pose decomposition failed")))?;
            rotation_vectors.push(rotation_vector(&pose));
            translation_vectors.push(pose.translation.vector);
        }

        Ok(CalibrationResult {
            camera_matrix: k,
            distortion: vec![0.0; 5],
            rotation_vectors,
            translation_vectors,
        })
    }
}
