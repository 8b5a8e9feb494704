//! Pinhole camera with radial/tangential distortion.
//!
//! Conventions follow the usual computer-vision layout: `K = [fx s cx; 0 fy cy;
//! 0 0 1]`, distortion coefficients ordered `k1 k2 p1 p2 k3`, and poses map
//! object coordinates into the camera frame (`X_c = R * X_o + t`).

use crate::homography_from_4pt;
use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector2, Vector3,
};
use serde::{Deserialize, Serialize};

/// Rigid transform from an object frame into the camera frame.
pub type Pose = Isometry3<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

impl CameraIntrinsics {
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn from_k_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        }
    }
}

/// Brown-Conrady distortion, `k1 k2 p1 p2 k3`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Missing trailing coefficients read as zero; extras are ignored.
    pub fn from_coeffs(coeffs: &[f64]) -> Self {
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    pub fn coeffs(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs().iter().all(|c| *c == 0.0)
    }

    /// Map an ideal normalized point to its distorted position.
    pub fn distort(&self, p: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + dx, y * radial + dy)
    }

    /// Fixed-point inversion of [`Distortion::distort`].
    pub fn undistort(&self, pd: Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return pd;
        }
        let mut p = pd;
        for _ in 0..20 {
            let r2 = p.norm_squared();
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let dx = 2.0 * self.p1 * p.x * p.y + self.p2 * (r2 + 2.0 * p.x * p.x);
            let dy = self.p1 * (r2 + 2.0 * p.y * p.y) + 2.0 * self.p2 * p.x * p.y;
            p = Vector2::new((pd.x - dx) / radial, (pd.y - dy) / radial);
        }
        p
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project object points through `pose`, applying distortion.
    pub fn project(&self, pose: &Pose, points: &[Point3<f64>]) -> Vec<Point2<f32>> {
        let k = &self.intrinsics;
        points
            .iter()
            .map(|p| {
                let pc = pose * p;
                let xn = Vector2::new(pc.x / pc.z, pc.y / pc.z);
                let xd = self.distortion.distort(xn);
                Point2::new(
                    (k.fx * xd.x + k.skew * xd.y + k.cx) as f32,
                    (k.fy * xd.y + k.cy) as f32,
                )
            })
            .collect()
    }

    /// Pixel to ideal (undistorted) normalized image coordinates.
    pub fn normalize(&self, pixel: Point2<f32>) -> Option<Vector2<f64>> {
        let k_inv = self.intrinsics.k_matrix().try_inverse()?;
        let v = k_inv * Vector3::new(pixel.x as f64, pixel.y as f64, 1.0);
        Some(self.distortion.undistort(Vector2::new(v.x, v.y)))
    }

    /// Pose of a planar square of side `side` from its four image corners.
    ///
    /// Corners are ordered top-left, top-right, bottom-right, bottom-left.
    /// The square spans `[-side/2, side/2]` in X and Y with +Y towards the
    /// top edge and +Z out of the square towards the camera.
    pub fn estimate_square_pose(&self, corners: &[Point2<f32>; 4], side: f64) -> Option<Pose> {
        let half = (side * 0.5) as f32;
        let object = [
            Point2::new(-half, half),
            Point2::new(half, half),
            Point2::new(half, -half),
            Point2::new(-half, -half),
        ];
        let mut image = [Point2::new(0.0_f32, 0.0); 4];
        for (dst, c) in image.iter_mut().zip(corners) {
            let n = self.normalize(*c)?;
            *dst = Point2::new(n.x as f32, n.y as f32);
        }
        let h = homography_from_4pt(&object, &image)?;
        pose_from_homography(&Matrix3::identity(), &h.h)
    }
}

/// Decompose a plane-induced homography `H ~ K [r1 r2 t]` into a pose.
///
/// The plane is `Z = 0` in object coordinates. The sign of the scale is chosen
/// so the plane lies in front of the camera, and the rotation is projected
/// onto SO(3).
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
    let k_inv = k.try_inverse()?;
    let h1 = k_inv * h.column(0);
    let h2 = k_inv * h.column(1);
    let h3 = k_inv * h.column(2);

    let (n1, n2) = (h1.norm(), h2.norm());
    if n1 < 1e-12 || n2 < 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let (mut u, v_t) = (svd.u?, svd.v_t?);
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let r_orth = u * v_t;
    if !r_orth.iter().all(|v| v.is_finite()) {
        return None;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Some(Isometry3::from_parts(Translation3::from(h3 * lambda), rotation))
}

/// Rodrigues vector (axis × angle) of the pose rotation.
pub fn rotation_vector(pose: &Pose) -> Vector3<f64> {
    pose.rotation.scaled_axis()
}

pub fn pose_from_vectors(rvec: &Vector3<f64>, tvec: &Vector3<f64>) -> Pose {
    Isometry3::new(*tvec, *rvec)
}
