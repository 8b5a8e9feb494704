//! Marker center, angle and integer borders from raw detector quads.

use crate::{Quad, RawDetection};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Where a marker sits and how it is turned.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub id: u32,
    pub center: Point2<i32>,
    /// Degrees in `[-90, 90]`.
    pub angle: f64,
}

/// [`MarkerPose`] plus the integer quad it was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerBorders {
    pub id: u32,
    pub center: Point2<i32>,
    pub angle: f64,
    /// TL, TR, BR, BL.
    pub corners: [Point2<i32>; 4],
}

impl MarkerBorders {
    pub fn pose(&self) -> MarkerPose {
        MarkerPose {
            id: self.id,
            center: self.center,
            angle: self.angle,
        }
    }
}

/// Midpoint of the TL–BR diagonal, truncated toward zero.
pub fn center_of(corners: &Quad) -> Point2<i32> {
    let (a, c) = (corners[0], corners[2]);
    Point2::new(((a.x + c.x) / 2.0) as i32, ((a.y + c.y) / 2.0) as i32)
}

/// Inclination of the vector from the TL corner to `center`:
/// `degrees(asin(dy / |v|))`. A degenerate quad reads as `0.0`.
pub fn angle_of(corners: &Quad, center: Point2<i32>) -> f64 {
    let dx = center.x as f64 - corners[0].x as f64;
    let dy = center.y as f64 - corners[0].y as f64;
    let len = dx.hypot(dy);
    if len < f64::EPSILON {
        return 0.0;
    }
    (dy / len).clamp(-1.0, 1.0).asin().to_degrees()
}

pub fn borders_of(corners: &Quad) -> [Point2<i32>; 4] {
    corners.map(|p| Point2::new(p.x as i32, p.y as i32))
}

fn is_finite(corners: &Quad) -> bool {
    corners.iter().all(|p| p.x.is_finite() && p.y.is_finite())
}

/// Center and angle of every usable marker, in detection order.
pub fn marker_poses(detection: &RawDetection) -> Vec<MarkerPose> {
    marker_borders(detection).iter().map(MarkerBorders::pose).collect()
}

/// Borders, center and angle of every usable marker, in detection order.
///
/// Quads with non-finite coordinates are skipped.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(detection), fields(markers = detection.markers.len()))
)]
pub fn marker_borders(detection: &RawDetection) -> Vec<MarkerBorders> {
    detection
        .markers
        .iter()
        .filter(|m| {
            let ok = is_finite(&m.corners);
            if !ok {
                log::debug!("marker {}: non-finite corners, skipped", m.id);
            }
            ok
        })
        .map(|m| {
            let center = center_of(&m.corners);
            MarkerBorders {
                id: m.id,
                center,
                angle: angle_of(&m.corners, center),
                corners: borders_of(&m.corners),
            }
        })
        .collect()
}
