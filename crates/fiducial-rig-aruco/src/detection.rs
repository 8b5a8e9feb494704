use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Image-space corners ordered TL, TR, BR, BL.
pub type Quad = [Point2<f32>; 4];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    pub corners: Quad,
}

/// Detector output for one frame, before any interpretation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub markers: Vec<DetectedMarker>,
    /// Candidate quads that failed to decode.
    pub rejected: Vec<Quad>,
    /// Indices into `rejected` that refinement turned into markers.
    pub recovered: Vec<usize>,
}

impl RawDetection {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.markers.iter().map(|m| m.id)
    }

    /// First marker with `id`, if seen.
    pub fn find(&self, id: u32) -> Option<&DetectedMarker> {
        self.markers.iter().find(|m| m.id == id)
    }
}

/// Inner board corners recovered from the markers around them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardCorners {
    pub ids: Vec<u32>,
    pub points: Vec<Point2<f32>>,
}

impl BoardCorners {
    /// Interpolation response: how many corners were recovered.
    #[inline]
    pub fn response(&self) -> usize {
        self.ids.len().min(self.points.len())
    }
}
