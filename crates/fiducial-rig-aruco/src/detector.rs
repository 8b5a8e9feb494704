use crate::{Board, BoardCorners, Dictionary, RawDetection};
use fiducial_rig_core::{CameraModel, GrayImage};

/// Vision backend that finds markers in pixels.
///
/// Implementations must be shareable across the tracking and calibration
/// threads.
pub trait MarkerDetector: Send + Sync {
    /// Find every marker of `dictionary` in `image`.
    fn detect(&self, image: &GrayImage, dictionary: Dictionary) -> RawDetection;

    /// Use the known board layout (and camera, when calibrated) to recover
    /// markers among the rejected candidates. Backends without refinement
    /// return the detection unchanged.
    fn refine(
        &self,
        _image: &GrayImage,
        _board: &Board,
        detection: RawDetection,
        _camera: Option<&CameraModel>,
    ) -> RawDetection {
        detection
    }

    /// Interpolate the board's inner chessboard corners from its markers.
    fn interpolate_corners(
        &self,
        image: &GrayImage,
        board: &Board,
        detection: &RawDetection,
    ) -> BoardCorners;
}
