//! ArUco/ChArUco vocabulary for the fiducial tracking rig.
//!
//! This crate covers:
//! - the sixteen predefined dictionary families (`4..=7` bits × `50..=1000`
//!   markers) and strict resolution of a `(size, unique_count)` pair,
//! - ChArUco board geometry (marker cells, inner corner ids, object points),
//! - raw per-frame detector output and the pure functions that turn it into
//!   marker centers, angles and integer borders.
//!
//! It does **not** locate quads in pixels. Detection, refinement and board
//! corner interpolation are reached through the [`MarkerDetector`] trait so a
//! vision backend can be plugged in.

mod board;
mod detection;
mod detector;
mod dictionary;
mod geometry;

pub use board::{make_board, Board, BoardError, BoardSpec};
pub use detection::{BoardCorners, DetectedMarker, Quad, RawDetection};
pub use detector::MarkerDetector;
pub use dictionary::{ConfigurationError, Dictionary};
pub use geometry::{
    angle_of, borders_of, center_of, marker_borders, marker_poses, MarkerBorders, MarkerPose,
};
