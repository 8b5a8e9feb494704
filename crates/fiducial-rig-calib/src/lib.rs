//! Camera calibration from a ChArUco board.
//!
//! [`CalibrationEngine`] drives capture → board detection → fit and exposes
//! its progress as a [`CalibrationState`]. The fit itself is delegated to a
//! [`CalibrationSolver`]; [`PlanarCalibrationSolver`] is the built-in one.
//! Results are plain values ([`CalibrationResult`]) that round-trip through
//! JSON or a compact binary file.

mod engine;
mod error;
mod result;
mod solver;

pub use engine::{
    save_frames, CalibrationEngine, CalibrationMode, CalibrationParams, CalibrationState,
    CaptureDecision, CapturePrompt, NoPrompt,
};
pub use error::{CalibrationError, PersistError};
pub use result::{load, persist, CalibrationResult, CALIBRATION_FILE_NAME};
pub use solver::{BoardObservation, CalibrationSolver, PlanarCalibrationSolver};
