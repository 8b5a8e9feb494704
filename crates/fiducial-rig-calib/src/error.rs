use fiducial_rig_core::CaptureError;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Binary(#[from] bincode::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("frame source could not be opened")]
    SourceUnavailable(#[source] CaptureError),
    #[error("frame {index} could not be read")]
    FrameReadFailed {
        index: usize,
        #[source]
        source: CaptureError,
    },
    #[error("calibration board not found in any of {frames} frames")]
    NoBoardDetected { frames: usize },
    #[error("calibration fit failed: {0}")]
    CalibrationFitFailed(String),
    #[error("failed to write calibration to {}", path.display())]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("failed to read calibration from {}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("failed to save captured frame to {}", path.display())]
    FrameWriteFailed {
        path: PathBuf,
        #[source]
        source: CaptureError,
    },
    #[error("unknown calibration mode {0:?} (expected auto, semi or manual)")]
    UnknownMode(String),
    #[error("calibration aborted by operator")]
    Aborted,
}
