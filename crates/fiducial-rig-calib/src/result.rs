//! Calibration values and their on-disk form.

use crate::{CalibrationError, PersistError};
use fiducial_rig_core::{CameraIntrinsics, CameraModel, Distortion};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Default file name under the rig's data directory.
pub const CALIBRATION_FILE_NAME: &str = "calib.json";

/// Camera intrinsics, distortion and the pose of the board in every view
/// that took part in the fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera_matrix: Matrix3<f64>,
    /// `k1 k2 p1 p2 k3`.
    pub distortion: Vec<f64>,
    /// Rodrigues vectors, one per view.
    pub rotation_vectors: Vec<Vector3<f64>>,
    pub translation_vectors: Vec<Vector3<f64>>,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl CalibrationResult {
    pub fn camera(&self) -> CameraModel {
        CameraModel::new(
            CameraIntrinsics::from_k_matrix(&self.camera_matrix),
            Distortion::from_coeffs(&self.distortion),
        )
    }

    /// Write to `path`: pretty JSON for `.json`, bincode otherwise.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        self.write(path)
            .map_err(|source| CalibrationError::PersistFailed {
                path: path.to_path_buf(),
                source,
            })?;
        log::info!("calibration written to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        Self::read(path).map_err(|source| CalibrationError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        if is_json(path) {
            fs::write(path, serde_json::to_string_pretty(self)?)?;
        } else {
            let mut out = BufWriter::new(fs::File::create(path)?);
            bincode::serialize_into(&mut out, self)?;
            out.flush()?;
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, PersistError> {
        if is_json(path) {
            let raw = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        } else {
            let input = BufReader::new(fs::File::open(path)?);
            Ok(bincode::deserialize_from(input)?)
        }
    }
}

pub fn persist(result: &CalibrationResult, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
    result.save(path)
}

pub fn load(path: impl AsRef<Path>) -> Result<CalibrationResult, CalibrationError> {
    CalibrationResult::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CalibrationResult {
        CalibrationResult {
            camera_matrix: Matrix3::new(
                912.345678901234, 0.0, 639.87654321, //
                0.0, 910.1, 359.000000001, //
                0.0, 0.0, 1.0,
            ),
            distortion: vec![-0.1234567890123, 0.0987654321, 1e-5, -3.3e-7, 0.0],
            rotation_vectors: vec![Vector3::new(0.1, -0.2, 3.0000000000000004)],
            translation_vectors: vec![Vector3::new(-0.05, 0.02, 1.7)],
        }
    }

    #[test]
    fn json_round_trip_is_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CALIBRATION_FILE_NAME);
        let result = sample();
        persist(&result, &path).expect("persist");
        assert_eq!(load(&path).expect("load"), result);
    }

    #[test]
    fn binary_round_trip_is_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("calib.bin");
        let result = sample();
        result.save(&path).expect("save");
        assert_eq!(CalibrationResult::load(&path).expect("load"), result);
    }

    #[test]
    fn missing_or_corrupt_files_fail_to_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            load(&missing),
            Err(CalibrationError::ReadFailed { .. })
        ));

        let corrupt = dir.path().join("bad.json");
        fs::write(&corrupt, "{ not json").expect("write");
        assert!(matches!(
            load(&corrupt),
            Err(CalibrationError::ReadFailed {
                source: PersistError::Json(_),
                ..
            })
        ));
    }

    #[test]
    fn unwritable_path_fails_to_persist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").expect("write");
        let path = blocker.join("calib.json");
        assert!(matches!(
            persist(&sample(), &path),
            Err(CalibrationError::PersistFailed { .. })
        ));
    }

    #[test]
    fn camera_model_reads_matrix_and_coefficients() {
        let cam = sample().camera();
        assert_eq!(cam.intrinsics.fx, 912.345678901234);
        assert_eq!(cam.intrinsics.cy, 359.000000001);
        assert_eq!(cam.distortion.k1, -0.1234567890123);
    }
}
