//! JSON configuration for the whole rig.

use crate::render::RendererSettings;
use crate::tracker::TrackerSettings;
use fiducial_rig_aruco::{make_board, Board, BoardError, ConfigurationError, Dictionary};
use fiducial_rig_calib::{CalibrationMode, CalibrationParams, CALIBRATION_FILE_NAME};
use fiducial_rig_core::CaptureSettings;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Dictionary(#[from] ConfigurationError),
    #[error(transparent)]
    Board(#[from] BoardError),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive_secs(field: &'static str, secs: f64) -> Result<(), ConfigError> {
    if secs.is_finite() && secs > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{secs} s, expected a positive duration")))
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArucoConfig {
    /// Marker resolution in bits per side.
    pub size: u32,
    /// Number of distinct markers in the family.
    pub uniques: u32,
}

impl Default for ArucoConfig {
    fn default() -> Self {
        Self {
            size: 4,
            uniques: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_failed_read: u32,
    /// Queue capacity handed to each subscriber.
    pub queue_capacity: usize,
    /// Show the debug renderer instead of the projection.
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_failed_read: 10,
            queue_capacity: 8,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub number_images: usize,
    /// Seconds between captures.
    pub interval: f64,
    /// Board squares; the printed board has one more in each direction.
    pub cols: u32,
    pub rows: u32,
    pub square_length: f32,
    pub marker_length: f32,
    pub mode: CalibrationMode,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            number_images: 15,
            interval: 0.5,
            cols: 7,
            rows: 5,
            square_length: 0.04,
            marker_length: 0.02,
            mode: CalibrationMode::Automatic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_id: u32,
    pub fps: u32,
    /// Data directory: calibration file and marker images.
    pub path: PathBuf,
    /// Requested camera resolution; native when absent.
    pub resolution: Option<(u32, u32)>,
    pub aruco: ArucoConfig,
    pub tracker: TrackerConfig,
    pub calibration: CalibrationConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            fps: 30,
            path: PathBuf::from("data"),
            resolution: None,
            aruco: ArucoConfig::default(),
            tracker: TrackerConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Seconds between homography updates.
    pub transform_interval: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            transform_interval: 2.0,
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub capture: CaptureConfig,
    pub renderer: RendererConfig,
}

impl RigConfig {
    /// Load a JSON config from disk. Missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate in one go.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cfg = Self::load_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.fps == 0 {
            return Err(invalid("capture.fps", "must be positive"));
        }
        if matches!(capture.resolution, Some((0, _) | (_, 0))) {
            return Err(invalid("capture.resolution", "must be non-zero"));
        }
        self.dictionary()?;
        if capture.tracker.max_failed_read == 0 {
            return Err(invalid("capture.tracker.max_failed_read", "must be positive"));
        }
        if capture.tracker.queue_capacity == 0 {
            return Err(invalid("capture.tracker.queue_capacity", "must be positive"));
        }

        let calibration = &capture.calibration;
        if calibration.number_images == 0 {
            return Err(invalid(
                "capture.calibration.number_images",
                "must be positive, more than 5 recommended",
            ));
        }
        positive_secs("capture.calibration.interval", calibration.interval)?;
        self.calibration_board()?;

        positive_secs("renderer.transform_interval", self.renderer.transform_interval)?;
        if self.renderer.width == 0 || self.renderer.height == 0 {
            return Err(invalid("renderer size", "must be non-zero"));
        }
        Ok(())
    }

    pub fn dictionary(&self) -> Result<Dictionary, ConfigError> {
        let aruco = &self.capture.aruco;
        Ok(Dictionary::resolve(aruco.size, aruco.uniques)?)
    }

    /// ChArUco board used for camera calibration.
    pub fn calibration_board(&self) -> Result<Board, ConfigError> {
        let c = &self.capture.calibration;
        Ok(make_board(
            c.cols + 1,
            c.rows + 1,
            self.dictionary()?,
            c.square_length,
            c.marker_length,
        )?)
    }

    /// Small board the tracker refines detections against.
    pub fn tracker_board(&self) -> Result<Board, ConfigError> {
        Ok(make_board(3, 3, self.dictionary()?, 0.09, 0.01)?)
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.capture.path.join(CALIBRATION_FILE_NAME)
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.capture.path.join("markers")
    }

    /// Frame period at the configured fps, whole milliseconds rounded down.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(u64::from(1000 / self.capture.fps.max(1)))
    }

    pub fn transform_interval(&self) -> Duration {
        secs(self.renderer.transform_interval)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            resolution: self.capture.resolution,
            ..CaptureSettings::fixed_optics()
        }
    }

    pub fn calibration_params(&self) -> CalibrationParams {
        let c = &self.capture.calibration;
        CalibrationParams {
            frame_count: c.number_images,
            interval: secs(c.interval),
            ..CalibrationParams::default()
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            max_failed_read: self.capture.tracker.max_failed_read,
            capture: self.capture_settings(),
            ..TrackerSettings::default()
        }
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            width: self.renderer.width,
            height: self.renderer.height,
            delay: self.delay(),
            marker_dir: self.marker_dir(),
            queue_capacity: self.capture.tracker.queue_capacity,
            ..RendererSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RigConfig::default();
        cfg.validate().expect("valid");
        assert_eq!(cfg.dictionary().expect("dict"), Dictionary::Dict4X4_50);
        assert_eq!(cfg.delay(), Duration::from_millis(33));
        assert_eq!(cfg.calibration_path(), PathBuf::from("data").join("calib.json"));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: RigConfig = serde_json::from_str(
            r#"{ "capture": { "fps": 24, "aruco": { "size": 6, "uniques": 250 },
                 "calibration": { "mode": "manual" } } }"#,
        )
        .expect("parse");
        assert_eq!(cfg.capture.fps, 24);
        assert_eq!(cfg.delay(), Duration::from_millis(41));
        assert_eq!(cfg.dictionary().expect("dict"), Dictionary::Dict6X6_250);
        assert_eq!(cfg.capture.calibration.mode, CalibrationMode::Manual);
        assert_eq!(cfg.renderer, RendererConfig::default());
    }

    #[test]
    fn validation_names_the_bad_field() {
        let mut cfg = RigConfig::default();
        cfg.capture.fps = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "capture.fps", .. })
        ));

        let mut cfg = RigConfig::default();
        cfg.renderer.transform_interval = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "renderer.transform_interval", .. })
        ));

        let mut cfg = RigConfig::default();
        cfg.capture.aruco.uniques = 42;
        assert!(matches!(cfg.validate(), Err(ConfigError::Dictionary(_))));

        let mut cfg = RigConfig::default();
        cfg.capture.calibration.marker_length = 0.05;
        assert!(matches!(cfg.validate(), Err(ConfigError::Board(_))));
    }

    #[test]
    fn boards_follow_the_config() {
        let cfg = RigConfig::default();
        let calib = cfg.calibration_board().expect("calibration board");
        assert_eq!((calib.cols(), calib.rows()), (8, 6));
        let tracker = cfg.tracker_board().expect("tracker board");
        assert_eq!((tracker.cols(), tracker.rows()), (3, 3));
        assert_eq!(cfg.calibration_params().frame_count, 15);
        assert_eq!(cfg.tracker_settings().max_failed_read, 10);
        assert_eq!(cfg.renderer_settings().marker_dir, PathBuf::from("data").join("markers"));
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rig.json");
        let mut cfg = RigConfig::default();
        cfg.capture.resolution = Some((1920, 1080));
        cfg.write_json(&path).expect("write");
        assert_eq!(RigConfig::load_validated(&path).expect("load"), cfg);
    }
}
