//! Capture → detect → fit orchestration.

use crate::{
    BoardObservation, CalibrationError, CalibrationResult, CalibrationSolver,
    PlanarCalibrationSolver,
};
use fiducial_rig_aruco::{Board, MarkerDetector};
use fiducial_rig_core::{to_gray, CaptureSettings, Frame, FrameSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Capturing,
    Detecting,
    Fitting,
    Done,
    Failed,
}

/// How frames are gathered; every mode then detects and fits the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationMode {
    /// Fixed interval, no interaction.
    #[serde(rename = "auto")]
    Automatic,
    /// The operator is prompted before each evenly spaced capture.
    #[serde(rename = "semi")]
    SemiAutomatic,
    /// Every frame is reviewed and kept, retaken or the run aborted.
    #[serde(rename = "manual")]
    Manual,
}

impl FromStr for CalibrationMode {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "automatic" => Ok(Self::Automatic),
            "semi" | "semi-automatic" => Ok(Self::SemiAutomatic),
            "manual" => Ok(Self::Manual),
            _ => Err(CalibrationError::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationParams {
    pub frame_count: usize,
    pub interval: Duration,
    /// Reduce frames to luma at capture time.
    pub grayscale: bool,
    /// Accepted views to collect before fitting; the scan stops at the first
    /// qualifying frame when this is 1.
    pub max_views: usize,
    /// Write every captured frame as `img-NN.png` into this directory.
    pub save_frames_to: Option<PathBuf>,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            frame_count: 15,
            interval: Duration::from_millis(500),
            grayscale: true,
            max_views: 1,
            save_frames_to: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureDecision {
    Keep,
    Retake,
    Abort,
}

/// Operator interaction for the semi-automatic and manual modes.
pub trait CapturePrompt {
    /// Called before capture `index` of `total`; blocks until the operator is
    /// ready.
    fn before_capture(&mut self, _index: usize, _total: usize) {}

    /// Decide what to do with a freshly captured frame (manual mode only).
    fn review(&mut self, _index: usize, _frame: &Frame) -> CaptureDecision {
        CaptureDecision::Keep
    }
}

/// Prompt that never waits and keeps everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPrompt;

impl CapturePrompt for NoPrompt {}

pub struct CalibrationEngine {
    board: Board,
    detector: Arc<dyn MarkerDetector>,
    solver: Box<dyn CalibrationSolver>,
    params: CalibrationParams,
    state: CalibrationState,
}

impl CalibrationEngine {
    pub fn new(board: Board, detector: Arc<dyn MarkerDetector>, params: CalibrationParams) -> Self {
        Self {
            board,
            detector,
            solver: Box::new(PlanarCalibrationSolver),
            params,
            state: CalibrationState::Idle,
        }
    }

    pub fn with_solver(mut self, solver: Box<dyn CalibrationSolver>) -> Self {
        self.solver = solver;
        self
    }

    #[inline]
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    fn track<T>(
        &mut self,
        result: Result<T, CalibrationError>,
    ) -> Result<T, CalibrationError> {
        if result.is_err() {
            self.state = CalibrationState::Failed;
        }
        result
    }

    fn open(source: &mut dyn FrameSource) -> Result<(), CalibrationError> {
        source.open().map_err(CalibrationError::SourceUnavailable)?;
        if let Err(e) = source.apply_settings(&CaptureSettings::default()) {
            log::warn!("camera settings not applied: {e}");
        }
        Ok(())
    }

    fn grab(
        source: &mut dyn FrameSource,
        index: usize,
        grayscale: bool,
    ) -> Result<Frame, CalibrationError> {
        let img = source
            .read()
            .map_err(|source| CalibrationError::FrameReadFailed { index, source })?;
        Ok(if grayscale {
            Frame::Gray(to_gray(&img))
        } else {
            Frame::Color(img)
        })
    }

    /// Read `count` frames spaced by `interval`. Any failed read fails the
    /// whole capture.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, source)))]
    pub fn capture_frames(
        &mut self,
        source: &mut dyn FrameSource,
        count: usize,
        interval: Duration,
        grayscale: bool,
    ) -> Result<Vec<Frame>, CalibrationError> {
        self.state = CalibrationState::Capturing;
        let frames = Self::open(source).and_then(|()| {
            let mut frames = Vec::with_capacity(count);
            for index in 0..count {
                if index > 0 && !interval.is_zero() {
                    std::thread::sleep(interval);
                }
                frames.push(Self::grab(source, index, grayscale)?);
                log::debug!("captured calibration frame {}/{}", index + 1, count);
            }
            Ok(frames)
        });
        source.release();
        self.track(frames)
    }

    fn capture_prompted(
        &mut self,
        source: &mut dyn FrameSource,
        prompt: &mut dyn CapturePrompt,
        review: bool,
    ) -> Result<Vec<Frame>, CalibrationError> {
        self.state = CalibrationState::Capturing;
        let (count, interval, grayscale) = (
            self.params.frame_count,
            self.params.interval,
            self.params.grayscale,
        );
        let frames = Self::open(source).and_then(|()| {
            let mut frames = Vec::with_capacity(count);
            let mut attempts = 0;
            while frames.len() < count {
                prompt.before_capture(frames.len(), count);
                if !review && !frames.is_empty() && !interval.is_zero() {
                    std::thread::sleep(interval);
                }
                let frame = Self::grab(source, attempts, grayscale)?;
                attempts += 1;
                if !review {
                    frames.push(frame);
                    continue;
                }
                match prompt.review(frames.len(), &frame) {
                    CaptureDecision::Keep => frames.push(frame),
                    CaptureDecision::Retake => log::info!("frame {} retaken", frames.len()),
                    CaptureDecision::Abort => return Err(CalibrationError::Aborted),
                }
            }
            Ok(frames)
        });
        source.release();
        self.track(frames)
    }

    /// Scan `frames` for the board. A frame qualifies when its interpolated
    /// corner count exceeds [`Board::min_response`]; frames without markers
    /// are skipped.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, frames), fields(frames = frames.len())))]
    pub fn detect_board(
        &mut self,
        frames: &[Frame],
    ) -> Result<Vec<BoardObservation>, CalibrationError> {
        self.state = CalibrationState::Detecting;
        let min_response = self.board.min_response();
        let max_views = self.params.max_views.max(1);
        let mut views = Vec::new();

        for (i, frame) in frames.iter().enumerate() {
            let gray = frame.to_gray();
            let detection = self.detector.detect(&gray, self.board.dictionary());
            if detection.is_empty() {
                log::debug!("frame {i}: no markers");
                continue;
            }
            let corners = self
                .detector
                .interpolate_corners(&gray, &self.board, &detection);
            let response = corners.response();
            log::debug!(
                "frame {i}: {} markers, {response} corners (need > {min_response})",
                detection.len()
            );
            if response > min_response {
                views.push(BoardObservation {
                    corners,
                    image_size: frame.dimensions(),
                });
                if views.len() >= max_views {
                    break;
                }
            }
        }

        if views.is_empty() {
            return self.track(Err(CalibrationError::NoBoardDetected {
                frames: frames.len(),
            }));
        }
        Ok(views)
    }

    pub fn fit(
        &mut self,
        views: &[BoardObservation],
        image_size: (u32, u32),
    ) -> Result<CalibrationResult, CalibrationError> {
        self.state = CalibrationState::Fitting;
        let result = self.solver.calibrate(&self.board, views, image_size);
        let result = self.track(result)?;
        self.state = CalibrationState::Done;
        log::info!(
            "calibration done from {} view(s), fx={:.1} fy={:.1}",
            views.len(),
            result.camera_matrix[(0, 0)],
            result.camera_matrix[(1, 1)]
        );
        Ok(result)
    }

    fn finish(&mut self, frames: Vec<Frame>) -> Result<CalibrationResult, CalibrationError> {
        if let Some(dir) = self.params.save_frames_to.clone() {
            let saved = save_frames(&frames, &dir);
            self.track(saved)?;
        }
        let views = self.detect_board(&frames)?;
        let image_size = views[0].image_size;
        self.fit(&views, image_size)
    }

    pub fn run_automatic(
        &mut self,
        source: &mut dyn FrameSource,
    ) -> Result<CalibrationResult, CalibrationError> {
        let (count, interval, grayscale) = (
            self.params.frame_count,
            self.params.interval,
            self.params.grayscale,
        );
        let frames = self.capture_frames(source, count, interval, grayscale)?;
        self.finish(frames)
    }

    pub fn run_semi_automatic(
        &mut self,
        source: &mut dyn FrameSource,
        prompt: &mut dyn CapturePrompt,
    ) -> Result<CalibrationResult, CalibrationError> {
        let frames = self.capture_prompted(source, prompt, false)?;
        self.finish(frames)
    }

    pub fn run_manual(
        &mut self,
        source: &mut dyn FrameSource,
        prompt: &mut dyn CapturePrompt,
    ) -> Result<CalibrationResult, CalibrationError> {
        let frames = self.capture_prompted(source, prompt, true)?;
        self.finish(frames)
    }

    pub fn run(
        &mut self,
        mode: CalibrationMode,
        source: &mut dyn FrameSource,
        prompt: &mut dyn CapturePrompt,
    ) -> Result<CalibrationResult, CalibrationError> {
        log::info!("calibrating ({mode:?}) on a {}x{} board", self.board.cols(), self.board.rows());
        match mode {
            CalibrationMode::Automatic => self.run_automatic(source),
            CalibrationMode::SemiAutomatic => self.run_semi_automatic(source, prompt),
            CalibrationMode::Manual => self.run_manual(source, prompt),
        }
    }

    /// Run `mode` and persist the result to `path`.
    pub fn run_and_save(
        &mut self,
        mode: CalibrationMode,
        source: &mut dyn FrameSource,
        prompt: &mut dyn CapturePrompt,
        path: impl AsRef<Path>,
    ) -> Result<CalibrationResult, CalibrationError> {
        let result = self.run(mode, source, prompt)?;
        let saved = result.save(path);
        self.track(saved)?;
        Ok(result)
    }

    /// Load the calibration at `path`, or calibrate and save when it is
    /// missing or `recalibrate` is set.
    pub fn load_or_run(
        &mut self,
        path: impl AsRef<Path>,
        recalibrate: bool,
        mode: CalibrationMode,
        source: &mut dyn FrameSource,
        prompt: &mut dyn CapturePrompt,
    ) -> Result<CalibrationResult, CalibrationError> {
        let path = path.as_ref();
        if !recalibrate && path.exists() {
            log::info!("using calibration from {}", path.display());
            return CalibrationResult::load(path);
        }
        self.run_and_save(mode, source, prompt, path)
    }
}

/// Write frames as `img-00.png`, `img-01.png`, … into `dir`.
pub fn save_frames(frames: &[Frame], dir: &Path) -> Result<Vec<PathBuf>, CalibrationError> {
    std::fs::create_dir_all(dir).map_err(|e| CalibrationError::FrameWriteFailed {
        path: dir.to_path_buf(),
        source: fiducial_rig_core::CaptureError::Write(e.into()),
    })?;
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let path = dir.join(format!("img-{i:02}.png"));
            frame
                .save(&path)
                .map_err(|source| CalibrationError::FrameWriteFailed {
                    path: path.clone(),
                    source,
                })?;
            Ok(path)
        })
        .collect()
}
