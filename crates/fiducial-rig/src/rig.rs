//! One configured rig: calibration, tracker, transformer and render loop.

use crate::config::{ConfigError, RigConfig};
use crate::render::{DebugRenderer, Display, RenderError, Renderer};
use crate::tracker::{Tracker, TrackerError};
use crate::transform::{TransformError, Transformer};
use fiducial_rig_aruco::MarkerDetector;
use fiducial_rig_calib::{CalibrationEngine, CalibrationError, CapturePrompt};
use fiducial_rig_core::{CameraModel, FrameSource};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum RigError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

pub struct Rig {
    config: RigConfig,
    tracker: Arc<Tracker>,
    camera: CameraModel,
}

impl Rig {
    /// Validate `config`, open the camera `capture.camera_id` through
    /// `open_camera`, then load the stored calibration or calibrate in the
    /// configured mode.
    pub fn new<S, F>(
        config: RigConfig,
        detector: Arc<dyn MarkerDetector>,
        open_camera: F,
        recalibrate: bool,
        prompt: &mut dyn CapturePrompt,
    ) -> Result<Self, RigError>
    where
        S: FrameSource + 'static,
        F: FnOnce(u32) -> S,
    {
        config.validate()?;
        let mut source = open_camera(config.capture.camera_id);

        let mut engine = CalibrationEngine::new(
            config.calibration_board()?,
            Arc::clone(&detector),
            config.calibration_params(),
        );
        let calibration = engine.load_or_run(
            config.calibration_path(),
            recalibrate,
            config.capture.calibration.mode,
            &mut source,
            prompt,
        )?;
        let camera = calibration.camera();

        let tracker = Tracker::new(
            source,
            detector,
            config.tracker_board()?,
            config.tracker_settings(),
        )
        .with_camera(camera);
        Ok(Self {
            config,
            tracker: Arc::new(tracker),
            camera,
        })
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Track and render until the operator quits.
    ///
    /// With `capture.tracker.debug` set, the display shows camera frames with
    /// detection overlays; otherwise the perspective-corrected projection.
    pub fn run(&self, display: &mut dyn Display) -> Result<(), RigError> {
        self.tracker.start()?;
        let rendered = if self.config.capture.tracker.debug {
            self.run_debug(display)
        } else {
            self.run_projection(display)
        };
        let tracked = self.tracker.stop();
        rendered?;
        tracked?;
        Ok(())
    }

    fn run_debug(&self, display: &mut dyn Display) -> Result<(), RigError> {
        let settings = self.config.renderer_settings();
        let mut renderer = DebugRenderer::new(Arc::clone(&self.tracker), true, &settings);
        renderer.run(display)?;
        Ok(())
    }

    fn run_projection(&self, display: &mut dyn Display) -> Result<(), RigError> {
        let mut transformer = Transformer::new(
            Arc::clone(&self.tracker),
            self.camera,
            self.config.transform_interval(),
        );
        transformer.start()?;
        let mut renderer = Renderer::new(
            Arc::clone(&self.tracker),
            transformer.handle(),
            self.config.renderer_settings(),
        )?;
        let rendered = renderer.run(display);
        drop(renderer);
        transformer.stop();
        rendered?;
        Ok(())
    }
}
