//! Camera-based fiducial tracking rig.
//!
//! A camera watches a projection surface framed by four ArUco corner
//! markers (ids `0..=3`). Everything else the camera sees is tracked and
//! drawn back onto the surface:
//!
//! - [`Tracker`] runs the capture loop on its own thread and fans every
//!   detection out to bounded [`Subscription`]s, raw or as [`MarkerBorders`].
//! - [`Transformer`] periodically turns the corner markers into a
//!   perspective-correcting homography, published as a [`TransformState`]
//!   snapshot.
//! - [`Renderer`] keeps a [`RenderLayerStack`] of nodes following the
//!   markers, warps it with the latest snapshot and presents it on a
//!   [`Display`].
//! - [`calib`] holds the ChArUco calibration engine whose result feeds the
//!   tracker and transformer.
//! - [`Rig`] builds all of the above from one [`RigConfig`] and runs them.
//!
//! The vision backend ([`MarkerDetector`]) and the camera ([`FrameSource`])
//! are traits so any implementation can be plugged in.
//!
//! ## API map
//! - `fiducial_rig::core`: homographies, camera model, frame sources, logging.
//! - `fiducial_rig::aruco`: dictionaries, boards, detections and marker geometry.
//! - `fiducial_rig::calib`: calibration engine and calibration files.
//! - `fiducial_rig::render`: layers, render objects and the render loops.

pub use fiducial_rig_aruco as aruco;
pub use fiducial_rig_calib as calib;
pub use fiducial_rig_core as core;

mod config;
pub mod render;
mod rig;
mod subscription;
mod tracker;
mod transform;

pub use config::{
    ArucoConfig, CalibrationConfig, CaptureConfig, ConfigError, RendererConfig, RigConfig,
    TrackerConfig,
};
pub use render::{
    DebugRenderer, Display, Key, LayerError, Node, RenderError, RenderLayer, RenderLayerStack,
    RenderObject, Renderer, RendererSettings, StaticImage,
};
pub use rig::{Rig, RigError};
pub use subscription::{Subscription, SubscriptionId};
pub use tracker::{Tracker, TrackerError, TrackerSettings};
pub use transform::{
    axis_template, compute_homography, corner_transform, marker_axis, reference_scaling,
    transform_from_detection, TransformError, TransformHandle, TransformState, Transformer,
    CORNER_MARKER_IDS, CORNER_VERTICES,
};

pub use fiducial_rig_aruco::{
    make_board, Board, Dictionary, MarkerBorders, MarkerDetector, MarkerPose, RawDetection,
};
pub use fiducial_rig_calib::{CalibrationEngine, CalibrationMode, CalibrationResult};
pub use fiducial_rig_core::{CameraModel, FrameSource};
