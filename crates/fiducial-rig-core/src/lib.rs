//! Core types and utilities for the fiducial tracking rig.
//!
//! This crate holds the pieces every other crate in the workspace leans on:
//! plane homographies, a pinhole camera model with radial/tangential
//! distortion, the frame-source seam used to pull images from a camera, and
//! the process-wide logger.

mod camera;
mod capture;
mod homography;
mod image;
mod logger;

pub use camera::{
    pose_from_homography, pose_from_vectors, rotation_vector, CameraIntrinsics, CameraModel,
    Distortion, Pose,
};
pub use capture::{CaptureError, CaptureSettings, Frame, FrameSource};
pub use homography::{
    estimate_homography, homography_from_4pt, warp_perspective_rgb, Homography,
};
pub use image::{sample_bilinear_rgb, to_gray};

pub use ::image::{GrayImage, Luma, Rgb, RgbImage};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
