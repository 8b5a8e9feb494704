//! The seam between the rig and whatever produces camera frames.

use image::{GrayImage, RgbImage};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("failed to open frame source: {0}")]
    Open(String),
    #[error("frame read failed")]
    ReadFailed,
    #[error("failed to write frame: {0}")]
    Write(#[from] image::ImageError),
}

/// Requested camera controls. Sources apply what their hardware supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    pub autofocus: bool,
    pub auto_white_balance: bool,
    pub resolution: Option<(u32, u32)>,
}

impl CaptureSettings {
    /// Autofocus and auto white balance off, native resolution.
    pub fn fixed_optics() -> Self {
        Self {
            autofocus: false,
            auto_white_balance: false,
            resolution: None,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::fixed_optics()
    }
}

/// A captured image, kept in color or reduced to luma at capture time.
#[derive(Clone, Debug)]
pub enum Frame {
    Color(RgbImage),
    Gray(GrayImage),
}

impl Frame {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Frame::Color(img) => img.dimensions(),
            Frame::Gray(img) => img.dimensions(),
        }
    }

    pub fn to_gray(&self) -> GrayImage {
        match self {
            Frame::Color(img) => crate::to_gray(img),
            Frame::Gray(img) => img.clone(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        match self {
            Frame::Color(img) => img.save(path)?,
            Frame::Gray(img) => img.save(path)?,
        }
        Ok(())
    }
}

/// Pull-based camera.
///
/// `read` either yields a full color frame or fails; a failed read leaves the
/// source usable for the next attempt.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CaptureError>;

    fn apply_settings(&mut self, _settings: &CaptureSettings) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Actual frame size once opened.
    fn frame_size(&self) -> (u32, u32);

    fn read(&mut self) -> Result<RgbImage, CaptureError>;

    fn release(&mut self) {}
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn open(&mut self) -> Result<(), CaptureError> {
        (**self).open()
    }

    fn apply_settings(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        (**self).apply_settings(settings)
    }

    fn frame_size(&self) -> (u32, u32) {
        (**self).frame_size()
    }

    fn read(&mut self) -> Result<RgbImage, CaptureError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_frame_keeps_size() {
        let frame = Frame::Color(RgbImage::from_pixel(5, 4, Rgb([200, 100, 50])));
        assert_eq!(frame.to_gray().dimensions(), (5, 4));
        assert_eq!(Frame::Gray(frame.to_gray()).dimensions(), (5, 4));
    }

    #[test]
    fn default_settings_disable_auto_controls() {
        let s = CaptureSettings::default();
        assert!(!s.autofocus && !s.auto_white_balance);
    }
}
