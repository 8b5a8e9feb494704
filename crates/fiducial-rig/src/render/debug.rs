use super::draw::{draw_polygon, fill_circle, GREEN, RED};
use super::renderer::{Display, Key, RenderError, RendererSettings};
use crate::subscription::Subscription;
use crate::tracker::Tracker;
use fiducial_rig_aruco::MarkerBorders;
use fiducial_rig_core::RgbImage;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;

/// Green outline, plus red dots on the top-left corner and the center.
pub fn draw_marker_overlay(frame: &mut RgbImage, marker: &MarkerBorders) {
    let corners = marker.corners.map(|p| (p.x, p.y));
    draw_polygon(frame, &corners, 2, GREEN);
    fill_circle(frame, corners[0], 4, RED);
    fill_circle(frame, (marker.center.x, marker.center.y), 4, RED);
}

/// Tracker frames with detection overlays, for checking the camera setup.
pub struct DebugRenderer {
    tracker: Arc<Tracker>,
    markers: Subscription<Vec<MarkerBorders>>,
    use_color: bool,
    delay: Duration,
    last: Vec<MarkerBorders>,
    fullscreen: bool,
}

impl DebugRenderer {
    pub fn new(tracker: Arc<Tracker>, use_color: bool, settings: &RendererSettings) -> Self {
        let markers = tracker.subscribe(settings.queue_capacity);
        Self {
            tracker,
            markers,
            use_color,
            delay: settings.delay,
            last: Vec::new(),
            fullscreen: false,
        }
    }

    fn frame(&self) -> Option<RgbImage> {
        if self.use_color {
            self.tracker.color_frame().map(|f| f.as_ref().clone())
        } else {
            self.tracker
                .frame()
                .map(|f| DynamicImage::ImageLuma8(f.as_ref().clone()).to_rgb8())
        }
    }

    /// Latest tracker frame with the newest known markers drawn on it.
    pub fn step(&mut self) -> Option<RgbImage> {
        let mut frame = self.frame()?;
        if let Some(batch) = self.markers.latest() {
            self.last = batch;
        }
        for marker in &self.last {
            draw_marker_overlay(&mut frame, marker);
        }
        Some(frame)
    }

    pub fn run(&mut self, display: &mut dyn Display) -> Result<(), RenderError> {
        loop {
            if let Some(frame) = self.step() {
                display.present(&frame)?;
            }
            match display.poll_key(self.delay) {
                Some(Key::Quit) => break,
                Some(Key::ToggleFullscreen) => {
                    self.fullscreen = !self.fullscreen;
                    display.set_fullscreen(self.fullscreen);
                }
                Some(Key::Other(_)) | None => {}
            }
        }
        Ok(())
    }
}

impl Drop for DebugRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.tracker.unsubscribe(self.markers.id()) {
            log::debug!("debug renderer subscription already gone: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducial_rig_core::Rgb;
    use nalgebra::Point2;

    #[test]
    fn overlay_marks_outline_and_dots() {
        let marker = MarkerBorders {
            id: 4,
            center: Point2::new(20, 20),
            angle: 0.0,
            corners: [
                Point2::new(10, 10),
                Point2::new(30, 10),
                Point2::new(30, 30),
                Point2::new(10, 30),
            ],
        };
        let mut frame = RgbImage::new(40, 40);
        draw_marker_overlay(&mut frame, &marker);
        assert_eq!(*frame.get_pixel(20, 30), GREEN);
        assert_eq!(*frame.get_pixel(10, 10), RED);
        assert_eq!(*frame.get_pixel(22, 20), RED);
        assert_eq!(*frame.get_pixel(20, 25), Rgb([0, 0, 0]));
    }
}
