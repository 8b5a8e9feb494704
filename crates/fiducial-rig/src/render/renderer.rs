//! The projection render loop.
//!
//! Before the loop proper, the renderer shows a white reference frame with
//! the four corner markers until the tracker sees all of them; their spread
//! fixes the camera-to-output scaling used to place nodes.

use super::draw::WHITE;
use super::layer::{LayerError, RenderLayerStack};
use super::object::{Node, StaticImage};
use crate::subscription::Subscription;
use crate::tracker::Tracker;
use crate::transform::{reference_scaling, TransformHandle, CORNER_MARKER_IDS};
use fiducial_rig_aruco::MarkerBorders;
use fiducial_rig_core::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error("display failed: {0}")]
    Display(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Quit,
    ToggleFullscreen,
    Other(char),
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        match c {
            'q' => Key::Quit,
            'f' => Key::ToggleFullscreen,
            other => Key::Other(other),
        }
    }
}

/// Window the render loop presents into.
pub trait Display {
    fn present(&mut self, frame: &RgbImage) -> Result<(), RenderError>;

    /// Wait up to `timeout` for a key press.
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;

    fn set_fullscreen(&mut self, _fullscreen: bool) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct RendererSettings {
    pub width: u32,
    pub height: u32,
    /// Key poll timeout per frame.
    pub delay: Duration,
    /// Holds `marker-00.png` .. `marker-03.png`.
    pub marker_dir: PathBuf,
    pub marker_scale: f32,
    pub margin: i32,
    /// Show the reference frame and measure scaling before rendering nodes.
    pub reference_phase: bool,
    /// Capacity of the marker subscription; the loop only keeps the newest.
    pub queue_capacity: usize,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            delay: Duration::from_millis(33),
            marker_dir: PathBuf::from("markers"),
            marker_scale: 0.5,
            margin: 10,
            reference_phase: true,
            queue_capacity: 1,
        }
    }
}

/// Corner marker images `0..=3`; unreadable files are logged and left out.
pub fn load_corner_markers(dir: &Path) -> [Option<RgbImage>; 4] {
    CORNER_MARKER_IDS.map(|id| {
        let path = dir.join(format!("marker-{id:02}.png"));
        match image::open(&path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                log::warn!("corner marker {} not loaded: {e}", path.display());
                None
            }
        }
    })
}

/// Top-left placement of corner marker `corner` (TL, TR, BR, BL) of size
/// `marker` inside a `frame`, `margin` pixels from the edges.
pub fn corner_origin(corner: usize, marker: (u32, u32), frame: (u32, u32), margin: i32) -> (i32, i32) {
    let right = frame.0 as i32 - marker.0 as i32 - margin;
    let bottom = frame.1 as i32 - marker.1 as i32 - margin;
    match corner {
        0 => (margin, margin),
        1 => (right, margin),
        2 => (right, bottom),
        _ => (margin, bottom),
    }
}

pub struct Renderer {
    tracker: Arc<Tracker>,
    markers: Subscription<Vec<MarkerBorders>>,
    transform: TransformHandle,
    stack: RenderLayerStack,
    settings: RendererSettings,
    scaling: (f64, f64),
    fullscreen: bool,
}

impl Renderer {
    pub const DEFAULT_LAYER: i32 = 0;
    pub const CORNER_LAYER: i32 = 10;

    /// Set up the layers and corner markers, then subscribe to `tracker`.
    pub fn new(
        tracker: Arc<Tracker>,
        transform: TransformHandle,
        settings: RendererSettings,
    ) -> Result<Self, RenderError> {
        let corners = load_corner_markers(&settings.marker_dir);
        Self::with_corner_markers(tracker, transform, settings, corners)
    }

    pub fn with_corner_markers(
        tracker: Arc<Tracker>,
        transform: TransformHandle,
        settings: RendererSettings,
        corners: [Option<RgbImage>; 4],
    ) -> Result<Self, RenderError> {
        let mut stack = RenderLayerStack::new();
        stack.add_layer(Self::CORNER_LAYER, "corner-markers", false)?;
        stack.add_layer(Self::DEFAULT_LAYER, "default", true)?;

        for (corner, image) in corners.iter().enumerate() {
            let Some(image) = image else { continue };
            let mut marker = StaticImage::new(0, 0, image, settings.marker_scale);
            (marker.x, marker.y) = corner_origin(
                corner,
                marker.image().dimensions(),
                (settings.width, settings.height),
                settings.margin,
            );
            stack.add_object(Self::CORNER_LAYER, marker)?;
        }

        let markers = tracker.subscribe(settings.queue_capacity);
        Ok(Self {
            tracker,
            markers,
            transform,
            stack,
            settings,
            scaling: (1.0, 1.0),
            fullscreen: false,
        })
    }

    pub fn stack(&self) -> &RenderLayerStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut RenderLayerStack {
        &mut self.stack
    }

    pub fn scaling(&self) -> (f64, f64) {
        self.scaling
    }

    pub fn set_scaling(&mut self, scaling: (f64, f64)) {
        self.scaling = scaling;
    }

    /// Move or create one node per tracked marker. Corner markers are skipped.
    pub fn update_markers(&mut self, batch: &[MarkerBorders]) -> Result<(), LayerError> {
        for marker in batch {
            if CORNER_MARKER_IDS.contains(&marker.id) {
                continue;
            }
            let x = (f64::from(marker.center.x) * self.scaling.0) as i32;
            let y = (f64::from(marker.center.y) * self.scaling.1) as i32;
            let index = marker.id as usize;
            match self.stack.object_mut(Self::DEFAULT_LAYER, index) {
                Ok(node) => node.update(x, y),
                Err(LayerError::NotFound { .. }) => {
                    self.stack
                        .add_object_at(Self::DEFAULT_LAYER, index, Node::new(x, y))?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn blank(&self) -> RgbImage {
        RgbImage::from_pixel(self.settings.width, self.settings.height, WHITE)
    }

    /// White frame with the corner markers, unwarped.
    pub fn reference_frame(&self) -> RgbImage {
        let mut frame = self.blank();
        self.stack
            .render_frame(&mut frame, None, self.settings.width, self.settings.height);
        frame
    }

    /// Take the newest marker batch, if any, and render one frame.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn step(&mut self) -> Result<RgbImage, RenderError> {
        if let Some(batch) = self.markers.latest() {
            self.update_markers(&batch)?;
        }
        let mut frame = self.blank();
        let transform = self.transform.load();
        self.stack.render_frame(
            &mut frame,
            transform.as_deref().map(|t| &t.homography),
            self.settings.width,
            self.settings.height,
        );
        Ok(frame)
    }

    /// `false` once the operator asked to quit.
    fn handle_key(&mut self, display: &mut dyn Display) -> bool {
        match display.poll_key(self.settings.delay) {
            Some(Key::Quit) => false,
            Some(Key::ToggleFullscreen) => {
                self.fullscreen = !self.fullscreen;
                display.set_fullscreen(self.fullscreen);
                true
            }
            Some(Key::Other(_)) | None => true,
        }
    }

    /// Show the reference frame until all corner markers are seen. Returns
    /// `false` if the operator quit first.
    fn measure_scaling(&mut self, display: &mut dyn Display) -> Result<bool, RenderError> {
        let reference = self.reference_frame();
        loop {
            display.present(&reference)?;
            if let Some(batch) = self.markers.latest() {
                if let Some(scaling) =
                    reference_scaling(&batch, self.settings.width, self.settings.height)
                {
                    log::info!("reference scaling {:.3} x {:.3}", scaling.0, scaling.1);
                    self.scaling = scaling;
                    return Ok(true);
                }
            }
            if !self.handle_key(display) {
                return Ok(false);
            }
        }
    }

    /// Run until the operator quits.
    pub fn run(&mut self, display: &mut dyn Display) -> Result<(), RenderError> {
        if self.settings.reference_phase && !self.measure_scaling(display)? {
            return Ok(());
        }
        loop {
            let frame = self.step()?;
            display.present(&frame)?;
            if !self.handle_key(display) {
                break;
            }
        }
        log::info!("renderer closed");
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.tracker.unsubscribe(self.markers.id()) {
            log::debug!("renderer subscription already gone: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_from_characters() {
        assert_eq!(Key::from('q'), Key::Quit);
        assert_eq!(Key::from('f'), Key::ToggleFullscreen);
        assert_eq!(Key::from('x'), Key::Other('x'));
    }

    #[test]
    fn corner_origins_keep_the_margin() {
        let frame = (1280, 720);
        let marker = (50, 40);
        assert_eq!(corner_origin(0, marker, frame, 10), (10, 10));
        assert_eq!(corner_origin(1, marker, frame, 10), (1220, 10));
        assert_eq!(corner_origin(2, marker, frame, 10), (1220, 670));
        assert_eq!(corner_origin(3, marker, frame, 10), (10, 670));
    }

    #[test]
    fn missing_marker_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        RgbImage::new(8, 8)
            .save(dir.path().join("marker-02.png"))
            .expect("save");
        let loaded = load_corner_markers(dir.path());
        assert!(loaded[0].is_none());
        assert_eq!(loaded[2].as_ref().map(|m| m.dimensions()), Some((8, 8)));
    }
}
