//! Layered drawing of the projected interface.

mod debug;
pub mod draw;
mod layer;
mod object;
mod renderer;

pub use debug::{draw_marker_overlay, DebugRenderer};
pub use layer::{LayerError, RenderLayer, RenderLayerStack};
pub use object::{Node, RenderObject, StaticImage};
pub use renderer::{
    corner_origin, load_corner_markers, Display, Key, RenderError, Renderer, RendererSettings,
};
