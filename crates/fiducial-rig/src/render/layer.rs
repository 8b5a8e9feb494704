use super::object::RenderObject;
use fiducial_rig_core::{warp_perspective_rgb, Homography, RgbImage};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("layer {index} already exists ({name})")]
    DuplicateLayerIndex { index: i32, name: String },
    #[error("no layer {0}")]
    UnknownLayer(i32),
    #[error("object {index} already exists on layer {layer}")]
    DuplicateObjectIndex { layer: i32, index: usize },
    #[error("no object {index} on layer {layer}")]
    NotFound { layer: i32, index: usize },
}

/// Sparse, ordered set of objects drawn together.
#[derive(Clone, Debug)]
pub struct RenderLayer {
    index: i32,
    name: String,
    should_warp: bool,
    objects: BTreeMap<usize, RenderObject>,
}

impl RenderLayer {
    pub fn new(index: i32, name: impl Into<String>, should_warp: bool) -> Self {
        Self {
            index,
            name: name.into(),
            should_warp,
            objects: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn should_warp(&self) -> bool {
        self.should_warp
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Insert at the first free index not below the current object count.
    pub fn add(&mut self, object: RenderObject) -> usize {
        let mut index = self.objects.len();
        while self.objects.contains_key(&index) {
            index += 1;
        }
        self.objects.insert(index, object);
        index
    }

    pub fn add_at(&mut self, index: usize, object: RenderObject) -> Result<(), LayerError> {
        if self.objects.contains_key(&index) {
            return Err(LayerError::DuplicateObjectIndex {
                layer: self.index,
                index,
            });
        }
        self.objects.insert(index, object);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&RenderObject> {
        self.objects.get(&index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RenderObject> {
        self.objects.get_mut(&index)
    }

    pub fn remove(&mut self, index: usize) -> Option<RenderObject> {
        self.objects.remove(&index)
    }

    pub fn render(&self, frame: &mut RgbImage) {
        for object in self.objects.values() {
            object.render(frame);
        }
    }
}

/// Layers keyed by index; higher indices draw later.
#[derive(Clone, Debug, Default)]
pub struct RenderLayerStack {
    layers: BTreeMap<i32, RenderLayer>,
}

impl RenderLayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(
        &mut self,
        index: i32,
        name: impl Into<String>,
        should_warp: bool,
    ) -> Result<(), LayerError> {
        if let Some(existing) = self.layers.get(&index) {
            return Err(LayerError::DuplicateLayerIndex {
                index,
                name: existing.name.clone(),
            });
        }
        self.layers
            .insert(index, RenderLayer::new(index, name, should_warp));
        Ok(())
    }

    pub fn layer(&self, index: i32) -> Option<&RenderLayer> {
        self.layers.get(&index)
    }

    pub fn layers(&self) -> impl Iterator<Item = &RenderLayer> {
        self.layers.values()
    }

    fn layer_mut(&mut self, index: i32) -> Result<&mut RenderLayer, LayerError> {
        self.layers
            .get_mut(&index)
            .ok_or(LayerError::UnknownLayer(index))
    }

    /// Add `object` to `layer` and return the index it was stored under.
    pub fn add_object(
        &mut self,
        layer: i32,
        object: impl Into<RenderObject>,
    ) -> Result<usize, LayerError> {
        Ok(self.layer_mut(layer)?.add(object.into()))
    }

    pub fn add_object_at(
        &mut self,
        layer: i32,
        index: usize,
        object: impl Into<RenderObject>,
    ) -> Result<(), LayerError> {
        self.layer_mut(layer)?.add_at(index, object.into())
    }

    pub fn object(&self, layer: i32, index: usize) -> Result<&RenderObject, LayerError> {
        self.layers
            .get(&layer)
            .ok_or(LayerError::UnknownLayer(layer))?
            .get(index)
            .ok_or(LayerError::NotFound { layer, index })
    }

    pub fn object_mut(&mut self, layer: i32, index: usize) -> Result<&mut RenderObject, LayerError> {
        self.layer_mut(layer)?
            .get_mut(index)
            .ok_or(LayerError::NotFound { layer, index })
    }

    /// Draw warped layers, warp the result to `width x height` when a
    /// homography is given, then draw the unwarped layers on top.
    pub fn render_frame(
        &self,
        frame: &mut RgbImage,
        homography: Option<&Homography>,
        width: u32,
        height: u32,
    ) {
        for layer in self.layers.values().filter(|l| l.should_warp) {
            layer.render(frame);
        }

        if let Some(h) = homography {
            match warp_perspective_rgb(frame, h, width, height) {
                Some(warped) => *frame = warped,
                None => log::debug!("singular homography, frame left unwarped"),
            }
        }

        for layer in self.layers.values().filter(|l| !l.should_warp) {
            layer.render(frame);
        }
    }
}
