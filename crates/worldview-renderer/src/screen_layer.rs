use crate::{LayerKind, TextureId, TileLayer};

use std::sync::Arc;

/// A [`TileLayer`] as the screen sees it: shared layer data plus the texture it was uploaded to, if any.
///
/// The layer is shared with the tile that refines from this one when the layer does not use LOD, so several screen layers
/// may point at the same raster. The texture is owned by this screen layer alone.
#[derive(Debug)]
pub struct ScreenLayer {
    layer: Arc<TileLayer>,
    texture: Option<TextureId>,
}

impl ScreenLayer {
    pub fn new(layer: Arc<TileLayer>) -> Self {
        Self {
            layer,
            texture: None,
        }
    }

    pub fn layer(&self) -> &Arc<TileLayer> {
        &self.layer
    }

    pub fn kind(&self) -> LayerKind {
        self.layer.kind()
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: TextureId) {
        self.texture = Some(texture);
    }

    /// Gives up the display handle so it can be released on the owning thread.
    pub fn take_texture(&mut self) -> Option<TextureId> {
        self.texture.take()
    }

    /// Splits into the shared layer and the display handle.
    pub fn into_parts(self) -> (Arc<TileLayer>, Option<TextureId>) {
        (self.layer, self.texture)
    }
}
