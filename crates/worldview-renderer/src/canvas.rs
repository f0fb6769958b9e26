use crate::{Raster, TileLayer};

use worldview_core::glam::DVec2;

/// A handle to a raster that has been uploaded to the display.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Where a tile lands on screen, in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPlacement {
    pub min: DVec2,
    pub size: DVec2,
}

/// The drawing surface.
///
/// All methods are only ever called from the thread that owns the scheduler, so implementations are free to hold
/// thread-bound graphics state.
pub trait TileCanvas {
    fn upload(&mut self, raster: &Raster) -> TextureId;

    fn release(&mut self, texture: TextureId);

    fn draw(&mut self, placement: ScreenPlacement, texture: TextureId, opacity: f32);

    /// Draws overlays for `layer` after every base layer has been composed.
    fn decorate(&mut self, placement: ScreenPlacement, layer: &TileLayer, opacity: f32);
}

/// A canvas that draws nothing and counts what it was asked to do.
#[derive(Debug, Default)]
pub struct CountingCanvas {
    next_texture: u64,
    pub live_textures: usize,
    pub uploads: usize,
    pub releases: usize,
    pub draws: usize,
    pub decorations: usize,
    pub markers: usize,
}

impl TileCanvas for CountingCanvas {
    fn upload(&mut self, _raster: &Raster) -> TextureId {
        self.next_texture += 1;
        self.uploads += 1;
        self.live_textures += 1;
        TextureId(self.next_texture)
    }

    fn release(&mut self, _texture: TextureId) {
        self.releases += 1;
        self.live_textures = self.live_textures.saturating_sub(1);
    }

    fn draw(&mut self, _placement: ScreenPlacement, _texture: TextureId, _opacity: f32) {
        self.draws += 1;
    }

    fn decorate(&mut self, _placement: ScreenPlacement, layer: &TileLayer, _opacity: f32) {
        self.decorations += 1;
        self.markers += layer.markers().len();
    }
}
