mod strategies;

pub use strategies::*;

use crate::{ElevationRamp, Raster, RenderConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use worldview_core::cancel::CancelToken;
use worldview_core::geometry::Rect;
use worldview_core::glam::IVec2;
use worldview_core::SmallKeyHashSet;
use worldview_map::{ChunkPos, DataTileCache, DbError, FeatureId, WorldUnits, CHUNK_EDGE};

/// The closed set of layers a tile can show.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum LayerKind {
    /// Grayscale surface height, one sample per stride.
    Elevation,
    /// One color per classification, one sample per stride.
    Classification,
    /// One pixel per chunk, highlighted where the chunk is special.
    SpecialChunks,
    /// One pixel per chunk that has features, plus markers drawn over the composed map.
    Features,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Elevation,
        LayerKind::Classification,
        LayerKind::SpecialChunks,
        LayerKind::Features,
    ];

    /// Whether the layer is regenerated at every refinement step. Layers that don't keep their first raster.
    pub fn uses_lod(self) -> bool {
        matches!(self, LayerKind::Elevation | LayerKind::Classification)
    }

    /// Whether the layer draws anything in the decoration pass.
    pub fn has_decoration(self) -> bool {
        matches!(self, LayerKind::Features)
    }

    pub fn strategy(self) -> &'static dyn GenerationStrategy {
        match self {
            LayerKind::Elevation => &ElevationStrategy,
            LayerKind::Classification => &ClassificationStrategy,
            LayerKind::SpecialChunks => &SpecialChunkStrategy,
            LayerKind::Features => &FeatureStrategy,
        }
    }

    /// Stable tag used in disk keys.
    pub fn tag(self) -> u8 {
        match self {
            LayerKind::Elevation => 0,
            LayerKind::Classification => 1,
            LayerKind::SpecialChunks => 2,
            LayerKind::Features => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

#[derive(Debug, Error)]
pub enum TileError {
    #[error("stride {stride} does not evenly divide a {size}-block footprint")]
    InvalidResolution { size: i32, stride: u32 },
    #[error("generation was cancelled")]
    Cancelled,
    #[error("generation panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A feature to draw at a world position during the decoration pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FeatureMarker {
    pub world: WorldUnits<IVec2>,
    pub feature: FeatureId,
}

/// One generated layer of one tile: the raster plus what the renderer needs to know about it.
#[derive(Clone, Debug)]
pub struct TileLayer {
    pub(crate) kind: LayerKind,
    pub(crate) raster: Raster,
    pub(crate) footprint: WorldUnits<Rect>,
    pub(crate) sample_resolution: u32,
    pub(crate) complete: bool,
    pub(crate) markers: Vec<FeatureMarker>,
}

impl TileLayer {
    /// Samples `cache` across `footprint` and rasterizes the result. Every chunk touched is added to `sampled_out`.
    pub fn make(
        kind: LayerKind,
        cache: &DataTileCache,
        footprint: WorldUnits<Rect>,
        stride: u32,
        config: &RenderConfig,
        sampled_out: &mut SmallKeyHashSet<ChunkPos>,
        cancel: &CancelToken,
    ) -> Result<Self, TileError> {
        let WorldUnits(rect) = footprint;
        let size = rect.shape.x;
        let step = if kind.uses_lod() { stride as i32 } else { CHUNK_EDGE };
        if stride == 0 || rect.shape.x != rect.shape.y || step <= 0 || size % step != 0 || size < step {
            return Err(TileError::InvalidResolution { size, stride });
        }

        let mut ctx = GenerationContext {
            cache,
            footprint: rect,
            step,
            elevation: config.elevation,
            sampled_out,
            cancel,
        };
        let Generated { raster, markers } = kind.strategy().generate(&mut ctx)?;

        Ok(Self {
            kind,
            raster,
            footprint,
            sample_resolution: stride,
            complete: true,
            markers,
        })
    }

    /// Rebuilds a layer from stored parts, e.g. a raster read back from disk.
    pub fn from_parts(
        kind: LayerKind,
        raster: Raster,
        footprint: WorldUnits<Rect>,
        sample_resolution: u32,
        complete: bool,
        markers: Vec<FeatureMarker>,
    ) -> Self {
        Self {
            kind,
            raster,
            footprint,
            sample_resolution,
            complete,
            markers,
        }
    }

    #[inline]
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    #[inline]
    pub fn uses_lod(&self) -> bool {
        self.kind.uses_lod()
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn footprint(&self) -> WorldUnits<Rect> {
        self.footprint
    }

    pub fn sample_resolution(&self) -> u32 {
        self.sample_resolution
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn markers(&self) -> &[FeatureMarker] {
        &self.markers
    }
}

/// Everything a [`GenerationStrategy`] reads while filling a raster.
pub struct GenerationContext<'a> {
    pub cache: &'a DataTileCache,
    pub footprint: Rect,
    /// World blocks between samples.
    pub step: i32,
    pub elevation: ElevationRamp,
    pub sampled_out: &'a mut SmallKeyHashSet<ChunkPos>,
    pub cancel: &'a CancelToken,
}

impl GenerationContext<'_> {
    /// Edge length of the output raster in pixels.
    pub fn pixels_per_edge(&self) -> u32 {
        (self.footprint.shape.x / self.step) as u32
    }

    /// World column sampled for pixel `(px, pz)`.
    pub fn sample_column(&self, px: u32, pz: u32) -> IVec2 {
        self.footprint.minimum + IVec2::new(px as i32, pz as i32) * self.step
    }

    pub fn check_cancelled(&self) -> Result<(), TileError> {
        if self.cancel.is_cancelled() {
            Err(TileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct Generated {
    pub raster: Raster,
    pub markers: Vec<FeatureMarker>,
}

/// Fills one layer's raster from cache samples.
pub trait GenerationStrategy: Send + Sync {
    /// Implementations should call [`GenerationContext::check_cancelled`] once per raster row.
    fn generate(&self, ctx: &mut GenerationContext) -> Result<Generated, TileError>;
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
