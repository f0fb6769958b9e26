use super::{FeatureMarker, GenerationContext, GenerationStrategy, Generated, TileError};
use crate::raster::{rgba, Raster, TRANSPARENT};

use worldview_core::glam::IVec2;
use worldview_map::{ChunkPos, ChunkUnits, MetricKind, WorldUnits, CHUNK_EDGE};

pub struct ElevationStrategy;

impl GenerationStrategy for ElevationStrategy {
    fn generate(&self, ctx: &mut GenerationContext) -> Result<Generated, TileError> {
        let ramp = ctx.elevation;
        let raster = sample_columns(ctx, |cache, x, z| {
            let shade = ramp.shade(cache.get_metric(MetricKind::Surface, x, z));
            rgba(shade, shade, shade, 255)
        })?;
        Ok(Generated {
            raster,
            markers: Vec::new(),
        })
    }
}

/// Indexed by class id, wrapping around.
pub const CLASS_PALETTE: [u32; 12] = [
    rgba(0x00, 0x00, 0x70, 0xff),
    rgba(0x8d, 0xb3, 0x60, 0xff),
    rgba(0x05, 0x66, 0x21, 0xff),
    rgba(0xfa, 0x94, 0x18, 0xff),
    rgba(0x0b, 0x66, 0x59, 0xff),
    rgba(0xff, 0xff, 0xff, 0xff),
    rgba(0x60, 0x60, 0x60, 0xff),
    rgba(0xd9, 0x45, 0x15, 0xff),
    rgba(0x07, 0xf9, 0xb2, 0xff),
    rgba(0xbd, 0xb2, 0x5f, 0xff),
    rgba(0x53, 0x7b, 0x09, 0xff),
    rgba(0xfa, 0xde, 0x55, 0xff),
];

pub fn class_color(class: u32) -> u32 {
    CLASS_PALETTE[class as usize % CLASS_PALETTE.len()]
}

pub struct ClassificationStrategy;

impl GenerationStrategy for ClassificationStrategy {
    fn generate(&self, ctx: &mut GenerationContext) -> Result<Generated, TileError> {
        let raster = sample_columns(ctx, |cache, x, z| class_color(cache.get_classification(x, z)))?;
        Ok(Generated {
            raster,
            markers: Vec::new(),
        })
    }
}

pub const SPECIAL_CHUNK_COLOR: u32 = rgba(0xff, 0x28, 0x28, 0xa0);

pub struct SpecialChunkStrategy;

impl GenerationStrategy for SpecialChunkStrategy {
    fn generate(&self, ctx: &mut GenerationContext) -> Result<Generated, TileError> {
        let raster = sample_chunks(ctx, |cache, chunk| {
            if cache.is_special_chunk(chunk) {
                SPECIAL_CHUNK_COLOR
            } else {
                TRANSPARENT
            }
        })?;
        Ok(Generated {
            raster,
            markers: Vec::new(),
        })
    }
}

pub const FEATURE_CHUNK_COLOR: u32 = rgba(0xff, 0xff, 0x00, 0xc8);

pub struct FeatureStrategy;

impl GenerationStrategy for FeatureStrategy {
    fn generate(&self, ctx: &mut GenerationContext) -> Result<Generated, TileError> {
        let mut markers = Vec::new();
        let raster = sample_chunks(ctx, |cache, chunk| {
            let features = cache.get_features(chunk);
            if features.is_empty() {
                return TRANSPARENT;
            }
            let WorldUnits(min) = chunk.min_world();
            let center = min + IVec2::splat(CHUNK_EDGE / 2);
            markers.extend(features.into_iter().map(|feature| FeatureMarker {
                world: WorldUnits(center),
                feature,
            }));
            FEATURE_CHUNK_COLOR
        })?;
        Ok(Generated { raster, markers })
    }
}

/// One pixel per `ctx.step` columns, row by row, checking for cancellation between rows.
fn sample_columns(
    ctx: &mut GenerationContext,
    mut color: impl FnMut(&worldview_map::DataTileCache, i32, i32) -> u32,
) -> Result<Raster, TileError> {
    let edge = ctx.pixels_per_edge();
    let mut raster = Raster::new(edge, edge);
    for pz in 0..edge {
        ctx.check_cancelled()?;
        for px in 0..edge {
            let column = ctx.sample_column(px, pz);
            ctx.sampled_out.insert(ChunkPos::from_world(column.x, column.y));
            raster.set(px, pz, color(ctx.cache, column.x, column.y));
        }
    }
    Ok(raster)
}

/// One pixel per chunk in the footprint.
fn sample_chunks(
    ctx: &mut GenerationContext,
    mut color: impl FnMut(&worldview_map::DataTileCache, ChunkPos) -> u32,
) -> Result<Raster, TileError> {
    debug_assert_eq!(ctx.step, CHUNK_EDGE);
    let footprint = WorldUnits(ctx.footprint);
    let ChunkUnits(chunks) = ChunkPos::covering(footprint);
    let width = chunks.shape.x as u32;
    let mut raster = Raster::new(width, chunks.shape.y as u32);
    for (i, chunk) in ChunkPos::chunks_in(footprint).enumerate() {
        let (px, pz) = (i as u32 % width, i as u32 / width);
        if px == 0 {
            ctx.check_cancelled()?;
        }
        ctx.sampled_out.insert(chunk);
        raster.set(px, pz, color(ctx.cache, chunk));
    }
    Ok(raster)
}
