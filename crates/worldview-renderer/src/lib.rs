//! Turns cached map samples into rasters and hands them to a [`TileCanvas`].
//!
//! A [`TileLayer`] is one image of one tile, produced by the [`GenerationStrategy`] of its [`LayerKind`]. The
//! [`DiskLayerLoader`] puts the raster store in front of generation. [`ScreenLayer`] pairs a layer with its uploaded
//! texture, and [`CompositeLayer`] merges a grid of them into one.

mod canvas;
mod composite;
mod config;
mod disk;
mod layer;
mod raster;
mod screen_layer;

pub use canvas::*;
pub use composite::*;
pub use config::*;
pub use disk::*;
pub use layer::*;
pub use raster::*;
pub use screen_layer::*;
