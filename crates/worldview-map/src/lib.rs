//! The worldview map data model.
//!
//! # Coordinates
//!
//! The world is an infinite XZ plane of columns. Columns are grouped into 16x16 chunks ([`ChunkPos`]), which are the unit of
//! caching and persistence. For display, the plane is cut into square tiles of a configurable edge length, addressed by a
//! packed [`TileKey`].
//!
//! # Cells
//!
//! Each chunk owns one [`DataTile`] holding the expensive samples taken from a [`WorldSource`]: three height metrics per
//! column, a quarter-resolution classification grid, and the chunk's features. Fields fill lazily the first time they are
//! read, and a filled field is never sampled again. The [`DataTileCache`] keeps loaded cells in memory and writes dirty ones
//! back to the [`MapDb`].
//!
//! # Rasters
//!
//! Finished layer images are cached separately in the [`DiskTileStore`], so a map that was viewed once opens without
//! sampling.

mod cache;
mod config;
mod coordinates;
mod data_tile;
mod database;
mod error;
mod procedural;
mod sampling;
mod units;

pub use cache::*;
pub use config::*;
pub use coordinates::*;
pub use data_tile::*;
pub use database::*;
pub use error::*;
pub use procedural::*;
pub use sampling::*;
pub use units::*;
