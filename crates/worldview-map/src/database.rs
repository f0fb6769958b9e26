mod cell_tree;
mod codec;
mod raster_tree;

pub use cell_tree::CellTree;
pub use codec::*;
pub use raster_tree::{DiskTileStore, MarkerRecord, RasterKey, RasterRecord};

use crate::DbError;

/// # Map Database
///
/// The persistent side of a map. Every map gets its own pair of [`sled::Tree`]s inside a shared [`sled::Db`], named after
/// the map, so several maps can live in one database directory.
///
/// ### Cell Tree
///
/// Stores one [`DataTileRecord`](crate::DataTileRecord) per chunk, keyed by [`ChunkPos::into_sled_key`](crate::ChunkPos).
/// This is the backing store of the [`DataTileCache`](crate::DataTileCache).
///
/// ### Raster Tree
///
/// Stores finished layer rasters keyed by `(kind, tile position, tile size, stride)`, so a layer rendered once does not need
/// to be sampled again in a later session.
///
/// Both trees hold LZ4-compressed rkyv archives. Tree handles are cheap to clone, which is how writes get moved onto IO
/// threads.
#[derive(Clone)]
pub struct MapDb {
    cells: CellTree,
    rasters: DiskTileStore,
}

impl MapDb {
    /// Opens (or creates) the trees for `map_name`.
    pub fn open(db: &sled::Db, map_name: &str) -> Result<Self, DbError> {
        let cells = CellTree::open(db, map_name)?;
        let rasters = DiskTileStore::open(db, map_name)?;
        log::debug!(
            "Opened map {} with {} cells and {} rasters on disk",
            map_name,
            cells.len(),
            rasters.len()
        );
        Ok(Self { cells, rasters })
    }

    pub fn cells(&self) -> &CellTree {
        &self.cells
    }

    pub fn rasters(&self) -> &DiskTileStore {
        &self.rasters
    }

    /// Blocks until everything written so far is durable.
    pub fn flush(&self) -> Result<(), DbError> {
        self.cells.flush()?;
        self.rasters.flush()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
