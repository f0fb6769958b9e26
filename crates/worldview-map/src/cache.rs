use crate::coordinates::ChunkPos;
use crate::data_tile::DataTile;
use crate::database::CellTree;
use crate::sampling::{ClassId, FeatureId, MetricKind, WorldSource};
use crate::DbError;

use bevy_tasks::{Task, TaskPool};
use futures_lite::future;
use parking_lot::Mutex;
use std::sync::Arc;
use worldview_core::SmallKeyHashMap;

/// The lazily-sampled, disk-backed store of per-chunk world data.
///
/// Chunks are loaded on first touch: from the [`CellTree`] if a record exists, otherwise as an empty [`DataTile`] that fills
/// itself from the [`WorldSource`] as fields are queried. Dirty chunks are written back on the IO pool when they are
/// unloaded or flushed.
pub struct DataTileCache {
    source: Arc<dyn WorldSource>,
    cells: CellTree,
    io_pool: Arc<TaskPool>,
    loaded: Mutex<SmallKeyHashMap<ChunkPos, Arc<DataTile>>>,
    pending_writes: Mutex<Vec<Task<()>>>,
}

impl DataTileCache {
    pub fn new(source: Arc<dyn WorldSource>, cells: CellTree, io_pool: Arc<TaskPool>) -> Self {
        Self {
            source,
            cells,
            io_pool,
            loaded: Mutex::new(SmallKeyHashMap::default()),
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn source(&self) -> &dyn WorldSource {
        &*self.source
    }

    /// The record for `pos`, loading or creating it if needed.
    pub fn get(&self, pos: ChunkPos) -> Arc<DataTile> {
        if let Some(tile) = self.loaded.lock().get(&pos) {
            return tile.clone();
        }

        // Disk reads happen outside the map lock. If another thread raced us here, its tile wins and ours is dropped before
        // anything was sampled into it.
        let tile = Arc::new(self.load_or_create(pos));
        self.loaded.lock().entry(pos).or_insert(tile).clone()
    }

    fn load_or_create(&self, pos: ChunkPos) -> DataTile {
        match self.cells.read(pos) {
            Ok(Some(record)) => match DataTile::from_record(pos, record) {
                Ok(tile) => {
                    log::debug!("Loaded cell {} from disk", pos);
                    return tile;
                }
                Err(e) => log::warn!("Discarding cell {}: {}", pos, e),
            },
            Ok(None) => {}
            Err(e) => log::warn!("Failed to read cell {}, regenerating: {}", pos, e),
        }
        DataTile::new(pos, self.source())
    }

    pub fn get_metric(&self, kind: MetricKind, world_x: i32, world_z: i32) -> i32 {
        self.get(ChunkPos::from_world(world_x, world_z))
            .metric(kind, world_x, world_z, self.source())
    }

    pub fn get_classification(&self, world_x: i32, world_z: i32) -> ClassId {
        self.get(ChunkPos::from_world(world_x, world_z))
            .classification(world_x, world_z, self.source())
    }

    pub fn get_features(&self, pos: ChunkPos) -> Vec<FeatureId> {
        self.get(pos).features(self.source())
    }

    pub fn is_special_chunk(&self, pos: ChunkPos) -> bool {
        self.get(pos).is_special()
    }

    pub fn len(&self) -> usize {
        self.loaded.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.lock().is_empty()
    }

    pub fn is_loaded(&self, pos: ChunkPos) -> bool {
        self.loaded.lock().contains_key(&pos)
    }

    /// Evicts `pos` from memory. A dirty record is written out on the IO pool first.
    pub fn unload(&self, pos: ChunkPos) {
        let tile = match self.loaded.lock().remove(&pos) {
            Some(tile) => tile,
            None => return,
        };
        if tile.is_dirty() {
            self.persist_async(tile);
        }
    }

    /// Evicts every chunk in `positions`.
    pub fn unload_all(&self, positions: impl IntoIterator<Item = ChunkPos>) {
        for pos in positions {
            self.unload(pos);
        }
    }

    /// Submits every dirty loaded record to the IO pool and returns without waiting.
    pub fn flush(&self) {
        let dirty: Vec<_> = self
            .loaded
            .lock()
            .values()
            .filter(|t| t.is_dirty())
            .cloned()
            .collect();
        log::debug!("Flushing {} dirty cells", dirty.len());
        for tile in dirty {
            self.persist_async(tile);
        }
    }

    fn persist_async(&self, tile: Arc<DataTile>) {
        let cells = self.cells.clone();
        let task = self.io_pool.spawn(async move {
            if let Err(e) = persist(&cells, &tile) {
                log::error!("Failed to write cell {}: {}", tile.pos(), e);
            }
        });
        let mut pending = self.pending_writes.lock();
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }

    /// Waits for outstanding writes, then writes every remaining dirty record on the calling thread and flushes the
    /// database.
    pub fn close(&self) -> Result<(), DbError> {
        let pending: Vec<_> = self.pending_writes.lock().drain(..).collect();
        for task in pending {
            future::block_on(task);
        }

        let loaded: Vec<_> = self.loaded.lock().values().cloned().collect();
        let mut written = 0;
        for tile in loaded.iter().filter(|t| t.is_dirty()) {
            persist(&self.cells, tile)?;
            written += 1;
        }
        self.cells.flush()?;
        log::info!(
            "Closed cell cache: wrote {} of {} loaded cells",
            written,
            loaded.len()
        );
        Ok(())
    }
}

/// Writes a snapshot of `tile` if it is dirty. On failure the tile is marked dirty again so the next flush retries.
fn persist(cells: &CellTree, tile: &DataTile) -> Result<(), DbError> {
    let _guard = tile.lock_for_persist();
    if !tile.take_dirty() {
        return Ok(());
    }
    let record = tile.to_record();
    cells.write(tile.pos(), &record).map_err(|e| {
        tile.mark_dirty();
        e
    })
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::ProceduralWorld;

    use bevy_tasks::TaskPoolBuilder;

    fn cache_over(db: &sled::Db) -> DataTileCache {
        DataTileCache::new(
            Arc::new(ProceduralWorld::new(5)),
            CellTree::open(db, "test").unwrap(),
            Arc::new(TaskPoolBuilder::new().num_threads(2).build()),
        )
    }

    #[test]
    fn unloaded_cells_come_back_from_disk() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let cache = cache_over(&db);

        let height = cache.get_metric(MetricKind::Surface, 100, -30);
        let class = cache.get_classification(100, -30);
        let pos = ChunkPos::from_world(100, -30);
        assert!(cache.is_loaded(pos));

        cache.unload(pos);
        assert!(!cache.is_loaded(pos));
        cache.close().unwrap();

        let record = cache.cells.read(pos).unwrap().unwrap();
        let reloaded = DataTile::from_record(pos, record).unwrap();
        assert!(!reloaded.is_dirty());

        // Served from the record, not sampled again.
        let cache = cache_over(&db);
        let tile = cache.get(pos);
        assert!(!tile.is_dirty());
        assert_eq!(cache.get_metric(MetricKind::Surface, 100, -30), height);
        assert_eq!(cache.get_classification(100, -30), class);
        assert!(!tile.is_dirty());
    }

    #[test]
    fn close_writes_dirty_cells() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let cache = cache_over(&db);
        for x in 0..4 {
            cache.get_metric(MetricKind::OceanFloor, x * 16, 0);
        }
        cache.get(ChunkPos::new(9, 9));
        assert_eq!(cache.len(), 5);

        cache.close().unwrap();
        // The untouched chunk was never dirty.
        assert_eq!(cache.cells.len(), 4);
        assert!(cache.loaded.lock().values().all(|t| !t.is_dirty()));
    }

    #[test]
    fn flush_is_eventually_written() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let cache = cache_over(&db);
        let pos = ChunkPos::new(-2, 7);
        cache.get_features(pos);
        cache.flush();
        cache.close().unwrap();
        assert!(cache.cells.contains(pos).unwrap());
    }

    #[test]
    fn corrupt_record_is_regenerated() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let cache = cache_over(&db);
        let pos = ChunkPos::new(3, 3);
        cache.cells.write_raw(pos, &[1, 2, 3, 4]);

        let expected = ProceduralWorld::new(5).sample_metric(MetricKind::Surface, 48, 48);
        assert_eq!(cache.get_metric(MetricKind::Surface, 48, 48), expected);
        assert!(cache.get(pos).is_dirty());
    }
}
