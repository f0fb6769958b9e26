use crate::{FeatureMarker, LayerKind, Raster, RenderConfig, TileError, TileLayer};

use bevy_tasks::{Task, TaskPool};
use futures_lite::future;
use parking_lot::Mutex;
use std::sync::Arc;
use worldview_core::cancel::CancelToken;
use worldview_core::glam::IVec2;
use worldview_core::SmallKeyHashSet;
use worldview_map::{
    ChunkPos, DataTileCache, DiskTileStore, MarkerRecord, RasterKey, RasterRecord, TileGrid, TileKey, WorldUnits,
};

/// Generates layers through the [`DiskTileStore`]: a usable stored raster is returned as is, anything else is generated
/// and written back on the IO pool.
pub struct DiskLayerLoader {
    store: Option<DiskTileStore>,
    io_pool: Arc<TaskPool>,
    pending_writes: Mutex<Vec<Task<()>>>,
}

impl DiskLayerLoader {
    pub fn new(store: DiskTileStore, io_pool: Arc<TaskPool>) -> Self {
        Self {
            store: Some(store),
            io_pool,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    /// A loader that always generates and never writes.
    pub fn memory_only(io_pool: Arc<TaskPool>) -> Self {
        Self {
            store: None,
            io_pool,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    fn raster_key(kind: LayerKind, key: TileKey, size: i32, stride: u32) -> RasterKey {
        RasterKey {
            kind: kind.tag(),
            tile_x: key.x(),
            tile_z: key.z(),
            size: size as u32,
            stride: if kind.uses_lod() { stride } else { 0 },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn load_or_make(
        &self,
        kind: LayerKind,
        cache: &DataTileCache,
        grid: TileGrid,
        key: TileKey,
        stride: u32,
        config: &RenderConfig,
        sampled_out: &mut SmallKeyHashSet<ChunkPos>,
        cancel: &CancelToken,
    ) -> Result<TileLayer, TileError> {
        let footprint = grid.tile_bounds(key);
        let raster_key = Self::raster_key(kind, key, grid.tile_size(), stride);

        if let Some(store) = self.store.as_ref().filter(|_| config.persist_rasters) {
            match store.read(raster_key) {
                Ok(Some(record)) => {
                    if let Some(layer) = accept_record(kind, stride, footprint, record) {
                        log::debug!("Loaded {:?} raster for {} at stride {} from disk", kind, key, stride);
                        return Ok(layer);
                    }
                    log::debug!("Stored {:?} raster for {} is stale, regenerating", kind, key);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Failed to read {:?} raster for {}, regenerating: {}", kind, key, e),
            }
        }

        let layer = TileLayer::make(kind, cache, footprint, stride, config, sampled_out, cancel)?;

        if let Some(store) = self.store.as_ref().filter(|_| config.persist_rasters && layer.is_complete()) {
            let store = store.clone();
            let record = to_record(&layer, grid.tile_size());
            let task = self.io_pool.spawn(async move {
                if let Err(e) = store.write(raster_key, &record) {
                    log::error!("Failed to write raster {:?}: {}", raster_key, e);
                }
            });
            let mut pending = self.pending_writes.lock();
            pending.retain(|t| !t.is_finished());
            pending.push(task);
        }

        Ok(layer)
    }

    /// Blocks until every raster submitted so far has been written.
    pub fn wait_for_writes(&self) {
        let pending: Vec<_> = self.pending_writes.lock().drain(..).collect();
        for task in pending {
            future::block_on(task);
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.flush() {
                log::error!("Failed to flush raster store: {}", e);
            }
        }
    }
}

/// A stored raster is only usable if it is complete, of the right kind, and sampled at the requested stride. Layers
/// without LOD accept any stride.
fn accept_record(
    kind: LayerKind,
    stride: u32,
    footprint: WorldUnits<worldview_core::geometry::Rect>,
    record: RasterRecord,
) -> Option<TileLayer> {
    let stored_kind = LayerKind::from_tag(record.kind)?;
    if !record.complete || stored_kind != kind || (kind.uses_lod() && record.sample_resolution != stride) {
        return None;
    }
    let raster = Raster::from_pixels(record.width, record.height, record.pixels)?;
    let markers = record
        .markers
        .into_iter()
        .map(|m| FeatureMarker {
            world: WorldUnits(IVec2::new(m.x, m.z)),
            feature: m.feature,
        })
        .collect();
    Some(TileLayer::from_parts(
        kind,
        raster,
        footprint,
        record.sample_resolution,
        record.complete,
        markers,
    ))
}

fn to_record(layer: &TileLayer, size: i32) -> RasterRecord {
    let raster = layer.raster();
    RasterRecord {
        kind: layer.kind().tag(),
        complete: layer.is_complete(),
        sample_resolution: layer.sample_resolution(),
        size: size as u32,
        width: raster.width(),
        height: raster.height(),
        pixels: raster.pixels().to_vec(),
        markers: layer
            .markers()
            .iter()
            .map(|m| MarkerRecord {
                x: m.world.0.x,
                z: m.world.0.y,
                feature: m.feature,
            })
            .collect(),
    }
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
    use crate::layer::test::test_cache;

    use bevy_tasks::TaskPoolBuilder;

    fn loader(db: &sled::Db) -> DiskLayerLoader {
        DiskLayerLoader::new(
            DiskTileStore::open(db, "test").unwrap(),
            Arc::new(TaskPoolBuilder::new().num_threads(1).build()),
        )
    }

    fn load(
        loader: &DiskLayerLoader,
        cache: &DataTileCache,
        kind: LayerKind,
        stride: u32,
    ) -> (TileLayer, SmallKeyHashSet<ChunkPos>) {
        let mut sampled = SmallKeyHashSet::default();
        let layer = loader
            .load_or_make(
                kind,
                cache,
                TileGrid::new(64),
                TileKey::new(2, -3),
                stride,
                &RenderConfig::default(),
                &mut sampled,
                &CancelToken::new(),
            )
            .unwrap();
        (layer, sampled)
    }

    #[test]
    fn second_load_comes_from_disk() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let loader = loader(&db);
        let cache = test_cache();

        let (generated, sampled) = load(&loader, &cache, LayerKind::Classification, 8);
        assert!(!sampled.is_empty());
        loader.wait_for_writes();

        let (loaded, sampled) = load(&loader, &cache, LayerKind::Classification, 8);
        assert!(sampled.is_empty());
        assert_eq!(loaded.raster(), generated.raster());
        assert_eq!(loaded.sample_resolution(), 8);

        // A finer stride is a different record.
        let (_, sampled) = load(&loader, &cache, LayerKind::Classification, 4);
        assert!(!sampled.is_empty());
    }

    #[test]
    fn chunk_layers_are_found_at_any_stride() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let loader = loader(&db);
        let cache = test_cache();

        let (generated, _) = load(&loader, &cache, LayerKind::Features, 32);
        loader.wait_for_writes();
        let (loaded, sampled) = load(&loader, &cache, LayerKind::Features, 4);
        assert!(sampled.is_empty());
        assert_eq!(loaded.raster(), generated.raster());
        assert_eq!(loaded.markers(), generated.markers());
    }

    #[test]
    fn incomplete_or_foreign_records_are_rejected() {
        let footprint = TileGrid::new(64).tile_bounds(TileKey::new(0, 0));
        let record = RasterRecord {
            kind: LayerKind::Elevation.tag(),
            complete: true,
            sample_resolution: 8,
            size: 64,
            width: 8,
            height: 8,
            pixels: vec![0; 64],
            markers: Vec::new(),
        };
        assert!(accept_record(LayerKind::Elevation, 8, footprint, record.clone()).is_some());
        assert!(accept_record(LayerKind::Elevation, 4, footprint, record.clone()).is_none());
        assert!(accept_record(LayerKind::Classification, 8, footprint, record.clone()).is_none());
        let incomplete = RasterRecord {
            complete: false,
            ..record
        };
        assert!(accept_record(LayerKind::Elevation, 8, footprint, incomplete).is_none());
    }
}
