use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use worldview_core::cancel::CancelToken;
use worldview_core::geometry::Rect;
use worldview_core::SmallKeyHashSet;
use worldview_map::{ChunkPos, DataTileCache, TileGrid, TileKey, WorldUnits};
use worldview_renderer::{DiskLayerLoader, LayerKind, RenderConfig, ScreenLayer, TextureId, TileError, TileLayer};

/// What every generation task needs, shared across the pool.
pub struct TileContext {
    pub cache: Arc<DataTileCache>,
    pub loader: Arc<DiskLayerLoader>,
    pub render: RenderConfig,
}

/// One square of the map at one sample resolution, with a screen layer per configured [`LayerKind`].
pub struct RenderTile {
    key: TileKey,
    bounds: WorldUnits<Rect>,
    sample_resolution: u32,
    refined_from: Option<u32>,
    layers: Vec<Mutex<ScreenLayer>>,
    sampled_cells: SmallKeyHashSet<ChunkPos>,
    generation_time: Duration,
}

impl RenderTile {
    /// Builds every configured layer for `key` at `sample_resolution`.
    ///
    /// When refining from `previous`, layers that don't use LOD are shared with it instead of being generated again, and
    /// the new tile inherits the chunks `previous` sampled so the whole refinement chain can unload them at the end.
    pub fn generate(
        ctx: &TileContext,
        grid: TileGrid,
        key: TileKey,
        sample_resolution: u32,
        previous: Option<&RenderTile>,
        cancel: &CancelToken,
    ) -> Result<Self, TileError> {
        let start = Instant::now();
        let mut sampled_cells = previous
            .map(|p| p.sampled_cells.clone())
            .unwrap_or_default();

        let mut layers = Vec::with_capacity(ctx.render.layers.len());
        for settings in ctx.render.layers.iter() {
            let reused = previous
                .and_then(|p| p.layer(settings.kind))
                .filter(|l| !l.uses_lod());
            let layer = match reused {
                Some(layer) => layer,
                None => Arc::new(ctx.loader.load_or_make(
                    settings.kind,
                    &ctx.cache,
                    grid,
                    key,
                    sample_resolution,
                    &ctx.render,
                    &mut sampled_cells,
                    cancel,
                )?),
            };
            layers.push(Mutex::new(ScreenLayer::new(layer)));
        }

        Ok(Self {
            key,
            bounds: grid.tile_bounds(key),
            sample_resolution,
            refined_from: previous.map(|p| p.sample_resolution),
            layers,
            sampled_cells,
            generation_time: start.elapsed(),
        })
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn bounds(&self) -> WorldUnits<Rect> {
        self.bounds
    }

    pub fn sample_resolution(&self) -> u32 {
        self.sample_resolution
    }

    pub fn refined_from(&self) -> Option<u32> {
        self.refined_from
    }

    pub fn sampled_cells(&self) -> &SmallKeyHashSet<ChunkPos> {
        &self.sampled_cells
    }

    pub fn generation_time(&self) -> Duration {
        self.generation_time
    }

    pub fn layers(&self) -> &[Mutex<ScreenLayer>] {
        &self.layers
    }

    /// The first layer of `kind`, if the tile has one.
    pub fn layer(&self, kind: LayerKind) -> Option<Arc<TileLayer>> {
        self.layers
            .iter()
            .map(|l| l.lock())
            .find(|l| l.kind() == kind)
            .map(|l| l.layer().clone())
    }

    /// Gives up every display handle. The layers themselves are freed when the last tile sharing them drops.
    pub fn take_textures(&self) -> Vec<TextureId> {
        self.layers
            .iter()
            .filter_map(|l| l.lock().take_texture())
            .collect()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    use bevy_tasks::TaskPoolBuilder;
    use worldview_map::{CellTree, ProceduralWorld, WorldSource};

    pub fn test_context(source: Arc<dyn WorldSource>) -> TileContext {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let io_pool = Arc::new(TaskPoolBuilder::new().num_threads(1).build());
        TileContext {
            cache: Arc::new(DataTileCache::new(
                source,
                CellTree::open(&db, "test").unwrap(),
                io_pool.clone(),
            )),
            loader: Arc::new(DiskLayerLoader::memory_only(io_pool)),
            render: RenderConfig::default(),
        }
    }

    #[test]
    fn refinement_shares_fixed_layers() {
        let ctx = test_context(Arc::new(ProceduralWorld::new(2)));
        let grid = TileGrid::new(128);
        let key = TileKey::new(-1, 1);
        let cancel = CancelToken::new();

        let coarse = RenderTile::generate(&ctx, grid, key, 16, None, &cancel).unwrap();
        let fine = RenderTile::generate(&ctx, grid, key, 8, Some(&coarse), &cancel).unwrap();

        assert_eq!(fine.refined_from(), Some(16));
        assert_eq!(fine.layers().len(), ctx.render.layers.len());

        let special = LayerKind::SpecialChunks;
        assert!(Arc::ptr_eq(
            &coarse.layer(special).unwrap(),
            &fine.layer(special).unwrap()
        ));
        let elevation = LayerKind::Elevation;
        assert!(!Arc::ptr_eq(
            &coarse.layer(elevation).unwrap(),
            &fine.layer(elevation).unwrap()
        ));
        assert_eq!(fine.layer(elevation).unwrap().raster().width(), 16);
        assert!(fine.sampled_cells().is_superset(coarse.sampled_cells()));
        assert_eq!(fine.bounds(), grid.tile_bounds(key));
    }

    #[test]
    fn textures_are_taken_once() {
        let ctx = test_context(Arc::new(ProceduralWorld::new(2)));
        let tile = RenderTile::generate(&ctx, TileGrid::new(64), TileKey::new(0, 0), 8, None, &CancelToken::new())
            .unwrap();
        for (i, layer) in tile.layers().iter().enumerate() {
            layer.lock().set_texture(TextureId(i as u64));
        }
        assert_eq!(tile.take_textures().len(), tile.layers().len());
        assert!(tile.take_textures().is_empty());
    }
}
