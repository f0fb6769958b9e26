mod radial;

pub use radial::radial_candidates;

use crate::render_tile::{RenderTile, TileContext};
use crate::viewport::Viewport;

use bevy_tasks::{Task, TaskPool};
use futures_lite::future;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::hash_map::Entry;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use worldview_core::cancel::CancelToken;
use worldview_core::glam::IVec2;
use worldview_core::pool::{default_generation_threads, generation_pool};
use worldview_core::{SmallKeyHashMap, SmallKeyHashSet};
use worldview_map::{TileKey, WorldUnits};
use worldview_renderer::{TextureId, TileCanvas, TileError};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Generation threads. `None` uses one fewer than the available parallelism.
    pub generation_threads: Option<usize>,
    /// Rings searched beyond the edge of the view.
    pub ring_margin: u32,
    /// Points sampled on every ring.
    pub angular_slices: u32,
    /// New tiles start at `target_resolution << initial_lod_octaves`, capped at the tile size.
    pub initial_lod_octaves: u32,
    /// Make `tick` return an error when a tile fails, instead of dropping the tile and moving on.
    pub fatal_generation_errors: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generation_threads: None,
            ring_margin: 2,
            angular_slices: 360,
            initial_lod_octaves: 3,
            fatal_generation_errors: false,
        }
    }
}

impl SchedulerConfig {
    fn num_threads(&self) -> usize {
        self.generation_threads
            .unwrap_or_else(default_generation_threads)
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to generate {key} at resolution {resolution}: {source}")]
    Generation {
        key: TileKey,
        resolution: u32,
        #[source]
        source: TileError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SchedulerStats {
    /// Tasks in flight.
    pub tracked: usize,
    /// Tiles in the rendering set.
    pub rendered: usize,
    /// Tiles generated since the scheduler was created, counting every refinement step.
    pub generated: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub mean_generation_time: Duration,
}

struct TrackedTile {
    task: Task<Result<Arc<RenderTile>, TileError>>,
    cancel: CancelToken,
    resolution: u32,
}

type RenderingSet = Arc<Mutex<SmallKeyHashMap<TileKey, Arc<RenderTile>>>>;

/// Decides which tiles get generated, in what order, and at what resolution, and owns every tile it produces.
///
/// All methods are called from one owning thread. Generation runs on a private [`TaskPool`]; the owning thread only ever
/// polls tasks and never waits on them. A finished task has already published its tile into the rendering set, so
/// `tick` only has to decide whether to refine it.
///
/// Every tile starts coarse, at `target << initial_lod_octaves` or the tile size if that is smaller, and is regenerated at
/// half the resolution each time it finishes until it reaches the viewport's target.
pub struct RenderTileScheduler {
    config: SchedulerConfig,
    context: Arc<TileContext>,
    viewport: Viewport,
    origin: WorldUnits<IVec2>,
    pool: TaskPool,
    tracked: SmallKeyHashMap<TileKey, TrackedTile>,
    rendering: RenderingSet,
    to_close: Arc<Mutex<Vec<Arc<RenderTile>>>>,
    pending_releases: Vec<TextureId>,
    generation_paused: bool,
    generated: u64,
    failed: u64,
    cancelled: u64,
    total_generation_time: Duration,
}

impl RenderTileScheduler {
    /// Creates the scheduler and immediately queues the tiles around `origin`.
    pub fn new(
        config: SchedulerConfig,
        context: Arc<TileContext>,
        viewport: Viewport,
        origin: WorldUnits<IVec2>,
    ) -> Self {
        let pool = generation_pool(config.num_threads());
        let mut scheduler = Self {
            config,
            context,
            viewport,
            origin,
            pool,
            tracked: SmallKeyHashMap::default(),
            rendering: Arc::new(Mutex::new(SmallKeyHashMap::default())),
            to_close: Arc::new(Mutex::new(Vec::new())),
            pending_releases: Vec::new(),
            generation_paused: true,
            generated: 0,
            failed: 0,
            cancelled: 0,
            total_generation_time: Duration::ZERO,
        };
        scheduler.load_tiles(origin);
        scheduler
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Takes effect at the next `tick` or `cull`.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn origin(&self) -> WorldUnits<IVec2> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: WorldUnits<IVec2>) {
        self.origin = origin;
    }

    /// Makes the next `tick` search for new tiles around the origin.
    pub fn resume_generation(&mut self) {
        self.generation_paused = false;
    }

    pub fn is_tracked(&self, key: TileKey) -> bool {
        self.tracked.contains_key(&key)
    }

    pub fn rendered_keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<_> = self.rendering.lock().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn rendered_tile(&self, key: TileKey) -> Option<Arc<RenderTile>> {
        self.rendering.lock().get(&key).cloned()
    }

    pub fn stats(&self) -> SchedulerStats {
        let finished = u32::try_from(self.generated.max(1)).unwrap_or(u32::MAX);
        SchedulerStats {
            tracked: self.tracked.len(),
            rendered: self.rendering.lock().len(),
            generated: self.generated,
            failed: self.failed,
            cancelled: self.cancelled,
            mean_generation_time: self.total_generation_time / finished,
        }
    }

    /// Queues every missing tile in view, nearest ring first.
    pub fn load_tiles(&mut self, origin: WorldUnits<IVec2>) {
        let start_resolution = self.start_resolution();
        let order = load_order(&self.config, &self.viewport, origin);

        let mut submitted = 0;
        for key in order {
            if self.rendering.lock().contains_key(&key) {
                continue;
            }
            if self.submit_tile(key, start_resolution, None) {
                submitted += 1;
            }
        }
        log::debug!(
            "Queued {} tiles around {} at resolution {}",
            submitted,
            self.viewport.grid().key_at(origin),
            start_resolution
        );
    }

    /// The coarsest resolution a new tile is generated at: `initial_lod_octaves` above the target, but never coarser than
    /// one sample per tile.
    fn start_resolution(&self) -> u32 {
        let target = self.viewport.target_resolution();
        let octaves = self.config.initial_lod_octaves;
        let coarsest = if octaves < target.leading_zeros() {
            target << octaves
        } else {
            u32::MAX
        };
        let tile_size = self.viewport.tile_size().max(1) as u32;
        let largest_in_tile = 1u32 << (u32::BITS - 1 - tile_size.leading_zeros());
        coarsest.min(largest_in_tile).max(target)
    }

    /// Starts generating `key` unless a task for it is already in flight. Returns whether a task was started.
    pub fn submit_tile(&mut self, key: TileKey, resolution: u32, previous: Option<Arc<RenderTile>>) -> bool {
        let entry = match self.tracked.entry(key) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(entry) => entry,
        };

        let cancel = CancelToken::new();
        let task_cancel = cancel.clone();
        let context = self.context.clone();
        let rendering = self.rendering.clone();
        let to_close = self.to_close.clone();
        let grid = self.viewport.grid();

        let task = self.pool.spawn(async move {
            if task_cancel.is_cancelled() {
                return Err(TileError::Cancelled);
            }
            let tile = panic::catch_unwind(AssertUnwindSafe(|| {
                RenderTile::generate(&context, grid, key, resolution, previous.as_deref(), &task_cancel)
            }))
            .map_err(|payload| TileError::Panicked(panic_message(payload)))??;
            let tile = Arc::new(tile);

            let mut rendering = rendering.lock();
            // Checked under the lock so a tile cancelled by the owner can never be published after it was evicted.
            if task_cancel.is_cancelled() {
                return Err(TileError::Cancelled);
            }
            if let Some(replaced) = rendering.insert(key, tile.clone()) {
                if !Arc::ptr_eq(&replaced, &tile) {
                    to_close.lock().push(replaced);
                }
            }
            Ok::<_, TileError>(tile)
        });

        log::debug!("Submitted {} at resolution {}", key, resolution);
        entry.insert(TrackedTile {
            task,
            cancel,
            resolution,
        });
        true
    }

    /// One polling cycle. Never blocks on generation.
    pub fn tick(&mut self) -> Result<(), SchedulerError> {
        if !self.generation_paused {
            self.load_tiles(self.origin);
            self.generation_paused = true;
        }

        let target = self.viewport.target_resolution();
        let mut to_remove = Vec::new();
        let mut to_evict = Vec::new();
        let mut to_refine = Vec::new();
        let mut finished_chains = Vec::new();
        let mut left_view = Vec::new();
        let mut fatal = None;

        for (&key, tracked) in self.tracked.iter_mut() {
            let in_view = self.viewport.intersects_tile(key);
            match future::block_on(future::poll_once(&mut tracked.task)) {
                None => {
                    if !in_view {
                        tracked.cancel.cancel();
                        to_remove.push(key);
                        to_evict.push(key);
                    }
                }
                Some(Err(TileError::Cancelled)) => {
                    self.cancelled += 1;
                    to_remove.push(key);
                }
                Some(Err(e)) => {
                    self.failed += 1;
                    log::error!("Failed to generate {} at resolution {}: {}", key, tracked.resolution, e);
                    to_remove.push(key);
                    if self.config.fatal_generation_errors && fatal.is_none() {
                        fatal = Some(SchedulerError::Generation {
                            key,
                            resolution: tracked.resolution,
                            source: e,
                        });
                    }
                }
                Some(Ok(tile)) => {
                    self.generated += 1;
                    self.total_generation_time += tile.generation_time();
                    to_remove.push(key);
                    if !in_view {
                        // Published after the view moved away.
                        left_view.push(tile);
                    } else if let Some(resolution) = next_refinement(tile.sample_resolution(), target) {
                        to_refine.push((key, resolution, tile));
                    } else {
                        finished_chains.push(tile);
                    }
                }
            }
        }

        for key in to_remove {
            // Dropping the task handle cancels it if it has not started.
            self.tracked.remove(&key);
        }
        for key in to_evict {
            self.cancelled += 1;
            let evicted = self.rendering.lock().remove(&key);
            if let Some(tile) = evicted {
                self.force_close(&tile);
            }
        }
        for tile in left_view {
            log::debug!("{} left the view while generating", tile.key());
            self.rendering.lock().remove(&tile.key());
            self.force_close(&tile);
        }
        for tile in finished_chains {
            log::debug!("{} settled at resolution {}", tile.key(), tile.sample_resolution());
            self.context
                .cache
                .unload_all(tile.sampled_cells().iter().copied());
        }

        let retired: Vec<_> = self.to_close.lock().drain(..).collect();
        for tile in retired {
            self.pending_releases.extend(tile.take_textures());
        }

        for (key, resolution, previous) in to_refine {
            self.submit_tile(key, resolution, Some(previous));
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes every rendered tile that is no longer in view.
    pub fn cull(&mut self, viewport: &Viewport) {
        let culled: Vec<_> = {
            let mut rendering = self.rendering.lock();
            let keys: Vec<_> = rendering
                .iter()
                .filter(|(_, tile)| !viewport.intersects(tile.bounds()))
                .map(|(&key, _)| key)
                .collect();
            keys.into_iter().filter_map(|k| rendering.remove(&k)).collect()
        };
        if !culled.is_empty() {
            log::debug!("Culled {} tiles", culled.len());
        }
        for tile in culled {
            self.force_close(&tile);
        }
    }

    /// Releases the tile's textures and unloads the chunks it sampled.
    fn force_close(&mut self, tile: &RenderTile) {
        self.pending_releases.extend(tile.take_textures());
        self.context
            .cache
            .unload_all(tile.sampled_cells().iter().copied());
    }

    /// Drops all generation work and every rendered tile, e.g. after the resolution changed.
    pub fn on_scroll(&mut self) {
        self.reset_pool();
        self.close_rendered();
    }

    fn reset_pool(&mut self) {
        for tracked in self.tracked.values() {
            tracked.cancel.cancel();
        }
        self.cancelled += self.tracked.len() as u64;
        self.tracked.clear();

        let old_pool = std::mem::replace(&mut self.pool, generation_pool(self.config.num_threads()));
        // Dropping a pool joins its threads, which may still be finishing a tile.
        thread::spawn(move || drop(old_pool));
    }

    fn close_rendered(&mut self) {
        let rendered: Vec<_> = self.rendering.lock().drain().map(|(_, tile)| tile).collect();
        let retired: Vec<_> = self.to_close.lock().drain(..).collect();
        for tile in rendered.iter().chain(retired.iter()) {
            self.force_close(tile);
        }
    }

    /// Cancels everything and releases every texture. The cell cache is left to its owner to close.
    pub fn close(&mut self, canvas: &mut dyn TileCanvas) {
        self.reset_pool();
        self.close_rendered();
        let released = self.pending_releases.len();
        for texture in self.pending_releases.drain(..) {
            canvas.release(texture);
        }
        log::info!(
            "Closed tile scheduler after generating {} tiles ({} failed, {} cancelled), released {} textures",
            self.generated,
            self.failed,
            self.cancelled,
            released
        );
    }

    /// Draws every rendered tile: all base layers first, then decorations on top.
    pub fn render(&mut self, canvas: &mut dyn TileCanvas) {
        for texture in self.pending_releases.drain(..) {
            canvas.release(texture);
        }

        let mut tiles: Vec<_> = self.rendering.lock().values().cloned().collect();
        tiles.sort_unstable_by_key(|t| t.key());
        let render = &self.context.render;

        for tile in tiles.iter() {
            let placement = self.viewport.placement(tile.bounds());
            for layer in tile.layers() {
                let mut layer = layer.lock();
                let texture = match layer.texture() {
                    Some(texture) => texture,
                    None => {
                        let texture = canvas.upload(layer.layer().raster());
                        layer.set_texture(texture);
                        texture
                    }
                };
                canvas.draw(placement, texture, render.opacity(layer.kind()));
            }
        }

        for tile in tiles.iter() {
            let placement = self.viewport.placement(tile.bounds());
            for layer in tile.layers() {
                let layer = layer.lock();
                if layer.kind().has_decoration() {
                    canvas.decorate(placement, layer.layer(), render.opacity(layer.kind()));
                }
            }
        }
    }
}

/// Missing tiles in view, each once, in the order they should be submitted: by ring around `origin`, nearest first.
pub fn load_order(config: &SchedulerConfig, viewport: &Viewport, origin: WorldUnits<IVec2>) -> Vec<TileKey> {
    let grid = viewport.grid();
    let range = viewport.tile_range();
    let max_ring = range.x.max(range.y).max(0) as u32 + config.ring_margin;
    let mut seen = SmallKeyHashSet::default();
    radial_candidates(grid, grid.key_at(origin), max_ring, config.angular_slices)
        .map(|(_ring, key)| key)
        .filter(|&key| viewport.intersects_tile(key) && seen.insert(key))
        .collect()
}

/// The resolution to refine a tile at `resolution` to, or `None` once halving would go below `target`.
pub fn next_refinement(resolution: u32, target: u32) -> Option<u32> {
    let next = resolution >> 1;
    (next >= target && next > 0).then(|| next)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
