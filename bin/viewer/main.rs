use std::env;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use worldview::{Config, RenderTileScheduler, SchedulerError, TileContext, Viewport};
use worldview_core::geometry::Rect;
use worldview_core::glam::IVec2;
use worldview_core::pool::io_pool;
use worldview_map::{DataTileCache, MapDb, ProceduralWorld, TileKey, WorldUnits};
use worldview_renderer::{
    into_grid, CompositeLayer, CountingCanvas, DiskLayerLoader, LayerKind, ScreenLayer, TileCanvas,
};

const FRAME: Duration = Duration::from_millis(16);

/// Drives the scheduler headlessly: open the map, look around the origin, pan, zoom out, and report.
///
/// Usage: `viewer [config.ron] [seed]`
fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => Config::read_file(path)?,
        None => Config::default(),
    };
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);

    let db = sled::open(&config.cache.db_path)?;
    let map = MapDb::open(&db, &config.cache.map_name)?;
    let stored = map
        .cells()
        .positions()
        .try_fold(Rect::square(IVec2::ZERO, 0), |extent, pos| {
            pos.map(|pos| extent.union(&pos.extent().into_inner()))
        })?;
    log::info!(
        "Map '{}' has {} stored cells covering {:?}",
        config.cache.map_name,
        map.cells().len(),
        stored
    );
    let io_pool = Arc::new(io_pool(config.cache.io_threads));

    let cache = Arc::new(DataTileCache::new(
        Arc::new(ProceduralWorld::new(seed)),
        map.cells().clone(),
        io_pool.clone(),
    ));
    let loader = Arc::new(if config.render.persist_rasters {
        DiskLayerLoader::new(map.rasters().clone(), io_pool.clone())
    } else {
        DiskLayerLoader::memory_only(io_pool.clone())
    });
    let context = Arc::new(TileContext {
        cache: cache.clone(),
        loader: loader.clone(),
        render: config.render.clone(),
    });

    let origin = WorldUnits(IVec2::ZERO);
    let viewport = Viewport::from_config(origin, &config.view);
    let mut scheduler = RenderTileScheduler::new(config.scheduler, context, viewport, origin);
    let mut canvas = CountingCanvas::default();

    run_until_settled(&mut scheduler, &mut canvas)?;
    log::info!("Initial view: {:?}", scheduler.stats());

    // Pan one screen width east.
    let world_width = viewport.world_area().0.shape.x;
    let panned = viewport.with_center(WorldUnits(IVec2::new(world_width, 0)));
    scheduler.set_viewport(panned);
    scheduler.set_origin(panned.center());
    scheduler.cull(&panned);
    scheduler.resume_generation();
    run_until_settled(&mut scheduler, &mut canvas)?;
    log::info!("After pan: {:?}", scheduler.stats());

    // Zoom out. Every tile changes resolution, so start over.
    let zoomed = panned
        .with_scale(panned.scale() / 2.0)
        .with_target_resolution(panned.target_resolution() * 2);
    scheduler.on_scroll();
    scheduler.set_viewport(zoomed);
    scheduler.resume_generation();
    run_until_settled(&mut scheduler, &mut canvas)?;
    log::info!("After zoom: {:?}", scheduler.stats());

    compose_overview(&scheduler, &mut canvas);

    scheduler.close(&mut canvas);
    loader.wait_for_writes();
    cache.close()?;
    map.flush()?;

    log::info!(
        "Canvas: {} uploads, {} releases, {} draws, {} markers, {} textures still live",
        canvas.uploads,
        canvas.releases,
        canvas.draws,
        canvas.markers,
        canvas.live_textures
    );
    Ok(())
}

fn run_until_settled(scheduler: &mut RenderTileScheduler, canvas: &mut CountingCanvas) -> Result<(), SchedulerError> {
    let start = Instant::now();
    let mut frames = 0;
    loop {
        scheduler.tick()?;
        scheduler.render(canvas);
        frames += 1;
        if scheduler.stats().tracked == 0 {
            break;
        }
        thread::sleep(FRAME);
    }
    log::info!("Settled after {} frames in {:.2?}", frames, start.elapsed());
    Ok(())
}

/// Merges the elevation of the 2x2 tiles at the view center into one texture.
fn compose_overview(scheduler: &RenderTileScheduler, canvas: &mut CountingCanvas) {
    let center = scheduler.viewport().grid().key_at(scheduler.viewport().center());
    let mut delegates = Vec::with_capacity(4);
    for dz in 0..2 {
        for dx in 0..2 {
            let key = TileKey::new(center.x() + dx, center.z() + dz);
            let layer = scheduler
                .rendered_tile(key)
                .and_then(|tile| tile.layer(LayerKind::Elevation));
            match layer {
                Some(layer) => delegates.push(ScreenLayer::new(layer)),
                None => {
                    log::warn!("No elevation for {}, skipping overview", key);
                    return;
                }
            }
        }
    }

    match CompositeLayer::merge(into_grid(delegates, 2)) {
        Ok((overview, released)) => {
            debug_assert!(released.is_empty());
            let texture = canvas.upload(overview.layer().raster());
            log::info!(
                "Overview is {}x{} pixels covering {:?}",
                overview.layer().raster().width(),
                overview.layer().raster().height(),
                overview.layer().footprint()
            );
            canvas.release(texture);
        }
        Err(e) => log::error!("Failed to compose overview: {}", e),
    }
}
