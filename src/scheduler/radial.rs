use std::f64::consts::TAU;
use worldview_core::glam::DVec2;
use worldview_map::{TileGrid, TileKey, WorldUnits};

/// Candidate tiles around `origin`, nearest ring first.
///
/// Ring `r` is sampled at `slices` evenly spaced angles on a circle of radius `r * tile_size` around the center of the
/// origin tile. The same key can be produced more than once, both within a ring and across rings, so callers must
/// deduplicate.
pub fn radial_candidates(
    grid: TileGrid,
    origin: TileKey,
    max_ring: u32,
    slices: u32,
) -> impl Iterator<Item = (u32, TileKey)> {
    let size = grid.tile_size();
    let WorldUnits(origin_min) = grid.tile_min(origin);
    let center = (origin_min + size / 2).as_dvec2();
    let slices = slices.max(1);
    let slice_angle = TAU / slices as f64;

    (0..=max_ring).flat_map(move |ring| {
        let distance = size as f64 * ring as f64;
        (0..slices).map(move |i| {
            let angle = i as f64 * slice_angle;
            let point = (center + DVec2::new(angle.sin(), angle.cos()) * distance).round();
            (ring, grid.key_at(WorldUnits(point.as_ivec2())))
        })
    })
}
