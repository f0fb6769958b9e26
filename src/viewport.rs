use serde::{Deserialize, Serialize};
use worldview_core::geometry::Rect;
use worldview_core::glam::{DVec2, IVec2};
use worldview_map::{TileGrid, TileKey, WorldUnits};
use worldview_renderer::ScreenPlacement;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Edge length of a tile in world blocks. Should be a multiple of the chunk edge.
    pub tile_size: u32,
    /// World blocks per sampled pixel once refinement is done.
    pub target_resolution: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Screen pixels per world block.
    pub scale: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            target_resolution: 4,
            screen_width: 1280,
            screen_height: 720,
            scale: 0.5,
        }
    }
}

/// The part of the world that is on screen, and how it maps to screen pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    center: WorldUnits<IVec2>,
    screen_size: IVec2,
    scale: f64,
    grid: TileGrid,
    target_resolution: u32,
}

impl Viewport {
    /// `target_resolution` is rounded up to a power of two so that halving always lands on it exactly.
    pub fn new(
        center: WorldUnits<IVec2>,
        screen_size: IVec2,
        scale: f64,
        tile_size: u32,
        target_resolution: u32,
    ) -> Self {
        Self {
            center,
            screen_size: screen_size.max(IVec2::ONE),
            scale: if scale > 0.0 { scale } else { 1.0 },
            grid: TileGrid::new(tile_size),
            target_resolution: target_resolution.max(1).next_power_of_two(),
        }
    }

    pub fn from_config(center: WorldUnits<IVec2>, config: &ViewConfig) -> Self {
        Self::new(
            center,
            IVec2::new(config.screen_width as i32, config.screen_height as i32),
            config.scale,
            config.tile_size,
            config.target_resolution,
        )
    }

    pub fn center(&self) -> WorldUnits<IVec2> {
        self.center
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn tile_size(&self) -> i32 {
        self.grid.tile_size()
    }

    pub fn target_resolution(&self) -> u32 {
        self.target_resolution
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Half the visible extent, in world blocks, rounded up.
    fn half_extent(&self) -> IVec2 {
        let half = self.screen_size.as_dvec2() / (2.0 * self.scale);
        half.ceil().as_ivec2()
    }

    /// The visible world rectangle.
    pub fn world_area(&self) -> WorldUnits<Rect> {
        let half = self.half_extent();
        self.center
            .map(|c| Rect::from_min_and_lub(c - half, c + half))
    }

    /// How many tiles fit between the center and the edge of the view on each axis, rounded up.
    pub fn tile_range(&self) -> IVec2 {
        let half = self.half_extent();
        let s = self.tile_size();
        IVec2::new((half.x + s - 1) / s, (half.y + s - 1) / s)
    }

    pub fn intersects(&self, bounds: WorldUnits<Rect>) -> bool {
        self.world_area().0.intersects(&bounds.0)
    }

    pub fn intersects_tile(&self, key: TileKey) -> bool {
        self.intersects(self.grid.tile_bounds(key))
    }

    pub fn world_to_screen(&self, world: WorldUnits<DVec2>) -> DVec2 {
        let WorldUnits(min) = self.world_area();
        (world.0 - min.minimum.as_dvec2()) * self.scale
    }

    pub fn screen_to_world(&self, screen: DVec2) -> WorldUnits<DVec2> {
        let WorldUnits(min) = self.world_area();
        WorldUnits(min.minimum.as_dvec2() + screen / self.scale)
    }

    pub fn placement(&self, bounds: WorldUnits<Rect>) -> ScreenPlacement {
        let min = self.world_to_screen(bounds.map(|b| b.minimum.as_dvec2()));
        ScreenPlacement {
            min,
            size: bounds.0.shape.as_dvec2() * self.scale,
        }
    }

    pub fn with_center(mut self, center: WorldUnits<IVec2>) -> Self {
        self.center = center;
        self
    }

    pub fn with_target_resolution(self, target_resolution: u32) -> Self {
        Self::new(
            self.center,
            self.screen_size,
            self.scale,
            self.grid.tile_size() as u32,
            target_resolution,
        )
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        if scale > 0.0 {
            self.scale = scale;
        }
        self
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

    use worldview_core::approx::assert_relative_eq;

    fn viewport() -> Viewport {
        Viewport::new(WorldUnits(IVec2::new(128, 128)), IVec2::new(512, 256), 2.0, 256, 3)
    }

    #[test]
    fn world_area_follows_screen_and_scale() {
        let v = viewport();
        assert_eq!(v.world_area().0, Rect::from_min_and_lub(IVec2::new(0, 64), IVec2::new(256, 192)));
        assert_eq!(v.tile_range(), IVec2::new(1, 1));
        assert_eq!(v.target_resolution(), 4);
    }

    #[test]
    fn only_overlapping_tiles_intersect() {
        let v = viewport();
        assert!(v.intersects_tile(TileKey::new(0, 0)));
        assert!(!v.intersects_tile(TileKey::new(1, 0)));
        assert!(!v.intersects_tile(TileKey::new(-1, 0)));
    }

    #[test]
    fn screen_and_world_round_trip() {
        let v = viewport();
        let world = WorldUnits(DVec2::new(100.5, 70.25));
        let screen = v.world_to_screen(world);
        assert_relative_eq!(screen.x, 201.0);
        assert_relative_eq!(screen.y, 12.5);
        let back = v.screen_to_world(screen);
        assert_relative_eq!(back.0.x, world.0.x);
        assert_relative_eq!(back.0.y, world.0.y);

        let placement = v.placement(v.grid().tile_bounds(TileKey::new(0, 0)));
        assert_relative_eq!(placement.size.x, 512.0);
        assert_relative_eq!(placement.min.y, -128.0);
    }
}
