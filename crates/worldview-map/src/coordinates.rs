use crate::units::*;

use itertools::iproduct;
use std::fmt;
use worldview_core::geometry::Rect;
use worldview_core::glam::{DVec2, IVec2};
use worldview_core::static_assertions::const_assert_eq;

/// Edge length of a chunk (one cached cell) in world blocks.
pub const CHUNK_EDGE: i32 = 16;
pub const CHUNK_EDGE_LOG2: u32 = 4;
/// Number of columns in one chunk.
pub const CHUNK_AREA: usize = (CHUNK_EDGE * CHUNK_EDGE) as usize;

/// Classification is stored at quarter resolution: one entry per 4x4 column group.
pub const QUART_EDGE_LOG2: u32 = 2;
pub const QUARTS_PER_CHUNK_EDGE: i32 = CHUNK_EDGE >> QUART_EDGE_LOG2;
pub const QUART_AREA: usize = (QUARTS_PER_CHUNK_EDGE * QUARTS_PER_CHUNK_EDGE) as usize;

const_assert_eq!(CHUNK_EDGE, 1 << CHUNK_EDGE_LOG2);
const_assert_eq!(QUART_AREA, 16);

/// The position of one chunk, in chunk units.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk that contains the world column `(x, z)`.
    #[inline]
    pub fn containing(world: WorldUnits<IVec2>) -> Self {
        let WorldUnits(p) = world;
        Self::new(p.x >> CHUNK_EDGE_LOG2, p.y >> CHUNK_EDGE_LOG2)
    }

    #[inline]
    pub fn from_world(world_x: i32, world_z: i32) -> Self {
        Self::containing(WorldUnits(IVec2::new(world_x, world_z)))
    }

    pub fn min_world(&self) -> WorldUnits<IVec2> {
        WorldUnits(IVec2::new(self.x << CHUNK_EDGE_LOG2, self.z << CHUNK_EDGE_LOG2))
    }

    pub fn extent(&self) -> WorldUnits<Rect> {
        self.min_world().map(|min| Rect::square(min, CHUNK_EDGE))
    }

    /// Index of the world column `(x, z)` inside its chunk's flat `CHUNK_AREA` buffer.
    #[inline]
    pub fn column_index(world_x: i32, world_z: i32) -> usize {
        let x = world_x & (CHUNK_EDGE - 1);
        let z = world_z & (CHUNK_EDGE - 1);
        (x + z * CHUNK_EDGE) as usize
    }

    /// Index of the world column `(x, z)` inside its chunk's quarter-resolution buffer.
    #[inline]
    pub fn quart_index(world_x: i32, world_z: i32) -> usize {
        let qx = (world_x & (CHUNK_EDGE - 1)) >> QUART_EDGE_LOG2;
        let qz = (world_z & (CHUNK_EDGE - 1)) >> QUART_EDGE_LOG2;
        (qx + qz * QUARTS_PER_CHUNK_EDGE) as usize
    }

    /// The world column a quarter cell is sampled at: its minimum corner.
    pub fn quart_sample_column(&self, quart_index: usize) -> WorldUnits<IVec2> {
        let i = quart_index as i32;
        let local = IVec2::new(i % QUARTS_PER_CHUNK_EDGE, i / QUARTS_PER_CHUNK_EDGE) * (1 << QUART_EDGE_LOG2);
        self.min_world().map(|min| min + local)
    }

    /// The sign bit is flipped so that sled's lexicographic byte order agrees with signed order.
    pub fn into_sled_key(&self) -> [u8; 8] {
        let mut bytes = [0; 8];
        bytes[..4].copy_from_slice(&((self.x as u32) ^ 0x8000_0000).to_be_bytes());
        bytes[4..].copy_from_slice(&((self.z as u32) ^ 0x8000_0000).to_be_bytes());
        bytes
    }

    pub fn from_sled_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 8 {
            return None;
        }
        let mut x = [0; 4];
        let mut z = [0; 4];
        x.copy_from_slice(&bytes[..4]);
        z.copy_from_slice(&bytes[4..]);
        Some(Self::new(
            (u32::from_be_bytes(x) ^ 0x8000_0000) as i32,
            (u32::from_be_bytes(z) ^ 0x8000_0000) as i32,
        ))
    }

    /// The smallest range of chunks that covers `extent`.
    pub fn covering(extent: WorldUnits<Rect>) -> ChunkUnits<Rect> {
        let WorldUnits(extent) = extent;
        if extent.is_empty() {
            return ChunkUnits(Rect::from_min_and_shape(IVec2::ZERO, IVec2::ZERO));
        }
        let min = extent.minimum >> CHUNK_EDGE_LOG2 as i32;
        let max = (extent.least_upper_bound() - IVec2::ONE) >> CHUNK_EDGE_LOG2 as i32;
        ChunkUnits(Rect::from_min_and_lub(min, max + IVec2::ONE))
    }

    /// All chunks that intersect `extent`, in row-major (Z then X) order.
    pub fn chunks_in(extent: WorldUnits<Rect>) -> impl Iterator<Item = ChunkPos> {
        let ChunkUnits(chunks) = Self::covering(extent);
        let (min, lub) = (chunks.minimum, chunks.least_upper_bound());
        iproduct!(min.y..lub.y, min.x..lub.x).map(|(z, x)| ChunkPos::new(x, z))
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Packs a `(tile_x, tile_z)` pair into one integer.
///
/// The upper 32 bits hold `tile_x` and the lower 32 bits hold `tile_z`, both as two's complement, so every pair maps to a
/// distinct key and the mapping is reversible.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TileKey(u64);

impl TileKey {
    #[inline]
    pub const fn new(tile_x: i32, tile_z: i32) -> Self {
        Self(((tile_x as u32 as u64) << 32) | (tile_z as u32 as u64))
    }

    #[inline]
    pub const fn x(&self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    #[inline]
    pub const fn z(&self) -> i32 {
        self.0 as u32 as i32
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u64 {
        self.0
    }

    pub fn coordinates(&self) -> TileUnits<IVec2> {
        TileUnits(IVec2::new(self.x(), self.z()))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile({}, {})", self.x(), self.z())
    }
}

/// Converts between world blocks and tiles of a fixed edge length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TileGrid {
    tile_size: i32,
}

impl TileGrid {
    pub fn new(tile_size: u32) -> Self {
        assert!(tile_size > 0, "tile size must be positive");
        Self {
            tile_size: tile_size as i32,
        }
    }

    #[inline]
    pub fn tile_size(&self) -> i32 {
        self.tile_size
    }

    /// Floor division, so negative world coordinates land in the tile to their left.
    #[inline]
    pub fn world_to_tile(&self, world: WorldUnits<IVec2>) -> TileUnits<IVec2> {
        let s = self.tile_size;
        TileUnits(IVec2::new(world.0.x.div_euclid(s), world.0.y.div_euclid(s)))
    }

    #[inline]
    pub fn tile_to_world(&self, tile: TileUnits<IVec2>) -> WorldUnits<IVec2> {
        WorldUnits(tile.0 * self.tile_size)
    }

    pub fn key_at(&self, world: WorldUnits<IVec2>) -> TileKey {
        let TileUnits(t) = self.world_to_tile(world);
        TileKey::new(t.x, t.y)
    }

    /// World position of the minimum corner of the tile at `key`.
    pub fn tile_min(&self, key: TileKey) -> WorldUnits<IVec2> {
        self.tile_to_world(key.coordinates())
    }

    pub fn tile_bounds(&self, key: TileKey) -> WorldUnits<Rect> {
        self.tile_min(key).map(|min| Rect::square(min, self.tile_size))
    }

    pub fn tile_center(&self, key: TileKey) -> WorldUnits<DVec2> {
        self.tile_bounds(key).map(|b| b.center())
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

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn tile_key_unpacks_to_its_coordinates(x in any::<i32>(), z in any::<i32>()) {
            let key = TileKey::new(x, z);
            prop_assert_eq!(key.x(), x);
            prop_assert_eq!(key.z(), z);
            prop_assert_eq!(TileKey::from_bits(key.into_bits()), key);
        }

        #[test]
        fn chunk_sled_key_preserves_position(x in any::<i32>(), z in any::<i32>()) {
            let pos = ChunkPos::new(x, z);
            prop_assert_eq!(ChunkPos::from_sled_key(&pos.into_sled_key()), Some(pos));
        }
    }

    #[test]
    fn sled_key_order_matches_signed_order() {
        let a = ChunkPos::new(-1, 5).into_sled_key();
        let b = ChunkPos::new(0, -5).into_sled_key();
        let c = ChunkPos::new(0, 3).into_sled_key();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn negative_world_coordinates_floor_into_tiles() {
        let grid = TileGrid::new(256);
        assert_eq!(grid.key_at(WorldUnits(IVec2::new(-1, 0))), TileKey::new(-1, 0));
        assert_eq!(grid.key_at(WorldUnits(IVec2::new(255, 256))), TileKey::new(0, 1));
        assert_eq!(grid.tile_min(TileKey::new(-2, 3)), WorldUnits(IVec2::new(-512, 768)));
    }

    #[test]
    fn chunk_of_negative_column() {
        assert_eq!(ChunkPos::from_world(-1, -16), ChunkPos::new(-1, -1));
        assert_eq!(ChunkPos::from_world(-17, 15), ChunkPos::new(-2, 0));
        assert_eq!(ChunkPos::column_index(-1, -1), CHUNK_AREA - 1);
        assert_eq!(ChunkPos::quart_index(5, 13), 1 + 3 * 4);
    }

    #[test]
    fn quart_sample_column_is_min_corner() {
        let pos = ChunkPos::new(-1, 2);
        let WorldUnits(p) = pos.quart_sample_column(ChunkPos::quart_index(-3, 45));
        assert_eq!(p, IVec2::new(-4, 44));
    }

    #[test]
    fn chunks_covering_a_tile() {
        let grid = TileGrid::new(64);
        let chunks: Vec<_> = ChunkPos::chunks_in(grid.tile_bounds(TileKey::new(-1, 0))).collect();
        assert_eq!(chunks.len(), 16);
        assert_eq!(chunks[0], ChunkPos::new(-4, 0));
        assert_eq!(chunks[15], ChunkPos::new(-1, 3));
    }

    #[test]
    fn covering_rounds_outward() {
        let extent = WorldUnits(Rect::from_min_and_lub(IVec2::new(-1, 15), IVec2::new(17, 16)));
        let ChunkUnits(chunks) = ChunkPos::covering(extent);
        assert_eq!(chunks.minimum, IVec2::new(-1, 0));
        assert_eq!(chunks.least_upper_bound(), IVec2::new(2, 1));
        assert_eq!(ChunkPos::chunks_in(extent).count(), 3);
        let empty = WorldUnits(Rect::square(IVec2::new(5, 5), 0));
        assert_eq!(ChunkPos::chunks_in(empty).count(), 0);
    }
}
