use crate::coordinates::ChunkPos;

use serde::{Deserialize, Serialize};

/// Identifies a region classification (what the world calls a biome).
pub type ClassId = u32;
/// Identifies a point feature that can be present in a chunk (what the world calls a structure).
pub type FeatureId = u32;

/// The height-like metrics measured once per world column.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum MetricKind {
    /// Highest non-air block.
    Surface,
    /// Highest block that is not fluid.
    OceanFloor,
    /// Highest block that blocks motion.
    MotionBlocking,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Surface,
        MetricKind::OceanFloor,
        MetricKind::MotionBlocking,
    ];
    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The expensive world-data algorithms, seen only through sampling.
///
/// All methods must be deterministic: the cache assumes any value it stores could be recomputed bit for bit.
///
/// `i32::MIN` heights and `u32::MAX` classifications are reserved to mark unsampled cells. The cache stores them as
/// `i32::MIN + 1` and `u32::MAX - 1`.
pub trait WorldSource: Send + Sync + 'static {
    fn sample_metric(&self, kind: MetricKind, world_x: i32, world_z: i32) -> i32;

    fn sample_classification(&self, world_x: i32, world_z: i32) -> ClassId;

    fn sample_features(&self, chunk: ChunkPos) -> Vec<FeatureId>;

    fn is_special_chunk(&self, chunk: ChunkPos) -> bool;
}
