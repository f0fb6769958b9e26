use crate::coordinates::ChunkPos;
use crate::sampling::{ClassId, FeatureId, MetricKind, WorldSource};

/// Number of distinct classifications produced by [`ProceduralWorld`].
pub const PROCEDURAL_CLASS_COUNT: u32 = 8;
/// Number of distinct features produced by [`ProceduralWorld`].
pub const PROCEDURAL_FEATURE_COUNT: u32 = 5;

const SEA_LEVEL: i32 = 63;
const TERRAIN_CELL_LOG2: u32 = 6;
const CLIMATE_CELL_LOG2: u32 = 8;

/// A cheap deterministic world built from hashed value noise.
///
/// Used by the viewer binary and by tests that need plausible data without a real world generator.
#[derive(Clone, Copy, Debug)]
pub struct ProceduralWorld {
    seed: u64,
}

impl ProceduralWorld {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn hash(&self, salt: u64, x: i32, z: i32) -> u64 {
        let mut h = self.seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h ^= (x as u32 as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= (z as u32 as u64).wrapping_mul(0x94D0_49BB_1331_11EB).rotate_left(29);
        splitmix64(h)
    }

    /// Unit-interval noise with lattice spacing `1 << cell_log2`, bilinearly interpolated.
    fn value_noise(&self, salt: u64, x: i32, z: i32, cell_log2: u32) -> f64 {
        let cell = 1i32 << cell_log2;
        let (cx, cz) = (x.div_euclid(cell), z.div_euclid(cell));
        let fx = x.rem_euclid(cell) as f64 / cell as f64;
        let fz = z.rem_euclid(cell) as f64 / cell as f64;
        let corner = |dx: i32, dz: i32| (self.hash(salt, cx + dx, cz + dz) >> 11) as f64 / (1u64 << 53) as f64;
        let top = lerp(corner(0, 0), corner(1, 0), smooth(fx));
        let bottom = lerp(corner(0, 1), corner(1, 1), smooth(fx));
        lerp(top, bottom, smooth(fz))
    }

    fn terrain_height(&self, x: i32, z: i32) -> i32 {
        let broad = self.value_noise(1, x, z, TERRAIN_CELL_LOG2 + 2);
        let detail = self.value_noise(2, x, z, TERRAIN_CELL_LOG2);
        (20.0 + broad * 120.0 + detail * 24.0) as i32
    }
}

impl WorldSource for ProceduralWorld {
    fn sample_metric(&self, kind: MetricKind, world_x: i32, world_z: i32) -> i32 {
        let terrain = self.terrain_height(world_x, world_z);
        match kind {
            MetricKind::OceanFloor => terrain,
            MetricKind::Surface => terrain.max(SEA_LEVEL),
            MetricKind::MotionBlocking => {
                let canopy = (self.hash(3, world_x, world_z) % 4) as i32;
                terrain.max(SEA_LEVEL) + if terrain > SEA_LEVEL { canopy } else { 0 }
            }
        }
    }

    fn sample_classification(&self, world_x: i32, world_z: i32) -> ClassId {
        if self.terrain_height(world_x, world_z) < SEA_LEVEL {
            return 0;
        }
        let climate = self.value_noise(4, world_x, world_z, CLIMATE_CELL_LOG2);
        1 + ((climate * (PROCEDURAL_CLASS_COUNT - 1) as f64) as u32).min(PROCEDURAL_CLASS_COUNT - 2)
    }

    fn sample_features(&self, chunk: ChunkPos) -> Vec<FeatureId> {
        let h = self.hash(5, chunk.x, chunk.z);
        if h % 23 == 0 {
            vec![((h >> 8) % PROCEDURAL_FEATURE_COUNT as u64) as FeatureId]
        } else {
            Vec::new()
        }
    }

    fn is_special_chunk(&self, chunk: ChunkPos) -> bool {
        self.hash(6, chunk.x, chunk.z) % 10 == 0
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn smooth(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sampling_is_deterministic() {
        let a = ProceduralWorld::new(42);
        let b = ProceduralWorld::new(42);
        for (x, z) in [(0, 0), (-17, 300), (1024, -4096)] {
            for kind in MetricKind::ALL {
                assert_eq!(a.sample_metric(kind, x, z), b.sample_metric(kind, x, z));
            }
            assert_eq!(a.sample_classification(x, z), b.sample_classification(x, z));
        }
        let chunk = ChunkPos::new(-3, 9);
        assert_eq!(a.sample_features(chunk), b.sample_features(chunk));
        assert_eq!(a.is_special_chunk(chunk), b.is_special_chunk(chunk));
    }

    #[test]
    fn classes_stay_in_range() {
        let world = ProceduralWorld::new(7);
        for x in (-2000..2000).step_by(97) {
            for z in (-2000..2000).step_by(89) {
                assert!(world.sample_classification(x, z) < PROCEDURAL_CLASS_COUNT);
            }
        }
    }

    #[test]
    fn surface_is_never_below_ocean_floor() {
        let world = ProceduralWorld::new(1);
        for x in (-500..500).step_by(13) {
            let floor = world.sample_metric(MetricKind::OceanFloor, x, x / 2);
            let surface = world.sample_metric(MetricKind::Surface, x, x / 2);
            assert!(surface >= floor);
        }
    }
}
