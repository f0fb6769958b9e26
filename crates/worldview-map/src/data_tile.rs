use crate::coordinates::{ChunkPos, CHUNK_AREA, QUART_AREA};
use crate::sampling::{ClassId, FeatureId, MetricKind, WorldSource};
use crate::units::WorldUnits;
use crate::DbError;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rkyv::{Archive, Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Sentinel for a metric column that has not been sampled yet.
pub const METRIC_UNKNOWN: i32 = i32::MIN;
/// Sentinel for a quarter cell whose classification has not been sampled yet.
pub const CLASS_UNKNOWN: ClassId = ClassId::MAX;

type MetricColumns = Box<[i32; CHUNK_AREA]>;

/// The cached samples for one chunk.
///
/// Every field fills lazily and independently. Each lazy field is guarded by its own lock, so a thread filling the
/// classification grid never waits for a thread filling a heightmap of the same chunk. A field is sampled from the
/// [`WorldSource`] at most once: readers take the fast shared path, and only on a miss do they take the exclusive lock and
/// check again before sampling.
pub struct DataTile {
    pos: ChunkPos,
    special: bool,
    metrics: [RwLock<MetricColumns>; MetricKind::COUNT],
    classification: RwLock<[ClassId; QUART_AREA]>,
    features: RwLock<Option<Vec<FeatureId>>>,
    dirty: AtomicBool,
    /// Held while a snapshot of this tile is being written, so writes to the same key land in snapshot order.
    persist_lock: Mutex<()>,
}

impl DataTile {
    /// A tile with nothing sampled yet. Only the special flag is computed up front.
    pub fn new(pos: ChunkPos, source: &dyn WorldSource) -> Self {
        Self {
            pos,
            special: source.is_special_chunk(pos),
            metrics: [(); MetricKind::COUNT].map(|_| RwLock::new(Box::new([METRIC_UNKNOWN; CHUNK_AREA]))),
            classification: RwLock::new([CLASS_UNKNOWN; QUART_AREA]),
            features: RwLock::new(None),
            dirty: AtomicBool::new(false),
            persist_lock: Mutex::new(()),
        }
    }

    /// Rebuilds a tile from its persisted record. The result starts clean.
    pub fn from_record(pos: ChunkPos, record: DataTileRecord) -> Result<Self, DbError> {
        let DataTileRecord {
            metrics,
            classification,
            features,
            special,
        } = record;

        if metrics.len() != MetricKind::COUNT {
            return Err(DbError::Corrupt(format!(
                "cell {} has {} metric arrays, expected {}",
                pos,
                metrics.len(),
                MetricKind::COUNT
            )));
        }
        let mut metric_arrays = Vec::with_capacity(MetricKind::COUNT);
        for (i, columns) in metrics.into_iter().enumerate() {
            let columns: MetricColumns = columns.into_boxed_slice().try_into().map_err(|b: Box<[i32]>| {
                DbError::Corrupt(format!(
                    "cell {} metric {} has {} columns, expected {}",
                    pos,
                    i,
                    b.len(),
                    CHUNK_AREA
                ))
            })?;
            metric_arrays.push(RwLock::new(columns));
        }
        let metrics: [RwLock<MetricColumns>; MetricKind::COUNT] = metric_arrays
            .try_into()
            .map_err(|_| DbError::Corrupt(format!("cell {} metric count changed", pos)))?;

        let classification: [ClassId; QUART_AREA] =
            classification.as_slice().try_into().map_err(|_| {
                DbError::Corrupt(format!(
                    "cell {} has {} classification entries, expected {}",
                    pos,
                    classification.len(),
                    QUART_AREA
                ))
            })?;

        Ok(Self {
            pos,
            special,
            metrics,
            classification: RwLock::new(classification),
            features: RwLock::new(features),
            dirty: AtomicBool::new(false),
            persist_lock: Mutex::new(()),
        })
    }

    /// Copies every field into a plain record for serialization.
    pub fn to_record(&self) -> DataTileRecord {
        DataTileRecord {
            metrics: self.metrics.iter().map(|m| m.read().to_vec()).collect(),
            classification: self.classification.read().to_vec(),
            features: self.features.read().clone(),
            special: self.special,
        }
    }

    #[inline]
    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        self.special
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub(crate) fn lock_for_persist(&self) -> MutexGuard<'_, ()> {
        self.persist_lock.lock()
    }

    /// The `kind` metric of world column `(world_x, world_z)`, which must lie in this chunk.
    pub fn metric(&self, kind: MetricKind, world_x: i32, world_z: i32, source: &dyn WorldSource) -> i32 {
        debug_assert_eq!(ChunkPos::from_world(world_x, world_z), self.pos);
        let i = ChunkPos::column_index(world_x, world_z);
        let value = self.metrics[kind.index()].read()[i];
        if value != METRIC_UNKNOWN {
            return value;
        }
        self.fill_metric(kind, i, world_x, world_z, source)
    }

    #[cold]
    fn fill_metric(&self, kind: MetricKind, i: usize, world_x: i32, world_z: i32, source: &dyn WorldSource) -> i32 {
        let mut columns = self.metrics[kind.index()].write();
        if columns[i] != METRIC_UNKNOWN {
            // Another thread sampled this column while we waited for the lock.
            return columns[i];
        }
        // The sentinel is reserved, so the lowest possible height is stored one above it.
        let value = source.sample_metric(kind, world_x, world_z).max(METRIC_UNKNOWN + 1);
        columns[i] = value;
        self.mark_dirty();
        value
    }

    /// The classification of the quarter cell containing world column `(world_x, world_z)`.
    pub fn classification(&self, world_x: i32, world_z: i32, source: &dyn WorldSource) -> ClassId {
        debug_assert_eq!(ChunkPos::from_world(world_x, world_z), self.pos);
        let i = ChunkPos::quart_index(world_x, world_z);
        let class = self.classification.read()[i];
        if class != CLASS_UNKNOWN {
            return class;
        }
        self.fill_classification(i, source)
    }

    #[cold]
    fn fill_classification(&self, i: usize, source: &dyn WorldSource) -> ClassId {
        let mut grid = self.classification.write();
        if grid[i] != CLASS_UNKNOWN {
            return grid[i];
        }
        let WorldUnits(column) = self.pos.quart_sample_column(i);
        let class = source.sample_classification(column.x, column.y).min(CLASS_UNKNOWN - 1);
        grid[i] = class;
        self.mark_dirty();
        class
    }

    /// The features present in this chunk, fetched from `source` the first time they are asked for.
    pub fn features(&self, source: &dyn WorldSource) -> Vec<FeatureId> {
        if let Some(features) = self.features.read().as_ref() {
            return features.clone();
        }
        let mut slot = self.features.write();
        if let Some(features) = slot.as_ref() {
            return features.clone();
        }
        let mut features = source.sample_features(self.pos);
        features.sort_unstable();
        features.dedup();
        *slot = Some(features.clone());
        self.mark_dirty();
        features
    }

    /// The features, if they have been fetched already.
    pub fn cached_features(&self) -> Option<Vec<FeatureId>> {
        self.features.read().clone()
    }
}

/// The persisted form of a [`DataTile`].
#[derive(Archive, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[archive(check_bytes)]
pub struct DataTileRecord {
    /// One array of `CHUNK_AREA` columns per [`MetricKind`], in `MetricKind::ALL` order.
    pub metrics: Vec<Vec<i32>>,
    pub classification: Vec<ClassId>,
    pub features: Option<Vec<FeatureId>>,
    pub special: bool,
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
    use crate::database::{decode_record, encode_record};
    use crate::procedural::ProceduralWorld;

    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts every call that reaches the underlying world.
    struct CountingWorld {
        inner: ProceduralWorld,
        metric_calls: AtomicUsize,
        class_calls: AtomicUsize,
        feature_calls: AtomicUsize,
    }

    impl CountingWorld {
        fn new() -> Self {
            Self {
                inner: ProceduralWorld::new(3),
                metric_calls: AtomicUsize::new(0),
                class_calls: AtomicUsize::new(0),
                feature_calls: AtomicUsize::new(0),
            }
        }
    }

    impl WorldSource for CountingWorld {
        fn sample_metric(&self, kind: MetricKind, x: i32, z: i32) -> i32 {
            self.metric_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sample_metric(kind, x, z)
        }

        fn sample_classification(&self, x: i32, z: i32) -> ClassId {
            self.class_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sample_classification(x, z)
        }

        fn sample_features(&self, _chunk: ChunkPos) -> Vec<FeatureId> {
            self.feature_calls.fetch_add(1, Ordering::SeqCst);
            vec![4, 1, 4]
        }

        fn is_special_chunk(&self, chunk: ChunkPos) -> bool {
            self.inner.is_special_chunk(chunk)
        }
    }

    #[test]
    fn concurrent_reads_sample_once() {
        let world = CountingWorld::new();
        let tile = DataTile::new(ChunkPos::new(2, -1), &world);
        assert!(!tile.is_dirty());

        let (tile_ref, world_ref) = (&tile, &world);
        let results: Vec<_> = crossbeam::scope(move |scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move |_| {
                        (
                            tile_ref.metric(MetricKind::Surface, 37, -5, world_ref),
                            tile_ref.classification(37, -5, world_ref),
                            tile_ref.features(world_ref),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
        .unwrap();

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0].2, vec![1, 4]);
        assert_eq!(world.metric_calls.load(Ordering::SeqCst), 1);
        assert_eq!(world.class_calls.load(Ordering::SeqCst), 1);
        assert_eq!(world.feature_calls.load(Ordering::SeqCst), 1);
        assert!(tile.is_dirty());
    }

    #[test]
    fn classification_is_shared_by_a_quarter_cell() {
        let world = CountingWorld::new();
        let tile = DataTile::new(ChunkPos::new(0, 0), &world);
        let a = tile.classification(4, 8, &world);
        let b = tile.classification(7, 11, &world);
        assert_eq!(a, b);
        assert_eq!(world.class_calls.load(Ordering::SeqCst), 1);
        tile.classification(8, 8, &world);
        assert_eq!(world.class_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn take_dirty_clears_flag() {
        let world = CountingWorld::new();
        let tile = DataTile::new(ChunkPos::new(0, 0), &world);
        tile.metric(MetricKind::OceanFloor, 1, 1, &world);
        assert!(tile.take_dirty());
        assert!(!tile.take_dirty());
        // Cached reads do not dirty the tile again.
        tile.metric(MetricKind::OceanFloor, 1, 1, &world);
        assert!(!tile.is_dirty());
    }

    /// Returns the sentinel values as if they were real data.
    struct ExtremeWorld {
        calls: AtomicUsize,
    }

    impl WorldSource for ExtremeWorld {
        fn sample_metric(&self, _: MetricKind, _: i32, _: i32) -> i32 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            i32::MIN
        }

        fn sample_classification(&self, _: i32, _: i32) -> ClassId {
            self.calls.fetch_add(1, Ordering::SeqCst);
            u32::MAX
        }

        fn sample_features(&self, _: ChunkPos) -> Vec<FeatureId> {
            Vec::new()
        }

        fn is_special_chunk(&self, _: ChunkPos) -> bool {
            false
        }
    }

    #[test]
    fn extreme_samples_are_still_cached() {
        let world = ExtremeWorld {
            calls: AtomicUsize::new(0),
        };
        let tile = DataTile::new(ChunkPos::new(0, 0), &world);
        for _ in 0..3 {
            assert_eq!(tile.metric(MetricKind::Surface, 3, 3, &world), i32::MIN + 1);
            assert_eq!(tile.classification(3, 3, &world), u32::MAX - 1);
        }
        assert_eq!(world.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn record_with_wrong_shape_is_corrupt() {
        let world = CountingWorld::new();
        let mut record = DataTile::new(ChunkPos::new(0, 0), &world).to_record();
        record.metrics[1].pop();
        assert!(matches!(
            DataTile::from_record(ChunkPos::new(0, 0), record),
            Err(DbError::Corrupt(_))
        ));
    }

    fn arb_record() -> impl Strategy<Value = DataTileRecord> {
        (
            prop::collection::vec(
                prop::collection::vec(prop_oneof![Just(METRIC_UNKNOWN), -64..320i32], CHUNK_AREA),
                MetricKind::COUNT,
            ),
            prop::collection::vec(prop_oneof![Just(CLASS_UNKNOWN), 0..64u32], QUART_AREA),
            prop::option::of(prop::collection::vec(any::<u32>(), 0..6)),
            any::<bool>(),
        )
            .prop_map(|(metrics, classification, features, special)| DataTileRecord {
                metrics,
                classification,
                features,
                special,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn record_survives_disk_round_trip(record in arb_record()) {
            let pos = ChunkPos::new(-7, 12);
            let bytes = encode_record(&record).unwrap();
            let decoded: DataTileRecord = decode_record(&bytes).unwrap();
            let tile = DataTile::from_record(pos, decoded).unwrap();
            prop_assert_eq!(tile.to_record(), record);
            prop_assert!(!tile.is_dirty());
        }
    }
}
