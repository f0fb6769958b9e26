pub mod cancel;
pub mod geometry;
pub mod pool;

use ahash::{AHashMap, AHashSet};
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;
pub type SmallKeyHashSet<K> = AHashSet<K>;

// Re-exports.
pub use approx;
pub use glam;
pub use static_assertions;
