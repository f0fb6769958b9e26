use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory of the sled database.
    pub db_path: PathBuf,
    /// Prefix of the trees that belong to this map.
    pub map_name: String,
    pub io_threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("worldview.db"),
            map_name: "overworld".to_owned(),
            io_threads: 2,
        }
    }
}
