use crate::scheduler::SchedulerConfig;
use crate::viewport::ViewConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use worldview_map::CacheConfig;
use worldview_renderer::RenderConfig;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub scheduler: SchedulerConfig,
    pub view: ViewConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl Config {
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let reader = std::fs::File::open(path)?;

        Ok(ron::de::from_reader(reader)?)
    }
}
