//! A live, scrollable map of a procedurally computed world.
//!
//! The [`RenderTileScheduler`] keeps the visible area covered with [`RenderTile`]s. Tiles start coarse and are regenerated
//! at twice the detail until they reach the [`Viewport`]'s target resolution. Generation samples the world through the
//! [`DataTileCache`](worldview_map::DataTileCache), which keeps every sample it takes on disk.

mod config;
mod render_tile;
mod scheduler;
mod viewport;

pub use config::{Config, ConfigError};
pub use render_tile::{RenderTile, TileContext};
pub use scheduler::{
    load_order, next_refinement, radial_candidates, RenderTileScheduler, SchedulerConfig, SchedulerError,
    SchedulerStats,
};
pub use viewport::{ViewConfig, Viewport};
