//! batchgrid-core — shared building blocks for the BatchGrid scheduler.
//!
//! - **`resource`** — multi-dimensional resource vectors
//! - **`types`** — identifiers shared by every crate
//! - **`config`** — scheduler configuration (actions, plugin tiers)

pub mod config;
pub mod error;
pub mod resource;
pub mod types;

pub use config::{Hook, PluginArguments, PluginOption, SchedulerConfig, Tier};
pub use error::{ConfigError, ResourceError};
pub use resource::{CPU, MEMORY, Resource};
pub use types::*;
