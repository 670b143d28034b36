//! Scheduler error types.

use batchgrid_core::{ConfigError, Resource};
use batchgrid_state::StateError;
use thiserror::Error;

/// Errors that can occur while configuring or running a scheduling cycle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("task {0} is not running on any node")]
    TaskNotPlaced(String),

    #[error("node {node} cannot fit task {task}: requested <{requested}>, future idle <{future_idle}>")]
    InsufficientResources {
        task: String,
        node: String,
        requested: Resource,
        future_idle: Resource,
    },

    #[error("eviction of task {task} rejected: {reason}")]
    EvictionRejected { task: String, reason: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
