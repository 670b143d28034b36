//! Error types for the cluster snapshot.

use batchgrid_core::Resource;
use thiserror::Error;

/// Result type alias for snapshot operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while building or mutating a snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate queue: {0}")]
    DuplicateQueue(String),

    #[error("duplicate job: {0}")]
    DuplicateJob(String),

    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    #[error("duplicate task {task} in job {job}")]
    DuplicateTask { job: String, task: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("task {task} not found in job {job}")]
    TaskNotFound { job: String, task: String },

    #[error("task {task} is already placed on node {node}")]
    TaskAlreadyPlaced { task: String, node: String },

    #[error("task {0} is not placed on any node")]
    TaskNotPlaced(String),

    #[error("task {task} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        task: String,
        from: crate::types::TaskStatus,
        to: crate::types::TaskStatus,
    },

    #[error("node {node} has insufficient resources: requested <{requested}>, available <{available}>")]
    InsufficientResources {
        node: String,
        requested: Resource,
        available: Resource,
    },
}
