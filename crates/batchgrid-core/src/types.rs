//! Identifiers shared across BatchGrid crates.

/// Unique identifier for a task (namespace-scoped, e.g. `default/train-0`).
pub type TaskId = String;

/// Unique identifier for a job.
pub type JobId = String;

/// Unique identifier for a queue.
pub type QueueId = String;

/// Name of a node in the cluster.
pub type NodeName = String;
