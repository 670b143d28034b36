//! batchgrid-state — the cluster snapshot consumed by a scheduling cycle.
//!
//! A [`ClusterSnapshot`] is built once per cycle (usually from a JSON
//! document produced by the cluster synchronization layer) and holds
//! queues, jobs with their tasks, and nodes with per-node resource
//! accounting.
//!
//! # Architecture
//!
//! Every task lives in its job's task map, indexed by status. Tasks
//! placed on a node are mirrored into that node's task map so victim
//! candidates can be enumerated per node. The snapshot's task mutators
//! keep both copies in step; callers never edit one side alone.
//!
//! ```text
//! ClusterSnapshot
//!   ├── queues: QueueId → QueueInfo
//!   ├── jobs:   JobId → JobInfo ── tasks (by id, by status)
//!   └── nodes:  NodeName → NodeInfo ── placed tasks, idle/used/releasing/pipelined
//! ```

pub mod error;
pub mod node;
pub mod snapshot;
pub mod types;

pub use error::{StateError, StateResult};
pub use node::NodeInfo;
pub use snapshot::{ClusterSnapshot, JobSpec, NodeSpec, SnapshotDocument};
pub use types::*;
