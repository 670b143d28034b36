//! batchgrid-scheduler — one scheduling cycle over a cluster snapshot.
//!
//! The scheduler opens a [`Session`] over a [`ClusterSnapshot`], runs the
//! configured actions against it, and returns the committed operations.
//! Policy (ordering, feasibility, scoring, victim selection) is supplied
//! by plugins through narrow function hooks; the actions only drive
//! control flow.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── Policies (built once from config via PluginRegistry)
//!   └── run_cycle(snapshot)
//!         └── Session
//!               ├── ClusterSnapshot (exclusively owned for the cycle)
//!               ├── Statement (evict / pipeline, then commit or discard)
//!               └── actions: preempt
//! ```
//!
//! [`ClusterSnapshot`]: batchgrid_state::ClusterSnapshot

pub mod actions;
pub mod error;
pub mod framework;
pub mod plugins;
pub mod queue;
pub mod scheduler;

pub use actions::preempt::{VictimError, try_preempt, validate_victims};
pub use actions::{Action, PreemptAction, new_action};
pub use error::{SchedulerError, SchedulerResult};
pub use framework::{
    CommittedOperation, CycleOutcome, Evictor, NoopEvictor, Policies, PolicyTier, Session,
    Statement, ValidateResult,
};
pub use plugins::{Plugin, PluginRegistry};
pub use queue::PriorityQueue;
pub use scheduler::Scheduler;
