//! Scheduling framework: sessions, statements, and policy dispatch.
//!
//! # Components
//!
//! - **`policy`** — hook types, per-tier registration, cross-tier dispatch
//! - **`session`** — per-cycle owner of the snapshot and the cycle outcome
//! - **`statement`** — evict/pipeline log with commit and discard

pub mod policy;
pub mod session;
pub mod statement;

pub use policy::{
    BatchNodeOrderFn, JobOrderFn, JobPipelinedFn, NodeOrderMapFn, NodeOrderReduceFn,
    Policies, PolicyTier, PredicateFn, PreemptableFn, TaskOrderFn, ValidateFn, ValidateResult,
};
pub use session::{CommittedOperation, CycleOutcome, Evictor, NoopEvictor, Session};
pub use statement::Statement;
