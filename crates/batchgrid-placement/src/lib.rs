//! BatchGrid node candidate pipeline.
//!
//! Given a task and the cluster's nodes, produce the nodes worth trying,
//! most promising first. The pipeline has three stages, each driven by
//! caller-supplied callbacks so the scheduler's plugins decide *what*
//! is feasible and *how* nodes score:
//!
//! 1. **`predicate_nodes`** — drop infeasible nodes
//! 2. **`prioritize_nodes`** — batch + per-node map scores, reduced per plugin
//! 3. **`sort_nodes`** — descending score, node name breaks ties
//!
//! # Components
//!
//! - **`pipeline`** — the three stages above
//! - **`predicates`** — stock feasibility checks (readiness, selectors, capacity)
//! - **`scorer`** — stock scoring math (least-requested, bin-packing, affinity)

pub mod pipeline;
pub mod predicates;
pub mod scorer;

pub use pipeline::{
    FitError, FitErrors, HostScore, NodeScore, PluginScores, predicate_nodes, prioritize_nodes,
    sort_nodes,
};
pub use scorer::{
    ScoringWeights, affinity_score, binpack_score, least_requested_score, normalize_scores, score_node,
};
