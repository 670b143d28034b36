//! batchgrid-metrics — observability for the preemption pipeline.
//!
//! # Architecture
//!
//! ```text
//! PreemptionMetrics (Arc, shared with the scheduler)
//!   ├── register_attempt()   ← once per validated node attempt
//!   ├── observe_victims(n)   ← once per victim-selection result
//!   ├── record_commit(e, p)  ← committed evictions / pipelines
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{MetricsSnapshot, PreemptionMetrics, VICTIM_BUCKETS};
pub use prometheus::render_prometheus;
