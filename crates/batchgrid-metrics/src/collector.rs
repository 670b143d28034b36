//! Preemption metrics collector.
//!
//! Lock-free: every counter is an atomic, so a single `Arc<PreemptionMetrics>`
//! can be shared by the scheduling loop and whatever scrapes it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

/// Upper bounds of the victims-per-selection histogram (`+Inf` is implicit).
pub const VICTIM_BUCKETS: [u64; 5] = [0, 1, 2, 5, 10];

/// Counters for the preemption action.
#[derive(Debug, Default)]
pub struct PreemptionMetrics {
    attempts: AtomicU64,
    /// Cumulative-style buckets are computed on snapshot; these are per-bucket.
    victim_buckets: [AtomicU64; VICTIM_BUCKETS.len() + 1],
    victims_sum: AtomicU64,
    victims_count: AtomicU64,
    evictions: AtomicU64,
    pipelines: AtomicU64,
}

/// Point-in-time copy of [`PreemptionMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    /// Cumulative counts, one per entry of [`VICTIM_BUCKETS`] plus `+Inf`.
    pub victim_buckets: Vec<u64>,
    pub victims_sum: u64,
    pub victims_count: u64,
    pub evictions: u64,
    pub pipelines: u64,
}

impl PreemptionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node attempt passed victim validation and eviction began.
    pub fn register_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Victim selection returned `victims` candidates.
    pub fn observe_victims(&self, victims: usize) {
        let n = victims as u64;
        let idx = VICTIM_BUCKETS
            .iter()
            .position(|bound| n <= *bound)
            .unwrap_or(VICTIM_BUCKETS.len());
        self.victim_buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.victims_sum.fetch_add(n, Ordering::Relaxed);
        self.victims_count.fetch_add(1, Ordering::Relaxed);
    }

    /// A statement committed `evictions` evictions and `pipelines` placements.
    pub fn record_commit(&self, evictions: usize, pipelines: usize) {
        self.evictions.fetch_add(evictions as u64, Ordering::Relaxed);
        self.pipelines.fetch_add(pipelines as u64, Ordering::Relaxed);
        debug!(evictions, pipelines, "recorded committed preemption");
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut cumulative = 0;
        let victim_buckets = self
            .victim_buckets
            .iter()
            .map(|b| {
                cumulative += b.load(Ordering::Relaxed);
                cumulative
            })
            .collect();

        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            victim_buckets,
            victims_sum: self.victims_sum.load(Ordering::Relaxed),
            victims_count: self.victims_count.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pipelines: self.pipelines.load(Ordering::Relaxed),
        }
    }
}
