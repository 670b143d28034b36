//! Prometheus text exposition format.

use crate::collector::{MetricsSnapshot, VICTIM_BUCKETS};

/// Render a metrics snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP batchgrid_preemption_attempts_total Node attempts that reached eviction.\n");
    out.push_str("# TYPE batchgrid_preemption_attempts_total counter\n");
    out.push_str(&format!(
        "batchgrid_preemption_attempts_total {}\n",
        snapshot.attempts
    ));

    out.push_str("# HELP batchgrid_preemption_victims Victims returned per victim selection.\n");
    out.push_str("# TYPE batchgrid_preemption_victims histogram\n");
    for (bound, count) in VICTIM_BUCKETS.iter().zip(&snapshot.victim_buckets) {
        out.push_str(&format!(
            "batchgrid_preemption_victims_bucket{{le=\"{bound}\"}} {count}\n"
        ));
    }
    let total = snapshot.victim_buckets.last().copied().unwrap_or(0);
    out.push_str(&format!(
        "batchgrid_preemption_victims_bucket{{le=\"+Inf\"}} {total}\n"
    ));
    out.push_str(&format!(
        "batchgrid_preemption_victims_sum {}\n",
        snapshot.victims_sum
    ));
    out.push_str(&format!(
        "batchgrid_preemption_victims_count {}\n",
        snapshot.victims_count
    ));

    out.push_str("# HELP batchgrid_preemption_evictions_total Committed evictions.\n");
    out.push_str("# TYPE batchgrid_preemption_evictions_total counter\n");
    out.push_str(&format!(
        "batchgrid_preemption_evictions_total {}\n",
        snapshot.evictions
    ));

    out.push_str("# HELP batchgrid_preemption_pipelines_total Committed speculative placements.\n");
    out.push_str("# TYPE batchgrid_preemption_pipelines_total counter\n");
    out.push_str(&format!(
        "batchgrid_preemption_pipelines_total {}\n",
        snapshot.pipelines
    ));

    out
}
