//! Node scoring for placement decisions.
//!
//! Evaluates candidate nodes using a weighted combination of:
//! - **Least-requested**: prefer nodes with the most capacity left after placement
//! - **Bin-packing** (best-fit): prefer nodes that will be most full after placement
//! - **Affinity**: prefer nodes whose labels match the task's preferences
//!
//! Every component is on a 0.0..=100.0 scale. "Committed" capacity counts
//! pipelined tasks as placed and releasing tasks as gone, i.e. it is
//! `allocatable − future_idle`.

use batchgrid_core::Resource;
use batchgrid_state::{NodeInfo, TaskInfo};

use crate::pipeline::HostScore;

/// Weights for the scoring components.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub least_requested: f64,
    pub binpack: f64,
    pub affinity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            least_requested: 1.0,
            binpack: 0.0,
            affinity: 1.0,
        }
    }
}

fn committed(node: &NodeInfo) -> Resource {
    let mut committed = node.allocatable().clone();
    committed.sub(&node.future_idle());
    committed
}

/// Average share of capacity left free once `task` lands, over the
/// node's allocatable dimensions.
pub fn least_requested_score(task: &TaskInfo, node: &NodeInfo) -> f64 {
    let mut requested = committed(node);
    requested.add(&task.init_resreq);

    let shares: Vec<f64> = node
        .allocatable()
        .dimensions()
        .filter_map(|dim| requested.ratio(node.allocatable(), dim))
        .map(|used| (1.0 - used).max(0.0) * 100.0)
        .collect();

    if shares.is_empty() {
        return 50.0;
    }
    shares.iter().sum::<f64>() / shares.len() as f64
}

/// Average fullness after placement over the dimensions the task asks
/// for. A dimension pushed past capacity scores the whole node zero.
pub fn binpack_score(task: &TaskInfo, node: &NodeInfo) -> f64 {
    let mut requested = committed(node);
    requested.add(&task.init_resreq);

    let mut total = 0.0;
    let mut count = 0usize;
    for dim in task.init_resreq.dimensions() {
        if task.init_resreq.get(dim) == 0 {
            continue;
        }
        let Some(fullness) = requested.ratio(node.allocatable(), dim) else {
            return 0.0;
        };
        if fullness > 1.0 {
            return 0.0;
        }
        total += fullness * 100.0;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }
    total / count as f64
}

/// Fraction of the task's preferred labels the node carries.
pub fn affinity_score(task: &TaskInfo, node: &NodeInfo) -> f64 {
    let total_preferred = task.preferred_labels.len();
    if total_preferred == 0 {
        return 50.0; // Neutral when no preferences.
    }
    let matched = task
        .preferred_labels
        .iter()
        .filter(|(k, v)| node.labels.get(*k).is_some_and(|nv| nv == *v))
        .count();
    (matched as f64 / total_preferred as f64) * 100.0
}

/// Weighted composite of all components.
pub fn score_node(task: &TaskInfo, node: &NodeInfo, weights: &ScoringWeights) -> f64 {
    weights.least_requested * least_requested_score(task, node)
        + weights.binpack * binpack_score(task, node)
        + weights.affinity * affinity_score(task, node)
}

/// Rescale `scores` so the best becomes `max`; all-zero lists are left alone.
pub fn normalize_scores(scores: &mut [HostScore], max: f64) {
    let highest = scores.iter().map(|s| s.score).fold(0.0_f64, f64::max);
    if highest <= 0.0 {
        return;
    }
    for s in scores.iter_mut() {
        s.score = s.score / highest * max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchgrid_core::{CPU, MEMORY};

    fn res(cpu: u64, mem: u64) -> Resource {
        Resource::empty().with(CPU, cpu).with(MEMORY, mem)
    }

    fn node_using(name: &str, cap: Resource, used: Resource) -> NodeInfo {
        let mut node = NodeInfo::new(name, cap);
        node.add_task(&TaskInfo::new(&format!("{name}-busy"), used).running_on(name))
            .unwrap();
        node
    }

    #[test]
    fn least_requested_prefers_emptier_node() {
        let task = TaskInfo::new("t", res(500, 512));
        let full = node_using("n1", res(4000, 4096), res(3000, 3072));
        let empty = node_using("n2", res(4000, 4096), res(500, 512));

        assert!(least_requested_score(&task, &empty) > least_requested_score(&task, &full));
    }

    #[test]
    fn bin_packing_prefers_fuller_node() {
        let task = TaskInfo::new("t", res(500, 512));
        let nearly_full = node_using("n1", res(4000, 4096), res(3000, 3072));
        let mostly_empty = node_using("n2", res(4000, 4096), res(500, 512));

        let s1 = binpack_score(&task, &nearly_full);
        let s2 = binpack_score(&task, &mostly_empty);
        assert!(
            s1 > s2,
            "nearly full ({s1}) should score higher than mostly empty ({s2}) for bin-packing"
        );
    }

    #[test]
    fn bin_packing_zeroes_overflowing_node() {
        let task = TaskInfo::new("t", res(2000, 0));
        let node = node_using("n1", res(2000, 1024), res(1000, 0));
        assert_eq!(binpack_score(&task, &node), 0.0);
    }

    #[test]
    fn releasing_capacity_counts_as_free() {
        let task = TaskInfo::new("t", res(1000, 0));
        let mut node = node_using("n1", res(2000, 0), res(2000, 0));
        let before = least_requested_score(&task, &node);

        let releasing = TaskInfo::new("n1-busy", res(2000, 0))
            .running_on("n1")
            .with_status(batchgrid_state::TaskStatus::Releasing);
        node.update_task(&releasing).unwrap();

        assert!(least_requested_score(&task, &node) > before);
    }

    #[test]
    fn preferred_labels_boost_score() {
        let labeled = NodeInfo::new("n1", res(1000, 1024)).with_label("gpu", "true");
        let unlabeled = NodeInfo::new("n2", res(1000, 1024));
        let task = TaskInfo::new("t", res(100, 0)).with_preferred_label("gpu", "true");

        assert_eq!(affinity_score(&task, &labeled), 100.0);
        assert_eq!(affinity_score(&task, &unlabeled), 0.0);
        assert_eq!(affinity_score(&TaskInfo::new("t", res(1, 0)), &unlabeled), 50.0);
    }

    #[test]
    fn weights_select_components() {
        let task = TaskInfo::new("t", res(500, 0));
        let node = node_using("n1", res(1000, 0), res(0, 0));
        let only_binpack = ScoringWeights {
            least_requested: 0.0,
            binpack: 1.0,
            affinity: 0.0,
        };

        assert_eq!(score_node(&task, &node, &only_binpack), binpack_score(&task, &node));
    }

    #[test]
    fn normalize_scales_to_max() {
        let mut scores = vec![
            HostScore { node: "a".into(), score: 10.0 },
            HostScore { node: "b".into(), score: 40.0 },
        ];
        normalize_scores(&mut scores, 100.0);
        assert_eq!(scores[0].score, 25.0);
        assert_eq!(scores[1].score, 100.0);

        let mut zeros = vec![HostScore { node: "a".into(), score: 0.0 }];
        normalize_scores(&mut zeros, 100.0);
        assert_eq!(zeros[0].score, 0.0);
    }
}
