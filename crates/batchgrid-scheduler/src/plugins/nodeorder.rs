//! Node scoring.
//!
//! Arguments (integer weights):
//!
//! | key | default |
//! |-----|---------|
//! | `leastrequested.weight` | 1 |
//! | `binpack.weight` | 0 |
//! | `affinity.weight` | 1 |
//!
//! The reduce step rescales this plugin's scores so the best node gets
//! [`MAX_NODE_SCORE`].

use batchgrid_core::PluginArguments;
use batchgrid_placement::{ScoringWeights, normalize_scores, score_node};

use super::Plugin;
use crate::error::SchedulerResult;
use crate::framework::PolicyTier;

pub const NAME: &str = "nodeorder";

pub const MAX_NODE_SCORE: f64 = 100.0;

const LEAST_REQUESTED_WEIGHT: &str = "leastrequested.weight";
const BINPACK_WEIGHT: &str = "binpack.weight";
const AFFINITY_WEIGHT: &str = "affinity.weight";

#[derive(Debug, Default)]
pub struct NodeOrderPlugin {
    weights: ScoringWeights,
}

impl NodeOrderPlugin {
    pub fn build(args: &PluginArguments) -> SchedulerResult<Box<dyn Plugin>> {
        let weights = ScoringWeights {
            least_requested: args.weight(NAME, LEAST_REQUESTED_WEIGHT, 1)? as f64,
            binpack: args.weight(NAME, BINPACK_WEIGHT, 0)? as f64,
            affinity: args.weight(NAME, AFFINITY_WEIGHT, 1)? as f64,
        };
        Ok(Box::new(Self { weights }))
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }
}

impl Plugin for NodeOrderPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, tier: &mut PolicyTier) {
        let weights = self.weights.clone();
        tier.add_node_order_map_fn(NAME, move |task, node| score_node(task, node, &weights));
        tier.add_node_order_reduce_fn(NAME, |_, scores| normalize_scores(scores, MAX_NODE_SCORE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Policies;
    use batchgrid_core::{CPU, Resource};
    use batchgrid_placement::{prioritize_nodes, sort_nodes};
    use batchgrid_state::{NodeInfo, TaskInfo};

    fn cpu(n: u64) -> Resource {
        Resource::empty().with(CPU, n)
    }

    fn policies(args: &PluginArguments) -> Policies {
        let mut tier = PolicyTier::new();
        NodeOrderPlugin::build(args).unwrap().register(&mut tier);
        Policies::new(vec![tier])
    }

    fn loaded(name: &str, used: u64) -> NodeInfo {
        let mut node = NodeInfo::new(name, cpu(4000));
        if used > 0 {
            node.add_task(&TaskInfo::new(&format!("{name}-busy"), cpu(used)).running_on(name))
                .unwrap();
        }
        node
    }

    fn rank(policies: &Policies, nodes: &[NodeInfo]) -> Vec<String> {
        let task = TaskInfo::new("t", cpu(500));
        let refs: Vec<&NodeInfo> = nodes.iter().collect();
        sort_nodes(prioritize_nodes(
            &task,
            &refs,
            |t, ns| policies.batch_node_order(t, ns),
            |t, n| policies.node_order_map(t, n),
            |t, s| policies.node_order_reduce(t, s),
        ))
    }

    #[test]
    fn default_weights_spread_load() {
        let nodes = [loaded("busy", 3000), loaded("idle", 0)];
        assert_eq!(rank(&policies(&PluginArguments::default()), &nodes), vec!["idle", "busy"]);
    }

    #[test]
    fn binpack_weight_packs_load() {
        let mut args = PluginArguments::default();
        args.insert(LEAST_REQUESTED_WEIGHT, "0");
        args.insert(BINPACK_WEIGHT, "1");
        args.insert(AFFINITY_WEIGHT, "0");

        let nodes = [loaded("busy", 3000), loaded("idle", 0)];
        assert_eq!(rank(&policies(&args), &nodes), vec!["busy", "idle"]);
    }

    #[test]
    fn weights_are_parsed_from_arguments() {
        let mut args = PluginArguments::default();
        args.insert(BINPACK_WEIGHT, "3");
        let plugin = NodeOrderPlugin::build(&args).unwrap();
        assert_eq!(plugin.name(), NAME);

        let mut bad = PluginArguments::default();
        bad.insert(AFFINITY_WEIGHT, "lots");
        assert!(NodeOrderPlugin::build(&bad).is_err());
    }

    #[test]
    fn reduce_normalizes_best_to_max() {
        let policies = policies(&PluginArguments::default());
        let task = TaskInfo::new("t", cpu(500));
        let nodes = [loaded("busy", 3000), loaded("idle", 0)];
        let refs: Vec<&NodeInfo> = nodes.iter().collect();

        let scores = prioritize_nodes(
            &task,
            &refs,
            |t, ns| policies.batch_node_order(t, ns),
            |t, n| policies.node_order_map(t, n),
            |t, s| policies.node_order_reduce(t, s),
        );
        let best = scores
            .iter()
            .filter_map(|s| s.score)
            .fold(f64::MIN, f64::max);
        assert_eq!(best, MAX_NODE_SCORE);
    }
}
