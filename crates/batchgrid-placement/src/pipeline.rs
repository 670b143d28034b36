//! Feasibility filtering, scoring, and ranking of candidate nodes.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use batchgrid_core::NodeName;
use batchgrid_state::{NodeInfo, TaskInfo};

/// Why a node cannot host a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("node {node}: {reason}")]
pub struct FitError {
    pub node: NodeName,
    pub reason: String,
}

impl FitError {
    pub fn new(node: &str, reason: impl Into<String>) -> Self {
        Self {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fit failures collected while filtering, keyed by node.
#[derive(Debug, Clone, Default)]
pub struct FitErrors {
    errors: BTreeMap<NodeName, FitError>,
}

impl FitErrors {
    pub fn push(&mut self, err: FitError) {
        self.errors.insert(err.node.clone(), err);
    }

    pub fn get(&self, node: &str) -> Option<&FitError> {
        self.errors.get(node)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for FitErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node(s) unavailable", self.errors.len())?;
        for (i, err) in self.errors.values().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// One plugin's score for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct HostScore {
    pub node: NodeName,
    pub score: f64,
}

/// Per-plugin map scores, handed to the reduce step.
pub type PluginScores = BTreeMap<String, Vec<HostScore>>;

/// Final score of a feasible node. `None` when no plugin scored it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeScore {
    pub node: NodeName,
    pub score: Option<f64>,
}

/// Keep the nodes `predicate` accepts for `task`.
///
/// Rejections are not errors; they are returned alongside for logging.
pub fn predicate_nodes<'a, I, P>(
    task: &TaskInfo,
    nodes: I,
    mut predicate: P,
) -> (Vec<&'a NodeInfo>, FitErrors)
where
    I: IntoIterator<Item = &'a NodeInfo>,
    P: FnMut(&TaskInfo, &NodeInfo) -> Result<(), FitError>,
{
    let mut feasible = Vec::new();
    let mut errors = FitErrors::default();

    for node in nodes {
        match predicate(task, node) {
            Ok(()) => feasible.push(node),
            Err(err) => {
                debug!(task = %task, node = %node.name, reason = %err.reason, "predicate rejected node");
                errors.push(err);
            }
        }
    }
    (feasible, errors)
}

/// Score every feasible node.
///
/// `map` yields `plugin → score` for a single node, `reduce` may rewrite
/// the per-plugin score lists (e.g. normalize them), and `batch` scores
/// all nodes at once. A node's total is the sum of everything it got.
pub fn prioritize_nodes<B, M, R>(
    task: &TaskInfo,
    nodes: &[&NodeInfo],
    mut batch: B,
    mut map: M,
    mut reduce: R,
) -> Vec<NodeScore>
where
    B: FnMut(&TaskInfo, &[&NodeInfo]) -> BTreeMap<NodeName, f64>,
    M: FnMut(&TaskInfo, &NodeInfo) -> BTreeMap<String, f64>,
    R: FnMut(&TaskInfo, &mut PluginScores),
{
    let mut plugin_scores = PluginScores::new();
    for node in nodes {
        for (plugin, score) in map(task, node) {
            plugin_scores.entry(plugin).or_default().push(HostScore {
                node: node.name.clone(),
                score,
            });
        }
    }
    reduce(task, &mut plugin_scores);

    let mut totals: BTreeMap<NodeName, Option<f64>> =
        nodes.iter().map(|n| (n.name.clone(), None)).collect();

    let mut credit = |node: &str, score: f64| {
        if !score.is_finite() {
            warn!(task = %task, node, score, "ignoring non-finite node score");
            return;
        }
        if let Some(total) = totals.get_mut(node) {
            *total = Some(total.unwrap_or(0.0) + score);
        }
    };

    for scores in plugin_scores.values() {
        for host in scores {
            credit(&host.node, host.score);
        }
    }
    for (node, score) in batch(task, nodes) {
        credit(&node, score);
    }

    totals
        .into_iter()
        .map(|(node, score)| NodeScore { node, score })
        .collect()
}

/// Node names ordered best first; unscored nodes last, name breaks ties.
pub fn sort_nodes(mut scores: Vec<NodeScore>) -> Vec<NodeName> {
    scores.sort_by(|a, b| {
        let by_score = match (a.score, b.score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_score.then_with(|| a.node.cmp(&b.node))
    });
    scores.into_iter().map(|s| s.node).collect()
}
