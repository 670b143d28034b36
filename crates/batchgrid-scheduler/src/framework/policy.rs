//! Policy hooks and their dispatch across plugin tiers.
//!
//! Plugins register narrow function hooks into a [`PolicyTier`]; the
//! resulting [`Policies`] is what actions consult. Tiers are consulted in
//! order and plugins in registration order within a tier. How several
//! hooks for the same extension point combine depends on the point:
//!
//! | hook | combination |
//! |------|-------------|
//! | job / task order | first non-`Equal` answer, then creation time, then uid |
//! | job valid | first failing result |
//! | job pipelined | first tier with a hook decides, AND within it; no hook → pipelined |
//! | predicate | every hook must accept |
//! | node order | map and batch scores summed per node |
//! | preemptable | intersection within the first tier that has a hook |

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use batchgrid_core::{Hook, NodeName};
use batchgrid_placement::{FitError, HostScore, PluginScores};
use batchgrid_state::{ClusterSnapshot, JobInfo, NodeInfo, TaskInfo};

pub type JobOrderFn = Arc<dyn Fn(&JobInfo, &JobInfo) -> Ordering + Send + Sync>;
pub type TaskOrderFn = Arc<dyn Fn(&TaskInfo, &TaskInfo) -> Ordering + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&JobInfo) -> ValidateResult + Send + Sync>;
pub type JobPipelinedFn = Arc<dyn Fn(&JobInfo) -> bool + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&TaskInfo, &NodeInfo) -> Result<(), FitError> + Send + Sync>;
pub type BatchNodeOrderFn =
    Arc<dyn Fn(&TaskInfo, &[&NodeInfo]) -> BTreeMap<NodeName, f64> + Send + Sync>;
pub type NodeOrderMapFn = Arc<dyn Fn(&TaskInfo, &NodeInfo) -> f64 + Send + Sync>;
pub type NodeOrderReduceFn = Arc<dyn Fn(&TaskInfo, &mut Vec<HostScore>) + Send + Sync>;
/// Narrow `candidates` down to the tasks `preemptor` may evict.
pub type PreemptableFn =
    Arc<dyn Fn(&ClusterSnapshot, &TaskInfo, &[TaskInfo]) -> Vec<TaskInfo> + Send + Sync>;

/// Outcome of a job validity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateResult {
    pub pass: bool,
    pub reason: String,
    pub message: String,
}

impl ValidateResult {
    pub fn passed() -> Self {
        Self {
            pass: true,
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn failed(reason: &str, message: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pass {
            f.write_str("valid")
        } else {
            write!(f, "{}: {}", self.reason, self.message)
        }
    }
}

/// Hooks registered by the plugins of one tier, each tagged with its plugin.
#[derive(Default, Clone)]
pub struct PolicyTier {
    job_order: Vec<(String, JobOrderFn)>,
    task_order: Vec<(String, TaskOrderFn)>,
    job_valid: Vec<(String, ValidateFn)>,
    job_pipelined: Vec<(String, JobPipelinedFn)>,
    predicate: Vec<(String, PredicateFn)>,
    batch_node_order: Vec<(String, BatchNodeOrderFn)>,
    node_order_map: Vec<(String, NodeOrderMapFn)>,
    node_order_reduce: Vec<(String, NodeOrderReduceFn)>,
    preemptable: Vec<(String, PreemptableFn)>,
}

impl PolicyTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job_order_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&JobInfo, &JobInfo) -> Ordering + Send + Sync + 'static,
    ) {
        self.job_order.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_task_order_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&TaskInfo, &TaskInfo) -> Ordering + Send + Sync + 'static,
    ) {
        self.task_order.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_job_valid_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&JobInfo) -> ValidateResult + Send + Sync + 'static,
    ) {
        self.job_valid.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_job_pipelined_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&JobInfo) -> bool + Send + Sync + 'static,
    ) {
        self.job_pipelined.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_predicate_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&TaskInfo, &NodeInfo) -> Result<(), FitError> + Send + Sync + 'static,
    ) {
        self.predicate.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_batch_node_order_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&TaskInfo, &[&NodeInfo]) -> BTreeMap<NodeName, f64> + Send + Sync + 'static,
    ) {
        self.batch_node_order.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_node_order_map_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&TaskInfo, &NodeInfo) -> f64 + Send + Sync + 'static,
    ) {
        self.node_order_map.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_node_order_reduce_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&TaskInfo, &mut Vec<HostScore>) + Send + Sync + 'static,
    ) {
        self.node_order_reduce.push((plugin.to_string(), Arc::new(f)));
    }

    pub fn add_preemptable_fn(
        &mut self,
        plugin: &str,
        f: impl Fn(&ClusterSnapshot, &TaskInfo, &[TaskInfo]) -> Vec<TaskInfo> + Send + Sync + 'static,
    ) {
        self.preemptable.push((plugin.to_string(), Arc::new(f)));
    }

    /// Drop every hook registered for `hook`.
    pub fn disable(&mut self, hook: Hook) {
        match hook {
            Hook::JobOrder => self.job_order.clear(),
            Hook::TaskOrder => self.task_order.clear(),
            Hook::JobValid => self.job_valid.clear(),
            Hook::JobPipelined => self.job_pipelined.clear(),
            Hook::Predicate => self.predicate.clear(),
            Hook::NodeOrder => {
                self.batch_node_order.clear();
                self.node_order_map.clear();
                self.node_order_reduce.clear();
            }
            Hook::Preemptable => self.preemptable.clear(),
        }
    }

    /// Move `other`'s hooks after this tier's own.
    pub fn append(&mut self, mut other: PolicyTier) {
        self.job_order.append(&mut other.job_order);
        self.task_order.append(&mut other.task_order);
        self.job_valid.append(&mut other.job_valid);
        self.job_pipelined.append(&mut other.job_pipelined);
        self.predicate.append(&mut other.predicate);
        self.batch_node_order.append(&mut other.batch_node_order);
        self.node_order_map.append(&mut other.node_order_map);
        self.node_order_reduce.append(&mut other.node_order_reduce);
        self.preemptable.append(&mut other.preemptable);
    }

    /// Names of every plugin that registered at least one hook, sorted.
    pub fn plugins(&self) -> BTreeSet<&str> {
        fn names<F>(hooks: &[(String, F)]) -> impl Iterator<Item = &str> {
            hooks.iter().map(|(name, _)| name.as_str())
        }
        names(&self.job_order)
            .chain(names(&self.task_order))
            .chain(names(&self.job_valid))
            .chain(names(&self.job_pipelined))
            .chain(names(&self.predicate))
            .chain(names(&self.batch_node_order))
            .chain(names(&self.node_order_map))
            .chain(names(&self.node_order_reduce))
            .chain(names(&self.preemptable))
            .collect()
    }
}

impl fmt::Debug for PolicyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyTier")
            .field("plugins", &self.plugins())
            .finish()
    }
}

/// Every tier's hooks, in precedence order.
#[derive(Debug, Default, Clone)]
pub struct Policies {
    tiers: Vec<PolicyTier>,
}

impl Policies {
    pub fn new(tiers: Vec<PolicyTier>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[PolicyTier] {
        &self.tiers
    }

    pub fn job_order(&self, l: &JobInfo, r: &JobInfo) -> Ordering {
        self.tiers
            .iter()
            .flat_map(|t| &t.job_order)
            .map(|(_, f)| f(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| {
                l.creation_timestamp
                    .cmp(&r.creation_timestamp)
                    .then_with(|| l.uid.cmp(&r.uid))
            })
    }

    pub fn task_order(&self, l: &TaskInfo, r: &TaskInfo) -> Ordering {
        self.tiers
            .iter()
            .flat_map(|t| &t.task_order)
            .map(|(_, f)| f(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| l.job.cmp(&r.job).then_with(|| l.uid.cmp(&r.uid)))
    }

    /// The first failing validation, `None` when the job is valid.
    pub fn job_valid(&self, job: &JobInfo) -> Option<ValidateResult> {
        self.tiers
            .iter()
            .flat_map(|t| &t.job_valid)
            .map(|(_, f)| f(job))
            .find(|r| !r.pass)
    }

    pub fn job_pipelined(&self, job: &JobInfo) -> bool {
        for tier in &self.tiers {
            if tier.job_pipelined.is_empty() {
                continue;
            }
            return tier.job_pipelined.iter().all(|(_, f)| f(job));
        }
        true
    }

    pub fn predicate(&self, task: &TaskInfo, node: &NodeInfo) -> Result<(), FitError> {
        for (_, f) in self.tiers.iter().flat_map(|t| &t.predicate) {
            f(task, node)?;
        }
        Ok(())
    }

    pub fn batch_node_order(&self, task: &TaskInfo, nodes: &[&NodeInfo]) -> BTreeMap<NodeName, f64> {
        let mut totals = BTreeMap::new();
        for (_, f) in self.tiers.iter().flat_map(|t| &t.batch_node_order) {
            for (node, score) in f(task, nodes) {
                *totals.entry(node).or_insert(0.0) += score;
            }
        }
        totals
    }

    /// Per-plugin scores of `node`.
    pub fn node_order_map(&self, task: &TaskInfo, node: &NodeInfo) -> BTreeMap<String, f64> {
        self.tiers
            .iter()
            .flat_map(|t| &t.node_order_map)
            .map(|(plugin, f)| (plugin.clone(), f(task, node)))
            .collect()
    }

    pub fn node_order_reduce(&self, task: &TaskInfo, scores: &mut PluginScores) {
        for (plugin, f) in self.tiers.iter().flat_map(|t| &t.node_order_reduce) {
            if let Some(list) = scores.get_mut(plugin) {
                f(task, list);
            }
        }
    }

    pub fn preemptable(
        &self,
        snapshot: &ClusterSnapshot,
        preemptor: &TaskInfo,
        candidates: &[TaskInfo],
    ) -> Vec<TaskInfo> {
        let Some(tier) = self.tiers.iter().find(|t| !t.preemptable.is_empty()) else {
            return Vec::new();
        };

        let mut victims: Option<Vec<TaskInfo>> = None;
        for (_, f) in &tier.preemptable {
            let selected = f(snapshot, preemptor, candidates);
            victims = Some(match victims {
                None => selected,
                Some(current) => {
                    let keep: BTreeSet<(&str, &str)> = selected
                        .iter()
                        .map(|t| (t.job.as_str(), t.uid.as_str()))
                        .collect();
                    current
                        .into_iter()
                        .filter(|t| keep.contains(&(t.job.as_str(), t.uid.as_str())))
                        .collect()
                }
            });
        }
        victims.unwrap_or_default()
    }
}
