//! Scheduler — runs configured actions over one snapshot per cycle.
//!
//! The `Scheduler` is built once from configuration and then:
//! - Opens a [`Session`] over each cycle's snapshot
//! - Executes its actions against the session, in configured order
//! - Closes the session and returns what was committed
//!
//! Metrics are shared across cycles.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use batchgrid_core::SchedulerConfig;
use batchgrid_metrics::PreemptionMetrics;
use batchgrid_state::ClusterSnapshot;

use crate::actions::{Action, new_action};
use crate::error::SchedulerResult;
use crate::framework::{CycleOutcome, Evictor, NoopEvictor, Policies, Session};
use crate::plugins::PluginRegistry;

pub struct Scheduler {
    /// Actions executed on every cycle, in order.
    actions: Vec<Box<dyn Action>>,
    /// Policy hooks built from the plugin tiers.
    policies: Arc<Policies>,
    metrics: Arc<PreemptionMetrics>,
}

impl Scheduler {
    /// Build a scheduler from `config`, resolving plugins through `registry`.
    ///
    /// Unknown actions and plugins are reported here, before any cycle runs.
    pub fn new(config: &SchedulerConfig, registry: &PluginRegistry) -> SchedulerResult<Self> {
        let policies = registry.build_policies(config)?;
        let actions = config
            .actions
            .iter()
            .map(|name| new_action(name))
            .collect::<SchedulerResult<Vec<_>>>()?;

        info!(
            actions = ?config.actions,
            tiers = config.tiers.len(),
            "scheduler configured"
        );
        Ok(Self::with_policies(actions, policies))
    }

    /// Build a scheduler from already-assembled parts.
    pub fn with_policies(actions: Vec<Box<dyn Action>>, policies: Policies) -> Self {
        Self {
            actions,
            policies: Arc::new(policies),
            metrics: Arc::new(PreemptionMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<PreemptionMetrics> {
        &self.metrics
    }

    pub fn policies(&self) -> &Arc<Policies> {
        &self.policies
    }

    /// Open a session over `snapshot` without running anything.
    pub fn open_session(&self, snapshot: ClusterSnapshot) -> Session {
        Session::open(snapshot, Arc::clone(&self.policies), Arc::clone(&self.metrics))
    }

    /// Run every action against an open session.
    pub fn execute(&self, session: &mut Session) {
        for action in &self.actions {
            let started = Instant::now();
            action.execute(session);
            info!(
                action = action.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                operations = session.outcome().operations.len(),
                "action finished"
            );
        }
    }

    /// One full cycle with evictions accepted unconditionally.
    pub fn run_cycle(&self, snapshot: ClusterSnapshot) -> CycleOutcome {
        self.run_cycle_with(snapshot, NoopEvictor)
    }

    /// One full cycle, handing committed evictions to `evictor`.
    pub fn run_cycle_with(
        &self,
        snapshot: ClusterSnapshot,
        evictor: impl Evictor + 'static,
    ) -> CycleOutcome {
        let mut session = self.open_session(snapshot).with_evictor(evictor);
        self.execute(&mut session);
        session.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use batchgrid_core::{CPU, Resource};
    use batchgrid_state::{JobInfo, NodeInfo, QueueInfo, TaskInfo};

    fn cpu(n: u64) -> Resource {
        Resource::empty().with(CPU, n)
    }

    #[test]
    fn unknown_action_fails_construction() {
        let config = SchedulerConfig {
            actions: vec!["preempt".into(), "allocate".into()],
            ..SchedulerConfig::default()
        };
        let err = Scheduler::new(&config, &PluginRegistry::builtin()).err().unwrap();
        assert!(matches!(err, SchedulerError::UnknownAction(name) if name == "allocate"));
    }

    #[test]
    fn empty_snapshot_yields_empty_outcome() {
        let scheduler = Scheduler::new(&SchedulerConfig::default(), &PluginRegistry::builtin()).unwrap();
        assert!(scheduler.run_cycle(ClusterSnapshot::new()).is_empty());
        assert_eq!(scheduler.metrics().attempts(), 0);
    }

    #[test]
    fn no_actions_means_no_mutation() {
        let scheduler = Scheduler::with_policies(Vec::new(), Policies::default());

        let mut snapshot = ClusterSnapshot::new();
        snapshot.add_queue(QueueInfo::new("q1")).unwrap();
        snapshot.add_node(NodeInfo::new("n1", cpu(1))).unwrap();
        let mut job = JobInfo::new("j", "q1");
        job.add_task(TaskInfo::new("t", cpu(1)).running_on("n1")).unwrap();
        snapshot.add_job(job).unwrap();

        let mut session = scheduler.open_session(snapshot);
        scheduler.execute(&mut session);
        let (after, outcome) = session.into_parts();
        assert!(outcome.is_empty());
        assert_eq!(after.node("n1").unwrap().used(), &cpu(1));
    }
}
