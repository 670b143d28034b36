//! The per-cycle session.
//!
//! A [`Session`] exclusively owns the cluster snapshot for one scheduling
//! cycle. All speculative mutation goes through a [`Statement`] borrowed
//! from it, so at most one statement can be open at a time.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use batchgrid_core::{JobId, NodeName, TaskId};
use batchgrid_metrics::PreemptionMetrics;
use batchgrid_state::{ClusterSnapshot, JobInfo, NodeInfo, QueueInfo, TaskInfo};

use super::policy::Policies;
use super::statement::Statement;
use crate::error::SchedulerResult;

/// The cluster-mutation collaborator: applies committed evictions.
pub trait Evictor: Send {
    fn evict(&mut self, task: &TaskInfo, reason: &str) -> SchedulerResult<()>;
}

/// Accepts every eviction without doing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvictor;

impl Evictor for NoopEvictor {
    fn evict(&mut self, _task: &TaskInfo, _reason: &str) -> SchedulerResult<()> {
        Ok(())
    }
}

/// An operation made durable by a committed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommittedOperation {
    Evicted {
        job: JobId,
        task: TaskId,
        node: NodeName,
        reason: String,
    },
    Pipelined {
        job: JobId,
        task: TaskId,
        node: NodeName,
    },
}

/// Everything committed during one cycle, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub operations: Vec<CommittedOperation>,
}

impl CycleOutcome {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// `(job, task)` of every committed eviction.
    pub fn evicted(&self) -> impl Iterator<Item = (&str, &str)> {
        self.operations.iter().filter_map(|op| match op {
            CommittedOperation::Evicted { job, task, .. } => Some((job.as_str(), task.as_str())),
            CommittedOperation::Pipelined { .. } => None,
        })
    }

    /// `(job, task, node)` of every committed placement.
    pub fn pipelined(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.operations.iter().filter_map(|op| match op {
            CommittedOperation::Pipelined { job, task, node } => {
                Some((job.as_str(), task.as_str(), node.as_str()))
            }
            CommittedOperation::Evicted { .. } => None,
        })
    }
}

pub struct Session {
    snapshot: ClusterSnapshot,
    policies: Arc<Policies>,
    metrics: Arc<PreemptionMetrics>,
    evictor: Box<dyn Evictor>,
    outcome: CycleOutcome,
}

impl Session {
    pub fn open(
        snapshot: ClusterSnapshot,
        policies: Arc<Policies>,
        metrics: Arc<PreemptionMetrics>,
    ) -> Self {
        debug!(
            jobs = snapshot.jobs().count(),
            nodes = snapshot.nodes().count(),
            queues = snapshot.queues().count(),
            "session opened"
        );
        Self {
            snapshot,
            policies,
            metrics,
            evictor: Box::new(NoopEvictor),
            outcome: CycleOutcome::default(),
        }
    }

    pub fn with_evictor(mut self, evictor: impl Evictor + 'static) -> Self {
        self.evictor = Box::new(evictor);
        self
    }

    pub fn snapshot(&self) -> &ClusterSnapshot {
        &self.snapshot
    }

    pub fn policies(&self) -> &Arc<Policies> {
        &self.policies
    }

    pub fn metrics(&self) -> &Arc<PreemptionMetrics> {
        &self.metrics
    }

    pub fn job(&self, id: &str) -> Option<&JobInfo> {
        self.snapshot.job(id)
    }

    pub fn node(&self, name: &str) -> Option<&NodeInfo> {
        self.snapshot.node(name)
    }

    pub fn queue(&self, id: &str) -> Option<&QueueInfo> {
        self.snapshot.queue(id)
    }

    /// Open a statement. The session stays borrowed until it is
    /// committed or discarded.
    pub fn statement(&mut self) -> Statement<'_> {
        Statement::new(self)
    }

    pub fn outcome(&self) -> &CycleOutcome {
        &self.outcome
    }

    pub fn close(self) -> CycleOutcome {
        self.into_parts().1
    }

    /// Close the session, keeping the mutated snapshot.
    pub fn into_parts(self) -> (ClusterSnapshot, CycleOutcome) {
        info!(operations = self.outcome.operations.len(), "session closed");
        (self.snapshot, self.outcome)
    }

    pub(crate) fn snapshot_mut(&mut self) -> &mut ClusterSnapshot {
        &mut self.snapshot
    }

    pub(crate) fn evictor_mut(&mut self) -> &mut dyn Evictor {
        self.evictor.as_mut()
    }

    pub(crate) fn record(&mut self, operation: CommittedOperation) {
        self.outcome.operations.push(operation);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("snapshot", &self.snapshot)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchgrid_core::{CPU, Resource};

    fn session() -> Session {
        let mut snapshot = ClusterSnapshot::new();
        snapshot.add_queue(QueueInfo::new("q1")).unwrap();
        snapshot
            .add_node(NodeInfo::new("n1", Resource::empty().with(CPU, 1000)))
            .unwrap();
        Session::open(
            snapshot,
            Arc::new(Policies::default()),
            Arc::new(PreemptionMetrics::new()),
        )
    }

    #[test]
    fn accessors_reach_the_snapshot() {
        let ssn = session();
        assert!(ssn.queue("q1").is_some());
        assert!(ssn.node("n1").is_some());
        assert!(ssn.job("missing").is_none());
        assert!(ssn.outcome().is_empty());
    }

    #[test]
    fn outcome_serializes_with_op_tag() {
        let outcome = CycleOutcome {
            operations: vec![
                CommittedOperation::Evicted {
                    job: "low".into(),
                    task: "low-0".into(),
                    node: "n1".into(),
                    reason: "preempt".into(),
                },
                CommittedOperation::Pipelined {
                    job: "high".into(),
                    task: "high-0".into(),
                    node: "n1".into(),
                },
            ],
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["operations"][0]["op"], "evicted");
        assert_eq!(json["operations"][1]["op"], "pipelined");
        assert_eq!(json["operations"][1]["node"], "n1");

        assert_eq!(outcome.evicted().collect::<Vec<_>>(), vec![("low", "low-0")]);
        assert_eq!(
            outcome.pipelined().collect::<Vec<_>>(),
            vec![("high", "high-0", "n1")]
        );
    }

    #[test]
    fn close_returns_recorded_operations() {
        let mut ssn = session();
        ssn.record(CommittedOperation::Pipelined {
            job: "j".into(),
            task: "t".into(),
            node: "n1".into(),
        });
        let (snapshot, outcome) = ssn.into_parts();
        assert_eq!(outcome.operations.len(), 1);
        assert!(snapshot.node("n1").is_some());
    }
}
