//! Transactional statements.
//!
//! A [`Statement`] applies evictions and speculative placements to the
//! session's snapshot immediately, so later decisions in the same
//! statement see the projected capacity, and logs each one.
//!
//! - [`Statement::commit`] hands evictions to the session's [`Evictor`]
//!   in log order and records everything that stuck in the cycle outcome.
//! - [`Statement::discard`] undoes the log in reverse order, leaving every
//!   node and job exactly as it was when the statement was opened.
//!
//! Both consume the statement. A statement dropped while still open is
//! discarded.
//!
//! [`Evictor`]: super::Evictor

use std::collections::BTreeSet;

use tracing::{debug, error, warn};

use batchgrid_core::{JobId, NodeName, TaskId};
use batchgrid_state::{ClusterSnapshot, StateError, TaskInfo, TaskStatus};

use super::session::{CommittedOperation, Session};
use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone)]
enum Operation {
    Evict {
        job: JobId,
        task: TaskId,
        node: NodeName,
        previous: TaskStatus,
        reason: String,
    },
    Pipeline {
        job: JobId,
        task: TaskId,
        node: NodeName,
    },
}

pub struct Statement<'a> {
    session: &'a mut Session,
    operations: Vec<Operation>,
    finished: bool,
}

impl<'a> Statement<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self {
            session,
            operations: Vec::new(),
            finished: false,
        }
    }

    /// Read access to the session while the statement is open.
    pub fn session(&self) -> &Session {
        &*self.session
    }

    pub fn snapshot(&self) -> &ClusterSnapshot {
        self.session.snapshot()
    }

    /// Number of logged operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Mark `task` as releasing; its node's future idle grows by its request.
    ///
    /// Fails if the task does not currently hold resources on a node.
    pub fn evict(&mut self, task: &TaskInfo, reason: &str) -> SchedulerResult<()> {
        let live = self.session.snapshot().task(&task.job, &task.uid)?;
        let node = match &live.node_name {
            Some(node) if live.status.is_allocated() => node.clone(),
            _ => return Err(SchedulerError::TaskNotPlaced(task.uid.clone())),
        };

        let previous = self
            .session
            .snapshot_mut()
            .set_placed_status(&task.job, &task.uid, TaskStatus::Releasing)?;

        debug!(job = %task.job, task = %task.uid, %node, reason, "evict");
        self.operations.push(Operation::Evict {
            job: task.job.clone(),
            task: task.uid.clone(),
            node,
            previous,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Speculatively place pending `task` on `node`, debiting its future idle.
    pub fn pipeline(&mut self, task: &TaskInfo, node: &str) -> SchedulerResult<()> {
        let snapshot = self.session.snapshot();
        let live = snapshot.task(&task.job, &task.uid)?;
        let target = snapshot
            .node(node)
            .ok_or_else(|| StateError::NodeNotFound(node.to_string()))?;
        let future_idle = target.future_idle();
        if !live.init_resreq.less_equal(&future_idle) {
            return Err(SchedulerError::InsufficientResources {
                task: task.uid.clone(),
                node: node.to_string(),
                requested: live.init_resreq.clone(),
                future_idle,
            });
        }

        self.session
            .snapshot_mut()
            .pipeline_task(&task.job, &task.uid, node)?;

        debug!(job = %task.job, task = %task.uid, node, "pipeline");
        self.operations.push(Operation::Pipeline {
            job: task.job.clone(),
            task: task.uid.clone(),
            node: node.to_string(),
        });
        Ok(())
    }

    /// Make every logged operation durable, in log order.
    ///
    /// An eviction the evictor rejects is rolled back and left out of the
    /// outcome; the rest of the statement still commits. Pipelines on that
    /// node which no longer fit are withdrawn, newest first.
    pub fn commit(mut self) {
        self.finished = true;
        let operations = std::mem::take(&mut self.operations);

        let mut committed = Vec::with_capacity(operations.len());
        let mut short_nodes = BTreeSet::new();
        for op in operations {
            match op {
                Operation::Evict {
                    job,
                    task,
                    node,
                    previous,
                    reason,
                } => {
                    let applied = match self.session.snapshot().task(&job, &task) {
                        Ok(live) => {
                            let live = live.clone();
                            self.session.evictor_mut().evict(&live, &reason)
                        }
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = applied {
                        error!(%job, %task, %node, error = %e, "eviction failed, restoring task");
                        self.restore_status(&job, &task, previous);
                        short_nodes.insert(node);
                        continue;
                    }
                    committed.push(CommittedOperation::Evicted {
                        job,
                        task,
                        node,
                        reason,
                    });
                }
                Operation::Pipeline { job, task, node } => {
                    committed.push(CommittedOperation::Pipelined { job, task, node });
                }
            }
        }

        for node in &short_nodes {
            self.withdraw_overflow(node, &mut committed);
        }

        let evictions = committed
            .iter()
            .filter(|op| matches!(op, CommittedOperation::Evicted { .. }))
            .count();
        let pipelines = committed.len() - evictions;
        for op in committed {
            self.session.record(op);
        }

        self.session.metrics().record_commit(evictions, pipelines);
        debug!(evictions, pipelines, "statement committed");
    }

    /// Undo the newest pipelines on `node` until what is pipelined there
    /// fits in its idle plus releasing capacity.
    fn withdraw_overflow(&mut self, node: &str, committed: &mut Vec<CommittedOperation>) {
        while self.overfilled(node) {
            let Some(pos) = committed.iter().rposition(
                |op| matches!(op, CommittedOperation::Pipelined { node: n, .. } if n == node),
            ) else {
                break;
            };
            if let CommittedOperation::Pipelined { job, task, .. } = committed.remove(pos) {
                warn!(%job, %task, node, "capacity lost to rejected eviction, withdrawing pipeline");
                if let Err(e) = self.session.snapshot_mut().unpipeline_task(&job, &task) {
                    error!(%job, %task, node, error = %e, "failed to undo pipeline");
                    break;
                }
            }
        }
    }

    fn overfilled(&self, node: &str) -> bool {
        self.session.snapshot().node(node).is_some_and(|n| {
            let mut room = n.idle().clone();
            room.add(n.releasing());
            !n.pipelined().less_equal(&room)
        })
    }

    /// Roll back every logged operation, newest first.
    pub fn discard(mut self) {
        self.finished = true;
        self.rollback();
    }

    fn rollback(&mut self) {
        let count = self.operations.len();
        while let Some(op) = self.operations.pop() {
            match op {
                Operation::Evict {
                    job, task, previous, ..
                } => self.restore_status(&job, &task, previous),
                Operation::Pipeline { job, task, node } => {
                    if let Err(e) = self.session.snapshot_mut().unpipeline_task(&job, &task) {
                        error!(%job, %task, %node, error = %e, "failed to undo pipeline");
                    }
                }
            }
        }
        debug!(operations = count, "statement discarded");
    }

    fn restore_status(&mut self, job: &str, task: &str, previous: TaskStatus) {
        if let Err(e) = self
            .session
            .snapshot_mut()
            .set_placed_status(job, task, previous)
        {
            error!(job, task, ?previous, error = %e, "failed to restore task status");
        }
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if !self.operations.is_empty() {
            error!(
                operations = self.operations.len(),
                "statement dropped without commit or discard, discarding"
            );
        }
        self.rollback();
    }
}
