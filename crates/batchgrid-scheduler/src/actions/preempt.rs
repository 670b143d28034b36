//! The preempt action.
//!
//! Makes room for pending tasks by evicting running ones, in two passes
//! per queue:
//!
//! 1. **Cross-job**: preemptor jobs are popped in job order. Each gets one
//!    statement; its pending tasks may evict running tasks of *other* jobs
//!    in the same queue. The statement is committed only if the job ends
//!    up pipelined; otherwise it is discarded, its tasks go back to its
//!    pending queue, and the job is not retried across jobs this cycle.
//! 2. **Intra-job**: each pending task may evict running tasks of its *own*
//!    job, one statement per task, always committed. The first task that
//!    cannot be placed ends the pass for that job.
//!
//! For a single preemptor ([`try_preempt`]) nodes are filtered, scored and
//! tried best first. On each node the policy picks victims, which must be
//! able to cover the request; they are then evicted lowest priority first
//! until the request fits, and the preemptor is pipelined there.
//!
//! ```text
//! jobs ──▶ valid? ──▶ pending & not pipelined? ──▶ per-queue job queue
//!                                                   │
//!              ┌────────────── cross-job ───────────┘
//!              ▼
//!        statement ─▶ try_preempt(task)* ─▶ pipelined? commit : discard
//!              │
//!              └────────────── intra-job ─▶ try_preempt(task) ─▶ commit
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use batchgrid_core::{JobId, QueueId, Resource};
use batchgrid_placement::{predicate_nodes, prioritize_nodes, sort_nodes};
use batchgrid_state::{ClusterSnapshot, JobInfo, JobPhase, NodeInfo, TaskInfo, TaskStatus};

use super::Action;
use crate::framework::{Policies, Session, Statement};
use crate::queue::PriorityQueue;

pub const NAME: &str = "preempt";

/// Reason handed to the evictor for every eviction this action makes.
pub const EVICT_REASON: &str = "preempt";

#[derive(Debug, Default, Clone, Copy)]
pub struct PreemptAction;

impl PreemptAction {
    pub fn new() -> Self {
        Self
    }
}

/// Why a node's victims cannot make room for a preemptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VictimError {
    #[error("no victims")]
    NoVictims,

    #[error("not enough resources: requested <{requested}>, future idle with victims <{available}>")]
    NotEnoughResources {
        requested: Resource,
        available: Resource,
    },
}

/// Victims must be non-empty, and evicting all of them must free enough
/// for the preemptor's admission request.
pub fn validate_victims(
    preemptor: &TaskInfo,
    node: &NodeInfo,
    victims: &[TaskInfo],
) -> Result<(), VictimError> {
    if victims.is_empty() {
        return Err(VictimError::NoVictims);
    }

    let mut available = node.future_idle();
    for victim in victims {
        available.add(&victim.resreq);
    }
    if !preemptor.init_resreq.less_equal(&available) {
        return Err(VictimError::NotEnoughResources {
            requested: preemptor.init_resreq.clone(),
            available,
        });
    }
    Ok(())
}

impl Action for PreemptAction {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(&self, ssn: &mut Session) {
        debug!("enter preempt");
        let policies = Arc::clone(ssn.policies());

        let mut preemptors: BTreeMap<QueueId, PriorityQueue<JobInfo>> = BTreeMap::new();
        let mut preemptor_tasks: BTreeMap<JobId, PriorityQueue<TaskInfo>> = BTreeMap::new();
        let mut under_request: Vec<JobId> = Vec::new();
        let mut queues: BTreeSet<QueueId> = BTreeSet::new();

        for job in ssn.snapshot().jobs() {
            if job.phase == JobPhase::Pending {
                continue;
            }
            if let Some(result) = policies.job_valid(job) {
                debug!(job = %job.uid, reason = %result.reason, message = %result.message, "skip invalid job");
                continue;
            }
            if ssn.queue(&job.queue).is_none() {
                debug!(job = %job.uid, queue = %job.queue, "queue not found, skip job");
                continue;
            }
            queues.insert(job.queue.clone());

            if job.count(TaskStatus::Pending) > 0 && !policies.job_pipelined(job) {
                preemptors
                    .entry(job.queue.clone())
                    .or_insert_with(|| job_queue(&policies))
                    .push(job.clone());
                under_request.push(job.uid.clone());

                let mut tasks = task_queue(&policies);
                tasks.extend(job.tasks_in(TaskStatus::Pending).cloned());
                preemptor_tasks.insert(job.uid.clone(), tasks);
            }
        }

        for queue in &queues {
            // Preemption between jobs of the same queue.
            loop {
                let Some(preemptor_job) = preemptors.get_mut(queue).and_then(|q| q.pop()) else {
                    break;
                };

                let mut stmt = ssn.statement();
                let mut assigned = false;
                let mut attempted = Vec::new();
                loop {
                    let Some(job) = stmt.snapshot().job(&preemptor_job.uid) else {
                        break;
                    };
                    if policies.job_pipelined(job) {
                        break;
                    }
                    let Some(preemptor) = preemptor_tasks
                        .get_mut(&preemptor_job.uid)
                        .and_then(|q| q.pop())
                    else {
                        break;
                    };

                    let filter = |snapshot: &ClusterSnapshot, task: &TaskInfo| {
                        task.status == TaskStatus::Running
                            && task.job != preemptor.job
                            && snapshot
                                .job(&task.job)
                                .is_some_and(|j| j.queue == preemptor_job.queue)
                    };
                    if try_preempt(&mut stmt, &policies, &preemptor, filter) {
                        assigned = true;
                    }
                    attempted.push(preemptor);
                }

                let pipelined = stmt
                    .snapshot()
                    .job(&preemptor_job.uid)
                    .is_some_and(|j| policies.job_pipelined(j));
                if pipelined {
                    stmt.commit();
                } else {
                    debug!(job = %preemptor_job.uid, operations = stmt.len(), "preemptor job not pipelined, discarding");
                    stmt.discard();
                    // Rolled back to pending; still eligible for intra-job preemption.
                    if let Some(tasks) = preemptor_tasks.get_mut(&preemptor_job.uid) {
                        tasks.extend(attempted);
                    }
                    continue;
                }

                if assigned {
                    if let (Some(job), Some(q)) = (ssn.job(&preemptor_job.uid), preemptors.get_mut(queue)) {
                        q.push(job.clone());
                    }
                }
            }

            // Preemption between tasks of the same job.
            for job_id in &under_request {
                loop {
                    let Some(preemptor) = preemptor_tasks.get_mut(job_id).and_then(|q| q.pop()) else {
                        break;
                    };

                    let mut stmt = ssn.statement();
                    let filter = |_: &ClusterSnapshot, task: &TaskInfo| {
                        task.status == TaskStatus::Running && task.job == preemptor.job
                    };
                    let assigned = try_preempt(&mut stmt, &policies, &preemptor, filter);
                    stmt.commit();

                    if !assigned {
                        break;
                    }
                }
            }
        }

        debug!("leave preempt");
    }
}

/// Try to pipeline `preemptor` onto the first node, best score first,
/// where victims accepted by `filter` and the preemptable policy can make
/// room. Evictions and the placement go into `stmt`.
///
/// Returns whether the preemptor was pipelined.
pub fn try_preempt<F>(
    stmt: &mut Statement<'_>,
    policies: &Arc<Policies>,
    preemptor: &TaskInfo,
    filter: F,
) -> bool
where
    F: Fn(&ClusterSnapshot, &TaskInfo) -> bool,
{
    let metrics = Arc::clone(stmt.session().metrics());

    let ranked = {
        let snapshot = stmt.snapshot();
        let (feasible, fit_errors) =
            predicate_nodes(preemptor, snapshot.nodes(), |t, n| policies.predicate(t, n));
        if !fit_errors.is_empty() {
            debug!(task = %preemptor.uid, errors = %fit_errors, "nodes filtered out");
        }
        sort_nodes(prioritize_nodes(
            preemptor,
            &feasible,
            |t, nodes| policies.batch_node_order(t, nodes),
            |t, node| policies.node_order_map(t, node),
            |t, scores| policies.node_order_reduce(t, scores),
        ))
    };

    for node_name in ranked {
        let victims = {
            let snapshot = stmt.snapshot();
            let Some(node) = snapshot.node(&node_name) else {
                continue;
            };
            let candidates: Vec<TaskInfo> = node
                .tasks()
                .filter(|t| filter(snapshot, *t))
                .cloned()
                .collect();
            let victims = policies.preemptable(snapshot, preemptor, &candidates);
            metrics.observe_victims(victims.len());

            if let Err(err) = validate_victims(preemptor, node, &victims) {
                debug!(task = %preemptor.uid, node = %node_name, reason = %err, "victims cannot make room");
                continue;
            }
            victims
        };

        let order = Arc::clone(policies);
        let mut victim_queue =
            PriorityQueue::new(move |l: &TaskInfo, r: &TaskInfo| order.task_order(r, l).is_lt());
        victim_queue.extend(victims);
        debug!(
            task = %preemptor.uid,
            node = %node_name,
            victims = victim_queue.len(),
            "evicting for preemptor"
        );

        while !fits(stmt, preemptor, &node_name) {
            let Some(victim) = victim_queue.pop() else {
                break;
            };
            if let Err(e) = stmt.evict(&victim, EVICT_REASON) {
                error!(task = %victim.uid, node = %node_name, error = %e, "failed to evict victim");
            }
        }
        metrics.register_attempt();

        if fits(stmt, preemptor, &node_name) {
            match stmt.pipeline(preemptor, &node_name) {
                Ok(()) => {
                    debug!(task = %preemptor.uid, node = %node_name, "preemptor pipelined");
                    return true;
                }
                Err(e) => {
                    warn!(task = %preemptor.uid, node = %node_name, error = %e, "failed to pipeline preemptor");
                }
            }
        }
    }
    false
}

fn fits(stmt: &Statement<'_>, preemptor: &TaskInfo, node: &str) -> bool {
    stmt.snapshot()
        .node(node)
        .is_some_and(|n| preemptor.init_resreq.less_equal(&n.future_idle()))
}

fn job_queue(policies: &Arc<Policies>) -> PriorityQueue<JobInfo> {
    let order = Arc::clone(policies);
    PriorityQueue::new(move |l: &JobInfo, r: &JobInfo| order.job_order(l, r).is_lt())
}

fn task_queue(policies: &Arc<Policies>) -> PriorityQueue<TaskInfo> {
    let order = Arc::clone(policies);
    PriorityQueue::new(move |l: &TaskInfo, r: &TaskInfo| order.task_order(l, r).is_lt())
}
