//! Gang scheduling: a job only counts once `min_available` of its tasks
//! can run together.
//!
//! - **validity**: fewer than `min_available` tasks that could still run
//!   fails with `NotEnoughPods`
//! - **pipelined**: ready + pipelined tasks reach `min_available`
//! - **order**: jobs that are not yet ready go first
//! - **victims**: only tasks occupied beyond their job's minimum

use std::cmp::Ordering;
use std::collections::BTreeMap;

use batchgrid_core::PluginArguments;
use batchgrid_state::{ClusterSnapshot, JobInfo, TaskInfo};

use super::Plugin;
use crate::error::SchedulerResult;
use crate::framework::{PolicyTier, ValidateResult};

pub const NAME: &str = "gang";

/// Validation failure reason for undersized gangs.
pub const NOT_ENOUGH_PODS: &str = "NotEnoughPods";

#[derive(Debug, Default)]
pub struct GangPlugin;

impl GangPlugin {
    pub fn build(_args: &PluginArguments) -> SchedulerResult<Box<dyn Plugin>> {
        Ok(Box::new(Self))
    }
}

impl Plugin for GangPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, tier: &mut PolicyTier) {
        tier.add_job_valid_fn(NAME, valid_job);
        tier.add_job_pipelined_fn(NAME, |job| {
            job.waiting_task_num() + job.ready_task_num() >= job.min_available
        });
        tier.add_job_order_fn(NAME, |l, r| match (job_ready(l), job_ready(r)) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        });
        tier.add_preemptable_fn(NAME, occupied_beyond_minimum);
    }
}

fn job_ready(job: &JobInfo) -> bool {
    job.ready_task_num() >= job.min_available
}

fn valid_job(job: &JobInfo) -> ValidateResult {
    let valid = job.valid_task_num();
    if valid < job.min_available {
        return ValidateResult::failed(
            NOT_ENOUGH_PODS,
            format!(
                "not enough valid tasks for gang-scheduling, valid: {valid}, min: {}",
                job.min_available
            ),
        );
    }
    ValidateResult::passed()
}

fn occupied_beyond_minimum(
    snapshot: &ClusterSnapshot,
    _preemptor: &TaskInfo,
    candidates: &[TaskInfo],
) -> Vec<TaskInfo> {
    let mut occupied: BTreeMap<&str, u32> = BTreeMap::new();
    let mut victims = Vec::new();

    for candidate in candidates {
        let Some(job) = snapshot.job(&candidate.job) else {
            continue;
        };
        let count = occupied
            .entry(job.uid.as_str())
            .or_insert_with(|| job.ready_task_num());
        if *count > job.min_available {
            *count -= 1;
            victims.push(candidate.clone());
        }
    }
    victims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Policies;
    use batchgrid_core::{CPU, Resource};
    use batchgrid_state::{NodeInfo, TaskStatus};

    fn cpu(n: u64) -> Resource {
        Resource::empty().with(CPU, n)
    }

    fn policies() -> Policies {
        let mut tier = PolicyTier::new();
        GangPlugin.register(&mut tier);
        Policies::new(vec![tier])
    }

    fn gang(uid: &str, min: u32, running: usize, pending: usize) -> JobInfo {
        let mut job = JobInfo::new(uid, "q1").with_min_available(min);
        for i in 0..running {
            job.add_task(TaskInfo::new(&format!("{uid}-r{i}"), cpu(1)).running_on("n1"))
                .unwrap();
        }
        for i in 0..pending {
            job.add_task(TaskInfo::new(&format!("{uid}-p{i}"), cpu(1)))
                .unwrap();
        }
        job
    }

    #[test]
    fn undersized_gang_is_invalid() {
        let policies = policies();
        let mut job = gang("j", 3, 1, 1);
        job.add_task(TaskInfo::new("done", cpu(1)).with_status(TaskStatus::Failed))
            .unwrap();

        let result = policies.job_valid(&job).unwrap();
        assert_eq!(result.reason, NOT_ENOUGH_PODS);
        assert!(result.message.contains("valid: 2, min: 3"));
        assert!(policies.job_valid(&gang("k", 2, 1, 1)).is_none());
    }

    #[test]
    fn pipelined_counts_ready_and_pipelined_tasks() {
        let policies = policies();
        assert!(!policies.job_pipelined(&gang("j", 2, 1, 1)));
        assert!(policies.job_pipelined(&gang("j", 2, 2, 0)));

        let mut job = gang("j", 2, 1, 0);
        job.add_task(
            TaskInfo::new("piped", cpu(1))
                .running_on("n1")
                .with_status(TaskStatus::Pipelined),
        )
        .unwrap();
        assert!(policies.job_pipelined(&job));
    }

    #[test]
    fn unready_jobs_order_first() {
        let policies = policies();
        let ready = gang("a", 1, 1, 0);
        let starving = gang("b", 2, 1, 1);
        assert_eq!(policies.job_order(&starving, &ready), Ordering::Less);
        assert_eq!(policies.job_order(&ready, &starving), Ordering::Greater);
    }

    #[test]
    fn only_tasks_beyond_minimum_are_victims() {
        let mut snapshot = ClusterSnapshot::new();
        snapshot.add_node(NodeInfo::new("n1", cpu(16))).unwrap();
        snapshot.add_job(gang("wide", 2, 4, 0)).unwrap();
        snapshot.add_job(gang("tight", 2, 2, 0)).unwrap();

        let candidates: Vec<TaskInfo> = snapshot.node("n1").unwrap().tasks().cloned().collect();
        let preemptor = TaskInfo::new("p", cpu(1));
        let victims = policies().preemptable(&snapshot, &preemptor, &candidates);

        assert_eq!(victims.len(), 2);
        assert!(victims.iter().all(|t| t.job == "wide"));
    }
}
