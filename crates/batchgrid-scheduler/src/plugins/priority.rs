//! Priority ordering and priority-based victim selection.

use batchgrid_core::PluginArguments;
use batchgrid_state::{ClusterSnapshot, TaskInfo};

use super::Plugin;
use crate::error::SchedulerResult;
use crate::framework::PolicyTier;

pub const NAME: &str = "priority";

#[derive(Debug, Default)]
pub struct PriorityPlugin;

impl PriorityPlugin {
    pub fn build(_args: &PluginArguments) -> SchedulerResult<Box<dyn Plugin>> {
        Ok(Box::new(Self))
    }
}

impl Plugin for PriorityPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, tier: &mut PolicyTier) {
        tier.add_job_order_fn(NAME, |l, r| r.priority.cmp(&l.priority));
        tier.add_task_order_fn(NAME, |l, r| r.priority.cmp(&l.priority));
        tier.add_preemptable_fn(NAME, lower_priority_victims);
    }
}

/// Candidates of strictly lower priority than the preemptor: task priority
/// within the preemptor's own job, job priority across jobs.
fn lower_priority_victims(
    snapshot: &ClusterSnapshot,
    preemptor: &TaskInfo,
    candidates: &[TaskInfo],
) -> Vec<TaskInfo> {
    let Some(preemptor_job) = snapshot.job(&preemptor.job) else {
        return Vec::new();
    };

    candidates
        .iter()
        .filter(|candidate| {
            if candidate.job == preemptor.job {
                return candidate.priority < preemptor.priority;
            }
            snapshot
                .job(&candidate.job)
                .is_some_and(|job| job.priority < preemptor_job.priority)
        })
        .cloned()
        .collect()
}
