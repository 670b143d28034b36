//! Shared builders for scheduler integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use batchgrid_core::{CPU, Hook, PluginOption, Resource, SchedulerConfig, Tier};
use batchgrid_scheduler::{Evictor, PluginRegistry, Scheduler, SchedulerError, SchedulerResult};
use batchgrid_state::{ClusterSnapshot, JobInfo, NodeInfo, QueueInfo, TaskInfo};

pub fn cpu(n: u64) -> Resource {
    Resource::empty().with(CPU, n)
}

/// Built-in plugins, with gang's victim protection switched off so that
/// single-task jobs can be preempted.
pub fn permissive_config() -> SchedulerConfig {
    SchedulerConfig {
        actions: vec!["preempt".into()],
        tiers: vec![
            Tier {
                plugins: vec![
                    PluginOption::named("priority"),
                    PluginOption::named("gang").without(Hook::Preemptable),
                ],
            },
            Tier {
                plugins: vec![PluginOption::named("predicates"), PluginOption::named("nodeorder")],
            },
        ],
    }
}

pub fn scheduler(config: &SchedulerConfig) -> Scheduler {
    Scheduler::new(config, &PluginRegistry::builtin()).unwrap()
}

/// A snapshot with queue `q1` and the given `(name, cpu)` nodes.
pub fn cluster(nodes: &[(&str, u64)]) -> ClusterSnapshot {
    let mut snapshot = ClusterSnapshot::new();
    snapshot.add_queue(QueueInfo::new("q1")).unwrap();
    for (name, capacity) in nodes {
        snapshot.add_node(NodeInfo::new(name, cpu(*capacity))).unwrap();
    }
    snapshot
}

pub fn add_job(snapshot: &mut ClusterSnapshot, job: JobInfo, tasks: Vec<TaskInfo>) {
    let mut job = job;
    for task in tasks {
        job.add_task(task).unwrap();
    }
    snapshot.add_job(job).unwrap();
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures")
        .join(name)
}

/// Records every eviction it accepts; rejects the listed task ids.
#[derive(Clone, Default)]
pub struct RecordingEvictor {
    pub evicted: Arc<Mutex<Vec<String>>>,
    pub reject: Vec<String>,
}

impl RecordingEvictor {
    pub fn rejecting(task: &str) -> Self {
        Self {
            reject: vec![task.to_string()],
            ..Self::default()
        }
    }

    pub fn evicted(&self) -> Vec<String> {
        self.evicted.lock().unwrap().clone()
    }
}

impl Evictor for RecordingEvictor {
    fn evict(&mut self, task: &TaskInfo, reason: &str) -> SchedulerResult<()> {
        if self.reject.contains(&task.uid) {
            return Err(SchedulerError::EvictionRejected {
                task: task.uid.clone(),
                reason: format!("{reason} refused"),
            });
        }
        self.evicted.lock().unwrap().push(task.uid.clone());
        Ok(())
    }
}

/// Every node keeps `used ≤ allocatable` and `pipelined ≤ idle + releasing`.
pub fn assert_safe(snapshot: &ClusterSnapshot) {
    assert!(
        snapshot.overcommitted_nodes().is_empty(),
        "overcommitted: {:?}",
        snapshot.overcommitted_nodes()
    );
    for node in snapshot.nodes() {
        let mut room = node.idle().clone();
        room.add(node.releasing());
        assert!(
            node.pipelined().less_equal(&room),
            "node {} pipelines <{}> beyond <{}>",
            node.name,
            node.pipelined(),
            room
        );
    }
}
