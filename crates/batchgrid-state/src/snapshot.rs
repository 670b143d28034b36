//! The per-cycle cluster snapshot.
//!
//! Built from a [`SnapshotDocument`] (JSON) or assembled directly with
//! [`ClusterSnapshot::add_queue`], [`ClusterSnapshot::add_node`] and
//! [`ClusterSnapshot::add_job`]. Adding a job places every task that
//! names a node onto that node, so a snapshot whose tasks overcommit a
//! node is rejected up front.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use batchgrid_core::{JobId, NodeName, QueueId, Resource};

use crate::error::{StateError, StateResult};
use crate::node::NodeInfo;
use crate::types::{JobInfo, JobPhase, QueueInfo, TaskInfo, TaskStatus, default_namespace};

/// Serialized form of a snapshot as produced by the synchronization layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub queues: Vec<QueueInfo>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: NodeName,
    pub allocatable: Resource,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_ready")]
    pub ready: bool,
}

fn default_ready() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub uid: JobId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub queue: QueueId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_min_available")]
    pub min_available: u32,
    #[serde(default)]
    pub phase: JobPhase,
    #[serde(default)]
    pub creation_timestamp: u64,
    #[serde(default)]
    pub tasks: Vec<TaskInfo>,
}

fn default_min_available() -> u32 {
    1
}

/// Queues, jobs and nodes for one scheduling cycle.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    queues: BTreeMap<QueueId, QueueInfo>,
    jobs: BTreeMap<JobId, JobInfo>,
    nodes: BTreeMap<NodeName, NodeInfo>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> StateResult<Self> {
        let doc: SnapshotDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Build indexes and node accounting from a document.
    pub fn from_document(doc: SnapshotDocument) -> StateResult<Self> {
        let mut snapshot = Self::new();

        for queue in doc.queues {
            snapshot.add_queue(queue)?;
        }
        for spec in doc.nodes {
            let mut node = NodeInfo::new(&spec.name, spec.allocatable);
            node.labels = spec.labels;
            node.ready = spec.ready;
            snapshot.add_node(node)?;
        }
        for spec in doc.jobs {
            let mut job = JobInfo::new(&spec.uid, &spec.queue)
                .with_priority(spec.priority)
                .with_min_available(spec.min_available)
                .with_phase(spec.phase)
                .with_creation_timestamp(spec.creation_timestamp);
            if !spec.name.is_empty() {
                job.name = spec.name;
            }
            job.namespace = spec.namespace;
            for mut task in spec.tasks {
                if task.name.is_empty() {
                    task.name = task.uid.clone();
                }
                job.add_task(task)?;
            }
            snapshot.add_job(job)?;
        }

        debug!(
            queues = snapshot.queues.len(),
            jobs = snapshot.jobs.len(),
            nodes = snapshot.nodes.len(),
            "snapshot built"
        );
        Ok(snapshot)
    }

    pub fn add_queue(&mut self, queue: QueueInfo) -> StateResult<()> {
        if self.queues.contains_key(&queue.uid) {
            return Err(StateError::DuplicateQueue(queue.uid));
        }
        self.queues.insert(queue.uid.clone(), queue);
        Ok(())
    }

    pub fn add_node(&mut self, node: NodeInfo) -> StateResult<()> {
        if self.nodes.contains_key(&node.name) {
            return Err(StateError::DuplicateNode(node.name));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Add a job and place its node-bound tasks.
    ///
    /// Fails without modifying the snapshot if any task names an unknown
    /// node or would overcommit one.
    pub fn add_job(&mut self, job: JobInfo) -> StateResult<()> {
        if self.jobs.contains_key(&job.uid) {
            return Err(StateError::DuplicateJob(job.uid));
        }

        let mut staged = self.nodes.clone();
        for task in job.tasks().filter(|t| t.status.is_placed()) {
            let Some(node_name) = &task.node_name else {
                return Err(StateError::TaskNotPlaced(task.uid.clone()));
            };
            let node = staged
                .get_mut(node_name)
                .ok_or_else(|| StateError::NodeNotFound(node_name.clone()))?;
            node.add_task(task)?;
        }

        self.nodes = staged;
        self.jobs.insert(job.uid.clone(), job);
        Ok(())
    }

    pub fn queue(&self, id: &str) -> Option<&QueueInfo> {
        self.queues.get(id)
    }

    pub fn queues(&self) -> impl Iterator<Item = &QueueInfo> {
        self.queues.values()
    }

    pub fn job(&self, id: &str) -> Option<&JobInfo> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobInfo> {
        self.jobs.values()
    }

    pub fn node(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    /// Live copy of a task, looked up through its job.
    pub fn task(&self, job: &str, task: &str) -> StateResult<&TaskInfo> {
        self.job(job)
            .ok_or_else(|| StateError::JobNotFound(job.to_string()))?
            .task(task)
            .ok_or_else(|| StateError::TaskNotFound {
                job: job.to_string(),
                task: task.to_string(),
            })
    }

    /// Move a placed task to another placed status (e.g. Running → Releasing),
    /// keeping job and node copies in step. Returns the previous status.
    pub fn set_placed_status(
        &mut self,
        job_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> StateResult<TaskStatus> {
        let task = self.task(job_id, task_id)?;
        let node_name = task
            .node_name
            .clone()
            .ok_or_else(|| StateError::TaskNotPlaced(task_id.to_string()))?;
        if !task.status.is_placed() || !status.is_placed() {
            return Err(StateError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }

        let mut updated = task.clone();
        updated.status = status;
        self.nodes
            .get_mut(&node_name)
            .ok_or_else(|| StateError::NodeNotFound(node_name.clone()))?
            .update_task(&updated)?;

        self.job_mut(job_id)?.update_task_status(task_id, status)
    }

    /// Place a pending task on `node_name` as [`TaskStatus::Pipelined`].
    pub fn pipeline_task(&mut self, job_id: &str, task_id: &str, node_name: &str) -> StateResult<()> {
        let task = self.task(job_id, task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(StateError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status,
                to: TaskStatus::Pipelined,
            });
        }

        let mut placed = task.clone();
        placed.status = TaskStatus::Pipelined;
        placed.node_name = Some(node_name.to_string());
        self.nodes
            .get_mut(node_name)
            .ok_or_else(|| StateError::NodeNotFound(node_name.to_string()))?
            .add_task(&placed)?;

        let job = self.job_mut(job_id)?;
        job.update_task_status(task_id, TaskStatus::Pipelined)?;
        job.set_task_node(task_id, Some(node_name.to_string()))
    }

    /// Undo [`ClusterSnapshot::pipeline_task`]: the task goes back to pending.
    pub fn unpipeline_task(&mut self, job_id: &str, task_id: &str) -> StateResult<()> {
        let task = self.task(job_id, task_id)?;
        if task.status != TaskStatus::Pipelined {
            return Err(StateError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status,
                to: TaskStatus::Pending,
            });
        }
        let node_name = task
            .node_name
            .clone()
            .ok_or_else(|| StateError::TaskNotPlaced(task_id.to_string()))?;

        self.nodes
            .get_mut(&node_name)
            .ok_or_else(|| StateError::NodeNotFound(node_name.clone()))?
            .remove_task(task_id)?;

        let job = self.job_mut(job_id)?;
        job.update_task_status(task_id, TaskStatus::Pending)?;
        job.set_task_node(task_id, None)
    }

    /// Nodes whose committed usage exceeds their allocatable capacity.
    ///
    /// Always empty for a snapshot mutated only through this API.
    pub fn overcommitted_nodes(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| !n.used().less_equal(n.allocatable()))
            .map(|n| n.name.as_str())
            .collect()
    }

    fn job_mut(&mut self, id: &str) -> StateResult<&mut JobInfo> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| StateError::JobNotFound(id.to_string()))
    }
}
