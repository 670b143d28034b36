//! Domain types for the cluster snapshot: tasks, jobs, and queues.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use batchgrid_core::{JobId, NodeName, QueueId, Resource, TaskId};

use crate::error::{StateError, StateResult};

pub(crate) fn default_namespace() -> String {
    "default".to_string()
}

// ── Task ─────────────────────────────────────────────────────────

/// Lifecycle status of a task as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting for a node.
    Pending,
    /// Assigned to a node in this cycle, not yet bound.
    Allocated,
    /// Speculatively placed on a node whose capacity is still being freed.
    Pipelined,
    /// Bind request in flight.
    Binding,
    /// Bound to a node, not yet running.
    Bound,
    Running,
    /// Being evicted; its resources will come back to the node.
    Releasing,
    Succeeded,
    Failed,
    Unknown,
}

impl TaskStatus {
    /// Holds resources on its node.
    pub fn is_allocated(self) -> bool {
        matches!(
            self,
            TaskStatus::Allocated | TaskStatus::Binding | TaskStatus::Bound | TaskStatus::Running
        )
    }

    /// Counts toward the job's ready tasks.
    pub fn is_ready(self) -> bool {
        self.is_allocated() || self == TaskStatus::Succeeded
    }

    /// Appears in a node's task map.
    pub fn is_placed(self) -> bool {
        self.is_allocated() || matches!(self, TaskStatus::Releasing | TaskStatus::Pipelined)
    }
}

/// A single placeable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub uid: TaskId,
    /// Owning job; filled in when the task is added to a job.
    #[serde(default)]
    pub job: JobId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub priority: i32,
    pub status: TaskStatus,
    #[serde(default)]
    pub node_name: Option<NodeName>,
    /// Resources the task consumes while placed.
    pub resreq: Resource,
    /// Resources the task needs to be admitted; defaults to `resreq`.
    #[serde(default)]
    pub init_resreq: Resource,
    /// Node labels that must all match.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    /// Node labels that raise a node's score when they match.
    #[serde(default)]
    pub preferred_labels: BTreeMap<String, String>,
}

impl TaskInfo {
    /// A pending task requesting `resreq`.
    pub fn new(uid: &str, resreq: Resource) -> Self {
        Self {
            uid: uid.to_string(),
            job: String::new(),
            name: uid.to_string(),
            namespace: default_namespace(),
            priority: 0,
            status: TaskStatus::Pending,
            node_name: None,
            init_resreq: resreq.clone(),
            resreq,
            node_selector: BTreeMap::new(),
            preferred_labels: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the task as running on `node`.
    pub fn running_on(mut self, node: &str) -> Self {
        self.status = TaskStatus::Running;
        self.node_name = Some(node.to_string());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_node_selector(mut self, key: &str, value: &str) -> Self {
        self.node_selector.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_preferred_label(mut self, key: &str, value: &str) -> Self {
        self.preferred_labels.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Job ──────────────────────────────────────────────────────────

/// Admission phase of a job's gang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobPhase {
    /// Not yet admitted; the scheduler leaves it alone.
    Pending,
    /// Admitted to its queue, waiting for resources.
    Inqueue,
    #[default]
    Running,
    Unknown,
}

/// A gang-scheduled group of tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub uid: JobId,
    pub name: String,
    pub namespace: String,
    pub queue: QueueId,
    pub priority: i32,
    /// Minimum number of tasks that must run together.
    pub min_available: u32,
    pub phase: JobPhase,
    /// Seconds since epoch; older jobs win ordering ties.
    pub creation_timestamp: u64,
    tasks: BTreeMap<TaskId, TaskInfo>,
    task_status_index: BTreeMap<TaskStatus, BTreeSet<TaskId>>,
}

impl JobInfo {
    pub fn new(uid: &str, queue: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: uid.to_string(),
            namespace: default_namespace(),
            queue: queue.to_string(),
            priority: 0,
            min_available: 1,
            phase: JobPhase::default(),
            creation_timestamp: 0,
            tasks: BTreeMap::new(),
            task_status_index: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_available(mut self, min_available: u32) -> Self {
        self.min_available = min_available;
        self
    }

    pub fn with_phase(mut self, phase: JobPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_creation_timestamp(mut self, ts: u64) -> Self {
        self.creation_timestamp = ts;
        self
    }

    /// Take ownership of `task`, stamping it with this job's id.
    pub fn add_task(&mut self, mut task: TaskInfo) -> StateResult<()> {
        if self.tasks.contains_key(&task.uid) {
            return Err(StateError::DuplicateTask {
                job: self.uid.clone(),
                task: task.uid,
            });
        }
        task.job = self.uid.clone();
        if task.init_resreq.is_empty() {
            task.init_resreq = task.resreq.clone();
        }
        self.task_status_index
            .entry(task.status)
            .or_default()
            .insert(task.uid.clone());
        self.tasks.insert(task.uid.clone(), task);
        Ok(())
    }

    pub fn task(&self, id: &str) -> Option<&TaskInfo> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.values()
    }

    /// Tasks currently in `status`, in id order.
    pub fn tasks_in(&self, status: TaskStatus) -> impl Iterator<Item = &TaskInfo> {
        self.task_status_index
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.task_status_index.get(&status).map_or(0, BTreeSet::len)
    }

    /// Tasks occupying or done with resources toward the gang minimum.
    pub fn ready_task_num(&self) -> u32 {
        self.count_where(TaskStatus::is_ready)
    }

    /// Tasks speculatively placed in the current cycle.
    pub fn waiting_task_num(&self) -> u32 {
        self.count(TaskStatus::Pipelined) as u32
    }

    /// Tasks that can still contribute to the gang.
    pub fn valid_task_num(&self) -> u32 {
        self.count_where(|s| {
            s.is_ready() || matches!(s, TaskStatus::Pipelined | TaskStatus::Pending)
        })
    }

    fn count_where(&self, pred: impl Fn(TaskStatus) -> bool) -> u32 {
        self.task_status_index
            .iter()
            .filter(|(status, _)| pred(**status))
            .map(|(_, ids)| ids.len() as u32)
            .sum()
    }

    /// Move a task to `status`, returning the status it had before.
    pub(crate) fn update_task_status(
        &mut self,
        id: &str,
        status: TaskStatus,
    ) -> StateResult<TaskStatus> {
        let task = self.tasks.get_mut(id).ok_or_else(|| StateError::TaskNotFound {
            job: self.uid.clone(),
            task: id.to_string(),
        })?;
        let previous = task.status;
        if previous == status {
            return Ok(previous);
        }
        task.status = status;
        if let Some(ids) = self.task_status_index.get_mut(&previous) {
            ids.remove(id);
            if ids.is_empty() {
                self.task_status_index.remove(&previous);
            }
        }
        self.task_status_index
            .entry(status)
            .or_default()
            .insert(id.to_string());
        Ok(previous)
    }

    pub(crate) fn set_task_node(&mut self, id: &str, node: Option<NodeName>) -> StateResult<()> {
        let task = self.tasks.get_mut(id).ok_or_else(|| StateError::TaskNotFound {
            job: self.uid.clone(),
            task: id.to_string(),
        })?;
        task.node_name = node;
        Ok(())
    }
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Queue ────────────────────────────────────────────────────────

/// Top-level grouping of jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub uid: QueueId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl QueueInfo {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: uid.to_string(),
            weight: default_weight(),
        }
    }
}
