//! Per-node resource accounting.
//!
//! A node tracks four running totals next to its allocatable capacity:
//!
//! - `used` — requests of every non-pipelined task placed on the node
//! - `idle` — `allocatable − used`
//! - `releasing` — requests of tasks being evicted (still inside `used`)
//! - `pipelined` — requests of tasks speculatively placed on the node
//!
//! The projection the preemption logic reasons about is
//! [`NodeInfo::future_idle`] = `idle + releasing − pipelined`.
//! `used` never exceeds `allocatable`: any placement that would push it
//! over is rejected.

use std::collections::BTreeMap;

use batchgrid_core::{NodeName, Resource, TaskId};

use crate::error::{StateError, StateResult};
use crate::types::{TaskInfo, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub name: NodeName,
    pub labels: BTreeMap<String, String>,
    /// Whether the node accepts new work.
    pub ready: bool,
    allocatable: Resource,
    idle: Resource,
    used: Resource,
    releasing: Resource,
    pipelined: Resource,
    tasks: BTreeMap<TaskId, TaskInfo>,
}

impl NodeInfo {
    /// An empty, ready node.
    pub fn new(name: &str, allocatable: Resource) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            ready: true,
            idle: allocatable.clone(),
            allocatable,
            used: Resource::empty(),
            releasing: Resource::empty(),
            pipelined: Resource::empty(),
            tasks: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn allocatable(&self) -> &Resource {
        &self.allocatable
    }

    pub fn idle(&self) -> &Resource {
        &self.idle
    }

    pub fn used(&self) -> &Resource {
        &self.used
    }

    pub fn releasing(&self) -> &Resource {
        &self.releasing
    }

    pub fn pipelined(&self) -> &Resource {
        &self.pipelined
    }

    /// Idle capacity once every releasing task is gone and every
    /// pipelined task has landed.
    pub fn future_idle(&self) -> Resource {
        let mut future = self.idle.clone();
        future.add(&self.releasing).sub(&self.pipelined);
        future
    }

    pub fn task(&self, id: &str) -> Option<&TaskInfo> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.values()
    }

    /// Account for `task` on this node.
    ///
    /// Pipelined tasks are checked against [`NodeInfo::future_idle`];
    /// everything else must fit in `idle`. Nothing changes on error.
    pub fn add_task(&mut self, task: &TaskInfo) -> StateResult<()> {
        if self.tasks.contains_key(&task.uid) {
            return Err(StateError::TaskAlreadyPlaced {
                task: task.uid.clone(),
                node: self.name.clone(),
            });
        }

        match task.status {
            TaskStatus::Pipelined => {
                let future = self.future_idle();
                if !task.resreq.less_equal(&future) {
                    return Err(self.insufficient(&task.resreq, future));
                }
                self.pipelined.add(&task.resreq);
            }
            TaskStatus::Releasing => {
                self.take_idle(&task.resreq)?;
                self.releasing.add(&task.resreq);
                self.used.add(&task.resreq);
            }
            _ => {
                self.take_idle(&task.resreq)?;
                self.used.add(&task.resreq);
            }
        }

        let mut placed = task.clone();
        placed.node_name = Some(self.name.clone());
        self.tasks.insert(placed.uid.clone(), placed);
        Ok(())
    }

    /// Drop `id` from this node, returning its resources.
    pub fn remove_task(&mut self, id: &str) -> StateResult<TaskInfo> {
        let task = self
            .tasks
            .remove(id)
            .ok_or_else(|| StateError::TaskNotPlaced(id.to_string()))?;

        match task.status {
            TaskStatus::Pipelined => {
                self.pipelined.sub(&task.resreq);
            }
            TaskStatus::Releasing => {
                self.releasing.sub(&task.resreq);
                self.idle.add(&task.resreq);
                self.used.sub(&task.resreq);
            }
            _ => {
                self.idle.add(&task.resreq);
                self.used.sub(&task.resreq);
            }
        }
        Ok(task)
    }

    /// Replace the node's copy of `task` (e.g. after a status change).
    ///
    /// On failure the previous copy is restored.
    pub fn update_task(&mut self, task: &TaskInfo) -> StateResult<()> {
        let previous = self.remove_task(&task.uid)?;
        if let Err(e) = self.add_task(task) {
            self.add_task(&previous)?;
            return Err(e);
        }
        Ok(())
    }

    fn take_idle(&mut self, req: &Resource) -> StateResult<()> {
        if !req.less_equal(&self.idle) {
            return Err(self.insufficient(req, self.idle.clone()));
        }
        self.idle.sub(req);
        Ok(())
    }

    fn insufficient(&self, requested: &Resource, available: Resource) -> StateError {
        StateError::InsufficientResources {
            node: self.name.clone(),
            requested: requested.clone(),
            available,
        }
    }
}
