//! Stock feasibility checks.
//!
//! Each check answers one question about a (task, node) pair. They test
//! static fit only: a node that is full right now still passes
//! [`check_allocatable`], since preemption may free it.

use batchgrid_state::{NodeInfo, TaskInfo};

use crate::pipeline::FitError;

/// Reject nodes that are not accepting work.
pub fn check_node_ready(node: &NodeInfo) -> Result<(), FitError> {
    if node.ready {
        Ok(())
    } else {
        Err(FitError::new(&node.name, "node is not ready"))
    }
}

/// Every `node_selector` label of the task must match the node.
pub fn check_node_selector(task: &TaskInfo, node: &NodeInfo) -> Result<(), FitError> {
    for (key, value) in &task.node_selector {
        match node.labels.get(key) {
            Some(v) if v == value => {}
            _ => {
                return Err(FitError::new(
                    &node.name,
                    format!("node selector {key}={value} does not match"),
                ));
            }
        }
    }
    Ok(())
}

/// The task's admission request must fit the node's total capacity.
pub fn check_allocatable(task: &TaskInfo, node: &NodeInfo) -> Result<(), FitError> {
    if task.init_resreq.less_equal(node.allocatable()) {
        Ok(())
    } else {
        Err(FitError::new(
            &node.name,
            format!(
                "request <{}> exceeds allocatable <{}>",
                task.init_resreq,
                node.allocatable()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchgrid_core::{CPU, Resource};

    fn cpu(n: u64) -> Resource {
        Resource::empty().with(CPU, n)
    }

    #[test]
    fn rejects_unready_node() {
        let mut node = NodeInfo::new("n1", cpu(1000));
        node.ready = false;
        assert!(check_node_ready(&node).is_err());
    }

    #[test]
    fn selector_must_match_every_label() {
        let node = NodeInfo::new("n1", cpu(1000)).with_label("zone", "a");
        let ok = TaskInfo::new("t", cpu(1)).with_node_selector("zone", "a");
        let wrong = TaskInfo::new("t", cpu(1)).with_node_selector("zone", "b");
        let missing = TaskInfo::new("t", cpu(1)).with_node_selector("gpu", "true");

        assert!(check_node_selector(&ok, &node).is_ok());
        assert!(check_node_selector(&wrong, &node).is_err());
        assert!(check_node_selector(&missing, &node).is_err());
    }

    #[test]
    fn allocatable_ignores_current_usage() {
        let mut node = NodeInfo::new("n1", cpu(2000));
        node.add_task(&TaskInfo::new("busy", cpu(2000)).running_on("n1"))
            .unwrap();

        assert!(check_allocatable(&TaskInfo::new("t", cpu(2000)), &node).is_ok());
        let err = check_allocatable(&TaskInfo::new("t", cpu(3000)), &node).unwrap_err();
        assert!(err.reason.contains("exceeds allocatable"));
    }
}
