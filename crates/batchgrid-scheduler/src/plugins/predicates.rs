//! Node feasibility: readiness, node selectors, allocatable fit.

use batchgrid_core::PluginArguments;
use batchgrid_placement::predicates::{check_allocatable, check_node_ready, check_node_selector};

use super::Plugin;
use crate::error::SchedulerResult;
use crate::framework::PolicyTier;

pub const NAME: &str = "predicates";

#[derive(Debug, Default)]
pub struct PredicatesPlugin;

impl PredicatesPlugin {
    pub fn build(_args: &PluginArguments) -> SchedulerResult<Box<dyn Plugin>> {
        Ok(Box::new(Self))
    }
}

impl Plugin for PredicatesPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn register(&self, tier: &mut PolicyTier) {
        tier.add_predicate_fn(NAME, |task, node| {
            check_node_ready(node)?;
            check_node_selector(task, node)?;
            check_allocatable(task, node)
        });
    }
}
