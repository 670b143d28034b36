//! Policy plugins and the registry that builds them from configuration.
//!
//! A [`PluginRegistry`] maps plugin names to builders. It is constructed
//! explicitly and handed to [`crate::Scheduler::new`]; nothing is
//! registered process-wide.
//!
//! # Built-in plugins
//!
//! - **`priority`** — job/task order by priority, lower-priority victims only
//! - **`gang`** — min-available validity, pipelined threshold, gang-safe victims
//! - **`predicates`** — node readiness, selectors, allocatable fit
//! - **`nodeorder`** — least-requested / bin-packing / affinity scoring

pub mod gang;
pub mod nodeorder;
pub mod predicates;
pub mod priority;

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use batchgrid_core::{PluginArguments, PluginOption, SchedulerConfig};

use crate::error::{SchedulerError, SchedulerResult};
use crate::framework::{Policies, PolicyTier};

pub use gang::GangPlugin;
pub use nodeorder::NodeOrderPlugin;
pub use predicates::PredicatesPlugin;
pub use priority::PriorityPlugin;

/// A source of policy hooks.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Register this plugin's hooks, tagged with [`Plugin::name`].
    fn register(&self, tier: &mut PolicyTier);
}

/// Builds a plugin from its configured arguments.
pub type PluginBuilder = fn(&PluginArguments) -> SchedulerResult<Box<dyn Plugin>>;

#[derive(Clone, Default)]
pub struct PluginRegistry {
    builders: BTreeMap<String, PluginBuilder>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in plugin.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(priority::NAME, PriorityPlugin::build);
        registry.register(gang::NAME, GangPlugin::build);
        registry.register(predicates::NAME, PredicatesPlugin::build);
        registry.register(nodeorder::NAME, NodeOrderPlugin::build);
        registry
    }

    /// Add or replace the builder for `name`.
    pub fn register(&mut self, name: &str, builder: PluginBuilder) {
        self.builders.insert(name.to_string(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    pub fn build(&self, option: &PluginOption) -> SchedulerResult<Box<dyn Plugin>> {
        let builder = self
            .builders
            .get(&option.name)
            .ok_or_else(|| SchedulerError::UnknownPlugin(option.name.clone()))?;
        builder(&option.arguments)
    }

    /// Build every configured plugin and collect their hooks tier by tier.
    pub fn build_policies(&self, config: &SchedulerConfig) -> SchedulerResult<Policies> {
        config.validate()?;

        let mut tiers = Vec::with_capacity(config.tiers.len());
        for (index, tier_config) in config.tiers.iter().enumerate() {
            let mut tier = PolicyTier::new();
            for option in &tier_config.plugins {
                let plugin = self.build(option)?;
                let mut hooks = PolicyTier::new();
                plugin.register(&mut hooks);
                for hook in &option.disabled {
                    hooks.disable(*hook);
                }
                debug!(
                    tier = index,
                    plugin = plugin.name(),
                    disabled = ?option.disabled,
                    "plugin registered"
                );
                tier.append(hooks);
            }
            tiers.push(tier);
        }

        info!(
            tiers = tiers.len(),
            plugins = config.plugins().count(),
            "policies built"
        );
        Ok(Policies::new(tiers))
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.builders.keys()).finish()
    }
}
