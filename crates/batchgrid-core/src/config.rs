//! Scheduler configuration parser.
//!
//! ```toml
//! actions = ["preempt"]
//!
//! [[tiers]]
//! plugins = [{ name = "priority" }, { name = "gang" }]
//!
//! [[tiers]]
//! plugins = [
//!   { name = "predicates" },
//!   { name = "nodeorder", arguments = { "binpack.weight" = "1" } },
//! ]
//! ```
//!
//! A plugin may opt out of individual hooks it would otherwise register,
//! e.g. `{ name = "gang", disabled = ["preemptable"] }`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Actions executed in order on every scheduling cycle.
    pub actions: Vec<String>,
    /// Plugin tiers; earlier tiers take precedence where hooks conflict.
    #[serde(default)]
    pub tiers: Vec<Tier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub plugins: Vec<PluginOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginOption {
    pub name: String,
    #[serde(default)]
    pub arguments: PluginArguments,
    /// Hooks this plugin must not contribute.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disabled: BTreeSet<Hook>,
}

impl PluginOption {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: PluginArguments::default(),
            disabled: BTreeSet::new(),
        }
    }

    pub fn with_argument(mut self, key: &str, value: &str) -> Self {
        self.arguments.insert(key, value);
        self
    }

    pub fn without(mut self, hook: Hook) -> Self {
        self.disabled.insert(hook);
        self
    }

    pub fn is_enabled(&self, hook: Hook) -> bool {
        !self.disabled.contains(&hook)
    }
}

/// Policy extension points a plugin can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    JobOrder,
    TaskOrder,
    JobValid,
    JobPipelined,
    Predicate,
    NodeOrder,
    Preemptable,
}

/// Free-form string arguments handed to a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginArguments(BTreeMap<String, String>);

impl PluginArguments {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse `key` as an integer weight, `default` when absent.
    pub fn weight(&self, plugin: &str, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidArgument {
                plugin: plugin.to_string(),
                key: key.to_string(),
                value: raw.clone(),
            }),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            actions: vec!["preempt".to_string()],
            tiers: vec![
                Tier {
                    plugins: vec![PluginOption::named("priority"), PluginOption::named("gang")],
                },
                Tier {
                    plugins: vec![
                        PluginOption::named("predicates"),
                        PluginOption::named("nodeorder"),
                    ],
                },
            ],
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Structural checks that don't need to know which plugins exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actions.is_empty() {
            return Err(ConfigError::NoActions);
        }
        let mut seen = HashSet::new();
        for plugin in self.tiers.iter().flat_map(|t| &t.plugins) {
            if !seen.insert(plugin.name.as_str()) {
                return Err(ConfigError::DuplicatePlugin(plugin.name.clone()));
            }
        }
        Ok(())
    }

    /// Every configured plugin, in tier order.
    pub fn plugins(&self) -> impl Iterator<Item = (usize, &PluginOption)> {
        self.tiers
            .iter()
            .enumerate()
            .flat_map(|(i, t)| t.plugins.iter().map(move |p| (i, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_round_trips_through_toml() {
        let config = SchedulerConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("preempt"));

        let parsed = SchedulerConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn parses_tiers_and_arguments() {
        let toml_str = r#"
actions = ["preempt"]

[[tiers]]
plugins = [{ name = "priority" }]

[[tiers]]
plugins = [
  { name = "nodeorder", arguments = { "binpack.weight" = "3" } },
]
"#;
        let config = SchedulerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.tiers.len(), 2);

        let (tier, nodeorder) = config.plugins().nth(1).unwrap();
        assert_eq!(tier, 1);
        assert_eq!(nodeorder.arguments.weight("nodeorder", "binpack.weight", 0), Ok(3));
        assert_eq!(nodeorder.arguments.weight("nodeorder", "leastrequested.weight", 1), Ok(1));
    }

    #[test]
    fn parses_disabled_hooks() {
        let toml_str = r#"
actions = ["preempt"]

[[tiers]]
plugins = [{ name = "gang", disabled = ["preemptable", "job_order"] }]
"#;
        let config = SchedulerConfig::from_toml_str(toml_str).unwrap();
        let (_, gang) = config.plugins().next().unwrap();
        assert!(!gang.is_enabled(Hook::Preemptable));
        assert!(!gang.is_enabled(Hook::JobOrder));
        assert!(gang.is_enabled(Hook::JobPipelined));

        let bad = r#"
actions = ["preempt"]
[[tiers]]
plugins = [{ name = "gang", disabled = ["reclaimable"] }]
"#;
        assert!(SchedulerConfig::from_toml_str(bad).is_err());
    }

    #[test]
    fn malformed_weight_is_an_error() {
        let mut args = PluginArguments::default();
        args.insert("binpack.weight", "heavy");

        assert!(matches!(
            args.weight("nodeorder", "binpack.weight", 1),
            Err(ConfigError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rejects_empty_actions_and_duplicates() {
        assert!(SchedulerConfig::from_toml_str("actions = []").is_err());

        let dup = r#"
actions = ["preempt"]
[[tiers]]
plugins = [{ name = "gang" }]
[[tiers]]
plugins = [{ name = "gang" }]
"#;
        assert!(SchedulerConfig::from_toml_str(dup).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "actions = [\"preempt\"]").unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.actions, vec!["preempt"]);
        assert!(config.tiers.is_empty());
    }
}
