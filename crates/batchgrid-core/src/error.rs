//! Error types for core primitives.

use thiserror::Error;

/// Errors from resource vector arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("resource underflow on `{dimension}`: have {have}, subtracting {need}")]
    Underflow {
        dimension: String,
        have: u64,
        need: u64,
    },
}

/// Errors from scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("plugin `{plugin}`: argument `{key}` has invalid value `{value}`")]
    InvalidArgument {
        plugin: String,
        key: String,
        value: String,
    },

    #[error("no actions configured")]
    NoActions,

    #[error("duplicate plugin `{0}` in configuration")]
    DuplicatePlugin(String),
}
