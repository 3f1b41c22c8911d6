// src/errors.rs

//! Crate-wide error type and result alias.

use std::time::Duration;

use thiserror::Error;

use crate::types::{Provider, TaskAction};

#[derive(Error, Debug)]
pub enum PitrixError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A node references a role with no `cluster_roles` entry.
    #[error("node '{node_id}' references role '{role}' with no cluster role entry")]
    MissingRole { node_id: String, role: String },

    /// A node references a role with no `cluster_commons` entry.
    #[error("node '{node_id}' references role '{role}' with no cluster common entry")]
    MissingCommon { node_id: String, role: String },

    #[error("node '{0}' is not part of the cluster")]
    MissingNode(String),

    #[error("invalid {service} descriptor for role '{role}': {reason}")]
    InvalidService {
        role: String,
        service: String,
        reason: String,
    },

    #[error("invalid cluster: {0}")]
    InvalidCluster(String),

    #[error("invalid directive for {action}: {reason}")]
    InvalidDirective { action: TaskAction, reason: String },

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("no handler registered for provider {0}")]
    NoHandler(Provider),

    /// The provider API rejected or failed a request.
    #[error("{provider} api error: {message}")]
    ProviderApi { provider: Provider, message: String },

    #[error("timed out after {timeout:?} waiting for {what}")]
    WaitTimeout { what: String, timeout: Duration },

    /// The provider reported the resource in a terminal failed state.
    #[error("{what} entered failed state: {status}")]
    ResourceFailed { what: String, status: String },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PitrixError>;
