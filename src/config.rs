//! Publisher configuration
//!
//! Resolution order: explicit path > `AGORA_BROADCAST_CONFIG` > built-in
//! defaults, then environment overrides. Command-line flags are applied on
//! top by the binary.

use crate::message::PayloadSource;
use crate::network::NodeConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "AGORA_BROADCAST_CONFIG";
pub const ENVIRONMENT_ENV: &str = "AGORA_BROADCAST_ENV";
pub const BOOTSTRAP_ENV: &str = "AGORA_BROADCAST_BOOTSTRAP";
pub const PRIVATE_KEY_ENV: &str = "AGORA_BROADCAST_PRIVATE_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load payload: {0}")]
    Payload(std::io::Error),
}

/// What a failed publish does to the exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFailurePolicy {
    /// Log the failure and exit 0
    #[default]
    Ignore,
    /// Log the failure and exit 1
    Fail,
}

/// Components of the content topic to publish on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub application: String,
    pub version: String,
    pub function: String,
    pub encoding: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            application: crate::message::topic::AGORA_APPLICATION.to_string(),
            version: crate::message::topic::AGORA_VERSION.to_string(),
            function: crate::message::topic::FUNCTION_PROOF.to_string(),
            encoding: crate::message::topic::PROTO_ENCODING.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Application name attached to every log line
    pub app: String,
    /// Deployment environment attached to every log line
    pub env: String,
    pub topic: TopicConfig,
    pub payload: PayloadSource,
    pub protocol_version: u32,
    pub on_publish_error: PublishFailurePolicy,
    /// Overall deadline for start + publish
    pub timeout_secs: u64,
    pub node: NodeConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            app: "@zkorum/agora-broadcast".to_string(),
            env: "production".to_string(),
            topic: TopicConfig::default(),
            payload: PayloadSource::default(),
            protocol_version: 1,
            on_publish_error: PublishFailurePolicy::Ignore,
            timeout_secs: 30,
            node: NodeConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Resolve the config path: explicit path > env var > none
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
    }

    /// Load from disk (or defaults) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match Self::resolve_path(path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        Ok(config.apply_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from a variable lookup (normally the process env)
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(env) = lookup(ENVIRONMENT_ENV) {
            self.env = env;
        }
        if let Some(list) = lookup(BOOTSTRAP_ENV) {
            self.node.bootstrap = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(key) = lookup(PRIVATE_KEY_ENV) {
            self.node.private_key = Some(key);
        }
        self
    }

    /// Check everything that can be checked without touching the network.
    ///
    /// Topic components are validated when the topic is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.trim().is_empty() {
            return Err(ConfigError::Invalid("app must not be empty".into()));
        }
        if self.env.trim().is_empty() {
            return Err(ConfigError::Invalid("env must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.node.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "node.request_timeout_secs must be positive".into(),
            ));
        }
        match &self.payload {
            PayloadSource::Text(text) if text.is_empty() => {
                return Err(ConfigError::Invalid("payload text must not be empty".into()));
            }
            PayloadSource::Proof(proof) if proof.is_empty() => {
                return Err(ConfigError::Invalid("payload proof must not be empty".into()));
            }
            _ => {}
        }
        if self.node.request_timeout_secs > self.timeout_secs {
            warn!(
                "node.request_timeout_secs ({}) exceeds timeout_secs ({})",
                self.node.request_timeout_secs, self.timeout_secs
            );
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
