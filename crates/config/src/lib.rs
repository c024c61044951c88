//! Configuration schema and loader for mirrortab clients.
//!
//! A client is configured with an ordered list of replica clusters plus
//! the HA policy knobs. Order is significant: cluster 0 is the primary
//! target for asynchronous writes and the default-first target for reads.

use serde::{Deserialize, Serialize};

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identity presented to every cluster.
    pub user_identity: String,

    /// Credential presented to every cluster.
    #[serde(default)]
    pub user_passcode: String,

    /// Replica clusters, in fan-out order.
    pub clusters: Vec<ClusterConfig>,

    /// HA policy settings.
    #[serde(default)]
    pub ha: HaOptions,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// One replica cluster: where to discover it and which namespace to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Discovery endpoint of the cluster's control plane.
    pub discovery_addr: String,

    /// Root path of the table namespace inside that cluster.
    pub root_path: String,
}

/// Policy knobs of the HA facade.
///
/// Copied by value into every table handle the client opens.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HaOptions {
    /// When true, mutating DDL stops at the first replica failure and the
    /// operation is reported failed. When false, DDL is best-effort across
    /// all replicas.
    #[serde(default)]
    pub ddl_fail_fast: bool,

    /// Δ in microseconds for the latest-get merge: cells from distinct
    /// replicas whose timestamps differ by less than this are treated as
    /// the same logical write. 0 disables collapsing.
    #[serde(default)]
    pub timestamp_diff_us: i64,

    /// When true, reads shuffle the replica order per call to spread load.
    #[serde(default)]
    pub get_random_mode: bool,
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ClientConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_identity.is_empty() {
            return Err(ConfigError::Invalid("user_identity must be set".into()));
        }
        if self.clusters.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one cluster must be configured".into(),
            ));
        }
        for (i, c) in self.clusters.iter().enumerate() {
            if c.discovery_addr.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "clusters[{i}].discovery_addr must not be empty"
                )));
            }
            if c.root_path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "clusters[{i}].root_path must not be empty"
                )));
            }
        }
        if self.ha.timestamp_diff_us < 0 {
            return Err(ConfigError::Invalid(format!(
                "ha.timestamp_diff_us ({}) must be >= 0",
                self.ha.timestamp_diff_us
            )));
        }
        Ok(())
    }
}

/// Load a `ClientConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `ClientConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
