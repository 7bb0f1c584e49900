//! Configuration for the Aegis core.
//!
//! Loaded once at startup from a TOML file. Every field has a default, so an
//! absent file or an empty section yields a working configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::policy::ToolPolicy;

/// Reserved approver role under which the council signs off on calls.
pub const COUNCIL_ROLE: &str = "council";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AegisConfig {
    /// Audit ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Execution gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Council configuration
    #[serde(default)]
    pub council: CouncilConfig,

    /// Tool policies
    #[serde(default)]
    pub policies: Vec<ToolPolicy>,
}

impl AegisConfig {
    /// Load configuration from `path`, or defaults when no path is given or
    /// the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: AegisConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(
                "ledger.checkpoint_interval must be at least 1".into(),
            ));
        }
        if self.gateway.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "gateway.max_concurrent must be at least 1".into(),
            ));
        }
        if self.gateway.approver_roles.is_empty() {
            return Err(ConfigError::Invalid(
                "gateway.approver_roles must name at least one role".into(),
            ));
        }
        if self.gateway.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "gateway.token_ttl_secs must be at least 1".into(),
            ));
        }
        let c = &self.council;
        if !(c.dissent_threshold > 0.0 && c.dissent_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "council.dissent_threshold must be in (0, 1]".into(),
            ));
        }
        if !(1..=5).contains(&c.min_pillars) {
            return Err(ConfigError::Invalid(
                "council.min_pillars must be between 1 and 5".into(),
            ));
        }
        if !(3..=5).contains(&c.emergency_panel_size) {
            return Err(ConfigError::Invalid(
                "council.emergency_panel_size must be between 3 and 5".into(),
            ));
        }
        if c.default_deadline_minutes <= 0 || c.overturn_window_hours <= 0 {
            return Err(ConfigError::Invalid(
                "council deadlines must be positive".into(),
            ));
        }
        let mut seen = HashSet::new();
        for policy in &self.policies {
            if !seen.insert(policy.tool_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate policy for tool {}",
                    policy.tool_id
                )));
            }
        }
        Ok(())
    }
}

/// Audit ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding `events.json` and `checkpoints.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Events between automatic checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Hex-encoded checkpoint signing key; defaults to `<data_dir>/ledger.key`
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl LedgerConfig {
    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("ledger.key"))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            checkpoint_interval: default_checkpoint_interval(),
            key_file: None,
        }
    }
}

/// Execution gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Maximum simultaneous in-flight calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Default wait for an approval decision, in seconds
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,

    /// Default time box for a tool execution, in seconds
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Lifetime of an issued tool call token, in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Roles allowed to approve operator-routed calls
    #[serde(default = "default_approver_roles")]
    pub approver_roles: Vec<String>,
}

impl GatewayConfig {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn is_approver(&self, role: &str) -> bool {
        self.approver_roles.iter().any(|r| r == role)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            approval_timeout_secs: default_approval_timeout(),
            execution_timeout_secs: default_execution_timeout(),
            token_ttl_secs: default_token_ttl(),
            approver_roles: default_approver_roles(),
        }
    }
}

/// Council configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Deadline applied when a vote request names none
    #[serde(default = "default_deadline_minutes")]
    pub default_deadline_minutes: i64,

    /// Window after an emergency decision during which an overturn may be requested
    #[serde(default = "default_overturn_window")]
    pub overturn_window_hours: i64,

    /// Consensus strength below which a dissent report is filed
    #[serde(default = "default_dissent_threshold")]
    pub dissent_threshold: f64,

    /// Pillars that must take part in a ratified decision
    #[serde(default = "default_min_pillars")]
    pub min_pillars: usize,

    /// Emergency panel size (3 to 5)
    #[serde(default = "default_panel_size")]
    pub emergency_panel_size: usize,

    /// Minimum topic overlap for linking a precedent
    #[serde(default = "default_precedent_overlap")]
    pub precedent_overlap: f64,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            default_deadline_minutes: default_deadline_minutes(),
            overturn_window_hours: default_overturn_window(),
            dissent_threshold: default_dissent_threshold(),
            min_pillars: default_min_pillars(),
            emergency_panel_size: default_panel_size(),
            precedent_overlap: default_precedent_overlap(),
        }
    }
}

// Default value helpers
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/aegis")
}

fn default_checkpoint_interval() -> u64 {
    100
}

fn default_max_concurrent() -> usize {
    10
}

fn default_approval_timeout() -> u64 {
    30
}

fn default_execution_timeout() -> u64 {
    60
}

fn default_token_ttl() -> u64 {
    300
}

fn default_approver_roles() -> Vec<String> {
    vec!["arbiter".into(), "overseer".into(), "operator".into()]
}

fn default_deadline_minutes() -> i64 {
    60
}

fn default_overturn_window() -> i64 {
    24
}

fn default_dissent_threshold() -> f64 {
    0.8
}

fn default_min_pillars() -> usize {
    3
}

fn default_panel_size() -> usize {
    5
}

fn default_precedent_overlap() -> f64 {
    0.3
}
