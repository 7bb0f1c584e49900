use serde::{Deserialize, Serialize};

use crate::trust::{PermissionTier, TrustLevel};

/// Who must sign off on a tier-gated call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRoute {
    /// A human holding one of the configured approver roles.
    #[default]
    Operator,
    /// A council vote.
    Council,
}

/// Calls allowed per agent within a rolling window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_calls: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

/// Authorization rule for one tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolPolicy {
    pub tool_id: String,
    pub tier: PermissionTier,
    #[serde(default)]
    pub required_trust: TrustLevel,
    /// Agents eligible to call the tool. Empty means any agent.
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    /// Overrides the gateway's default approval timeout.
    #[serde(default)]
    pub approval_timeout_secs: Option<u64>,
    /// Overrides the gateway's default execution timeout.
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,
    #[serde(default)]
    pub route: ApprovalRoute,
}

impl ToolPolicy {
    pub fn new(tool_id: impl Into<String>, tier: PermissionTier, required_trust: TrustLevel) -> Self {
        Self {
            tool_id: tool_id.into(),
            tier,
            required_trust,
            allow_list: Vec::new(),
            rate_limit: None,
            approval_timeout_secs: None,
            execution_timeout_secs: None,
            route: ApprovalRoute::Operator,
        }
    }

    pub fn with_allow_list<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rate_limit(mut self, max_calls: u32, window_secs: u64) -> Self {
        self.rate_limit = Some(RateLimit {
            max_calls,
            window_secs,
        });
        self
    }

    pub fn with_approval_timeout(mut self, secs: u64) -> Self {
        self.approval_timeout_secs = Some(secs);
        self
    }

    pub fn with_execution_timeout(mut self, secs: u64) -> Self {
        self.execution_timeout_secs = Some(secs);
        self
    }

    /// Route approval of this tool through a council vote.
    pub fn ratified_by_council(mut self) -> Self {
        self.route = ApprovalRoute::Council;
        self
    }

    pub fn permits_agent(&self, agent: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.iter().any(|a| a == agent)
    }
}
