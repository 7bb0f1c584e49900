use std::collections::{HashMap, VecDeque};
use std::fmt;

use aegis_types::{
    ApprovalRoute, PermissionTier, SharedClock, SystemClock, ToolPolicy, TrustLevel,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::call::ToolCall;

/// Why a call was refused by the permission checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    NoPolicy {
        tool_id: String,
    },
    NotOnAllowList {
        agent: String,
    },
    InsufficientTrust {
        required: TrustLevel,
        actual: TrustLevel,
    },
    RateLimited {
        max_calls: u32,
        window_secs: u64,
    },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NoPolicy { tool_id } => write!(f, "no policy registered for {tool_id}"),
            DenialReason::NotOnAllowList { agent } => {
                write!(f, "agent {agent} is not on the allow-list")
            }
            DenialReason::InsufficientTrust { required, actual } => write!(
                f,
                "trust level {actual} ({:.1}) below required {required} ({:.1})",
                actual.score(),
                required.score()
            ),
            DenialReason::RateLimited {
                max_calls,
                window_secs,
            } => write!(f, "rate limit of {max_calls} calls per {window_secs}s exceeded"),
        }
    }
}

/// Result of the permission checks for one call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub requires_approval: bool,
    pub reason: String,
    pub risk_score: f64,
    pub denial: Option<DenialReason>,
    pub route: ApprovalRoute,
}

impl PermissionDecision {
    fn deny(denial: DenialReason, risk_score: f64) -> Self {
        Self {
            allowed: false,
            requires_approval: false,
            reason: denial.to_string(),
            risk_score,
            denial: Some(denial),
            route: ApprovalRoute::Operator,
        }
    }
}

/// Risk in `[0, 1]`: tier weight plus a penalty for low caller trust.
pub fn risk_score(tier: PermissionTier, trust: TrustLevel) -> f64 {
    (tier.base_risk() + 0.2 * (1.0 - trust.score())).clamp(0.0, 1.0)
}

/// Holds per-tool policies and decides whether a call may proceed.
pub struct PermissionAuthority {
    policies: RwLock<HashMap<String, ToolPolicy>>,
    windows: Mutex<HashMap<(String, String), VecDeque<DateTime<Utc>>>>,
    clock: SharedClock,
}

impl PermissionAuthority {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            clock: SystemClock::shared(),
        }
    }

    pub fn from_policies(policies: impl IntoIterator<Item = ToolPolicy>) -> Self {
        let authority = Self::new();
        for policy in policies {
            authority.register(policy);
        }
        authority
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Register or replace the policy for a tool, returning the previous one.
    pub fn register(&self, policy: ToolPolicy) -> Option<ToolPolicy> {
        debug!(tool_id = %policy.tool_id, tier = %policy.tier, "policy registered");
        self.policies.write().insert(policy.tool_id.clone(), policy)
    }

    pub fn remove(&self, tool_id: &str) -> Option<ToolPolicy> {
        self.policies.write().remove(tool_id)
    }

    pub fn policy(&self, tool_id: &str) -> Option<ToolPolicy> {
        self.policies.read().get(tool_id).cloned()
    }

    pub fn policies(&self) -> Vec<ToolPolicy> {
        let mut all: Vec<ToolPolicy> = self.policies.read().values().cloned().collect();
        all.sort_by(|a, b| a.tool_id.cmp(&b.tool_id));
        all
    }

    /// Apply the three ordered checks of `policy` to `call`.
    ///
    /// Pure: the outcome depends only on the call and the policy.
    pub fn decide(call: &ToolCall, policy: &ToolPolicy) -> PermissionDecision {
        let risk = risk_score(policy.tier, call.trust_level);

        if !policy.permits_agent(&call.requesting_agent) {
            return PermissionDecision::deny(
                DenialReason::NotOnAllowList {
                    agent: call.requesting_agent.clone(),
                },
                risk,
            );
        }

        if !call.trust_level.satisfies(policy.required_trust) {
            return PermissionDecision::deny(
                DenialReason::InsufficientTrust {
                    required: policy.required_trust,
                    actual: call.trust_level,
                },
                risk,
            );
        }

        let requires_approval = policy.tier.requires_approval();
        let reason = if requires_approval {
            match policy.route {
                ApprovalRoute::Operator => format!("{} requires operator approval", policy.tier),
                ApprovalRoute::Council => format!("{} requires council ratification", policy.tier),
            }
        } else {
            format!("{} permitted for {}", policy.tier, call.trust_level)
        };

        PermissionDecision {
            allowed: true,
            requires_approval,
            reason,
            risk_score: risk,
            denial: None,
            route: policy.route,
        }
    }

    /// Look up the tool's policy, decide, and apply any rate limit.
    ///
    /// Returns the decision together with the policy snapshot it was made against.
    pub fn evaluate(&self, call: &ToolCall) -> (PermissionDecision, Option<ToolPolicy>) {
        let Some(policy) = self.policy(&call.tool_id) else {
            return (
                PermissionDecision::deny(
                    DenialReason::NoPolicy {
                        tool_id: call.tool_id.clone(),
                    },
                    1.0,
                ),
                None,
            );
        };

        let decision = Self::decide(call, &policy);
        if !decision.allowed {
            return (decision, Some(policy));
        }

        if let Some(limit) = policy.rate_limit {
            let now = self.clock.now();
            let window = Duration::seconds(limit.window_secs as i64);
            let mut windows = self.windows.lock();
            let recent = windows
                .entry((policy.tool_id.clone(), call.requesting_agent.clone()))
                .or_default();
            while recent.front().is_some_and(|t| now - *t >= window) {
                recent.pop_front();
            }
            if recent.len() >= limit.max_calls as usize {
                let denial = DenialReason::RateLimited {
                    max_calls: limit.max_calls,
                    window_secs: limit.window_secs,
                };
                return (
                    PermissionDecision::deny(denial, decision.risk_score),
                    Some(policy),
                );
            }
            recent.push_back(now);
        }

        (decision, Some(policy))
    }
}

impl Default for PermissionAuthority {
    fn default() -> Self {
        Self::new()
    }
}
