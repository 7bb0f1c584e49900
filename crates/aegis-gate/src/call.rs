use aegis_types::{CallId, TrustLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authority::DenialReason;
use crate::error::TokenError;

/// A request to run one tool.
///
/// The trust level has already been classified upstream; the gateway never
/// sees raw network input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: CallId,
    pub tool_id: String,
    pub parameters: serde_json::Value,
    pub requesting_agent: String,
    pub trust_level: TrustLevel,
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(
        tool_id: impl Into<String>,
        requesting_agent: impl Into<String>,
        trust_level: TrustLevel,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: CallId::generate(),
            tool_id: tool_id.into(),
            parameters,
            requesting_agent: requesting_agent.into(),
            trust_level,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<CallId>) -> Self {
        self.id = id.into();
        self
    }
}

/// Why a call did not succeed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Denied { reason: DenialReason },
    Capacity,
    Rejected { reason: String },
    ApprovalTimeout,
    ExecutionTimeout,
    NoHandler,
    Handler { message: String },
    Token { reason: String },
}

impl FailureKind {
    pub fn message(&self) -> String {
        match self {
            FailureKind::Denied { reason } => format!("denied: {reason}"),
            FailureKind::Capacity => "execution capacity exhausted".into(),
            FailureKind::Rejected { reason } => format!("rejected: {reason}"),
            FailureKind::ApprovalTimeout => "approval timed out".into(),
            FailureKind::ExecutionTimeout => "execution timed out".into(),
            FailureKind::NoHandler => "no handler registered for tool".into(),
            FailureKind::Handler { message } => format!("tool failed: {message}"),
            FailureKind::Token { reason } => format!("token rejected: {reason}"),
        }
    }

    /// Stable label used in audit records.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Denied { .. } => "denied",
            FailureKind::Capacity => "capacity",
            FailureKind::Rejected { .. } => "rejected",
            FailureKind::ApprovalTimeout => "approval_timeout",
            FailureKind::ExecutionTimeout => "execution_timeout",
            FailureKind::NoHandler => "no_handler",
            FailureKind::Handler { .. } => "handler_error",
            FailureKind::Token { .. } => "token",
        }
    }
}

impl From<TokenError> for FailureKind {
    fn from(e: TokenError) -> Self {
        FailureKind::Token {
            reason: e.to_string(),
        }
    }
}

/// Outcome of [`ExecutionGateway::execute`](crate::ExecutionGateway::execute).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub tool_call_id: CallId,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub duration_ms: u64,
    pub approved_by: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn succeeded(
        call_id: CallId,
        output: serde_json::Value,
        duration_ms: u64,
        approved_by: Option<String>,
    ) -> Self {
        Self {
            success: true,
            tool_call_id: call_id,
            output: Some(output),
            error: None,
            failure: None,
            duration_ms,
            approved_by,
        }
    }

    pub(crate) fn failed(
        call_id: CallId,
        failure: FailureKind,
        duration_ms: u64,
        approved_by: Option<String>,
    ) -> Self {
        Self {
            success: false,
            tool_call_id: call_id,
            output: None,
            error: Some(failure.message()),
            failure: Some(failure),
            duration_ms,
            approved_by,
        }
    }
}
