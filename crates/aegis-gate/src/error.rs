use aegis_types::CallId;
use thiserror::Error;

use crate::authority::DenialReason;

/// Errors from the execution gateway's control surface.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no pending approval for call {0}")]
    NotFound(CallId),

    #[error("role {role} may not approve call {call_id}")]
    UnauthorizedApprover { call_id: CallId, role: String },

    #[error("call denied: {0}")]
    Denied(DenialReason),

    #[error("call {0} requires an approver before a token can be issued")]
    ApprovalRequired(CallId),

    #[error("token rejected: {0}")]
    Token(#[from] TokenError),
}

/// Reasons a tool call token is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signature does not match token contents")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token already used")]
    AlreadyUsed,

    #[error("token is bound to {expected}, presented for {presented}")]
    BindingMismatch { expected: String, presented: String },

    #[error("parameters do not match the hash bound into the token")]
    ParameterMismatch,
}

/// Failure reported by a tool handler.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
