//! Aegis Gate: the boundary every tool call crosses before it runs.
//!
//! A call passes three ordered checks in the [`PermissionAuthority`]:
//!
//! 1. **Allow-list**: a restricted policy admits only listed agents
//! 2. **Trust**: the caller's trust score must meet the policy's requirement
//! 3. **Tier gate**: `WRITE_DESTRUCTIVE` and `ADMIN` calls need explicit approval
//!
//! The [`ExecutionGateway`] then reserves one of a fixed number of execution
//! slots, parks tier-gated calls until an approver, a rejection or a timeout
//! resolves them, runs the tool under a time box, and records every outcome
//! in the audit ledger. [`TokenAuthority`] issues single-use credentials
//! bound to one tool, one agent and one exact parameter set.

pub mod authority;
pub mod call;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod mocks;
pub mod token;

pub use authority::{DenialReason, PermissionAuthority, PermissionDecision};
pub use call::{ExecutionResult, FailureKind, ToolCall};
pub use error::{GatewayError, TokenError, ToolError};
pub use gateway::{ExecutionGateway, PendingSummary};
pub use handler::{BoxedToolFuture, FnHandler, ToolHandler};
pub use mocks::{EchoHandler, FailingHandler, SlowHandler};
pub use token::{parameters_hash, TokenAuthority, ToolCallToken};
