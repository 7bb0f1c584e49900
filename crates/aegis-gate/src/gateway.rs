use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aegis_ledger::AuditSink;
use aegis_types::config::COUNCIL_ROLE;
use aegis_types::{
    AegisEvent, ApprovalOutcome, ApprovalRoute, CallId, EventBus, GatewayConfig, PermissionTier,
    SharedClock, SystemClock, ToolPolicy, TrustLevel,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::authority::{DenialReason, PermissionAuthority, PermissionDecision};
use crate::call::{ExecutionResult, FailureKind, ToolCall};
use crate::error::GatewayError;
use crate::handler::ToolHandler;
use crate::token::{parameters_hash, TokenAuthority, ToolCallToken};

enum ApprovalDecision {
    Approved { by: String },
    Rejected { reason: String },
}

/// A call parked until an approver, a rejection or its timeout resolves it.
///
/// Whoever removes the entry from the pending map owns the resolution.
struct PendingApproval {
    call: ToolCall,
    policy: ToolPolicy,
    deadline: DateTime<Utc>,
    responder: oneshot::Sender<ApprovalDecision>,
}

/// Withdraws a parked call if its caller goes away before it is resolved.
struct ParkedGuard<'a> {
    pending: &'a Mutex<HashMap<CallId, PendingApproval>>,
    call_id: &'a CallId,
    armed: bool,
}

impl ParkedGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ParkedGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.pending.lock().remove(self.call_id).is_some() {
            warn!(call_id = %self.call_id, "caller abandoned pending approval");
        }
    }
}

/// Read-only view of a parked call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub call_id: CallId,
    pub tool_id: String,
    pub agent: String,
    pub trust_level: TrustLevel,
    pub tier: PermissionTier,
    pub route: ApprovalRoute,
    pub parameters: serde_json::Value,
    pub deadline: DateTime<Utc>,
}

impl From<&PendingApproval> for PendingSummary {
    fn from(p: &PendingApproval) -> Self {
        Self {
            call_id: p.call.id.clone(),
            tool_id: p.call.tool_id.clone(),
            agent: p.call.requesting_agent.clone(),
            trust_level: p.call.trust_level,
            tier: p.policy.tier,
            route: p.policy.route,
            parameters: p.call.parameters.clone(),
            deadline: p.deadline,
        }
    }
}

/// Orchestrates tool calls through permission checks, approval, bounded
/// execution and auditing.
pub struct ExecutionGateway {
    authority: Arc<PermissionAuthority>,
    audit: Arc<dyn AuditSink>,
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    slots: Arc<Semaphore>,
    pending: Mutex<HashMap<CallId, PendingApproval>>,
    tokens: TokenAuthority,
    events: EventBus,
    config: GatewayConfig,
    clock: SharedClock,
}

impl ExecutionGateway {
    pub fn new(
        authority: Arc<PermissionAuthority>,
        audit: Arc<dyn AuditSink>,
        config: GatewayConfig,
    ) -> Self {
        let ttl = chrono::Duration::seconds(config.token_ttl_secs as i64);
        Self {
            authority,
            audit,
            handlers: RwLock::new(HashMap::new()),
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            pending: Mutex::new(HashMap::new()),
            tokens: TokenAuthority::generate(ttl),
            events: EventBus::default(),
            config,
            clock: SystemClock::shared(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.tokens = self.tokens.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_token_authority(mut self, tokens: TokenAuthority) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn register_handler(&self, tool_id: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        let tool_id = tool_id.into();
        debug!(tool_id = %tool_id, "tool handler registered");
        self.handlers.write().insert(tool_id, handler);
    }

    pub fn authority(&self) -> &Arc<PermissionAuthority> {
        &self.authority
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Calls currently holding an execution slot.
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent
            .saturating_sub(self.slots.available_permits())
    }

    pub fn pending_approvals(&self) -> Vec<PendingSummary> {
        let mut all: Vec<PendingSummary> = self.pending.lock().values().map(Into::into).collect();
        all.sort_by(|a, b| a.deadline.cmp(&b.deadline));
        all
    }

    pub fn pending_approval(&self, call_id: &CallId) -> Option<PendingSummary> {
        self.pending.lock().get(call_id).map(Into::into)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a call through the full pipeline.
    ///
    /// Never returns an error: every negative outcome is a failed
    /// [`ExecutionResult`], and every outcome is audited.
    pub async fn execute(&self, call: ToolCall) -> ExecutionResult {
        let started = Instant::now();
        self.publish_start(&call);

        let (result, decision) = self.run(&call, started).await;
        self.finish(&call, result, decision.as_ref()).await
    }

    async fn run(
        &self,
        call: &ToolCall,
        started: Instant,
    ) -> (ExecutionResult, Option<PermissionDecision>) {
        // The slot is held until this function returns, approval wait included
        let Some(_permit) = self.reserve_slot(call) else {
            return (fail(call, FailureKind::Capacity, started, None), None);
        };

        let (decision, policy) = self.authority.evaluate(call);
        let policy = match policy {
            Some(policy) if decision.allowed => policy,
            _ => {
                let reason = denial_of(&decision, call);
                warn!(
                    call_id = %call.id,
                    tool_id = %call.tool_id,
                    agent = %call.requesting_agent,
                    reason = %reason,
                    "tool call denied"
                );
                let result = fail(call, FailureKind::Denied { reason }, started, None);
                return (result, Some(decision));
            }
        };

        let mut approved_by = None;
        if decision.requires_approval {
            match self.await_approval(call, &policy).await {
                Ok(by) => approved_by = Some(by),
                Err(failure) => return (fail(call, failure, started, None), Some(decision)),
            }
        }

        let result = self.invoke(call, &policy, approved_by, started).await;
        (result, Some(decision))
    }

    fn reserve_slot(&self, call: &ToolCall) -> Option<OwnedSemaphorePermit> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!(
                    call_id = %call.id,
                    max_concurrent = self.config.max_concurrent,
                    "execution capacity exhausted"
                );
                None
            }
        }
    }

    async fn await_approval(&self, call: &ToolCall, policy: &ToolPolicy) -> Result<String, FailureKind> {
        let timeout_secs = policy
            .approval_timeout_secs
            .unwrap_or(self.config.approval_timeout_secs);
        let deadline = i64::try_from(timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .ok_or_else(|| FailureKind::Rejected {
                reason: format!("approval timeout of {timeout_secs}s is out of range"),
            })?;

        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&call.id) {
                return Err(FailureKind::Rejected {
                    reason: "a call with this id is already awaiting approval".into(),
                });
            }
            pending.insert(
                call.id.clone(),
                PendingApproval {
                    call: call.clone(),
                    policy: policy.clone(),
                    deadline,
                    responder: tx,
                },
            );
        }
        let mut parked = ParkedGuard {
            pending: &self.pending,
            call_id: &call.id,
            armed: true,
        };

        info!(
            call_id = %call.id,
            tool_id = %call.tool_id,
            tier = %policy.tier,
            route = ?policy.route,
            timeout_secs,
            "call awaiting approval"
        );
        self.events.publish(AegisEvent::ApprovalRequired {
            call_id: call.id.clone(),
            tool_id: call.tool_id.clone(),
            agent: call.requesting_agent.clone(),
            tier: policy.tier,
            route: policy.route,
            deadline,
        });
        self.record(
            "tool.approval_required",
            &call.requesting_agent,
            call.trust_level,
            json!({
                "call_id": call.id,
                "tool_id": call.tool_id,
                "tier": policy.tier,
                "route": policy.route,
                "deadline": deadline,
            }),
        )
        .await;

        let decision = match tokio::time::timeout(Duration::from_secs(timeout_secs), &mut rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecision::Rejected {
                reason: "approval channel closed".into(),
            },
            Err(_) => {
                if self.pending.lock().remove(&call.id).is_some() {
                    parked.disarm();
                    warn!(call_id = %call.id, timeout_secs, "approval timed out");
                    self.events.publish(AegisEvent::ApprovalResolved {
                        call_id: call.id.clone(),
                        outcome: ApprovalOutcome::TimedOut,
                    });
                    return Err(FailureKind::ApprovalTimeout);
                }
                // A decision claimed the entry as the timer fired
                rx.await.unwrap_or(ApprovalDecision::Rejected {
                    reason: "approval channel closed".into(),
                })
            }
        };
        parked.disarm();

        match decision {
            ApprovalDecision::Approved { by } => Ok(by),
            ApprovalDecision::Rejected { reason } => Err(FailureKind::Rejected { reason }),
        }
    }

    async fn invoke(
        &self,
        call: &ToolCall,
        policy: &ToolPolicy,
        approved_by: Option<String>,
        started: Instant,
    ) -> ExecutionResult {
        let handler = self.handlers.read().get(&call.tool_id).cloned();
        let Some(handler) = handler else {
            return fail(call, FailureKind::NoHandler, started, approved_by);
        };

        let timeout = Duration::from_secs(
            policy
                .execution_timeout_secs
                .unwrap_or(self.config.execution_timeout_secs),
        );
        match tokio::time::timeout(timeout, handler.execute(call)).await {
            Ok(Ok(output)) => ExecutionResult::succeeded(
                call.id.clone(),
                output,
                elapsed_ms(started),
                approved_by,
            ),
            Ok(Err(e)) => fail(
                call,
                FailureKind::Handler { message: e.0 },
                started,
                approved_by,
            ),
            Err(_) => {
                warn!(call_id = %call.id, timeout_ms = timeout.as_millis() as u64, "tool execution timed out");
                fail(call, FailureKind::ExecutionTimeout, started, approved_by)
            }
        }
    }

    fn publish_start(&self, call: &ToolCall) {
        self.events.publish(AegisEvent::ToolStart {
            call_id: call.id.clone(),
            tool_id: call.tool_id.clone(),
            agent: call.requesting_agent.clone(),
        });
    }

    async fn finish(
        &self,
        call: &ToolCall,
        result: ExecutionResult,
        decision: Option<&PermissionDecision>,
    ) -> ExecutionResult {
        self.events.publish(AegisEvent::ToolEnd {
            call_id: call.id.clone(),
            tool_id: call.tool_id.clone(),
            success: result.success,
            duration_ms: result.duration_ms,
            error: result.error.clone(),
        });

        let action = match result.failure {
            None => "tool.executed",
            Some(FailureKind::Denied { .. }) => "tool.denied",
            Some(_) => "tool.failed",
        };
        self.record(
            action,
            &call.requesting_agent,
            call.trust_level,
            json!({
                "call_id": call.id,
                "tool_id": call.tool_id,
                "parameters_hash": parameters_hash(&call.parameters),
                "success": result.success,
                "duration_ms": result.duration_ms,
                "approved_by": result.approved_by,
                "failure": result.failure.as_ref().map(FailureKind::label),
                "error": result.error,
                "risk_score": decision.map(|d| d.risk_score),
            }),
        )
        .await;

        if result.success {
            info!(
                call_id = %call.id,
                tool_id = %call.tool_id,
                duration_ms = result.duration_ms,
                "tool call completed"
            );
        } else {
            info!(
                call_id = %call.id,
                tool_id = %call.tool_id,
                error = ?result.error,
                "tool call failed"
            );
        }
        result
    }

    async fn record(&self, action: &str, actor: &str, trust: TrustLevel, details: serde_json::Value) {
        if let Err(e) = self.audit.record(action, actor, trust, details).await {
            error!(action, actor, error = %e, "failed to write audit record");
        }
    }

    // ========================================================================
    // Approval control
    // ========================================================================

    fn may_approve(&self, route: ApprovalRoute, role: &str) -> bool {
        match route {
            ApprovalRoute::Operator => self.config.is_approver(role),
            ApprovalRoute::Council => role == COUNCIL_ROLE,
        }
    }

    /// Approve a parked call. Only roles permitted for the call's route may approve.
    pub async fn approve(&self, call_id: &CallId, approver_role: &str) -> Result<(), GatewayError> {
        let claimed = {
            let mut pending = self.pending.lock();
            match pending.get(call_id).map(|p| p.policy.route) {
                None => Err(GatewayError::NotFound(call_id.clone())),
                Some(route) if !self.may_approve(route, approver_role) => {
                    Err(GatewayError::UnauthorizedApprover {
                        call_id: call_id.clone(),
                        role: approver_role.to_string(),
                    })
                }
                Some(_) => pending
                    .remove(call_id)
                    .ok_or_else(|| GatewayError::NotFound(call_id.clone())),
            }
        };

        let entry = match claimed {
            Ok(entry) => entry,
            Err(e) => {
                if let GatewayError::UnauthorizedApprover { .. } = e {
                    warn!(call_id = %call_id, role = approver_role, "unauthorized approval attempt");
                    self.record(
                        "tool.approval_refused",
                        approver_role,
                        TrustLevel::Untrusted,
                        json!({ "call_id": call_id, "role": approver_role }),
                    )
                    .await;
                }
                return Err(e);
            }
        };

        if entry
            .responder
            .send(ApprovalDecision::Approved {
                by: approver_role.to_string(),
            })
            .is_err()
        {
            debug!(call_id = %call_id, "approved call is no longer waiting");
        }

        info!(call_id = %call_id, approver = approver_role, "call approved");
        self.events.publish(AegisEvent::ApprovalResolved {
            call_id: call_id.clone(),
            outcome: ApprovalOutcome::Approved {
                by: approver_role.to_string(),
            },
        });
        self.record(
            "tool.approved",
            approver_role,
            TrustLevel::Operator,
            json!({ "call_id": call_id, "tool_id": entry.call.tool_id }),
        )
        .await;
        Ok(())
    }

    /// Reject a parked call.
    pub async fn reject(&self, call_id: &CallId, reason: &str) -> Result<(), GatewayError> {
        let entry = self
            .pending
            .lock()
            .remove(call_id)
            .ok_or_else(|| GatewayError::NotFound(call_id.clone()))?;

        if entry
            .responder
            .send(ApprovalDecision::Rejected {
                reason: reason.to_string(),
            })
            .is_err()
        {
            debug!(call_id = %call_id, "rejected call is no longer waiting");
        }

        info!(call_id = %call_id, reason, "call rejected");
        self.events.publish(AegisEvent::ApprovalResolved {
            call_id: call_id.clone(),
            outcome: ApprovalOutcome::Rejected {
                reason: reason.to_string(),
            },
        });
        self.record(
            "tool.rejected",
            &entry.call.requesting_agent,
            entry.call.trust_level,
            json!({ "call_id": call_id, "tool_id": entry.call.tool_id, "reason": reason }),
        )
        .await;
        Ok(())
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Authorize `call` ahead of time and bind the authorization to a token.
    ///
    /// Tier-gated calls need an `approver` permitted for the policy's route.
    pub async fn issue_token(
        &self,
        call: &ToolCall,
        approver: Option<String>,
    ) -> Result<ToolCallToken, GatewayError> {
        let Some(policy) = self.authority.policy(&call.tool_id) else {
            let reason = DenialReason::NoPolicy {
                tool_id: call.tool_id.clone(),
            };
            return Err(self.deny_token(call, reason).await);
        };
        let decision = PermissionAuthority::decide(call, &policy);
        if let Some(reason) = decision.denial {
            return Err(self.deny_token(call, reason).await);
        }

        if decision.requires_approval {
            match approver.as_deref() {
                None => return Err(GatewayError::ApprovalRequired(call.id.clone())),
                Some(role) if !self.may_approve(policy.route, role) => {
                    return Err(GatewayError::UnauthorizedApprover {
                        call_id: call.id.clone(),
                        role: role.to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        let token = self.tokens.issue(call, policy.tier, approver);
        self.record(
            "token.issued",
            &call.requesting_agent,
            call.trust_level,
            json!({
                "call_id": call.id,
                "token_id": token.token_id,
                "tool_id": call.tool_id,
                "parameters_hash": token.parameters_hash,
                "approver": token.approver,
                "expires_at": token.expires_at,
            }),
        )
        .await;
        Ok(token)
    }

    async fn deny_token(&self, call: &ToolCall, reason: DenialReason) -> GatewayError {
        warn!(call_id = %call.id, reason = %reason, "token issuance denied");
        self.record(
            "token.denied",
            &call.requesting_agent,
            call.trust_level,
            json!({ "call_id": call.id, "tool_id": call.tool_id, "reason": reason.to_string() }),
        )
        .await;
        GatewayError::Denied(reason)
    }

    /// Execute a call pre-authorized by `token`, without an approval wait.
    pub async fn execute_with_token(&self, call: ToolCall, mut token: ToolCallToken) -> ExecutionResult {
        let started = Instant::now();
        self.publish_start(&call);

        let (result, decision) = self.run_with_token(&call, &mut token, started).await;
        self.finish(&call, result, decision.as_ref()).await
    }

    async fn run_with_token(
        &self,
        call: &ToolCall,
        token: &mut ToolCallToken,
        started: Instant,
    ) -> (ExecutionResult, Option<PermissionDecision>) {
        // Reserve before redeeming so a capacity failure does not burn the token
        let Some(_permit) = self.reserve_slot(call) else {
            return (fail(call, FailureKind::Capacity, started, None), None);
        };

        if let Err(e) = self.tokens.redeem(token, call) {
            warn!(call_id = %call.id, token_id = %token.token_id, error = %e, "token refused");
            return (fail(call, e.into(), started, None), None);
        }

        let (decision, policy) = self.authority.evaluate(call);
        let policy = match policy {
            Some(policy) if decision.allowed => policy,
            _ => {
                let reason = denial_of(&decision, call);
                return (
                    fail(call, FailureKind::Denied { reason }, started, None),
                    Some(decision),
                );
            }
        };

        if decision.requires_approval && token.approver.is_none() {
            let failure = FailureKind::Token {
                reason: format!("{} now requires approval", policy.tier),
            };
            return (fail(call, failure, started, None), Some(decision));
        }

        let result = self
            .invoke(call, &policy, token.approver.clone(), started)
            .await;
        (result, Some(decision))
    }
}

fn denial_of(decision: &PermissionDecision, call: &ToolCall) -> DenialReason {
    decision
        .denial
        .clone()
        .unwrap_or_else(|| DenialReason::NoPolicy {
            tool_id: call.tool_id.clone(),
        })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn fail(
    call: &ToolCall,
    failure: FailureKind,
    started: Instant,
    approved_by: Option<String>,
) -> ExecutionResult {
    ExecutionResult::failed(call.id.clone(), failure, elapsed_ms(started), approved_by)
}
