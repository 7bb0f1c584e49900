//! Execution gateway integration tests.
//!
//! Exercises the approval workflow end to end against a real audit ledger:
//! exactly-once resolution of parked calls, the concurrency cap, and
//! council-routed approval.

use std::sync::Arc;

use aegis_gate::{
    EchoHandler, ExecutionGateway, FailureKind, FnHandler, GatewayError, PermissionAuthority,
    ToolCall, ToolError,
};
use aegis_ledger::AuditLedger;
use aegis_types::config::COUNCIL_ROLE;
use aegis_types::{
    AegisEvent, ApprovalOutcome, CallId, GatewayConfig, PermissionTier, ToolPolicy, TrustLevel,
};
use serde_json::json;

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn setup(max_concurrent: usize) -> (Arc<ExecutionGateway>, Arc<AuditLedger>) {
    let ledger = Arc::new(AuditLedger::in_memory(50));
    let authority = Arc::new(PermissionAuthority::from_policies([
        ToolPolicy::new("db.drop", PermissionTier::WriteDestructive, TrustLevel::Verified)
            .with_approval_timeout(30),
        ToolPolicy::new("cluster.reconfigure", PermissionTier::Admin, TrustLevel::Operator)
            .ratified_by_council()
            .with_approval_timeout(600),
        ToolPolicy::new("kv.get", PermissionTier::ReadOnly, TrustLevel::Untrusted),
    ]));
    let config = GatewayConfig {
        max_concurrent,
        ..GatewayConfig::default()
    };
    let gateway = ExecutionGateway::new(authority, ledger.clone(), config);
    gateway.register_handler("db.drop", Arc::new(EchoHandler::new()));
    gateway.register_handler("cluster.reconfigure", Arc::new(EchoHandler::new()));
    gateway.register_handler(
        "kv.get",
        Arc::new(FnHandler::new(|call: ToolCall| {
            Box::pin(async move {
                match call.parameters.get("key").and_then(|k| k.as_str()) {
                    Some(key) => Ok(json!({ "key": key, "value": 42 })),
                    None => Err(ToolError::new("missing key")),
                }
            })
        })),
    );
    (Arc::new(gateway), ledger)
}

fn drop_call(id: &str) -> ToolCall {
    ToolCall::new("db.drop", "agent-9", TrustLevel::Operator, json!({ "table": "t" })).with_id(id)
}

async fn wait_parked(gateway: &ExecutionGateway, id: &CallId) {
    while gateway.pending_approval(id).is_none() {
        tokio::task::yield_now().await;
    }
}

// ----------------------------------------------------------------------------
// Approval exclusivity
// ----------------------------------------------------------------------------

#[tokio::test]
async fn approve_then_reject_is_not_found() {
    let (gateway, _) = setup(4);
    let call = drop_call("x-1");
    let id = call.id.clone();

    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });
    wait_parked(&gateway, &id).await;

    gateway.approve(&id, "operator").await.unwrap();
    assert!(matches!(
        gateway.reject(&id, "too late").await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        gateway.approve(&id, "arbiter").await,
        Err(GatewayError::NotFound(_))
    ));

    let result = task.await.unwrap();
    assert!(result.success);
    assert_eq!(result.approved_by.as_deref(), Some("operator"));
}

#[tokio::test]
async fn reject_then_approve_is_not_found() {
    let (gateway, ledger) = setup(4);
    let call = drop_call("x-2");
    let id = call.id.clone();

    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });
    wait_parked(&gateway, &id).await;

    gateway.reject(&id, "not today").await.unwrap();
    assert!(matches!(
        gateway.approve(&id, "operator").await,
        Err(GatewayError::NotFound(_))
    ));

    let result = task.await.unwrap();
    assert!(!result.success);
    assert_eq!(
        result.failure,
        Some(FailureKind::Rejected {
            reason: "not today".into()
        })
    );

    let actions: Vec<String> = ledger.events().await.into_iter().map(|e| e.action).collect();
    assert!(actions.contains(&"tool.rejected".to_string()));
    assert_eq!(actions.last().map(String::as_str), Some("tool.failed"));
}

#[tokio::test(start_paused = true)]
async fn timeout_then_decisions_are_not_found() {
    let (gateway, _) = setup(4);
    let mut rx = gateway.events().subscribe();
    let call = drop_call("x-3");
    let id = call.id.clone();

    let result = gateway.execute(call).await;
    assert_eq!(result.failure, Some(FailureKind::ApprovalTimeout));
    assert!(matches!(
        gateway.approve(&id, "operator").await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        gateway.reject(&id, "late").await,
        Err(GatewayError::NotFound(_))
    ));

    let mut outcomes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AegisEvent::ApprovalResolved { outcome, .. } = event {
            outcomes.push(outcome);
        }
    }
    assert_eq!(outcomes, vec![ApprovalOutcome::TimedOut]);
}

#[tokio::test]
async fn racing_decisions_resolve_exactly_once() {
    let (gateway, _) = setup(16);
    for i in 0..10 {
        let call = drop_call(&format!("race-{i}"));
        let id = call.id.clone();
        let g = gateway.clone();
        let task = tokio::spawn(async move { g.execute(call).await });
        wait_parked(&gateway, &id).await;

        let (a, b) = tokio::join!(gateway.approve(&id, "arbiter"), gateway.reject(&id, "race"));
        assert!(a.is_ok() ^ b.is_ok(), "exactly one decision must win");

        let result = task.await.unwrap();
        assert_eq!(result.success, a.is_ok());
    }
    assert_eq!(gateway.in_flight(), 0);
}

#[tokio::test]
async fn abandoned_caller_withdraws_its_approval() {
    let (gateway, ledger) = setup(4);
    let call = drop_call("x-gone");
    let id = call.id.clone();

    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });
    wait_parked(&gateway, &id).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(gateway.pending_approvals().is_empty());
    assert_eq!(gateway.in_flight(), 0);
    assert!(matches!(
        gateway.approve(&id, "arbiter").await,
        Err(GatewayError::NotFound(_))
    ));
    let actions: Vec<_> = ledger.events().await.into_iter().map(|e| e.action).collect();
    assert!(!actions.contains(&"tool.approved".to_string()));
}

#[tokio::test]
async fn oversized_approval_timeout_fails_the_call() {
    let (gateway, _) = setup(4);
    gateway.authority().register(
        ToolPolicy::new("db.drop", PermissionTier::WriteDestructive, TrustLevel::Verified)
            .with_approval_timeout(u64::MAX),
    );
    let call = drop_call("x-forever");
    let id = call.id.clone();

    let result = gateway.execute(call).await;
    assert!(!result.success);
    assert!(matches!(result.failure, Some(FailureKind::Rejected { .. })));
    assert!(gateway.pending_approval(&id).is_none());
    assert_eq!(gateway.in_flight(), 0);
}

// ----------------------------------------------------------------------------
// Concurrency cap
// ----------------------------------------------------------------------------

#[tokio::test]
async fn calls_beyond_cap_fail_fast() {
    let (gateway, _) = setup(2);
    let mut tasks = Vec::new();
    for i in 0..2 {
        let call = drop_call(&format!("cap-{i}"));
        let id = call.id.clone();
        let g = gateway.clone();
        tasks.push((id.clone(), tokio::spawn(async move { g.execute(call).await })));
        wait_parked(&gateway, &id).await;
    }
    assert_eq!(gateway.in_flight(), 2);

    let overflow = gateway
        .execute(ToolCall::new("kv.get", "agent-1", TrustLevel::Standard, json!({"key": "a"})))
        .await;
    assert_eq!(overflow.failure, Some(FailureKind::Capacity));

    for (id, _) in &tasks {
        gateway.reject(id, "cleanup").await.unwrap();
    }
    for (_, task) in tasks {
        assert!(!task.await.unwrap().success);
    }
    assert_eq!(gateway.in_flight(), 0);

    let ok = gateway
        .execute(ToolCall::new("kv.get", "agent-1", TrustLevel::Standard, json!({"key": "a"})))
        .await;
    assert!(ok.success);
    assert_eq!(ok.output.unwrap()["value"], 42);
}

// ----------------------------------------------------------------------------
// Council routing
// ----------------------------------------------------------------------------

#[tokio::test]
async fn council_routed_calls_only_accept_council() {
    let (gateway, _) = setup(4);
    let mut rx = gateway.events().subscribe();
    let call = ToolCall::new(
        "cluster.reconfigure",
        "planner",
        TrustLevel::Operator,
        json!({"replicas": 5}),
    );
    let id = call.id.clone();

    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });
    wait_parked(&gateway, &id).await;

    let summary = gateway.pending_approval(&id).unwrap();
    assert_eq!(summary.tier, PermissionTier::Admin);

    assert!(matches!(
        gateway.approve(&id, "arbiter").await,
        Err(GatewayError::UnauthorizedApprover { .. })
    ));
    gateway.approve(&id, COUNCIL_ROLE).await.unwrap();

    let result = task.await.unwrap();
    assert!(result.success);
    assert_eq!(result.approved_by.as_deref(), Some(COUNCIL_ROLE));

    let mut saw_required = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, AegisEvent::ApprovalRequired { .. }) {
            saw_required = true;
        }
    }
    assert!(saw_required);
}

#[tokio::test]
async fn handler_error_is_a_failed_result() {
    let (gateway, ledger) = setup(4);
    let result = gateway
        .execute(ToolCall::new("kv.get", "agent-1", TrustLevel::Standard, json!({})))
        .await;
    assert_eq!(result.error.as_deref(), Some("tool failed: missing key"));
    assert!(ledger.verify().await.valid);
}
