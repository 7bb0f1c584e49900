//! Council ratification of gateway approvals, end to end.

use std::sync::Arc;

use aegis_council::{CouncilBridge, CouncilGovernance, Vote};
use aegis_gate::{EchoHandler, ExecutionGateway, FailureKind, PermissionAuthority, ToolCall};
use aegis_ledger::AuditLedger;
use aegis_types::config::COUNCIL_ROLE;
use aegis_types::{
    Constitution, CouncilConfig, ManualClock, GatewayConfig, PermissionTier, ToolPolicy, TrustLevel, VoteChoice,
    VoteStatus, VoteThreshold,
};
use chrono::{TimeZone, Utc};
use serde_json::json;

fn setup() -> (Arc<ExecutionGateway>, Arc<CouncilGovernance>, Arc<AuditLedger>) {
    let ledger = Arc::new(AuditLedger::in_memory(1000));
    let authority = Arc::new(PermissionAuthority::from_policies([ToolPolicy::new(
        "cluster.reconfigure",
        PermissionTier::Admin,
        TrustLevel::Operator,
    )
    .ratified_by_council()
    .with_approval_timeout(600)]));
    let gateway = ExecutionGateway::new(authority, ledger.clone(), GatewayConfig::default());
    gateway.register_handler("cluster.reconfigure", Arc::new(EchoHandler::new()));
    let council = CouncilGovernance::new(
        Constitution::standard(),
        ledger.clone(),
        CouncilConfig::default(),
    );
    (Arc::new(gateway), Arc::new(council), ledger)
}

async fn ratification_vote(council: &CouncilGovernance) -> Vote {
    loop {
        if let Some(vote) = council.votes().await.into_iter().next() {
            return vote;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn council_supermajority_approves_parked_call() {
    let (gateway, council, ledger) = setup();
    let bridge = CouncilBridge::new(council.clone(), gateway.clone()).spawn();

    let call = ToolCall::new(
        "cluster.reconfigure",
        "planner",
        TrustLevel::Operator,
        json!({ "replicas": 7 }),
    );
    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });

    let vote = ratification_vote(&council).await;
    assert_eq!(vote.threshold, VoteThreshold::Supermajority);
    assert!(vote.topic.contains("cluster.reconfigure"));
    assert!(vote.description.contains("replicas"));

    for seat in [
        "sentinel", "guardian", "custodian", "ethicist", "advocate", "quartermaster", "engineer",
        "dispatcher", "strategist", "analyst",
    ] {
        assert!(council.cast_vote(vote.id, seat, VoteChoice::Approve, "sound plan").await);
    }
    assert_eq!(council.get_vote(vote.id).await.unwrap().status, VoteStatus::Passed);

    let result = task.await.unwrap();
    assert!(result.success);
    assert_eq!(result.approved_by.as_deref(), Some(COUNCIL_ROLE));
    assert!(ledger.verify().await.valid);
    bridge.abort();
}

#[tokio::test]
async fn council_rejection_fails_parked_call() {
    let (gateway, council, _) = setup();
    let bridge = CouncilBridge::new(council.clone(), gateway.clone()).spawn();

    let call = ToolCall::new("cluster.reconfigure", "planner", TrustLevel::Operator, json!({}));
    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });

    let vote = ratification_vote(&council).await;
    for seat in ["strategist", "analyst", "researcher", "archivist", "scribe", "arbiter"] {
        assert!(council.cast_vote(vote.id, seat, VoteChoice::Reject, "too risky").await);
    }

    let result = task.await.unwrap();
    assert!(!result.success);
    assert_eq!(
        result.failure,
        Some(FailureKind::Rejected {
            reason: "council vote FAILED".into()
        })
    );
    assert!(gateway.pending_approvals().is_empty());
    bridge.abort();
}

#[tokio::test]
async fn approval_budget_follows_the_gateway_clock() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2020, 1, 6, 12, 0, 0).unwrap()));
    let ledger = Arc::new(AuditLedger::in_memory(1000));
    let authority = Arc::new(PermissionAuthority::from_policies([ToolPolicy::new(
        "cluster.reconfigure",
        PermissionTier::Admin,
        TrustLevel::Operator,
    )
    .ratified_by_council()
    .with_approval_timeout(600)]));
    let gateway = Arc::new(
        ExecutionGateway::new(authority, ledger.clone(), GatewayConfig::default())
            .with_clock(clock.clone()),
    );
    gateway.register_handler("cluster.reconfigure", Arc::new(EchoHandler::new()));
    let council = Arc::new(
        CouncilGovernance::new(Constitution::standard(), ledger, CouncilConfig::default())
            .with_clock(clock.clone()),
    );
    let bridge = CouncilBridge::new(council.clone(), gateway.clone()).spawn();

    let call = ToolCall::new("cluster.reconfigure", "planner", TrustLevel::Operator, json!({}));
    let g = gateway.clone();
    let task = tokio::spawn(async move { g.execute(call).await });

    // Ten minutes on the manual clock, not relative to wall time
    let vote = ratification_vote(&council).await;
    assert_eq!((vote.deadline - vote.created_at).num_minutes(), 10);

    for seat in [
        "sentinel", "guardian", "custodian", "ethicist", "advocate", "quartermaster", "engineer",
        "dispatcher", "strategist", "analyst",
    ] {
        assert!(council.cast_vote(vote.id, seat, VoteChoice::Approve, "approved").await);
    }

    let result = task.await.unwrap();
    assert!(result.success);
    assert_eq!(result.approved_by.as_deref(), Some(COUNCIL_ROLE));
    bridge.abort();
}
