//! Property tests for permission decisions.

use aegis_gate::{DenialReason, PermissionAuthority, ToolCall};
use aegis_types::{PermissionTier, ToolPolicy, TrustLevel};
use proptest::prelude::*;
use serde_json::json;

fn trust() -> impl Strategy<Value = TrustLevel> {
    prop::sample::select(TrustLevel::ALL.to_vec())
}

fn tier() -> impl Strategy<Value = PermissionTier> {
    prop::sample::select(PermissionTier::ALL.to_vec())
}

const AGENTS: [&str; 4] = ["alpha", "bravo", "charlie", "delta"];

proptest! {
    /// Below the required score a caller is always denied; at or above it,
    /// an eligible caller is always allowed.
    #[test]
    fn trust_requirement_is_monotone(
        required in trust(),
        caller in trust(),
        tier in tier(),
        agent_idx in 0usize..4,
        restricted in any::<bool>(),
    ) {
        let agent = AGENTS[agent_idx];
        let mut policy = ToolPolicy::new("svc.op", tier, required);
        if restricted {
            policy = policy.with_allow_list([agent, "zulu"]);
        }
        let call = ToolCall::new("svc.op", agent, caller, json!({}));
        let decision = PermissionAuthority::decide(&call, &policy);

        if caller.score() < required.score() {
            prop_assert!(!decision.allowed);
            let is_trust_denial = matches!(
                decision.denial,
                Some(DenialReason::InsufficientTrust { .. })
            );
            prop_assert!(is_trust_denial);
        } else {
            prop_assert!(decision.allowed);
            prop_assert_eq!(decision.requires_approval, tier.requires_approval());
        }
        prop_assert!((0.0..=1.0).contains(&decision.risk_score));
    }

    /// Decisions do not depend on the order in which calls are evaluated.
    #[test]
    fn decisions_are_order_independent(
        callers in prop::collection::vec((0usize..4, trust()), 1..20),
        required in trust(),
    ) {
        let authority = PermissionAuthority::from_policies([
            ToolPolicy::new("svc.op", PermissionTier::WriteSafe, required)
                .with_allow_list(["alpha", "bravo"]),
        ]);
        let calls: Vec<ToolCall> = callers
            .iter()
            .map(|(i, t)| ToolCall::new("svc.op", AGENTS[*i], *t, json!({})))
            .collect();

        let forward: Vec<bool> = calls.iter().map(|c| authority.evaluate(c).0.allowed).collect();
        let mut backward: Vec<bool> = calls
            .iter()
            .rev()
            .map(|c| authority.evaluate(c).0.allowed)
            .collect();
        backward.reverse();
        prop_assert_eq!(&forward, &backward);

        for (call, allowed) in calls.iter().zip(&forward) {
            let expected = ["alpha", "bravo"].contains(&call.requesting_agent.as_str())
                && call.trust_level.score() >= required.score();
            prop_assert_eq!(*allowed, expected);
        }
    }

    /// An agent missing from a non-empty allow-list is denied regardless of trust.
    #[test]
    fn allow_list_excludes_unlisted(caller in trust(), tier in tier()) {
        let policy = ToolPolicy::new("svc.op", tier, TrustLevel::Hostile)
            .with_allow_list(["alpha"]);
        let call = ToolCall::new("svc.op", "bravo", caller, json!({}));
        let decision = PermissionAuthority::decide(&call, &policy);
        prop_assert!(!decision.allowed);
        let is_allow_list_denial = matches!(
            decision.denial,
            Some(DenialReason::NotOnAllowList { .. })
        );
        prop_assert!(is_allow_list_denial);
    }
}
