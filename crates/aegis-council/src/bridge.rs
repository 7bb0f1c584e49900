//! Council ratification of gateway approvals.
//!
//! Tool policies routed to the council park their calls in the gateway like
//! any other approval. The bridge watches for those calls, opens a
//! SUPERMAJORITY vote for each, and approves or rejects the call once the
//! council has decided.

use std::sync::Arc;

use aegis_gate::ExecutionGateway;
use aegis_types::config::COUNCIL_ROLE;
use aegis_types::{AegisEvent, ApprovalRoute, CallId, SharedClock, VoteStatus, VoteThreshold};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::council::CouncilGovernance;
use crate::vote::VoteRequest;

/// Initiator recorded on votes the bridge opens.
pub const BRIDGE_INITIATOR: &str = "gateway";

pub struct CouncilBridge {
    council: Arc<CouncilGovernance>,
    gateway: Arc<ExecutionGateway>,
    clock: SharedClock,
}

impl CouncilBridge {
    /// Approval deadlines are measured on the gateway's clock.
    pub fn new(council: Arc<CouncilGovernance>, gateway: Arc<ExecutionGateway>) -> Self {
        let clock = Arc::clone(gateway.clock());
        Self {
            council,
            gateway,
            clock,
        }
    }

    /// Start forwarding council-routed approvals.
    ///
    /// The subscription is taken before this returns, so calls parked after
    /// `spawn` are never missed.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.gateway.events().subscribe();
        let bridge = Arc::new(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(AegisEvent::ApprovalRequired {
                        call_id,
                        tool_id,
                        agent,
                        route: ApprovalRoute::Council,
                        deadline,
                        ..
                    }) => {
                        let bridge = Arc::clone(&bridge);
                        tokio::spawn(async move {
                            bridge.ratify(call_id, tool_id, agent, deadline).await;
                        });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "council bridge lagged behind gateway events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("council bridge stopped");
        })
    }

    async fn ratify(&self, call_id: CallId, tool_id: String, agent: String, deadline: DateTime<Utc>) {
        let parameters = self
            .gateway
            .pending_approval(&call_id)
            .map(|p| p.parameters)
            .unwrap_or(serde_json::Value::Null);
        let remaining = deadline - self.clock.now();
        // Round up so the vote never closes before the parked call does
        let minutes = (remaining.num_seconds() + 59) / 60;

        let request = VoteRequest::new(
            format!("Authorize {tool_id} for {agent}"),
            VoteThreshold::Supermajority,
            BRIDGE_INITIATOR,
        )
        .with_description(json!({ "call_id": call_id, "parameters": parameters }).to_string())
        .with_deadline_minutes(minutes.max(1));

        let vote = match self.council.create_vote(request).await {
            Ok(vote) => vote,
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "could not open ratification vote");
                if let Err(e) = self.gateway.reject(&call_id, "council vote could not be opened").await {
                    debug!(call_id = %call_id, error = %e, "call already resolved");
                }
                return;
            }
        };
        info!(call_id = %call_id, vote_id = %vote.id, "ratification vote opened");

        let wait = remaining.to_std().unwrap_or_default();
        let decided = match tokio::time::timeout(wait, self.council.wait_for_resolution(vote.id)).await {
            Ok(Ok(decided)) => decided,
            Ok(Err(e)) => {
                warn!(call_id = %call_id, vote_id = %vote.id, error = %e, "ratification vote lost");
                return;
            }
            Err(_) => {
                debug!(call_id = %call_id, vote_id = %vote.id, "approval window closed before the council decided");
                return;
            }
        };

        let outcome = if decided.status == VoteStatus::Passed {
            self.gateway.approve(&call_id, COUNCIL_ROLE).await
        } else {
            let reason = format!("council vote {}", decided.status);
            self.gateway.reject(&call_id, &reason).await
        };
        if let Err(e) = outcome {
            debug!(call_id = %call_id, vote_id = %vote.id, error = %e, "call already resolved");
        }
    }
}
