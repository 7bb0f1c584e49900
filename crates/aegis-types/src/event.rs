//! Typed lifecycle events.
//!
//! Components publish onto an [`EventBus`] without waiting for observers.
//! Publishing with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::constitution::{Pillar, VoteChoice, VoteStatus, VoteThreshold};
use crate::ids::{CallId, VoteId};
use crate::policy::ApprovalRoute;
use crate::trust::PermissionTier;

const DEFAULT_CAPACITY: usize = 1024;

/// How a parked approval ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved { by: String },
    Rejected { reason: String },
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AegisEvent {
    ToolStart {
        call_id: CallId,
        tool_id: String,
        agent: String,
    },
    ToolEnd {
        call_id: CallId,
        tool_id: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    ApprovalRequired {
        call_id: CallId,
        tool_id: String,
        agent: String,
        tier: PermissionTier,
        route: ApprovalRoute,
        deadline: DateTime<Utc>,
    },
    ApprovalResolved {
        call_id: CallId,
        outcome: ApprovalOutcome,
    },
    VoteCreated {
        vote_id: VoteId,
        topic: String,
        threshold: VoteThreshold,
        emergency: bool,
    },
    VoteCast {
        vote_id: VoteId,
        member: String,
        choice: VoteChoice,
    },
    VoteResolved {
        vote_id: VoteId,
        status: VoteStatus,
    },
    VetoExercised {
        vote_id: VoteId,
        member: String,
        domain: String,
    },
    PillarQuorumFailed {
        vote_id: VoteId,
        missing_pillars: Vec<Pillar>,
    },
    DissentRecorded {
        vote_id: VoteId,
        consensus_strength: f64,
        dissenters: usize,
    },
    OverturnRequested {
        original_vote_id: VoteId,
        overturn_vote_id: VoteId,
        requested_by: String,
    },
    DecisionOverturned {
        vote_id: VoteId,
        overturn_vote_id: VoteId,
    },
    CheckpointCreated {
        checkpoint_id: Uuid,
        event_count: u64,
    },
}

impl AegisEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AegisEvent::ToolStart { .. } => "tool_start",
            AegisEvent::ToolEnd { .. } => "tool_end",
            AegisEvent::ApprovalRequired { .. } => "approval_required",
            AegisEvent::ApprovalResolved { .. } => "approval_resolved",
            AegisEvent::VoteCreated { .. } => "vote_created",
            AegisEvent::VoteCast { .. } => "vote_cast",
            AegisEvent::VoteResolved { .. } => "vote_resolved",
            AegisEvent::VetoExercised { .. } => "veto_exercised",
            AegisEvent::PillarQuorumFailed { .. } => "pillar_quorum_failed",
            AegisEvent::DissentRecorded { .. } => "dissent_recorded",
            AegisEvent::OverturnRequested { .. } => "overturn_requested",
            AegisEvent::DecisionOverturned { .. } => "decision_overturned",
            AegisEvent::CheckpointCreated { .. } => "checkpoint_created",
        }
    }
}

/// Fire-and-forget broadcast of [`AegisEvent`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<AegisEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: AegisEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            trace!(kind, "event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AegisEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(AegisEvent::ToolStart {
            call_id: CallId::new("c1"),
            tool_id: "fs.read".into(),
            agent: "alice".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "tool_start");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(AegisEvent::VoteResolved {
            vote_id: VoteId::generate(),
            status: VoteStatus::Passed,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = AegisEvent::PillarQuorumFailed {
            vote_id: VoteId::generate(),
            missing_pillars: vec![Pillar::Ethics, Pillar::Oversight],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "pillar_quorum_failed");
        assert_eq!(json["missing_pillars"][0], "ethics");
    }
}
