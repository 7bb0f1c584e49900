use aegis_ledger::LedgerError;
use aegis_types::{VoteId, VoteStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CouncilError {
    #[error("vote not found: {0}")]
    VoteNotFound(VoteId),

    #[error("vote {vote_id} is closed ({status})")]
    VoteClosed { vote_id: VoteId, status: VoteStatus },

    #[error("{member} is not eligible to vote on {vote_id}")]
    NotEligible { vote_id: VoteId, member: String },

    #[error("{member} has already voted on {vote_id}")]
    AlreadyVoted { vote_id: VoteId, member: String },

    #[error("{0} is not an emergency decision")]
    NotEmergency(VoteId),

    #[error("vote {vote_id} cannot be overturned while {status}")]
    NotOverturnable { vote_id: VoteId, status: VoteStatus },

    #[error("overturn window for {vote_id} closed at {deadline}")]
    WindowClosed {
        vote_id: VoteId,
        deadline: DateTime<Utc>,
    },

    #[error("overturn vote {overturn_vote_id} for {vote_id} is still open")]
    OverturnPending {
        vote_id: VoteId,
        overturn_vote_id: VoteId,
    },

    #[error("no pending feedback request for {0}")]
    NoPendingFeedback(VoteId),

    #[error("invalid vote request: {0}")]
    InvalidRequest(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
