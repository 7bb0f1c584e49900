//! Aegis Council: collective ratification for decisions no single approver
//! should make alone.
//!
//! Fifteen permanent seats in five pillars vote on proposals. A vote resolves
//! the moment its outcome is certain:
//!
//! - **Threshold**: MAJORITY, SUPERMAJORITY or UNANIMOUS of the eligible seats
//! - **Veto**: a domain-tagged vote ends when that domain's veto holder rejects
//! - **Pillar quorum**: a pass drawn from too few pillars is downgraded
//!
//! Contested outcomes produce a [`DissentReport`] linked to similar earlier
//! reports. Emergency decisions go to a small panel and may be overturned by
//! the full council within a fixed window. Outcome ratings feed per-member
//! credibility streaks.

pub mod bridge;
pub mod council;
pub mod credibility;
pub mod dissent;
pub mod emergency;
pub mod error;
pub mod tally;
pub mod vote;

pub use bridge::CouncilBridge;
pub use council::CouncilGovernance;
pub use credibility::{CredibilityRecord, CredibilityTracker, FeedbackRequest, Significance, Trend};
pub use dissent::{DissentReport, Dissenter, PrecedentLink, PrecedentMatcher, WordOverlapMatcher};
pub use emergency::select_panel;
pub use error::CouncilError;
pub use vote::{Ballot, Resolution, Vote, VoteRequest, VoteTally, EMERGENCY_MARKER};
