//! Vote records.

use aegis_types::{Pillar, VoteChoice, VoteId, VoteStatus, VoteThreshold};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker prepended to the topic of emergency decisions.
pub const EMERGENCY_MARKER: &str = "[EMERGENCY]";

/// Parameters for opening a vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteRequest {
    pub topic: String,
    #[serde(default)]
    pub description: String,
    pub threshold: VoteThreshold,
    /// Falls back to the council's configured default when absent.
    #[serde(default)]
    pub deadline_minutes: Option<i64>,
    pub initiated_by: String,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl VoteRequest {
    pub fn new(topic: impl Into<String>, threshold: VoteThreshold, initiated_by: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            description: String::new(),
            threshold,
            deadline_minutes: None,
            initiated_by: initiated_by.into(),
            domains: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_deadline_minutes(mut self, minutes: i64) -> Self {
        self.deadline_minutes = Some(minutes);
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }
}

/// One member's recorded vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub member: String,
    pub pillar: Pillar,
    pub choice: VoteChoice,
    pub reasoning: String,
    pub cast_at: DateTime<Utc>,
}

/// Running counts for a vote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
    /// Seats entitled to vote.
    pub eligible: usize,
    /// Approvals needed to pass.
    pub required: usize,
}

impl VoteTally {
    pub fn cast(&self) -> usize {
        self.approve + self.reject + self.abstain
    }

    /// Eligible seats that have not voted yet.
    pub fn remaining(&self) -> usize {
        self.eligible.saturating_sub(self.cast())
    }

    /// Approve and reject votes; abstentions are not decisive.
    pub fn decisive(&self) -> usize {
        self.approve + self.reject
    }

    /// Share of decisive votes held by the larger side. 1.0 when nobody took a side.
    pub fn consensus_strength(&self) -> f64 {
        match self.decisive() {
            0 => 1.0,
            n => self.approve.max(self.reject) as f64 / n as f64,
        }
    }

    pub fn margin(&self) -> usize {
        self.approve.abs_diff(self.reject)
    }
}

/// How and why a vote left OPEN.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub status: VoteStatus,
    /// Whether the approval count reached the threshold, ratified or not.
    pub threshold_met: bool,
    pub resolved_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vetoed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_pillars: Vec<Pillar>,
    pub consensus_strength: f64,
    pub tally: VoteTally,
}

/// A council decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub topic: String,
    pub description: String,
    pub threshold: VoteThreshold,
    pub initiated_by: String,
    pub domains: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: VoteStatus,
    /// Seat ids entitled to vote: the full council, or an emergency panel.
    pub eligible: Vec<String>,
    pub ballots: Vec<Ballot>,
    pub emergency: bool,
    /// Set when an emergency decision resolves PASSED or FAILED.
    pub overturn_deadline: Option<DateTime<Utc>>,
    /// The emergency decision this vote would overturn.
    pub overturns: Option<VoteId>,
    /// Overturn vote currently open against this decision.
    pub open_overturn: Option<VoteId>,
    pub overturned_by: Option<VoteId>,
    pub resolution: Option<Resolution>,
}

impl Vote {
    pub fn is_open(&self) -> bool {
        self.status == VoteStatus::Open
    }

    pub fn is_eligible(&self, member: &str) -> bool {
        self.eligible.iter().any(|m| m == member)
    }

    pub fn ballot(&self, member: &str) -> Option<&Ballot> {
        self.ballots.iter().find(|b| b.member == member)
    }

    pub fn has_voted(&self, member: &str) -> bool {
        self.ballot(member).is_some()
    }

    pub fn tally(&self) -> VoteTally {
        let mut tally = VoteTally {
            eligible: self.eligible.len(),
            required: self.threshold.required_count(self.eligible.len()),
            ..VoteTally::default()
        };
        for ballot in &self.ballots {
            match ballot.choice {
                VoteChoice::Approve => tally.approve += 1,
                VoteChoice::Reject => tally.reject += 1,
                VoteChoice::Abstain => tally.abstain += 1,
            }
        }
        tally
    }

    /// Whether approvals had reached the threshold when the vote resolved.
    pub fn threshold_met(&self) -> bool {
        self.resolution.as_ref().is_some_and(|r| r.threshold_met)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_strength_ignores_abstentions() {
        let tally = VoteTally {
            approve: 9,
            reject: 6,
            abstain: 4,
            eligible: 19,
            required: 10,
        };
        assert!((tally.consensus_strength() - 0.6).abs() < 1e-9);
        assert_eq!(tally.remaining(), 0);
        assert_eq!(tally.margin(), 3);

        let empty = VoteTally::default();
        assert_eq!(empty.consensus_strength(), 1.0);
    }

    #[test]
    fn request_defaults() {
        let req: VoteRequest = serde_json::from_value(serde_json::json!({
            "topic": "Raise budget",
            "threshold": "MAJORITY",
            "initiated_by": "quartermaster",
        }))
        .unwrap();
        assert!(req.domains.is_empty());
        assert!(req.deadline_minutes.is_none());
    }
}
