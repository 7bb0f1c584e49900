//! Credibility feedback.
//!
//! Once the real-world effect of a decision is known, an observer rates it in
//! `[-1, 1]`. Members whose vote pointed the same way as the rating extend a
//! positive streak; the others extend a negative one.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use aegis_types::{VoteChoice, VoteId, VoteStatus, VoteThreshold};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vote::{Ballot, Vote};

/// Streak magnitude at which a trend is reported.
pub const TREND_STREAK: i32 = 3;

/// Approve/reject margin below which a decision counts as close.
const CLOSE_MARGIN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn from_streak(streak: i32) -> Self {
        if streak >= TREND_STREAK {
            Trend::Improving
        } else if streak <= -TREND_STREAK {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        };
        f.write_str(s)
    }
}

/// Priority of a pending feedback request. Ordered lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Medium,
    High,
    Critical,
}

impl Significance {
    pub fn classify(vote: &Vote) -> Self {
        let tally = vote.tally();
        if vote.threshold == VoteThreshold::Unanimous || vote.status == VoteStatus::Vetoed {
            Significance::Critical
        } else if vote.threshold == VoteThreshold::Supermajority || tally.margin() < CLOSE_MARGIN {
            Significance::High
        } else {
            Significance::Medium
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredibilityRecord {
    pub member: String,
    /// Positive for consecutive aligned votes, negative for misaligned.
    pub streak: i32,
    pub aligned: u32,
    pub misaligned: u32,
    pub trend: Trend,
    pub updated_at: DateTime<Utc>,
}

impl CredibilityRecord {
    fn new(member: &str, now: DateTime<Utc>) -> Self {
        Self {
            member: member.to_string(),
            streak: 0,
            aligned: 0,
            misaligned: 0,
            trend: Trend::Stable,
            updated_at: now,
        }
    }

    fn record(&mut self, aligned: bool, now: DateTime<Utc>) {
        if aligned {
            self.aligned += 1;
            self.streak = self.streak.max(0) + 1;
        } else {
            self.misaligned += 1;
            self.streak = self.streak.min(0) - 1;
        }
        self.trend = Trend::from_streak(self.streak);
        self.updated_at = now;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub vote_id: VoteId,
    pub topic: String,
    pub outcome: VoteStatus,
    pub significance: Significance,
    pub created_at: DateTime<Utc>,
    pub rating: Option<f64>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Member track records and the feedback queue.
#[derive(Debug, Default)]
pub struct CredibilityTracker {
    records: HashMap<String, CredibilityRecord>,
    pending: Vec<FeedbackRequest>,
    resolved: Vec<FeedbackRequest>,
}

impl CredibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request for outcome feedback on a resolved vote.
    pub fn open_request(&mut self, vote: &Vote, now: DateTime<Utc>) -> FeedbackRequest {
        let request = FeedbackRequest {
            vote_id: vote.id,
            topic: vote.topic.clone(),
            outcome: vote.status,
            significance: Significance::classify(vote),
            created_at: now,
            rating: None,
            resolved_at: None,
        };
        self.pending.retain(|r| r.vote_id != vote.id);
        self.pending.push(request.clone());
        request
    }

    pub fn has_pending(&self, vote_id: VoteId) -> bool {
        self.pending.iter().any(|r| r.vote_id == vote_id)
    }

    /// Apply a rating to every member who took a side and resolve the request.
    ///
    /// Returns `None` when no request is pending for `vote_id`.
    pub fn submit(
        &mut self,
        vote_id: VoteId,
        rating: f64,
        ballots: &[Ballot],
        now: DateTime<Utc>,
    ) -> Option<FeedbackRequest> {
        let idx = self.pending.iter().position(|r| r.vote_id == vote_id)?;
        let mut request = self.pending.remove(idx);
        let rating = if rating.is_nan() { 0.0 } else { rating.clamp(-1.0, 1.0) };

        for ballot in ballots {
            let aligned = match (ballot.choice, rating) {
                (VoteChoice::Abstain, _) => continue,
                (_, r) if r == 0.0 => continue,
                (VoteChoice::Approve, r) => r > 0.0,
                (VoteChoice::Reject, r) => r < 0.0,
            };
            self.records
                .entry(ballot.member.clone())
                .or_insert_with(|| CredibilityRecord::new(&ballot.member, now))
                .record(aligned, now);
        }

        request.rating = Some(rating);
        request.resolved_at = Some(now);
        self.resolved.push(request.clone());
        Some(request)
    }

    pub fn record(&self, member: &str) -> Option<&CredibilityRecord> {
        self.records.get(member)
    }

    pub fn records(&self) -> Vec<CredibilityRecord> {
        let mut all: Vec<CredibilityRecord> = self.records.values().cloned().collect();
        all.sort_by(|a, b| a.member.cmp(&b.member));
        all
    }

    /// Pending requests, most significant first, then oldest first.
    pub fn pending(&self) -> Vec<FeedbackRequest> {
        let mut all = self.pending.clone();
        all.sort_by_key(|r| (Reverse(r.significance), r.created_at));
        all
    }

    pub fn resolved(&self) -> &[FeedbackRequest] {
        &self.resolved
    }
}
