//! Dissent reports and precedent matching.

use std::collections::BTreeSet;

use aegis_types::{Pillar, VoteChoice, VoteId, VoteStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vote::Vote;

/// Topic words too common to signal a shared subject.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "into", "over", "under", "about", "all",
    "any", "are", "was", "were", "has", "have", "not", "but", "its", "our", "their", "new",
];

/// Most precedents linked from one report.
pub const MAX_PRECEDENTS: usize = 5;

/// A member on the losing side of a contested decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dissenter {
    pub member: String,
    pub pillar: Pillar,
    pub choice: VoteChoice,
    pub reasoning: String,
}

/// Link from a report to an earlier report on a similar topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecedentLink {
    pub vote_id: VoteId,
    pub topic: String,
    pub overlap: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DissentReport {
    pub vote_id: VoteId,
    pub topic: String,
    pub outcome: VoteStatus,
    pub consensus_strength: f64,
    pub dissenters: Vec<Dissenter>,
    pub precedents: Vec<PrecedentLink>,
    pub created_at: DateTime<Utc>,
}

impl DissentReport {
    /// Build a report for a resolved vote whose consensus fell below `threshold`.
    ///
    /// Dissenters are the smaller decisive faction. On a tie they are the
    /// members who voted against the outcome.
    pub fn for_vote(vote: &Vote, threshold: f64) -> Option<Self> {
        let resolution = vote.resolution.as_ref()?;
        if !matches!(
            resolution.status,
            VoteStatus::Passed | VoteStatus::Failed | VoteStatus::Vetoed
        ) {
            return None;
        }
        let tally = resolution.tally;
        if tally.decisive() == 0 || resolution.consensus_strength >= threshold {
            return None;
        }

        let minority = match tally.approve.cmp(&tally.reject) {
            std::cmp::Ordering::Less => VoteChoice::Approve,
            std::cmp::Ordering::Greater => VoteChoice::Reject,
            std::cmp::Ordering::Equal if resolution.status == VoteStatus::Passed => VoteChoice::Reject,
            std::cmp::Ordering::Equal => VoteChoice::Approve,
        };
        let dissenters = vote
            .ballots
            .iter()
            .filter(|b| b.choice == minority)
            .map(|b| Dissenter {
                member: b.member.clone(),
                pillar: b.pillar,
                choice: b.choice,
                reasoning: b.reasoning.clone(),
            })
            .collect();

        Some(Self {
            vote_id: vote.id,
            topic: vote.topic.clone(),
            outcome: resolution.status,
            consensus_strength: resolution.consensus_strength,
            dissenters,
            precedents: Vec::new(),
            created_at: resolution.resolved_at,
        })
    }
}

/// Finds earlier dissent reports related to a topic.
pub trait PrecedentMatcher: Send + Sync {
    fn find(&self, topic: &str, prior: &[DissentReport]) -> Vec<PrecedentLink>;
}

/// Jaccard overlap of topic words.
#[derive(Clone, Debug)]
pub struct WordOverlapMatcher {
    threshold: f64,
    limit: usize,
}

impl WordOverlapMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            limit: MAX_PRECEDENTS,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn overlap(a: &str, b: &str) -> f64 {
        let a = tokens(a);
        let b = tokens(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(&b).count();
        let union = a.union(&b).count();
        shared as f64 / union as f64
    }
}

impl Default for WordOverlapMatcher {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl PrecedentMatcher for WordOverlapMatcher {
    fn find(&self, topic: &str, prior: &[DissentReport]) -> Vec<PrecedentLink> {
        let mut links: Vec<PrecedentLink> = prior
            .iter()
            .filter_map(|report| {
                let overlap = Self::overlap(topic, &report.topic);
                (overlap >= self.threshold).then(|| PrecedentLink {
                    vote_id: report.vote_id,
                    topic: report.topic.clone(),
                    overlap,
                })
            })
            .collect();
        links.sort_by(|a, b| b.overlap.total_cmp(&a.overlap));
        links.truncate(self.limit);
        links
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}
