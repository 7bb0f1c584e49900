//! Council seats, pillars and vote thresholds.
//!
//! The standard constitution seats 15 members in five pillars of sizes
//! 3/2/3/5/2. Eight seats hold single-domain veto authority. The seat count
//! is a parameter: every required count is derived from it, so a smaller or
//! larger council can be built with [`Constitution::new`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minimum number of pillars that must take part in a ratified decision.
pub const DEFAULT_MIN_PILLARS: usize = 3;

/// One of the five groupings of council seats.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Pillar {
    Stewardship,
    Ethics,
    Operations,
    Cognition,
    Oversight,
}

impl Pillar {
    pub const ALL: [Pillar; 5] = [
        Pillar::Stewardship,
        Pillar::Ethics,
        Pillar::Operations,
        Pillar::Cognition,
        Pillar::Oversight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Pillar::Stewardship => "stewardship",
            Pillar::Ethics => "ethics",
            Pillar::Operations => "operations",
            Pillar::Cognition => "cognition",
            Pillar::Oversight => "oversight",
        }
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permanent council seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilMember {
    pub id: String,
    pub name: String,
    pub pillar: Pillar,
    #[serde(default)]
    pub veto_domains: Vec<String>,
}

impl CouncilMember {
    pub fn new(id: &str, name: &str, pillar: Pillar) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            pillar,
            veto_domains: Vec::new(),
        }
    }

    pub fn with_veto(mut self, domain: &str) -> Self {
        self.veto_domains.push(domain.to_string());
        self
    }

    pub fn holds_veto(&self, domain: &str) -> bool {
        self.veto_domains.iter().any(|d| d == domain)
    }
}

/// Required share of seats for a vote to pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteThreshold {
    /// More than half of the seats.
    Majority,
    /// At least 66% of the seats.
    Supermajority,
    /// Every seat.
    Unanimous,
}

impl VoteThreshold {
    pub fn fraction(self) -> f64 {
        match self {
            VoteThreshold::Majority => 0.5,
            VoteThreshold::Supermajority => 0.66,
            VoteThreshold::Unanimous => 1.0,
        }
    }

    /// Approvals needed out of `seats` eligible voters.
    ///
    /// Majority is strict (`seats / 2 + 1`); the others are the ceiling of
    /// `fraction * seats`, computed in integer percent to avoid float drift.
    pub fn required_count(self, seats: usize) -> usize {
        match self {
            VoteThreshold::Majority => seats / 2 + 1,
            VoteThreshold::Supermajority => (seats * 66).div_ceil(100),
            VoteThreshold::Unanimous => seats,
        }
    }
}

impl fmt::Display for VoteThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoteThreshold::Majority => "MAJORITY",
            VoteThreshold::Supermajority => "SUPERMAJORITY",
            VoteThreshold::Unanimous => "UNANIMOUS",
        };
        f.write_str(s)
    }
}

/// A ballot choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoteChoice::Approve => "APPROVE",
            VoteChoice::Reject => "REJECT",
            VoteChoice::Abstain => "ABSTAIN",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteStatus {
    Open,
    Passed,
    Failed,
    Vetoed,
    Expired,
    Overturned,
}

impl VoteStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, VoteStatus::Open)
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoteStatus::Open => "OPEN",
            VoteStatus::Passed => "PASSED",
            VoteStatus::Failed => "FAILED",
            VoteStatus::Vetoed => "VETOED",
            VoteStatus::Expired => "EXPIRED",
            VoteStatus::Overturned => "OVERTURNED",
        };
        f.write_str(s)
    }
}

/// The fixed seat table of the council.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Constitution {
    members: Vec<CouncilMember>,
    ethics_seat: String,
    min_pillars: usize,
}

impl Constitution {
    /// Build a constitution from an explicit seat table.
    ///
    /// Seat ids must be unique and the ethics seat must be one of them.
    pub fn new(members: Vec<CouncilMember>, ethics_seat: &str) -> Result<Self, ConfigError> {
        if members.is_empty() {
            return Err(ConfigError::Constitution("no seats defined".into()));
        }
        let mut seen = HashSet::new();
        for m in &members {
            if !seen.insert(m.id.as_str()) {
                return Err(ConfigError::Constitution(format!(
                    "duplicate seat id: {}",
                    m.id
                )));
            }
        }
        if !seen.contains(ethics_seat) {
            return Err(ConfigError::Constitution(format!(
                "ethics seat {ethics_seat} is not a council member"
            )));
        }
        Ok(Self {
            members,
            ethics_seat: ethics_seat.to_string(),
            min_pillars: DEFAULT_MIN_PILLARS,
        })
    }

    /// The standard 15-seat council.
    pub fn standard() -> Self {
        let members = vec![
            // Stewardship (3)
            CouncilMember::new("sentinel", "Sentinel", Pillar::Stewardship).with_veto("security"),
            CouncilMember::new("guardian", "Guardian", Pillar::Stewardship).with_veto("safety"),
            CouncilMember::new("custodian", "Custodian", Pillar::Stewardship).with_veto("privacy"),
            // Ethics (2)
            CouncilMember::new("ethicist", "Ethicist", Pillar::Ethics).with_veto("ethics"),
            CouncilMember::new("advocate", "Advocate", Pillar::Ethics).with_veto("user_welfare"),
            // Operations (3)
            CouncilMember::new("quartermaster", "Quartermaster", Pillar::Operations)
                .with_veto("budget"),
            CouncilMember::new("engineer", "Engineer", Pillar::Operations)
                .with_veto("infrastructure"),
            CouncilMember::new("dispatcher", "Dispatcher", Pillar::Operations),
            // Cognition (5)
            CouncilMember::new("strategist", "Strategist", Pillar::Cognition),
            CouncilMember::new("analyst", "Analyst", Pillar::Cognition),
            CouncilMember::new("researcher", "Researcher", Pillar::Cognition),
            CouncilMember::new("archivist", "Archivist", Pillar::Cognition),
            CouncilMember::new("scribe", "Scribe", Pillar::Cognition),
            // Oversight (2)
            CouncilMember::new("auditor", "Auditor", Pillar::Oversight).with_veto("compliance"),
            CouncilMember::new("arbiter", "Arbiter", Pillar::Oversight),
        ];
        Self {
            members,
            ethics_seat: "ethicist".to_string(),
            min_pillars: DEFAULT_MIN_PILLARS,
        }
    }

    pub fn with_min_pillars(mut self, min_pillars: usize) -> Self {
        self.min_pillars = min_pillars;
        self
    }

    pub fn seat_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[CouncilMember] {
        &self.members
    }

    pub fn member(&self, id: &str) -> Option<&CouncilMember> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.member(id).is_some()
    }

    pub fn pillar_of(&self, id: &str) -> Option<Pillar> {
        self.member(id).map(|m| m.pillar)
    }

    pub fn pillar_members(&self, pillar: Pillar) -> impl Iterator<Item = &CouncilMember> {
        self.members.iter().filter(move |m| m.pillar == pillar)
    }

    /// Seats holding veto authority over `domain`.
    pub fn veto_holders<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a CouncilMember> {
        self.members.iter().filter(move |m| m.holds_veto(domain))
    }

    pub fn veto_seat_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| !m.veto_domains.is_empty())
            .count()
    }

    pub fn ethics_seat(&self) -> &str {
        &self.ethics_seat
    }

    pub fn min_pillars(&self) -> usize {
        self.min_pillars
    }

    /// Participation needed for a ratified decision: a majority of seats.
    pub fn participation_quorum(&self) -> usize {
        VoteThreshold::Majority.required_count(self.seat_count())
    }
}

impl Default for Constitution {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_shape() {
        let c = Constitution::standard();
        assert_eq!(c.seat_count(), 15);
        assert_eq!(c.veto_seat_count(), 8);
        let sizes: Vec<usize> = Pillar::ALL
            .iter()
            .map(|p| c.pillar_members(*p).count())
            .collect();
        assert_eq!(sizes, vec![3, 2, 3, 5, 2]);
        assert_eq!(c.pillar_of(c.ethics_seat()), Some(Pillar::Ethics));
    }

    #[test]
    fn required_counts_for_fifteen_seats() {
        assert_eq!(VoteThreshold::Majority.required_count(15), 8);
        assert_eq!(VoteThreshold::Supermajority.required_count(15), 10);
        assert_eq!(VoteThreshold::Unanimous.required_count(15), 15);
    }

    #[test]
    fn required_counts_follow_seat_count() {
        assert_eq!(VoteThreshold::Majority.required_count(13), 7);
        assert_eq!(VoteThreshold::Supermajority.required_count(13), 9);
        assert_eq!(VoteThreshold::Majority.required_count(14), 8);
        assert_eq!(VoteThreshold::Supermajority.required_count(3), 2);
        assert_eq!(VoteThreshold::Majority.required_count(3), 2);
    }

    #[test]
    fn veto_lookup() {
        let c = Constitution::standard();
        let holders: Vec<&str> = c.veto_holders("security").map(|m| m.id.as_str()).collect();
        assert_eq!(holders, vec!["sentinel"]);
        assert_eq!(c.veto_holders("weather").count(), 0);
    }

    #[test]
    fn custom_constitution_is_validated() {
        let seats = vec![
            CouncilMember::new("a", "A", Pillar::Ethics),
            CouncilMember::new("a", "A2", Pillar::Cognition),
        ];
        assert!(Constitution::new(seats, "a").is_err());

        let seats = vec![CouncilMember::new("a", "A", Pillar::Cognition)];
        assert!(Constitution::new(seats, "ethicist").is_err());
    }
}
