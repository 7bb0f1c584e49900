//! Vote evaluation.
//!
//! Evaluation is a pure function of the ballots cast so far. It runs after
//! every ballot and once more at the deadline:
//!
//! 1. **Veto**: a REJECT from a seat holding veto over one of the vote's
//!    domains ends the vote as VETOED.
//! 2. **Threshold**: once approvals reach the required count the vote passes,
//!    but only after every eligible veto holder for its domains has voted.
//!    At the deadline outstanding holders count as abstaining.
//! 3. **Quorum**: a full-council pass must span enough pillars and a majority
//!    of seats; otherwise it is downgraded to FAILED.
//! 4. **Unreachable**: when the remaining seats cannot lift approvals to the
//!    required count the vote fails.
//! 5. **Expiry**: at the deadline an undecided vote is EXPIRED.

use std::collections::BTreeSet;

use aegis_types::{Constitution, Pillar, VoteChoice, VoteStatus, VoteThreshold};
use chrono::{DateTime, Utc};

use crate::vote::{Resolution, Vote, VoteTally};

/// Eligible seats holding veto over one of the vote's domains that have not voted.
pub fn outstanding_veto_holders<'a>(vote: &'a Vote, constitution: &'a Constitution) -> Vec<&'a str> {
    if vote.domains.is_empty() {
        return Vec::new();
    }
    vote.eligible
        .iter()
        .filter(|id| !vote.has_voted(id))
        .filter(|id| {
            constitution
                .member(id)
                .is_some_and(|m| vote.domains.iter().any(|d| m.holds_veto(d)))
        })
        .map(String::as_str)
        .collect()
}

/// Pillars with seats on the council that no ballot came from.
pub fn missing_pillars(vote: &Vote, constitution: &Constitution) -> Vec<Pillar> {
    let present: BTreeSet<Pillar> = vote.ballots.iter().map(|b| b.pillar).collect();
    Pillar::ALL
        .into_iter()
        .filter(|p| !present.contains(p))
        .filter(|p| constitution.pillar_members(*p).next().is_some())
        .collect()
}

/// Decide whether `vote` resolves now. `at_deadline` forces a terminal answer.
pub fn evaluate(
    vote: &Vote,
    constitution: &Constitution,
    now: DateTime<Utc>,
    at_deadline: bool,
) -> Option<Resolution> {
    let tally = vote.tally();
    let resolve = |status: VoteStatus, threshold_met: bool, reason: String| Resolution {
        status,
        threshold_met,
        resolved_at: now,
        reason,
        vetoed_by: None,
        missing_pillars: Vec::new(),
        consensus_strength: tally.consensus_strength(),
        tally,
    };

    if let Some((member, domain)) = find_veto(vote, constitution) {
        return Some(Resolution {
            vetoed_by: Some(member.to_string()),
            ..resolve(
                VoteStatus::Vetoed,
                false,
                format!("vetoed by {member} on {domain}"),
            )
        });
    }

    if tally.approve >= tally.required {
        if !at_deadline && !outstanding_veto_holders(vote, constitution).is_empty() {
            return None;
        }
        if vote.emergency {
            return Some(resolve(VoteStatus::Passed, true, passed_reason(&tally)));
        }
        return Some(ratify(vote, constitution, &tally, resolve));
    }

    if tally.approve + tally.remaining() < tally.required {
        return Some(resolve(
            VoteStatus::Failed,
            false,
            format!(
                "{} approvals can no longer reach {} required",
                tally.approve + tally.remaining(),
                tally.required
            ),
        ));
    }

    if at_deadline {
        return Some(resolve(
            VoteStatus::Expired,
            false,
            format!(
                "deadline passed with {} of {} required approvals",
                tally.approve, tally.required
            ),
        ));
    }
    None
}

fn find_veto<'a>(vote: &'a Vote, constitution: &'a Constitution) -> Option<(&'a str, &'a str)> {
    vote.ballots
        .iter()
        .filter(|b| b.choice == VoteChoice::Reject)
        .find_map(|b| {
            let member = constitution.member(&b.member)?;
            let domain = vote.domains.iter().find(|d| member.holds_veto(d))?;
            Some((b.member.as_str(), domain.as_str()))
        })
}

fn ratify(
    vote: &Vote,
    constitution: &Constitution,
    tally: &VoteTally,
    resolve: impl Fn(VoteStatus, bool, String) -> Resolution,
) -> Resolution {
    let present = vote
        .ballots
        .iter()
        .map(|b| b.pillar)
        .collect::<BTreeSet<_>>()
        .len();
    if present < constitution.min_pillars() {
        return Resolution {
            missing_pillars: missing_pillars(vote, constitution),
            ..resolve(
                VoteStatus::Failed,
                true,
                format!(
                    "threshold met but only {present} of {} required pillars took part",
                    constitution.min_pillars()
                ),
            )
        };
    }

    // Participation quorum is a majority of the eligible seats
    let quorum = VoteThreshold::Majority.required_count(tally.eligible);
    if tally.cast() < quorum {
        return resolve(
            VoteStatus::Failed,
            true,
            format!("threshold met but participation {} is below quorum {quorum}", tally.cast()),
        );
    }
    resolve(VoteStatus::Passed, true, passed_reason(tally))
}

fn passed_reason(tally: &VoteTally) -> String {
    format!("{} of {} required approvals", tally.approve, tally.required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::Ballot;
    use aegis_types::VoteId;

    fn vote(threshold: VoteThreshold, domains: &[&str]) -> (Vote, Constitution) {
        let constitution = Constitution::standard();
        let now = Utc::now();
        let vote = Vote {
            id: VoteId::generate(),
            topic: "t".into(),
            description: String::new(),
            threshold,
            initiated_by: "test".into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            created_at: now,
            deadline: now + chrono::Duration::hours(1),
            status: VoteStatus::Open,
            eligible: constitution.members().iter().map(|m| m.id.clone()).collect(),
            ballots: Vec::new(),
            emergency: false,
            overturn_deadline: None,
            overturns: None,
            open_overturn: None,
            overturned_by: None,
            resolution: None,
        };
        (vote, constitution)
    }

    fn cast(vote: &mut Vote, constitution: &Constitution, member: &str, choice: VoteChoice) {
        vote.ballots.push(Ballot {
            member: member.into(),
            pillar: constitution.pillar_of(member).unwrap(),
            choice,
            reasoning: String::new(),
            cast_at: Utc::now(),
        });
    }

    #[test]
    fn majority_resolves_at_eighth_approval() {
        let (mut v, c) = vote(VoteThreshold::Majority, &[]);
        let seats = ["sentinel", "guardian", "ethicist", "advocate", "engineer", "dispatcher", "analyst"];
        for s in seats {
            cast(&mut v, &c, s, VoteChoice::Approve);
            assert!(evaluate(&v, &c, Utc::now(), false).is_none());
        }
        cast(&mut v, &c, "auditor", VoteChoice::Approve);
        let r = evaluate(&v, &c, Utc::now(), false).unwrap();
        assert_eq!(r.status, VoteStatus::Passed);
        assert!(r.threshold_met);
    }

    #[test]
    fn unreachable_approval_fails_early() {
        let (mut v, c) = vote(VoteThreshold::Supermajority, &[]);
        // 10 required; six rejections leave at most 9 approvals
        for s in ["strategist", "analyst", "researcher", "archivist", "scribe"] {
            cast(&mut v, &c, s, VoteChoice::Reject);
        }
        assert!(evaluate(&v, &c, Utc::now(), false).is_none());
        cast(&mut v, &c, "arbiter", VoteChoice::Abstain);
        let r = evaluate(&v, &c, Utc::now(), false).unwrap();
        assert_eq!(r.status, VoteStatus::Failed);
        assert!(!r.threshold_met);
    }

    #[test]
    fn unanimous_fails_on_first_rejection() {
        let (mut v, c) = vote(VoteThreshold::Unanimous, &[]);
        cast(&mut v, &c, "scribe", VoteChoice::Reject);
        assert_eq!(
            evaluate(&v, &c, Utc::now(), false).unwrap().status,
            VoteStatus::Failed
        );
    }

    #[test]
    fn veto_only_counts_for_tagged_domains() {
        let (mut v, c) = vote(VoteThreshold::Majority, &["budget"]);
        cast(&mut v, &c, "sentinel", VoteChoice::Reject);
        assert!(evaluate(&v, &c, Utc::now(), false).is_none());
        cast(&mut v, &c, "quartermaster", VoteChoice::Reject);
        let r = evaluate(&v, &c, Utc::now(), false).unwrap();
        assert_eq!(r.status, VoteStatus::Vetoed);
        assert_eq!(r.vetoed_by.as_deref(), Some("quartermaster"));
    }

    #[test]
    fn pass_is_held_for_outstanding_veto_holder() {
        let (mut v, c) = vote(VoteThreshold::Majority, &["privacy"]);
        for s in ["sentinel", "guardian", "ethicist", "advocate", "engineer", "dispatcher", "analyst", "auditor"] {
            cast(&mut v, &c, s, VoteChoice::Approve);
        }
        assert_eq!(outstanding_veto_holders(&v, &c), vec!["custodian"]);
        assert!(evaluate(&v, &c, Utc::now(), false).is_none());

        // At the deadline the holder is treated as abstaining
        let r = evaluate(&v, &c, Utc::now(), true).unwrap();
        assert_eq!(r.status, VoteStatus::Passed);
    }

    #[test]
    fn two_pillar_pass_is_downgraded() {
        let (mut v, c) = vote(VoteThreshold::Majority, &[]);
        for s in ["strategist", "analyst", "researcher", "archivist", "scribe", "sentinel", "guardian", "custodian"] {
            cast(&mut v, &c, s, VoteChoice::Approve);
        }
        let r = evaluate(&v, &c, Utc::now(), false).unwrap();
        assert_eq!(r.status, VoteStatus::Failed);
        assert!(r.threshold_met);
        assert_eq!(
            r.missing_pillars,
            vec![Pillar::Ethics, Pillar::Operations, Pillar::Oversight]
        );
    }

    #[test]
    fn deadline_expires_undecided_vote() {
        let (mut v, c) = vote(VoteThreshold::Majority, &[]);
        cast(&mut v, &c, "scribe", VoteChoice::Approve);
        let r = evaluate(&v, &c, Utc::now(), true).unwrap();
        assert_eq!(r.status, VoteStatus::Expired);
    }
}
