use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aegis_ledger::AuditSink;
use aegis_types::{
    AegisEvent, Constitution, CouncilConfig, EventBus, SharedClock, SystemClock, TrustLevel,
    VoteChoice, VoteId, VoteStatus, VoteThreshold,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::credibility::{CredibilityRecord, CredibilityTracker, FeedbackRequest};
use crate::dissent::{DissentReport, PrecedentMatcher, WordOverlapMatcher};
use crate::emergency::select_panel;
use crate::error::CouncilError;
use crate::tally::evaluate;
use crate::vote::{Ballot, Resolution, Vote, VoteRequest, EMERGENCY_MARKER};

/// Actor recorded for entries the council writes on its own behalf.
const COUNCIL_ACTOR: &str = "council";

struct VoteEntry {
    vote: Vote,
    status: watch::Sender<VoteStatus>,
}

type SharedEntry = Arc<AsyncMutex<VoteEntry>>;

/// The 15-seat council.
///
/// Each vote is guarded by its own async mutex, so ballots on one vote are
/// evaluated strictly in order while different votes proceed independently.
pub struct CouncilGovernance {
    constitution: Arc<Constitution>,
    config: CouncilConfig,
    votes: RwLock<HashMap<VoteId, SharedEntry>>,
    reports: RwLock<Vec<DissentReport>>,
    matcher: Arc<dyn PrecedentMatcher>,
    credibility: Mutex<CredibilityTracker>,
    audit: Arc<dyn AuditSink>,
    events: EventBus,
    clock: SharedClock,
}

impl CouncilGovernance {
    pub fn new(constitution: Constitution, audit: Arc<dyn AuditSink>, config: CouncilConfig) -> Self {
        let constitution = constitution.with_min_pillars(config.min_pillars);
        Self {
            constitution: Arc::new(constitution),
            matcher: Arc::new(WordOverlapMatcher::new(config.precedent_overlap)),
            config,
            votes: RwLock::new(HashMap::new()),
            reports: RwLock::new(Vec::new()),
            credibility: Mutex::new(CredibilityTracker::new()),
            audit,
            events: EventBus::default(),
            clock: SystemClock::shared(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn PrecedentMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn constitution(&self) -> &Arc<Constitution> {
        &self.constitution
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Vote lifecycle
    // ========================================================================

    /// Open a full-council vote.
    pub async fn create_vote(&self, request: VoteRequest) -> Result<Vote, CouncilError> {
        let eligible = self
            .constitution
            .members()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        self.open(request, eligible, false, None).await
    }

    /// Open an emergency decision before a small panel.
    ///
    /// The panel votes by MAJORITY whatever threshold was requested, and the
    /// resolved decision stays open to overturn for the configured window.
    pub async fn create_emergency_vote(
        &self,
        mut request: VoteRequest,
        panel_size: Option<usize>,
    ) -> Result<Vote, CouncilError> {
        let size = panel_size.unwrap_or(self.config.emergency_panel_size);
        let panel = select_panel(&self.constitution, &request.domains, size);
        if !request.topic.starts_with(EMERGENCY_MARKER) {
            request.topic = format!("{EMERGENCY_MARKER} {}", request.topic);
        }
        request.threshold = VoteThreshold::Majority;
        self.open(request, panel, true, None).await
    }

    async fn open(
        &self,
        request: VoteRequest,
        eligible: Vec<String>,
        emergency: bool,
        overturns: Option<VoteId>,
    ) -> Result<Vote, CouncilError> {
        if request.topic.trim().is_empty() {
            return Err(CouncilError::InvalidRequest("topic is empty".into()));
        }
        let minutes = request
            .deadline_minutes
            .unwrap_or(self.config.default_deadline_minutes);
        if minutes <= 0 {
            return Err(CouncilError::InvalidRequest(format!(
                "deadline must be positive, got {minutes} minutes"
            )));
        }

        let now = self.clock.now();
        let deadline = chrono::Duration::try_minutes(minutes)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                CouncilError::InvalidRequest(format!("deadline of {minutes} minutes is out of range"))
            })?;
        let vote = Vote {
            id: VoteId::generate(),
            topic: request.topic,
            description: request.description,
            threshold: request.threshold,
            initiated_by: request.initiated_by,
            domains: request.domains,
            created_at: now,
            deadline,
            status: VoteStatus::Open,
            eligible,
            ballots: Vec::new(),
            emergency,
            overturn_deadline: None,
            overturns,
            open_overturn: None,
            overturned_by: None,
            resolution: None,
        };

        self.audit
            .record(
                "council.vote_created",
                &vote.initiated_by,
                TrustLevel::Verified,
                json!({
                    "vote_id": vote.id,
                    "topic": vote.topic,
                    "threshold": vote.threshold,
                    "domains": vote.domains,
                    "eligible": vote.eligible,
                    "emergency": vote.emergency,
                    "overturns": vote.overturns,
                    "deadline": vote.deadline,
                }),
            )
            .await?;

        info!(
            vote_id = %vote.id,
            topic = %vote.topic,
            threshold = %vote.threshold,
            seats = vote.eligible.len(),
            emergency,
            "vote opened"
        );
        self.events.publish(AegisEvent::VoteCreated {
            vote_id: vote.id,
            topic: vote.topic.clone(),
            threshold: vote.threshold,
            emergency,
        });

        let (status, _) = watch::channel(VoteStatus::Open);
        let entry = VoteEntry {
            vote: vote.clone(),
            status,
        };
        self.votes
            .write()
            .insert(vote.id, Arc::new(AsyncMutex::new(entry)));
        Ok(vote)
    }

    /// Cast a ballot. Returns `false` when the ballot was not accepted.
    pub async fn cast_vote(
        &self,
        vote_id: VoteId,
        member: &str,
        choice: VoteChoice,
        reasoning: &str,
    ) -> bool {
        match self.cast_vote_detailed(vote_id, member, choice, reasoning).await {
            Ok(_) => true,
            Err(e) => {
                debug!(vote_id = %vote_id, member, error = %e, "ballot refused");
                false
            }
        }
    }

    /// Cast a ballot and return the vote's status afterwards, or why the
    /// ballot was refused. Refusals are written to the audit log.
    pub async fn cast_vote_detailed(
        &self,
        vote_id: VoteId,
        member: &str,
        choice: VoteChoice,
        reasoning: &str,
    ) -> Result<VoteStatus, CouncilError> {
        let result = self.admit_ballot(vote_id, member, choice, reasoning).await;
        if let Err(e) = &result {
            self.record(
                "council.ballot_refused",
                member,
                json!({ "vote_id": vote_id, "choice": choice, "reason": e.to_string() }),
            )
            .await;
        }
        result
    }

    async fn admit_ballot(
        &self,
        vote_id: VoteId,
        member: &str,
        choice: VoteChoice,
        reasoning: &str,
    ) -> Result<VoteStatus, CouncilError> {
        let entry = self.entry(vote_id)?;
        let mut entry = entry.lock().await;
        let now = self.clock.now();

        if entry.vote.is_open() && now >= entry.vote.deadline {
            self.settle(&mut entry, true).await;
        }
        if !entry.vote.is_open() {
            return Err(CouncilError::VoteClosed {
                vote_id,
                status: entry.vote.status,
            });
        }
        let pillar = match self.constitution.pillar_of(member) {
            Some(pillar) if entry.vote.is_eligible(member) => pillar,
            _ => {
                warn!(vote_id = %vote_id, member, "ballot from ineligible member");
                return Err(CouncilError::NotEligible {
                    vote_id,
                    member: member.to_string(),
                });
            }
        };
        if entry.vote.has_voted(member) {
            return Err(CouncilError::AlreadyVoted {
                vote_id,
                member: member.to_string(),
            });
        }

        entry.vote.ballots.push(Ballot {
            member: member.to_string(),
            pillar,
            choice,
            reasoning: reasoning.to_string(),
            cast_at: now,
        });
        debug!(vote_id = %vote_id, member, choice = %choice, "ballot cast");
        self.events.publish(AegisEvent::VoteCast {
            vote_id,
            member: member.to_string(),
            choice,
        });
        self.record(
            "council.vote_cast",
            member,
            json!({
                "vote_id": vote_id,
                "choice": choice,
                "reasoning": reasoning,
            }),
        )
        .await;

        self.settle(&mut entry, false).await;
        Ok(entry.vote.status)
    }

    pub async fn get_vote(&self, vote_id: VoteId) -> Option<Vote> {
        let entry = self.entry(vote_id).ok()?;
        let entry = entry.lock().await;
        Some(entry.vote.clone())
    }

    /// All votes, oldest first.
    pub async fn votes(&self) -> Vec<Vote> {
        let entries: Vec<SharedEntry> = self.votes.read().values().cloned().collect();
        let mut all = Vec::with_capacity(entries.len());
        for entry in entries {
            all.push(entry.lock().await.vote.clone());
        }
        all.sort_by_key(|v| v.created_at);
        all
    }

    pub fn get_dissent_report(&self, vote_id: VoteId) -> Option<DissentReport> {
        self.reports
            .read()
            .iter()
            .find(|r| r.vote_id == vote_id)
            .cloned()
    }

    pub fn dissent_reports(&self) -> Vec<DissentReport> {
        self.reports.read().clone()
    }

    /// Suspend until the vote leaves OPEN, then return it.
    pub async fn wait_for_resolution(&self, vote_id: VoteId) -> Result<Vote, CouncilError> {
        let entry = self.entry(vote_id)?;
        let mut rx = entry.lock().await.status.subscribe();
        let settled = rx.wait_for(|s| s.is_terminal()).await.map(|_| ());
        if settled.is_err() {
            return Err(CouncilError::VoteNotFound(vote_id));
        }
        let vote = entry.lock().await.vote.clone();
        Ok(vote)
    }

    // ========================================================================
    // Deadlines
    // ========================================================================

    /// Resolve every open vote whose deadline has passed.
    pub async fn expire_due(&self) -> Vec<VoteId> {
        let entries: Vec<SharedEntry> = self.votes.read().values().cloned().collect();
        let mut settled = Vec::new();
        for entry in entries {
            let mut entry = entry.lock().await;
            if entry.vote.is_open() && self.clock.now() >= entry.vote.deadline {
                self.settle(&mut entry, true).await;
                settled.push(entry.vote.id);
            }
        }
        settled
    }

    /// Sweep deadlines every `period` until the returned handle is aborted.
    pub fn spawn_deadline_watcher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let council = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let settled = council.expire_due().await;
                if !settled.is_empty() {
                    debug!(count = settled.len(), "deadline sweep settled votes");
                }
            }
        })
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    async fn settle(&self, entry: &mut VoteEntry, at_deadline: bool) {
        let now = self.clock.now();
        if let Some(resolution) = evaluate(&entry.vote, &self.constitution, now, at_deadline) {
            self.conclude(entry, resolution).await;
        }
    }

    async fn conclude(&self, entry: &mut VoteEntry, resolution: Resolution) {
        let vote_id = entry.vote.id;
        let status = resolution.status;
        entry.vote.status = status;
        if entry.vote.emergency && matches!(status, VoteStatus::Passed | VoteStatus::Failed) {
            entry.vote.overturn_deadline = Some(
                resolution.resolved_at + chrono::Duration::hours(self.config.overturn_window_hours),
            );
        }
        entry.vote.resolution = Some(resolution.clone());

        info!(
            vote_id = %vote_id,
            status = %status,
            approve = resolution.tally.approve,
            reject = resolution.tally.reject,
            abstain = resolution.tally.abstain,
            reason = %resolution.reason,
            "vote resolved"
        );

        if let Some(member) = &resolution.vetoed_by {
            let domain = self
                .constitution
                .member(member)
                .and_then(|m| entry.vote.domains.iter().find(|d| m.holds_veto(d)))
                .cloned()
                .unwrap_or_default();
            warn!(vote_id = %vote_id, member = %member, domain = %domain, "veto exercised");
            self.events.publish(AegisEvent::VetoExercised {
                vote_id,
                member: member.clone(),
                domain: domain.clone(),
            });
            self.record(
                "council.veto",
                member,
                json!({ "vote_id": vote_id, "domain": domain }),
            )
            .await;
        }

        if !resolution.missing_pillars.is_empty() {
            warn!(
                vote_id = %vote_id,
                missing = ?resolution.missing_pillars,
                "pillar quorum not met, pass downgraded"
            );
            self.events.publish(AegisEvent::PillarQuorumFailed {
                vote_id,
                missing_pillars: resolution.missing_pillars.clone(),
            });
            self.record(
                "council.pillar_quorum_failed",
                COUNCIL_ACTOR,
                json!({ "vote_id": vote_id, "missing_pillars": resolution.missing_pillars }),
            )
            .await;
        }

        self.events.publish(AegisEvent::VoteResolved { vote_id, status });
        self.record(
            "council.vote_resolved",
            COUNCIL_ACTOR,
            json!({
                "vote_id": vote_id,
                "status": status,
                "threshold_met": resolution.threshold_met,
                "tally": resolution.tally,
                "consensus_strength": resolution.consensus_strength,
                "reason": resolution.reason,
            }),
        )
        .await;

        self.file_dissent(&entry.vote).await;

        if matches!(
            status,
            VoteStatus::Passed | VoteStatus::Failed | VoteStatus::Vetoed
        ) {
            let request = self.credibility.lock().open_request(&entry.vote, self.clock.now());
            debug!(vote_id = %vote_id, significance = ?request.significance, "feedback requested");
        }

        entry.status.send_replace(status);

        if let Some(original) = entry.vote.overturns {
            self.apply_overturn(original, vote_id, status).await;
        }
    }

    async fn file_dissent(&self, vote: &Vote) {
        let Some(mut report) = DissentReport::for_vote(vote, self.config.dissent_threshold) else {
            return;
        };
        {
            let mut reports = self.reports.write();
            report.precedents = self.matcher.find(&report.topic, &reports);
            reports.push(report.clone());
        }

        info!(
            vote_id = %vote.id,
            consensus_strength = report.consensus_strength,
            dissenters = report.dissenters.len(),
            precedents = report.precedents.len(),
            "dissent recorded"
        );
        self.events.publish(AegisEvent::DissentRecorded {
            vote_id: vote.id,
            consensus_strength: report.consensus_strength,
            dissenters: report.dissenters.len(),
        });
        let details = serde_json::to_value(&report).unwrap_or_else(|_| json!({ "vote_id": vote.id }));
        self.record("council.dissent_recorded", COUNCIL_ACTOR, details)
            .await;
    }

    // ========================================================================
    // Emergency overturn
    // ========================================================================

    /// Ask the full council to overturn an emergency decision.
    ///
    /// Opens a SUPERMAJORITY vote of all seats. Refused once the overturn
    /// window has closed or while another overturn vote is open. Refusals are
    /// written to the audit log.
    pub async fn request_overturn(
        &self,
        vote_id: VoteId,
        requested_by: &str,
        reason: &str,
    ) -> Result<Vote, CouncilError> {
        let result = self.start_overturn(vote_id, requested_by, reason).await;
        if let Err(e) = &result {
            self.record(
                "council.overturn_refused",
                requested_by,
                json!({ "vote_id": vote_id, "reason": e.to_string() }),
            )
            .await;
        }
        result
    }

    async fn start_overturn(
        &self,
        vote_id: VoteId,
        requested_by: &str,
        reason: &str,
    ) -> Result<Vote, CouncilError> {
        if !self.constitution.is_member(requested_by) {
            return Err(CouncilError::NotEligible {
                vote_id,
                member: requested_by.to_string(),
            });
        }

        let entry = self.entry(vote_id)?;
        let mut original = entry.lock().await;
        if !original.vote.emergency {
            return Err(CouncilError::NotEmergency(vote_id));
        }
        let deadline = match (original.vote.status, original.vote.overturn_deadline) {
            (VoteStatus::Passed | VoteStatus::Failed, Some(deadline)) => deadline,
            (status, _) => return Err(CouncilError::NotOverturnable { vote_id, status }),
        };
        if self.clock.now() > deadline {
            warn!(vote_id = %vote_id, requested_by, deadline = %deadline, "overturn requested after window");
            return Err(CouncilError::WindowClosed { vote_id, deadline });
        }
        if let Some(overturn_vote_id) = original.vote.open_overturn {
            return Err(CouncilError::OverturnPending {
                vote_id,
                overturn_vote_id,
            });
        }

        let topic = original
            .vote
            .topic
            .trim_start_matches(EMERGENCY_MARKER)
            .trim_start()
            .to_string();
        let request = VoteRequest::new(format!("Overturn: {topic}"), VoteThreshold::Supermajority, requested_by)
            .with_description(reason);
        let eligible = self
            .constitution
            .members()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let overturn = self.open(request, eligible, false, Some(vote_id)).await?;
        original.vote.open_overturn = Some(overturn.id);

        info!(vote_id = %vote_id, overturn_vote_id = %overturn.id, requested_by, "overturn requested");
        self.events.publish(AegisEvent::OverturnRequested {
            original_vote_id: vote_id,
            overturn_vote_id: overturn.id,
            requested_by: requested_by.to_string(),
        });
        self.record(
            "council.overturn_requested",
            requested_by,
            json!({ "vote_id": vote_id, "overturn_vote_id": overturn.id, "reason": reason }),
        )
        .await;
        Ok(overturn)
    }

    async fn apply_overturn(&self, original_id: VoteId, overturn_id: VoteId, status: VoteStatus) {
        let Ok(entry) = self.entry(original_id) else {
            error!(vote_id = %original_id, "overturn target missing");
            return;
        };
        let mut original = entry.lock().await;
        if original.vote.open_overturn == Some(overturn_id) {
            original.vote.open_overturn = None;
        }
        if status != VoteStatus::Passed {
            debug!(vote_id = %original_id, overturn_vote_id = %overturn_id, status = %status, "overturn not carried");
            return;
        }

        original.vote.status = VoteStatus::Overturned;
        original.vote.overturned_by = Some(overturn_id);
        original.status.send_replace(VoteStatus::Overturned);

        info!(vote_id = %original_id, overturn_vote_id = %overturn_id, "emergency decision overturned");
        self.events.publish(AegisEvent::DecisionOverturned {
            vote_id: original_id,
            overturn_vote_id: overturn_id,
        });
        self.record(
            "council.decision_overturned",
            COUNCIL_ACTOR,
            json!({ "vote_id": original_id, "overturn_vote_id": overturn_id }),
        )
        .await;
    }

    // ========================================================================
    // Credibility feedback
    // ========================================================================

    /// Rate the real-world outcome of a decision and update member streaks.
    pub async fn submit_outcome(
        &self,
        vote_id: VoteId,
        rating: f64,
        observer: &str,
    ) -> Result<FeedbackRequest, CouncilError> {
        let ballots = {
            let entry = self.entry(vote_id)?;
            let entry = entry.lock().await;
            entry.vote.ballots.clone()
        };
        let resolved = self
            .credibility
            .lock()
            .submit(vote_id, rating, &ballots, self.clock.now())
            .ok_or(CouncilError::NoPendingFeedback(vote_id))?;

        info!(vote_id = %vote_id, rating = ?resolved.rating, observer, "outcome recorded");
        self.record(
            "council.outcome_recorded",
            observer,
            json!({ "vote_id": vote_id, "rating": resolved.rating }),
        )
        .await;
        Ok(resolved)
    }

    pub fn pending_feedback(&self) -> Vec<FeedbackRequest> {
        self.credibility.lock().pending()
    }

    pub fn resolved_feedback(&self) -> Vec<FeedbackRequest> {
        self.credibility.lock().resolved().to_vec()
    }

    pub fn credibility(&self, member: &str) -> Option<CredibilityRecord> {
        self.credibility.lock().record(member).cloned()
    }

    pub fn credibility_records(&self) -> Vec<CredibilityRecord> {
        self.credibility.lock().records()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn entry(&self, vote_id: VoteId) -> Result<SharedEntry, CouncilError> {
        self.votes
            .read()
            .get(&vote_id)
            .cloned()
            .ok_or(CouncilError::VoteNotFound(vote_id))
    }

    async fn record(&self, action: &str, actor: &str, details: serde_json::Value) {
        if let Err(e) = self
            .audit
            .record(action, actor, TrustLevel::Verified, details)
            .await
        {
            error!(action, actor, error = %e, "failed to write audit record");
        }
    }
}

impl std::fmt::Debug for CouncilGovernance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouncilGovernance")
            .field("seats", &self.constitution.seat_count())
            .field("votes", &self.votes.read().len())
            .finish_non_exhaustive()
    }
}

