use std::sync::Arc;

use aegis_types::{AegisEvent, EventBus, LedgerConfig, SharedClock, SystemClock, TrustLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{AuditCheckpoint, LedgerKey};
use crate::error::LedgerError;
use crate::event::{AuditEvent, GENESIS_HASH};
use crate::store::{FileLedgerStore, LedgerStore, MemoryLedgerStore};

/// Result of walking the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_events: usize,
    /// Index of the first event whose link or content hash fails.
    pub broken_at: Option<usize>,
    pub reason: Option<String>,
}

/// What a checkpoint disagreed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// The stored signature does not match the ledger key.
    Signature,
    /// The chain is shorter than the checkpoint's event count.
    Truncated { chain_len: usize },
    /// The event at the checkpoint's head position has a different hash.
    HeadHash { found: String },
    /// The first event has a different hash.
    GenesisHash { found: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMismatch {
    pub checkpoint_id: Uuid,
    pub event_count: u64,
    pub kind: MismatchKind,
}

/// Result of checking every stored checkpoint against the current chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointVerification {
    pub valid: bool,
    pub checked: usize,
    pub mismatches: Vec<CheckpointMismatch>,
}

/// Filter for querying events.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub action_prefix: Option<String>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_action_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.action_prefix = Some(prefix.into());
        self
    }

    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.time_range = Some((from, to));
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(ref actor) = self.actor {
            if &event.actor != actor {
                return false;
            }
        }
        if let Some(ref prefix) = self.action_prefix {
            if !event.action.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some((from, to)) = self.time_range {
            if event.timestamp < from || event.timestamp > to {
                return false;
            }
        }
        true
    }
}

struct ChainState {
    events: Vec<AuditEvent>,
    checkpoints: Vec<AuditCheckpoint>,
    since_checkpoint: u64,
}

/// Append-only audit ledger.
///
/// All mutation goes through one async mutex, so every appended event links
/// to the true tail and the store is rewritten by one writer at a time.
pub struct AuditLedger {
    state: Mutex<ChainState>,
    store: Arc<dyn LedgerStore>,
    key: LedgerKey,
    checkpoint_interval: u64,
    clock: SharedClock,
    events: Option<EventBus>,
}

impl AuditLedger {
    /// Open a ledger over `store`, reloading any persisted events and checkpoints.
    ///
    /// Loading never verifies or repairs; call [`verify`](Self::verify) and
    /// [`verify_checkpoints`](Self::verify_checkpoints) for that.
    pub async fn open(
        store: Arc<dyn LedgerStore>,
        key: LedgerKey,
        checkpoint_interval: u64,
    ) -> Result<Self, LedgerError> {
        let events = store.load_events().await?;
        let checkpoints = store.load_checkpoints().await?;
        let covered = checkpoints.last().map(|c| c.event_count).unwrap_or(0);
        let since_checkpoint = (events.len() as u64).saturating_sub(covered);

        debug!(
            events = events.len(),
            checkpoints = checkpoints.len(),
            since_checkpoint,
            "audit ledger opened"
        );

        Ok(Self {
            state: Mutex::new(ChainState {
                events,
                checkpoints,
                since_checkpoint,
            }),
            store,
            key,
            checkpoint_interval: checkpoint_interval.max(1),
            clock: SystemClock::shared(),
            events: None,
        })
    }

    /// Open the file-backed ledger described by `config`.
    pub async fn open_dir(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let key = LedgerKey::load_or_generate(&config.key_path()).await?;
        let store = Arc::new(FileLedgerStore::new(&config.data_dir));
        Self::open(store, key, config.checkpoint_interval).await
    }

    /// An empty in-memory ledger with a fresh key.
    pub fn in_memory(checkpoint_interval: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                events: Vec::new(),
                checkpoints: Vec::new(),
                since_checkpoint: 0,
            }),
            store: Arc::new(MemoryLedgerStore::new()),
            key: LedgerKey::generate(),
            checkpoint_interval: checkpoint_interval.max(1),
            clock: SystemClock::shared(),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn checkpoint_interval(&self) -> u64 {
        self.checkpoint_interval
    }

    /// Append an event, persist the chain, and checkpoint when the interval is reached.
    pub async fn append(
        &self,
        action: &str,
        actor: &str,
        trust_level: TrustLevel,
        details: serde_json::Value,
    ) -> Result<AuditEvent, LedgerError> {
        let mut state = self.state.lock().await;

        let previous_hash = state
            .events
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let event = AuditEvent::seal(
            self.clock.now(),
            action,
            actor,
            trust_level,
            details,
            previous_hash,
        );

        state.events.push(event.clone());
        if let Err(e) = self.store.save_events(&state.events).await {
            state.events.pop();
            return Err(e);
        }
        state.since_checkpoint += 1;

        debug!(
            event_id = %event.id,
            action,
            actor,
            index = state.events.len() - 1,
            "audit event appended"
        );

        if state.since_checkpoint >= self.checkpoint_interval {
            // The event is already durable; a failed checkpoint is retried on the next append.
            if let Err(e) = self.checkpoint_locked(&mut state).await {
                warn!(error = %e, "automatic checkpoint failed");
            }
        }

        Ok(event)
    }

    /// Walk the whole chain, checking linkage and content hashes.
    pub async fn verify(&self) -> ChainVerification {
        let state = self.state.lock().await;
        let result = verify_chain(&state.events);
        if !result.valid {
            warn!(
                broken_at = ?result.broken_at,
                reason = ?result.reason,
                "audit chain verification failed"
            );
        }
        result
    }

    /// Sign a snapshot of the current chain state.
    pub async fn checkpoint(&self) -> Result<AuditCheckpoint, LedgerError> {
        let mut state = self.state.lock().await;
        self.checkpoint_locked(&mut state).await
    }

    async fn checkpoint_locked(&self, state: &mut ChainState) -> Result<AuditCheckpoint, LedgerError> {
        let (Some(first), Some(last)) = (state.events.first(), state.events.last()) else {
            return Err(LedgerError::EmptyChain);
        };
        let event_count = state.events.len() as u64;
        let head_hash = last.hash.clone();
        let genesis_event_hash = first.hash.clone();

        let checkpoint = AuditCheckpoint {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            event_count,
            signature: self.key.sign(event_count, &head_hash, &genesis_event_hash),
            head_hash,
            genesis_event_hash,
        };

        state.checkpoints.push(checkpoint.clone());
        if let Err(e) = self.store.save_checkpoints(&state.checkpoints).await {
            state.checkpoints.pop();
            return Err(e);
        }
        state.since_checkpoint = 0;

        info!(
            checkpoint_id = %checkpoint.id,
            event_count,
            "audit checkpoint created"
        );
        if let Some(ref bus) = self.events {
            bus.publish(AegisEvent::CheckpointCreated {
                checkpoint_id: checkpoint.id,
                event_count,
            });
        }

        Ok(checkpoint)
    }

    /// Re-derive every checkpoint and compare it against the current chain.
    pub async fn verify_checkpoints(&self) -> CheckpointVerification {
        let state = self.state.lock().await;
        let mut mismatches = Vec::new();

        for cp in &state.checkpoints {
            let mut report = |kind| {
                mismatches.push(CheckpointMismatch {
                    checkpoint_id: cp.id,
                    event_count: cp.event_count,
                    kind,
                })
            };

            if !self.key.verify(cp) {
                report(MismatchKind::Signature);
            }

            let count = cp.event_count as usize;
            if count == 0 || count > state.events.len() {
                report(MismatchKind::Truncated {
                    chain_len: state.events.len(),
                });
                continue;
            }

            let head = &state.events[count - 1];
            if head.hash != cp.head_hash {
                report(MismatchKind::HeadHash {
                    found: head.hash.clone(),
                });
            }

            let genesis = &state.events[0];
            if genesis.hash != cp.genesis_event_hash {
                report(MismatchKind::GenesisHash {
                    found: genesis.hash.clone(),
                });
            }
        }

        let result = CheckpointVerification {
            valid: mismatches.is_empty(),
            checked: state.checkpoints.len(),
            mismatches,
        };
        if !result.valid {
            warn!(
                mismatches = result.mismatches.len(),
                first = ?result.mismatches.first().map(|m| m.checkpoint_id),
                "audit checkpoint verification failed"
            );
        }
        result
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn head_hash(&self) -> String {
        self.state
            .lock()
            .await
            .events
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.state.lock().await.events.clone()
    }

    pub async fn checkpoints(&self) -> Vec<AuditCheckpoint> {
        self.state.lock().await.checkpoints.clone()
    }

    /// The most recent `n` events, oldest first.
    pub async fn tail(&self, n: usize) -> Vec<AuditEvent> {
        let state = self.state.lock().await;
        let start = state.events.len().saturating_sub(n);
        state.events[start..].to_vec()
    }

    pub async fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }
}

/// Check linkage and content hashes of `events`, stopping at the first failure.
pub fn verify_chain(events: &[AuditEvent]) -> ChainVerification {
    let broken = |index: usize, reason: String| ChainVerification {
        valid: false,
        total_events: events.len(),
        broken_at: Some(index),
        reason: Some(reason),
    };

    for (index, event) in events.iter().enumerate() {
        let expected_previous = if index == 0 {
            GENESIS_HASH
        } else {
            events[index - 1].hash.as_str()
        };
        if event.previous_hash != expected_previous {
            return broken(index, "previous hash does not match prior event".into());
        }
        if !event.verify_integrity() {
            return broken(index, "content hash mismatch".into());
        }
    }

    ChainVerification {
        valid: true,
        total_events: events.len(),
        broken_at: None,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn append_links_to_tail() {
        let ledger = AuditLedger::in_memory(100);
        let a = ledger
            .append("first", "alice", TrustLevel::Operator, json!({}))
            .await
            .unwrap();
        let b = ledger
            .append("second", "bob", TrustLevel::Standard, json!({"k": "v"}))
            .await
            .unwrap();

        assert_eq!(a.previous_hash, GENESIS_HASH);
        assert_eq!(b.previous_hash, a.hash);
        assert_eq!(ledger.head_hash().await, b.hash);
        assert!(ledger.verify().await.valid);
    }

    #[tokio::test]
    async fn automatic_checkpoint_every_interval() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let ledger = AuditLedger::in_memory(3).with_events(bus);

        for i in 0..7 {
            ledger
                .append("tick", "system", TrustLevel::System, json!({ "i": i }))
                .await
                .unwrap();
        }

        let checkpoints = ledger.checkpoints().await;
        assert_eq!(
            checkpoints.iter().map(|c| c.event_count).collect::<Vec<_>>(),
            vec![3, 6]
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            AegisEvent::CheckpointCreated { event_count: 3, .. }
        ));
        assert!(ledger.verify_checkpoints().await.valid);
    }

    #[tokio::test]
    async fn checkpoint_on_empty_chain_fails() {
        let ledger = AuditLedger::in_memory(10);
        assert!(matches!(
            ledger.checkpoint().await,
            Err(LedgerError::EmptyChain)
        ));
    }

    #[tokio::test]
    async fn reopen_restores_counter() {
        let store = Arc::new(MemoryLedgerStore::new());
        let key = LedgerKey::generate();
        {
            let ledger = AuditLedger::open(store.clone(), key.clone(), 4).await.unwrap();
            for _ in 0..6 {
                ledger
                    .append("tick", "system", TrustLevel::System, json!(null))
                    .await
                    .unwrap();
            }
        }

        let ledger = AuditLedger::open(store, key, 4).await.unwrap();
        assert_eq!(ledger.len().await, 6);
        ledger
            .append("tick", "system", TrustLevel::System, json!(null))
            .await
            .unwrap();
        ledger
            .append("tick", "system", TrustLevel::System, json!(null))
            .await
            .unwrap();
        let counts: Vec<u64> = ledger.checkpoints().await.iter().map(|c| c.event_count).collect();
        assert_eq!(counts, vec![4, 8]);
    }

    #[tokio::test]
    async fn query_and_tail() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let ledger = AuditLedger::in_memory(100).with_clock(clock.clone());

        ledger
            .append("tool.executed", "alice", TrustLevel::Verified, json!({}))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(5));
        ledger
            .append("tool.denied", "bob", TrustLevel::Untrusted, json!({}))
            .await
            .unwrap();
        ledger
            .append("council.vote_resolved", "council", TrustLevel::System, json!({}))
            .await
            .unwrap();

        let tool = ledger
            .query(&AuditFilter::new().with_action_prefix("tool."))
            .await;
        assert_eq!(tool.len(), 2);

        let bob = ledger.query(&AuditFilter::new().with_actor("bob")).await;
        assert_eq!(bob.len(), 1);

        let early = ledger
            .query(&AuditFilter::new().with_time_range(start, start + chrono::Duration::minutes(1)))
            .await;
        assert_eq!(early.len(), 1);

        let tail = ledger.tail(2).await;
        assert_eq!(tail[0].action, "tool.denied");
        assert_eq!(ledger.tail(10).await.len(), 3);
    }

    #[test]
    fn broken_link_is_reported_at_index() {
        let first = AuditEvent::seal(Utc::now(), "a", "x", TrustLevel::System, json!(1), GENESIS_HASH);
        let second = AuditEvent::seal(Utc::now(), "b", "x", TrustLevel::System, json!(2), GENESIS_HASH);
        let result = verify_chain(&[first, second]);
        assert!(!result.valid);
        assert_eq!(result.broken_at, Some(1));
    }
}
