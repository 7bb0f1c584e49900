use aegis_types::TrustLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `previous_hash` of the first event in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One immutable fact in the audit chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub trust_level: TrustLevel,
    pub details: serde_json::Value,
    /// Hex BLAKE3 over every field above plus `previous_hash`.
    pub hash: String,
    pub previous_hash: String,
}

impl AuditEvent {
    /// Build an event linked to `previous_hash` and seal it with its content hash.
    pub fn seal(
        timestamp: DateTime<Utc>,
        action: impl Into<String>,
        actor: impl Into<String>,
        trust_level: TrustLevel,
        details: serde_json::Value,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut event = Self {
            id: Uuid::new_v4(),
            timestamp,
            action: action.into(),
            actor: actor.into(),
            trust_level,
            details,
            hash: String::new(),
            previous_hash: previous_hash.into(),
        };
        event.hash = event.compute_hash();
        event
    }

    /// Recompute the content hash and compare it with the stored one.
    pub fn verify_integrity(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn compute_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"aegis-audit-event-v1:");

        update_field(&mut hasher, self.id.as_bytes());

        // Timestamp as seconds + nanos so the hash survives a JSON round trip
        hasher.update(&self.timestamp.timestamp().to_le_bytes());
        hasher.update(&self.timestamp.timestamp_subsec_nanos().to_le_bytes());

        update_field(&mut hasher, self.action.as_bytes());
        update_field(&mut hasher, self.actor.as_bytes());
        update_field(&mut hasher, self.trust_level.as_str().as_bytes());

        // serde_json maps are key-sorted, so this encoding is canonical
        let details = serde_json::to_vec(&self.details).unwrap_or_default();
        update_field(&mut hasher, &details);

        update_field(&mut hasher, self.previous_hash.as_bytes());

        hasher.finalize().to_hex().to_string()
    }
}

fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AuditEvent {
        AuditEvent::seal(
            Utc::now(),
            "tool.executed",
            "alice",
            TrustLevel::Verified,
            json!({"tool": "fs.read", "risk": 0.23, "ok": true}),
            GENESIS_HASH,
        )
    }

    #[test]
    fn sealed_event_verifies() {
        let event = sample();
        assert_eq!(event.hash.len(), 64);
        assert!(event.verify_integrity());
    }

    #[test]
    fn any_field_change_breaks_integrity() {
        let mut event = sample();
        event.details = json!({"tool": "fs.delete"});
        assert!(!event.verify_integrity());

        let mut event = sample();
        event.trust_level = TrustLevel::System;
        assert!(!event.verify_integrity());

        let mut event = sample();
        event.previous_hash = "ff".repeat(32);
        assert!(!event.verify_integrity());
    }

    #[test]
    fn hash_survives_json_round_trip() {
        let event = sample();
        let raw = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&raw).unwrap();
        assert!(back.verify_integrity());
        assert_eq!(back, event);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let ts = Utc::now();
        let mut a = AuditEvent::seal(ts, "ab", "c", TrustLevel::Standard, json!(null), GENESIS_HASH);
        let mut b = AuditEvent::seal(ts, "a", "bc", TrustLevel::Standard, json!(null), GENESIS_HASH);
        b.id = a.id;
        a.hash = a.compute_hash();
        b.hash = b.compute_hash();
        assert_ne!(a.hash, b.hash);
    }
}
