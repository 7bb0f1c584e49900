use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::LedgerError;

/// Signed snapshot of chain state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCheckpoint {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Number of events covered; the head is event `event_count - 1`.
    pub event_count: u64,
    pub head_hash: String,
    pub genesis_event_hash: String,
    /// Hex keyed BLAKE3 over `(event_count, head_hash, genesis_event_hash)`.
    pub signature: String,
}

/// Ledger-private checkpoint signing key.
#[derive(Clone)]
pub struct LedgerKey([u8; 32]);

impl LedgerKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(raw: &str) -> Result<Self, LedgerError> {
        let decoded = hex::decode(raw.trim()).map_err(|e| LedgerError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| LedgerError::InvalidKey("expected 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Read the key at `path`, or generate one and write it there.
    pub async fn load_or_generate(path: &Path) -> Result<Self, LedgerError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_hex(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = Self::generate();
                key.save(path).await?;
                info!(path = %path.display(), "generated new ledger signing key");
                Ok(key)
            }
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    /// Read the key at `path`. A missing file is an error.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LedgerError::io(path, e))?;
        Self::from_hex(&raw)
    }

    pub async fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::io(parent, e))?;
        }
        tokio::fs::write(path, self.to_hex())
            .await
            .map_err(|e| LedgerError::io(path, e))
    }

    pub(crate) fn mac(&self, event_count: u64, head_hash: &str, genesis_hash: &str) -> blake3::Hash {
        let mut message = Vec::with_capacity(32 + head_hash.len() + genesis_hash.len());
        message.extend_from_slice(b"aegis-audit-checkpoint-v1:");
        message.extend_from_slice(&event_count.to_le_bytes());
        message.extend_from_slice(&(head_hash.len() as u64).to_le_bytes());
        message.extend_from_slice(head_hash.as_bytes());
        message.extend_from_slice(&(genesis_hash.len() as u64).to_le_bytes());
        message.extend_from_slice(genesis_hash.as_bytes());
        blake3::keyed_hash(&self.0, &message)
    }

    pub(crate) fn sign(&self, event_count: u64, head_hash: &str, genesis_hash: &str) -> String {
        self.mac(event_count, head_hash, genesis_hash)
            .to_hex()
            .to_string()
    }

    /// Constant-time check of a checkpoint's signature.
    pub(crate) fn verify(&self, checkpoint: &AuditCheckpoint) -> bool {
        let Ok(claimed) = blake3::Hash::from_hex(&checkpoint.signature) else {
            return false;
        };
        claimed
            == self.mac(
                checkpoint.event_count,
                &checkpoint.head_hash,
                &checkpoint.genesis_event_hash,
            )
    }
}

impl fmt::Debug for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LedgerKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(key: &LedgerKey) -> AuditCheckpoint {
        let head = "ab".repeat(32);
        let genesis = "cd".repeat(32);
        AuditCheckpoint {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_count: 7,
            signature: key.sign(7, &head, &genesis),
            head_hash: head,
            genesis_event_hash: genesis,
        }
    }

    #[test]
    fn signature_verifies_under_same_key_only() {
        let key = LedgerKey::generate();
        let cp = checkpoint(&key);
        assert!(key.verify(&cp));
        assert!(!LedgerKey::generate().verify(&cp));
    }

    #[test]
    fn signature_covers_count() {
        let key = LedgerKey::generate();
        let mut cp = checkpoint(&key);
        cp.event_count = 8;
        assert!(!key.verify(&cp));
        cp.event_count = 7;
        cp.signature = "not-hex".into();
        assert!(!key.verify(&cp));
    }

    #[test]
    fn hex_round_trip() {
        let key = LedgerKey::generate();
        let back = LedgerKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(back.to_hex(), key.to_hex());
        assert!(LedgerKey::from_hex("abcd").is_err());
        assert_eq!(format!("{key:?}"), "LedgerKey(<redacted>)");
    }

    #[tokio::test]
    async fn load_or_generate_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/ledger.key");
        let first = LedgerKey::load_or_generate(&path).await.unwrap();
        let second = LedgerKey::load_or_generate(&path).await.unwrap();
        assert_eq!(first.to_hex(), second.to_hex());
    }
}
