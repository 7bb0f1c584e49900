use aegis_types::TrustLevel;
use async_trait::async_trait;

use crate::error::LedgerError;
use crate::event::AuditEvent;
use crate::ledger::{AuditLedger, ChainVerification};

/// The audit surface consumed by the gateway and the council.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one fact.
    async fn record(
        &self,
        action: &str,
        actor: &str,
        trust_level: TrustLevel,
        details: serde_json::Value,
    ) -> Result<AuditEvent, LedgerError>;

    /// Verify the recorded chain.
    async fn verify(&self) -> ChainVerification;
}

#[async_trait]
impl AuditSink for AuditLedger {
    async fn record(
        &self,
        action: &str,
        actor: &str,
        trust_level: TrustLevel,
        details: serde_json::Value,
    ) -> Result<AuditEvent, LedgerError> {
        self.append(action, actor, trust_level, details).await
    }

    async fn verify(&self) -> ChainVerification {
        AuditLedger::verify(self).await
    }
}
