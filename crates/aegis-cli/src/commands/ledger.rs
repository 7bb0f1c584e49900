//! Audit ledger commands

use std::sync::Arc;

use aegis_ledger::{AuditLedger, FileLedgerStore, LedgerError, LedgerKey, MismatchKind};
use aegis_types::LedgerConfig;
use anyhow::{bail, Context};
use tracing::{info, warn};

/// Open the ledger under `config` with an existing signing key.
async fn open(config: &LedgerConfig) -> anyhow::Result<AuditLedger> {
    let key_path = config.key_path();
    let key = LedgerKey::load(&key_path).await.with_context(|| {
        format!(
            "signing key not readable at {} (run `aegisctl keygen` first)",
            key_path.display()
        )
    })?;
    let store = Arc::new(FileLedgerStore::new(&config.data_dir));
    Ok(AuditLedger::open(store, key, config.checkpoint_interval).await?)
}

/// Verify the chain and all checkpoints. Returns whether both are intact.
pub async fn verify(config: &LedgerConfig) -> anyhow::Result<bool> {
    let ledger = open(config).await?;
    let chain = ledger.verify().await;
    let checkpoints = ledger.verify_checkpoints().await;

    if chain.valid {
        println!("chain:       ok ({} events)", chain.total_events);
    } else {
        println!(
            "chain:       BROKEN at index {} of {} ({})",
            chain.broken_at.unwrap_or_default(),
            chain.total_events,
            chain.reason.as_deref().unwrap_or("unknown")
        );
    }

    if checkpoints.valid {
        println!("checkpoints: ok ({} checked)", checkpoints.checked);
    } else {
        println!(
            "checkpoints: {} of {} FAILED",
            checkpoints.mismatches.len(),
            checkpoints.checked
        );
        for m in &checkpoints.mismatches {
            let detail = match &m.kind {
                MismatchKind::Signature => "signature does not match".to_string(),
                MismatchKind::Truncated { chain_len } => {
                    format!("covers {} events but chain has {chain_len}", m.event_count)
                }
                MismatchKind::HeadHash { found } => format!("head hash differs (chain has {found})"),
                MismatchKind::GenesisHash { found } => {
                    format!("genesis hash differs (chain has {found})")
                }
            };
            println!("  {} @ {}: {detail}", m.checkpoint_id, m.event_count);
        }
    }

    let intact = chain.valid && checkpoints.valid;
    if intact {
        info!(events = chain.total_events, "ledger verified");
    } else {
        warn!(
            broken_at = ?chain.broken_at,
            checkpoint_mismatches = checkpoints.mismatches.len(),
            "ledger integrity failure"
        );
    }
    Ok(intact)
}

pub async fn checkpoint(config: &LedgerConfig) -> anyhow::Result<()> {
    let ledger = open(config).await?;
    match ledger.checkpoint().await {
        Ok(cp) => {
            println!("checkpoint {} over {} events", cp.id, cp.event_count);
            println!("head {}", cp.head_hash);
            Ok(())
        }
        Err(LedgerError::EmptyChain) => bail!("ledger is empty, nothing to checkpoint"),
        Err(e) => Err(e.into()),
    }
}

pub async fn tail(config: &LedgerConfig, n: usize, raw: bool) -> anyhow::Result<()> {
    let ledger = open(config).await?;
    for event in ledger.tail(n).await {
        if raw {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!(
                "{}  {:<28} {:<16} {:<10} {}",
                event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                event.action,
                event.actor,
                event.trust_level,
                &event.hash[..12]
            );
        }
    }
    Ok(())
}

pub async fn keygen(config: &LedgerConfig, force: bool) -> anyhow::Result<()> {
    let path = config.key_path();
    if path.exists() && !force {
        bail!(
            "a signing key already exists at {} (use --force to replace it)",
            path.display()
        );
    }
    LedgerKey::generate().save(&path).await?;
    println!("wrote signing key to {}", path.display());
    if force {
        println!("existing checkpoints were signed with the previous key and will fail verification");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::TrustLevel;
    use serde_json::json;

    fn config(dir: &std::path::Path) -> LedgerConfig {
        LedgerConfig {
            data_dir: dir.to_path_buf(),
            checkpoint_interval: 2,
            key_file: None,
        }
    }

    #[tokio::test]
    async fn verify_requires_a_key() {
        let dir = tempfile::tempdir().unwrap();
        assert!(verify(&config(dir.path())).await.is_err());
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        keygen(&config, false).await.unwrap();
        assert!(keygen(&config, false).await.is_err());

        let ledger = AuditLedger::open_dir(&config).await.unwrap();
        for i in 0..4 {
            ledger
                .append("tool.executed", "agent", TrustLevel::Standard, json!({ "n": i }))
                .await
                .unwrap();
        }
        drop(ledger);
        assert!(verify(&config).await.unwrap());

        let path = dir.path().join("events.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"n\": 2", "\"n\": 9").replace("\"n\":2", "\"n\":9")).unwrap();
        assert!(!verify(&config).await.unwrap());
    }

    #[tokio::test]
    async fn checkpoint_on_empty_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        keygen(&config, false).await.unwrap();
        assert!(checkpoint(&config).await.is_err());
    }
}
