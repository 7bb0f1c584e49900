//! Aegis Audit Ledger: append-only, hash-chained record of every
//! authorization and governance outcome.
//!
//! Each [`AuditEvent`] commits to its predecessor's hash, so editing any
//! stored event breaks the chain at that index. Chain linkage alone cannot
//! detect wholesale replacement with a different but internally consistent
//! history; for that the ledger takes keyed-MAC [`AuditCheckpoint`]s every
//! N events and [`AuditLedger::verify_checkpoints`] re-derives them against
//! the current chain.
//!
//! Mismatches are reported, never repaired.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod ledger;
pub mod sink;
pub mod store;

pub use checkpoint::{AuditCheckpoint, LedgerKey};
pub use error::LedgerError;
pub use event::{AuditEvent, GENESIS_HASH};
pub use ledger::{
    AuditFilter, AuditLedger, ChainVerification, CheckpointMismatch, CheckpointVerification,
    MismatchKind, verify_chain,
};
pub use sink::AuditSink;
pub use store::{FileLedgerStore, LedgerStore, MemoryLedgerStore};
