//! CLI command implementations

pub mod council;
pub mod ledger;
pub mod policy;
