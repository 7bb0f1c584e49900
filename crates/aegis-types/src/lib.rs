//! Aegis constitutional types.
//!
//! Everything in this crate is either an immutable constitutional fact
//! (trust scores, permission tiers, council seats and veto domains) or a
//! value loaded once at startup (configuration). Components receive these
//! through their constructors; nothing here is a mutable global.
//!
//! ## Modules
//!
//! - [`trust`]: caller trust levels and action permission tiers
//! - [`constitution`]: council seats, pillars, veto map and vote thresholds
//! - [`policy`]: per-tool authorization rules
//! - [`config`]: TOML configuration with validated defaults
//! - [`event`]: the typed lifecycle event bus
//! - [`clock`]: time source abstraction

pub mod clock;
pub mod config;
pub mod constitution;
pub mod error;
pub mod event;
pub mod ids;
pub mod policy;
pub mod trust;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AegisConfig, CouncilConfig, GatewayConfig, LedgerConfig};
pub use constitution::{
    Constitution, CouncilMember, Pillar, VoteChoice, VoteStatus, VoteThreshold,
};
pub use error::ConfigError;
pub use event::{AegisEvent, ApprovalOutcome, EventBus};
pub use ids::{CallId, VoteId};
pub use policy::{ApprovalRoute, RateLimit, ToolPolicy};
pub use trust::{PermissionTier, TrustLevel};
