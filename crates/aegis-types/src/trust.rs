use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Classified reliability of a caller.
///
/// Levels are totally ordered by their fixed score. Input that cannot be
/// classified is treated as [`TrustLevel::Untrusted`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    System,
    Operator,
    Verified,
    Standard,
    #[default]
    Untrusted,
    Hostile,
}

impl TrustLevel {
    /// All levels, most trusted first.
    pub const ALL: [TrustLevel; 6] = [
        TrustLevel::System,
        TrustLevel::Operator,
        TrustLevel::Verified,
        TrustLevel::Standard,
        TrustLevel::Untrusted,
        TrustLevel::Hostile,
    ];

    pub fn score(self) -> f64 {
        match self {
            TrustLevel::System => 1.0,
            TrustLevel::Operator => 0.8,
            TrustLevel::Verified => 0.6,
            TrustLevel::Standard => 0.4,
            TrustLevel::Untrusted => 0.2,
            TrustLevel::Hostile => 0.0,
        }
    }

    /// Integer rank matching the score order, used for exact comparisons.
    fn rank(self) -> u8 {
        match self {
            TrustLevel::System => 5,
            TrustLevel::Operator => 4,
            TrustLevel::Verified => 3,
            TrustLevel::Standard => 2,
            TrustLevel::Untrusted => 1,
            TrustLevel::Hostile => 0,
        }
    }

    /// Whether a caller at this level meets a policy requiring `required`.
    pub fn satisfies(self, required: TrustLevel) -> bool {
        self >= required
    }

    /// Classify free-form input, falling back to `Untrusted`.
    pub fn classify(raw: &str) -> TrustLevel {
        raw.parse().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::System => "system",
            TrustLevel::Operator => "operator",
            TrustLevel::Verified => "verified",
            TrustLevel::Standard => "standard",
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Hostile => "hostile",
        }
    }
}

impl PartialOrd for TrustLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrustLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(TrustLevel::System),
            "operator" => Ok(TrustLevel::Operator),
            "verified" => Ok(TrustLevel::Verified),
            "standard" => Ok(TrustLevel::Standard),
            "untrusted" => Ok(TrustLevel::Untrusted),
            "hostile" => Ok(TrustLevel::Hostile),
            other => Err(ConfigError::UnknownTrustLevel(other.to_string())),
        }
    }
}

/// Severity class of an action.
///
/// `WriteDestructive` and `Admin` always require an explicit approval step.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionTier {
    ReadOnly,
    WriteSafe,
    WriteDestructive,
    Admin,
}

impl PermissionTier {
    pub const ALL: [PermissionTier; 4] = [
        PermissionTier::ReadOnly,
        PermissionTier::WriteSafe,
        PermissionTier::WriteDestructive,
        PermissionTier::Admin,
    ];

    pub fn requires_approval(self) -> bool {
        matches!(self, PermissionTier::WriteDestructive | PermissionTier::Admin)
    }

    /// Base contribution of the tier to a decision's risk score.
    pub fn base_risk(self) -> f64 {
        match self {
            PermissionTier::ReadOnly => 0.1,
            PermissionTier::WriteSafe => 0.3,
            PermissionTier::WriteDestructive => 0.7,
            PermissionTier::Admin => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionTier::ReadOnly => "READ_ONLY",
            PermissionTier::WriteSafe => "WRITE_SAFE",
            PermissionTier::WriteDestructive => "WRITE_DESTRUCTIVE",
            PermissionTier::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "READ_ONLY" => Ok(PermissionTier::ReadOnly),
            "WRITE_SAFE" => Ok(PermissionTier::WriteSafe),
            "WRITE_DESTRUCTIVE" => Ok(PermissionTier::WriteDestructive),
            "ADMIN" => Ok(PermissionTier::Admin),
            other => Err(ConfigError::UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_order_follows_score() {
        for pair in TrustLevel::ALL.windows(2) {
            assert!(pair[0] > pair[1]);
            assert!(pair[0].score() > pair[1].score());
        }
    }

    #[test]
    fn unclassified_input_is_untrusted() {
        assert_eq!(TrustLevel::classify("root"), TrustLevel::Untrusted);
        assert_eq!(TrustLevel::classify(" Operator "), TrustLevel::Operator);
        assert_eq!(TrustLevel::default(), TrustLevel::Untrusted);
    }

    #[test]
    fn satisfies_is_inclusive() {
        assert!(TrustLevel::Verified.satisfies(TrustLevel::Verified));
        assert!(TrustLevel::System.satisfies(TrustLevel::Verified));
        assert!(!TrustLevel::Standard.satisfies(TrustLevel::Verified));
    }

    #[test]
    fn tier_gate() {
        assert!(!PermissionTier::ReadOnly.requires_approval());
        assert!(!PermissionTier::WriteSafe.requires_approval());
        assert!(PermissionTier::WriteDestructive.requires_approval());
        assert!(PermissionTier::Admin.requires_approval());
        assert!(PermissionTier::ReadOnly < PermissionTier::Admin);
    }

    #[test]
    fn tier_parses_config_spellings() {
        assert_eq!(
            "write-destructive".parse::<PermissionTier>().unwrap(),
            PermissionTier::WriteDestructive
        );
        assert!("superuser".parse::<PermissionTier>().is_err());
    }

    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&PermissionTier::WriteSafe).unwrap();
        assert_eq!(json, "\"WRITE_SAFE\"");
        let level: TrustLevel = serde_json::from_str("\"verified\"").unwrap();
        assert_eq!(level, TrustLevel::Verified);
    }
}
