use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid constitution: {0}")]
    Constitution(String),

    #[error("unknown trust level: {0}")]
    UnknownTrustLevel(String),

    #[error("unknown permission tier: {0}")]
    UnknownTier(String),
}
