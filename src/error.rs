//! Error types for the adapter layer (config loading, HTTP server). The core
//! state machines never return errors across their hook boundaries — per
//! `spec.md` §7 they recover by ticking the affected peer and continuing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}
