//! Error types for TotalXP.

use thiserror::Error;

/// Failures surfaced to the operator by administrative operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Amount must not be negative")]
    NegativeAmount,

    #[error("Not a valid number: {0}")]
    InvalidNumber(String),

    #[error("Player is not online: {0}")]
    NotOnline(String),
}

impl AdminError {
    /// Key into the message table used by the command surface
    pub fn message_key(&self) -> &'static str {
        match self {
            AdminError::PlayerNotFound(_) => "player-not-found",
            AdminError::NegativeAmount => "negative-amount",
            AdminError::InvalidNumber(_) => "invalid-number",
            AdminError::NotOnline(_) => "not-online",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
