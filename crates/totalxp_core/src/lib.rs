//! TotalXP core: lifetime XP tracking with one-time threshold rewards.
//!
//! The host adapter owns a [`ProgressionEngine`] and forwards connect,
//! disconnect and XP-gain events into it; rewards and progress bars go back
//! out through the traits in [`host`].

pub mod admin;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod host;
pub mod indicator;
pub mod ladder;
pub mod store;

pub use admin::{parse_amount, PlayerXp, ReloadSummary};
pub use cache::{PlayerCache, PlayerRecord};
pub use config::{IndicatorSettings, Messages, RewardEntry, TotalXpConfig};
pub use engine::{Collaborators, ProgressionEngine};
pub use error::{AdminError, ConfigError};
pub use format::{Formatter, PlaceholderContext, PlaceholderFormatter};
pub use host::{BarColor, BarDisplay, BarFrame, BarStyle, RewardHost};
pub use indicator::{HideExpired, ProgressIndicator, Visibility};
pub use ladder::{CurrentRank, LadderHandle, NextRank, RewardDefinition, RewardLadder};
pub use store::{PlayerStore, StoredPlayer};
