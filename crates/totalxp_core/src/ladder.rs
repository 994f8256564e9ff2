//! Reward ladder: the ordered table of XP thresholds and their rewards.
//!
//! Thresholds live in a `BTreeMap`, so crossed thresholds come out lowest
//! first and rank lookups are nearest-neighbour range queries.

use crate::config::RewardEntry;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Rank name shown below the first threshold
pub const UNRANKED_NAME: &str = "None";

/// Rank name shown once every threshold is behind the player
pub const MAX_RANK_NAME: &str = "Max Rank";

/// A reward granted once per player when their lifetime XP reaches `threshold`
#[derive(Debug, Clone, PartialEq)]
pub struct RewardDefinition {
    pub threshold: u64,
    /// Display name of the rank starting at this threshold
    pub name: String,
    /// Command templates, dispatched in order
    pub commands: Vec<String>,
    pub broadcast: Option<String>,
}

impl RewardDefinition {
    pub fn new(threshold: u64, name: impl Into<String>) -> Self {
        Self {
            threshold,
            name: name.into(),
            commands: Vec::new(),
            broadcast: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn with_broadcast(mut self, broadcast: impl Into<String>) -> Self {
        self.broadcast = Some(broadcast.into());
        self
    }

    /// A reward with neither commands nor a broadcast does nothing
    pub fn is_valid(&self) -> bool {
        self.threshold > 0
            && (self.commands.iter().any(|c| !c.is_empty())
                || self.broadcast.as_deref().is_some_and(|b| !b.is_empty()))
    }
}

/// Highest threshold at or below some XP value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentRank<'a> {
    Unranked,
    Reached { threshold: u64, name: &'a str },
}

impl<'a> CurrentRank<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            CurrentRank::Unranked => UNRANKED_NAME,
            CurrentRank::Reached { name, .. } => *name,
        }
    }

    /// Start of the progress interval; 0 when unranked
    pub fn floor(&self) -> u64 {
        match self {
            CurrentRank::Unranked => 0,
            CurrentRank::Reached { threshold, .. } => *threshold,
        }
    }
}

/// Lowest threshold strictly above some XP value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRank<'a> {
    Next { threshold: u64, name: &'a str },
    MaxRank,
}

impl<'a> NextRank<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            NextRank::Next { name, .. } => *name,
            NextRank::MaxRank => MAX_RANK_NAME,
        }
    }

    pub fn threshold(&self) -> Option<u64> {
        match self {
            NextRank::Next { threshold, .. } => Some(*threshold),
            NextRank::MaxRank => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewardLadder {
    rewards: BTreeMap<u64, RewardDefinition>,
}

impl RewardLadder {
    /// Build from already validated definitions; invalid ones are dropped
    pub fn from_definitions(definitions: impl IntoIterator<Item = RewardDefinition>) -> Self {
        let rewards = definitions
            .into_iter()
            .filter(RewardDefinition::is_valid)
            .map(|d| (d.threshold, d))
            .collect();
        Self { rewards }
    }

    /// Parse the `[rewards]` config table, skipping malformed entries
    pub fn load(entries: &BTreeMap<String, toml::Value>) -> Self {
        let mut rewards = BTreeMap::new();

        for (key, value) in entries {
            let threshold = match key.trim().parse::<u64>() {
                Ok(t) if t > 0 => t,
                _ => {
                    warn!("Invalid reward key (not a positive number): {}", key);
                    continue;
                }
            };
            let entry = match RewardEntry::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Invalid reward {}: {}. Skipping.", key, e);
                    continue;
                }
            };

            let mut commands: Vec<String> = entry
                .commands
                .iter()
                .filter(|c| !c.is_empty())
                .cloned()
                .collect();
            // Older configs carry a single `command` string
            if commands.is_empty() {
                if let Some(single) = entry.command.as_deref().filter(|c| !c.is_empty()) {
                    commands.push(single.to_string());
                }
            }

            let definition = RewardDefinition {
                threshold,
                name: entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Rank {}", threshold)),
                commands,
                broadcast: entry.broadcast.clone().filter(|b| !b.is_empty()),
            };

            if !definition.is_valid() {
                warn!("Reward {} has no commands and no broadcast, skipping", key);
                continue;
            }

            rewards.insert(threshold, definition);
        }

        info!("Loaded {} rewards from config", rewards.len());
        Self { rewards }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn get(&self, threshold: u64) -> Option<&RewardDefinition> {
        self.rewards.get(&threshold)
    }

    /// Ascending iteration over every reward
    pub fn iter(&self) -> impl Iterator<Item = &RewardDefinition> {
        self.rewards.values()
    }

    /// Rewards with `previous < threshold <= new`, lowest threshold first
    pub fn crossed(&self, previous: u64, new: u64) -> impl Iterator<Item = &RewardDefinition> {
        let range = if new > previous {
            Some(self.rewards.range((Excluded(previous), Included(new))))
        } else {
            None
        };
        range.into_iter().flatten().map(|(_, d)| d)
    }

    /// Thresholds crossed moving from `previous` to `new`, ascending
    pub fn find_crossed(&self, previous: u64, new: u64) -> Vec<u64> {
        self.crossed(previous, new).map(|d| d.threshold).collect()
    }

    pub fn current_rank(&self, xp: u64) -> CurrentRank<'_> {
        match self.rewards.range(..=xp).next_back() {
            Some((threshold, d)) => CurrentRank::Reached {
                threshold: *threshold,
                name: &d.name,
            },
            None => CurrentRank::Unranked,
        }
    }

    pub fn next_rank(&self, xp: u64) -> NextRank<'_> {
        match self.rewards.range((Excluded(xp), Unbounded)).next() {
            Some((threshold, d)) => NextRank::Next {
                threshold: *threshold,
                name: &d.name,
            },
            None => NextRank::MaxRank,
        }
    }

    /// Display name of the rank held at `xp`
    pub fn rank_name(&self, xp: u64) -> String {
        self.current_rank(xp).name().to_string()
    }

    /// Progress from the current rank's floor towards the next threshold.
    /// Always 1.0 at max rank.
    pub fn progress(&self, xp: u64) -> f64 {
        match self.next_rank(xp) {
            NextRank::MaxRank => 1.0,
            NextRank::Next { threshold, .. } => {
                progress_fraction(xp, self.current_rank(xp).floor(), threshold)
            }
        }
    }
}

/// `(xp - floor) / (next - floor)` clamped to `0.0..=1.0`
pub fn progress_fraction(xp: u64, floor: u64, next: u64) -> f64 {
    if next <= floor {
        return 0.0;
    }
    let range = (next - floor) as f64;
    let current = xp as f64 - floor as f64;
    (current / range).clamp(0.0, 1.0)
}

/// Shared handle whose ladder is swapped wholesale on reload.
///
/// Readers take an `Arc` snapshot, so a lookup never sees a half-loaded ladder.
#[derive(Debug, Clone, Default)]
pub struct LadderHandle {
    inner: Arc<RwLock<Arc<RewardLadder>>>,
}

impl LadderHandle {
    pub fn new(ladder: RewardLadder) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(ladder))),
        }
    }

    pub fn snapshot(&self) -> Arc<RewardLadder> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn replace(&self, ladder: RewardLadder) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(ladder);
    }
}
