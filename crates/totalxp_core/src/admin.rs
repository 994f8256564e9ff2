//! Administrative operations for the command surface.
//!
//! None of these fire rewards: setting or resetting XP is not a gain.

use crate::config::TotalXpConfig;
use crate::engine::ProgressionEngine;
use crate::error::AdminError;
use crate::ladder::RewardLadder;
use tracing::info;
use uuid::Uuid;

/// A player an operator named, with their XP at the time of the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerXp {
    pub id: Uuid,
    pub name: String,
    pub xp: u64,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub rewards: usize,
    pub players: usize,
}

/// Parse an operator-supplied amount
pub fn parse_amount(text: &str) -> Result<i64, AdminError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| AdminError::InvalidNumber(text.to_string()))
}

impl ProgressionEngine {
    /// Resolve a UUID, an online name, or a stored name to a player.
    ///
    /// A UUID always resolves; an unknown one reads as 0 XP.
    pub async fn resolve_player(&self, target: &str) -> Result<PlayerXp, AdminError> {
        let target = target.trim();
        // Offline lookups and writes must not race a queued disconnect write
        self.cache.settle_all().await;

        if let Ok(id) = Uuid::parse_str(target) {
            if let Some(record) = self.cache.get(id) {
                return Ok(PlayerXp {
                    id,
                    name: record.name,
                    xp: record.xp,
                    online: true,
                });
            }
            let stored = self.store.load_player(id).await;
            return Ok(PlayerXp {
                id,
                // Empty until the player joins and the real name is stored
                name: stored.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
                xp: stored.map(|s| s.xp).unwrap_or(0),
                online: false,
            });
        }

        if let Some(record) = self.cache.find_by_name(target) {
            return Ok(PlayerXp {
                id: record.id,
                name: record.name,
                xp: record.xp,
                online: true,
            });
        }

        match self.store.find_by_name(target).await {
            Some(stored) => Ok(PlayerXp {
                id: stored.id,
                name: stored.name,
                xp: stored.xp,
                online: false,
            }),
            None => Err(AdminError::PlayerNotFound(target.to_string())),
        }
    }

    /// Lifetime XP: from the cache when online, else from the store
    pub async fn lookup_xp(&self, target: &str) -> Result<PlayerXp, AdminError> {
        self.resolve_player(target).await
    }

    /// Overwrite a player's lifetime XP without firing or re-firing rewards
    pub async fn set_xp(&mut self, target: &str, amount: i64) -> Result<PlayerXp, AdminError> {
        if amount < 0 {
            return Err(AdminError::NegativeAmount);
        }
        let amount = amount as u64;
        let mut player = self.resolve_player(target).await?;
        let ladder = self.ladder.snapshot();
        let rank_name = ladder.rank_name(amount);

        let updated = self.cache.update(player.id, |record| {
            record.xp = amount;
            record.rank_name = rank_name.clone();
            record.clone()
        });

        self.store
            .set_player_data(player.id, amount, &player.name, &rank_name)
            .await;

        if let Some(record) = updated {
            self.indicator.update(&record, &ladder);
        }

        info!("Set XP of {} ({}) to {}", player.name, player.id, amount);
        player.xp = amount;
        Ok(player)
    }

    /// Zero a player's XP and forget every reward they were issued
    pub async fn reset_xp(&mut self, target: &str) -> Result<PlayerXp, AdminError> {
        let mut player = self.resolve_player(target).await?;
        self.store.reset_player(player.id).await;

        let ladder = self.ladder.snapshot();
        let updated = self.cache.update(player.id, |record| {
            record.xp = 0;
            record.rank_name = ladder.rank_name(0);
            record.clone()
        });
        if let Some(record) = updated {
            self.indicator.update(&record, &ladder);
        }

        info!("Reset XP of {} ({})", player.name, player.id);
        player.xp = 0;
        Ok(player)
    }

    /// Swap in a new ladder, messages and indicator settings, then resync
    /// every connected player. No rewards fire.
    pub async fn reload(&mut self, config: &TotalXpConfig) -> ReloadSummary {
        self.ladder.replace(RewardLadder::load(&config.rewards));
        self.messages = config.messages.clone();

        let connected: Vec<(Uuid, String)> = self
            .connected
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect();
        for (id, name) in &connected {
            self.cache.load(*id, name).await;
        }
        self.cache.refresh_ranks();

        let ladder = self.ladder.snapshot();
        let records = self.cache.records();
        self.indicator
            .reload_settings(config.indicator_settings(), &records, &ladder);

        let summary = ReloadSummary {
            rewards: ladder.len(),
            players: records.len(),
        };
        info!(
            "Reloaded configuration: {} rewards, {} players resynced",
            summary.rewards, summary.players
        );
        summary
    }

    /// Show the progress bar again for a connected player
    pub fn show_indicator(&mut self, id: Uuid) -> Result<(), AdminError> {
        let record = self
            .cache
            .get(id)
            .ok_or_else(|| AdminError::NotOnline(id.to_string()))?;
        self.indicator.show(&record, &self.ladder.snapshot());
        Ok(())
    }

    /// Hide the progress bar for a connected player
    pub fn hide_indicator(&mut self, id: Uuid) -> Result<(), AdminError> {
        if !self.cache.contains(id) {
            return Err(AdminError::NotOnline(id.to_string()));
        }
        self.indicator.hide(id);
        Ok(())
    }
}
