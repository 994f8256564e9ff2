//! Progression engine.
//!
//! Receives XP gains for connected players, keeps the cache current and
//! fires each crossed threshold's reward once per player. All entry points
//! are meant to be driven from one task, in event order; only the store is
//! shared with background work.

use crate::cache::{PlayerCache, PlayerRecord};
use crate::config::{Messages, TotalXpConfig};
use crate::format::{Formatter, PlaceholderContext};
use crate::host::{BarDisplay, RewardHost};
use crate::indicator::{HideExpired, ProgressIndicator};
use crate::ladder::{LadderHandle, RewardDefinition, RewardLadder};
use crate::store::PlayerStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Host-provided handles the engine calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub host: Arc<dyn RewardHost>,
    pub display: Arc<dyn BarDisplay>,
    pub formatter: Arc<dyn Formatter>,
}

pub struct ProgressionEngine {
    pub(crate) store: Arc<PlayerStore>,
    pub(crate) cache: PlayerCache,
    pub(crate) ladder: LadderHandle,
    pub(crate) indicator: ProgressIndicator,
    pub(crate) host: Arc<dyn RewardHost>,
    pub(crate) formatter: Arc<dyn Formatter>,
    pub(crate) messages: Messages,
    /// Connected players and their display names
    pub(crate) connected: HashMap<Uuid, String>,
}

impl ProgressionEngine {
    /// Build the engine from config. The receiver carries auto-hide expiries
    /// that must be passed back to [`ProgressionEngine::handle_hide_expired`].
    pub fn new(
        config: &TotalXpConfig,
        store: Arc<PlayerStore>,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<HideExpired>) {
        let ladder = LadderHandle::new(RewardLadder::load(&config.rewards));
        let cache = PlayerCache::new(Arc::clone(&store), ladder.clone());
        let (indicator, expired_rx) = ProgressIndicator::new(
            config.indicator_settings(),
            collaborators.display,
            Arc::clone(&collaborators.formatter),
        );

        let engine = Self {
            store,
            cache,
            ladder,
            indicator,
            host: collaborators.host,
            formatter: collaborators.formatter,
            messages: config.messages.clone(),
            connected: HashMap::new(),
        };
        (engine, expired_rx)
    }

    pub fn cache(&self) -> &PlayerCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<PlayerStore> {
        &self.store
    }

    pub fn ladder(&self) -> Arc<RewardLadder> {
        self.ladder.snapshot()
    }

    pub fn indicator(&self) -> &ProgressIndicator {
        &self.indicator
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn is_connected(&self, id: Uuid) -> bool {
        self.connected.contains_key(&id)
    }

    /// Player is logging in: start loading their record in the background
    pub fn player_connecting(&mut self, id: Uuid, name: &str) -> Option<JoinHandle<bool>> {
        self.connected.insert(id, name.to_string());
        self.cache.spawn_load(id, name)
    }

    /// Player is in the world: make sure the record is loaded, then show progress
    pub async fn player_joined(&mut self, id: Uuid, name: &str) {
        self.connected.insert(id, name.to_string());
        if !self.cache.contains(id) {
            // Background load missing or still running
            self.cache.load(id, name).await;
        }
        if let Some(record) = self.cache.get(id) {
            info!("{} joined with {} XP ({})", record.name, record.xp, record.rank_name);
            self.indicator.update(&record, &self.ladder.snapshot());
        }
    }

    /// Player left: cancel their indicator, then flush the record to the store
    pub fn player_disconnected(&mut self, id: Uuid) -> Option<JoinHandle<()>> {
        self.connected.remove(&id);
        self.indicator.remove(id);
        let flush = self.cache.flush_and_remove(id);
        debug!("Player {} disconnected", id);
        flush
    }

    /// Apply an XP gain. Returns the thresholds whose rewards fired, ascending.
    pub async fn report_xp_gain(&mut self, id: Uuid, amount: i64) -> Vec<u64> {
        if amount <= 0 {
            return Vec::new();
        }
        let amount = amount as u64;

        let ladder = self.ladder.snapshot();
        let Some((previous, record)) = self.cache.update(id, |record| {
            let previous = record.xp;
            record.xp = record.xp.saturating_add(amount);
            record.rank_name = ladder.rank_name(record.xp);
            (previous, record.clone())
        }) else {
            debug!("Dropping {} XP for {}: player not loaded", amount, id);
            return Vec::new();
        };

        let crossed: Vec<&RewardDefinition> = ladder.crossed(previous, record.xp).collect();
        if !crossed.is_empty() {
            // Stored XP must never trail an issued-reward fact
            self.store
                .set_player_data(id, record.xp, &record.name, &record.rank_name)
                .await;
        }

        let mut fired = Vec::new();
        for reward in crossed {
            if self.store.has_reward_issued(id, reward.threshold).await {
                debug!(
                    "Reward {} already issued to {}, skipping",
                    reward.threshold, record.name
                );
                continue;
            }

            self.fire_reward(&record, reward, &ladder);
            // Marked after firing: a crash in between may repeat this reward
            self.store.mark_reward_issued(id, reward.threshold).await;
            fired.push(reward.threshold);
        }

        self.indicator.update(&record, &ladder);
        fired
    }

    fn fire_reward(&self, player: &PlayerRecord, reward: &RewardDefinition, ladder: &RewardLadder) {
        info!(
            "{} reached {} XP, issuing reward '{}'",
            player.name, reward.threshold, reward.name
        );

        let ctx = PlaceholderContext {
            player: &player.name,
            xp: player.xp,
            threshold: reward.threshold,
            ladder,
        };

        for template in reward.commands.iter().filter(|c| !c.is_empty()) {
            let command = self.formatter.render(template, &ctx);
            let command = command.strip_prefix('/').unwrap_or(&command);
            self.host.dispatch_command(command);
        }

        if let Some(template) = reward.broadcast.as_deref() {
            let message = self.formatter.render(template, &ctx);
            if !message.is_empty() {
                self.host
                    .broadcast(&format!("{}{}", self.messages.prefix, message));
            }
        }
    }

    /// Feed back an auto-hide timer expiry
    pub fn handle_hide_expired(&mut self, expired: HideExpired) {
        self.indicator.handle_expired(expired);
    }

    /// Persist everyone and take every bar down
    pub async fn shutdown(&mut self) {
        self.cache.settle_all().await;
        self.cache.save_all().await;
        self.indicator.remove_all();
        info!("Saved {} online players on shutdown", self.cache.len());
    }
}
