//! Progress indicator state machine.
//!
//! One optional bar per player showing progress towards the next rank.
//! In dynamic mode every update arms a single-shot hide timer; the timer
//! never touches indicator state itself but reports back through a channel
//! that the owner drains on the same task that drives updates. A stale
//! report (the timer was superseded or the bar removed) is ignored.

use crate::cache::PlayerRecord;
use crate::config::IndicatorSettings;
use crate::format::{Formatter, PlaceholderContext};
use crate::host::{BarDisplay, BarFrame};
use crate::ladder::{NextRank, RewardLadder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

/// Sent when a hide timer runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HideExpired {
    pub player: Uuid,
    generation: u64,
}

/// Observable state of one player's indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Feature switched off globally
    Disabled,
    /// Player hid the bar
    Hidden,
    Visible,
    /// Shown, with an armed auto-hide timer
    VisiblePendingHide,
    /// No bar: never shown yet, timed out, or removed
    Idle,
}

/// Armed auto-hide timer; dropping it cancels the task
struct HideTimer {
    generation: u64,
    handle: AbortHandle,
}

impl Drop for HideTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct ShownBar {
    frame: BarFrame,
    timer: Option<HideTimer>,
}

pub struct ProgressIndicator {
    settings: IndicatorSettings,
    display: Arc<dyn BarDisplay>,
    formatter: Arc<dyn Formatter>,
    bars: HashMap<Uuid, ShownBar>,
    hidden: HashSet<Uuid>,
    expired_tx: mpsc::UnboundedSender<HideExpired>,
    next_generation: u64,
}

impl ProgressIndicator {
    /// The receiver yields hide-timer expiries to feed back into
    /// [`ProgressIndicator::handle_expired`].
    pub fn new(
        settings: IndicatorSettings,
        display: Arc<dyn BarDisplay>,
        formatter: Arc<dyn Formatter>,
    ) -> (Self, mpsc::UnboundedReceiver<HideExpired>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let indicator = Self {
            settings,
            display,
            formatter,
            bars: HashMap::new(),
            hidden: HashSet::new(),
            expired_tx,
            next_generation: 0,
        };
        (indicator, expired_rx)
    }

    pub fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    pub fn visibility(&self, player: Uuid) -> Visibility {
        if !self.settings.enabled {
            return Visibility::Disabled;
        }
        if self.hidden.contains(&player) {
            return Visibility::Hidden;
        }
        match self.bars.get(&player) {
            Some(ShownBar { timer: Some(_), .. }) => Visibility::VisiblePendingHide,
            Some(_) => Visibility::Visible,
            None => Visibility::Idle,
        }
    }

    /// Last frame rendered for the player, if a bar is up
    pub fn frame(&self, player: Uuid) -> Option<&BarFrame> {
        self.bars.get(&player).map(|b| &b.frame)
    }

    /// Recompute and render the player's bar for their current XP
    pub fn update(&mut self, player: &PlayerRecord, ladder: &RewardLadder) {
        if !self.settings.enabled || self.hidden.contains(&player.id) {
            self.remove(player.id);
            return;
        }

        let frame = self.build_frame(player, ladder);
        self.display.render(player.id, &frame);

        let timer = if self.settings.dynamic_mode {
            Some(self.arm_timer(player.id))
        } else {
            None
        };
        // Replacing the entry drops, and so cancels, any previous timer
        self.bars.insert(player.id, ShownBar { frame, timer });
    }

    fn build_frame(&self, player: &PlayerRecord, ladder: &RewardLadder) -> BarFrame {
        let (title, progress) = match ladder.next_rank(player.xp) {
            NextRank::MaxRank => (self.settings.max_rank_title.clone(), 1.0),
            NextRank::Next { threshold, .. } => {
                let ctx = PlaceholderContext {
                    player: &player.name,
                    xp: player.xp,
                    threshold,
                    ladder,
                };
                (
                    self.formatter.render(&self.settings.title, &ctx),
                    ladder.progress(player.xp),
                )
            }
        };

        BarFrame {
            title,
            progress,
            color: self.settings.color,
            style: self.settings.style,
        }
    }

    fn arm_timer(&mut self, player: Uuid) -> HideTimer {
        let generation = self.next_generation;
        self.next_generation += 1;

        let tx = self.expired_tx.clone();
        let delay = self.settings.timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the owner shut down
            let _ = tx.send(HideExpired { player, generation });
        });

        HideTimer {
            generation,
            handle: task.abort_handle(),
        }
    }

    /// Act on a timer expiry. Returns true if a bar was torn down.
    pub fn handle_expired(&mut self, expired: HideExpired) -> bool {
        let current = self
            .bars
            .get(&expired.player)
            .and_then(|b| b.timer.as_ref())
            .map(|t| t.generation);

        if current != Some(expired.generation) {
            debug!("Ignoring stale hide timer for {}", expired.player);
            return false;
        }

        debug!("Auto-hiding progress bar for {}", expired.player);
        self.remove(expired.player);
        true
    }

    /// Clear the player's hidden flag and show the bar again
    pub fn show(&mut self, player: &PlayerRecord, ladder: &RewardLadder) {
        self.hidden.remove(&player.id);
        self.update(player, ladder);
    }

    /// Hide the bar until the player asks for it again
    pub fn hide(&mut self, player: Uuid) {
        self.hidden.insert(player);
        self.remove(player);
    }

    /// Tear down the bar and cancel its timer. Safe without a bar.
    pub fn remove(&mut self, player: Uuid) {
        if let Some(bar) = self.bars.remove(&player) {
            drop(bar.timer);
            self.display.remove(player);
        }
    }

    /// Tear down every bar, e.g. on shutdown
    pub fn remove_all(&mut self) {
        let players: Vec<Uuid> = self.bars.keys().copied().collect();
        for player in players {
            self.remove(player);
        }
    }

    /// Apply new settings and resynchronise every connected player
    pub fn reload_settings<'a>(
        &mut self,
        settings: IndicatorSettings,
        players: impl IntoIterator<Item = &'a PlayerRecord>,
        ladder: &RewardLadder,
    ) {
        self.settings = settings;
        for player in players {
            if self.settings.enabled && !self.hidden.contains(&player.id) {
                self.update(player, ladder);
            } else {
                self.remove(player.id);
            }
        }
    }
}
