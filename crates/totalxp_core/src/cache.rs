//! Player state cache.
//!
//! Holds one live record per connected player. Records are loaded from the
//! store on connect (inline or on a background task) and flushed back on
//! disconnect. XP for online players is always read from here, never from
//! the store.
//!
//! A disconnected player's record stays in `pending` until its write lands.
//! Flushes and store reads for loads are serialised by `flush_lock`, so a
//! quick reconnect picks up the unwritten record instead of stale storage.

use crate::ladder::LadderHandle;
use crate::store::PlayerStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Live state of a connected player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: Uuid,
    /// Last-known display name
    pub name: String,
    /// Lifetime XP
    pub xp: u64,
    pub rank_name: String,
}

#[derive(Default)]
struct CacheInner {
    records: HashMap<Uuid, PlayerRecord>,
    /// Players with a load in flight; cleared on disconnect so late loads are dropped
    loading: HashSet<Uuid>,
    /// Records of disconnected players whose final write has not landed yet
    pending: HashMap<Uuid, PlayerRecord>,
}

#[derive(Clone)]
pub struct PlayerCache {
    inner: Arc<RwLock<CacheInner>>,
    store: Arc<PlayerStore>,
    ladder: LadderHandle,
    flush_lock: Arc<Mutex<()>>,
}

impl PlayerCache {
    pub fn new(store: Arc<PlayerStore>, ladder: LadderHandle) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            store,
            ladder,
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.read().records.contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<PlayerRecord> {
        self.read().records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Snapshot of every cached record
    pub fn records(&self) -> Vec<PlayerRecord> {
        self.read().records.values().cloned().collect()
    }

    /// Online player by display name, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<PlayerRecord> {
        self.read()
            .records
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Mutate a cached record in place; `None` if the player is not cached
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut PlayerRecord) -> R) -> Option<R> {
        self.write().records.get_mut(&id).map(f)
    }

    /// Load a player inline. No-op if the player is already cached.
    /// Returns true if a new record was inserted.
    pub async fn load(&self, id: Uuid, name: &str) -> bool {
        {
            let mut inner = self.write();
            if inner.records.contains_key(&id) {
                return false;
            }
            inner.loading.insert(id);
        }

        let xp = self.stored_xp(id).await;
        self.finish_load(id, name.to_string(), xp)
    }

    /// Load a player on a background task so the caller is never blocked on
    /// storage. Returns `None` if the player is already cached or loading.
    pub fn spawn_load(&self, id: Uuid, name: impl Into<String>) -> Option<JoinHandle<bool>> {
        {
            let mut inner = self.write();
            if inner.records.contains_key(&id) || !inner.loading.insert(id) {
                return None;
            }
        }

        let cache = self.clone();
        let name = name.into();
        Some(tokio::spawn(async move {
            let xp = cache.stored_xp(id).await;
            cache.finish_load(id, name, xp)
        }))
    }

    /// Last known XP: an unwritten disconnect record wins over the store
    async fn stored_xp(&self, id: Uuid) -> u64 {
        let _flush = self.flush_lock.lock().await;
        let pending = self.read().pending.get(&id).map(|r| r.xp);
        match pending {
            Some(xp) => xp,
            None => self.store.get_xp(id).await,
        }
    }

    fn finish_load(&self, id: Uuid, name: String, xp: u64) -> bool {
        let rank_name = self.ladder.snapshot().rank_name(xp);

        let mut inner = self.write();
        if !inner.loading.remove(&id) {
            debug!("Discarding load for {}: player left before it finished", id);
            return false;
        }
        if inner.records.contains_key(&id) {
            return false;
        }

        debug!("Loaded {} ({}) with {} XP", name, id, xp);
        inner.records.insert(
            id,
            PlayerRecord {
                id,
                name,
                xp,
                rank_name,
            },
        );
        true
    }

    /// Remove the player and write their final state back on a background task
    pub fn flush_and_remove(&self, id: Uuid) -> Option<JoinHandle<()>> {
        {
            let mut inner = self.write();
            inner.loading.remove(&id);
            let record = inner.records.remove(&id)?;
            inner.pending.insert(id, record);
        }

        let cache = self.clone();
        Some(tokio::spawn(async move {
            cache.write_pending(id).await;
        }))
    }

    /// Number of disconnect writes still outstanding
    pub fn pending_len(&self) -> usize {
        self.read().pending.len()
    }

    /// Write the player's outstanding disconnect record, if any, and wait for it
    pub async fn settle(&self, id: Uuid) {
        self.write_pending(id).await;
    }

    /// Write every outstanding disconnect record
    pub async fn settle_all(&self) {
        let ids: Vec<Uuid> = self.read().pending.keys().copied().collect();
        for id in ids {
            self.write_pending(id).await;
        }
    }

    async fn write_pending(&self, id: Uuid) {
        let _flush = self.flush_lock.lock().await;
        let record = self.read().pending.get(&id).cloned();
        let Some(record) = record else {
            // Already written by an earlier flush or settle
            return;
        };

        self.store
            .set_player_data(record.id, record.xp, &record.name, &record.rank_name)
            .await;

        let mut inner = self.write();
        if inner.pending.get(&id) == Some(&record) {
            inner.pending.remove(&id);
        }
    }

    /// Recompute every cached rank name against the current ladder
    pub fn refresh_ranks(&self) {
        let ladder = self.ladder.snapshot();
        let mut inner = self.write();
        for record in inner.records.values_mut() {
            record.rank_name = ladder.rank_name(record.xp);
        }
    }

    /// Persist every cached record, waiting for each write
    pub async fn save_all(&self) {
        let records = self.records();
        let count = records.len();
        for record in records {
            self.store
                .set_player_data(record.id, record.xp, &record.name, &record.rank_name)
                .await;
        }
        debug!("Saved {} cached players", count);
    }

    /// Periodically persist every cached record until the task is aborted
    pub fn spawn_autosave(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            info!("Autosave started (every {}s)", every.as_secs());
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                cache.save_all().await;
            }
        })
    }
}
