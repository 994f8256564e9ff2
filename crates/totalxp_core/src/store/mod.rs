// Persistence Store
//
// Durable per-player lifetime XP plus the issued-reward facts that keep a
// reward from firing twice. Every public operation favours availability:
// storage errors are logged and the caller gets a safe default.

pub mod db;

pub use db::Database;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A persisted player row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlayer {
    pub id: Uuid,
    pub xp: u64,
    pub name: String,
    pub rank_name: String,
}

/// SQLite stays signed; lifetime XP never gets near i64::MAX in practice
fn to_sql_xp(xp: u64) -> i64 {
    i64::try_from(xp).unwrap_or(i64::MAX)
}

fn from_sql_xp(xp: i64) -> u64 {
    u64::try_from(xp).unwrap_or(0)
}

pub struct PlayerStore {
    db: Database,
}

impl PlayerStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path).await?;
        Ok(Self { db })
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// Stored lifetime XP, 0 if the player is unknown or storage fails
    pub async fn get_xp(&self, id: Uuid) -> u64 {
        let key = id.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let xp: Option<i64> = conn
                    .query_row(
                        "SELECT xp FROM player_xp WHERE uuid = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(xp)
            })
            .await;

        match result {
            Ok(xp) => xp.map(from_sql_xp).unwrap_or(0),
            Err(e) => {
                error!("Error reading XP for {}: {:#}", id, e);
                0
            }
        }
    }

    /// Full stored row, if any
    pub async fn load_player(&self, id: Uuid) -> Option<StoredPlayer> {
        let key = id.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT xp, name, rank_name FROM player_xp WHERE uuid = ?1",
                        params![key],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await;

        match result {
            Ok(row) => row.map(|(xp, name, rank_name)| StoredPlayer {
                id,
                xp: from_sql_xp(xp),
                name,
                rank_name,
            }),
            Err(e) => {
                error!("Error loading player {}: {:#}", id, e);
                None
            }
        }
    }

    /// Look a player up by last-known display name, ignoring case
    pub async fn find_by_name(&self, name: &str) -> Option<StoredPlayer> {
        let name = name.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT uuid, xp, name, rank_name FROM player_xp
                         WHERE name = ?1 COLLATE NOCASE
                         LIMIT 1",
                        params![name],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await;

        match result {
            Ok(Some((uuid, xp, name, rank_name))) => match Uuid::parse_str(&uuid) {
                Ok(id) => Some(StoredPlayer {
                    id,
                    xp: from_sql_xp(xp),
                    name,
                    rank_name,
                }),
                Err(e) => {
                    error!("Stored player {} has a malformed id: {}", name, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Error looking up player by name: {:#}", e);
                None
            }
        }
    }

    /// Insert or overwrite the player's row; the last write wins
    pub async fn set_player_data(&self, id: Uuid, xp: u64, name: &str, rank_name: &str) {
        let key = id.to_string();
        let name = name.to_string();
        let rank_name = rank_name.to_string();
        let result = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO player_xp (uuid, xp, name, rank_name) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(uuid) DO UPDATE SET
                        xp = excluded.xp,
                        name = excluded.name,
                        rank_name = excluded.rank_name",
                    params![key, to_sql_xp(xp), name, rank_name],
                )
                .context("Failed to upsert player")?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => debug!("Saved {} XP for {}", xp, id),
            Err(e) => error!("Error saving XP for {}: {:#}", id, e),
        }
    }

    /// Whether the reward at `threshold` was already issued to this player.
    /// Storage failures answer false.
    pub async fn has_reward_issued(&self, id: Uuid, threshold: u64) -> bool {
        let key = id.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM player_rewards WHERE uuid = ?1 AND threshold = ?2",
                        params![key, to_sql_xp(threshold)],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await;

        result.unwrap_or_else(|e| {
            error!("Error checking reward {} for {}: {:#}", threshold, id, e);
            false
        })
    }

    /// Record that the reward at `threshold` was issued. Repeat calls are no-ops.
    pub async fn mark_reward_issued(&self, id: Uuid, threshold: u64) {
        let key = id.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO player_rewards (uuid, threshold) VALUES (?1, ?2)",
                    params![key, to_sql_xp(threshold)],
                )?;
                Ok(inserted)
            })
            .await;

        match result {
            Ok(0) => debug!("Reward {} for {} was already recorded", threshold, id),
            Ok(_) => debug!("Recorded reward {} for {}", threshold, id),
            Err(e) => error!("Error saving reward {} for {}: {:#}", threshold, id, e),
        }
    }

    /// Thresholds already issued to the player, ascending
    pub async fn issued_rewards(&self, id: Uuid) -> Vec<u64> {
        let key = id.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT threshold FROM player_rewards WHERE uuid = ?1 ORDER BY threshold",
                )?;
                let thresholds = stmt
                    .query_map(params![key], |row| row.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(thresholds)
            })
            .await;

        match result {
            Ok(thresholds) => thresholds.into_iter().map(from_sql_xp).collect(),
            Err(e) => {
                error!("Error listing rewards for {}: {:#}", id, e);
                Vec::new()
            }
        }
    }

    /// Delete the XP row and every issued-reward fact for the player
    pub async fn reset_player(&self, id: Uuid) {
        let key = id.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let tx = conn.unchecked_transaction()?;
                tx.execute("DELETE FROM player_xp WHERE uuid = ?1", params![key])?;
                let rewards =
                    tx.execute("DELETE FROM player_rewards WHERE uuid = ?1", params![key])?;
                tx.commit()?;
                Ok(rewards)
            })
            .await;

        match result {
            Ok(rewards) => info!("Reset player {} ({} reward records cleared)", id, rewards),
            Err(e) => error!("Error resetting player {}: {:#}", id, e),
        }
    }
}
