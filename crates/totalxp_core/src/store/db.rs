// Database connection management for the XP store

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Single SQLite connection guarded by one store-wide lock
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create the database file and bring its schema up to date
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        info!("Opening XP database at: {}", db_path.display());

        let open_path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&open_path).context("Failed to open SQLite database")?;

            // WAL lets readers proceed while a save is being written
            let mode: String = conn
                .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
                .context("Failed to enable WAL mode")?;
            debug!("SQLite journal mode: {}", mode);
            conn.pragma_update(None, "synchronous", "NORMAL")
                .context("Failed to set synchronous mode")?;

            Ok(conn)
        })
        .await??;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path,
        };

        db.initialize_schema().await?;

        Ok(db)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS player_xp (
                    uuid TEXT PRIMARY KEY,
                    xp INTEGER NOT NULL,
                    name TEXT NOT NULL DEFAULT '',
                    rank_name TEXT NOT NULL DEFAULT 'None'
                )",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS player_rewards (
                    uuid TEXT NOT NULL,
                    threshold INTEGER NOT NULL,
                    PRIMARY KEY (uuid, threshold)
                )",
                [],
            )?;

            Ok(())
        })
        .await
        .context("Failed to create schema")?;

        self.run_migrations().await?;

        info!("XP database schema ready");
        Ok(())
    }

    /// Add columns introduced after the first release, keeping existing rows
    async fn run_migrations(&self) -> Result<()> {
        self.execute(|conn| {
            let add_column_if_missing = |col: &str, sql: &str| -> Result<bool> {
                let exists: bool = conn
                    .query_row(
                        "SELECT COUNT(*) FROM pragma_table_info('player_xp') WHERE name=?1",
                        [col],
                        |row| {
                            let count: i64 = row.get(0)?;
                            Ok(count > 0)
                        },
                    )
                    .with_context(|| format!("Failed to check if {} column exists", col))?;
                if exists {
                    debug!("Migration not needed: {} column already exists", col);
                    return Ok(false);
                }
                conn.execute(sql, [])
                    .with_context(|| format!("Failed to add column {}", col))?;
                info!("Migration complete: added {} to player_xp", col);
                Ok(true)
            };

            add_column_if_missing(
                "name",
                "ALTER TABLE player_xp ADD COLUMN name TEXT NOT NULL DEFAULT ''",
            )?;
            add_column_if_missing(
                "rank_name",
                "ALTER TABLE player_xp ADD COLUMN rank_name TEXT NOT NULL DEFAULT 'None'",
            )?;

            // Needs the name column, so it is created after the columns exist
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_player_name
                 ON player_xp(name COLLATE NOCASE)",
                [],
            )?;

            Ok(())
        })
        .await
        .context("Database migration task failed")
    }

    /// Run `f` against the connection on the blocking pool, holding the store lock
    pub async fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
