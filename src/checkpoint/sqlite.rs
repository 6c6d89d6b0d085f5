//! SQLite-backed durable checkpoint store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, params};

use crate::checkpoint::store::{Checkpoint, CheckpointMetadata, CheckpointStore};
use crate::domain::LoopState;
use crate::error::{Result, RunloopError};

/// Durable fallback store for checkpoints.
///
/// rusqlite::Connection isn't Sync (it uses RefCell internally), so all
/// access goes through a Mutex. Operations are quick and need exclusive
/// access anyway.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Parent directories are created as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a store that lives only in memory, for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id    TEXT    NOT NULL,
                iteration     INTEGER NOT NULL,
                checkpoint_id TEXT    NOT NULL,
                state         TEXT    NOT NULL,
                created_at    INTEGER NOT NULL,
                PRIMARY KEY (session_id, iteration)
            );",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RunloopError::Storage(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        // State goes in as JSON text so nested payloads round-trip exactly
        let state_json = serde_json::to_string(&checkpoint.state)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints
                (session_id, iteration, checkpoint_id, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.session_id,
                checkpoint.iteration,
                checkpoint.checkpoint_id,
                state_json,
                checkpoint.created_at,
            ],
        )?;
        Ok(())
    }

    async fn get(&self, session_id: &str, iteration: u32) -> Result<Option<Checkpoint>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, state, created_at FROM checkpoints
             WHERE session_id = ?1 AND iteration = ?2",
        )?;
        let mut rows = stmt.query(params![session_id, iteration])?;
        match rows.next()? {
            Some(row) => {
                let checkpoint_id: String = row.get(0)?;
                let state_json: String = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                let state: LoopState = serde_json::from_str(&state_json)?;
                Ok(Some(Checkpoint {
                    checkpoint_id,
                    session_id: session_id.to_string(),
                    iteration,
                    created_at,
                    state,
                }))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, session_id: &str) -> Result<Vec<CheckpointMetadata>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, iteration, created_at FROM checkpoints
             WHERE session_id = ?1 ORDER BY iteration ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(CheckpointMetadata {
                checkpoint_id: row.get(0)?,
                iteration: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut metadata = Vec::new();
        for row in rows {
            metadata.push(row?);
        }
        Ok(metadata)
    }

    async fn sessions(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT session_id FROM checkpoints ORDER BY session_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}
