use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ApiError;
use crate::models::AuthToken;

const TOKEN_KEY: &str = "token";

/// Durable storage for the current auth token.
pub trait TokenStore: Send {
    fn load(&self) -> Result<Option<AuthToken>, ApiError>;
    fn save(&mut self, token: &AuthToken) -> Result<(), ApiError>;
    fn clear(&mut self) -> Result<(), ApiError>;
}

/// Small key/value store in the user's data directory.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
    }

    pub fn set(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> rusqlite::Result<bool> {
        let removed = self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }
}

impl TokenStore for Database {
    fn load(&self) -> Result<Option<AuthToken>, ApiError> {
        Ok(self.get(TOKEN_KEY)?.map(AuthToken::new))
    }

    fn save(&mut self, token: &AuthToken) -> Result<(), ApiError> {
        self.set(TOKEN_KEY, token.as_str())?;
        debug!(path = %self.path.display(), "stored auth token");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), ApiError> {
        if self.remove(TOKEN_KEY)? {
            debug!(path = %self.path.display(), "cleared auth token");
        }
        Ok(())
    }
}
