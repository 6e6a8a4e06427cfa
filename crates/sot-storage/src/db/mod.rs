//! Key-value persistence split into domain-specific modules.
//!
//! Every record is a JSON value under a flat string key, the same shape the
//! browser extension keeps in its local storage area.

mod session;
mod settings;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::migrations;

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database. `None` uses the default location under the
    /// local data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        migrations::init_schema(&conn)?;

        log::info!("Database initialized at: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, discarded on drop
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get default database path
    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("stayontrack");
        path.push("stayontrack.db");
        path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Database connection lock poisoned: {e}"))
    }

    // ==================== Raw Key-Value Methods ====================

    /// Read a raw JSON value
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Read and decode a JSON value
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored value does not decode as `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to decode stored value for '{key}'"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Encode and store a value, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, raw, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove keys; missing keys are ignored
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn remove(&self, keys: &[&str]) -> Result<()> {
        let conn = self.conn()?;
        for key in keys {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        }
        Ok(())
    }

    /// List stored keys in alphabetical order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Delete every stored session and setting
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn clear_all(&self) -> Result<usize> {
        let removed = self.conn()?.execute("DELETE FROM kv", [])?;
        log::info!("Cleared {removed} stored records");
        Ok(removed)
    }
}
