//! Persistence of per-relay auth preferences.
//!
//! Preferences are user choices and must survive restarts. The pool reads
//! a relay's preference when its descriptor is created and writes it on
//! every `set_auth_preference`.

// SQLite operations need to hold the lock for the duration of the operation.
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use rusqlite::{params, Connection, OptionalExtension};

use super::types::AuthPreference;
use crate::relay::{RelayError, RelayKey, RelayResult};

/// Storage for per-relay auth preferences.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across threads.
pub trait PreferenceStore: Send + Sync {
    /// Loads the stored preference for a relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn load(&self, relay: &RelayKey) -> RelayResult<Option<AuthPreference>>;

    /// Stores the preference for a relay, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn save(&self, relay: &RelayKey, preference: AuthPreference) -> RelayResult<()>;

    /// Loads every stored preference, keyed by normalized URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn load_all(&self) -> RelayResult<HashMap<String, AuthPreference>>;
}

/// `SQLite`-based preference storage.
pub struct SqlitePreferenceStore {
    conn: Mutex<Connection>,
}

impl SqlitePreferenceStore {
    /// Opens (or creates) the preference database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> RelayResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> RelayResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> RelayResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Storage(format!("Failed to acquire database lock: {e}")))
    }

    fn initialize_schema(&self) -> RelayResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS relay_auth_preferences (
                url TEXT PRIMARY KEY,
                preference TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;

        Ok(())
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn load(&self, relay: &RelayKey) -> RelayResult<Option<AuthPreference>> {
        let conn = self.lock()?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT preference FROM relay_auth_preferences WHERE url = ?1",
                params![relay.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        stored
            .map(|value| {
                AuthPreference::parse(&value).ok_or_else(|| {
                    RelayError::Storage(format!("Invalid stored preference: {value}"))
                })
            })
            .transpose()
    }

    fn save(&self, relay: &RelayKey, preference: AuthPreference) -> RelayResult<()> {
        let conn = self.lock()?;

        conn.execute(
            r"
            INSERT INTO relay_auth_preferences (url, preference, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(url) DO UPDATE SET
                preference = excluded.preference,
                updated_at = excluded.updated_at
            ",
            params![
                relay.as_str(),
                preference.as_str(),
                chrono::Utc::now().timestamp()
            ],
        )?;

        Ok(())
    }

    fn load_all(&self) -> RelayResult<HashMap<String, AuthPreference>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT url, preference FROM relay_auth_preferences")?;
        let rows = stmt.query_map([], |row| {
            let url: String = row.get(0)?;
            let preference: String = row.get(1)?;
            Ok((url, preference))
        })?;

        let mut preferences = HashMap::new();
        for row in rows {
            let (url, value) = row?;
            let preference = AuthPreference::parse(&value).ok_or_else(|| {
                RelayError::Storage(format!("Invalid stored preference for {url}: {value}"))
            })?;
            preferences.insert(url, preference);
        }

        Ok(preferences)
    }
}

/// In-memory preference storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    data: RwLock<HashMap<String, AuthPreference>>,
}

impl MemoryPreferenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, relay: &RelayKey) -> RelayResult<Option<AuthPreference>> {
        let data = self
            .data
            .read()
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(data.get(relay.as_str()).copied())
    }

    fn save(&self, relay: &RelayKey, preference: AuthPreference) -> RelayResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        data.insert(relay.as_str().to_string(), preference);
        Ok(())
    }

    fn load_all(&self) -> RelayResult<HashMap<String, AuthPreference>> {
        let data = self
            .data
            .read()
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(data.clone())
    }
}
