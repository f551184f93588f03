//! Storage layer for studyfocus.
//!
//! A single SQLite key-value table shared by every surface. Each write bumps a
//! global revision counter so that other processes can follow changes with
//! [`Database::changes_since`] instead of re-reading every key. A long-lived
//! connection that also writes uses [`Database::foreign_changes_since`] to skip
//! its own writes.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Share one instance behind a mutex, or open one connection per process. Open
//! connections wait on each other through `busy_timeout`; the last write to a
//! key wins.
//!
//! # Schema
//!
//! Values are stored as JSON text. Removing a key writes JSON `null` rather
//! than deleting the row, so the removal shows up in the change feed with its
//! own revision. Timestamps are RFC 3339 in UTC.

use std::path::Path;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sf_core::{
    GatingConfig, Mode, SessionRecord, StateStore, StoreError, TimerSettings, WorkDomainSet,
};
use thiserror::Error;

/// Well-known keys.
pub mod keys {
    pub const CURRENT_SESSION: &str = "currentSession";
    /// Phase of the most recent session, mirrored for other surfaces; kept after stop.
    pub const PHASE: &str = "phase";
    pub const SESSION_SETTINGS: &str = "sessionSettings";
    pub const WORK_DOMAINS: &str = "workDomains";
    pub const EXTENSION_ENABLED: &str = "extensionEnabled";
    pub const MODE: &str = "mode";
    pub const GEMINI_API_KEY: &str = "geminiApiKey";
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored value could not be encoded or decoded.
    #[error("invalid value for {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One row of the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    pub key: String,
    /// `Value::Null` when the key was cleared.
    pub value: Value,
    pub revision: i64,
    pub updated_at: String,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    /// Revisions written through this connection that the change feed has
    /// not yet moved past.
    written: Vec<i64>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn,
            written: Vec::new(),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            written: Vec::new(),
        };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- value: JSON text, 'null' once cleared
            -- revision: global write counter, unique per write
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                revision INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kv_revision ON kv(revision);
            ",
        )?;
        Ok(())
    }

    // ── Raw key-value access ────────────────────────────────────────

    /// Reads the raw JSON stored under `key`. Cleared keys read as `None`.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>, DbError> {
        let text: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        let Some(text) = text else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&text).map_err(|source| DbError::Json {
            key: key.to_string(),
            source,
        })?;
        Ok((!value.is_null()).then_some(value))
    }

    /// Reads and decodes the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        self.get_value(key)?
            .map(|value| {
                serde_json::from_value(value).map_err(|source| DbError::Json {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Stores `value` under `key` and returns the new revision.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<i64, DbError> {
        let value = encode(key, value)?;
        self.write(&[(key, value)])
    }

    /// Clears `key`. The row stays, holding `null`, so watchers see the removal.
    pub fn clear(&mut self, key: &str) -> Result<i64, DbError> {
        self.write(&[(key, Value::Null)])
    }

    /// Writes all entries in one transaction, each under its own revision.
    fn write(&mut self, entries: &[(&str, Value)]) -> Result<i64, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut revision: i64 =
            tx.query_row("SELECT COALESCE(MAX(revision), 0) FROM kv", [], |row| row.get(0))?;
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let first = revision + 1;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO kv (key, value, revision, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    revision = excluded.revision,
                    updated_at = excluded.updated_at
                ",
            )?;
            for (key, value) in entries {
                revision += 1;
                stmt.execute(params![key, value.to_string(), revision, updated_at])?;
                tracing::trace!(key, revision, "stored");
            }
        }
        tx.commit()?;
        self.written.extend(first..=revision);
        Ok(revision)
    }

    /// Highest revision written so far; `0` for an empty store.
    pub fn current_revision(&self) -> Result<i64, DbError> {
        let revision = self
            .conn
            .query_row("SELECT COALESCE(MAX(revision), 0) FROM kv", [], |row| row.get(0))?;
        Ok(revision)
    }

    /// Keys written after `revision`, oldest first.
    pub fn changes_since(&self, revision: i64) -> Result<Vec<KeyChange>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT key, value, revision, updated_at
            FROM kv
            WHERE revision > ?1
            ORDER BY revision ASC
            ",
        )?;
        let rows = stmt.query_map([revision], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut changes = Vec::new();
        for row in rows {
            let (key, text, revision, updated_at) = row?;
            let value = serde_json::from_str(&text).map_err(|source| DbError::Json {
                key: key.clone(),
                source,
            })?;
            changes.push(KeyChange {
                key,
                value,
                revision,
                updated_at,
            });
        }
        Ok(changes)
    }

    /// Like [`Database::changes_since`], but leaves out keys whose latest
    /// write came through this connection.
    ///
    /// Returns the revision to pass on the next call along with the changes.
    pub fn foreign_changes_since(&mut self, revision: i64) -> Result<(i64, Vec<KeyChange>), DbError> {
        let changes = self.changes_since(revision)?;
        let cursor = changes.last().map_or(revision, |change| change.revision);
        let foreign = changes
            .into_iter()
            .filter(|change| !self.written.contains(&change.revision))
            .collect();
        self.written.retain(|&written| written > cursor);
        Ok((cursor, foreign))
    }

    // ── Typed accessors ─────────────────────────────────────────────

    pub fn current_session(&self) -> Result<Option<SessionRecord>, DbError> {
        self.get(keys::CURRENT_SESSION)
    }

    /// Stores or clears the session record. Starting a session also writes
    /// its phase under [`keys::PHASE`], which survives a stop.
    pub fn set_current_session(&mut self, record: Option<&SessionRecord>) -> Result<i64, DbError> {
        match record {
            Some(record) => {
                let session = encode(keys::CURRENT_SESSION, record)?;
                let phase = encode(keys::PHASE, &record.phase)?;
                self.write(&[(keys::CURRENT_SESSION, session), (keys::PHASE, phase)])
            }
            None => self.clear(keys::CURRENT_SESSION),
        }
    }

    /// Stored timer settings. Missing or unreadable values fall back to the
    /// defaults so a bad write cannot lock the user out of the timer.
    pub fn timer_settings(&self) -> Result<TimerSettings, DbError> {
        self.get_or_default(keys::SESSION_SETTINGS)
    }

    pub fn set_timer_settings(&mut self, settings: &TimerSettings) -> Result<i64, DbError> {
        self.set(keys::SESSION_SETTINGS, settings)
    }

    pub fn work_domains(&self) -> Result<WorkDomainSet, DbError> {
        self.get_or_default(keys::WORK_DOMAINS)
    }

    pub fn set_work_domains(&mut self, domains: &WorkDomainSet) -> Result<i64, DbError> {
        self.set(keys::WORK_DOMAINS, domains)
    }

    /// Kill switch for the distraction gate; on unless explicitly disabled.
    pub fn extension_enabled(&self) -> Result<bool, DbError> {
        Ok(self.get_or_default::<Option<bool>>(keys::EXTENSION_ENABLED)?.unwrap_or(true))
    }

    pub fn mode(&self) -> Result<Mode, DbError> {
        self.get_or_default(keys::MODE)
    }

    pub fn gating_config(&self) -> Result<GatingConfig, DbError> {
        Ok(GatingConfig {
            extension_enabled: self.extension_enabled()?,
            mode: self.mode()?,
        })
    }

    pub fn set_gating_config(&mut self, gating: &GatingConfig) -> Result<i64, DbError> {
        let enabled = encode(keys::EXTENSION_ENABLED, &gating.extension_enabled)?;
        let mode = encode(keys::MODE, &gating.mode)?;
        self.write(&[(keys::EXTENSION_ENABLED, enabled), (keys::MODE, mode)])
    }

    pub fn gemini_api_key(&self) -> Result<Option<String>, DbError> {
        Ok(self
            .get::<String>(keys::GEMINI_API_KEY)?
            .filter(|key| !key.trim().is_empty()))
    }

    pub fn set_gemini_api_key(&mut self, api_key: &str) -> Result<i64, DbError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return self.clear(keys::GEMINI_API_KEY);
        }
        self.set(keys::GEMINI_API_KEY, api_key)
    }

    fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, DbError> {
        match self.get(key) {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(DbError::Json { source, .. }) => {
                tracing::warn!(key, %source, "unreadable stored value, using default");
                Ok(T::default())
            }
            Err(err) => Err(err),
        }
    }
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value, DbError> {
    serde_json::to_value(value).map_err(|source| DbError::Json {
        key: key.to_string(),
        source,
    })
}

impl StateStore for Database {
    fn current_session(&self) -> Result<Option<SessionRecord>, StoreError> {
        Self::current_session(self).map_err(|err| StoreError::new(keys::CURRENT_SESSION, err))
    }

    fn set_current_session(&mut self, record: Option<&SessionRecord>) -> Result<(), StoreError> {
        Self::set_current_session(self, record)
            .map(|_| ())
            .map_err(|err| StoreError::new(keys::CURRENT_SESSION, err))
    }

    fn timer_settings(&self) -> Result<TimerSettings, StoreError> {
        Self::timer_settings(self).map_err(|err| StoreError::new(keys::SESSION_SETTINGS, err))
    }

    fn set_timer_settings(&mut self, settings: &TimerSettings) -> Result<(), StoreError> {
        Self::set_timer_settings(self, settings)
            .map(|_| ())
            .map_err(|err| StoreError::new(keys::SESSION_SETTINGS, err))
    }

    fn work_domains(&self) -> Result<WorkDomainSet, StoreError> {
        Self::work_domains(self).map_err(|err| StoreError::new(keys::WORK_DOMAINS, err))
    }

    fn set_work_domains(&mut self, domains: &WorkDomainSet) -> Result<(), StoreError> {
        Self::set_work_domains(self, domains)
            .map(|_| ())
            .map_err(|err| StoreError::new(keys::WORK_DOMAINS, err))
    }

    fn gating_config(&self) -> Result<GatingConfig, StoreError> {
        Self::gating_config(self).map_err(|err| StoreError::new(keys::MODE, err))
    }

    fn set_gating_config(&mut self, gating: &GatingConfig) -> Result<(), StoreError> {
        Self::set_gating_config(self, gating)
            .map(|_| ())
            .map_err(|err| StoreError::new(keys::MODE, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use sf_core::{Phase, WorkDomain};

    fn record(phase: Phase) -> SessionRecord {
        SessionRecord::begin(phase, 1500, DateTime::from_timestamp(1_750_000_000, 0).unwrap())
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_has_kv_table() {
        let db = Database::open_in_memory().unwrap();
        let mut stmt = db.conn.prepare("PRAGMA table_info(kv)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(columns, vec!["key", "value", "revision", "updated_at"]);
    }

    #[test]
    fn empty_store_reads_defaults() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.current_session().unwrap(), None);
        assert_eq!(db.timer_settings().unwrap(), TimerSettings::default());
        assert!(db.work_domains().unwrap().is_empty());
        assert_eq!(db.gating_config().unwrap(), GatingConfig::default());
        assert_eq!(db.gemini_api_key().unwrap(), None);
        assert_eq!(db.current_revision().unwrap(), 0);
    }

    #[test]
    fn session_write_records_phase() {
        let mut db = Database::open_in_memory().unwrap();
        let rest = record(Phase::Rest);
        db.set_current_session(Some(&rest)).unwrap();
        assert_eq!(db.current_session().unwrap(), Some(rest));
        assert_eq!(db.get::<Phase>(keys::PHASE).unwrap(), Some(Phase::Rest));

        db.set_current_session(None).unwrap();
        assert_eq!(db.current_session().unwrap(), None);
        assert_eq!(db.get::<Phase>(keys::PHASE).unwrap(), Some(Phase::Rest));
    }

    #[test]
    fn session_is_stored_with_camel_case_keys() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_current_session(Some(&record(Phase::Work))).unwrap();
        let raw = db.get_value(keys::CURRENT_SESSION).unwrap().unwrap();
        assert_eq!(raw["phase"], "work");
        assert_eq!(raw["durationSeconds"], 1500);
        assert_eq!(raw["paused"], false);
    }

    #[test]
    fn revisions_increase_per_write() {
        let mut db = Database::open_in_memory().unwrap();
        let first = db.set(keys::MODE, "focus").unwrap();
        let second = db.set(keys::MODE, "normal").unwrap();
        assert!(second > first);
        assert_eq!(db.current_revision().unwrap(), second);
    }

    #[test]
    fn changes_since_reports_updates_and_clears() {
        let mut db = Database::open_in_memory().unwrap();
        db.set(keys::MODE, "focus").unwrap();
        let checkpoint = db.current_revision().unwrap();

        db.set_current_session(Some(&record(Phase::Work))).unwrap();
        db.clear(keys::CURRENT_SESSION).unwrap();

        let changes = db.changes_since(checkpoint).unwrap();
        let changed: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(changed, vec![keys::PHASE, keys::CURRENT_SESSION]);
        assert_eq!(changes[1].value, Value::Null);
        assert!(changes[0].revision < changes[1].revision);
        assert!(db.changes_since(db.current_revision().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn foreign_changes_skip_own_writes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("studyfocus.db");
        let mut daemon = Database::open(&path).unwrap();
        let mut cli = Database::open(&path).unwrap();

        let (cursor, changes) = daemon.foreign_changes_since(0).unwrap();
        assert_eq!((cursor, changes), (0, Vec::new()));

        daemon.set(keys::MODE, "focus").unwrap();
        cli.set(keys::EXTENSION_ENABLED, &false).unwrap();
        daemon.set_current_session(Some(&record(Phase::Work))).unwrap();

        let (cursor, changes) = daemon.foreign_changes_since(cursor).unwrap();
        let changed: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(changed, vec![keys::EXTENSION_ENABLED]);
        assert_eq!(cursor, daemon.current_revision().unwrap());
        assert!(daemon.written.is_empty());

        // The other connection sees everything the daemon wrote.
        let (_, changes) = cli.foreign_changes_since(0).unwrap();
        let changed: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(changed, vec![keys::MODE, keys::CURRENT_SESSION, keys::PHASE]);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let mut db = Database::open_in_memory().unwrap();
        db.set(keys::SESSION_SETTINGS, "not an object").unwrap();
        assert_eq!(db.timer_settings().unwrap(), TimerSettings::default());
    }

    #[test]
    fn corrupt_session_is_an_error() {
        let mut db = Database::open_in_memory().unwrap();
        db.set(keys::CURRENT_SESSION, &42).unwrap();
        assert!(matches!(
            db.current_session(),
            Err(DbError::Json { key, .. }) if key == keys::CURRENT_SESSION
        ));
    }

    #[test]
    fn gating_config_round_trips_both_keys() {
        let mut db = Database::open_in_memory().unwrap();
        let gating = GatingConfig {
            extension_enabled: false,
            mode: Mode::new("normal"),
        };
        db.set_gating_config(&gating).unwrap();
        assert_eq!(db.get::<bool>(keys::EXTENSION_ENABLED).unwrap(), Some(false));
        assert_eq!(db.get::<String>(keys::MODE).unwrap().as_deref(), Some("normal"));
        assert_eq!(db.gating_config().unwrap(), gating);
    }

    #[test]
    fn stored_domains_are_revalidated_on_read() {
        let mut db = Database::open_in_memory().unwrap();
        db.set(keys::WORK_DOMAINS, &["school.edu", "not a domain", "WWW.docs.rs"])
            .unwrap();
        let domains = db.work_domains().unwrap();
        assert_eq!(domains.to_vec(), vec!["docs.rs", "school.edu"]);

        let mut domains = WorkDomainSet::new();
        domains.insert(WorkDomain::parse("github.com").unwrap());
        db.set_work_domains(&domains).unwrap();
        assert_eq!(db.work_domains().unwrap(), domains);
    }

    #[test]
    fn blank_api_key_clears_it() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_gemini_api_key("  key-123 ").unwrap();
        assert_eq!(db.gemini_api_key().unwrap().as_deref(), Some("key-123"));
        db.set_gemini_api_key("").unwrap();
        assert_eq!(db.gemini_api_key().unwrap(), None);
    }

    #[test]
    fn two_connections_share_state() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("studyfocus.db");
        let mut writer = Database::open(&path).unwrap();
        let reader = Database::open(&path).unwrap();

        let rest = record(Phase::Rest);
        writer.set_current_session(Some(&rest)).unwrap();
        assert_eq!(reader.current_session().unwrap(), Some(rest));
        assert_eq!(reader.current_revision().unwrap(), writer.current_revision().unwrap());
    }

    #[test]
    fn state_store_errors_name_the_key() {
        let mut db = Database::open_in_memory().unwrap();
        db.set(keys::CURRENT_SESSION, "garbage").unwrap();
        let err = StateStore::current_session(&db).unwrap_err();
        assert_eq!(err.key, keys::CURRENT_SESSION);
    }
}
