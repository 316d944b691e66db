//! SQLite-backed snapshot store.
//!
//! A single database file holds one `users` row per Telegram chat. Every
//! trait operation is one SQL statement, so each runs in its own implicit
//! transaction and a crash can never leave a half-written snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use gradewatch_obs::GradeTable;
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::{SnapshotStore, StoreError, UserKey, UserRecord, now_epoch_secs};

/// SQLite-backed [`SnapshotStore`].
///
/// Thread-safe via an internal `Mutex<Connection>`. The mutex is only held
/// for the duration of one statement and never across an `.await`.
pub struct SqliteSnapshotStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// Applies the schema if the database is new.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "opened snapshot store");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// A private in-memory database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    /// Number of stored users, eligible or not.
    pub fn user_count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn get(&self, key: UserKey) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT cookie, donem_id, alarm, grades, created_at, updated_at, last_checked_at \
                 FROM users WHERE user_key = ?1",
                params![key.0],
                |row| {
                    Ok(StoredRow {
                        cookie: row.get(0)?,
                        donem_id: row.get(1)?,
                        alarm: row.get(2)?,
                        grades: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                        last_checked_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        drop(conn);

        row.map(|row| row.into_record(key)).transpose()
    }

    fn put_snapshot(&self, key: UserKey, table: &GradeTable) -> Result<(), StoreError> {
        let grades = serde_json::to_string(table)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE users SET grades = ?2, last_checked_at = ?3 WHERE user_key = ?1",
            params![key.0, grades, to_sql_secs(now_epoch_secs())],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(key));
        }
        Ok(())
    }

    fn set_credential(&self, key: UserKey, credential: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (user_key, cookie, created_at, updated_at) VALUES (?1, ?2, ?3, ?3) \
             ON CONFLICT(user_key) DO UPDATE SET cookie = excluded.cookie, \
             updated_at = excluded.updated_at",
            params![key.0, credential, to_sql_secs(now_epoch_secs())],
        )?;
        Ok(())
    }

    fn set_term(&self, key: UserKey, term: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (user_key, donem_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3) \
             ON CONFLICT(user_key) DO UPDATE SET donem_id = excluded.donem_id, \
             updated_at = excluded.updated_at",
            params![key.0, term, to_sql_secs(now_epoch_secs())],
        )?;
        Ok(())
    }

    fn set_alarm(&self, key: UserKey, enabled: bool) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE users SET alarm = ?2, updated_at = ?3 WHERE user_key = ?1",
            params![key.0, enabled, to_sql_secs(now_epoch_secs())],
        )?;
        Ok(changed > 0)
    }

    fn list_eligible(&self) -> Result<Vec<UserKey>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_key FROM users \
             WHERE alarm = 1 AND TRIM(cookie) <> '' AND TRIM(donem_id) <> '' \
             ORDER BY last_checked_at IS NOT NULL, last_checked_at, user_key",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut keys = Vec::new();
        for r in rows {
            keys.push(UserKey(r?));
        }
        Ok(keys)
    }
}

struct StoredRow {
    cookie: String,
    donem_id: String,
    alarm: bool,
    grades: Option<String>,
    created_at: i64,
    updated_at: i64,
    last_checked_at: Option<i64>,
}

impl StoredRow {
    fn into_record(self, key: UserKey) -> Result<UserRecord, StoreError> {
        let snapshot = match self.grades.as_deref() {
            Some(json) => Some(serde_json::from_str::<GradeTable>(json)?),
            None => None,
        };
        Ok(UserRecord {
            key,
            credential: self.cookie,
            term: self.donem_id,
            alarm_enabled: self.alarm,
            snapshot,
            created_at: from_sql_secs(self.created_at),
            updated_at: from_sql_secs(self.updated_at),
            last_checked_at: self.last_checked_at.map(from_sql_secs),
        })
    }
}

fn to_sql_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn from_sql_secs(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or_default()
}
