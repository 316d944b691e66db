//! In-memory snapshot store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use gradewatch_obs::GradeTable;

use super::{SnapshotStore, StoreError, UserKey, UserRecord, now_epoch_secs};

/// [`SnapshotStore`] backed by a map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    users: Mutex<BTreeMap<UserKey, UserRecord>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole record. Handy for seeding fixtures.
    pub fn insert(&self, record: UserRecord) -> Result<(), StoreError> {
        self.lock()?.insert(record.key, record);
        Ok(())
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.lock().map(|users| users.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<UserKey, UserRecord>>, StoreError> {
        self.users.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn upsert(&self, key: UserKey, apply: impl FnOnce(&mut UserRecord)) -> Result<(), StoreError> {
        let mut users = self.lock()?;
        let record = users.entry(key).or_insert_with(|| UserRecord::new(key));
        apply(record);
        record.updated_at = now_epoch_secs();
        Ok(())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, key: UserKey) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn put_snapshot(&self, key: UserKey, table: &GradeTable) -> Result<(), StoreError> {
        let mut users = self.lock()?;
        let record = users.get_mut(&key).ok_or(StoreError::NotFound(key))?;
        record.snapshot = Some(table.clone());
        record.last_checked_at = Some(now_epoch_secs());
        Ok(())
    }

    fn set_credential(&self, key: UserKey, credential: &str) -> Result<(), StoreError> {
        self.upsert(key, |record| record.credential = credential.to_owned())
    }

    fn set_term(&self, key: UserKey, term: &str) -> Result<(), StoreError> {
        self.upsert(key, |record| record.term = term.to_owned())
    }

    fn set_alarm(&self, key: UserKey, enabled: bool) -> Result<bool, StoreError> {
        let mut users = self.lock()?;
        match users.get_mut(&key) {
            Some(record) => {
                record.alarm_enabled = enabled;
                record.updated_at = now_epoch_secs();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_eligible(&self) -> Result<Vec<UserKey>, StoreError> {
        let users = self.lock()?;
        let mut eligible: Vec<&UserRecord> =
            users.values().filter(|record| record.is_eligible()).collect();
        eligible.sort_by_key(|record| {
            (
                record.last_checked_at.is_some(),
                record.last_checked_at,
                record.key,
            )
        });
        Ok(eligible.into_iter().map(|record| record.key).collect())
    }
}
