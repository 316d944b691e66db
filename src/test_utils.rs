//! Shared test doubles used across unit test modules.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gradewatch_obs::{FetchError, GradeSource, GradeTable};

use crate::channels::{Notifier, TransportError};
use crate::store::{SnapshotStore, UserKey};

/// Credential the fixtures store for `user`; [`ScriptedSource`] keys its
/// scripts on it.
pub fn credential_for(user: UserKey) -> String {
    format!("SESSION=user-{}", user.0)
}

/// Create a configured user, optionally with a stored snapshot.
pub fn configured_user(
    store: &dyn SnapshotStore,
    key: i64,
    alarm: bool,
    snapshot: Option<GradeTable>,
) -> UserKey {
    let user = UserKey(key);
    store.set_credential(user, &credential_for(user)).unwrap();
    store.set_term(user, "42").unwrap();
    store.set_alarm(user, alarm).unwrap();
    if let Some(table) = snapshot {
        store.put_snapshot(user, &table).unwrap();
    }
    user
}

#[derive(Clone)]
enum Script {
    Table(GradeTable),
    Fail(u16),
    Hang,
}

/// [`GradeSource`] that answers from per-user scripts.
///
/// Unscripted credentials get a 404. Tracks call counts and how many
/// fetches were in flight at once.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Script>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_table(&self, user: UserKey, table: GradeTable) {
        self.script(user, Script::Table(table));
    }

    pub fn fail(&self, user: UserKey, status: u16) {
        self.script(user, Script::Fail(status));
    }

    /// Fetches for `user` never complete.
    pub fn hang(&self, user: UserKey) {
        self.script(user, Script::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script(&self, user: UserKey, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(credential_for(user), script);
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GradeSource for ScriptedSource {
    async fn fetch(&self, credential: &str, _term: &str) -> Result<GradeTable, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let script = self.scripts.lock().unwrap().get(credential).cloned();
        match script {
            Some(Script::Table(table)) => Ok(table),
            Some(Script::Fail(status)) => Err(FetchError::Status { status }),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(FetchError::Status { status: 404 }),
        }
    }
}

/// [`Notifier`] that records deliveries and can be told to fail some.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserKey, String)>>,
    fail_patterns: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every message containing `pattern`.
    pub fn fail_when_contains(&self, pattern: &str) {
        self.fail_patterns.lock().unwrap().push(pattern.to_owned());
    }

    pub fn messages(&self) -> Vec<(UserKey, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, user: UserKey) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: UserKey, text: &str) -> Result<(), TransportError> {
        let fail = self
            .fail_patterns
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| text.contains(pattern.as_str()));
        if fail {
            return Err(TransportError::Send("scripted failure".to_owned()));
        }
        self.sent.lock().unwrap().push((recipient, text.to_owned()));
        Ok(())
    }
}
