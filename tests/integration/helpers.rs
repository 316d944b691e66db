//! Shared fakes and fixtures for integration tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gradewatch::channels::{Notifier, TransportError};
use gradewatch::store::{SnapshotStore, StoreError, UserRecord};
use gradewatch::{GradeSource, GradeTable, UserKey};
use gradewatch_obs::FetchError;
use serde_json::json;

pub(crate) fn credential(user: UserKey) -> String {
    format!("SESSION={}", user.0)
}

/// Store a configured user with an optional baseline snapshot.
pub(crate) fn configured(
    store: &dyn SnapshotStore,
    key: i64,
    alarm: bool,
    snapshot: Option<&GradeTable>,
) -> UserKey {
    let user = UserKey(key);
    store.set_credential(user, &credential(user)).expect("credential");
    store.set_term(user, "2024-1").expect("term");
    store.set_alarm(user, alarm).expect("alarm");
    if let Some(table) = snapshot {
        store.put_snapshot(user, table).expect("snapshot");
    }
    user
}

pub(crate) fn midterms(value: &str) -> GradeTable {
    GradeTable::new()
        .with("CS101", "Midterm", value)
        .with("CS102", "Midterm", "70")
}

/// OBS response body for one unit. `courses` lists each course with its
/// grades in the order of `assessments`.
pub(crate) fn obs_body(assessments: &[&str], courses: &[(&str, &[&str])]) -> serde_json::Value {
    let label = |text: &str| json!({ "labelViewModel": { "languageMap": { "EN": text } } });
    let notes: Vec<_> = courses
        .iter()
        .map(|(course, values)| {
            json!({
                "labelViewModel": { "languageMap": { "EN": course } },
                "notTreeSet": { "items": values.iter().map(|v| label(v)).collect::<Vec<_>>() }
            })
        })
        .collect();
    json!({
        "ogrenciBirimList": [{
            "tnotlarNotes": notes,
            "sinavTurleriList": {
                "items": assessments.iter().map(|a| label(a)).collect::<Vec<_>>()
            }
        }]
    })
}

#[derive(Clone)]
enum Reply {
    Table(GradeTable),
    Status(u16),
    Hang,
}

/// In-process OBS stand-in keyed by credential.
#[derive(Default)]
pub(crate) struct FakeObs {
    replies: Mutex<HashMap<String, Reply>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeObs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn serve(&self, user: UserKey, table: GradeTable) {
        self.set(user, Reply::Table(table));
    }

    pub(crate) fn reject(&self, user: UserKey, status: u16) {
        self.set(user, Reply::Status(status));
    }

    pub(crate) fn hang(&self, user: UserKey) {
        self.set(user, Reply::Hang);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn set(&self, user: UserKey, reply: Reply) {
        self.replies
            .lock()
            .expect("replies")
            .insert(credential(user), reply);
    }
}

struct Leave<'a>(&'a AtomicUsize);

impl Drop for Leave<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GradeSource for FakeObs {
    async fn fetch(&self, credential: &str, _term: &str) -> Result<GradeTable, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _leave = Leave(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.replies.lock().expect("replies").get(credential).cloned();
        match reply {
            Some(Reply::Table(table)) => Ok(table),
            Some(Reply::Status(status)) => Err(FetchError::Status { status }),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(FetchError::Status { status: 404 }),
        }
    }
}

/// Records every delivered message.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<(UserKey, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn messages(&self) -> Vec<(UserKey, String)> {
        self.sent.lock().expect("sent").clone()
    }

    pub(crate) fn texts_for(&self, user: UserKey) -> Vec<String> {
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
        self.sent
            .lock()
            .expect("sent")
            .push((recipient, text.to_owned()));
        Ok(())
    }
}

/// Simulates the process dying on the first notification.
pub(crate) struct CrashingNotifier;

#[async_trait]
impl Notifier for CrashingNotifier {
    async fn notify(&self, _recipient: UserKey, _text: &str) -> Result<(), TransportError> {
        panic!("process crashed before delivering");
    }
}

/// Delegates to an inner store but fails every snapshot write.
pub(crate) struct ReadOnlyStore<S> {
    pub(crate) inner: S,
}

impl<S: SnapshotStore> SnapshotStore for ReadOnlyStore<S> {
    fn get(&self, key: UserKey) -> Result<Option<UserRecord>, StoreError> {
        self.inner.get(key)
    }

    fn put_snapshot(&self, _key: UserKey, _table: &GradeTable) -> Result<(), StoreError> {
        Err(StoreError::Io("disk full".to_owned()))
    }

    fn set_credential(&self, key: UserKey, credential: &str) -> Result<(), StoreError> {
        self.inner.set_credential(key, credential)
    }

    fn set_term(&self, key: UserKey, term: &str) -> Result<(), StoreError> {
        self.inner.set_term(key, term)
    }

    fn set_alarm(&self, key: UserKey, enabled: bool) -> Result<bool, StoreError> {
        self.inner.set_alarm(key, enabled)
    }

    fn list_eligible(&self) -> Result<Vec<UserKey>, StoreError> {
        self.inner.list_eligible()
    }
}
