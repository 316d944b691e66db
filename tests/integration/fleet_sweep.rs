//! Fleet scheduler behaviour over a real SQLite store.

use std::sync::Arc;
use std::time::Duration;

use gradewatch::UserKey;
use gradewatch::grades::format::FETCH_ADVISORY;
use gradewatch::scheduler::{FleetConfig, FleetScheduler};
use gradewatch::store::{SnapshotStore, SqliteSnapshotStore};

use crate::helpers::{FakeObs, RecordingNotifier, configured, midterms};

fn config(max_concurrency: usize, deadline: Duration) -> FleetConfig {
    FleetConfig {
        max_concurrency,
        sweep_deadline: deadline,
        on_demand_deadline: deadline,
        history_limit: 16,
    }
}

struct Fleet {
    _dir: tempfile::TempDir,
    store: Arc<SqliteSnapshotStore>,
    obs: Arc<FakeObs>,
    notifier: Arc<RecordingNotifier>,
    fleet: FleetScheduler<FakeObs>,
}

fn fleet(obs: FakeObs, config: FleetConfig) -> Fleet {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteSnapshotStore::open(&dir.path().join("watch.db")).unwrap());
    let obs = Arc::new(obs);
    let notifier = Arc::new(RecordingNotifier::new());
    let fleet = FleetScheduler::new(store.clone(), obs.clone(), notifier.clone(), config);
    Fleet {
        _dir: dir,
        store,
        obs,
        notifier,
        fleet,
    }
}

#[tokio::test]
async fn a_failing_user_is_isolated_wherever_it_sits() {
    const USERS: i64 = 6;
    for failing in 1..=USERS {
        let f = fleet(FakeObs::new(), config(3, Duration::from_secs(30)));
        for key in 1..=USERS {
            let user = configured(&*f.store, key, true, Some(&midterms("80")));
            if key == failing {
                f.obs.reject(user, 401);
            } else {
                f.obs.serve(user, midterms("85"));
            }
        }

        let report = f.fleet.sweep().await;

        assert_eq!(report.attempted, USERS as usize);
        assert_eq!(report.succeeded, USERS as usize - 1);
        assert_eq!(report.failed, 1);
        let advisories: Vec<UserKey> = f
            .notifier
            .messages()
            .into_iter()
            .filter(|(_, text)| text == FETCH_ADVISORY)
            .map(|(user, _)| user)
            .collect();
        assert_eq!(advisories, vec![UserKey(failing)]);
        assert_eq!(report.notifications_sent, USERS as usize - 1);

        let untouched = f.store.get(UserKey(failing)).unwrap().unwrap();
        assert_eq!(untouched.snapshot, Some(midterms("80")));
    }
}

#[tokio::test(start_paused = true)]
async fn in_flight_fetches_stay_within_the_pool() {
    let f = fleet(
        FakeObs::with_delay(Duration::from_millis(250)),
        config(2, Duration::from_secs(30)),
    );
    for key in 1..=8 {
        let user = configured(&*f.store, key, true, None);
        f.obs.serve(user, midterms("80"));
    }

    let report = f.fleet.sweep().await;

    assert_eq!(report.succeeded, 8);
    assert_eq!(f.obs.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_leaves_hung_users_untouched() {
    let f = fleet(FakeObs::new(), config(4, Duration::from_secs(10)));
    let fine = configured(&*f.store, 1, true, Some(&midterms("80")));
    let hung = configured(&*f.store, 2, true, Some(&midterms("80")));
    f.obs.serve(fine, midterms("90"));
    f.obs.hang(hung);

    let report = f.fleet.sweep().await;

    assert!(report.deadline_hit);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(
        f.store.get(hung).unwrap().unwrap().snapshot,
        Some(midterms("80"))
    );
    assert!(f.notifier.texts_for(hung).is_empty());
    assert_eq!(
        f.store.get(fine).unwrap().unwrap().snapshot,
        Some(midterms("90"))
    );
}

#[tokio::test(start_paused = true)]
async fn on_demand_is_serialized_behind_the_sweep() {
    let f = fleet(
        FakeObs::with_delay(Duration::from_secs(5)),
        config(4, Duration::from_secs(60)),
    );
    let user = configured(&*f.store, 1, true, Some(&midterms("80")));
    f.obs.serve(user, midterms("85"));

    let sweep = tokio::spawn({
        let fleet = f.fleet.clone();
        async move { fleet.sweep().await }
    });
    while f.obs.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let table = f.fleet.trigger_on_demand(user).await.unwrap();
    let report = sweep.await.unwrap();

    assert_eq!(table, midterms("85"));
    assert_eq!(report.succeeded, 1);
    assert_eq!(f.obs.calls(), 2);
    assert_eq!(f.obs.max_in_flight(), 1);
    assert_eq!(
        f.notifier.texts_for(user),
        vec!["The Midterm for CS101 has been updated from 80 to 85.".to_owned()]
    );
}

#[tokio::test]
async fn alarm_off_users_are_skipped_by_sweeps() {
    let f = fleet(FakeObs::new(), config(2, Duration::from_secs(30)));
    let on = configured(&*f.store, 1, true, None);
    let off = configured(&*f.store, 2, false, None);
    f.obs.serve(on, midterms("80"));
    f.obs.serve(off, midterms("80"));

    let report = f.fleet.sweep().await;

    assert_eq!(report.attempted, 1);
    assert_eq!(f.obs.calls(), 1);
    assert!(f.store.get(off).unwrap().unwrap().snapshot.is_none());
}
