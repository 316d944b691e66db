//! Persist-before-notify guarantees of the reconciliation cycle.

use std::sync::Arc;

use gradewatch::reconcile::{AbortReason, CycleOutcome, ReconcileCycle, Trigger};
use gradewatch::store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
use tokio_util::sync::CancellationToken;

use crate::helpers::{
    CrashingNotifier, FakeObs, ReadOnlyStore, RecordingNotifier, configured, midterms,
};

#[tokio::test]
async fn crash_after_persisting_never_repeats_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("watch.db");
    let obs = Arc::new(FakeObs::new());

    let user = {
        let store = Arc::new(SqliteSnapshotStore::open(&db).unwrap());
        let user = configured(&*store, 1, true, Some(&midterms("80")));
        obs.serve(user, midterms("95"));

        let cycle = ReconcileCycle::new(store, obs.clone(), Arc::new(CrashingNotifier));
        let crashed = tokio::spawn(async move {
            cycle
                .run(user, Trigger::Sweep, &CancellationToken::new())
                .await
        })
        .await;
        assert!(crashed.unwrap_err().is_panic());
        user
    };

    // Restart: fresh connection to the same database file.
    let store = Arc::new(SqliteSnapshotStore::open(&db).unwrap());
    assert_eq!(
        store.get(user).unwrap().unwrap().snapshot,
        Some(midterms("95"))
    );

    let notifier = Arc::new(RecordingNotifier::new());
    let cycle = ReconcileCycle::new(store, obs, notifier.clone());
    let report = cycle
        .run(user, Trigger::Sweep, &CancellationToken::new())
        .await;

    let CycleOutcome::Done(summary) = report.outcome else {
        panic!("rerun should finish");
    };
    assert!(summary.events.is_empty());
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn failed_persist_sends_nothing() {
    let store = Arc::new(ReadOnlyStore {
        inner: MemorySnapshotStore::new(),
    });
    let user = configured(&store.inner, 1, true, Some(&midterms("80")));
    let obs = Arc::new(FakeObs::new());
    obs.serve(user, midterms("95"));
    let notifier = Arc::new(RecordingNotifier::new());

    let cycle = ReconcileCycle::new(store.clone(), obs, notifier.clone());
    let report = cycle
        .run(user, Trigger::Sweep, &CancellationToken::new())
        .await;

    assert!(matches!(
        report.outcome,
        CycleOutcome::Aborted(AbortReason::Store(_))
    ));
    assert!(notifier.messages().is_empty());
    assert_eq!(
        store.get(user).unwrap().unwrap().snapshot,
        Some(midterms("80"))
    );
}

#[tokio::test]
async fn cancelled_cycle_writes_nothing() {
    let store = Arc::new(MemorySnapshotStore::new());
    let user = configured(&*store, 1, true, Some(&midterms("80")));
    let obs = Arc::new(FakeObs::new());
    obs.hang(user);
    let notifier = Arc::new(RecordingNotifier::new());
    let cycle = ReconcileCycle::new(store.clone(), obs, notifier.clone());

    let cancel = CancellationToken::new();
    let run = cycle.run(user, Trigger::OnDemand, &cancel);
    tokio::pin!(run);
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(50), &mut run)
            .await
            .is_err()
    );
    cancel.cancel();
    let report = run.await;

    assert!(report.is_cancelled());
    assert!(notifier.messages().is_empty());
    assert_eq!(
        store.get(user).unwrap().unwrap().snapshot,
        Some(midterms("80"))
    );
}
