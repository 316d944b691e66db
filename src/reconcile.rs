//! The per-user reconciliation cycle: fetch, diff, persist, notify.
//!
//! A cycle moves through `Fetching → Diffing → Persisting → Notifying →
//! Done`. It can abort while fetching (bad credentials, OBS down,
//! cancellation) or while persisting (store failure). The snapshot is always
//! written before any change notification goes out, so a crash between the
//! two loses notifications but never repeats them: the next cycle diffs
//! against the already-persisted table.
//!
//! Cancellation is only observed while fetching. Once the new table is
//! being persisted the cycle runs to completion, so a cancelled cycle has
//! never written anything.

use std::fmt;
use std::sync::Arc;

use gradewatch_obs::{FetchError, GradeSource, GradeTable};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::channels::Notifier;
use crate::grades::format::{FETCH_ADVISORY, event_message};
use crate::grades::{Baseline, ChangeEvent, diff};
use crate::store::{SnapshotStore, StoreError, UserKey};

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Timer sweep over all eligible users.
    Sweep,
    /// A user asked for fresh grades (`/get`).
    OnDemand,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sweep => f.write_str("sweep"),
            Self::OnDemand => f.write_str("on_demand"),
        }
    }
}

/// Why a cycle stopped before `Done`.
#[derive(Debug, thiserror::Error)]
pub enum AbortReason {
    #[error("no such user")]
    UnknownUser,

    #[error("cookie or donemid not set")]
    NotConfigured,

    #[error("fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("snapshot store failed: {0}")]
    Store(#[source] StoreError),

    #[error("cancelled")]
    Cancelled,
}

/// Result of a cycle that reached `Done`.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// The table that was fetched and persisted.
    pub table: GradeTable,
    /// Changes found against the previous snapshot.
    pub events: Vec<ChangeEvent>,
    /// Events whose notification was accepted by the notifier.
    pub delivered: usize,
    /// Events whose notification failed.
    pub undelivered: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Done(CycleSummary),
    Aborted(AbortReason),
}

/// What happened to one user in one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub user: UserKey,
    pub trigger: Trigger,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub(crate) fn aborted(user: UserKey, trigger: Trigger, reason: AbortReason) -> Self {
        Self {
            user,
            trigger,
            outcome: CycleOutcome::Aborted(reason),
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Done(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Aborted(AbortReason::Cancelled))
    }

    /// The fetched table, or why there is none.
    pub fn into_table(self) -> Result<GradeTable, AbortReason> {
        match self.outcome {
            CycleOutcome::Done(summary) => Ok(summary.table),
            CycleOutcome::Aborted(reason) => Err(reason),
        }
    }
}

/// Runs reconciliation cycles against injected collaborators.
///
/// Holds no per-user state; everything a cycle needs comes from the store.
pub struct ReconcileCycle<F> {
    store: Arc<dyn SnapshotStore>,
    source: Arc<F>,
    notifier: Arc<dyn Notifier>,
}

impl<F> Clone for ReconcileCycle<F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<F: GradeSource> ReconcileCycle<F> {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        source: Arc<F>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
        }
    }

    /// Run one cycle for `user`.
    ///
    /// Never fails as a whole: every outcome, including aborts, is described
    /// by the returned report.
    pub async fn run(
        &self,
        user: UserKey,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let abort = |reason: AbortReason| {
            match &reason {
                AbortReason::Cancelled => {
                    tracing::debug!(user = %user, %trigger, "cycle cancelled");
                }
                reason => tracing::warn!(user = %user, %trigger, %reason, "cycle aborted"),
            }
            CycleReport::aborted(user, trigger, reason)
        };

        if cancel.is_cancelled() {
            return abort(AbortReason::Cancelled);
        }

        let record = match self.store.get(user) {
            Ok(Some(record)) => record,
            Ok(None) => return abort(AbortReason::UnknownUser),
            Err(err) => return abort(AbortReason::Store(err)),
        };
        if !record.is_configured() {
            return abort(AbortReason::NotConfigured);
        }

        tracing::debug!(user = %user, %trigger, "fetching grades");
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return abort(AbortReason::Cancelled),
            result = self.source.fetch(&record.credential, &record.term) => result,
        };
        let table = match fetched {
            Ok(table) => table,
            Err(err) => {
                self.deliver_advisory(user).await;
                return abort(AbortReason::Fetch(err));
            }
        };

        tracing::debug!(user = %user, courses = table.len(), "diffing against snapshot");
        let baseline = Baseline::from_stored(record.snapshot);
        let events = diff(&baseline, &table, record.alarm_enabled);

        tracing::debug!(user = %user, events = events.len(), "persisting snapshot");
        if let Err(err) = self.store.put_snapshot(user, &table) {
            return abort(AbortReason::Store(err));
        }

        let mut delivered = 0;
        let mut undelivered = 0;
        if !events.is_empty() {
            tracing::debug!(user = %user, events = events.len(), "notifying");
        }
        for event in &events {
            match self.notifier.notify(user, &event_message(event)).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    undelivered += 1;
                    tracing::warn!(
                        user = %user,
                        course = event.course(),
                        assessment = event.assessment(),
                        error = %err,
                        "failed to deliver grade notification"
                    );
                }
            }
        }

        tracing::debug!(user = %user, %trigger, delivered, undelivered, "cycle done");
        CycleReport {
            user,
            trigger,
            outcome: CycleOutcome::Done(CycleSummary {
                table,
                events,
                delivered,
                undelivered,
            }),
        }
    }

    async fn deliver_advisory(&self, user: UserKey) {
        if let Err(err) = self.notifier.notify(user, FETCH_ADVISORY).await {
            tracing::warn!(user = %user, error = %err, "failed to deliver fetch advisory");
        }
    }
}
