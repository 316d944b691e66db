//! Fleet scheduler: runs reconciliation cycles for many users under a
//! shared concurrency bound.
//!
//! Two entry points feed the same pool:
//!
//! - [`FleetScheduler::sweep`] checks every eligible user, with a deadline
//! - [`FleetScheduler::trigger_on_demand`] refreshes one user now
//!
//! At most one cycle per user is in flight at any time. A second request
//! for the same user waits for the first to finish, so a `/get` during a
//! sweep never races the sweep's snapshot write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gradewatch_obs::{GradeSource, GradeTable};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::history::SweepHistory;
use crate::channels::Notifier;
use crate::config::SchedulerConfig;
use crate::reconcile::{AbortReason, CycleOutcome, CycleReport, ReconcileCycle, Trigger};
use crate::store::{SnapshotStore, UserKey};

/// Fleet scheduler configuration.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Cycles allowed in flight at once.
    pub max_concurrency: usize,
    /// Cycles of a sweep still running after this are cancelled.
    pub sweep_deadline: Duration,
    /// Deadline for one on-demand refresh, including time spent queued.
    pub on_demand_deadline: Duration,
    /// Sweep reports kept in [`SweepHistory`].
    pub history_limit: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for FleetConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            sweep_deadline: Duration::from_secs(config.sweep_deadline_secs),
            on_demand_deadline: Duration::from_secs(config.on_demand_deadline_secs),
            history_limit: config.history_limit,
        }
    }
}

/// Aggregate result of one sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Eligible users a cycle was started for.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Cycles stopped by the deadline or shutdown.
    pub cancelled: usize,
    /// Change notifications delivered across all cycles.
    pub notifications_sent: usize,
    pub deadline_hit: bool,
    /// Set when the eligible users could not be listed at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}

impl SweepReport {
    pub(crate) fn begin() -> Self {
        Self {
            sweep_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            notifications_sent: 0,
            deadline_hit: false,
            listing_error: None,
        }
    }

    fn record(&mut self, cycle: &CycleReport) {
        match &cycle.outcome {
            CycleOutcome::Done(summary) => {
                self.succeeded += 1;
                self.notifications_sent += summary.delivered;
            }
            CycleOutcome::Aborted(AbortReason::Cancelled) => self.cancelled += 1,
            CycleOutcome::Aborted(_) => self.failed += 1,
        }
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Per-user async locks, created on demand and dropped when unused.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    fn handle(&self, user: UserKey) -> UserLockHandle<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user)
            .or_default()
            .clone();
        UserLockHandle {
            registry: self,
            user,
            lock,
        }
    }

    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Reference to one user's lock. Removes the map entry when the last
/// handle goes away.
struct UserLockHandle<'a> {
    registry: &'a UserLocks,
    user: UserKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for UserLockHandle<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .registry
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Map entry plus this handle: nobody else is waiting.
        if let Some(current) = locks.get(&self.user)
            && Arc::ptr_eq(current, &self.lock)
            && Arc::strong_count(&self.lock) == 2
        {
            locks.remove(&self.user);
        }
    }
}

struct FleetInner<F> {
    cycle: ReconcileCycle<F>,
    store: Arc<dyn SnapshotStore>,
    permits: Arc<Semaphore>,
    locks: UserLocks,
    config: FleetConfig,
    history: SweepHistory,
    shutdown: CancellationToken,
}

impl<F: GradeSource> FleetInner<F> {
    /// Run one cycle once the user's lock and a pool permit are held.
    ///
    /// Cancellation while queued for either aborts without running.
    async fn run_exclusive(
        &self,
        user: UserKey,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let handle = self.locks.handle(user);
        let cancelled = || CycleReport::aborted(user, trigger, AbortReason::Cancelled);

        let _turn = match handle.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(user = %user, %trigger, "waiting for in-flight cycle of the same user");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return cancelled(),
                    guard = handle.lock.lock() => guard,
                }
            }
        };
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return cancelled(),
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return cancelled(),
            },
        };

        self.cycle.run(user, trigger, cancel).await
    }
}

/// Concurrency-bounded driver of reconciliation cycles.
///
/// Cheap to clone; clones share the pool, locks and history.
pub struct FleetScheduler<F> {
    inner: Arc<FleetInner<F>>,
}

impl<F> Clone for FleetScheduler<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: GradeSource + 'static> FleetScheduler<F> {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        source: Arc<F>,
        notifier: Arc<dyn Notifier>,
        config: FleetConfig,
    ) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        let history = SweepHistory::new(config.history_limit);
        Self {
            inner: Arc::new(FleetInner {
                cycle: ReconcileCycle::new(Arc::clone(&store), source, notifier),
                store,
                permits: Arc::new(Semaphore::new(max_concurrency)),
                locks: UserLocks::default(),
                config,
                history,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Run a cycle for every eligible user and wait for all of them.
    ///
    /// Cycles still running when the sweep deadline passes are cancelled
    /// and counted as such. Never fails: problems show up in the report.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::begin();
        let sweep_id = report.sweep_id;

        let users = match self.inner.store.list_eligible() {
            Ok(users) => users,
            Err(err) => {
                error!(%sweep_id, error = %err, "failed to list eligible users");
                report.listing_error = Some(err.to_string());
                report.finish();
                self.inner.history.push(report.clone());
                return report;
            }
        };
        report.attempted = users.len();
        info!(%sweep_id, users = users.len(), "sweep started");

        let token = self.inner.shutdown.child_token();
        let mut cycles = JoinSet::new();
        for user in users {
            let inner = Arc::clone(&self.inner);
            let token = token.clone();
            cycles.spawn(async move { inner.run_exclusive(user, Trigger::Sweep, &token).await });
        }

        let deadline = tokio::time::sleep(self.inner.config.sweep_deadline);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = cycles.join_next() => match joined {
                    None => break,
                    Some(Ok(cycle)) => report.record(&cycle),
                    Some(Err(err)) => {
                        error!(%sweep_id, error = %err, "sweep cycle panicked");
                        report.failed += 1;
                    }
                },
                () = &mut deadline, if !token.is_cancelled() => {
                    warn!(%sweep_id, remaining = cycles.len(), "sweep deadline reached, cancelling remaining cycles");
                    report.deadline_hit = true;
                    token.cancel();
                }
            }
        }

        report.finish();
        info!(
            %sweep_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            notifications = report.notifications_sent,
            "sweep finished"
        );
        self.inner.history.push(report.clone());
        report
    }

    /// Refresh one user now, regardless of their alarm setting.
    ///
    /// Runs the regular cycle (so change notifications still follow the
    /// alarm flag) and returns the fetched table for a direct reply.
    pub async fn trigger_on_demand(&self, user: UserKey) -> Result<GradeTable, AbortReason> {
        let token = self.inner.shutdown.child_token();
        let run = self.inner.run_exclusive(user, Trigger::OnDemand, &token);
        tokio::pin!(run);

        let report = match tokio::time::timeout(self.inner.config.on_demand_deadline, &mut run).await
        {
            Ok(report) => report,
            Err(_) => {
                warn!(user = %user, "on-demand refresh deadline reached, cancelling");
                token.cancel();
                run.await
            }
        };
        report.into_table()
    }

    /// Recent sweep reports.
    pub fn history(&self) -> &SweepHistory {
        &self.inner.history
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Cancel running and queued cycles and stop the sweep runner.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Users with a cycle running or queued.
    pub fn busy_users(&self) -> usize {
        self.inner.locks.len()
    }
}
