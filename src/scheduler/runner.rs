//! Sweep background loop.
//!
//! Spawns a tokio task that fires [`FleetScheduler::sweep`] every interval.
//! A sweep that overruns the interval delays the next one instead of
//! stacking sweeps on top of each other.

use std::time::Duration;

use gradewatch_obs::GradeSource;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::fleet::FleetScheduler;

/// Shortest interval the runner accepts.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically sweeps the fleet until the scheduler shuts down.
pub struct SweepRunner<F> {
    fleet: FleetScheduler<F>,
    interval: Duration,
    startup_sweep: bool,
}

impl<F: GradeSource + 'static> SweepRunner<F> {
    pub fn new(fleet: FleetScheduler<F>, interval: Duration) -> Self {
        Self {
            fleet,
            interval: interval.max(MIN_INTERVAL),
            startup_sweep: true,
        }
    }

    /// Whether the first sweep runs immediately or after one interval.
    #[must_use]
    pub fn with_startup_sweep(mut self, enabled: bool) -> Self {
        self.startup_sweep = enabled;
        self
    }

    /// Start the loop. It ends when the fleet's shutdown token fires.
    pub fn run(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let cancel = self.fleet.shutdown_token();
            info!(interval_secs = self.interval.as_secs(), "sweep runner started");

            let first = if self.startup_sweep {
                Instant::now()
            } else {
                Instant::now() + self.interval
            };
            let mut ticker = tokio::time::interval_at(first, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let report = self.fleet.sweep().await;
                debug!(sweep_id = %report.sweep_id, "next sweep in {}s", self.interval.as_secs());
            }
            info!("sweep runner stopped");
        })
    }
}
