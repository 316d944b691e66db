//! Gradewatch: watches a university student information system (OBS) for
//! grade changes and notifies students over Telegram.
//!
//! # Architecture
//!
//! - **Store**: per-user credential, preferences and last known grades
//! - **Reconciliation cycle**: fetch → diff → persist → notify for one user
//! - **Fleet scheduler**: runs cycles for all users with a concurrency bound,
//!   per-user single flight and a sweep deadline
//! - **Channels**: Telegram long polling, outbound pacing and the command
//!   layer (`/start`, `/cookie`, `/donemid`, `/alarm`, `/get`)
//! - **Gateway**: optional admin HTTP surface
//!
//! Fetching and decoding OBS grade tables lives in the `gradewatch-obs`
//! crate.

pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod grades;
pub mod logging;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod watch_dirs;

#[cfg(test)]
mod test_utils;

pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use gradewatch_obs::{GradeSource, GradeTable};
pub use reconcile::{AbortReason, CycleReport, ReconcileCycle, Trigger};
pub use scheduler::{FleetScheduler, SweepReport};
pub use store::{SnapshotStore, UserKey};
