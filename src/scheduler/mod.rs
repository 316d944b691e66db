//! Fleet scheduling: running reconciliation cycles across all users.
//!
//! - [`FleetScheduler`]: bounded worker pool with per-user single flight,
//!   used by timer sweeps and on-demand refreshes alike
//! - [`SweepRunner`]: background task firing a sweep every interval
//! - [`SweepHistory`]: recent sweep reports for the admin gateway

pub mod fleet;
pub mod history;
pub mod runner;

pub use fleet::{FleetConfig, FleetScheduler, SweepReport};
pub use history::SweepHistory;
pub use runner::SweepRunner;
