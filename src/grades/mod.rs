//! Grade snapshots and the change detection built on them.
//!
//! - [`diff`]: compares a stored [`Baseline`] with a freshly fetched table
//! - [`format`]: user-facing texts for change events and command replies

pub mod diff;
pub mod format;

pub use diff::{Baseline, ChangeEvent, diff};
pub use gradewatch_obs::{CourseGrades, GradeTable};
