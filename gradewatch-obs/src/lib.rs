//! # gradewatch-obs
//!
//! Client for the OBS student information system's grade endpoint.
//!
//! This crate turns a user's session cookie and term id into a normalised
//! [`GradeTable`]. It knows nothing about users, storage or notifications;
//! gradewatch drives it through the [`GradeSource`] trait.
//!
//! ## Design
//!
//! - One `GET /ogrenci/not-gor?donemId=<term>` per fetch, with the headers the
//!   OBS web frontend sends
//! - Bounded retries with jittered backoff for transient failures only
//! - A circuit breaker so an OBS outage fails fast instead of stalling sweeps
//! - "Not announced" placeholders never reach the [`GradeTable`]
//!
//! ## Security
//!
//! - Session cookies are sent as sensitive header values and never logged
//! - Error messages do not contain credentials

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod source;
pub mod types;

pub use circuit_breaker::CircuitState;
pub use client::ObsClient;
pub use config::ObsConfig;
pub use decode::parse_grades;
pub use error::{FetchError, Result};
pub use source::GradeSource;
pub use types::{CourseGrades, GradeTable};

/// Fetch a grade table once with a throwaway client.
///
/// Convenience wrapper for tooling; long-running services should keep one
/// [`ObsClient`] so its circuit breaker and connection pool are shared.
///
/// # Errors
///
/// Same as [`ObsClient::new`] and [`GradeSource::fetch`].
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> gradewatch_obs::Result<()> {
/// let config = gradewatch_obs::ObsConfig::default();
/// let table = gradewatch_obs::fetch_grades("SESSION=abc", "123", &config).await?;
/// for (course, grades) in table.courses() {
///     println!("{course}: {} grades", grades.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn fetch_grades(credential: &str, term: &str, config: &ObsConfig) -> Result<GradeTable> {
    let client = ObsClient::new(config.clone())?;
    client.fetch(credential, term).await
}
