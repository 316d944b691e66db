//! Trait definition for grade sources.
//!
//! [`ObsClient`](crate::ObsClient) is the production implementation; tests
//! and alternative deployments plug in their own.

use crate::error::FetchError;
use crate::types::GradeTable;

/// Something that can produce a user's current [`GradeTable`].
///
/// Implementations own their retry policy: a returned error is final for
/// this attempt, and [`FetchError::is_retryable`] only tells the caller what
/// kind of failure it was.
///
/// Cancellation is cooperative through drop: dropping the returned future
/// must abandon the request without side effects.
///
/// All implementations must be `Send + Sync` so one source can serve many
/// concurrent cycles.
pub trait GradeSource: Send + Sync {
    /// Fetch the grade table for the given session credential and term.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails after the
    /// implementation's retries, or the response cannot be decoded.
    fn fetch(
        &self,
        credential: &str,
        term: &str,
    ) -> impl std::future::Future<Output = Result<GradeTable, FetchError>> + Send;
}
