//! Error taxonomy for task handlers.
//!
//! C4 needs to know, on a handler's `Err`, whether to retry (via C3's
//! backoff policy) or give up immediately -- so handlers return
//! [`HandlerError`] rather than a bare `anyhow::Error`. Benign
//! not-found and invariant-violation cases are distinguished too, since
//! they're handled without ever touching the retry counter.

use thiserror::Error;

/// Classification of a handler failure, driving C4's dispatch behavior.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Network 5xx/ratelimit, git lock contention, multiplexer not ready.
    /// The scheduler retries with backoff while attempts remain.
    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Agent exit failure, git rejection, 4xx. The scheduler exhausts
    /// attempts and the work is marked `failed`; a reimplementation must
    /// not keep retrying past this.
    #[error("permanent error: {0}")]
    Permanent(#[source] anyhow::Error),

    /// The Work row was deleted between scheduling and execution. Handled
    /// by marking the scheduled-task completed without side effects.
    #[error("work not found")]
    WorkNotFound,

    /// Duplicate bead assignment, unknown task kind, or any other
    /// invariant the source treats as a bug rather than an operational
    /// failure. Surfaced to the operator, never retried.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl HandlerError {
    /// Whether this error should be retried by the scheduler's backoff
    /// policy (as opposed to failing permanently on first occurrence).
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

/// Classification a VCS/PR-host collaborator attaches to its own
/// failures. Only the concrete adapter knows whether the exit code or
/// HTTP status it just saw is retryable (a git lock, a 5xx, a rate limit)
/// or not (a rejected push, a 404, a malformed request) -- so [`Vcs`] and
/// [`PrHost`] return this instead of a bare `anyhow::Error`, and handlers
/// propagate it into a [`HandlerError`] via `?` rather than flattening
/// every collaborator failure into `Transient` themselves.
///
/// [`Vcs`]: crate::collaborators::Vcs
/// [`PrHost`]: crate::collaborators::PrHost
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("permanent: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl CollaboratorError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self::Permanent(err.into())
    }
}

impl From<CollaboratorError> for HandlerError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Transient(e) => HandlerError::Transient(e),
            CollaboratorError::Permanent(e) => HandlerError::Permanent(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(HandlerError::Transient(anyhow::anyhow!("x")).is_retryable());
        assert!(!HandlerError::Permanent(anyhow::anyhow!("x")).is_retryable());
        assert!(!HandlerError::WorkNotFound.is_retryable());
        assert!(!HandlerError::InvariantViolation("bad".into()).is_retryable());
    }

    #[test]
    fn collaborator_error_classification_survives_the_conversion() {
        let transient: HandlerError = CollaboratorError::transient(anyhow::anyhow!("lock contention")).into();
        assert!(transient.is_retryable());

        let permanent: HandlerError = CollaboratorError::permanent(anyhow::anyhow!("404")).into();
        assert!(!permanent.is_retryable());
    }
}
