use thiserror::Error;

use warden_store::StoreError;

/// Why a platform-level apply/remove failed. Produced by
/// [`crate::external::EnforcementExecutor`] implementations; `Timeout` is
/// added by the scheduler when an attempt exceeds its deadline.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("missing platform privilege: {0}")]
    MissingPrivilege(String),
    #[error("subject {0} not found on the platform")]
    SubjectNotFound(u64),
    #[error("platform request failed: {0}")]
    Request(String),
    #[error("platform request timed out")]
    Timeout,
}

/// Everything a moderation command can fail with at the boundary.
///
/// `Validation`, `Authorization` and `RateLimited` are reported to the
/// invoker and never retried. `Store` aborts the whole command. `Executor`
/// from an initial apply is returned after the case has been persisted;
/// from a manual lift it is returned after the case has been put back into
/// the active set, so the command can simply be reissued. Executor failures
/// during scheduled reversal never surface here, they are logged and
/// retried by the safety sweep.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("invalid command input: {0}")]
    Validation(String),
    #[error("actor {actor} is not permitted to {action}")]
    Authorization { actor: u64, action: &'static str },
    #[error("actor {0} is issuing moderation commands too quickly")]
    RateLimited(u64),
    #[error("no matching warn or active sanction")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("platform enforcement failed: {0}")]
    Executor(#[from] ExecutorError),
}
