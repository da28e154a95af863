//! Transaction harness shared by both repository strategies.
//!
//! # Invariants
//! - The session is closed exactly once, including while unwinding.
//! - A transaction is never left active when the harness returns.
//! - A rollback failure outranks the failure that caused the rollback.

use super::{RepoError, RepoResult};
use crate::db::{PersistError, PersistResult};
use crate::session::Transactional;
use log::{debug, warn};
use scopeguard::ScopeGuard;
use std::time::Instant;

/// Opens a session, runs `work` inside one transaction and releases the
/// session on every exit path.
///
/// # Errors
/// - Errors from `open` pass through unchanged.
/// - `Session` when `begin` fails, or when closing fails after success.
/// - `TransactionFailed` when `work` or `commit` fails and rollback succeeds.
/// - `RollbackFailed` when rolling back fails; the original error is kept.
/// - `NonUniqueResult` when `work` reports more than one row for a single
///   result.
pub(crate) fn run_in_transaction<S, T>(
    entity: &'static str,
    operation: &'static str,
    open: impl FnOnce() -> RepoResult<S>,
    work: impl FnOnce(&mut S) -> PersistResult<T>,
) -> RepoResult<T>
where
    S: Transactional,
{
    let started_at = Instant::now();
    let session = open().inspect_err(|err| log_outcome(entity, operation, started_at, Err(err)))?;

    let mut guarded = scopeguard::guard(session, |session| {
        if let Err(err) = session.close() {
            warn!(
                "event=session_close module=repo status=error entity={} op={} phase=unwind error={}",
                entity, operation, err
            );
        }
    });
    let outcome = execute(&mut *guarded, work);
    let session = ScopeGuard::into_inner(guarded);

    let result = match (outcome, session.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(RepoError::Session(close_err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(
                "event=session_close module=repo status=error entity={} op={} error_code={} error={}",
                entity,
                operation,
                err.code(),
                close_err
            );
            Err(err)
        }
    };

    log_outcome(entity, operation, started_at, result.as_ref().map(|_| ()));
    result
}

fn execute<S: Transactional, T>(
    session: &mut S,
    work: impl FnOnce(&mut S) -> PersistResult<T>,
) -> RepoResult<T> {
    session.begin().map_err(RepoError::Session)?;

    let outcome = work(&mut *session).and_then(|value| session.commit().map(|()| value));
    outcome.map_err(|err| roll_back(session, err))
}

fn roll_back<S: Transactional>(session: &mut S, err: PersistError) -> RepoError {
    if !session.is_active() {
        return classify(err);
    }
    match session.rollback() {
        Ok(()) => classify(err),
        Err(rollback_err) => RepoError::RollbackFailed {
            source: rollback_err,
            original: err,
        },
    }
}

fn classify(err: PersistError) -> RepoError {
    match err {
        PersistError::NonUniqueResult { entity } => RepoError::NonUniqueResult { entity },
        other => RepoError::TransactionFailed { source: other },
    }
}

fn log_outcome(
    entity: &str,
    operation: &str,
    started_at: Instant,
    outcome: Result<(), &RepoError>,
) {
    match outcome {
        Ok(()) => debug!(
            "event=repo_tx module=repo status=ok entity={} op={} duration_ms={}",
            entity,
            operation,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=repo_tx module=repo status=error entity={} op={} duration_ms={} error_code={} error={}",
            entity,
            operation,
            started_at.elapsed().as_millis(),
            err.code(),
            err
        ),
    }
}
