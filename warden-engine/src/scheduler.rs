use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use warden_store::impls::{audit, cases};
use warden_store::{CaseKind, Database, StoreError};
use warden_utils::time::now_unix_secs;

use crate::error::ExecutorError;
use crate::external::{EnforcementExecutor, Notifier};

/// How long a single platform removal attempt may run.
const REMOVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Removal attempts per reversal before deferring to the safety sweep.
const REMOVE_ATTEMPTS: u32 = 3;

/// Owns the pending reversal timers for time-bound sanctions.
///
/// Every path that can lift a ban or mute (expiry timer, safety sweep,
/// startup reconciliation, manual command) funnels through the store's
/// conditional deactivate, so a reversal is performed at most once no
/// matter how many of them race. Timers are an optimization; the sweep is
/// the safety net that makes reversal eventually exact.
#[derive(Clone)]
pub struct SanctionScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    db: Database,
    executor: Arc<dyn EnforcementExecutor>,
    notifier: Arc<dyn Notifier>,
    /// Actor recorded on audit entries for automatic reversals.
    service_id: u64,
    pending: Mutex<HashMap<i64, PendingTimer>>,
    generations: AtomicU64,
}

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

impl SanctionScheduler {
    pub fn new(
        db: Database,
        executor: Arc<dyn EnforcementExecutor>,
        notifier: Arc<dyn Notifier>,
        service_id: u64,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                db,
                executor,
                notifier,
                service_id,
                pending: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Arm (or re-arm) the expiry timer for a time-bound case. An existing
    /// timer for the same case id is replaced, never duplicated.
    pub fn schedule(&self, case_id: i64, kind: CaseKind, subject: u64, scope: u64, delay: Duration) {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            reverse_case(&inner, case_id, kind, subject, scope, "expired").await;

            // drop our own registry entry unless a re-arm replaced it
            let mut pending = inner.pending.lock();
            if pending
                .get(&case_id)
                .is_some_and(|timer| timer.generation == generation)
            {
                pending.remove(&case_id);
            }
        });

        let mut pending = self.inner.pending.lock();
        if let Some(previous) = pending.insert(
            case_id,
            PendingTimer {
                generation,
                handle: handle.abort_handle(),
            },
        ) {
            previous.handle.abort();
        }
    }

    /// Best-effort removal of a pending timer. Correctness never depends on
    /// this: a timer that survives cancellation finds the case already
    /// inactive and no-ops.
    pub fn cancel(&self, case_id: i64) -> bool {
        match self.inner.pending.lock().remove(&case_id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of armed timers, for observability and tests.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Rebuild timers from the store after a restart.
    ///
    /// Rows already past their expiry are reversed before this returns, so
    /// sanctions that lapsed during downtime are lifted before the engine
    /// starts serving new commands.
    pub async fn reconcile(&self) -> Result<(), StoreError> {
        let rows = cases::active_time_bound(&self.inner.db, None, None).await?;
        let now = now_unix_secs();
        let mut armed = 0_u32;
        let mut lifted = 0_u32;

        for case in rows {
            let Some(expires_at) = case.expires_at else {
                continue;
            };
            if expires_at <= now {
                if reverse_case(&self.inner, case.id, case.kind, case.subject_id, case.scope_id, "expired during downtime").await {
                    lifted += 1;
                }
            } else {
                self.schedule(
                    case.id,
                    case.kind,
                    case.subject_id,
                    case.scope_id,
                    Duration::from_secs(expires_at - now),
                );
                armed += 1;
            }
        }

        info!(armed, lifted, "sanction timers reconciled");
        Ok(())
    }

    /// Spawn the periodic safety sweep: a low-frequency net for timers lost
    /// to crashes, clock changes, or failed platform removals.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            info!(interval_seconds = interval.as_secs(), "sanction sweep started");
            loop {
                sleep(interval).await;
                if let Err(err) = sweep_once(&inner).await {
                    error!(?err, "sanction sweep failed");
                }
            }
        })
    }
}

async fn sweep_once(inner: &Arc<SchedulerInner>) -> Result<(), StoreError> {
    let rows = cases::active_time_bound(&inner.db, None, None).await?;
    let now = now_unix_secs();
    let mut lifted = 0_u32;

    for case in rows {
        if case.expires_at.is_some_and(|expires_at| expires_at <= now)
            && reverse_case(inner, case.id, case.kind, case.subject_id, case.scope_id, "swept").await
        {
            lifted += 1;
        }
    }

    if lifted > 0 {
        info!(lifted, "sweep lifted expired sanctions missed by their timers");
    }
    Ok(())
}

/// The single reversal routine shared by timers, the sweep, and startup
/// reconciliation. Returns true when this call performed the reversal.
///
/// The claim is scoped to the one case id the caller was armed for; a
/// successor case for the same `(kind, subject, scope)` is a different row
/// and stays untouched when a stale timer fires.
async fn reverse_case(
    inner: &SchedulerInner,
    case_id: i64,
    kind: CaseKind,
    subject: u64,
    scope: u64,
    cause: &str,
) -> bool {
    // claim the reversal; losing the race is the normal no-op path
    match cases::deactivate_case_by_id(&inner.db, case_id).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(err) => {
            error!(?err, case_id, kind = kind.as_str(), subject, scope, "reversal aborted, deactivate failed");
            return false;
        }
    }

    if let Err(err) = remove_with_retry(inner.executor.as_ref(), kind, subject, scope).await {
        warn!(
            ?err,
            case_id,
            subject,
            scope,
            "platform removal failed, re-activating case for sweep retry"
        );
        if let Err(err) = cases::reactivate_case(&inner.db, case_id).await {
            error!(?err, case_id, "failed to re-activate case after removal failure");
        }
        return false;
    }

    let action = reversal_action(kind);
    if let Err(err) = audit::append(&inner.db, action, subject, inner.service_id, scope, Some(cause)).await
    {
        error!(?err, case_id, "failed to record reversal audit entry");
    }

    info!(case_id, kind = kind.as_str(), subject, scope, cause, "time-bound sanction lifted");
    inner
        .notifier
        .log_to_scope(scope, &format!("{action}: user {subject} ({cause})"))
        .await;
    true
}

/// Bounded platform removal: each attempt runs under a deadline and failure
/// is retried a few times before the caller compensates. Shared with the
/// manual lift path so no reversal ever rides on a single unbounded call.
pub(crate) async fn remove_with_retry(
    executor: &dyn EnforcementExecutor,
    kind: CaseKind,
    subject: u64,
    scope: u64,
) -> Result<(), ExecutorError> {
    let mut last = ExecutorError::Timeout;
    for attempt in 1..=REMOVE_ATTEMPTS {
        match timeout(REMOVE_TIMEOUT, executor.remove(kind, subject, scope)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => {
                warn!(attempt, ?err, subject, scope, "platform removal attempt failed");
                last = err;
            }
            Err(_) => {
                warn!(attempt, subject, scope, "platform removal attempt timed out");
                last = ExecutorError::Timeout;
            }
        }
    }
    Err(last)
}

/// Audit action label for lifting a sanction of `kind`.
pub(crate) fn reversal_action(kind: CaseKind) -> &'static str {
    match kind {
        CaseKind::Ban => "unban",
        CaseKind::Mute => "unmute",
        // warns and kicks are never reversed through the scheduler
        CaseKind::Warn | CaseKind::Kick => "reversal",
    }
}
