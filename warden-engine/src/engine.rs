use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use warden_store::impls::{audit, cases};
use warden_store::{CaseKind, Database, NewCase, UserHistory};
use warden_utils::formatting::{action_past_tense, format_duration};
use warden_utils::parse::parse_duration_seconds;

use crate::authorization::{AuthorizationPolicy, PermissionLevel};
use crate::config::ModerationConfig;
use crate::error::ModerationError;
use crate::escalation::{self, AutoAction};
use crate::external::{EnforcementExecutor, Notifier, ScopeDirectory};
use crate::rate_limit::RateLimiter;
use crate::scheduler::{SanctionScheduler, remove_with_retry, reversal_action};

/// Orchestrates validation, policy gates, persistence, reversal scheduling,
/// and platform side effects for every moderation command.
///
/// The command surface hands this engine already-parsed `(actor, subject,
/// scope, ...)` tuples; everything platform-specific happens behind the
/// executor, notifier, and directory traits.
pub struct ModerationEngine {
    db: Database,
    config: ModerationConfig,
    policy: AuthorizationPolicy,
    limiter: RateLimiter,
    scheduler: SanctionScheduler,
    executor: Arc<dyn EnforcementExecutor>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn ScopeDirectory>,
    service_id: u64,
}

impl ModerationEngine {
    pub fn new(
        db: Database,
        config: ModerationConfig,
        owner_id: u64,
        service_id: u64,
        executor: Arc<dyn EnforcementExecutor>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn ScopeDirectory>,
    ) -> Self {
        let policy = AuthorizationPolicy::new(owner_id, service_id, &config);
        let limiter = RateLimiter::new(&config.rate_limit);
        let scheduler = SanctionScheduler::new(
            db.clone(),
            Arc::clone(&executor),
            Arc::clone(&notifier),
            service_id,
        );

        Self {
            db,
            config,
            policy,
            limiter,
            scheduler,
            executor,
            notifier,
            directory,
            service_id,
        }
    }

    /// Recover pending reversals from the store and start the safety sweep.
    /// Call once, before the command surface starts handing commands over,
    /// so sanctions that expired during downtime are lifted first.
    pub async fn start(&self) -> Result<(), ModerationError> {
        self.scheduler.reconcile().await?;
        self.scheduler
            .spawn_sweeper(Duration::from_secs(self.config.sweep_interval_seconds));
        Ok(())
    }

    /// Warn a user. Staff level; no hierarchy gate. Triggers the escalation
    /// policy with the post-increment warn count.
    pub async fn warn(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
    ) -> Result<i64, ModerationError> {
        self.validate_subject(actor, subject)?;
        self.gate(actor, scope, PermissionLevel::Staff, "warn").await?;

        let case = cases::add_case(
            &self.db,
            NewCase {
                kind: CaseKind::Warn,
                subject_id: subject,
                actor_id: actor,
                scope_id: scope,
                reason,
                duration_seconds: None,
            },
        )
        .await?;
        let warn_count = cases::warn_count(&self.db, subject, scope).await?;
        info!(case_id = case.id, subject, actor, scope, warn_count, "warn issued");

        if self.config.dm_users {
            let reason_text = reason.unwrap_or("no reason provided");
            let message = if self.config.show_warn_count {
                format!("You have been warned: {reason_text} (total warns: {warn_count})")
            } else {
                format!("You have been warned: {reason_text}")
            };
            self.notifier.notify_subject(subject, &message).await;
        }
        self.notifier
            .log_to_scope(scope, &format!("warn #{} issued to {subject} by {actor}", case.id))
            .await;

        if let Some(action) = escalation::escalate(warn_count, &self.config.auto_actions) {
            self.apply_escalation(subject, scope, action, warn_count).await;
        }

        Ok(case.id)
    }

    /// Remove one warn, by id or most recent for the subject. Admin level.
    pub async fn unwarn(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        warn_id: Option<i64>,
    ) -> Result<(), ModerationError> {
        self.gate(actor, scope, PermissionLevel::Admin, "unwarn").await?;

        let removed = match warn_id {
            Some(id) => cases::remove_warn_by_id(&self.db, scope, id, actor).await?,
            None => cases::remove_latest_warn(&self.db, subject, scope, actor).await?,
        };
        if !removed {
            return Err(ModerationError::NotFound);
        }

        let remaining = cases::warn_count(&self.db, subject, scope).await?;
        info!(subject, actor, scope, remaining, "warn removed");
        self.notifier
            .log_to_scope(
                scope,
                &format!("warn removed from {subject} by {actor} ({remaining} remaining)"),
            )
            .await;
        Ok(())
    }

    /// Kick a user. Staff level plus the hierarchy gate; the case is a
    /// point-in-time fact and never reversed.
    pub async fn kick(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
    ) -> Result<i64, ModerationError> {
        self.validate_subject(actor, subject)?;
        self.gate(actor, scope, PermissionLevel::Staff, "kick").await?;
        self.hierarchy_gate(actor, subject, scope, "kick").await?;

        let case = cases::add_case(
            &self.db,
            NewCase {
                kind: CaseKind::Kick,
                subject_id: subject,
                actor_id: actor,
                scope_id: scope,
                reason,
                duration_seconds: None,
            },
        )
        .await?;

        // DM before the kick lands, while it can still be delivered
        if self.config.dm_users {
            let reason_text = reason.unwrap_or("no reason provided");
            self.notifier
                .notify_subject(subject, &format!("You have been kicked: {reason_text}"))
                .await;
        }

        let applied = self.executor.apply(CaseKind::Kick, subject, scope).await;
        info!(case_id = case.id, subject, actor, scope, "kick issued");
        self.notifier
            .log_to_scope(scope, &format!("kick #{} issued to {subject} by {actor}", case.id))
            .await;

        // the administrative record stands even when enforcement failed
        applied?;
        Ok(case.id)
    }

    /// Ban a user, permanently or for a parsed duration. Admin level.
    pub async fn ban(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
        duration: Option<&str>,
    ) -> Result<i64, ModerationError> {
        self.apply_sanction(CaseKind::Ban, PermissionLevel::Admin, actor, subject, scope, reason, duration)
            .await
    }

    /// Lift the active ban for a user. Admin level.
    pub async fn unban(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        self.lift_sanction(CaseKind::Ban, PermissionLevel::Admin, actor, subject, scope, reason)
            .await
    }

    /// Mute a user, permanently or for a parsed duration. Staff level.
    pub async fn mute(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
        duration: Option<&str>,
    ) -> Result<i64, ModerationError> {
        self.apply_sanction(CaseKind::Mute, PermissionLevel::Staff, actor, subject, scope, reason, duration)
            .await
    }

    /// Lift the active mute for a user. Staff level.
    pub async fn unmute(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        self.lift_sanction(CaseKind::Mute, PermissionLevel::Staff, actor, subject, scope, reason)
            .await
    }

    /// Everything on record for a user within a scope.
    pub async fn history(&self, subject: u64, scope: u64) -> Result<UserHistory, ModerationError> {
        Ok(cases::user_history(&self.db, subject, scope).await?)
    }

    // ---- shared paths ----

    async fn apply_sanction(
        &self,
        kind: CaseKind,
        level: PermissionLevel,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
        duration: Option<&str>,
    ) -> Result<i64, ModerationError> {
        let duration_seconds = match duration.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => Some(parse_duration_seconds(raw).ok_or_else(|| {
                ModerationError::Validation(format!(
                    "invalid duration `{raw}` (examples: 30s, 45m, 2h, 7d, 2w, 3M, 1y)"
                ))
            })?),
            None => None,
        };

        self.validate_subject(actor, subject)?;
        self.gate(actor, scope, level, kind.as_str()).await?;
        self.hierarchy_gate(actor, subject, scope, kind.as_str()).await?;

        let case = cases::add_case(
            &self.db,
            NewCase {
                kind,
                subject_id: subject,
                actor_id: actor,
                scope_id: scope,
                reason,
                duration_seconds,
            },
        )
        .await?;

        if let Some(seconds) = duration_seconds {
            self.scheduler
                .schedule(case.id, kind, subject, scope, Duration::from_secs(seconds));
        }

        let span = duration_seconds.map_or_else(|| "permanent".to_owned(), format_duration);
        if self.config.dm_users {
            let reason_text = reason.unwrap_or("no reason provided");
            self.notifier
                .notify_subject(
                    subject,
                    &format!("You have been {} ({span}): {reason_text}", action_past_tense(kind.as_str())),
                )
                .await;
        }

        let applied = self.executor.apply(kind, subject, scope).await;
        info!(case_id = case.id, kind = kind.as_str(), subject, actor, scope, span, "sanction issued");
        self.notifier
            .log_to_scope(
                scope,
                &format!("{} #{} issued to {subject} by {actor} ({span})", kind.as_str(), case.id),
            )
            .await;

        // the administrative record stands even when enforcement failed
        applied?;
        Ok(case.id)
    }

    async fn lift_sanction(
        &self,
        kind: CaseKind,
        level: PermissionLevel,
        actor: u64,
        subject: u64,
        scope: u64,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        let action = reversal_action(kind);
        self.gate(actor, scope, level, action).await?;

        let Some(case_id) = cases::deactivate_case(&self.db, kind, subject, scope).await? else {
            return Err(ModerationError::NotFound);
        };
        // the flip above already won any race with the expiry timer
        self.scheduler.cancel(case_id);

        if let Err(err) = remove_with_retry(self.executor.as_ref(), kind, subject, scope).await {
            // put the case back so a retried command (or a sweep, for
            // time-bound sanctions) can claim it again
            warn!(?err, case_id, subject, scope, "manual lift failed, re-activating case");
            cases::reactivate_case(&self.db, case_id).await?;
            return Err(err.into());
        }

        let details = format!("manual: {}", reason.unwrap_or("no reason provided"));
        audit::append(&self.db, action, subject, actor, scope, Some(&details)).await?;

        info!(case_id, kind = kind.as_str(), subject, actor, scope, "sanction lifted manually");
        if self.config.dm_users {
            self.notifier
                .notify_subject(subject, &format!("You have been {}", action_past_tense(action)))
                .await;
        }
        self.notifier
            .log_to_scope(scope, &format!("{action}: user {subject} by {actor}"))
            .await;

        Ok(())
    }

    /// Execute an automatic sanction as the service identity, through the
    /// same persist + schedule path as a manual action. Failures are logged
    /// and never fail the warn that triggered them.
    async fn apply_escalation(&self, subject: u64, scope: u64, action: AutoAction, warn_count: i64) {
        let kind = action.kind();
        let duration_seconds = action.duration_seconds();
        let reason = format!("automatic {}: reached {warn_count} warns", kind.as_str());

        let case = match cases::add_case(
            &self.db,
            NewCase {
                kind,
                subject_id: subject,
                actor_id: self.service_id,
                scope_id: scope,
                reason: Some(&reason),
                duration_seconds,
            },
        )
        .await
        {
            Ok(case) => case,
            Err(err) => {
                error!(?err, subject, scope, warn_count, "escalation case not persisted");
                return;
            }
        };

        if let Some(seconds) = duration_seconds {
            self.scheduler
                .schedule(case.id, kind, subject, scope, Duration::from_secs(seconds));
        }

        if let Err(err) = self.executor.apply(kind, subject, scope).await {
            warn!(?err, case_id = case.id, subject, scope, "escalation enforcement failed, case recorded");
        }

        info!(case_id = case.id, kind = kind.as_str(), subject, scope, warn_count, "automatic escalation applied");
        if self.config.dm_users {
            self.notifier.notify_subject(subject, &reason).await;
        }
        self.notifier
            .log_to_scope(
                scope,
                &format!("auto-{} #{} applied to {subject} ({warn_count} warns)", kind.as_str(), case.id),
            )
            .await;
    }

    // ---- gates ----

    fn validate_subject(&self, actor: u64, subject: u64) -> Result<(), ModerationError> {
        if subject == actor {
            return Err(ModerationError::Validation(
                "you cannot target yourself".to_owned(),
            ));
        }
        if subject == self.service_id {
            return Err(ModerationError::Validation(
                "you cannot target the moderation service".to_owned(),
            ));
        }
        Ok(())
    }

    async fn gate(
        &self,
        actor: u64,
        scope: u64,
        level: PermissionLevel,
        action: &'static str,
    ) -> Result<(), ModerationError> {
        if !self
            .policy
            .permits(self.directory.as_ref(), actor, scope, level)
            .await
        {
            return Err(ModerationError::Authorization { actor, action });
        }
        if !self.limiter.admit(actor) {
            return Err(ModerationError::RateLimited(actor));
        }
        Ok(())
    }

    async fn hierarchy_gate(
        &self,
        actor: u64,
        subject: u64,
        scope: u64,
        action: &'static str,
    ) -> Result<(), ModerationError> {
        if !self
            .policy
            .permits_against(self.directory.as_ref(), actor, subject, scope)
            .await
        {
            return Err(ModerationError::Authorization { actor, action });
        }
        Ok(())
    }
}
