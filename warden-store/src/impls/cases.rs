use warden_utils::time::now_unix_secs;

use crate::database::Database;
use crate::error::StoreError;
use crate::impls::audit;
use crate::model::case::{Case, CaseKind, NewCase, UserHistory};

#[derive(sqlx::FromRow)]
struct CaseRow {
    id: i64,
    kind: String,
    subject_id: i64,
    actor_id: i64,
    scope_id: i64,
    reason: Option<String>,
    duration_seconds: Option<i64>,
    expires_at: Option<i64>,
    created_at: i64,
    active: bool,
}

const CASE_COLUMNS: &str = "id, kind, subject_id, actor_id, scope_id, reason, \
                            duration_seconds, expires_at, created_at, active";

/// Persist a new case together with its creation audit entry.
///
/// For bans and mutes, any still-active row of the same kind for the same
/// `(subject, scope)` is superseded first, so at most one stays active. The
/// whole unit commits in one transaction: no case row without its trail.
pub async fn add_case(db: &Database, new_case: NewCase<'_>) -> Result<Case, StoreError> {
    let now = now_unix_secs();
    let expires_at = new_case
        .duration_seconds
        .map(|duration| now.saturating_add(duration));

    let mut tx = db.pool().begin().await?;

    if new_case.kind.reversible() {
        let superseded: Vec<i64> = sqlx::query_scalar(
            "UPDATE cases SET active = 0
             WHERE kind = ? AND subject_id = ? AND scope_id = ? AND active = 1
             RETURNING id",
        )
        .bind(new_case.kind.as_str())
        .bind(new_case.subject_id as i64)
        .bind(new_case.scope_id as i64)
        .fetch_all(&mut *tx)
        .await?;

        for old_id in superseded {
            audit::append_tx(
                &mut tx,
                new_case.kind.as_str(),
                new_case.subject_id,
                new_case.actor_id,
                new_case.scope_id,
                Some(&format!("case #{old_id} superseded by a newer {}", new_case.kind.as_str())),
                now,
            )
            .await?;
        }
    }

    let row: CaseRow = sqlx::query_as(&format!(
        "INSERT INTO cases (kind, subject_id, actor_id, scope_id, reason, duration_seconds, expires_at, created_at, active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
         RETURNING {CASE_COLUMNS}"
    ))
    .bind(new_case.kind.as_str())
    .bind(new_case.subject_id as i64)
    .bind(new_case.actor_id as i64)
    .bind(new_case.scope_id as i64)
    .bind(new_case.reason)
    .bind(new_case.duration_seconds.map(|value| value as i64))
    .bind(expires_at.map(|value| value as i64))
    .bind(now as i64)
    .fetch_one(&mut *tx)
    .await?;

    let details = format!(
        "case #{}: {}",
        row.id,
        new_case.reason.unwrap_or("no reason provided")
    );
    audit::append_tx(
        &mut tx,
        new_case.kind.as_str(),
        new_case.subject_id,
        new_case.actor_id,
        new_case.scope_id,
        Some(&details),
        now,
    )
    .await?;

    tx.commit().await?;

    to_case(row)
}

/// Flip the active flag on the current ban or mute for `(subject, scope)`.
///
/// This is the idempotent reversal guard: a single conditional update, so
/// of any number of callers racing on the same sanction exactly one gets
/// the case id back and everyone else sees `None`.
pub async fn deactivate_case(
    db: &Database,
    kind: CaseKind,
    subject_id: u64,
    scope_id: u64,
) -> Result<Option<i64>, StoreError> {
    if !kind.reversible() {
        return Ok(None);
    }

    let flipped: Option<i64> = sqlx::query_scalar(
        "UPDATE cases SET active = 0
         WHERE kind = ? AND subject_id = ? AND scope_id = ? AND active = 1
         RETURNING id",
    )
    .bind(kind.as_str())
    .bind(subject_id as i64)
    .bind(scope_id as i64)
    .fetch_optional(db.pool())
    .await?;

    Ok(flipped)
}

/// Flip the active flag on one specific case. The claim used by every
/// scheduled reversal path: a timer armed for a case that has since been
/// superseded finds its own row already inactive and must no-op, never
/// touch the successor.
pub async fn deactivate_case_by_id(db: &Database, case_id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE cases SET active = 0 WHERE id = ? AND active = 1")
        .bind(case_id)
        .execute(db.pool())
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Put a claimed case back into the active set. Used when platform removal
/// ultimately failed, so a later retry can claim it again.
pub async fn reactivate_case(db: &Database, case_id: i64) -> Result<(), StoreError> {
    sqlx::query("UPDATE cases SET active = 1 WHERE id = ?")
        .bind(case_id)
        .execute(db.pool())
        .await?;

    Ok(())
}

/// Physically delete one warn by id. Warn removal is a delete, not a flag
/// flip, and audits in the same transaction; nothing matching means no
/// audit entry either.
pub async fn remove_warn_by_id(
    db: &Database,
    scope_id: u64,
    warn_id: i64,
    actor_id: u64,
) -> Result<bool, StoreError> {
    let mut tx = db.pool().begin().await?;

    let deleted: Option<(i64, i64)> = sqlx::query_as(
        "DELETE FROM cases
         WHERE id = ? AND scope_id = ? AND kind = 'warn'
         RETURNING id, subject_id",
    )
    .bind(warn_id)
    .bind(scope_id as i64)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((id, subject_id)) = deleted else {
        tx.rollback().await?;
        return Ok(false);
    };

    audit::append_tx(
        &mut tx,
        "unwarn",
        subject_id as u64,
        actor_id,
        scope_id,
        Some(&format!("warn #{id} removed")),
        now_unix_secs(),
    )
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Physically delete the most recent warn for `(subject, scope)`.
pub async fn remove_latest_warn(
    db: &Database,
    subject_id: u64,
    scope_id: u64,
    actor_id: u64,
) -> Result<bool, StoreError> {
    let mut tx = db.pool().begin().await?;

    let deleted: Option<i64> = sqlx::query_scalar(
        "DELETE FROM cases
         WHERE id = (
             SELECT id FROM cases
             WHERE kind = 'warn' AND subject_id = ? AND scope_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1
         )
         RETURNING id",
    )
    .bind(subject_id as i64)
    .bind(scope_id as i64)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(id) = deleted else {
        tx.rollback().await?;
        return Ok(false);
    };

    audit::append_tx(
        &mut tx,
        "unwarn",
        subject_id,
        actor_id,
        scope_id,
        Some(&format!("warn #{id} removed (most recent)")),
        now_unix_secs(),
    )
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Number of warns currently on record for `(subject, scope)`.
pub async fn warn_count(db: &Database, subject_id: u64, scope_id: u64) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cases
         WHERE kind = 'warn' AND subject_id = ? AND scope_id = ?",
    )
    .bind(subject_id as i64)
    .bind(scope_id as i64)
    .fetch_one(db.pool())
    .await?;

    Ok(count)
}

/// Active cases that carry an expiry, soonest first, optionally filtered by
/// kind and/or scope. Feeds startup reconciliation and the safety sweep.
pub async fn active_time_bound(
    db: &Database,
    kind: Option<CaseKind>,
    scope_id: Option<u64>,
) -> Result<Vec<Case>, StoreError> {
    let kind_filter = kind.map(CaseKind::as_str);
    let scope_filter = scope_id.map(|value| value as i64);

    let rows: Vec<CaseRow> = sqlx::query_as(&format!(
        "SELECT {CASE_COLUMNS} FROM cases
         WHERE active = 1 AND expires_at IS NOT NULL
           AND (? IS NULL OR kind = ?)
           AND (? IS NULL OR scope_id = ?)
         ORDER BY expires_at ASC, id ASC"
    ))
    .bind(kind_filter)
    .bind(kind_filter)
    .bind(scope_filter)
    .bind(scope_filter)
    .fetch_all(db.pool())
    .await?;

    rows.into_iter().map(to_case).collect()
}

/// Everything on record for a user within a scope, each list newest-first.
pub async fn user_history(
    db: &Database,
    subject_id: u64,
    scope_id: u64,
) -> Result<UserHistory, StoreError> {
    let rows: Vec<CaseRow> = sqlx::query_as(&format!(
        "SELECT {CASE_COLUMNS} FROM cases
         WHERE subject_id = ? AND scope_id = ?
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(subject_id as i64)
    .bind(scope_id as i64)
    .fetch_all(db.pool())
    .await?;

    let mut history = UserHistory::default();
    for row in rows {
        let case = to_case(row)?;
        match case.kind {
            CaseKind::Warn => history.warns.push(case),
            CaseKind::Ban => history.bans.push(case),
            CaseKind::Mute => history.mutes.push(case),
            CaseKind::Kick => history.kicks.push(case),
        }
    }

    Ok(history)
}

fn to_case(row: CaseRow) -> Result<Case, StoreError> {
    Ok(Case {
        id: row.id,
        kind: CaseKind::parse(&row.kind)?,
        subject_id: row.subject_id as u64,
        actor_id: row.actor_id as u64,
        scope_id: row.scope_id as u64,
        reason: row.reason,
        duration_seconds: row.duration_seconds.map(|value| value as u64),
        expires_at: row.expires_at.map(|value| value as u64),
        created_at: row.created_at as u64,
        active: row.active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::audit;

    const SUBJECT: u64 = 1001;
    const ACTOR: u64 = 2002;
    const SCOPE: u64 = 9009;

    async fn memory_db() -> Database {
        Database::connect(":memory:").await.expect("in-memory database")
    }

    fn new_case(kind: CaseKind, duration_seconds: Option<u64>) -> NewCase<'static> {
        NewCase {
            kind,
            subject_id: SUBJECT,
            actor_id: ACTOR,
            scope_id: SCOPE,
            reason: Some("test reason"),
            duration_seconds,
        }
    }

    #[tokio::test]
    async fn expires_at_set_iff_duration_set() -> anyhow::Result<()> {
        let db = memory_db().await;

        let temp = add_case(&db, new_case(CaseKind::Ban, Some(60))).await?;
        assert_eq!(temp.duration_seconds, Some(60));
        assert_eq!(temp.expires_at, Some(temp.created_at + 60));

        let permanent = add_case(&db, new_case(CaseKind::Mute, None)).await?;
        assert_eq!(permanent.duration_seconds, None);
        assert_eq!(permanent.expires_at, None);

        Ok(())
    }

    #[tokio::test]
    async fn case_creation_writes_audit_entry_atomically() -> anyhow::Result<()> {
        let db = memory_db().await;

        let case = add_case(&db, new_case(CaseKind::Warn, None)).await?;

        let trail = audit::recent(&db, SCOPE, 10).await?;
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action_type, "warn");
        assert_eq!(trail[0].subject_id, SUBJECT);
        assert!(trail[0].details.as_deref().unwrap().contains(&format!("#{}", case.id)));

        Ok(())
    }

    #[tokio::test]
    async fn at_most_one_active_ban_per_subject_and_scope() -> anyhow::Result<()> {
        let db = memory_db().await;

        let first = add_case(&db, new_case(CaseKind::Ban, Some(600))).await?;
        let second = add_case(&db, new_case(CaseKind::Ban, None)).await?;

        let history = user_history(&db, SUBJECT, SCOPE).await?;
        assert_eq!(history.bans.len(), 2);

        let active: Vec<_> = history.bans.iter().filter(|case| case.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert_ne!(active[0].id, first.id);

        Ok(())
    }

    #[tokio::test]
    async fn mute_and_ban_active_flags_are_independent() -> anyhow::Result<()> {
        let db = memory_db().await;

        add_case(&db, new_case(CaseKind::Ban, Some(600))).await?;
        add_case(&db, new_case(CaseKind::Mute, Some(600))).await?;

        let history = user_history(&db, SUBJECT, SCOPE).await?;
        assert!(history.bans[0].active);
        assert!(history.mutes[0].active);

        Ok(())
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() -> anyhow::Result<()> {
        let db = memory_db().await;

        let case = add_case(&db, new_case(CaseKind::Ban, Some(600))).await?;

        let first = deactivate_case(&db, CaseKind::Ban, SUBJECT, SCOPE).await?;
        assert_eq!(first, Some(case.id));

        let second = deactivate_case(&db, CaseKind::Ban, SUBJECT, SCOPE).await?;
        assert_eq!(second, None);

        Ok(())
    }

    #[tokio::test]
    async fn deactivate_by_id_never_claims_a_successor() -> anyhow::Result<()> {
        let db = memory_db().await;

        let first = add_case(&db, new_case(CaseKind::Ban, Some(1))).await?;
        let second = add_case(&db, new_case(CaseKind::Ban, None)).await?;

        // the superseded row is already inactive, so its id claims nothing
        assert!(!deactivate_case_by_id(&db, first.id).await?);

        let history = user_history(&db, SUBJECT, SCOPE).await?;
        let active: Vec<_> = history.bans.iter().filter(|case| case.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        assert!(deactivate_case_by_id(&db, second.id).await?);
        assert!(!deactivate_case_by_id(&db, second.id).await?);

        Ok(())
    }

    #[tokio::test]
    async fn reactivate_returns_case_to_the_active_set() -> anyhow::Result<()> {
        let db = memory_db().await;

        let case = add_case(&db, new_case(CaseKind::Mute, Some(60))).await?;
        deactivate_case(&db, CaseKind::Mute, SUBJECT, SCOPE).await?;
        assert!(active_time_bound(&db, None, None).await?.is_empty());

        reactivate_case(&db, case.id).await?;
        let pending = active_time_bound(&db, Some(CaseKind::Mute), Some(SCOPE)).await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, case.id);

        Ok(())
    }

    #[tokio::test]
    async fn active_time_bound_skips_permanent_and_inactive_rows() -> anyhow::Result<()> {
        let db = memory_db().await;

        add_case(&db, new_case(CaseKind::Ban, None)).await?;
        add_case(&db, new_case(CaseKind::Warn, None)).await?;
        let temp_mute = add_case(&db, new_case(CaseKind::Mute, Some(120))).await?;

        let pending = active_time_bound(&db, None, None).await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, temp_mute.id);

        deactivate_case(&db, CaseKind::Mute, SUBJECT, SCOPE).await?;
        assert!(active_time_bound(&db, None, None).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn warn_removal_is_a_delete() -> anyhow::Result<()> {
        let db = memory_db().await;

        let first = add_case(&db, new_case(CaseKind::Warn, None)).await?;
        let second = add_case(&db, new_case(CaseKind::Warn, None)).await?;
        assert_eq!(warn_count(&db, SUBJECT, SCOPE).await?, 2);

        // most-recent path removes the later warn
        assert!(remove_latest_warn(&db, SUBJECT, SCOPE, ACTOR).await?);
        let history = user_history(&db, SUBJECT, SCOPE).await?;
        assert_eq!(history.warns.len(), 1);
        assert_eq!(history.warns[0].id, first.id);

        assert!(remove_warn_by_id(&db, SCOPE, first.id, ACTOR).await?);
        assert_eq!(warn_count(&db, SUBJECT, SCOPE).await?, 0);

        // already gone
        assert!(!remove_warn_by_id(&db, SCOPE, second.id, ACTOR).await?);

        Ok(())
    }

    #[tokio::test]
    async fn failed_warn_removal_leaves_no_audit_entry() -> anyhow::Result<()> {
        let db = memory_db().await;

        add_case(&db, new_case(CaseKind::Warn, None)).await?;
        let before = audit::recent(&db, SCOPE, 50).await?.len();

        assert!(!remove_latest_warn(&db, 4242, SCOPE, ACTOR).await?);
        assert!(!remove_warn_by_id(&db, SCOPE, 999_999, ACTOR).await?);

        assert_eq!(audit::recent(&db, SCOPE, 50).await?.len(), before);
        Ok(())
    }

    #[tokio::test]
    async fn remove_warn_by_id_ignores_non_warn_cases() -> anyhow::Result<()> {
        let db = memory_db().await;

        let ban = add_case(&db, new_case(CaseKind::Ban, None)).await?;
        assert!(!remove_warn_by_id(&db, SCOPE, ban.id, ACTOR).await?);

        let history = user_history(&db, SUBJECT, SCOPE).await?;
        assert_eq!(history.bans.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn user_history_partitions_by_kind_newest_first() -> anyhow::Result<()> {
        let db = memory_db().await;

        add_case(&db, new_case(CaseKind::Warn, None)).await?;
        let newer_warn = add_case(&db, new_case(CaseKind::Warn, None)).await?;
        add_case(&db, new_case(CaseKind::Kick, None)).await?;
        add_case(&db, new_case(CaseKind::Mute, Some(60))).await?;

        let history = user_history(&db, SUBJECT, SCOPE).await?;
        assert_eq!(history.warns.len(), 2);
        assert_eq!(history.kicks.len(), 1);
        assert_eq!(history.mutes.len(), 1);
        assert!(history.bans.is_empty());
        assert_eq!(history.warns[0].id, newer_warn.id);

        Ok(())
    }

    #[tokio::test]
    async fn supersession_is_audited() -> anyhow::Result<()> {
        let db = memory_db().await;

        let first = add_case(&db, new_case(CaseKind::Mute, Some(60))).await?;
        add_case(&db, new_case(CaseKind::Mute, Some(120))).await?;

        let trail = audit::recent(&db, SCOPE, 10).await?;
        assert!(trail.iter().any(|entry| {
            entry
                .details
                .as_deref()
                .is_some_and(|details| details.contains(&format!("case #{} superseded", first.id)))
        }));

        Ok(())
    }
}
