use sqlx::{Sqlite, Transaction};

use warden_utils::time::now_unix_secs;

use crate::database::Database;
use crate::error::StoreError;
use crate::model::audit::AuditEntry;

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    action_type: String,
    subject_id: i64,
    actor_id: i64,
    scope_id: i64,
    details: Option<String>,
    created_at: i64,
}

/// Append one audit entry outside of any surrounding transaction.
pub async fn append(
    db: &Database,
    action_type: &str,
    subject_id: u64,
    actor_id: u64,
    scope_id: u64,
    details: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO audit_log (action_type, subject_id, actor_id, scope_id, details, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(action_type)
    .bind(subject_id as i64)
    .bind(actor_id as i64)
    .bind(scope_id as i64)
    .bind(details)
    .bind(now_unix_secs() as i64)
    .execute(db.pool())
    .await?;

    Ok(())
}

/// Append one audit entry inside a case write transaction, so a case row
/// can never commit without its trail entry.
pub(crate) async fn append_tx(
    tx: &mut Transaction<'_, Sqlite>,
    action_type: &str,
    subject_id: u64,
    actor_id: u64,
    scope_id: u64,
    details: Option<&str>,
    created_at: u64,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO audit_log (action_type, subject_id, actor_id, scope_id, details, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(action_type)
    .bind(subject_id as i64)
    .bind(actor_id as i64)
    .bind(scope_id as i64)
    .bind(details)
    .bind(created_at as i64)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Newest-first audit trail for a scope.
pub async fn recent(db: &Database, scope_id: u64, limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
    let rows: Vec<AuditRow> = sqlx::query_as(
        "SELECT id, action_type, subject_id, actor_id, scope_id, details, created_at
         FROM audit_log
         WHERE scope_id = ?
         ORDER BY id DESC
         LIMIT ?",
    )
    .bind(scope_id as i64)
    .bind(i64::from(limit.clamp(1, 500)))
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AuditEntry {
            id: row.id,
            action_type: row.action_type,
            subject_id: row.subject_id as u64,
            actor_id: row.actor_id as u64,
            scope_id: row.scope_id as u64,
            details: row.details,
            created_at: row.created_at as u64,
        })
        .collect())
}
