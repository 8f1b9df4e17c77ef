//! Collaborator interfaces the engine consumes but does not implement.
//!
//! The command surface, platform wire protocol, and message delivery all
//! live behind these traits; the engine only cares about their contracts.

use async_trait::async_trait;

use warden_store::CaseKind;

use crate::error::ExecutorError;

/// Applies and removes platform-level restrictions (the actual ban, kick,
/// or mute on the underlying platform).
#[async_trait]
pub trait EnforcementExecutor: Send + Sync {
    async fn apply(&self, kind: CaseKind, subject: u64, scope: u64) -> Result<(), ExecutorError>;
    async fn remove(&self, kind: CaseKind, subject: u64, scope: u64) -> Result<(), ExecutorError>;
}

/// Best-effort message delivery; failures are swallowed by implementations.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Direct message to the sanctioned user.
    async fn notify_subject(&self, subject: u64, message: &str);
    /// Entry in the scope's moderation log channel.
    async fn log_to_scope(&self, scope: u64, message: &str);
}

/// Role and rank lookups within a scope, supplied by the platform layer.
#[async_trait]
pub trait ScopeDirectory: Send + Sync {
    /// Whether the user holds an administrator grant on the scope.
    async fn is_administrator(&self, user: u64, scope: u64) -> bool;
    /// Role ids granted to the user within the scope.
    async fn role_ids(&self, user: u64, scope: u64) -> Vec<u64>;
    /// Position of the user's highest role in the scope's total order.
    /// Higher means more senior.
    async fn highest_rank(&self, user: u64, scope: u64) -> i64;
}
