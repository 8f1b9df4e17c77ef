use std::collections::HashSet;

use crate::config::ModerationConfig;
use crate::external::ScopeDirectory;

/// Required privilege tier for a moderation operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionLevel {
    Staff,
    Admin,
}

/// Evaluates whether an actor may use moderation operations at all, and
/// whether they outrank the subject they are targeting.
pub struct AuthorizationPolicy {
    owner_id: u64,
    service_id: u64,
    staff_roles: HashSet<u64>,
    admin_roles: HashSet<u64>,
}

impl AuthorizationPolicy {
    pub fn new(owner_id: u64, service_id: u64, config: &ModerationConfig) -> Self {
        Self {
            owner_id,
            service_id,
            staff_roles: config.staff_roles.iter().copied().collect(),
            admin_roles: config.admin_roles.iter().copied().collect(),
        }
    }

    /// Level check. The designated owner and holders of an administrator
    /// grant always pass; otherwise admin roles satisfy both tiers and
    /// staff roles satisfy `Staff` only.
    pub async fn permits(
        &self,
        directory: &dyn ScopeDirectory,
        actor: u64,
        scope: u64,
        level: PermissionLevel,
    ) -> bool {
        if actor == self.owner_id {
            return true;
        }
        if directory.is_administrator(actor, scope).await {
            return true;
        }

        let roles = directory.role_ids(actor, scope).await;
        let has_admin_role = roles.iter().any(|role| self.admin_roles.contains(role));
        match level {
            PermissionLevel::Admin => has_admin_role,
            PermissionLevel::Staff => {
                has_admin_role || roles.iter().any(|role| self.staff_roles.contains(role))
            }
        }
    }

    /// Hierarchy gate applied before kick/ban/mute (not warn): actors may
    /// not target themselves, the service identity, or anyone ranked at or
    /// above them in the scope.
    pub async fn permits_against(
        &self,
        directory: &dyn ScopeDirectory,
        actor: u64,
        subject: u64,
        scope: u64,
    ) -> bool {
        if actor == subject || subject == self.service_id {
            return false;
        }
        directory.highest_rank(subject, scope).await < directory.highest_rank(actor, scope).await
    }
}
