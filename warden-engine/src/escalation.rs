use warden_store::CaseKind;

use crate::config::AutoActionConfig;

/// Automatic follow-up sanction selected after a warn is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoAction {
    /// Permanent ban once the ban threshold is reached.
    Ban,
    /// Temporary mute with the configured duration.
    Mute { duration_seconds: u64 },
}

impl AutoAction {
    pub fn kind(self) -> CaseKind {
        match self {
            AutoAction::Ban => CaseKind::Ban,
            AutoAction::Mute { .. } => CaseKind::Mute,
        }
    }

    pub fn duration_seconds(self) -> Option<u64> {
        match self {
            AutoAction::Ban => None,
            AutoAction::Mute { duration_seconds } => Some(duration_seconds),
        }
    }
}

/// Map a post-increment warn count to an automatic sanction.
///
/// The ban threshold wins at counts that satisfy both thresholds; the mute
/// branch is only reached below it.
pub fn escalate(warn_count: i64, config: &AutoActionConfig) -> Option<AutoAction> {
    if !config.enabled {
        return None;
    }

    if warn_count >= i64::from(config.auto_ban_warns) {
        Some(AutoAction::Ban)
    } else if warn_count >= i64::from(config.auto_mute_warns) {
        Some(AutoAction::Mute {
            duration_seconds: config.auto_mute_seconds,
        })
    } else {
        None
    }
}
