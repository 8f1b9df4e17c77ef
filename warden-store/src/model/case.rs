use crate::error::StoreError;

/// The four kinds of disciplinary action a case can record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaseKind {
    Warn,
    Kick,
    Ban,
    Mute,
}

impl CaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseKind::Warn => "warn",
            CaseKind::Kick => "kick",
            CaseKind::Ban => "ban",
            CaseKind::Mute => "mute",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "warn" => Ok(CaseKind::Warn),
            "kick" => Ok(CaseKind::Kick),
            "ban" => Ok(CaseKind::Ban),
            "mute" => Ok(CaseKind::Mute),
            other => Err(StoreError::UnknownKind(other.to_owned())),
        }
    }

    /// Whether cases of this kind carry an active flag and can be lifted.
    /// Warns and kicks are point-in-time facts.
    pub fn reversible(self) -> bool {
        matches!(self, CaseKind::Ban | CaseKind::Mute)
    }
}

/// One durable moderation case row.
#[derive(Clone, Debug)]
pub struct Case {
    pub id: i64,
    pub kind: CaseKind,
    pub subject_id: u64,
    pub actor_id: u64,
    pub scope_id: u64,
    pub reason: Option<String>,
    /// Sanction length in seconds; `None` means permanent. Only ever set
    /// for bans and mutes.
    pub duration_seconds: Option<u64>,
    /// Set iff `duration_seconds` is set: `created_at + duration_seconds`.
    pub expires_at: Option<u64>,
    pub created_at: u64,
    pub active: bool,
}

/// Input for [`crate::impls::cases::add_case`].
pub struct NewCase<'a> {
    pub kind: CaseKind,
    pub subject_id: u64,
    pub actor_id: u64,
    pub scope_id: u64,
    pub reason: Option<&'a str>,
    pub duration_seconds: Option<u64>,
}

/// Full per-user moderation history, each list newest-first.
#[derive(Clone, Debug, Default)]
pub struct UserHistory {
    pub warns: Vec<Case>,
    pub bans: Vec<Case>,
    pub mutes: Vec<Case>,
    pub kicks: Vec<Case>,
}
