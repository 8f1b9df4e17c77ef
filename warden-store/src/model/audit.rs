/// One append-only audit trail row. Written for every case creation,
/// reversal, supersession, and warn removal; never mutated or deleted.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub id: i64,
    pub action_type: String,
    pub subject_id: u64,
    pub actor_id: u64,
    pub scope_id: u64,
    pub details: Option<String>,
    pub created_at: u64,
}
