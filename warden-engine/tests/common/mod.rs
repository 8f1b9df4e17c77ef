#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use warden_engine::config::ModerationConfig;
use warden_engine::error::ExecutorError;
use warden_engine::external::{EnforcementExecutor, Notifier, ScopeDirectory};
use warden_engine::ModerationEngine;
use warden_store::{CaseKind, Database};

pub const OWNER: u64 = 1;
pub const SERVICE: u64 = 2;
pub const STAFF_ACTOR: u64 = 100;
pub const ADMIN_ACTOR: u64 = 101;
pub const SUBJECT: u64 = 500;
pub const OTHER_SUBJECT: u64 = 501;
pub const PEER: u64 = 600; // same rank as STAFF_ACTOR
pub const OUTSIDER: u64 = 700; // no roles at all
pub const SCOPE: u64 = 42;
pub const STAFF_ROLE: u64 = 7;
pub const ADMIN_ROLE: u64 = 8;

/// Counts and records platform calls; failure injection via token counters.
#[derive(Default)]
pub struct MockExecutor {
    pub applied: Mutex<Vec<(CaseKind, u64, u64)>>,
    pub removed: Mutex<Vec<(CaseKind, u64, u64)>>,
    pub fail_applies: AtomicU32,
    pub fail_removals: AtomicU32,
}

impl MockExecutor {
    pub fn applies(&self) -> usize {
        self.applied.lock().len()
    }

    pub fn removals(&self) -> usize {
        self.removed.lock().len()
    }
}

fn take_token(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| value.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EnforcementExecutor for MockExecutor {
    async fn apply(&self, kind: CaseKind, subject: u64, scope: u64) -> Result<(), ExecutorError> {
        if take_token(&self.fail_applies) {
            return Err(ExecutorError::Request("injected apply failure".to_owned()));
        }
        self.applied.lock().push((kind, subject, scope));
        Ok(())
    }

    async fn remove(&self, kind: CaseKind, subject: u64, scope: u64) -> Result<(), ExecutorError> {
        if take_token(&self.fail_removals) {
            return Err(ExecutorError::Request("injected removal failure".to_owned()));
        }
        self.removed.lock().push((kind, subject, scope));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub subject_messages: Mutex<Vec<(u64, String)>>,
    pub scope_messages: Mutex<Vec<(u64, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_subject(&self, subject: u64, message: &str) {
        self.subject_messages.lock().push((subject, message.to_owned()));
    }

    async fn log_to_scope(&self, scope: u64, message: &str) {
        self.scope_messages.lock().push((scope, message.to_owned()));
    }
}

pub struct StaticDirectory {
    pub administrators: Vec<u64>,
    pub roles: HashMap<u64, Vec<u64>>,
    pub ranks: HashMap<u64, i64>,
}

impl Default for StaticDirectory {
    fn default() -> Self {
        let mut roles = HashMap::new();
        roles.insert(STAFF_ACTOR, vec![STAFF_ROLE]);
        roles.insert(ADMIN_ACTOR, vec![ADMIN_ROLE]);

        let mut ranks = HashMap::new();
        ranks.insert(OWNER, 100);
        ranks.insert(STAFF_ACTOR, 10);
        ranks.insert(ADMIN_ACTOR, 20);
        ranks.insert(PEER, 10);
        ranks.insert(SUBJECT, 1);
        ranks.insert(OTHER_SUBJECT, 1);

        Self {
            administrators: Vec::new(),
            roles,
            ranks,
        }
    }
}

#[async_trait]
impl ScopeDirectory for StaticDirectory {
    async fn is_administrator(&self, user: u64, _scope: u64) -> bool {
        self.administrators.contains(&user)
    }

    async fn role_ids(&self, user: u64, _scope: u64) -> Vec<u64> {
        self.roles.get(&user).cloned().unwrap_or_default()
    }

    async fn highest_rank(&self, user: u64, _scope: u64) -> i64 {
        self.ranks.get(&user).copied().unwrap_or(0)
    }
}

/// Test config: real role ids, a rate limit generous enough to stay out of
/// the way unless a test tightens it, and a fast sweep.
pub fn test_config() -> ModerationConfig {
    let mut config = ModerationConfig::default();
    config.staff_roles = vec![STAFF_ROLE];
    config.admin_roles = vec![ADMIN_ROLE];
    config.rate_limit.max_commands = 100;
    config.sweep_interval_seconds = 1;
    config
}

pub struct Harness {
    pub db: Database,
    pub engine: ModerationEngine,
    pub executor: Arc<MockExecutor>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn harness(config: ModerationConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let db = Database::connect(":memory:").await.expect("in-memory database");
    let executor = Arc::new(MockExecutor::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let engine = ModerationEngine::new(
        db.clone(),
        config,
        OWNER,
        SERVICE,
        Arc::clone(&executor) as Arc<dyn EnforcementExecutor>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::new(StaticDirectory::default()) as Arc<dyn ScopeDirectory>,
    );

    Harness {
        db,
        engine,
        executor,
        notifier,
    }
}
