pub mod authorization;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod external;
pub mod rate_limit;
pub mod scheduler;

pub use config::ModerationConfig;
pub use engine::ModerationEngine;
pub use error::{ExecutorError, ModerationError};
pub use external::{EnforcementExecutor, Notifier, ScopeDirectory};
pub use scheduler::SanctionScheduler;
