pub mod database;
pub mod error;
pub mod impls;
pub mod model;

pub use database::Database;
pub use error::StoreError;
pub use model::audit::AuditEntry;
pub use model::case::{Case, CaseKind, NewCase, UserHistory};
