pub mod error;
pub mod types;
pub mod version;

pub use error::{
    CatalogError, ExecutionError, LedgerError, MigrateError, PlanError, RenderError, Result,
    SessionError,
};
pub use types::{ApplyStatus, LedgerKey, ScriptKind, VarMap};
pub use version::Version;
