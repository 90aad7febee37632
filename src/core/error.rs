use thiserror::Error;

/// Errors raised while building the script catalog.
///
/// All catalog errors are fatal and abort the run before anything executes.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Duplicate version '{version}': declared by both '{first}' and '{second}'")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("Duplicate {kind} script '{name}': declared by both '{first}' and '{second}'")]
    DuplicateName {
        kind: &'static str,
        name: String,
        first: String,
        second: String,
    },

    #[error("Unrecognized script file name '{0}': expected V<version>__<description>, R__<description> or A__<description>")]
    UnrecognizedScript(String),

    #[error("Invalid version token '{token}' in '{file}': segments must be numeric")]
    InvalidVersion { token: String, file: String },

    #[error("I/O error scanning script root: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the change ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger storage cannot be read and bootstrap is disabled.
    #[error("Change ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Change ledger read/write failed: {0}")]
    Storage(String),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

/// Plan-time conflicts. Both variants name the offending script and
/// fail an `apply` run before any step executes.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(
        "Checksum mismatch for '{script}': recorded {recorded}, current {current}. \
         The script was edited after being applied"
    )]
    ChecksumMismatch {
        script: String,
        recorded: String,
        current: String,
    },

    #[error(
        "Version '{script}' has a failed prior run on record; resolve it before \
         later versioned scripts can be applied"
    )]
    FailedVersion { script: String },
}

/// Errors from the template renderer contract.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Undefined variable '{0}' referenced by script template")]
    UndefinedVariable(String),
}

/// Errors from the database session contract.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Statement failed: {0}")]
    Execute(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unit of work error: {0}")]
    Unit(String),

    #[error("Session is closed")]
    Closed,

    #[error("Lock error: {0}")]
    Lock(String),
}

impl<T> From<std::sync::PoisonError<T>> for SessionError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

/// A script's statements failed during execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Script '{script}' failed: {source}")]
    Script {
        script: String,
        source: SessionError,
    },

    #[error("Script '{script}' could not be rendered: {source}")]
    Render {
        script: String,
        source: RenderError,
    },
}

/// Top-level error type for one run.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, MigrateError>;
