use std::path::{Path, PathBuf};

use crate::core::VarMap;

pub const DEFAULT_LEDGER_TABLE: &str = "change_history";

/// Configuration for one run.
///
/// Built once by the caller, read-only afterwards. No entity derived
/// from it persists in memory across runs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root folder scanned (recursively) for change scripts.
    pub root: PathBuf,

    /// Variable context handed to the renderer and mixed into checksums.
    pub vars: VarMap,

    /// Name of the ledger table.
    pub ledger_table: String,

    /// Treat a checksum mismatch on an applied versioned script as a
    /// re-apply instead of a conflict.
    pub allow_checksum_override: bool,

    /// Walk the plan and log every would-be action without executing
    /// or recording anything.
    pub dry_run: bool,

    /// Bootstrap the ledger table on first run instead of failing.
    pub create_ledger: bool,
}

impl RunOptions {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            vars: VarMap::new(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            allow_checksum_override: false,
            dry_run: false,
            create_ledger: true,
        }
    }

    /// Add one variable to the context.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Replace the whole variable context.
    pub fn vars(mut self, vars: VarMap) -> Self {
        self.vars = vars;
        self
    }

    /// Set the ledger table name.
    pub fn ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    pub fn allow_checksum_override(mut self, allow: bool) -> Self {
        self.allow_checksum_override = allow;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn create_ledger(mut self, create: bool) -> Self {
        self.create_ledger = create;
        self
    }
}
