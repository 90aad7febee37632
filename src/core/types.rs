use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Variable context supplied to scripts. BTreeMap keeps iteration order
/// stable, which the checksum computation relies on.
pub type VarMap = BTreeMap<String, serde_json::Value>;

/// Classification of a change script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    /// Unique ordered version, applied at most once.
    Versioned,
    /// No version; reapplied whenever its checksum changes.
    Repeatable,
    /// Executed unconditionally on every run, last in order.
    Always,
}

impl ScriptKind {
    /// One-letter marker used in file names and ledger rows.
    pub fn marker(&self) -> &'static str {
        match self {
            ScriptKind::Versioned => "V",
            ScriptKind::Repeatable => "R",
            ScriptKind::Always => "A",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "V" | "v" => Some(ScriptKind::Versioned),
            "R" | "r" => Some(ScriptKind::Repeatable),
            "A" | "a" => Some(ScriptKind::Always),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Identity key used to match scripts against ledger rows: the version
/// string for versioned scripts, the description for repeatable/always.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub kind: ScriptKind,
    pub logical_path: String,
}

impl LedgerKey {
    pub fn new(kind: ScriptKind, logical_path: impl Into<String>) -> Self {
        Self {
            kind,
            logical_path: logical_path.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.logical_path)
    }
}

/// Outcome recorded for an applied script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyStatus {
    Success,
    Failed,
}

impl ApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStatus::Success => "Success",
            ApplyStatus::Failed => "Failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Success" => Some(ApplyStatus::Success),
            "Failed" => Some(ApplyStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
