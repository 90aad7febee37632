pub mod memory;
pub mod sql;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ApplyStatus, LedgerError, LedgerKey};

pub use memory::MemoryLedger;
pub use sql::SqlLedger;

/// One ledger row: the durable record of a script application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub key: LedgerKey,
    pub description: String,
    pub checksum: String,
    pub status: ApplyStatus,
    pub applied_at: DateTime<Utc>,
    pub execution_millis: u64,
    /// Monotonic sequence number assigned only by the ledger. Gives a
    /// global history order even if script files are reordered between
    /// runs.
    pub installed_rank: i64,
}

/// In-memory snapshot of the ledger, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    records: BTreeMap<LedgerKey, ChangeRecord>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LedgerKey) -> Option<&ChangeRecord> {
        self.records.get(key)
    }

    pub fn insert(&mut self, record: ChangeRecord) {
        self.records.insert(record.key.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.values()
    }

    pub fn max_rank(&self) -> i64 {
        self.records
            .values()
            .map(|r| r.installed_rank)
            .max()
            .unwrap_or(0)
    }
}

/// The persisted audit table, abstracted.
///
/// The ledger is an externally-injected handle: opened at run start,
/// closed at run end, never a process-wide singleton. Planning only
/// reads it; the orchestrator writes through [`Ledger::record`].
pub trait Ledger {
    /// Load every record. A first run against bootstrappable storage
    /// yields an empty state; genuinely unreadable storage yields
    /// [`LedgerError::Unavailable`].
    fn load_all(&mut self) -> Result<LedgerState, LedgerError>;

    /// Durably append or update one record, keyed by `(kind,
    /// logical_path)`. A re-applied script overwrites its previous row.
    fn record(&mut self, record: &ChangeRecord) -> Result<(), LedgerError>;

    /// Next `installed_rank`. Strictly monotonic within and across
    /// runs; only the ledger ever assigns ranks.
    fn next_rank(&mut self) -> i64;
}
