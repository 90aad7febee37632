use crate::core::LedgerError;
use crate::ledger::{ChangeRecord, Ledger, LedgerState};

/// BTreeMap-backed ledger for tests and the `memory` engine.
///
/// Persists for as long as the value lives, so a test can run the
/// orchestrator twice against the same instance to observe cross-run
/// behavior.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: LedgerState,
    next_rank: i64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with pre-existing records (simulated history).
    pub fn with_records(records: impl IntoIterator<Item = ChangeRecord>) -> Self {
        let mut state = LedgerState::new();
        for record in records {
            state.insert(record);
        }
        let next_rank = state.max_rank();
        Self { state, next_rank }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }
}

impl Ledger for MemoryLedger {
    fn load_all(&mut self) -> Result<LedgerState, LedgerError> {
        self.next_rank = self.next_rank.max(self.state.max_rank());
        Ok(self.state.clone())
    }

    fn record(&mut self, record: &ChangeRecord) -> Result<(), LedgerError> {
        self.state.insert(record.clone());
        Ok(())
    }

    fn next_rank(&mut self) -> i64 {
        self.next_rank += 1;
        self.next_rank
    }
}
