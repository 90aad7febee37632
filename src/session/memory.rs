use std::collections::VecDeque;

use crate::core::SessionError;
use crate::session::{Row, Session};

/// In-memory session for tests and offline planning.
///
/// Records every executed statement, serves pre-loaded rows for queries,
/// and can be armed to fail on statements containing a given substring.
/// It does not parse SQL.
#[derive(Debug, Default)]
pub struct MemorySession {
    executed: Vec<String>,
    canned_rows: VecDeque<Vec<Row>>,
    fail_on: Option<String>,
    fail_queries: bool,
    in_unit: bool,
    units_begun: usize,
    units_committed: usize,
    units_rolled_back: usize,
    closed: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the session to fail any statement containing `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    /// Arm the session to fail all queries, simulating an unreadable ledger.
    pub fn fail_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Queue rows to be returned by the next `query` call.
    pub fn push_query_rows(&mut self, rows: Vec<Row>) {
        self.canned_rows.push_back(rows);
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn executed_matching(&self, needle: &str) -> Vec<&String> {
        self.executed.iter().filter(|s| s.contains(needle)).collect()
    }

    pub fn units_begun(&self) -> usize {
        self.units_begun
    }

    pub fn units_committed(&self) -> usize {
        self.units_committed
    }

    pub fn units_rolled_back(&self) -> usize {
        self.units_rolled_back
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

impl Session for MemorySession {
    fn open(&mut self) -> Result<(), SessionError> {
        self.closed = false;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<(), SessionError> {
        self.check_open()?;
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(SessionError::Execute(format!(
                    "statement rejected (matched '{needle}')"
                )));
            }
        }
        self.executed.push(sql.to_string());
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SessionError> {
        self.check_open()?;
        if self.fail_queries {
            return Err(SessionError::Query(format!("query rejected: {sql}")));
        }
        Ok(self.canned_rows.pop_front().unwrap_or_default())
    }

    fn begin_unit(&mut self) -> Result<(), SessionError> {
        self.check_open()?;
        if self.in_unit {
            return Err(SessionError::Unit("unit already open".to_string()));
        }
        self.in_unit = true;
        self.units_begun += 1;
        Ok(())
    }

    fn commit_unit(&mut self) -> Result<(), SessionError> {
        self.check_open()?;
        if !self.in_unit {
            return Err(SessionError::Unit("no open unit to commit".to_string()));
        }
        self.in_unit = false;
        self.units_committed += 1;
        Ok(())
    }

    fn rollback_unit(&mut self) -> Result<(), SessionError> {
        self.check_open()?;
        if !self.in_unit {
            return Err(SessionError::Unit("no open unit to roll back".to_string()));
        }
        self.in_unit = false;
        self.units_rolled_back += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        Ok(())
    }
}
