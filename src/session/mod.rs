pub mod memory;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::core::SessionError;

pub use memory::MemorySession;

/// Minimal value model for ledger rows coming back from a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
}

impl SqlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// One result row, column name to value.
pub type Row = BTreeMap<String, SqlValue>;

/// Contract with the target database.
///
/// The engine never talks a wire protocol itself; a production backend
/// (Postgres, Snowflake, ...) implements this trait and plugs in. All
/// calls block; the engine is strictly sequential.
pub trait Session {
    /// Acquire the underlying connection. Backends that connect at
    /// construction time can keep the default no-op.
    fn open(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Execute a statement (DDL/DML) that returns no rows.
    fn execute(&mut self, sql: &str) -> Result<(), SessionError>;

    /// Execute a query and return its rows. Only used for ledger reads.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SessionError>;

    /// Whether the backend can group a script and its ledger write into
    /// one atomic unit. When false, a crash between the two may leave
    /// the ledger behind the applied effects.
    fn supports_units(&self) -> bool {
        true
    }

    fn begin_unit(&mut self) -> Result<(), SessionError>;
    fn commit_unit(&mut self) -> Result<(), SessionError>;
    fn rollback_unit(&mut self) -> Result<(), SessionError>;

    /// Release the underlying connection. Must be safe to call once on
    /// every exit path.
    fn close(&mut self) -> Result<(), SessionError>;
}

/// Shared handle to a session. The ledger and the orchestrator both
/// talk to the same connection, sequentially.
pub type SharedSession<S> = Arc<Mutex<S>>;

pub fn shared<S: Session>(session: S) -> SharedSession<S> {
    Arc::new(Mutex::new(session))
}

/// Quote a string literal for embedding into generated SQL.
pub fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_embedded_single_quotes() {
        assert_eq!(sql_quote("it's"), "'it''s'");
        assert_eq!(sql_quote("plain"), "'plain'");
    }
}
