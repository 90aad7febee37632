use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::{ApplyStatus, LedgerError, LedgerKey, ScriptKind, SessionError};
use crate::ledger::{ChangeRecord, Ledger, LedgerState};
use crate::session::{Row, Session, SharedSession, sql_quote};

/// Ledger stored as a table in the target database, reached through
/// the shared session so a record can join the same unit of work as
/// the script it describes.
pub struct SqlLedger<S: Session> {
    session: SharedSession<S>,
    table: String,
    create_if_missing: bool,
    bootstrapped: bool,
    next_rank: i64,
}

impl<S: Session> SqlLedger<S> {
    pub fn new(session: SharedSession<S>, table: impl Into<String>, create_if_missing: bool) -> Self {
        Self {
            session,
            table: table.into(),
            create_if_missing,
            bootstrapped: false,
            next_rank: 0,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn bootstrap(&mut self) -> Result<(), LedgerError> {
        if self.bootstrapped {
            return Ok(());
        }
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             installed_rank BIGINT NOT NULL, \
             kind TEXT NOT NULL, \
             logical_path TEXT NOT NULL, \
             description TEXT NOT NULL, \
             checksum TEXT NOT NULL, \
             status TEXT NOT NULL, \
             applied_at TEXT NOT NULL, \
             execution_millis BIGINT NOT NULL, \
             PRIMARY KEY (kind, logical_path))",
            self.table
        );
        self.with_session(|session| session.execute(&ddl))
            .map_err(|e| LedgerError::Storage(format!("ledger bootstrap failed: {e}")))?;
        info!(table = %self.table, "ledger table bootstrapped");
        self.bootstrapped = true;
        Ok(())
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut S) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut guard = self.session.lock().map_err(SessionError::from)?;
        f(&mut guard)
    }

    fn decode_row(&self, row: &Row) -> Result<ChangeRecord, LedgerError> {
        let text = |column: &str| -> Result<String, LedgerError> {
            row.get(column)
                .and_then(|v| v.as_text())
                .map(str::to_string)
                .ok_or_else(|| {
                    LedgerError::Corrupt(format!("missing or non-text column '{column}'"))
                })
        };
        let int = |column: &str| -> Result<i64, LedgerError> {
            row.get(column).and_then(|v| v.as_int()).ok_or_else(|| {
                LedgerError::Corrupt(format!("missing or non-integer column '{column}'"))
            })
        };

        let kind_text = text("kind")?;
        let kind = ScriptKind::from_marker(&kind_text)
            .ok_or_else(|| LedgerError::Corrupt(format!("unknown script kind '{kind_text}'")))?;
        let status_text = text("status")?;
        let status = ApplyStatus::from_str(&status_text)
            .ok_or_else(|| LedgerError::Corrupt(format!("unknown status '{status_text}'")))?;
        let applied_at_text = text("applied_at")?;
        let applied_at = applied_at_text
            .parse::<DateTime<Utc>>()
            .map_err(|e| LedgerError::Corrupt(format!("bad applied_at '{applied_at_text}': {e}")))?;

        Ok(ChangeRecord {
            key: LedgerKey::new(kind, text("logical_path")?),
            description: text("description")?,
            checksum: text("checksum")?,
            status,
            applied_at,
            execution_millis: int("execution_millis")?.max(0) as u64,
            installed_rank: int("installed_rank")?,
        })
    }
}

impl<S: Session> Ledger for SqlLedger<S> {
    fn load_all(&mut self) -> Result<LedgerState, LedgerError> {
        if self.create_if_missing {
            self.bootstrap()?;
        }

        let select = format!(
            "SELECT installed_rank, kind, logical_path, description, checksum, \
             status, applied_at, execution_millis FROM {}",
            self.table
        );
        let rows = self.with_session(|session| session.query(&select)).map_err(|e| {
            if self.create_if_missing {
                LedgerError::Storage(format!("ledger read failed: {e}"))
            } else {
                LedgerError::Unavailable(format!(
                    "table '{}' cannot be read and bootstrap is disabled: {e}",
                    self.table
                ))
            }
        })?;

        let mut state = LedgerState::new();
        for row in &rows {
            state.insert(self.decode_row(row)?);
        }
        self.next_rank = self.next_rank.max(state.max_rank());
        debug!(table = %self.table, records = state.len(), "ledger loaded");
        Ok(state)
    }

    fn record(&mut self, record: &ChangeRecord) -> Result<(), LedgerError> {
        // Upsert without MERGE: the key is (kind, logical_path), so a
        // reapplied script replaces its previous row.
        let delete = format!(
            "DELETE FROM {} WHERE kind = {} AND logical_path = {}",
            self.table,
            sql_quote(record.key.kind.marker()),
            sql_quote(&record.key.logical_path),
        );
        let insert = format!(
            "INSERT INTO {} (installed_rank, kind, logical_path, description, \
             checksum, status, applied_at, execution_millis) \
             VALUES ({}, {}, {}, {}, {}, {}, {}, {})",
            self.table,
            record.installed_rank,
            sql_quote(record.key.kind.marker()),
            sql_quote(&record.key.logical_path),
            sql_quote(&record.description),
            sql_quote(&record.checksum),
            sql_quote(record.status.as_str()),
            sql_quote(&record.applied_at.to_rfc3339()),
            record.execution_millis,
        );

        self.with_session(|session| {
            session.execute(&delete)?;
            session.execute(&insert)
        })
        .map_err(|e| LedgerError::Storage(format!("ledger write failed: {e}")))
    }

    fn next_rank(&mut self) -> i64 {
        self.next_rank += 1;
        self.next_rank
    }
}
