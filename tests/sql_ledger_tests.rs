use chrono::Utc;
use schemarun::ledger::{ChangeRecord, Ledger, SqlLedger};
use schemarun::session::{MemorySession, Row, SqlValue, shared};
use schemarun::{ApplyStatus, LedgerError, LedgerKey, ScriptKind};

fn ledger_row(rank: i64, kind: &str, logical: &str, checksum: &str, status: &str) -> Row {
    let mut row = Row::new();
    row.insert("installed_rank".to_string(), SqlValue::Int(rank));
    row.insert("kind".to_string(), SqlValue::Text(kind.to_string()));
    row.insert("logical_path".to_string(), SqlValue::Text(logical.to_string()));
    row.insert("description".to_string(), SqlValue::Text("desc".to_string()));
    row.insert("checksum".to_string(), SqlValue::Text(checksum.to_string()));
    row.insert("status".to_string(), SqlValue::Text(status.to_string()));
    row.insert(
        "applied_at".to_string(),
        SqlValue::Text("2024-01-01T00:00:00Z".to_string()),
    );
    row.insert("execution_millis".to_string(), SqlValue::Int(42));
    row
}

#[test]
fn load_bootstraps_the_table_when_enabled() {
    let session = shared(MemorySession::new());
    let mut ledger = SqlLedger::new(session.clone(), "change_history", true);

    let state = ledger.load_all().unwrap();
    assert!(state.is_empty());

    let executed = session.lock().unwrap().executed().to_vec();
    assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS change_history"));
    assert!(executed[0].contains("PRIMARY KEY (kind, logical_path)"));
}

#[test]
fn bootstrap_runs_once_across_loads() {
    let session = shared(MemorySession::new());
    let mut ledger = SqlLedger::new(session.clone(), "change_history", true);

    ledger.load_all().unwrap();
    ledger.load_all().unwrap();

    let creates = session
        .lock()
        .unwrap()
        .executed_matching("CREATE TABLE")
        .len();
    assert_eq!(creates, 1);
}

#[test]
fn unreadable_ledger_without_bootstrap_is_unavailable() {
    let session = shared(MemorySession::new().fail_queries());
    let mut ledger = SqlLedger::new(session, "change_history", false);

    let err = ledger.load_all().unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

#[test]
fn load_decodes_rows_and_continues_rank_sequence() {
    let session = shared(MemorySession::new());
    session.lock().unwrap().push_query_rows(vec![
        ledger_row(1, "V", "1", "abc", "Success"),
        ledger_row(2, "R", "seed data", "def", "Success"),
        ledger_row(3, "V", "2", "ghi", "Failed"),
    ]);
    let mut ledger = SqlLedger::new(session, "change_history", true);

    let state = ledger.load_all().unwrap();
    assert_eq!(state.len(), 3);

    let v1 = state
        .get(&LedgerKey::new(ScriptKind::Versioned, "1"))
        .unwrap();
    assert_eq!(v1.checksum, "abc");
    assert_eq!(v1.status, ApplyStatus::Success);
    assert_eq!(v1.execution_millis, 42);

    let v2 = state
        .get(&LedgerKey::new(ScriptKind::Versioned, "2"))
        .unwrap();
    assert_eq!(v2.status, ApplyStatus::Failed);

    // Ranks continue after the stored maximum.
    assert_eq!(ledger.next_rank(), 4);
    assert_eq!(ledger.next_rank(), 5);
}

#[test]
fn corrupt_rows_are_reported() {
    let session = shared(MemorySession::new());
    let mut bad = ledger_row(1, "V", "1", "abc", "Success");
    bad.insert("status".to_string(), SqlValue::Text("Unknown".to_string()));
    session.lock().unwrap().push_query_rows(vec![bad]);
    let mut ledger = SqlLedger::new(session, "change_history", true);

    let err = ledger.load_all().unwrap_err();
    assert!(matches!(err, LedgerError::Corrupt(_)));
}

#[test]
fn record_upserts_by_kind_and_logical_path() {
    let session = shared(MemorySession::new());
    let mut ledger = SqlLedger::new(session.clone(), "change_history", true);
    ledger.load_all().unwrap();

    let record = ChangeRecord {
        key: LedgerKey::new(ScriptKind::Repeatable, "seed data"),
        description: "seed data".to_string(),
        checksum: "abc123".to_string(),
        status: ApplyStatus::Success,
        applied_at: Utc::now(),
        execution_millis: 7,
        installed_rank: ledger.next_rank(),
    };
    ledger.record(&record).unwrap();

    let executed = session.lock().unwrap().executed().to_vec();
    let delete = executed
        .iter()
        .find(|s| s.starts_with("DELETE FROM change_history"))
        .unwrap();
    assert!(delete.contains("kind = 'R'"));
    assert!(delete.contains("logical_path = 'seed data'"));

    let insert = executed
        .iter()
        .find(|s| s.starts_with("INSERT INTO change_history"))
        .unwrap();
    assert!(insert.contains("'abc123'"));
    assert!(insert.contains("'Success'"));
}

#[test]
fn string_values_are_quoted_safely() {
    let session = shared(MemorySession::new());
    let mut ledger = SqlLedger::new(session.clone(), "change_history", true);
    ledger.load_all().unwrap();

    let record = ChangeRecord {
        key: LedgerKey::new(ScriptKind::Repeatable, "it's tricky"),
        description: "it's tricky".to_string(),
        checksum: "x".to_string(),
        status: ApplyStatus::Success,
        applied_at: Utc::now(),
        execution_millis: 1,
        installed_rank: ledger.next_rank(),
    };
    ledger.record(&record).unwrap();

    let executed = session.lock().unwrap().executed().to_vec();
    assert!(executed.iter().any(|s| s.contains("'it''s tricky'")));
}
