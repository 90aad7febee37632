use std::fs;
use std::path::Path;

use schemarun::catalog::Catalog;
use schemarun::ordering::resolve_order;
use schemarun::{CatalogError, ScriptKind, VarMap};
use tempfile::TempDir;

fn write_script(root: &Path, name: &str, body: &str) {
    fs::write(root.join(name), body).unwrap();
}

#[test]
fn scan_classifies_and_orders_scripts() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "V2__add_column.sql", "ALTER TABLE t ADD c INTEGER;");
    write_script(dir.path(), "V1__create_table.sql", "CREATE TABLE t (id INTEGER);");
    write_script(dir.path(), "A__set_session.sql", "SET timeout = 10;");
    write_script(dir.path(), "R__seed_data.sql", "INSERT INTO t VALUES (1);");

    let catalog = Catalog::scan(dir.path(), &VarMap::new()).unwrap();
    assert_eq!(catalog.len(), 4);

    let ordered = resolve_order(&catalog);
    let names: Vec<_> = ordered.iter().map(|s| s.display_name()).collect();
    assert_eq!(
        names,
        vec![
            "V1 (create table)",
            "V2 (add column)",
            "R__seed data",
            "A__set session",
        ]
    );

    let v1 = &ordered[0];
    assert_eq!(v1.kind, ScriptKind::Versioned);
    assert_eq!(v1.logical_path, "1");
    assert_eq!(v1.description, "create table");
    assert!(v1.scope.is_none());
}

#[test]
fn version_order_is_numeric_not_lexical() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "V1.10__later.sql", "SELECT 10;");
    write_script(dir.path(), "V1.9__earlier.sql", "SELECT 9;");
    write_script(dir.path(), "V1.2__first.sql", "SELECT 2;");

    let catalog = Catalog::scan(dir.path(), &VarMap::new()).unwrap();
    let ordered = resolve_order(&catalog);
    let versions: Vec<_> = ordered.iter().map(|s| s.logical_path.clone()).collect();
    assert_eq!(versions, vec!["1.2", "1.9", "1.10"]);
}

#[test]
fn duplicate_versions_fail_the_scan() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "V2__first.sql", "SELECT 1;");
    write_script(dir.path(), "V2__second.sql", "SELECT 2;");

    let err = Catalog::scan(dir.path(), &VarMap::new()).unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateVersion { .. }));
}

#[test]
fn equivalent_version_spellings_are_duplicates() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "V1.0__dotted.sql", "SELECT 1;");
    write_script(dir.path(), "V1_0__underscored.sql", "SELECT 1;");

    let err = Catalog::scan(dir.path(), &VarMap::new()).unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateVersion { .. }));
}

#[test]
fn duplicate_repeatable_names_fail_the_scan() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "R__seed.sql", "SELECT 1;");
    fs::create_dir(dir.path().join("sub")).unwrap();
    write_script(&dir.path().join("sub"), "R__seed.sql", "SELECT 2;");

    let err = Catalog::scan(dir.path(), &VarMap::new()).unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateName { .. }));
}

#[test]
fn unrecognized_sql_file_is_surfaced_not_skipped() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "V1__fine.sql", "SELECT 1;");
    write_script(dir.path(), "hotfix.sql", "DROP TABLE t;");

    let err = Catalog::scan(dir.path(), &VarMap::new()).unwrap_err();
    match err {
        CatalogError::UnrecognizedScript(name) => assert_eq!(name, "hotfix.sql"),
        other => panic!("expected UnrecognizedScript, got {other:?}"),
    }
}

#[test]
fn non_sql_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "V1__fine.sql", "SELECT 1;");
    write_script(dir.path(), "README.md", "# docs");
    write_script(dir.path(), "helper.py", "print('x')");

    let catalog = Catalog::scan(dir.path(), &VarMap::new()).unwrap();
    assert_eq!(catalog.len(), 1);
}

#[test]
fn subdirectory_becomes_scope() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("analytics")).unwrap();
    write_script(
        &dir.path().join("analytics"),
        "V1__create.sql",
        "CREATE TABLE a (id INTEGER);",
    );
    write_script(dir.path(), "V2__top_level.sql", "SELECT 1;");

    let catalog = Catalog::scan(dir.path(), &VarMap::new()).unwrap();
    let v1 = catalog.iter().find(|s| s.logical_path == "1").unwrap();
    assert_eq!(v1.scope.as_deref(), Some("analytics"));
    let v2 = catalog.iter().find(|s| s.logical_path == "2").unwrap();
    assert!(v2.scope.is_none());
}

#[test]
fn checksum_changes_with_body_and_variables() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "R__seed.sql", "INSERT INTO t VALUES ({{ id }});");

    let mut vars = VarMap::new();
    vars.insert("id".to_string(), serde_json::json!("1"));
    let first = Catalog::scan(dir.path(), &vars).unwrap();
    let checksum_one = first.iter().next().unwrap().checksum.clone();

    // Same body, same vars: stable.
    let again = Catalog::scan(dir.path(), &vars).unwrap();
    assert_eq!(again.iter().next().unwrap().checksum, checksum_one);

    // Changed variable: checksum moves.
    vars.insert("id".to_string(), serde_json::json!("2"));
    let with_new_var = Catalog::scan(dir.path(), &vars).unwrap();
    assert_ne!(with_new_var.iter().next().unwrap().checksum, checksum_one);

    // Changed body: checksum moves.
    write_script(dir.path(), "R__seed.sql", "INSERT INTO t VALUES (99);");
    let with_new_body = Catalog::scan(dir.path(), &vars).unwrap();
    assert_ne!(
        with_new_body.iter().next().unwrap().checksum,
        with_new_var.iter().next().unwrap().checksum
    );
}

#[test]
fn jinja_extension_is_recognized() {
    let dir = TempDir::new().unwrap();
    write_script(
        dir.path(),
        "V1__templated.sql.jinja",
        "USE SCHEMA {{ schema }};",
    );

    let catalog = Catalog::scan(dir.path(), &VarMap::new()).unwrap();
    let script = catalog.iter().next().unwrap();
    assert_eq!(script.kind, ScriptKind::Versioned);
    assert_eq!(script.description, "templated");
}
