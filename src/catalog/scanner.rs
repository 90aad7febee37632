use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::{CatalogError, ScriptKind, Version};

/// Metadata parsed from one script file name, before the body is read.
#[derive(Debug)]
pub struct ParsedName {
    pub kind: ScriptKind,
    pub version: Option<Version>,
    pub description: String,
}

pub struct NameParser {
    versioned: Regex,
    repeatable: Regex,
    always: Regex,
    sql_like: Regex,
}

impl NameParser {
    pub fn new() -> Self {
        // Convention from the V/R/A prefix scheme:
        //   V<version>__<description>.sql[.jinja]
        //   R__<description>.sql[.jinja]
        //   A__<description>.sql[.jinja]
        Self {
            versioned: Regex::new(r"(?i)^v([^_]|_[^_])+__.+\.sql(\.jinja)?$").unwrap(),
            repeatable: Regex::new(r"(?i)^r__.+\.sql(\.jinja)?$").unwrap(),
            always: Regex::new(r"(?i)^a__.+\.sql(\.jinja)?$").unwrap(),
            sql_like: Regex::new(r"(?i)\.sql(\.jinja)?$").unwrap(),
        }
    }

    /// Classify one file name. `Ok(None)` means the file is not a SQL
    /// script and is ignored; an unclassifiable SQL file is an error so
    /// a typo can never silently drop a migration.
    pub fn parse(&self, file_name: &str) -> Result<Option<ParsedName>, CatalogError> {
        if !self.sql_like.is_match(file_name) {
            return Ok(None);
        }

        let stem = strip_sql_suffix(file_name);

        if self.versioned.is_match(file_name) {
            let rest = &stem[1..];
            let (token, description) = rest
                .split_once("__")
                .ok_or_else(|| CatalogError::UnrecognizedScript(file_name.to_string()))?;
            let version = Version::parse(token, file_name)?;
            return Ok(Some(ParsedName {
                kind: ScriptKind::Versioned,
                version: Some(version),
                description: humanize(description),
            }));
        }

        if self.repeatable.is_match(file_name) || self.always.is_match(file_name) {
            let kind = if self.repeatable.is_match(file_name) {
                ScriptKind::Repeatable
            } else {
                ScriptKind::Always
            };
            let description = &stem[3..];
            return Ok(Some(ParsedName {
                kind,
                version: None,
                description: humanize(description),
            }));
        }

        Err(CatalogError::UnrecognizedScript(file_name.to_string()))
    }
}

impl Default for NameParser {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_sql_suffix(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".sql.jinja") {
        &file_name[..file_name.len() - ".sql.jinja".len()]
    } else {
        &file_name[..file_name.len() - ".sql".len()]
    }
}

/// `add_user_table` -> `add user table`, matching how descriptions are
/// recorded in the ledger.
fn humanize(token: &str) -> String {
    token.replace('_', " ").trim().to_string()
}

/// Recursively collect candidate files under `root`, in a stable
/// (sorted) traversal order.
pub fn walk_scripts(root: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let mut out = Vec::new();
    walk_dir(root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_dir(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// The first-level subdirectory under the root, if the script lives in
/// one. Used as an informational scope label (e.g. schema override).
pub fn scope_of(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut components = rel.components();
    let first = components.next()?;
    // A file directly under the root has no scope.
    components.next()?;
    Some(first.as_os_str().to_string_lossy().into_owned())
}
