pub mod checksum;
pub mod scanner;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::{CatalogError, LedgerKey, ScriptKind, VarMap, Version};

pub use checksum::script_checksum;
pub use scanner::NameParser;

/// One discovered change unit.
#[derive(Debug, Clone)]
pub struct ScriptFile {
    pub kind: ScriptKind,
    /// Present only for versioned scripts.
    pub version: Option<Version>,
    /// Human label parsed from the file name.
    pub description: String,
    /// Identity key for ledger matching: the version string for
    /// versioned scripts, the description for repeatable/always.
    pub logical_path: String,
    /// Drift/change signal over the raw body plus variable context.
    pub checksum: String,
    /// First-level subdirectory under the script root, when any.
    pub scope: Option<String>,
    pub path: PathBuf,
    /// Raw (pre-render) script body.
    pub body: String,
}

impl ScriptFile {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.kind, self.logical_path.clone())
    }

    /// Short identity used in logs and error messages, e.g. `V1.2 (create users)`.
    pub fn display_name(&self) -> String {
        match &self.version {
            Some(v) => format!("V{} ({})", v.raw(), self.description),
            None => format!("{}__{}", self.kind.marker(), self.description),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The set of change scripts discovered under one root.
///
/// Construction fails on duplicate identities and unrecognizable SQL
/// file names; a catalog that builds at all is safe to plan from.
#[derive(Debug, Default)]
pub struct Catalog {
    scripts: Vec<ScriptFile>,
}

impl Catalog {
    /// Scan `root` recursively and build the catalog.
    pub fn scan(root: &Path, vars: &VarMap) -> Result<Self, CatalogError> {
        let parser = NameParser::new();
        let mut scripts = Vec::new();
        // (kind, logical_path) -> file name, for duplicate detection
        let mut seen: HashMap<LedgerKey, String> = HashMap::new();

        for path in scanner::walk_scripts(root)? {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(parsed) = parser.parse(&file_name)? else {
                debug!(file = %file_name, "ignoring non-script file");
                continue;
            };

            let body = fs::read_to_string(&path)?;
            let script = ScriptFile {
                logical_path: match &parsed.version {
                    Some(v) => v.raw().to_string(),
                    None => parsed.description.clone(),
                },
                checksum: script_checksum(&body, vars),
                scope: scanner::scope_of(root, &path),
                kind: parsed.kind,
                version: parsed.version,
                description: parsed.description,
                path: path.clone(),
                body,
            };

            if let Some(first) = seen.get(&script.key()) {
                return Err(match script.kind {
                    ScriptKind::Versioned => CatalogError::DuplicateVersion {
                        version: script.logical_path.clone(),
                        first: first.clone(),
                        second: file_name,
                    },
                    ScriptKind::Repeatable => CatalogError::DuplicateName {
                        kind: "repeatable",
                        name: script.logical_path.clone(),
                        first: first.clone(),
                        second: file_name,
                    },
                    ScriptKind::Always => CatalogError::DuplicateName {
                        kind: "always",
                        name: script.logical_path.clone(),
                        first: first.clone(),
                        second: file_name,
                    },
                });
            }
            seen.insert(script.key(), file_name);
            scripts.push(script);
        }

        // Two version tokens can differ as strings yet compare equal
        // ("1.0" vs "1_0"); catch those too.
        let mut versions: Vec<&ScriptFile> = scripts
            .iter()
            .filter(|s| s.kind == ScriptKind::Versioned)
            .collect();
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        for pair in versions.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(CatalogError::DuplicateVersion {
                    version: pair[0].logical_path.clone(),
                    first: pair[0].file_name(),
                    second: pair[1].file_name(),
                });
            }
        }

        debug!(scripts = scripts.len(), root = %root.display(), "catalog built");
        Ok(Self { scripts })
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptFile> {
        self.scripts.iter()
    }

    pub fn scripts(&self) -> &[ScriptFile] {
        &self.scripts
    }
}
