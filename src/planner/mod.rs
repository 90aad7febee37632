use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::ScriptFile;
use crate::core::{ApplyStatus, LedgerKey, PlanError, ScriptKind};
use crate::ledger::{ChangeRecord, LedgerState};

/// Decision for one script in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepAction {
    /// Versioned script already applied with a matching checksum.
    SkipApplied,
    /// Repeatable script whose checksum is unchanged.
    SkipUnchanged,
    /// New versioned script, always script, or overridden drift.
    Apply,
    /// Repeatable script with a new or changed checksum.
    Reapply,
    /// Applied versioned script whose checksum no longer matches.
    ConflictChecksumMismatch,
    /// Versioned script with a `Failed` record; blocks everything
    /// after it until resolved.
    ConflictFailedVersion,
}

impl StepAction {
    pub fn is_skip(&self) -> bool {
        matches!(self, StepAction::SkipApplied | StepAction::SkipUnchanged)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, StepAction::Apply | StepAction::Reapply)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StepAction::ConflictChecksumMismatch | StepAction::ConflictFailedVersion
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::SkipApplied => "skip (applied)",
            StepAction::SkipUnchanged => "skip (unchanged)",
            StepAction::Apply => "apply",
            StepAction::Reapply => "reapply",
            StepAction::ConflictChecksumMismatch => "conflict (checksum mismatch)",
            StepAction::ConflictFailedVersion => "conflict (failed version)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub script: ScriptFile,
    pub action: StepAction,
    /// Checksum last recorded in the ledger, when a record exists.
    pub recorded_checksum: Option<String>,
}

/// Ordered execution plan for one run. Produced by pure read-only
/// planning; nothing here has touched the database yet.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    steps: Vec<PlannedStep>,
    unresolved_failures: Vec<ChangeRecord>,
}

impl MigrationPlan {
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// `Failed` versioned records with no script in the catalog. The
    /// ledger record is the block, not the file: deleting a failed
    /// script does not resolve it.
    pub fn unresolved_failures(&self) -> &[ChangeRecord] {
        &self.unresolved_failures
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps that would execute.
    pub fn pending(&self) -> usize {
        self.steps.iter().filter(|s| s.action.is_pending()).count()
    }

    pub fn first_conflict(&self) -> Option<&PlannedStep> {
        self.steps.iter().find(|s| s.action.is_conflict())
    }

    pub fn has_conflicts(&self) -> bool {
        self.first_conflict().is_some() || !self.unresolved_failures.is_empty()
    }

    /// Fail if the plan contains any conflict, naming the first one.
    pub fn ensure_applicable(&self) -> Result<(), PlanError> {
        if let Some(record) = self.unresolved_failures.first() {
            return Err(PlanError::FailedVersion {
                script: format!("V{} ({})", record.key.logical_path, record.description),
            });
        }
        let Some(step) = self.first_conflict() else {
            return Ok(());
        };
        Err(match step.action {
            StepAction::ConflictFailedVersion => PlanError::FailedVersion {
                script: step.script.display_name(),
            },
            _ => PlanError::ChecksumMismatch {
                script: step.script.display_name(),
                recorded: step.recorded_checksum.clone().unwrap_or_default(),
                current: step.script.checksum.clone(),
            },
        })
    }
}

/// Diff the ordered catalog against the loaded ledger.
///
/// Planning never mutates the ledger. With `allow_checksum_override`, a
/// drifted versioned script becomes `Apply` (re-executed, checksum
/// re-recorded); a failed prior version is never overridable.
pub fn build_plan(
    ordered: &[ScriptFile],
    ledger: &LedgerState,
    allow_checksum_override: bool,
) -> MigrationPlan {
    let mut steps = Vec::with_capacity(ordered.len());
    let mut catalog_keys: HashSet<LedgerKey> = HashSet::with_capacity(ordered.len());

    for script in ordered {
        catalog_keys.insert(script.key());
        let record = ledger.get(&script.key());
        let action = match script.kind {
            ScriptKind::Versioned => match record {
                None => StepAction::Apply,
                Some(rec) if rec.status == ApplyStatus::Failed => {
                    StepAction::ConflictFailedVersion
                }
                Some(rec) if rec.checksum != script.checksum => {
                    if allow_checksum_override {
                        StepAction::Apply
                    } else {
                        StepAction::ConflictChecksumMismatch
                    }
                }
                Some(_) => StepAction::SkipApplied,
            },
            ScriptKind::Repeatable => match record {
                Some(rec) if rec.checksum == script.checksum => StepAction::SkipUnchanged,
                _ => StepAction::Reapply,
            },
            // No checksum comparison: always scripts run every time.
            ScriptKind::Always => StepAction::Apply,
        };

        debug!(script = %script.display_name(), action = action.as_str(), "planned");
        steps.push(PlannedStep {
            script: script.clone(),
            action,
            recorded_checksum: record.map(|r| r.checksum.clone()),
        });
    }

    // A Failed versioned record still blocks the run when its file is
    // gone from the catalog. Otherwise deleting the script would
    // silently unblock everything after the failed version.
    let mut unresolved_failures: Vec<ChangeRecord> = ledger
        .iter()
        .filter(|rec| {
            rec.key.kind == ScriptKind::Versioned
                && rec.status == ApplyStatus::Failed
                && !catalog_keys.contains(&rec.key)
        })
        .cloned()
        .collect();
    unresolved_failures.sort_by_key(|rec| rec.installed_rank);
    for rec in &unresolved_failures {
        warn!(
            version = %rec.key.logical_path,
            description = %rec.description,
            "failed version has no script in the catalog"
        );
    }

    MigrationPlan {
        steps,
        unresolved_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LedgerKey;
    use crate::ledger::ChangeRecord;
    use chrono::Utc;
    use std::path::PathBuf;

    fn script(kind: ScriptKind, logical: &str, checksum: &str) -> ScriptFile {
        let version = match kind {
            ScriptKind::Versioned => {
                Some(crate::core::Version::parse(logical, "test.sql").unwrap())
            }
            _ => None,
        };
        ScriptFile {
            kind,
            version,
            description: logical.to_string(),
            logical_path: logical.to_string(),
            checksum: checksum.to_string(),
            scope: None,
            path: PathBuf::from(format!("{logical}.sql")),
            body: String::new(),
        }
    }

    fn record(kind: ScriptKind, logical: &str, checksum: &str, status: ApplyStatus) -> ChangeRecord {
        ChangeRecord {
            key: LedgerKey::new(kind, logical),
            description: logical.to_string(),
            checksum: checksum.to_string(),
            status,
            applied_at: Utc::now(),
            execution_millis: 1,
            installed_rank: 1,
        }
    }

    #[test]
    fn failed_version_is_a_conflict_even_with_matching_checksum() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(ScriptKind::Versioned, "1", "abc", ApplyStatus::Failed));

        let plan = build_plan(&[script(ScriptKind::Versioned, "1", "abc")], &ledger, false);
        assert_eq!(plan.steps()[0].action, StepAction::ConflictFailedVersion);
        assert!(plan.ensure_applicable().is_err());
    }

    #[test]
    fn failed_version_is_not_overridable() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(ScriptKind::Versioned, "1", "abc", ApplyStatus::Failed));

        let plan = build_plan(&[script(ScriptKind::Versioned, "1", "abc")], &ledger, true);
        assert_eq!(plan.steps()[0].action, StepAction::ConflictFailedVersion);
    }

    #[test]
    fn failed_version_blocks_even_when_its_script_is_gone() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(ScriptKind::Versioned, "3", "abc", ApplyStatus::Failed));

        // Only a later version remains on disk.
        let plan = build_plan(&[script(ScriptKind::Versioned, "4", "def")], &ledger, false);
        assert_eq!(plan.steps()[0].action, StepAction::Apply);
        assert_eq!(plan.unresolved_failures().len(), 1);
        assert!(plan.has_conflicts());

        let err = plan.ensure_applicable().unwrap_err();
        assert!(matches!(err, PlanError::FailedVersion { ref script } if script.contains("V3")));
    }

    #[test]
    fn resolved_failure_record_does_not_block_when_script_returns() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(ScriptKind::Versioned, "3", "abc", ApplyStatus::Failed));

        // Same version back in the catalog: surfaced as a step
        // conflict, not an orphaned record.
        let plan = build_plan(&[script(ScriptKind::Versioned, "3", "abc")], &ledger, false);
        assert!(plan.unresolved_failures().is_empty());
        assert_eq!(plan.steps()[0].action, StepAction::ConflictFailedVersion);
    }

    #[test]
    fn checksum_override_turns_drift_into_apply() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(ScriptKind::Versioned, "1", "old", ApplyStatus::Success));

        let drifted = [script(ScriptKind::Versioned, "1", "new")];
        let strict = build_plan(&drifted, &ledger, false);
        assert_eq!(strict.steps()[0].action, StepAction::ConflictChecksumMismatch);

        let overridden = build_plan(&drifted, &ledger, true);
        assert_eq!(overridden.steps()[0].action, StepAction::Apply);
        assert!(overridden.ensure_applicable().is_ok());
    }

    #[test]
    fn repeatable_reapplies_only_on_checksum_change() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(
            ScriptKind::Repeatable,
            "seed data",
            "same",
            ApplyStatus::Success,
        ));

        let unchanged = build_plan(
            &[script(ScriptKind::Repeatable, "seed data", "same")],
            &ledger,
            false,
        );
        assert_eq!(unchanged.steps()[0].action, StepAction::SkipUnchanged);

        let changed = build_plan(
            &[script(ScriptKind::Repeatable, "seed data", "different")],
            &ledger,
            false,
        );
        assert_eq!(changed.steps()[0].action, StepAction::Reapply);
    }

    #[test]
    fn always_scripts_apply_regardless_of_ledger() {
        let mut ledger = LedgerState::new();
        ledger.insert(record(
            ScriptKind::Always,
            "set session",
            "whatever",
            ApplyStatus::Success,
        ));

        let plan = build_plan(
            &[script(ScriptKind::Always, "set session", "changed")],
            &ledger,
            false,
        );
        assert_eq!(plan.steps()[0].action, StepAction::Apply);
    }
}
