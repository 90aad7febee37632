use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{ApplyStatus, ExecutionError, MigrateError, Result, SessionError, VarMap};
use crate::ledger::{ChangeRecord, Ledger};
use crate::planner::{MigrationPlan, PlannedStep, StepAction};
use crate::render::Renderer;
use crate::session::{Session, SharedSession};

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Every step in the plan was processed.
    Completed,
    /// A step failed (or the run was cancelled); no later step was
    /// attempted.
    Halted,
}

/// Context for the first failure of a halted run.
#[derive(Debug, Clone, Serialize)]
pub struct HaltInfo {
    pub script: String,
    pub error: String,
}

/// Outcome of one invocation.
#[derive(Debug, Serialize)]
pub struct RunResult {
    /// Steps executed (or, in dry-run mode, that would have executed).
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub state: RunState,
    pub halted_on: Option<HaltInfo>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed && self.failed == 0
    }
}

// Explicit sequential state machine over the result accumulation, so a
// halted partial run is a first-class value rather than an unwound
// stack.
enum Progress {
    Running,
    Halted(HaltInfo),
}

/// Applies a migration plan step-by-step, strictly in plan order.
///
/// One script plus its ledger record form one unit of work when the
/// session supports units; on failure the unit is rolled back, a
/// `Failed` record is written best-effort, and the run halts. Nothing
/// is ever retried automatically; retry is a new caller-initiated run.
pub struct Orchestrator<'a, S: Session, R: Renderer + ?Sized, L: Ledger + ?Sized> {
    session: SharedSession<S>,
    renderer: &'a R,
    ledger: &'a mut L,
    vars: &'a VarMap,
    dry_run: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, S: Session, R: Renderer + ?Sized, L: Ledger + ?Sized> Orchestrator<'a, S, R, L> {
    pub fn new(
        session: SharedSession<S>,
        renderer: &'a R,
        ledger: &'a mut L,
        vars: &'a VarMap,
        dry_run: bool,
    ) -> Self {
        Self {
            session,
            renderer,
            ledger,
            vars,
            dry_run,
            cancel: None,
        }
    }

    /// Install a cancellation flag. Cancellation is honored between
    /// steps, never mid-step: a started script runs to completion or
    /// failure first.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(mut self, plan: &MigrationPlan) -> Result<RunResult> {
        plan.ensure_applicable()?;

        let mut applied = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;
        let mut progress = Progress::Running;

        for step in plan.steps() {
            if matches!(progress, Progress::Halted(_)) {
                break;
            }

            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::SeqCst) {
                    info!(script = %step.script.display_name(), "run cancelled before step");
                    progress = Progress::Halted(HaltInfo {
                        script: step.script.display_name(),
                        error: "run cancelled before this step".to_string(),
                    });
                    break;
                }
            }

            if step.action.is_skip() {
                debug!(
                    script = %step.script.display_name(),
                    reason = step.action.as_str(),
                    "skipping"
                );
                skipped += 1;
                continue;
            }

            if self.dry_run {
                info!(script = %step.script.display_name(), "dry-run: would apply");
                applied += 1;
                continue;
            }

            match self.apply_step(step) {
                Ok(millis) => {
                    info!(
                        script = %step.script.display_name(),
                        millis,
                        "applied"
                    );
                    applied += 1;
                }
                Err(StepFailure::Script(err)) => {
                    failed += 1;
                    progress = Progress::Halted(HaltInfo {
                        script: step.script.display_name(),
                        error: err.to_string(),
                    });
                }
                Err(StepFailure::Fatal(err)) => return Err(err),
            }
        }

        let result = match progress {
            Progress::Halted(info) => RunResult {
                applied,
                skipped,
                failed,
                state: RunState::Halted,
                halted_on: Some(info),
            },
            Progress::Running => RunResult {
                applied,
                skipped,
                failed,
                state: RunState::Completed,
                halted_on: None,
            },
        };

        let halted = result.state == RunState::Halted;
        info!(
            applied = result.applied,
            skipped = result.skipped,
            failed = result.failed,
            halted,
            "run finished"
        );
        Ok(result)
    }

    /// Execute one apply/reapply step. Returns the execution duration
    /// in milliseconds on success.
    ///
    /// A render failure halts the run without writing a `Failed` ledger
    /// record: nothing has touched the database yet, so the script is
    /// not blocked on the next run once the template or variables are
    /// fixed. Only execution failures leave a `Failed` row.
    fn apply_step(&mut self, step: &PlannedStep) -> std::result::Result<u64, StepFailure> {
        debug_assert!(matches!(step.action, StepAction::Apply | StepAction::Reapply));
        let name = step.script.display_name();
        if let Some(scope) = &step.script.scope {
            debug!(script = %name, scope = %scope, "script has scope");
        }

        let rendered = self
            .renderer
            .render(&step.script.body, self.vars)
            .map_err(|source| {
                StepFailure::Script(ExecutionError::Render {
                    script: name.clone(),
                    source,
                })
            })?;

        let started = Instant::now();
        let use_unit = self.lock()?.supports_units();

        if use_unit {
            self.lock()?.begin_unit().map_err(fatal)?;
        }

        let exec_result = self.lock()?.execute(&rendered);
        let millis = started.elapsed().as_millis() as u64;

        match exec_result {
            Ok(()) => {
                let record = self.make_record(step, ApplyStatus::Success, millis);
                if let Err(err) = self.ledger.record(&record) {
                    // Do not leave applied effects without a ledger row.
                    if use_unit {
                        if let Err(rb) = self.lock()?.rollback_unit() {
                            warn!(script = %name, error = %rb, "rollback after ledger failure also failed");
                        }
                    }
                    return Err(StepFailure::Fatal(MigrateError::Ledger(err)));
                }
                if use_unit {
                    self.lock()?.commit_unit().map_err(fatal)?;
                }
                Ok(millis)
            }
            Err(source) => {
                if use_unit {
                    if let Err(rb) = self.lock()?.rollback_unit() {
                        warn!(script = %name, error = %rb, "rollback failed");
                    }
                }
                // Best-effort failure marker so the next run sees the
                // blocked version. Outside any unit.
                let record = self.make_record(step, ApplyStatus::Failed, millis);
                if let Err(err) = self.ledger.record(&record) {
                    warn!(
                        script = %name,
                        error = %err,
                        "could not record failure; ledger may lag applied effects"
                    );
                }
                Err(StepFailure::Script(ExecutionError::Script {
                    script: name,
                    source,
                }))
            }
        }
    }

    fn make_record(&mut self, step: &PlannedStep, status: ApplyStatus, millis: u64) -> ChangeRecord {
        ChangeRecord {
            key: step.script.key(),
            description: step.script.description.clone(),
            checksum: step.script.checksum.clone(),
            status,
            applied_at: Utc::now(),
            execution_millis: millis,
            installed_rank: self.ledger.next_rank(),
        }
    }

    fn lock(&self) -> std::result::Result<std::sync::MutexGuard<'_, S>, StepFailure> {
        self.session
            .lock()
            .map_err(|e| StepFailure::Fatal(MigrateError::Session(SessionError::from(e))))
    }
}

enum StepFailure {
    /// The script itself failed; halt but report a RunResult.
    Script(ExecutionError),
    /// Infrastructure failure (ledger, unit bookkeeping, poisoned
    /// session); abort the run with an error.
    Fatal(MigrateError),
}

fn fatal(err: SessionError) -> StepFailure {
    StepFailure::Fatal(MigrateError::Session(err))
}
