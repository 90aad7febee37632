// ============================================================================
// schemarun Library
// ============================================================================

pub mod catalog;
pub mod config;
pub mod core;
pub mod exec;
pub mod ledger;
pub mod ordering;
pub mod planner;
pub mod render;
pub mod session;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

// Re-export main types for convenience
pub use catalog::{Catalog, ScriptFile, script_checksum};
pub use config::RunOptions;
pub use core::{
    ApplyStatus, CatalogError, ExecutionError, LedgerError, LedgerKey, MigrateError, PlanError,
    RenderError, Result, ScriptKind, SessionError, VarMap, Version,
};
pub use exec::{HaltInfo, Orchestrator, RunResult, RunState};
pub use ledger::{ChangeRecord, Ledger, LedgerState, MemoryLedger, SqlLedger};
pub use planner::{MigrationPlan, PlannedStep, StepAction, build_plan};
pub use render::{Renderer, VarRenderer};
pub use session::{MemorySession, Row, Session, SharedSession, SqlValue};

/// High-level entry point for one target database.
///
/// Owns the session and the ledger handle for the duration of its
/// lifetime: opened at run start, closed at run end, never a
/// process-wide singleton.
///
/// # Examples
///
/// ```
/// use schemarun::{MemoryLedger, MemorySession, Migrator, RunOptions};
///
/// # fn main() -> schemarun::Result<()> {
/// # let dir = tempfile::tempdir().unwrap();
/// let options = RunOptions::new(dir.path()).var("env", "dev");
/// let mut migrator = Migrator::with_ledger(
///     options,
///     MemorySession::new(),
///     Box::new(MemoryLedger::new()),
/// );
///
/// let plan = migrator.plan()?;
/// println!("{} pending steps", plan.pending());
/// # Ok(())
/// # }
/// ```
pub struct Migrator<S: Session> {
    options: RunOptions,
    session: SharedSession<S>,
    ledger: Box<dyn Ledger>,
    renderer: Box<dyn Renderer>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<S: Session + 'static> Migrator<S> {
    /// Wire up a migrator whose ledger lives as a table in the target
    /// database, reached through the same session as the scripts.
    pub fn new(options: RunOptions, session: S) -> Self {
        let session = session::shared(session);
        let ledger = SqlLedger::new(
            session.clone(),
            options.ledger_table.clone(),
            options.create_ledger,
        );
        Self {
            options,
            session,
            ledger: Box::new(ledger),
            renderer: Box::new(VarRenderer::new()),
            cancel: None,
        }
    }

    /// Wire up a migrator with an externally-provided ledger handle.
    pub fn with_ledger(options: RunOptions, session: S, ledger: Box<dyn Ledger>) -> Self {
        Self {
            options,
            session: session::shared(session),
            ledger,
            renderer: Box::new(VarRenderer::new()),
            cancel: None,
        }
    }

    /// Replace the built-in `{{ name }}` renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Install a cancellation flag, honored between steps of `apply`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Compute the migration plan without executing anything.
    ///
    /// Opens the session for the ledger read and closes it before
    /// returning. Conflicts are visible in the returned plan; use
    /// [`MigrationPlan::ensure_applicable`] (or [`Migrator::apply`]) to
    /// turn them into errors.
    pub fn plan(&mut self) -> Result<MigrationPlan> {
        self.open_session()?;
        let plan = self.plan_inner();
        self.close_session();
        plan
    }

    // Planning body shared with `apply`, which keeps the session open
    // across planning and execution.
    fn plan_inner(&mut self) -> Result<MigrationPlan> {
        let catalog = Catalog::scan(&self.options.root, &self.options.vars)?;
        let ordered = ordering::resolve_order(&catalog);
        let state = self.ledger.load_all()?;
        info!(
            scripts = ordered.len(),
            recorded = state.len(),
            "planning run"
        );
        Ok(build_plan(
            &ordered,
            &state,
            self.options.allow_checksum_override,
        ))
    }

    /// Plan and apply in one invocation.
    ///
    /// Fails before executing anything if the plan carries a conflict.
    /// On a step failure the run halts immediately and the returned
    /// [`RunResult`] names the first failing script; later steps are
    /// never attempted. The session is closed on every exit path.
    pub fn apply(&mut self) -> Result<RunResult> {
        self.open_session()?;

        let plan = match self.plan_inner() {
            Ok(plan) => plan,
            Err(err) => {
                self.close_session();
                return Err(err);
            }
        };

        let mut orchestrator = Orchestrator::new(
            self.session.clone(),
            self.renderer.as_ref(),
            self.ledger.as_mut(),
            &self.options.vars,
            self.options.dry_run,
        );
        if let Some(flag) = &self.cancel {
            orchestrator = orchestrator.with_cancel_flag(flag.clone());
        }

        let result = orchestrator.run(&plan);
        self.close_session();
        result
    }

    /// Render one script with the configured variable context. Returns
    /// the rendered text and the script's checksum.
    pub fn render_script(&self, path: &Path) -> Result<(String, String)> {
        let body = fs::read_to_string(path).map_err(CatalogError::Io)?;
        let rendered = self.renderer.render(&body, &self.options.vars)?;
        let checksum = script_checksum(&body, &self.options.vars);
        Ok((rendered, checksum))
    }

    fn open_session(&self) -> Result<()> {
        let mut session = self.session.lock().map_err(SessionError::from)?;
        session.open().map_err(MigrateError::Session)?;
        Ok(())
    }

    fn close_session(&self) {
        match self.session.lock() {
            Ok(mut session) => {
                if let Err(err) = session.close() {
                    warn!(error = %err, "session close failed");
                }
            }
            Err(err) => warn!(error = %err, "session lock poisoned at close"),
        }
    }
}
