use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schemarun::{
    MemoryLedger, MemorySession, MigrationPlan, Migrator, RunOptions, RunResult, RunState, VarMap,
};

#[derive(Parser)]
#[command(
    name = "schemarun",
    version,
    about = "Ordered, idempotent schema-change runner"
)]
pub struct App {
    #[command(subcommand)]
    command: Command,

    /// Verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show the migration plan without executing anything
    Plan {
        #[command(flatten)]
        run: RunArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply pending migrations
    Apply {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Render one script with the variable context and print it with
    /// its checksum
    Render {
        /// Path to the script file
        script: PathBuf,

        #[command(flatten)]
        vars: VarArgs,
    },
}

#[derive(Args)]
struct VarArgs {
    /// Variable for script templates, NAME=VALUE (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// JSON file with a variable mapping
    #[arg(long, value_name = "FILE")]
    vars_file: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Script root folder, scanned recursively
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(flatten)]
    vars: VarArgs,

    /// Ledger table name
    #[arg(long, default_value = schemarun::config::DEFAULT_LEDGER_TABLE)]
    table: String,

    /// Re-apply versioned scripts whose checksum drifted instead of
    /// failing
    #[arg(long)]
    allow_checksum_override: bool,

    /// Log every would-be action without executing or recording
    #[arg(long)]
    dry_run: bool,

    /// Do not bootstrap a missing ledger table
    #[arg(long)]
    no_create_ledger: bool,

    /// Target engine. `memory` is built in; real databases integrate
    /// through the Session trait
    #[arg(long, default_value = "memory")]
    engine: String,
}

impl App {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn run(self) -> anyhow::Result<()> {
        init_logging(self.verbose);

        match self.command {
            Command::Plan { run, json } => {
                let mut migrator = build_migrator(&run)?;
                let plan = migrator.plan()?;
                print_plan(&plan, json)?;
                if plan.has_conflicts() {
                    bail!("plan has conflicts")
                }
                Ok(())
            }
            Command::Apply { run } => {
                let mut migrator = build_migrator(&run)?;
                let result = migrator.apply()?;
                print_result(&result);
                if result.is_success() {
                    Ok(())
                } else {
                    bail!("run halted")
                }
            }
            Command::Render { script, vars } => {
                let options = RunOptions::new(".").vars(vars.collect()?);
                let migrator =
                    Migrator::with_ledger(options, MemorySession::new(), Box::new(MemoryLedger::new()));
                let (rendered, checksum) = migrator.render_script(&script)?;
                println!("{rendered}");
                println!("-- checksum: {checksum}");
                Ok(())
            }
        }
    }
}

impl VarArgs {
    fn collect(&self) -> anyhow::Result<VarMap> {
        let mut map = VarMap::new();

        if let Some(path) = &self.vars_file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading vars file {}", path.display()))?;
            let parsed: VarMap = serde_json::from_str(&text)
                .with_context(|| format!("parsing vars file {}", path.display()))?;
            map.extend(parsed);
        }

        // --var wins over the file
        for pair in &self.vars {
            let Some((name, value)) = pair.split_once('=') else {
                bail!("invalid --var '{pair}': expected NAME=VALUE");
            };
            map.insert(
                name.to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }

        Ok(map)
    }
}

fn build_migrator(run: &RunArgs) -> anyhow::Result<Migrator<MemorySession>> {
    if run.engine != "memory" {
        bail!(
            "unknown engine '{}': only 'memory' is built in; other engines \
             integrate through the Session trait",
            run.engine
        );
    }

    let options = RunOptions::new(&run.root)
        .vars(run.vars.collect()?)
        .ledger_table(run.table.clone())
        .allow_checksum_override(run.allow_checksum_override)
        .dry_run(run.dry_run)
        .create_ledger(!run.no_create_ledger);

    Ok(Migrator::with_ledger(
        options,
        MemorySession::new(),
        Box::new(MemoryLedger::new()),
    ))
}

fn print_plan(plan: &MigrationPlan, json: bool) -> anyhow::Result<()> {
    if json {
        let steps: Vec<_> = plan
            .steps()
            .iter()
            .map(|step| {
                serde_json::json!({
                    "script": step.script.display_name(),
                    "file": step.script.file_name(),
                    "kind": step.script.kind.marker(),
                    "action": step.action.as_str(),
                    "checksum": step.script.checksum,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    for step in plan.steps() {
        println!("{:<30} {}", step.action.as_str(), step.script.display_name());
    }
    for record in plan.unresolved_failures() {
        println!(
            "{:<30} V{} ({}) [script missing from catalog]",
            "conflict (failed version)", record.key.logical_path, record.description
        );
    }
    println!(
        "{} steps, {} pending{}",
        plan.len(),
        plan.pending(),
        match plan.first_conflict() {
            Some(step) => format!(", CONFLICT at {}", step.script.display_name()),
            None => String::new(),
        }
    );
    Ok(())
}

fn print_result(result: &RunResult) {
    println!(
        "applied: {}, skipped: {}, failed: {}",
        result.applied, result.skipped, result.failed
    );
    if result.state == RunState::Halted {
        if let Some(halt) = &result.halted_on {
            println!("halted at {}: {}", halt.script, halt.error);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "schemarun=debug" } else { "schemarun=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
