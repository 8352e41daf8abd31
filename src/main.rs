use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use conductor::config::Config;
use conductor::core::{Complexity, RoleRegistry, TaskId};
use conductor::orchestration::{classify, ClassifierHints, CompletionDriver, Planner, TaskOutcome};
use conductor::state::{PlanStore, TaskUpdate};
use conductor::util::blocking;
use conductor::workflow::{PlanId, PlanSummary, RoutingPlan, Transition};
use conductor::{clog, clog_debug, Error, Result};

/// Conductor - task orchestration engine for multi-role worker pools
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    CONDUCTOR_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.conductor/conductor.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Workspace whose plan to operate on (defaults to the current directory)
    #[arg(short = 'w', long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show which task pattern a request matches
    Classify {
        /// The request in natural language
        request: String,
    },

    /// Decompose and schedule a request, then make it the active plan
    Plan {
        /// The request in natural language
        request: String,

        /// Independent requirements the request contains (task-count floor)
        #[arg(long)]
        requirements: Option<usize>,

        /// Estimated complexity of the implementation work
        #[arg(long)]
        complexity: Option<Complexity>,
    },

    /// Show progress of the active plan
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List tasks that can be dispatched right now
    Next {
        #[arg(long)]
        json: bool,
    },

    /// Mark a task as started
    Start { task: String },

    /// Mark a task as completed
    Complete { task: String },

    /// Mark a task as failed
    Fail {
        task: String,

        /// What went wrong
        #[arg(long, short = 'e')]
        error: String,
    },

    /// Skip a pending task
    Skip { task: String },

    /// Run the completion driver once (exit code 2 on escalation)
    Checkpoint {
        #[arg(long)]
        json: bool,
    },

    /// Follow the active plan until it finishes or escalates
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Cancel the active plan
    Cancel,

    /// Drop the active plan without archiving it
    Clear,

    /// Rebuild the active plan from its original request
    Reset,

    /// Print the effective configuration
    Config {
        /// Write the defaults to ~/.conductor/conductor.toml if it is missing
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    conductor::log::init_with_debug(cli.debug);

    let workspace = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let config = Config::load()?;
    clog_debug!("Command: {:?} workspace={}", cli.command, workspace.display());

    let code = run(cli.command, &workspace, &config)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run(command: Command, workspace: &Path, config: &Config) -> Result<i32> {
    let registry = config.role_registry();
    let store = PlanStore::open(workspace, config)?;

    match command {
        Command::Classify { request } => run_classify(&request),
        Command::Plan {
            request,
            requirements,
            complexity,
        } => {
            let hints = (requirements.is_some() || complexity.is_some()).then(|| ClassifierHints {
                complexity,
                compound_requirement_count: requirements.unwrap_or(0),
            });
            run_plan(&store, &registry, config, &request, hints)
        }
        Command::Status { json } => run_status(&store, json),
        Command::Next { json } => run_next(&store, &registry, json),
        Command::Start { task } => {
            report_update(&task, store.mark_task_started(&TaskId::new(task.clone()))?)
        }
        Command::Complete { task } => report_update(
            &task,
            store.apply_outcome(&TaskOutcome::success(TaskId::new(task.clone())))?,
        ),
        Command::Fail { task, error } => report_update(
            &task,
            store.apply_outcome(&TaskOutcome::failure(TaskId::new(task.clone()), &error))?,
        ),
        Command::Skip { task } => {
            report_update(&task, store.mark_task_skipped(&TaskId::new(task.clone()))?)
        }
        Command::Checkpoint { json } => {
            let evaluation = CompletionDriver::from_config(config).evaluate(&store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
            } else {
                print!("{}", evaluation);
            }
            Ok(evaluation.exit_code())
        }
        Command::Watch { interval } => {
            run_watch(store, registry, config, Duration::from_secs(interval.max(1)))
        }
        Command::Cancel => {
            let plan = store.cancel_plan()?.ok_or(Error::NoActivePlan)?;
            println!("Cancelled plan {}", plan.plan_id);
            Ok(0)
        }
        Command::Clear => {
            match store.clear_plan()? {
                Some(plan) => println!("Cleared plan {}", plan.plan_id),
                None => println!("No active plan."),
            }
            Ok(0)
        }
        Command::Reset => {
            let planner = Planner::from_config(&registry, config);
            let plan = store
                .reset_plan(|request| planner.draft(request, None).into_phases())?
                .ok_or(Error::NoActivePlan)?;
            println!("Reset to plan {}", plan.plan_id);
            print_phases(&plan);
            Ok(0)
        }
        Command::Config { init } => run_config(config, init),
    }
}

fn run_config(config: &Config, init: bool) -> Result<i32> {
    if init {
        let path = Config::config_path()?;
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            let path = Config::default().save()?;
            clog!("Wrote default config to {}", path.display());
            println!("Wrote {}", path.display());
        }
        return Ok(0);
    }
    print!("{}", config.to_toml()?);
    Ok(0)
}

fn run_classify(request: &str) -> Result<i32> {
    let result = classify(request);
    println!("Pattern:  {}", result.pattern.kind);
    println!("Score:    {}", result.score);
    println!("Strategy: {}", result.pattern.strategy);
    println!("Roles:    {}", result.pattern.default_role_sequence.join(" -> "));
    Ok(0)
}

fn run_plan(
    store: &PlanStore,
    registry: &RoleRegistry,
    config: &Config,
    request: &str,
    hints: Option<ClassifierHints>,
) -> Result<i32> {
    let draft = Planner::from_config(registry, config).draft(request, hints);
    if let Some(warning) = draft.schedule.warning() {
        eprintln!("Warning: {}", warning);
    }
    println!(
        "Pattern {} (score {}), decomposed {}",
        draft.classification.pattern.kind, draft.classification.score, draft.strategy
    );
    let plan = store.create_plan(draft.into_phases(), request)?;
    println!("Created plan {}", plan.plan_id);
    print_phases(&plan);
    Ok(0)
}

fn print_phases(plan: &RoutingPlan) {
    for phase in &plan.phases {
        let mode = if phase.parallel { "parallel" } else { "sequential" };
        println!("Phase {} ({}):", phase.index + 1, mode);
        for task in &phase.tasks {
            let deps: Vec<&str> = task.depends_on.iter().map(|d| d.as_str()).collect();
            if deps.is_empty() {
                println!("  {} [{}] {}", task.id, task.role, task.description);
            } else {
                println!(
                    "  {} [{}] {} (after {})",
                    task.id,
                    task.role,
                    task.description,
                    deps.join(", ")
                );
            }
        }
    }
}

fn print_summary(summary: &PlanSummary) {
    println!("Plan {} ({})", summary.plan_id, summary.status);
    println!(
        "  progress:  {} ({:.0}%)",
        summary.progress_fraction(),
        summary.progress * 100.0
    );
    println!(
        "  tasks:     {} pending, {} executing, {} completed, {} failed, {} skipped",
        summary.pending_count,
        summary.executing_count,
        summary.completed_count,
        summary.failed_count,
        summary.skipped_count
    );
    match summary.current_phase {
        Some(phase) => println!("  phase:     {}/{}", phase + 1, summary.phase_count),
        None => println!("  phase:     -/{}", summary.phase_count),
    }
    println!(
        "  retries:   {}/{}",
        summary.current_retry, summary.max_retries
    );
}

fn run_status(store: &PlanStore, json: bool) -> Result<i32> {
    let summary = store.summary()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(0);
    }
    match summary {
        Some(summary) => print_summary(&summary),
        None => println!("No active plan."),
    }
    Ok(0)
}

fn run_next(store: &PlanStore, registry: &RoleRegistry, json: bool) -> Result<i32> {
    let instructions = store.dispatch(registry)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&instructions)?);
        return Ok(0);
    }
    if instructions.is_empty() {
        println!("Nothing to dispatch.");
    }
    for instruction in &instructions {
        let mode = if instruction.can_run_in_parallel {
            "parallel"
        } else {
            "exclusive"
        };
        println!("== {} -> {} ({})", instruction.task_id, instruction.role, mode);
        println!("{}", instruction.instruction_text);
    }
    Ok(0)
}

fn report_update(task: &str, update: Option<TaskUpdate>) -> Result<i32> {
    let update = update.ok_or(Error::NoActivePlan)?;
    let status = update
        .plan
        .task(&TaskId::new(task))
        .map(|t| t.status.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    match update.transition {
        Transition::Applied => println!(
            "{}: {} (plan {} {})",
            task,
            status,
            update.plan.status,
            update.plan.summary().progress_fraction()
        ),
        other => println!("{}: {}, nothing changed", task, other),
    }
    Ok(0)
}

/// Poll the store until the plan leaves the active slot.
///
/// The driver runs only when nothing is executing and nothing can be
/// dispatched, so a busy plan never burns retries.
fn run_watch(
    store: PlanStore,
    registry: RoleRegistry,
    config: &Config,
    interval: Duration,
) -> Result<i32> {
    let store = Arc::new(store);
    let registry = Arc::new(registry);
    let driver = Arc::new(CompletionDriver::from_config(config));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let token = CancellationToken::new();
        let ctrl_c = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });
        watch_loop(store, registry, driver, interval, token).await
    })
}

async fn watch_loop(
    store: Arc<PlanStore>,
    registry: Arc<RoleRegistry>,
    driver: Arc<CompletionDriver>,
    interval: Duration,
    token: CancellationToken,
) -> Result<i32> {
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<PlanSummary> = None;
    let mut plan_id: Option<PlanId> = None;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                clog!("watch: cancelled");
                return Ok(0);
            }
            _ = ticker.tick() => {}
        }

        let (summary, executable) = {
            let store = Arc::clone(&store);
            let registry = Arc::clone(&registry);
            blocking(move || Ok((store.summary()?, store.executable_tasks(&registry)?.len())))
                .await?
        };

        let Some(summary) = summary else {
            let archived = match plan_id {
                Some(id) => {
                    let store = Arc::clone(&store);
                    blocking(move || store.archived(&id)).await?
                }
                None => None,
            };
            match archived {
                Some(plan) => println!("Plan {} finished: {}", plan.plan_id, plan.status),
                None => println!("No active plan."),
            }
            return Ok(0);
        };
        plan_id = Some(summary.plan_id);

        if last.as_ref() != Some(&summary) {
            print_summary(&summary);
            last = Some(summary.clone());
        }

        if summary.executing_count == 0 && executable == 0 {
            let evaluation = {
                let store = Arc::clone(&store);
                let driver = Arc::clone(&driver);
                blocking(move || driver.evaluate(&store)).await?
            };
            print!("{}", evaluation);
            if evaluation.is_final() {
                return Ok(evaluation.exit_code());
            }
        }
    }
}
