//! `pace`: command-line client for the PACE task board.
//!
//! Each run loads the document snapshot into an in-memory store, opens the
//! board's live queries, runs the on-load repair pass, executes one
//! command and writes the snapshot back. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/pace/config.toml`).
//!
//! ```bash
//! pace --email ana@example.com summary --view due-this-week
//! pace --email ana@example.com add --title "Draft agenda" --due 2024-01-12
//! PACE_EMAIL=ana@example.com pace toggle 0190c5d2-...
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use pace::config::{CliArgs, Command, PaceConfig};
use pace::projects::{ProjectDraft, ProjectError};
use pace::store::memory::MemoryStore;
use pace::store::snapshot::{Snapshot, SnapshotError};
use pace::store::StoreError;
use pace::tasks::{
    CounterScope, CounterSync, Dashboard, LiveView, Reconciler, TaskError, TaskView,
    TransitionError, TransitionOutcome,
};
use pace_proto::project::ProjectId;
use pace_proto::status::TaskStatus;
use pace_proto::task::{Assignee, NewTask, Priority, TaskId};
use pace_proto::timestamp::parse_timestamp_text_in;

/// Failures that end a run with a non-zero exit code.
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Project(#[from] ProjectError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // CLI args > env > config file > defaults.
    let config = match PaceConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::debug!(snapshot = %config.snapshot_path.display(), "pace starting");

    match run(cli.command.unwrap_or_default(), &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging to stderr, or to a file when `file_path` is given.
///
/// `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(log_path) = file_path else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let log_dir = log_path.parent().filter(|p| !p.as_os_str().is_empty());
    let log_dir = log_dir.unwrap_or_else(|| Path::new("."));
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &PaceConfig) -> Result<(), RunError> {
    if config.identity.is_anonymous() {
        return Err(RunError::Usage(
            "no identity configured: pass --email or --uid (or set PACE_EMAIL)".to_string(),
        ));
    }

    let snapshot = Snapshot::load(&config.snapshot_path)?;
    let store = Arc::new(MemoryStore::from_snapshot(snapshot));
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        config.identity.clone(),
        config.reconcile.clone(),
    );

    let mut live = reconciler.watch().await?;
    live.drain();
    tracing::debug!(
        user = config.identity.label(),
        tasks = reconciler.tasks().len(),
        "board loaded"
    );
    let (stamped, report) = reconciler.reconcile_on_load().await;
    tracing::debug!(stamped, corrected = report.corrected, "on-load reconciliation");
    live.drain();

    let result = execute(command, &reconciler, &mut live).await;

    // Persist whatever was written, including partial progress of a failed
    // command and the on-load repairs.
    store.snapshot().save(&config.snapshot_path)?;
    result
}

async fn execute(
    command: Command,
    reconciler: &Reconciler<MemoryStore>,
    live: &mut LiveView,
) -> Result<(), RunError> {
    match command {
        Command::Summary { view } => {
            let dashboard = reconciler.dashboard(TaskView::parse(&view), &Local::now());
            print_dashboard(&dashboard);
        }
        Command::Add {
            title,
            due,
            assignee,
            priority,
            project,
        } => {
            let due_date = parse_timestamp_text_in(&due, &Local)
                .ok_or_else(|| RunError::Usage(format!("unrecognized due date: {due}")))?;
            let assignee = match assignee {
                Some(email) if email.contains('@') => Assignee::by_email(email),
                Some(uid) => Assignee::by_id(uid),
                None => reconciler
                    .identity()
                    .email
                    .clone()
                    .map_or_else(Assignee::default, Assignee::by_email),
            };
            let id = reconciler
                .create_task(NewTask {
                    title,
                    priority: Priority::from(priority),
                    due_date: Some(due_date),
                    assignee,
                    project_id: project.map(ProjectId::new),
                })
                .await?;
            println!("created task {id}");
        }
        Command::Status { task_id, status } => {
            let target = TaskStatus::from_str(&status)
                .map_err(|e| RunError::Usage(e.to_string()))?;
            let outcome = reconciler.set_status(&TaskId::new(task_id), target).await?;
            print_outcome(outcome);
        }
        Command::Toggle { task_id } => {
            let outcome = reconciler.toggle_done(&TaskId::new(task_id)).await?;
            print_outcome(outcome);
        }
        Command::Project {
            name,
            description,
            members,
        } => {
            let id = reconciler
                .create_project(ProjectDraft {
                    name,
                    description,
                    members,
                })
                .await?;
            println!("created project {id}");
        }
        Command::Join { code } => {
            let id = reconciler.join_project(&code).await?;
            println!("joined project {id}");
        }
        Command::Reconcile => {
            live.drain();
            let report = reconciler.reconcile_counters(CounterScope::All).await;
            println!(
                "examined {} projects, corrected {}, failed {}",
                report.examined, report.corrected, report.failed
            );
        }
    }
    live.drain();
    Ok(())
}

fn print_outcome(outcome: TransitionOutcome) {
    match outcome {
        TransitionOutcome::Unchanged => println!("status unchanged"),
        TransitionOutcome::Applied {
            counter: CounterSync::Drifted,
        } => println!("status updated; project counter will be corrected on the next reconcile"),
        TransitionOutcome::Applied { .. } => println!("status updated"),
    }
}

fn print_dashboard(dashboard: &Dashboard) {
    let counts = dashboard.counts;
    println!(
        "to-do {}  in-progress {}  completed today {}  completed this week {}",
        counts.to_do, counts.in_progress, counts.completed_today, dashboard.completed_this_week
    );

    let week: Vec<String> = dashboard
        .weekly
        .iter()
        .map(|day| format!("{} {}", day.weekday, day.completed))
        .collect();
    println!("week: {}", week.join("  "));

    if !dashboard.projects.is_empty() {
        println!();
        println!("projects:");
        for (project, progress) in &dashboard.projects {
            let marker = if progress.counted { "" } else { " (uncounted)" };
            println!(
                "  {:<24} {:>3}%  {}/{}  {} members  [{}]{marker}",
                project.name,
                progress.percent,
                progress.done,
                progress.total,
                project.headcount(),
                project.id,
            );
        }
    }

    println!();
    println!("{} ({}):", dashboard.view, dashboard.tasks.len());
    for task in &dashboard.tasks {
        let due = task.due_date.map_or_else(
            || "no due date".to_string(),
            |d| d.with_timezone(&Local).format("%Y-%m-%d").to_string(),
        );
        let status = if task.status.as_str().is_empty() {
            "?"
        } else {
            task.status.as_str()
        };
        let assignee = task.assignee.label().unwrap_or("unassigned");
        println!(
            "  [{status:<11}] {:<6} {due}  {}  @{assignee}  ({})",
            task.priority.as_str(),
            task.title,
            task.id
        );
    }
}
