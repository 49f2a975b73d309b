//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire a workspace against an on-disk SQLite file and exercise one
//!   create/edit/reload cycle.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `taskdeck_cli [db_path] [config_path]`. Set `TASKDECK_LOG_DIR` to
//! an absolute directory to enable file logging.

use std::process::ExitCode;
use std::sync::Arc;
use taskdeck_core::{
    Clock, SqliteBackend, SqliteStorage, SystemClock, TaskDeckConfig, TaskDraft, TaskPatch,
    TokioScheduler, Workspace, WorkspaceServices,
};

fn main() -> ExitCode {
    println!("taskdeck_core ping={}", taskdeck_core::ping());
    println!("taskdeck_core version={}", taskdeck_core::core_version());

    if let Ok(log_dir) = std::env::var("TASKDECK_LOG_DIR") {
        if let Err(err) = taskdeck_core::init_logging(taskdeck_core::default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(|| "taskdeck.sqlite3".to_string());
    let config_path = args
        .next()
        .unwrap_or_else(|| TaskDeckConfig::filename().to_string());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&db_path, &config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(db_path: &str, config_path: &str) -> Result<(), String> {
    let config = TaskDeckConfig::load(config_path).map_err(|err| err.to_string())?;
    let backend = Arc::new(SqliteBackend::open(db_path).map_err(|err| err.to_string())?);
    let storage = SqliteStorage::open(db_path).map_err(|err| err.to_string())?;
    let scheduler = TokioScheduler::current().ok_or("no tokio runtime")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let services = WorkspaceServices::shared(
        backend,
        Some(Arc::new(storage)),
        Arc::new(scheduler),
        clock,
    );
    let workspace = Workspace::new(config, services).map_err(|err| err.to_string())?;

    let (tasks, lists, labels, forms) = workspace.load_all().await.map_err(|err| err.to_string())?;
    println!("loaded tasks={tasks} lists={lists} labels={labels} forms={forms}");

    let task = workspace
        .tasks()
        .create(TaskDraft::new("smoke probe"))
        .await
        .map_err(|err| err.to_string())?;
    workspace
        .edit_task(&task.id, TaskPatch::name("smoke probe (edited)"))
        .map_err(|err| err.to_string())?;
    let flushed = workspace.flush_edits().await;

    let saved = workspace.tasks().get(&task.id).map(|task| task.name);
    log::info!(
        "event=cli_smoke module=cli status=ok flushed={} tasks={}",
        flushed,
        workspace.tasks().snapshot().len()
    );
    println!("created id={} flushed={} name={:?}", task.id, flushed, saved);
    println!("theme={:?}", workspace.settings().theme());
    Ok(())
}
