use std::sync::Arc;

use clap::Parser;
use organizer_core::config::{NotifierKind, OrganizerConfig};
use organizer_core::notify::{build_notifier, Notifier};
use organizer_scheduler::ReminderScheduler;
use organizer_tasks::{TaskService, TaskStore};
use tracing::{info, warn};

mod cli;
mod session;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "organizer=info,organizer_scheduler=info,organizer_tasks=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > ORGANIZER_CONFIG env > ~/.organizer/organizer.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("ORGANIZER_CONFIG").ok());
    let config = OrganizerConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        OrganizerConfig::default()
    });

    let store = Arc::new(open_store(&config.database.path)?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_session(config, store).await,
        Command::Tasks { date, open } => {
            let tasks = match date {
                Some(date) => store.tasks_due_on(date, !open)?,
                None => store.list_tasks(!open)?,
            };
            session::print_tasks(&tasks);
            Ok(())
        }
        Command::Categories => {
            for c in store.list_categories()? {
                println!("{:>4}  {} ({})", c.id, c.name, c.task_count);
            }
            Ok(())
        }
    }
}

async fn run_session(config: OrganizerConfig, store: Arc<TaskStore>) -> anyhow::Result<()> {
    // Stdout reminders travel over a channel so the session can print them
    // between prompts.
    let (stdout_tx, stdout_rx) = if config.notifier.kind == NotifierKind::Stdout {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    let notifier: Arc<dyn Notifier> = Arc::from(build_notifier(&config.notifier, stdout_tx));

    let reminders = Arc::new(ReminderScheduler::start(&config.scheduler));
    info!(
        poll_interval_ms = config.scheduler.poll_interval_ms,
        notifier = ?config.notifier.kind,
        "reminder scheduler started"
    );

    let service = TaskService::new(
        store,
        Arc::clone(&reminders),
        notifier,
        config.notifier.title.clone(),
    );
    let result = session::run(&service, stdout_rx).await;

    // signal the reminder loop to stop
    if let Err(e) = reminders.shutdown().await {
        warn!("reminder loop did not stop cleanly: {e}");
    }
    result
}

fn open_store(db_path: &str) -> anyhow::Result<TaskStore> {
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(TaskStore::new(db)?)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), "could not create database directory: {e}");
            }
        }
    }
}
