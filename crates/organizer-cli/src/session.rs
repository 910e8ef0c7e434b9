//! Interactive session: the application thread of the organizer.
//!
//! Reads one command per stdin line and calls the task handlers directly;
//! reminders fire on the scheduler's worker and, with the stdout notifier,
//! arrive here over a channel to be printed between prompts.

use std::io::Write;

use chrono::Local;
use clap::{CommandFactory, Parser};
use organizer_core::notify::Notification;
use organizer_core::types::{CategoryId, TaskId};
use organizer_tasks::types::Task;
use organizer_tasks::{TaskInput, TaskService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::{split_args, SessionCommand};

enum Flow {
    Continue,
    Quit,
}

pub async fn run(
    service: &TaskService,
    mut notifications: Option<mpsc::Receiver<Notification>>,
) -> anyhow::Result<()> {
    println!("organizer: type `help` for commands, `quit` to leave");
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(n) = next_notification(&mut notifications) => {
                println!("\n[{}] {}", n.title, n.message);
                prompt();
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Flow::Quit = handle_line(service, &line) {
                    break;
                }
                prompt();
            }
        }
    }
    Ok(())
}

async fn next_notification(rx: &mut Option<mpsc::Receiver<Notification>>) -> Option<Notification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn handle_line(service: &TaskService, line: &str) -> Flow {
    let args = match split_args(line) {
        Ok(args) if args.is_empty() => return Flow::Continue,
        Ok(args) => args,
        Err(e) => {
            println!("error: {e}");
            return Flow::Continue;
        }
    };
    let command = match SessionCommand::try_parse_from(args) {
        Ok(command) => command,
        Err(e) => {
            println!("{e}");
            return Flow::Continue;
        }
    };
    if let SessionCommand::Quit = command {
        return Flow::Quit;
    }
    if let Err(e) = execute(service, command) {
        println!("error: {e}");
    }
    Flow::Continue
}

fn execute(service: &TaskService, command: SessionCommand) -> organizer_tasks::Result<()> {
    match command {
        SessionCommand::Add {
            name,
            due,
            priority,
            category,
            description,
        } => {
            let id = service.create_task(&TaskInput {
                name,
                description,
                due_date: due,
                priority,
                category,
                status: None,
            })?;
            println!("task {id} created");
        }
        SessionCommand::Edit {
            id,
            name,
            due,
            priority,
            category,
            description,
            status,
        } => {
            service.edit_task(
                TaskId(id),
                &TaskInput {
                    name,
                    description,
                    due_date: due,
                    priority,
                    category,
                    status,
                },
            )?;
            println!("task {id} updated");
        }
        SessionCommand::Done { id } => {
            service.complete_task(TaskId(id))?;
            println!("task {id} completed");
        }
        SessionCommand::Reopen { id } => {
            service.reopen_task(TaskId(id))?;
            println!("task {id} reopened");
        }
        SessionCommand::Rm { id } => {
            service.delete_task(TaskId(id))?;
            println!("task {id} deleted");
        }
        SessionCommand::Ls { date, all } => {
            let tasks = match date {
                Some(date) => service.store().tasks_due_on(date, all)?,
                None => service.store().list_tasks(all)?,
            };
            print_tasks(&tasks);
        }
        SessionCommand::Cats => {
            for c in service.store().list_categories()? {
                println!("{:>4}  {} ({})", c.id, c.name, c.task_count);
            }
        }
        SessionCommand::CatAdd { name } => {
            let id = service.store().add_category(&name)?;
            println!("category {id} created");
        }
        SessionCommand::CatRename { id, name } => {
            service.store().rename_category(CategoryId(id), &name)?;
            println!("category {id} renamed");
        }
        SessionCommand::CatRm { id, with_tasks } => {
            let deleted = service.delete_category(CategoryId(id), with_tasks)?;
            println!("category {id} deleted ({} tasks removed)", deleted.len());
        }
        SessionCommand::Pending => {
            let pending = service.reminders().pending();
            if pending.is_empty() {
                println!("no reminders pending");
            }
            let now = Local::now();
            for job in pending {
                let mins = (job.fire_at - now).num_minutes();
                println!(
                    "task {:>4}  {}  (in {mins} min)",
                    job.tag,
                    job.fire_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        SessionCommand::Help => {
            println!("{}", SessionCommand::command().render_help());
        }
        SessionCommand::Quit => {}
    }
    Ok(())
}

pub fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for t in tasks {
        println!(
            "{:>4}  [{}] {}  due {}  p{}  {}",
            t.id,
            t.status,
            t.name,
            t.due_date.format("%Y-%m-%d %H:%M"),
            t.priority,
            t.category.as_deref().unwrap_or("-"),
        );
    }
}
