use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "organizer", version, about = "Personal tasks with due-time reminders")]
pub struct Cli {
    /// Path to organizer.toml (default: $ORGANIZER_CONFIG or ~/.organizer/organizer.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive session with live reminders (default)
    Run,
    /// List tasks
    Tasks {
        /// Only tasks due on this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Hide completed tasks
        #[arg(long)]
        open: bool,
    },
    /// List categories with task counts
    Categories,
}

/// One line typed into the interactive session.
#[derive(Debug, Parser)]
#[command(
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
pub enum SessionCommand {
    /// Create a task and schedule its reminder
    Add {
        name: String,
        #[arg(long, value_parser = parse_due)]
        due: NaiveDateTime,
        #[arg(long, default_value_t = 1)]
        priority: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Rewrite a task and move its reminder
    Edit {
        id: i64,
        name: String,
        #[arg(long, value_parser = parse_due)]
        due: NaiveDateTime,
        #[arg(long, default_value_t = 1)]
        priority: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark a task completed
    Done { id: i64 },
    /// Mark a completed task as new again
    Reopen { id: i64 },
    /// Delete a task
    Rm { id: i64 },
    /// List tasks
    Ls {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },
    /// List categories
    Cats,
    /// Add a category
    CatAdd { name: String },
    /// Rename a category
    CatRename { id: i64, name: String },
    /// Delete a category; its tasks move to the default category unless
    /// --with-tasks is given
    CatRm {
        id: i64,
        #[arg(long)]
        with_tasks: bool,
    },
    /// Show reminders waiting to fire
    Pending,
    /// Show available commands
    Help,
    /// Leave the session
    #[command(alias = "exit")]
    Quit,
}

const DUE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_due(raw: &str) -> Result<NaiveDateTime, String> {
    DUE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
        .ok_or_else(|| format!("expected 'YYYY-MM-DD HH:MM', got '{raw}'"))
}

/// Split a session line into arguments. Double quotes group words; there is
/// no escape syntax.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err("unterminated quote".to_string());
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}
