//! Non-interactive commands sharing the store with the TUI.

use crate::config::Config;
use crate::countdown::{Tick, Ticker, EXPIRED_TEXT};
use crate::models::{NewTask, Task};
use crate::notify::{self, Notifier};
use crate::parser::parse_task_input;
use crate::store::TaskRepository;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tickdown", version, about = "A terminal task tracker with live deadline countdowns")]
pub struct Cli {
    /// Directory holding the task list and log file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List tasks (unfinished only unless --all)
    List {
        #[arg(long)]
        all: bool,
    },
    /// Add a task
    Add {
        task: String,
        /// e.g. 2024-06-01T17:30, 2024-06-01, +1d2h, "in 45m"
        #[arg(short, long)]
        deadline: String,
    },
    /// Mark a task finished
    Finish { id: u64 },
    /// Delete a task
    Delete { id: u64 },
}

pub fn run(
    command: Commands,
    store: &dyn TaskRepository,
    notifier: &dyn Notifier,
    config: &Config,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::List { all } => {
            let now = Utc::now();
            let tasks: Vec<Task> = store
                .list()
                .into_iter()
                .filter(|task| all || !task.finished)
                .collect();
            if tasks.is_empty() {
                writeln!(out, "No tasks")?;
            }
            for task in &tasks {
                writeln!(out, "{}", list_line(task, now, &config.timestamp_format))?;
            }
        }
        Commands::Add { task, deadline } => {
            let now = Local::now();
            let parsed = parse_task_input(&task, &deadline, now)?;
            let new_task = NewTask::new(parsed.title, now, &config.timestamp_format, parsed.deadline);
            let task = store.insert(new_task)?;
            info!("Added task {} from the command line", task.id);
            notify::task_added(notifier, &task.task);
            writeln!(out, "Added task {}: {}", task.id, task.task)?;
        }
        Commands::Finish { id } => {
            let task = store.finish(id)?;
            writeln!(out, "You have finished the task: \"{}\"", task.task)?;
        }
        Commands::Delete { id } => {
            let task = store.delete(id)?;
            notify::task_deleted(notifier, &task.task);
            writeln!(out, "Deleted task {}: {}", task.id, task.task)?;
        }
    }
    Ok(())
}

fn list_line(task: &Task, now: DateTime<Utc>, timestamp_format: &str) -> String {
    let state = if task.finished {
        "Finished".to_string()
    } else {
        match Ticker::new(task.deadline).tick(now) {
            Tick::Remaining(countdown) => countdown.to_string(),
            _ => EXPIRED_TEXT.to_string(),
        }
    };
    format!(
        "{:>4}  {}  (deadline {})  {}",
        task.id,
        task.task,
        task.deadline.with_timezone(&Local).format(timestamp_format),
        state
    )
}
