use crate::countdown::{Countdown, Tick, TickEvent, Ticker, TickerRegistry, EXPIRED_TEXT};
use crate::models::{NewTask, Task};
use crate::notify::{self, Notifier};
use crate::parser::parse_task_input;
use crate::store::TaskRepository;
use chrono::{DateTime, Local, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::widgets::ListState;
use tracing::{error, info, warn};

pub enum InputMode {
    Normal,
    Editing,
    Insert,
    ConfirmDelete,
}

#[derive(PartialEq)]
pub enum ActiveInput {
    Title,
    Deadline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowDisplay {
    Pending,
    Counting(Countdown),
    Expired,
    Finished,
}

// A displayed task and its countdown
pub struct Row {
    pub task: Task,
    pub ticker: Ticker,
    pub display: RowDisplay,
}

impl Row {
    pub fn countdown_text(&self) -> String {
        match self.display {
            RowDisplay::Pending => String::new(),
            RowDisplay::Counting(countdown) => countdown.to_string(),
            RowDisplay::Expired => EXPIRED_TEXT.to_string(),
            RowDisplay::Finished => "Finished".to_string(),
        }
    }

    /// Finished rows no longer accept finish or delete.
    pub fn is_locked(&self) -> bool {
        self.display == RowDisplay::Finished
    }
}

pub struct App {
    pub rows: Vec<Row>,
    pub state: ListState,
    pub input_mode: InputMode,
    pub active_input: ActiveInput,
    pub new_task_title: String,
    pub new_task_deadline: String,
    pub status: Option<String>,
    pending_delete: Option<u64>,
    store: Box<dyn TaskRepository>,
    notifier: Box<dyn Notifier>,
    tickers: TickerRegistry,
    timestamp_format: String,
}

impl App {
    /// Builds the app and displays every unfinished stored task.
    pub fn new(
        store: Box<dyn TaskRepository>,
        notifier: Box<dyn Notifier>,
        tickers: TickerRegistry,
        timestamp_format: impl Into<String>,
    ) -> App {
        let mut app = App {
            rows: Vec::new(),
            state: ListState::default(),
            input_mode: InputMode::Normal,
            active_input: ActiveInput::Title,
            new_task_title: String::new(),
            new_task_deadline: String::new(),
            status: None,
            pending_delete: None,
            store,
            notifier,
            tickers,
            timestamp_format: timestamp_format.into(),
        };

        let now = Utc::now();
        let tasks = app.store.list();
        let total = tasks.len();
        for task in tasks.into_iter().filter(|task| !task.finished) {
            app.show(task, now);
        }
        info!(
            "Loaded {} tasks ({} shown, {} counting down)",
            total,
            app.rows.len(),
            app.tickers.active()
        );

        if !app.rows.is_empty() {
            app.state.select(Some(0));
        } else {
            app.state.select(None);
        }
        app
    }

    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }

    #[cfg(test)]
    pub fn tickers(&self) -> &TickerRegistry {
        &self.tickers
    }

    fn show(&mut self, task: Task, now: DateTime<Utc>) {
        let id = task.id;
        self.rows.push(Row {
            ticker: Ticker::new(task.deadline),
            task,
            display: RowDisplay::Pending,
        });
        self.tickers.start(id);
        self.on_tick(TickEvent { id, at: now });
    }

    pub fn on_tick(&mut self, event: TickEvent) {
        let Some(row) = self.rows.iter_mut().find(|row| row.task.id == event.id) else {
            // Deleted between the timer firing and now.
            self.tickers.cancel(event.id);
            return;
        };
        if row.is_locked() {
            self.tickers.cancel(event.id);
            return;
        }

        match row.ticker.tick(event.at) {
            Tick::Remaining(countdown) => row.display = RowDisplay::Counting(countdown),
            Tick::Expired => {
                row.display = RowDisplay::Expired;
                self.tickers.cancel(event.id);
                info!("Deadline expired for task {}", event.id);
                notify::deadline_expired(self.notifier.as_ref());
            }
            Tick::Stopped => {
                self.tickers.cancel(event.id);
            }
        }
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.state.selected().and_then(|i| self.rows.get(i))
    }

    pub fn next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= self.rows.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    self.rows.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    /// Validates the form, persists the new task and starts its countdown.
    /// Returns whether a task was added.
    pub fn submit(&mut self, now: DateTime<Local>) -> bool {
        let parsed = match parse_task_input(&self.new_task_title, &self.new_task_deadline, now) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.status = Some(err.to_string());
                return false;
            }
        };

        let new_task = NewTask::new(parsed.title, now, &self.timestamp_format, parsed.deadline);
        match self.store.insert(new_task) {
            Ok(task) => {
                info!("Added task {}", task.id);
                let title = task.task.clone();
                self.show(task, now.with_timezone(&Utc));
                self.state.select(Some(self.rows.len() - 1));
                notify::task_added(self.notifier.as_ref(), &title);
                self.new_task_title.clear();
                self.new_task_deadline.clear();
                self.status = None;
                true
            }
            Err(err) => {
                error!("Failed to save task: {}", err);
                self.status = Some(format!("Failed to save task: {}", err));
                false
            }
        }
    }

    /// Asks for confirmation before deleting the selected row.
    pub fn request_delete(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        if row.is_locked() {
            return;
        }
        let id = row.task.id;
        let title = row.task.task.clone();
        self.pending_delete = Some(id);
        self.status = Some(format!(
            "Are you sure you want to delete the task \"{}\"? (y/n)",
            title
        ));
        self.input_mode = InputMode::ConfirmDelete;
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
        self.status = None;
        self.input_mode = InputMode::Normal;
    }

    pub fn confirm_delete(&mut self) {
        self.input_mode = InputMode::Normal;
        let Some(id) = self.pending_delete.take() else {
            return;
        };

        match self.store.delete(id) {
            Ok(task) => {
                self.tickers.cancel(id);
                self.rows.retain(|row| row.task.id != id);
                self.clamp_selection();
                info!("Deleted task {}", id);
                notify::task_deleted(self.notifier.as_ref(), &task.task);
                self.status = None;
            }
            Err(err) => {
                error!("Failed to delete task {}: {}", id, err);
                self.status = Some(format!("Failed to delete task: {}", err));
            }
        }
    }

    pub fn finish_selected(&mut self) {
        let Some(index) = self.state.selected() else {
            return;
        };
        let Some(row) = self.rows.get(index) else {
            return;
        };
        if row.is_locked() {
            return;
        }
        let id = row.task.id;

        match self.store.finish(id) {
            Ok(task) => {
                self.tickers.cancel(id);
                let row = &mut self.rows[index];
                row.task.finished = true;
                row.display = RowDisplay::Finished;
                info!("Finished task {}", id);
                self.status = Some(format!("You have finished the task: \"{}\"", task.task));
            }
            Err(err) => {
                error!("Failed to finish task {}: {}", id, err);
                self.status = Some(format!("Failed to finish task: {}", err));
            }
        }
    }

    fn clamp_selection(&mut self) {
        if self.rows.is_empty() {
            self.state.select(None);
        } else {
            let i = self.state.selected().unwrap_or(0).min(self.rows.len() - 1);
            self.state.select(Some(i));
        }
    }

    pub fn handle_input(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }

        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Char('j') | KeyCode::Down => self.next(),
                KeyCode::Char('k') | KeyCode::Up => self.previous(),
                KeyCode::Char('a') => {
                    self.input_mode = InputMode::Editing;
                    self.new_task_title.clear();
                    self.new_task_deadline.clear();
                    self.active_input = ActiveInput::Title;
                    self.status = None;
                }
                KeyCode::Char('f') => self.finish_selected(),
                KeyCode::Char('d') => self.request_delete(),
                _ => {}
            },

            InputMode::Editing => match key.code {
                KeyCode::Char('i') => {
                    self.input_mode = InputMode::Insert;
                }
                KeyCode::Tab => {
                    self.active_input = match self.active_input {
                        ActiveInput::Title => ActiveInput::Deadline,
                        ActiveInput::Deadline => ActiveInput::Title,
                    };
                }
                KeyCode::Enter => {
                    if self.submit(Local::now()) {
                        self.input_mode = InputMode::Normal;
                    } else {
                        warn!("Rejected new task: {:?}", self.status);
                    }
                }
                KeyCode::Esc => {
                    self.new_task_title.clear();
                    self.new_task_deadline.clear();
                    self.status = None;
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            },

            InputMode::Insert => match key.code {
                KeyCode::Char(c) => match self.active_input {
                    ActiveInput::Title => self.new_task_title.push(c),
                    ActiveInput::Deadline => self.new_task_deadline.push(c),
                },
                KeyCode::Backspace => match self.active_input {
                    ActiveInput::Title => {
                        self.new_task_title.pop();
                    }
                    ActiveInput::Deadline => {
                        self.new_task_deadline.pop();
                    }
                },
                KeyCode::Tab => {
                    self.active_input = match self.active_input {
                        ActiveInput::Title => ActiveInput::Deadline,
                        ActiveInput::Deadline => ActiveInput::Title,
                    };
                }
                KeyCode::Esc => {
                    self.input_mode = InputMode::Editing;
                }
                _ => {}
            },

            InputMode::ConfirmDelete => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm_delete(),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.cancel_delete(),
                _ => {}
            },
        }
        false
    }
}
