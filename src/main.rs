//! tickdown - a terminal task tracker with live deadline countdowns

use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dotenv::dotenv;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use tickdown::app::App;
use tickdown::cli::{self, Cli};
use tickdown::config::Config;
use tickdown::countdown::TickerRegistry;
use tickdown::logging;
use tickdown::notify::DesktopNotifier;
use tickdown::store::{FileKeyValue, TaskStore};
use tickdown::ui;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    let data_dir = config.data_dir()?;
    logging::init(&data_dir)?;
    info!("Using data directory {}", data_dir.display());

    let store = TaskStore::open(FileKeyValue::new(&data_dir))?;

    // Ask once; every later notification is a no-op when denied
    let notifier = DesktopNotifier::request(config.notifications);

    if let Some(command) = cli.command {
        return cli::run(command, &store, &notifier, &config, &mut io::stdout());
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let tickers = TickerRegistry::new(config.tick_interval(), tx);
    let app = App::new(
        Box::new(store),
        Box::new(notifier),
        tickers,
        config.timestamp_format.clone(),
    );

    // Setup terminal UI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    terminal.hide_cursor()?;

    let res = ui::run_app(&mut terminal, app, rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}
