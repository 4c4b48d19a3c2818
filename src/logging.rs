use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "tickdown.log";
const DEFAULT_FILTER: &str = "tickdown=info";

/// Sends log output to `<data_dir>/tickdown.log`; the terminal belongs to the UI.
pub fn init(data_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))?;

    let filter =
        EnvFilter::try_from_env("TICKDOWN_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A subscriber may already be installed (tests); keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_log_file() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("data");

        init(&dir).unwrap();
        tracing::info!("written by test_init_creates_log_file");

        assert!(dir.join(LOG_FILE).exists());
    }
}
