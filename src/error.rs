use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored tasks are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("no task with id {0}")]
    NotFound(u64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Please add a task!")]
    EmptyTask,
    #[error("Please add a valid deadline!")]
    EmptyDeadline,
    #[error("Could not understand deadline '{0}'")]
    InvalidDeadline(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no data directory available; set TICKDOWN_DATA_DIR")]
    NoDataDir,
}
