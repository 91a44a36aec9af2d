use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum FruitbenchError {
    #[error("Benchmark data directory {path} is not accessible: {source}")]
    DataDirUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to prepare results directory {path}: {source}")]
    ResultsDirUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read config file {path}: {source}")]
    ConfigReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParseError { path: PathBuf, detail: String },

    #[error("Invalid repetition bounds: min_reps ({min}) must be between 1 and max_reps ({max})")]
    InvalidRepetitionBounds { min: u32, max: u32 },

    #[error("Invalid time budget: budget_ms ({budget_ms}) must be a positive number")]
    InvalidBudget { budget_ms: f64 },

    #[error("Failed to read result log {path}: {source}")]
    LogReadError {
        path: PathBuf,
        source: std::io::Error,
    },
}
