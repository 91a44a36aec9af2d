use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::FruitbenchError;
use crate::invoke::{DEFAULT_TIMEOUT, ProcessInvoker};
use crate::plan::{DEFAULT_BUDGET_MS, DEFAULT_MAX_REPS, DEFAULT_MIN_REPS, RepetitionPolicy};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "fruitbench.toml";

/// Session settings. Every key is optional in the TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub subject: PathBuf,
    pub wrapper: Vec<String>,
    pub timeout_secs: u64,
    pub budget_ms: f64,
    pub min_reps: u32,
    pub max_reps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("benches"),
            subject: PathBuf::from("./fruit"),
            wrapper: vec!["/usr/bin/time".to_string(), "-v".to_string()],
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            budget_ms: DEFAULT_BUDGET_MS,
            min_reps: DEFAULT_MIN_REPS,
            max_reps: DEFAULT_MAX_REPS,
        }
    }
}

impl Config {
    /// Load from `explicit` if given, else from `fruitbench.toml` if present,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Config, FruitbenchError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, FruitbenchError> {
        let text = std::fs::read_to_string(path).map_err(|source| FruitbenchError::ConfigReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| FruitbenchError::ConfigParseError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.policy()?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn policy(&self) -> Result<RepetitionPolicy, FruitbenchError> {
        RepetitionPolicy::new(self.budget_ms, self.min_reps, self.max_reps)
    }

    pub fn invoker(&self) -> ProcessInvoker {
        ProcessInvoker::new(
            self.wrapper.clone(),
            self.subject.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}
