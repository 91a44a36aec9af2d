use std::path::PathBuf;

use serde::Serialize;

/// A named flag combination of the subject program, bound to the log file
/// that plotting and table tooling read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptionSet {
    pub flags: &'static str,
    pub log_name: &'static str,
}

impl OptionSet {
    pub fn args(&self) -> impl Iterator<Item = &'static str> {
        self.flags.split_whitespace()
    }
}

/// Every option set, in the order a corpus is benchmarked.
pub const OPTION_SETS: [OptionSet; 5] = [
    OptionSet {
        flags: "-b",
        log_name: "h3.log",
    },
    OptionSet {
        flags: "-b -no",
        log_name: "no.log",
    },
    OptionSet {
        flags: "-b -co",
        log_name: "co.log",
    },
    OptionSet {
        flags: "-b -coc",
        log_name: "coc.log",
    },
    OptionSet {
        flags: "-b -noc",
        log_name: "noc.log",
    },
];

/// One (option set, input file) pair under measurement.
#[derive(Debug, Clone)]
pub struct BenchmarkCase {
    pub option_set: OptionSet,
    pub input: PathBuf,
}

impl BenchmarkCase {
    /// Name written at the front of the case's log line.
    pub fn file_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed { code: Option<i32> },
    TimedOut,
    InvocationError(String),
}

/// Output of a single subject invocation.
#[derive(Debug, Clone)]
pub struct RawRunResult {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
}

impl RawRunResult {
    pub fn timed_out(stderr: String) -> Self {
        RawRunResult {
            status: RunStatus::TimedOut,
            stdout: String::new(),
            stderr,
        }
    }

    pub fn invocation_error(detail: impl Into<String>) -> Self {
        RawRunResult {
            status: RunStatus::InvocationError(detail.into()),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Trimmed stdout of a successful run, if it printed anything.
    pub fn output_line(&self) -> Option<&str> {
        if self.status != RunStatus::Success {
            return None;
        }
        let line = self.stdout.trim();
        if line.is_empty() { None } else { Some(line) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Measured,
    Unusable,
}

/// What the driver appended for one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub corpus: String,
    pub log_name: &'static str,
    pub file_name: String,
    pub status: CaseStatus,
    pub runs: u32,
    pub mean_total_ms: Option<f64>,
    pub mean_memory_kb: Option<f64>,
    #[serde(skip)]
    pub line: String,
}
