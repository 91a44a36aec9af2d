use serde::Serialize;

/// Marker printed by `/usr/bin/time -v` in front of the peak resident set size.
pub const PEAK_RSS_MARKER: &str = "Maximum resident set size";

/// Peak memory of a run in kilobytes.
///
/// The wrapper does not always report memory (timeouts, missing wrapper), and
/// result logs encode that as a literal zero. `Unknown` keeps the two apart
/// until the value is written out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Memory {
    Known(f64),
    Unknown,
}

impl Memory {
    /// Reads a logged value back; a zero reading means nothing was reported.
    pub fn from_logged_kb(kb: f64) -> Self {
        if kb > 0.0 { Memory::Known(kb) } else { Memory::Unknown }
    }

    pub fn known_kb(&self) -> Option<f64> {
        match self {
            Memory::Known(kb) => Some(*kb),
            Memory::Unknown => None,
        }
    }

    /// Kilobytes as written to a result log, with `Unknown` collapsing to zero.
    pub fn logged_kb(&self) -> f64 {
        self.known_kb().unwrap_or(0.0)
    }
}

/// Extract the peak resident set size from the wrapper's diagnostic output.
///
/// Only the first marker line is considered. A missing marker, empty text or
/// an unparsable value all yield `Memory::Unknown`.
pub fn extract_peak_kb(diagnostics: &str) -> Memory {
    let Some(line) = diagnostics
        .lines()
        .find(|line| line.contains(PEAK_RSS_MARKER))
    else {
        return Memory::Unknown;
    };

    match line.split_whitespace().last().map(str::parse::<u64>) {
        Some(Ok(kb)) => Memory::Known(kb as f64),
        _ => {
            tracing::debug!("unparsable peak memory line: {:?}", line);
            Memory::Unknown
        }
    }
}
