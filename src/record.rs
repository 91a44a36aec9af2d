//! Codec for the fixed-schema measurement line.
//!
//! The subject prints 22 comma-separated `key: value` segments in a fixed
//! order; the driver appends `memory` and `runs` and prefixes the input file
//! name. Downstream tooling reads these lines positionally, so the order in
//! [`SCHEMA`] is load-bearing for both directions.

use std::path::Path;

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::errors::FruitbenchError;
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned integer count.
    Count,
    /// Milliseconds, printed with an ` ms` suffix.
    Millis,
    /// Kilobytes, printed with a ` KB` suffix.
    Kilobytes,
    /// Number of repetitions averaged into the line.
    Runs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name used by analysis tooling.
    pub name: &'static str,
    /// Key as it appears on the wire.
    pub token: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, token: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, token, kind }
}

/// Number of leading schema fields printed by the subject program itself.
pub const SUBJECT_FIELDS: usize = 22;

/// Every field of a result log line, in positional order.
pub const SCHEMA: [FieldSpec; 24] = [
    field("nodes", "#nodes", FieldKind::Count),
    field("edges", "#edges", FieldKind::Count),
    field("scc", "#scc", FieldKind::Count),
    field("chains", "#chains", FieldKind::Count),
    field("scheme_size", "scheme-size", FieldKind::Count),
    field("removed_edges", "#removed-edges", FieldKind::Count),
    field("collapse_nodes", "#collapse-nodes", FieldKind::Count),
    field("collapse_edges", "#collapse-edges", FieldKind::Count),
    field("decomp_nodes", "#decomp-nodes", FieldKind::Count),
    field("decomp_edges", "#decomp-edges", FieldKind::Count),
    field("scheme_nodes", "#scheme-nodes", FieldKind::Count),
    field("scheme_edges", "#scheme-edges", FieldKind::Count),
    field("time_decomp", "time-decomp", FieldKind::Millis),
    field("time_preprocess", "time-preprocess", FieldKind::Millis),
    field("time_scheme", "time-scheme", FieldKind::Millis),
    field("time_reading", "time-reading", FieldKind::Millis),
    field("time_comp", "time-comp", FieldKind::Millis),
    field("time_total", "time-total", FieldKind::Millis),
    field("time_collapse", "time-collapse", FieldKind::Millis),
    field("time_topo", "time-topo", FieldKind::Millis),
    field("time_remove_edges", "time-remove_edges", FieldKind::Millis),
    field("time_topo_edges_time", "time-topo_edges_time", FieldKind::Millis),
    field("memory", "memory", FieldKind::Kilobytes),
    field("runs", "runs", FieldKind::Runs),
];

const SEGMENT_SEPARATOR: &str = ", ";
const KEY_SEPARATOR: &str = ": ";
const NODES_MARKER: &str = "#nodes: ";

/// Marks a case whose first run produced no usable measurement.
pub const SENTINEL_MARKER: &str = "time-total: > 5min";

/// Node counts below this are degenerate instances and never reported.
pub const MIN_NODES: f64 = 2.0;

/// Downstream tooling divides logged kilobytes by this to plot megabytes.
pub const MEMORY_CONVERSION_FACTOR: f64 = 1e3;

const TIME_TOTAL_INDEX: usize = 17;

/// Why a line did not yield a record.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("case {name} has no usable measurement")]
    Sentinel { name: String },

    #[error("expected {expected} segments, found {found}")]
    MissingSegments { expected: usize, found: usize },

    #[error("field {field} has no numeric value in {segment:?}")]
    BadValue { field: &'static str, segment: String },

    #[error("node count {nodes} is below the validity floor")]
    BelowNodeFloor { nodes: u64 },
}

/// The subject's numeric fields, one value per leading schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    values: [f64; SUBJECT_FIELDS],
}

impl Measurement {
    pub fn from_values(values: [f64; SUBJECT_FIELDS]) -> Self {
        Measurement { values }
    }

    pub fn values(&self) -> &[f64; SUBJECT_FIELDS] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        SCHEMA[..SUBJECT_FIELDS]
            .iter()
            .position(|spec| spec.name == name)
            .map(|i| self.values[i])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldSpec, f64)> + '_ {
        SCHEMA[..SUBJECT_FIELDS].iter().zip(self.values.iter().copied())
    }

    pub fn nodes(&self) -> u64 {
        self.values[0] as u64
    }

    pub fn edges(&self) -> u64 {
        self.values[1] as u64
    }

    pub fn total_time_ms(&self) -> f64 {
        self.values[TIME_TOTAL_INDEX]
    }
}

impl Serialize for Measurement {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SUBJECT_FIELDS))?;
        for (spec, value) in self.fields() {
            if spec.kind == FieldKind::Count && value.fract() == 0.0 {
                map.serialize_entry(spec.name, &(value as u64))?;
            } else {
                map.serialize_entry(spec.name, &value)?;
            }
        }
        map.end()
    }
}

/// One parsed line of a finished result log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub name: String,
    #[serde(flatten)]
    pub measurement: Measurement,
    #[serde(serialize_with = "serialize_logged_kb")]
    pub memory: Memory,
    pub runs: u32,
}

fn serialize_logged_kb<S: serde::Serializer>(memory: &Memory, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(memory.logged_kb())
}

impl MeasurementRecord {
    pub fn memory_mb(&self) -> f64 {
        self.memory.logged_kb() / MEMORY_CONVERSION_FACTOR
    }
}

/// Parse a line printed by the subject program.
///
/// No node-count floor is applied here: the driver still records tiny
/// instances, readers drop them.
pub fn parse_output(line: &str) -> Result<Measurement, LineError> {
    let segments = split_segments(line, SUBJECT_FIELDS)?;
    parse_measurement(&segments)
}

/// Parse one line of a result log.
pub fn parse_record(line: &str) -> Result<MeasurementRecord, LineError> {
    let name = line.split(KEY_SEPARATOR).next().unwrap_or_default().trim();

    if line.contains(SENTINEL_MARKER) {
        return Err(LineError::Sentinel {
            name: name.to_string(),
        });
    }

    let segments = split_segments(line, SCHEMA.len())?;
    let measurement = parse_measurement(&segments)?;
    let memory_kb = parse_value(&SCHEMA[SUBJECT_FIELDS], segments[SUBJECT_FIELDS])?;
    let runs = parse_value(&SCHEMA[SUBJECT_FIELDS + 1], segments[SUBJECT_FIELDS + 1])? as u32;

    if measurement.values[0] < MIN_NODES {
        return Err(LineError::BelowNodeFloor {
            nodes: measurement.nodes(),
        });
    }

    Ok(MeasurementRecord {
        name: name.to_string(),
        measurement,
        memory: Memory::from_logged_kb(memory_kb),
        runs,
    })
}

fn split_segments(line: &str, expected: usize) -> Result<Vec<&str>, LineError> {
    let segments: Vec<&str> = line.trim_end().split(SEGMENT_SEPARATOR).collect();
    if segments.len() < expected {
        return Err(LineError::MissingSegments {
            expected,
            found: segments.len(),
        });
    }
    Ok(segments)
}

fn parse_measurement(segments: &[&str]) -> Result<Measurement, LineError> {
    let mut values = [0.0; SUBJECT_FIELDS];
    for (i, spec) in SCHEMA[..SUBJECT_FIELDS].iter().enumerate() {
        values[i] = if i == 0 {
            parse_nodes(spec, segments[0])?
        } else {
            parse_value(spec, segments[i])?
        };
    }
    Ok(Measurement { values })
}

// The first segment may carry the record name in front of the node count.
fn parse_nodes(spec: &FieldSpec, segment: &str) -> Result<f64, LineError> {
    segment
        .split(NODES_MARKER)
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(|n| n as f64)
        .ok_or_else(|| bad_value(spec, segment))
}

fn parse_value(spec: &FieldSpec, segment: &str) -> Result<f64, LineError> {
    let raw = segment
        .split(KEY_SEPARATOR)
        .nth(1)
        .ok_or_else(|| bad_value(spec, segment))?;

    let value = match spec.kind {
        FieldKind::Count | FieldKind::Runs => raw.trim().parse::<u64>().ok().map(|n| n as f64),
        FieldKind::Millis | FieldKind::Kilobytes => raw
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0),
    };

    value.ok_or_else(|| bad_value(spec, segment))
}

fn bad_value(spec: &FieldSpec, segment: &str) -> LineError {
    LineError::BadValue {
        field: spec.name,
        segment: segment.to_string(),
    }
}

/// Rewrite the timing values of `original` with the values of `averaged`.
///
/// Each `<timing-token>: <number> ms` occurrence gets the new value with four
/// decimals; whitespace, counts and any other text are kept as they are.
pub fn serialize(original: &str, averaged: &Measurement) -> String {
    averaged
        .fields()
        .filter(|(spec, _)| spec.kind == FieldKind::Millis)
        .fold(original.to_string(), |line, (spec, value)| {
            rewrite_timing(&line, spec.token, value)
        })
}

fn rewrite_timing(line: &str, token: &str, value: f64) -> String {
    let needle = format!("{token}:");
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(pos) = rest.find(&needle) {
        let (before, from_token) = rest.split_at(pos);
        out.push_str(before);
        out.push_str(&needle);
        let after_token = &from_token[needle.len()..];

        let at_boundary = before.chars().next_back().is_none_or(|c| !is_token_char(c));
        match timing_value_span(after_token) {
            Some((lead, len)) if at_boundary => {
                out.push_str(&after_token[..lead]);
                out.push_str(&format!("{value:.4}"));
                rest = &after_token[lead + len..];
            }
            _ => rest = after_token,
        }
    }

    out.push_str(rest);
    out
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '#'
}

/// Locate `<ws><number><ws>ms` at the start of `s`, returning the length of
/// the leading whitespace and of the number.
fn timing_value_span(s: &str) -> Option<(usize, usize)> {
    let lead = s.len() - s.trim_start().len();
    let number = &s[lead..];
    let len = number
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(number.len());
    if len == 0 || !number[len..].trim_start().starts_with("ms") {
        return None;
    }
    Some((lead, len))
}

/// A finished result log line.
pub fn format_log_line(name: &str, rewritten: &str, memory: Memory, runs: u32) -> String {
    format!(
        "{}: {} , memory: {:.2} KB , runs: {}",
        name,
        rewritten,
        memory.logged_kb(),
        runs
    )
}

/// The line recorded for a case whose first run was unusable.
pub fn format_placeholder_line(name: &str, memory: Memory) -> String {
    format!(
        "{}: {} , memory: {:.2} KB , runs: 0",
        name,
        SENTINEL_MARKER,
        memory.logged_kb()
    )
}

/// Parse every usable record of a result log's contents.
///
/// Sentinel lines are reported and skipped, malformed lines are skipped with a
/// warning, and degenerate instances are dropped silently.
pub fn parse_log(contents: &str) -> Vec<MeasurementRecord> {
    let mut records = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(line) {
            Ok(record) => records.push(record),
            Err(LineError::Sentinel { name }) => {
                tracing::info!("Ignoring faulty run: {}", name);
            }
            Err(LineError::BelowNodeFloor { .. }) => {}
            Err(err) => {
                tracing::warn!("Skipping line {}: {}", line_no + 1, err);
            }
        }
    }
    records
}

/// Read and parse a result log from disk.
pub fn read_log(path: &Path) -> Result<Vec<MeasurementRecord>, FruitbenchError> {
    tracing::debug!("Parsing {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|source| FruitbenchError::LogReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_log(&contents))
}
