use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;

use crate::record::MeasurementRecord;
use crate::session::SessionReport;
use crate::types::{CaseOutcome, CaseStatus};

/// Format milliseconds compactly: "0.42ms", "12.3ms", "4.20s".
pub fn format_millis(ms: f64) -> String {
    if ms < 10.0 {
        format!("{:.2}ms", ms)
    } else if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Format kilobytes as megabytes, the unit analysis tooling plots.
pub fn format_memory_kb(kb: Option<f64>) -> String {
    match kb {
        Some(kb) => format!("{:.1}MB", kb / 1e3),
        None => "-".to_string(),
    }
}

fn style_header() -> Style {
    Style::new().dimmed()
}

fn style_log() -> Style {
    Style::new().cyan().bold()
}

/// Human summary of a finished session.
pub fn format_summary(report: &SessionReport) -> String {
    let mut out = String::new();

    let header = format!(
        "Benchmark session {} - {}:",
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        report.finished_at.format("%H:%M:%S")
    );
    out.push_str(
        &header
            .if_supports_color(Stream::Stdout, |s| s.style(style_header()))
            .to_string(),
    );
    out.push_str("\n\n");

    if report.cases.is_empty() {
        out.push_str("  (no cases)\n");
        return out;
    }

    let name_width = report
        .cases
        .iter()
        .map(|c| c.corpus.len() + 1 + c.file_name.len())
        .max()
        .unwrap_or(0);

    for case in &report.cases {
        out.push_str(&format_case_row(case, name_width));
    }

    let unusable = report
        .cases
        .iter()
        .filter(|c| c.status == CaseStatus::Unusable)
        .count();
    out.push('\n');
    let footer = format!(
        "{} cases, {} without a usable run",
        report.cases.len(),
        unusable
    );
    out.push_str(
        &footer
            .if_supports_color(Stream::Stdout, |s| s.dimmed())
            .to_string(),
    );
    out.push('\n');
    out
}

fn format_case_row(case: &CaseOutcome, name_width: usize) -> String {
    let log = format!("{:<7}", case.log_name);
    let log_colored = log
        .if_supports_color(Stream::Stdout, |s| s.style(style_log()))
        .to_string();

    let name = format!("{}/{}", case.corpus, case.file_name);
    let name_padded = format!("{:<width$}", name, width = name_width);

    let detail = match case.status {
        CaseStatus::Measured => {
            let total = case.mean_total_ms.map(format_millis).unwrap_or_default();
            format!(
                "{:>9}  {:>8}  runs: {}",
                total,
                format_memory_kb(case.mean_memory_kb),
                case.runs
            )
            .if_supports_color(Stream::Stdout, |s| s.green())
            .to_string()
        }
        CaseStatus::Unusable => "no usable run"
            .if_supports_color(Stream::Stdout, |s| s.yellow())
            .to_string(),
    };

    format!("  {} {}  {}\n", log_colored, name_padded, detail)
}

pub fn format_summary_json(report: &SessionReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// Human table of records read back from a result log.
pub fn format_records(log_name: &str, records: &[MeasurementRecord]) -> String {
    let mut out = String::new();
    out.push_str(
        &format!("{}:", log_name)
            .if_supports_color(Stream::Stdout, |s| s.style(style_log()))
            .to_string(),
    );
    out.push('\n');

    if records.is_empty() {
        out.push_str(
            &"  (no usable records)"
                .if_supports_color(Stream::Stdout, |s| s.dimmed())
                .to_string(),
        );
        out.push('\n');
        return out;
    }

    let name_width = records.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let columns = format!(
        "  {:<width$}  {:>9}  {:>9}  {:>9}  {:>8}  {:>5}",
        "name",
        "nodes",
        "edges",
        "total",
        "memory",
        "runs",
        width = name_width
    );
    out.push_str(
        &columns
            .if_supports_color(Stream::Stdout, |s| s.dimmed())
            .to_string(),
    );
    out.push('\n');

    for record in records {
        out.push_str(&format!(
            "  {:<width$}  {:>9}  {:>9}  {:>9}  {:>8}  {:>5}\n",
            record.name,
            record.measurement.nodes(),
            record.measurement.edges(),
            format_millis(record.measurement.total_time_ms()),
            format_memory_kb(record.memory.known_kb()),
            record.runs,
            width = name_width
        ));
    }
    out
}

#[derive(Serialize)]
struct JsonLog<'a> {
    log: &'a str,
    records: &'a [MeasurementRecord],
}

pub fn format_records_json(logs: &[(String, Vec<MeasurementRecord>)]) -> String {
    let json_logs: Vec<JsonLog> = logs
        .iter()
        .map(|(log, records)| JsonLog { log, records })
        .collect();
    serde_json::to_string_pretty(&json_logs).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn fixed_time(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn measured(file: &str, total: f64) -> CaseOutcome {
        CaseOutcome {
            corpus: "gn".to_string(),
            log_name: "h3.log",
            file_name: file.to_string(),
            status: CaseStatus::Measured,
            runs: 12,
            mean_total_ms: Some(total),
            mean_memory_kb: Some(2048.0),
            line: String::new(),
        }
    }

    fn unusable(file: &str) -> CaseOutcome {
        CaseOutcome {
            corpus: "gn".to_string(),
            log_name: "no.log",
            file_name: file.to_string(),
            status: CaseStatus::Unusable,
            runs: 0,
            mean_total_ms: None,
            mean_memory_kb: None,
            line: String::new(),
        }
    }

    fn report(cases: Vec<CaseOutcome>) -> SessionReport {
        SessionReport {
            started_at: fixed_time("2026-02-18T10:00:00Z"),
            finished_at: fixed_time("2026-02-18T10:05:30Z"),
            cases,
        }
    }

    // --- format_millis ---

    #[test]
    fn millis_small() {
        assert_eq!(format_millis(0.4242), "0.42ms");
    }

    #[test]
    fn millis_medium() {
        assert_eq!(format_millis(123.45), "123.5ms");
    }

    #[test]
    fn millis_seconds() {
        assert_eq!(format_millis(4200.0), "4.20s");
    }

    #[test]
    fn memory_unknown_is_dash() {
        assert_eq!(format_memory_kb(None), "-");
        assert_eq!(format_memory_kb(Some(2048.0)), "2.0MB");
    }

    // --- format_summary ---

    #[test]
    fn summary_lists_every_case() {
        let out = format_summary(&report(vec![measured("gn_10.gr", 0.5), unusable("gn_1m.gr")]));
        assert!(out.contains("Benchmark session 2026-02-18 10:00:00 - 10:05:30:"));
        assert!(out.contains("gn/gn_10.gr"));
        assert!(out.contains("runs: 12"));
        assert!(out.contains("gn/gn_1m.gr"));
        assert!(out.contains("no usable run"));
        assert!(out.contains("2 cases, 1 without a usable run"));
    }

    #[test]
    fn summary_of_empty_session() {
        let out = format_summary(&report(vec![]));
        assert!(out.contains("(no cases)"));
    }

    #[test]
    fn summary_json_is_structured() {
        let json = format_summary_json(&report(vec![measured("gn_10.gr", 0.5), unusable("x.gr")]));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let cases = parsed["cases"].as_array().unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0]["status"], "measured");
        assert_eq!(cases[0]["runs"], 12);
        assert_eq!(cases[1]["status"], "unusable");
        assert!(cases[1]["mean_total_ms"].is_null());
        assert!(cases[0].get("line").is_none());
        assert_eq!(parsed["started_at"], "2026-02-18T10:00:00Z");
    }

    // --- format_records ---

    #[test]
    fn records_table_for_empty_log() {
        let out = format_records("h3.log", &[]);
        assert!(out.contains("h3.log:"));
        assert!(out.contains("(no usable records)"));
    }
}
