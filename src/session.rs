use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::Aggregator;
use crate::discover;
use crate::errors::FruitbenchError;
use crate::invoke::Invoke;
use crate::memory::extract_peak_kb;
use crate::plan::RepetitionPolicy;
use crate::record::{self, Measurement};
use crate::types::{BenchmarkCase, CaseOutcome, CaseStatus, OPTION_SETS, OptionSet, RawRunResult};

/// Everything appended during one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cases: Vec<CaseOutcome>,
}

/// Drives benchmark cases strictly one after another.
pub struct Session<I> {
    invoker: I,
    policy: RepetitionPolicy,
}

impl<I: Invoke> Session<I> {
    pub fn new(invoker: I, policy: RepetitionPolicy) -> Self {
        Session { invoker, policy }
    }

    /// Benchmark every corpus under `data_dir`, writing logs under
    /// `results_dir/<corpus>/`.
    pub fn run_all(&mut self, data_dir: &Path, results_dir: &Path) -> Result<SessionReport, FruitbenchError> {
        let started_at = Utc::now();
        let corpora = discover::discover_corpora(data_dir)?;

        let mut cases = Vec::new();
        for corpus in &corpora {
            cases.extend(self.run_corpus(corpus, results_dir));
        }

        Ok(SessionReport {
            started_at,
            finished_at: Utc::now(),
            cases,
        })
    }

    /// Benchmark every input file of `corpus` with every option set.
    pub fn run_corpus(&mut self, corpus: &Path, results_dir: &Path) -> Vec<CaseOutcome> {
        let corpus_name = corpus
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result_dir = match prepare_result_dir(results_dir, &corpus_name) {
            Ok(dir) => dir,
            Err(err) => {
                tracing::error!("{}; skipping corpus {}", err, corpus_name);
                return vec![];
            }
        };

        let inputs = discover::discover_inputs(corpus);
        let mut outcomes = Vec::new();
        for option_set in OPTION_SETS {
            let log_path = result_dir.join(option_set.log_name);
            outcomes.extend(self.run_option_set(&inputs, option_set, &log_path));
        }
        outcomes
    }

    /// Truncate `log_path`, then append one line per input file.
    pub fn run_option_set(&mut self, inputs: &[PathBuf], option_set: OptionSet, log_path: &Path) -> Vec<CaseOutcome> {
        let mut log = match File::create(log_path) {
            Ok(f) => f,
            Err(err) => {
                tracing::error!("Cannot open {}: {}", log_path.display(), err);
                return vec![];
            }
        };

        let mut outcomes = Vec::new();
        for input in inputs {
            let case = BenchmarkCase {
                option_set,
                input: input.clone(),
            };
            let Some(outcome) = self.run_case(&case) else {
                continue;
            };
            if let Err(err) = writeln!(log, "{}", outcome.line).and_then(|_| log.flush()) {
                tracing::error!("Cannot append to {}: {}", log_path.display(), err);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Measure one case and build its log line.
    ///
    /// Returns `None` only when the input file is gone before the first run.
    /// An unusable first run yields the zero-runs placeholder; an unusable
    /// later run ends the repetitions and keeps what was collected.
    pub fn run_case(&mut self, case: &BenchmarkCase) -> Option<CaseOutcome> {
        let file_name = case.file_name();
        if !case.input.is_file() {
            tracing::warn!("Skipping {}: not a readable file", case.input.display());
            return None;
        }
        tracing::info!(
            "Processing {} {}...",
            case.input.display(),
            case.option_set.flags
        );

        let first = self.invoker.invoke(&case.option_set, &case.input);
        let first_memory = extract_peak_kb(&first.stderr);
        let Some((mut last_line, first_measurement)) = usable(&first) else {
            tracing::warn!("Result is not valid in initial run!");
            return Some(self.outcome(
                case,
                CaseStatus::Unusable,
                record::format_placeholder_line(&file_name, first_memory),
                0,
                None,
                first_memory.known_kb(),
            ));
        };

        let mut aggregator = Aggregator::new();
        aggregator.accumulate(&first_measurement, first_memory);
        let planned = self.policy.plan_reps(first_measurement.total_time_ms());

        while aggregator.count() < planned {
            if self.policy.should_stop(aggregator.cumulative_total_ms()) {
                tracing::info!(
                    "Stopping further runs for {} after {} repetitions (total time exceeded).",
                    case.input.display(),
                    aggregator.count()
                );
                break;
            }

            let result = self.invoker.invoke(&case.option_set, &case.input);
            let memory = extract_peak_kb(&result.stderr);
            match usable(&result) {
                Some((line, measurement)) => {
                    aggregator.accumulate(&measurement, memory);
                    last_line = line;
                }
                None => {
                    tracing::warn!(
                        "Result is not valid in average runs! Keeping {} completed runs.",
                        aggregator.count()
                    );
                    break;
                }
            }
        }

        let averaged = aggregator.finalize()?;
        let rewritten = record::serialize(&last_line, &averaged.measurement);
        let line = record::format_log_line(&file_name, &rewritten, averaged.memory, averaged.runs);

        Some(self.outcome(
            case,
            CaseStatus::Measured,
            line,
            averaged.runs,
            Some(averaged.measurement.total_time_ms()),
            averaged.memory.known_kb(),
        ))
    }

    fn outcome(
        &self,
        case: &BenchmarkCase,
        status: CaseStatus,
        line: String,
        runs: u32,
        mean_total_ms: Option<f64>,
        mean_memory_kb: Option<f64>,
    ) -> CaseOutcome {
        let corpus = case
            .input
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        CaseOutcome {
            corpus,
            log_name: case.option_set.log_name,
            file_name: case.file_name(),
            status,
            runs,
            mean_total_ms,
            mean_memory_kb,
            line,
        }
    }
}

fn prepare_result_dir(results_dir: &Path, corpus_name: &str) -> Result<PathBuf, FruitbenchError> {
    let dir = results_dir.join(corpus_name);
    std::fs::create_dir_all(&dir).map_err(|source| FruitbenchError::ResultsDirUnwritable {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// The output line and its measurement, if the run produced a valid one.
fn usable(result: &RawRunResult) -> Option<(String, Measurement)> {
    let line = result.output_line()?;
    match record::parse_output(line) {
        Ok(measurement) => Some((line.to_string(), measurement)),
        Err(err) => {
            tracing::warn!("Discarding unparsable output: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::types::RunStatus;
    use std::collections::VecDeque;
    use std::fs;

    fn subject_line(nodes: u64, total: f64) -> String {
        format!(
            "#nodes:  {nodes} , #edges:  {e} , #scc:  {nodes} , #chains:  1 , scheme-size:  {nodes} , #removed-edges:  0 , #collapse-nodes:  {nodes} , #collapse-edges:  {e} , #decomp-nodes:  {nodes} , #decomp-edges:  {e} , #scheme-nodes:  {nodes} , #scheme-edges:  {e} , time-decomp:  {d:.4} ms , time-preprocess:  0.0000 ms , time-scheme:  0.0000 ms , time-reading:  0.0000 ms , time-comp:  {total:.4} ms , time-total:  {total:.4} ms , time-collapse:  0.0000 ms , time-topo:  0.0000 ms , time-remove_edges:  0.0000 ms , time-topo_edges_time:  0.0000 ms",
            e = nodes - 1,
            d = total / 2.0,
        )
    }

    fn ok(total: f64, memory_kb: u64) -> RawRunResult {
        RawRunResult {
            status: RunStatus::Success,
            stdout: format!("{}\n", subject_line(10, total)),
            stderr: format!("\tMaximum resident set size (kbytes): {}\n", memory_kb),
        }
    }

    fn failed() -> RawRunResult {
        RawRunResult {
            status: RunStatus::Failed { code: Some(2) },
            stdout: String::new(),
            stderr: "\tMaximum resident set size (kbytes): 777\n".to_string(),
        }
    }

    /// Replays scripted results, then repeats `fallback` if set.
    struct ScriptedInvoker {
        results: VecDeque<RawRunResult>,
        fallback: Option<RawRunResult>,
        calls: usize,
    }

    impl ScriptedInvoker {
        fn new(results: Vec<RawRunResult>) -> Self {
            ScriptedInvoker {
                results: results.into(),
                fallback: None,
                calls: 0,
            }
        }

        fn repeating(result: RawRunResult) -> Self {
            ScriptedInvoker {
                results: VecDeque::new(),
                fallback: Some(result),
                calls: 0,
            }
        }
    }

    impl Invoke for ScriptedInvoker {
        fn invoke(&mut self, _option_set: &OptionSet, _input: &Path) -> RawRunResult {
            self.calls += 1;
            self.results
                .pop_front()
                .or_else(|| self.fallback.clone())
                .unwrap_or_else(|| RawRunResult::invocation_error("script exhausted"))
        }
    }

    fn input_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "n: 10\n0 1\n").unwrap();
        path
    }

    fn case(input: PathBuf) -> BenchmarkCase {
        BenchmarkCase {
            option_set: OPTION_SETS[0],
            input,
        }
    }

    #[test]
    fn unusable_first_run_records_placeholder() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "big.gr");
        let mut session = Session::new(ScriptedInvoker::new(vec![failed()]), RepetitionPolicy::default());

        let outcome = session.run_case(&case(input)).unwrap();
        assert_eq!(outcome.status, CaseStatus::Unusable);
        assert_eq!(outcome.runs, 0);
        assert_eq!(outcome.line, "big.gr: time-total: > 5min , memory: 777.00 KB , runs: 0");
        assert_eq!(session.invoker.calls, 1);
    }

    #[test]
    fn timed_out_first_run_has_zero_memory() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "big.gr");
        let invoker = ScriptedInvoker::new(vec![RawRunResult::timed_out(String::new())]);
        let mut session = Session::new(invoker, RepetitionPolicy::default());

        let outcome = session.run_case(&case(input)).unwrap();
        assert_eq!(outcome.line, "big.gr: time-total: > 5min , memory: 0.00 KB , runs: 0");
        assert_eq!(outcome.mean_memory_kb, None);
    }

    #[test]
    fn unparsable_first_output_is_unusable() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "g.gr");
        let garbage = RawRunResult {
            status: RunStatus::Success,
            stdout: "Usage: go run fruit <file_path>\n".to_string(),
            stderr: String::new(),
        };
        let mut session = Session::new(ScriptedInvoker::new(vec![garbage]), RepetitionPolicy::default());

        let outcome = session.run_case(&case(input)).unwrap();
        assert_eq!(outcome.status, CaseStatus::Unusable);
    }

    #[test]
    fn repetitions_are_capped_by_plan() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "g.gr");
        let policy = RepetitionPolicy::new(100.0, 2, 4).unwrap();
        let mut session = Session::new(ScriptedInvoker::repeating(ok(10.0, 1000)), policy);

        let outcome = session.run_case(&case(input)).unwrap();
        assert_eq!(outcome.status, CaseStatus::Measured);
        assert_eq!(outcome.runs, 4);
        assert_eq!(session.invoker.calls, 4);
        assert_eq!(outcome.mean_total_ms, Some(10.0));
        assert_eq!(outcome.mean_memory_kb, Some(1000.0));
    }

    #[test]
    fn stops_when_budget_is_spent_before_plan() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "slow.gr");
        let policy = RepetitionPolicy::new(30_000.0, 50, 1000).unwrap();
        let mut session = Session::new(ScriptedInvoker::repeating(ok(10_000.0, 64)), policy);

        let outcome = session.run_case(&case(input)).unwrap();
        assert_eq!(outcome.runs, 3);
        assert_eq!(session.invoker.calls, 3);
        assert!(outcome.line.ends_with(", runs: 3"));
    }

    // Documents the fail-stop choice: one bad repetition ends the case
    // instead of being retried or skipped.
    #[test]
    fn invalid_repetition_truncates_the_loop() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "g.gr");
        let invoker = ScriptedInvoker::new(vec![ok(10.0, 100), ok(20.0, 300), failed(), ok(30.0, 500)]);
        let mut session = Session::new(invoker, RepetitionPolicy::default());

        let outcome = session.run_case(&case(input)).unwrap();
        assert_eq!(session.invoker.calls, 3);
        assert_eq!(outcome.status, CaseStatus::Measured);
        assert_eq!(outcome.runs, 2);
        assert_eq!(outcome.mean_total_ms, Some(15.0));
        assert_eq!(outcome.mean_memory_kb, Some(200.0));
    }

    #[test]
    fn log_line_carries_averaged_timings() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let input = input_file(tmp.path(), "g.gr");
        let invoker = ScriptedInvoker::new(vec![ok(10.0, 100), ok(20.0, 300), ok(30.0, 500)]);
        let policy = RepetitionPolicy::new(1000.0, 1, 3).unwrap();
        let mut session = Session::new(invoker, policy);

        let outcome = session.run_case(&case(input)).unwrap();
        let record = record::parse_record(&outcome.line).unwrap();
        assert_eq!(record.name, "g.gr");
        assert_eq!(record.runs, 3);
        assert_eq!(record.memory, Memory::Known(300.0));
        assert_eq!(record.measurement.total_time_ms(), 20.0);
        assert_eq!(record.measurement.get("time_decomp"), Some(10.0));
        assert!(outcome.line.contains("time-total:  20.0000 ms"));
    }

    #[test]
    fn missing_input_is_skipped_without_running() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mut session = Session::new(ScriptedInvoker::repeating(ok(1.0, 1)), RepetitionPolicy::default());

        assert!(session.run_case(&case(tmp.path().join("gone.gr"))).is_none());
        assert_eq!(session.invoker.calls, 0);
    }

    #[test]
    fn run_all_writes_one_log_per_option_set() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let results = tmp.path().join("benches");
        fs::create_dir_all(data.join("gn")).unwrap();
        input_file(&data.join("gn"), "gn_10.gr");
        input_file(&data.join("gn"), "gn_100.gr");
        fs::create_dir_all(results.join("gn")).unwrap();
        fs::write(results.join("gn").join("h3.log"), "stale line\n").unwrap();

        let policy = RepetitionPolicy::new(30.0, 1, 3).unwrap();
        let mut session = Session::new(ScriptedInvoker::repeating(ok(10.0, 2048)), policy);
        let report = session.run_all(&data, &results).unwrap();

        assert_eq!(report.cases.len(), 10);
        for option_set in OPTION_SETS {
            let contents = fs::read_to_string(results.join("gn").join(option_set.log_name)).unwrap();
            assert_eq!(contents.lines().count(), 2);
            assert!(!contents.contains("stale"));
            let records = record::parse_log(&contents);
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r.runs == 3));
        }
        assert!(report.cases.iter().all(|c| c.corpus == "gn"));
    }

    #[test]
    fn unwritable_results_dir_skips_the_corpus() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(data.join("gn")).unwrap();
        input_file(&data.join("gn"), "gn_10.gr");
        let results = tmp.path().join("benches");
        fs::write(&results, "not a directory").unwrap();

        let mut session = Session::new(ScriptedInvoker::repeating(ok(1.0, 1)), RepetitionPolicy::default());
        let report = session.run_all(&data, &results).unwrap();

        assert!(report.cases.is_empty());
        assert_eq!(session.invoker.calls, 0);
        assert!(matches!(
            prepare_result_dir(&results, "gn"),
            Err(FruitbenchError::ResultsDirUnwritable { .. })
        ));
    }

    #[test]
    fn run_all_fails_only_on_missing_data_dir() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mut session = Session::new(ScriptedInvoker::new(vec![]), RepetitionPolicy::default());
        let err = session
            .run_all(&tmp.path().join("missing"), &tmp.path().join("benches"))
            .unwrap_err();
        assert!(matches!(err, FruitbenchError::DataDirUnreadable { .. }));
    }
}
