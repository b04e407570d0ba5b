//! Step, case and suite results plus the reporters that consume them

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{CadenceError, CadenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed,
    /// A precondition was absent; not counted as a failure.
    Skipped,
    /// Failed with `fail_on_error: false`; the error is the step output.
    Tolerated,
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Last observed state on timeout, status and body on HTTP failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Value>,
}

impl StepResult {
    pub fn passed(name: impl Into<String>, duration_ms: u64, output: Option<Value>) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Passed,
            duration_ms,
            output,
            error: None,
            error_kind: None,
            diagnostics: None,
        }
    }

    pub fn from_error(name: impl Into<String>, duration_ms: u64, outcome: StepOutcome, err: &CadenceError) -> Self {
        let output = match outcome {
            StepOutcome::Tolerated => Some(serde_json::json!({
                "error": err.to_string(),
                "kind": err.kind(),
            })),
            _ => None,
        };
        Self {
            name: name.into(),
            outcome,
            duration_ms,
            output,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            diagnostics: err.diagnostics(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub outcome: CaseOutcome,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl CaseResult {
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: CaseOutcome::Skipped,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
            skip_reason: Some(reason.into()),
        }
    }
}

/// Result of running one suite file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Id generator seed; rerun with `--seed` to reproduce
    pub seed: u64,
    pub duration_ms: u64,
    pub cases: Vec<CaseResult>,
    /// Setup failure (fixtures, browser launch) that prevented any case from running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuiteResult {
    pub fn failed_setup(name: impl Into<String>, source: Option<PathBuf>, seed: u64, err: &CadenceError) -> Self {
        Self {
            name: name.into(),
            source,
            seed,
            duration_ms: 0,
            cases: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    fn count(&self, outcome: CaseOutcome) -> usize {
        self.cases.iter().filter(|c| c.outcome == outcome).count()
    }

    pub fn passed(&self) -> usize {
        self.count(CaseOutcome::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(CaseOutcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(CaseOutcome::Skipped)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed() == 0
    }

    pub fn case(&self, name: &str) -> Option<&CaseResult> {
        self.cases.iter().find(|c| c.name == name)
    }
}

/// Result of running all suites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub suites: Vec<SuiteResult>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, suites: Vec<SuiteResult>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            suites,
        }
    }

    pub fn total(&self) -> usize {
        self.suites.iter().map(|s| s.cases.len()).sum()
    }

    pub fn passed(&self) -> usize {
        self.suites.iter().map(SuiteResult::passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.suites.iter().map(SuiteResult::failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.suites.iter().map(SuiteResult::skipped).sum()
    }

    pub fn broken_suites(&self) -> usize {
        self.suites.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn is_success(&self) -> bool {
        self.suites.iter().all(SuiteResult::is_success)
    }
}

/// Receives results as they are produced.
pub trait Reporter: Send + Sync {
    fn suite_started(&self, _name: &str) {}

    fn case_finished(&self, _suite: &str, _case: &CaseResult) {}

    fn suite_finished(&self, _result: &SuiteResult) {}

    fn run_finished(&self, _summary: &RunSummary) -> CadenceResult<()> {
        Ok(())
    }
}

/// ✓/✗ lines through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn suite_started(&self, name: &str) {
        info!("Running suite {}", name);
    }

    fn case_finished(&self, suite: &str, case: &CaseResult) {
        match case.outcome {
            CaseOutcome::Passed => info!("✓ {} > {} ({} ms)", suite, case.name, case.duration_ms),
            CaseOutcome::Failed => error!(
                "✗ {} > {} - {}",
                suite,
                case.name,
                case.error.as_deref().unwrap_or("unknown error")
            ),
            CaseOutcome::Skipped => warn!(
                "- {} > {} skipped: {}",
                suite,
                case.name,
                case.skip_reason.as_deref().unwrap_or("")
            ),
        }
    }

    fn suite_finished(&self, result: &SuiteResult) {
        if let Some(err) = &result.error {
            error!("✗ {} - {}", result.name, err);
        }
        info!(
            "{}: {} passed, {} failed, {} skipped ({} ms, seed {})",
            result.name,
            result.passed(),
            result.failed(),
            result.skipped(),
            result.duration_ms,
            result.seed
        );
    }

    fn run_finished(&self, summary: &RunSummary) -> CadenceResult<()> {
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            summary.passed(),
            summary.failed(),
            summary.skipped(),
            summary.duration_ms()
        );
        Ok(())
    }
}

/// Writes `test-results.json` into an output directory.
#[derive(Debug, Clone)]
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join("test-results.json")
    }

    pub fn write(&self, summary: &RunSummary) -> CadenceResult<PathBuf> {
        write_summary(&self.output_dir, summary)
    }
}

impl Reporter for JsonReporter {
    fn run_finished(&self, summary: &RunSummary) -> CadenceResult<()> {
        self.write(summary).map(|_| ())
    }
}

/// Write test results to JSON file
pub fn write_summary(output_dir: &Path, summary: &RunSummary) -> CadenceResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(name: &str, outcome: CaseOutcome) -> CaseResult {
        CaseResult {
            name: name.into(),
            outcome,
            duration_ms: 1,
            steps: Vec::new(),
            error: None,
            skip_reason: None,
        }
    }

    #[test]
    fn skips_do_not_fail_a_suite() {
        let suite = SuiteResult {
            name: "petstore-api".into(),
            source: None,
            seed: 1,
            duration_ms: 10,
            cases: vec![case("create", CaseOutcome::Passed), case("read", CaseOutcome::Skipped)],
            error: None,
        };
        assert!(suite.is_success());
        assert_eq!(suite.skipped(), 1);

        let summary = RunSummary::new(Utc::now(), vec![suite]);
        assert_eq!(summary.total(), 2);
        assert!(summary.is_success());
    }

    #[test]
    fn tolerated_failure_is_step_output() {
        let err = CadenceError::AssertionFailure {
            expected: "200".into(),
            actual: "404".into(),
        };
        let step = StepResult::from_error("get pet", 3, StepOutcome::Tolerated, &err);
        assert_eq!(step.output.unwrap()["kind"], "assertion_failure");
    }

    #[test]
    fn json_reporter_writes_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = JsonReporter::new(dir.path().join("out"));
        let summary = RunSummary::new(Utc::now(), Vec::new());
        reporter.run_finished(&summary).unwrap();

        let written: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(reporter.path()).unwrap()).unwrap();
        assert_eq!(written.run_id, summary.run_id);
    }
}
