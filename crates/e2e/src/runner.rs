//! Main test runner that orchestrates the target, suites and reporters

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::browser::BrowserLauncher;
use crate::commands::CommandRegistry;
use crate::config::HarnessConfig;
use crate::context::ExecutionContext;
use crate::error::{CadenceError, CadenceResult};
use crate::fixture::{load_bindings, DirFixtures, FixtureProvider};
use crate::http::HttpAdapter;
use crate::ids::IdGenerator;
use crate::queue::{CommandQueue, QueueVerdict};
use crate::report::{write_summary, CaseOutcome, CaseResult, ConsoleReporter, Reporter, RunSummary, SuiteResult};
use crate::server::TargetService;
use crate::spec::{TestCase, TestSuite};

/// Runs suite files, one fresh execution context per file
pub struct TestRunner {
    config: HarnessConfig,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    fixtures: Arc<dyn FixtureProvider>,
    reporters: Vec<Box<dyn Reporter>>,
    target: Option<TargetService>,
    cancel: CancellationToken,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        let fixtures = Arc::new(DirFixtures::new(config.fixtures_dir.clone()));
        Self {
            config,
            launcher: None,
            fixtures,
            reporters: vec![Box::new(ConsoleReporter)],
            target: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use this launcher instead of the one the configuration describes.
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_fixtures(mut self, fixtures: Arc<dyn FixtureProvider>) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn without_console(mut self) -> Self {
        self.reporters.clear();
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Cancelling this token aborts the case in flight and skips the rest.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the managed target, if one is configured
    pub async fn start_target(&mut self) -> CadenceResult<()> {
        if self.target.is_some() {
            return Ok(());
        }
        if let Some(target) = &self.config.target {
            self.target = Some(TargetService::spawn(target, &self.config.base_url).await?);
        }
        Ok(())
    }

    pub async fn stop_target(&mut self) {
        if let Some(mut target) = self.target.take() {
            target.stop().await;
        }
    }

    /// Run all suites in the specs directory
    pub async fn run_all(&mut self) -> CadenceResult<RunSummary> {
        let suites = TestSuite::load_all(&self.config.specs_dir)?;
        self.run_suites(&suites).await
    }

    /// Run one suite file without touching the managed target.
    pub async fn run_suite_file(&self, path: &Path) -> CadenceResult<SuiteResult> {
        let suite = TestSuite::from_file(path)?;
        Ok(self.run_suite(&suite).await)
    }

    pub async fn run_suites(&mut self, suites: &[TestSuite]) -> CadenceResult<RunSummary> {
        let started_at = Utc::now();
        self.start_target().await?;

        info!("Running {} suite(s)...", suites.len());
        let mut results = Vec::with_capacity(suites.len());
        for suite in suites {
            results.push(self.run_suite(suite).await);
        }

        self.stop_target().await;
        let summary = RunSummary::new(started_at, results);
        self.finish(&summary)?;
        Ok(summary)
    }

    /// Hand a finished run to every reporter.
    pub fn finish(&self, summary: &RunSummary) -> CadenceResult<()> {
        for reporter in &self.reporters {
            reporter.run_finished(summary)?;
        }
        Ok(())
    }

    fn launcher(&self) -> CadenceResult<Arc<dyn BrowserLauncher>> {
        match &self.launcher {
            Some(launcher) => Ok(launcher.clone()),
            None => self.config.launcher(),
        }
    }

    fn build_context(&self, suite: &TestSuite, ids: IdGenerator) -> CadenceResult<ExecutionContext> {
        let base_url = suite.base_url.clone().unwrap_or_else(|| self.config.base_url.clone());
        let http = HttpAdapter::new(base_url, self.config.request_timeout())?;
        let fixtures = load_bindings(self.fixtures.as_ref(), &suite.fixtures)?;

        let mut commands = CommandRegistry::with_builtins();
        commands.extend(&suite.commands);

        let mut ctx = ExecutionContext::new(http)
            .with_fixtures(fixtures)
            .with_ids(ids)
            .with_commands(commands)
            .with_policy(suite.retry.clone().unwrap_or_else(|| self.config.retry.clone()))
            .with_viewport(suite.viewport.unwrap_or(self.config.viewport))
            .suppress_app_exceptions(
                suite
                    .suppress_app_exceptions
                    .unwrap_or(self.config.suppress_app_exceptions),
            );
        if suite.uses_browser() {
            ctx = ctx.with_launcher(self.launcher()?);
        }
        Ok(ctx)
    }

    /// Run a single suite. Setup failures are reported in the result.
    pub async fn run_suite(&self, suite: &TestSuite) -> SuiteResult {
        let start = Instant::now();
        for reporter in &self.reporters {
            reporter.suite_started(&suite.name);
        }

        let ids = IdGenerator::from_seeds(&[suite.seed, self.config.seed]);
        let seed = ids.seed();
        info!(suite = %suite.name, seed, "id generator seeded");

        let mut ctx = match self.build_context(suite, ids) {
            Ok(ctx) => ctx,
            Err(e) => {
                let result = SuiteResult::failed_setup(&suite.name, suite.source.clone(), seed, &e);
                for reporter in &self.reporters {
                    reporter.suite_finished(&result);
                }
                return result;
            }
        };

        let case_timeout = Duration::from_millis(suite.case_timeout_ms.unwrap_or(self.config.case_timeout_ms));
        let mut cases = Vec::with_capacity(suite.cases.len());
        for case in &suite.cases {
            let result = if self.cancel.is_cancelled() {
                CaseResult::skipped(&case.name, "run cancelled")
            } else {
                self.run_case(&mut ctx, suite, case, case_timeout).await
            };
            for reporter in &self.reporters {
                reporter.case_finished(&suite.name, &result);
            }
            cases.push(result);
        }
        ctx.close_browser().await;

        let result = SuiteResult {
            name: suite.name.clone(),
            source: suite.source.clone(),
            seed,
            duration_ms: start.elapsed().as_millis() as u64,
            cases,
            error: None,
        };
        for reporter in &self.reporters {
            reporter.suite_finished(&result);
        }
        result
    }

    async fn run_case(
        &self,
        ctx: &mut ExecutionContext,
        suite: &TestSuite,
        case: &TestCase,
        case_timeout: Duration,
    ) -> CaseResult {
        if case.skip {
            return CaseResult::skipped(&case.name, "marked skip");
        }

        let token = self.cancel.child_token();
        ctx.begin_case(token.clone());
        if let Some(missing) = case.requires.iter().find(|key| ctx.scope().resolve(key).is_err()) {
            return CaseResult::skipped(&case.name, format!("`{}` was never written", missing));
        }

        debug!(suite = %suite.name, case = %case.name, "running case");

        let mut queue = CommandQueue::new(suite.before_each.clone())
            .with_deadline(Some(case.timeout_ms.map(Duration::from_millis).unwrap_or(case_timeout)));
        for step in &case.steps {
            queue.enqueue(step.clone());
        }

        let start = Instant::now();
        let outcome = queue.run(ctx).await;
        // Nothing started by this case outlives it.
        token.cancel();
        let duration_ms = start.elapsed().as_millis() as u64;

        let (outcome_kind, error, skip_reason) = match outcome.verdict {
            QueueVerdict::Completed => (CaseOutcome::Passed, None, None),
            QueueVerdict::Failed(e) => (CaseOutcome::Failed, Some(describe_failure(&e)), None),
            QueueVerdict::Skipped(key) => (
                CaseOutcome::Skipped,
                None,
                Some(format!("`{}` was never written", key)),
            ),
        };

        CaseResult {
            name: case.name.clone(),
            outcome: outcome_kind,
            duration_ms,
            steps: outcome.steps,
            error,
            skip_reason,
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, summary: &RunSummary) -> CadenceResult<PathBuf> {
        write_summary(&self.config.output_dir, summary)
    }
}

fn describe_failure(err: &CadenceError) -> String {
    match err {
        CadenceError::OriginBridgeFailure { .. } => format!("{} [{}]", err, err.root_cause().kind()),
        other => other.to_string(),
    }
}
