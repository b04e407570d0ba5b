//! `cadence run`: execute suites in process or across worker processes

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use cadence_e2e::{JsonReporter, RunSummary, SuiteResult, TestRunner, TestSuite};
use chrono::Utc;
use clap::Args;
use futures::stream::{self, StreamExt};
use tokio::process::Command;
use tracing::{info, warn};

use super::GlobalOpts;
use crate::output::print_warning;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Suite files (defaults to every suite in the specs directory)
    pub files: Vec<PathBuf>,

    /// Run only suites carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run each suite file in its own worker process, at most N at a time
    #[arg(short, long, default_value = "1")]
    pub workers: usize,

    /// Skip writing test-results.json
    #[arg(long)]
    pub no_report: bool,
}

pub async fn execute(args: RunArgs, opts: &GlobalOpts) -> anyhow::Result<RunSummary> {
    let config = opts.load_config()?;

    let mut suites = if args.files.is_empty() {
        TestSuite::load_all(&config.specs_dir)?
    } else {
        args.files
            .iter()
            .map(|f| TestSuite::from_file(f))
            .collect::<Result<Vec<_>, _>>()?
    };
    if let Some(tag) = &args.tag {
        suites.retain(|s| s.tags.iter().any(|t| t == tag));
    }
    if suites.is_empty() {
        print_warning("No suites selected");
    }

    let output_dir = config.output_dir.clone();
    let mut runner = TestRunner::new(config);
    if !args.no_report {
        runner = runner.with_reporter(Box::new(JsonReporter::new(output_dir)));
    }

    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the run");
            cancel.cancel();
        }
    });

    if args.workers <= 1 {
        return Ok(runner.run_suites(&suites).await?);
    }

    let started_at = Utc::now();
    runner.start_target().await?;

    let files: Vec<PathBuf> = suites.iter().filter_map(|s| s.source.clone()).collect();
    info!("Running {} suite(s) on {} workers...", files.len(), args.workers);
    let results = run_in_workers(&files, args.workers, opts).await;

    runner.stop_target().await;
    let summary = RunSummary::new(started_at, results?);
    runner.finish(&summary)?;
    Ok(summary)
}

/// One `cadence worker` child per file, at most `workers` alive at once.
/// Results come back in file order.
pub async fn run_in_workers(files: &[PathBuf], workers: usize, opts: &GlobalOpts) -> anyhow::Result<Vec<SuiteResult>> {
    let exe = std::env::current_exe().context("locating the cadence executable")?;
    stream::iter(files.iter().map(|file| run_worker(&exe, file, opts)))
        .buffered(workers.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect()
}

async fn run_worker(exe: &Path, file: &Path, opts: &GlobalOpts) -> anyhow::Result<SuiteResult> {
    let mut cmd = Command::new(exe);
    cmd.arg("--config").arg(&opts.config);
    if let Some(url) = &opts.base_url {
        cmd.arg("--base-url").arg(url);
    }
    if let Some(seed) = opts.seed {
        cmd.arg("--seed").arg(seed.to_string());
    }
    if opts.verbose {
        cmd.arg("--verbose");
    }
    cmd.arg("worker")
        .arg(file)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("spawning worker for {}", file.display()))?;

    if !output.status.success() {
        return Ok(broken_suite(file, format!("worker exited with {}", output.status)));
    }
    Ok(parse_worker_output(file, &output.stdout))
}

/// The result is the last non-empty stdout line.
pub fn parse_worker_output(file: &Path, stdout: &[u8]) -> SuiteResult {
    let text = String::from_utf8_lossy(stdout);
    match text.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => serde_json::from_str(line)
            .unwrap_or_else(|e| broken_suite(file, format!("unreadable worker output: {}", e))),
        None => broken_suite(file, "worker printed no result".to_string()),
    }
}

fn broken_suite(file: &Path, error: String) -> SuiteResult {
    SuiteResult {
        name: file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string()),
        source: Some(file.to_path_buf()),
        seed: 0,
        duration_ms: 0,
        cases: Vec::new(),
        error: Some(error),
    }
}
