//! `cadence worker`: run one suite file and print its result as JSON
//!
//! Spawned by `cadence run --workers N`. Logs go to stderr, so stdout
//! carries nothing but the serialized `SuiteResult`.

use std::path::PathBuf;

use cadence_e2e::TestRunner;
use clap::Args;
use tracing::debug;

use super::GlobalOpts;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Suite file to run
    pub suite: PathBuf,
}

pub async fn execute(args: WorkerArgs, opts: &GlobalOpts) -> anyhow::Result<()> {
    let config = opts.load_config()?;
    let runner = TestRunner::new(config);
    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    debug!(suite = %args.suite.display(), "worker starting");
    let result = runner.run_suite_file(&args.suite).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
