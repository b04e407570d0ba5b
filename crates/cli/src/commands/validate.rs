//! `cadence validate`: parse configuration and suites without running anything

use std::path::PathBuf;

use cadence_e2e::TestSuite;
use clap::Args;

use super::{suite_files, GlobalOpts};
use crate::output::{print_error, print_success};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Suite files (defaults to every suite in the specs directory)
    pub files: Vec<PathBuf>,
}

/// Returns the number of invalid files.
pub async fn execute(args: ValidateArgs, opts: &GlobalOpts) -> anyhow::Result<usize> {
    let config = opts.load_config()?;
    print_success(&format!("configuration ok ({})", opts.config.display()));

    let mut invalid = 0;
    for path in suite_files(&args.files, &config.specs_dir)? {
        match TestSuite::from_file(&path) {
            Ok(suite) => print_success(&format!(
                "{}: {} ({} cases)",
                path.display(),
                suite.name,
                suite.cases.len()
            )),
            Err(e) => {
                invalid += 1;
                print_error(&e.to_string());
            }
        }
    }
    Ok(invalid)
}
