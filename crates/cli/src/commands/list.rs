//! `cadence list`: show the suites a run would pick up

use std::path::PathBuf;

use cadence_e2e::TestSuite;
use clap::Args;
use serde::Serialize;

use super::GlobalOpts;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only suites carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuiteRow {
    pub name: String,
    pub file: PathBuf,
    pub cases: usize,
    pub tags: Vec<String>,
    pub browser: bool,
}

impl TableDisplay for SuiteRow {
    fn headers() -> Vec<&'static str> {
        vec!["Suite", "File", "Cases", "Tags", "Browser"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.file.display().to_string(),
            self.cases.to_string(),
            self.tags.join(", "),
            if self.browser { "yes" } else { "no" }.to_string(),
        ]
    }
}

impl From<&TestSuite> for SuiteRow {
    fn from(suite: &TestSuite) -> Self {
        Self {
            name: suite.name.clone(),
            file: suite.source.clone().unwrap_or_default(),
            cases: suite.cases.len(),
            tags: suite.tags.clone(),
            browser: suite.uses_browser(),
        }
    }
}

pub async fn execute(args: ListArgs, opts: &GlobalOpts, format: OutputFormat) -> anyhow::Result<()> {
    let config = opts.load_config()?;
    let suites = TestSuite::load_all(&config.specs_dir)?;
    let rows: Vec<SuiteRow> = match &args.tag {
        Some(tag) => TestSuite::filter_by_tag(&suites, tag).into_iter().map(SuiteRow::from).collect(),
        None => suites.iter().map(SuiteRow::from).collect(),
    };
    print_list(&rows, format);
    Ok(())
}
