//! CLI Commands

pub mod list;
pub mod run;
pub mod validate;
pub mod worker;

use std::path::{Path, PathBuf};

use anyhow::Context;
use cadence_e2e::{HarnessConfig, TestSuite};

/// Options every subcommand shares; forwarded verbatim to worker processes.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub config: PathBuf,
    pub base_url: Option<String>,
    pub seed: Option<u64>,
    pub verbose: bool,
}

impl GlobalOpts {
    /// File, then `CADENCE_*` environment, then flags.
    pub fn load_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = HarnessConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        config.apply_env()?;
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Explicit files when given, otherwise every suite under `dir`.
pub fn suite_files(files: &[PathBuf], dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files.to_vec());
    }
    Ok(TestSuite::discover(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(&path, "base_url = \"http://127.0.0.1:1/api/v3\"\nseed = 1\n").unwrap();

        let opts = GlobalOpts {
            config: path.clone(),
            base_url: Some("http://127.0.0.1:2/api/v3".into()),
            seed: Some(2),
            verbose: false,
        };
        let config = opts.load_config().unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:2/api/v3");
        assert_eq!(config.seed, Some(2));
    }

    #[test]
    fn explicit_files_win_over_discovery() {
        let files = vec![PathBuf::from("specs/petstore-api.yaml")];
        assert_eq!(suite_files(&files, Path::new("/nonexistent")).unwrap(), files);
        assert!(suite_files(&[], Path::new("/nonexistent")).is_err());
    }
}
