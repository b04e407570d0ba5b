//! Harness configuration
//!
//! Read from `cadence.toml` when present, then overridden by
//! `CADENCE_BASE_URL` / `CADENCE_SEED`, then by command line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{Browser, BrowserLauncher, PlaywrightConfig, PlaywrightLauncher, ScriptedLauncher, ScriptedSite};
use crate::error::{CadenceError, CadenceResult};
use crate::retry::RetryPolicy;
use crate::spec::Viewport;

pub const BASE_URL_ENV: &str = "CADENCE_BASE_URL";
pub const SEED_ENV: &str = "CADENCE_SEED";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the HTTP service under test
    pub base_url: String,

    /// Directory of YAML suites
    pub specs_dir: PathBuf,

    /// Directory fixture files are read from
    pub fixtures_dir: PathBuf,

    /// Where `test-results.json` is written
    pub output_dir: PathBuf,

    /// Id generator seed; random when unset
    pub seed: Option<u64>,

    /// Wall clock budget per case
    pub case_timeout_ms: u64,

    /// Default per-request timeout
    pub request_timeout_ms: u64,

    /// Default policy for observing steps
    pub retry: RetryPolicy,

    pub viewport: Viewport,

    /// Log uncaught page exceptions instead of failing the step
    pub suppress_app_exceptions: bool,

    pub browser: BrowserConfig,

    /// Service to start before the run and stop after it
    pub target: Option<TargetConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v3".to_string(),
            specs_dir: PathBuf::from("specs"),
            fixtures_dir: PathBuf::from("fixtures"),
            output_dir: PathBuf::from("test-results"),
            seed: None,
            case_timeout_ms: 60_000,
            request_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            viewport: Viewport::default(),
            suppress_app_exceptions: true,
            browser: BrowserConfig::default(),
            target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Playwright,
    Scripted,
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub driver: DriverKind,

    /// chromium, firefox or webkit
    pub engine: Browser,

    pub headless: bool,

    /// Directory holding `node_modules/playwright`
    pub node_project_dir: Option<PathBuf>,

    /// Upper bound for one driver round trip
    pub command_timeout_ms: u64,

    /// Site description for the scripted driver
    pub scripted_site: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Playwright,
            engine: Browser::Chromium,
            headless: true,
            node_project_dir: None,
            command_timeout_ms: 30_000,
            scripted_site: None,
        }
    }
}

/// Managed target process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Polled relative to `base_url` until it answers 2xx
    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_startup_timeout_ms() -> u64 {
    30_000
}

impl TargetConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file; defaults when the file is absent.
    pub fn load(path: &Path) -> CadenceResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `CADENCE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> CadenceResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CadenceResult<()> {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(seed) = lookup(SEED_ENV).filter(|s| !s.trim().is_empty()) {
            let seed = seed
                .trim()
                .parse()
                .map_err(|e| CadenceError::Config(format!("{}={}: {}", SEED_ENV, seed, e)))?;
            self.seed = Some(seed);
        }
        Ok(())
    }

    pub fn validate(&self) -> CadenceResult<()> {
        Url::parse(&self.base_url)
            .map_err(|e| CadenceError::Config(format!("base_url `{}`: {}", self.base_url, e)))?;
        if self.case_timeout_ms == 0 {
            return Err(CadenceError::Config("case_timeout_ms must be positive".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(CadenceError::Config("viewport must be non-zero".into()));
        }
        if self.browser.driver == DriverKind::Scripted && self.browser.scripted_site.is_none() {
            return Err(CadenceError::Config(
                "browser.driver = \"scripted\" needs browser.scripted_site".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }

    pub fn playwright_config(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            browser: self.browser.engine,
            headless: self.browser.headless,
            node_project_dir: self.browser.node_project_dir.clone(),
            command_timeout: Duration::from_millis(self.browser.command_timeout_ms),
        }
    }

    /// Build the launcher for the configured driver.
    pub fn launcher(&self) -> CadenceResult<Arc<dyn BrowserLauncher>> {
        match self.browser.driver {
            DriverKind::Playwright => Ok(Arc::new(PlaywrightLauncher::new(self.playwright_config()))),
            DriverKind::Scripted => {
                let path = self.browser.scripted_site.as_deref().ok_or_else(|| {
                    CadenceError::Config("scripted driver needs browser.scripted_site".into())
                })?;
                Ok(Arc::new(ScriptedLauncher::new(ScriptedSite::from_file(path)?)))
            }
        }
    }
}
