//! Managed target service - spawning and health checking the system under test

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::error::{CadenceError, CadenceResult};
use crate::http::{HttpAdapter, HttpMethod, RequestOptions};
use crate::retry::{Poller, RetryPolicy};

/// Handle to a running target process
pub struct TargetService {
    child: Child,
    base_url: String,
}

impl TargetService {
    /// Spawn the target and wait until its health path answers 2xx.
    pub async fn spawn(config: &TargetConfig, base_url: &str) -> CadenceResult<Self> {
        info!("Starting target: {} {}", config.command, config.args.join(" "));

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            CadenceError::ServerStartup(format!("failed to spawn {}: {}", config.command, e))
        })?;

        let mut service = Self {
            child,
            base_url: base_url.to_string(),
        };

        let policy = RetryPolicy::fixed(config.startup_timeout_ms, 100);
        if let Err(e) = service.wait_for_healthy(&config.health_path, &policy).await {
            service.stop().await;
            return Err(e);
        }

        info!("Target is healthy at {}", base_url);
        Ok(service)
    }

    /// Wait for the target to respond to health checks
    async fn wait_for_healthy(&mut self, health_path: &str, policy: &RetryPolicy) -> CadenceResult<()> {
        let http = HttpAdapter::new(self.base_url.clone(), Duration::from_secs(2))?;
        let options = RequestOptions::default();
        let cancel = CancellationToken::new();
        let mut poller = Poller::new(format!("{}{}", self.base_url, health_path), policy, &cancel);

        while poller.next_attempt().await? {
            if let Some(status) = self.child.try_wait()? {
                return Err(CadenceError::ServerStartup(format!("target exited early with {}", status)));
            }
            match http.request(HttpMethod::Get, health_path, None, &options).await {
                Ok(_) => return Ok(()),
                Err(CadenceError::Http(e)) if e.is_connect() => {
                    if poller.attempts() == 1 {
                        info!("Waiting for target to start...");
                    }
                }
                Err(e) => {
                    debug!("Health check failed: {}", e);
                    poller.record(serde_json::json!(e.to_string()));
                }
            }
        }

        Err(CadenceError::ServerHealthCheck(poller.timeout_error().to_string()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// SIGTERM first, then kill if the process lingers.
    pub async fn stop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        info!("Stopping target (pid: {:?})", self.child.id());

        #[cfg(unix)]
        if let Some(id) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(id as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await.is_ok()
            {
                return;
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill target: {}", e);
        }
    }
}
