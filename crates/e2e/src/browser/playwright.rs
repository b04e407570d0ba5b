//! Playwright browser automation
//!
//! One long-lived Node process per session runs a small bridge script and
//! speaks line-delimited JSON over stdio: `{id, op, ...}` in,
//! `{id, ok, result, error, page_errors}` out.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use super::{BrowserDriver, BrowserLauncher, ElementRef, ElementSnapshot};
use crate::error::{CadenceError, CadenceResult};
use crate::spec::Viewport;

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const pw = require('playwright');

const message = (e) => String((e && e.message) || e);

(async () => {
  const engine = pw[process.env.CADENCE_BROWSER || 'chromium'];
  const browser = await engine.launch({ headless: process.env.CADENCE_HEADLESS !== 'false' });
  const context = await browser.newContext({
    viewport: {
      width: Number(process.env.CADENCE_VIEWPORT_WIDTH),
      height: Number(process.env.CADENCE_VIEWPORT_HEIGHT),
    },
  });
  const page = await context.newPage();
  const pageErrors = [];
  page.on('pageerror', (err) => pageErrors.push(message(err)));

  const reply = (msg) =>
    process.stdout.write(JSON.stringify({ ...msg, page_errors: pageErrors.splice(0) }) + '\n');
  const nth = (m) => page.locator(m.selector).nth(m.index);

  const ops = {
    viewport: (m) => page.setViewportSize({ width: m.width, height: m.height }),
    visit: async (m) => { await page.goto(m.url); },
    url: () => page.url(),
    query: (m) =>
      page.$$eval(m.selector, (els) =>
        els.map((el, index) => {
          const rect = el.getBoundingClientRect();
          const style = getComputedStyle(el);
          const attributes = Object.fromEntries([...el.attributes].map((a) => [a.name, a.value]));
          if ('value' in el && typeof el.value === 'string') attributes.value = el.value;
          return {
            index,
            tag: el.tagName.toLowerCase(),
            text: (el.innerText || el.textContent || '').trim(),
            visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
            attributes,
          };
        })
      ),
    click: (m) => nth(m).click(),
    clear: (m) => nth(m).fill(''),
    type: (m) => nth(m).pressSequentially(m.text),
    remove_attr: (m) => nth(m).evaluate((el, name) => el.removeAttribute(name), m.name),
    close: () => browser.close(),
  };

  reply({ id: 0, ok: true, result: null });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let msg;
    try {
      msg = JSON.parse(line);
    } catch (e) {
      continue;
    }
    try {
      const op = ops[msg.op];
      if (!op) throw new Error('unknown op ' + msg.op);
      const result = await op(msg);
      reply({ id: msg.id, ok: true, result: result === undefined ? null : result });
    } catch (e) {
      reply({ id: msg.id, ok: false, error: message(e) });
    }
    if (msg.op === 'close') break;
  }
  process.exit(0);
})().catch((e) => {
  process.stdout.write(JSON.stringify({ id: 0, ok: false, error: message(e), page_errors: [] }) + '\n');
  process.exit(1);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Directory holding `node_modules/playwright`
    pub node_project_dir: Option<PathBuf>,
    /// Upper bound for a single bridge round trip
    pub command_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            node_project_dir: None,
            command_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    page_errors: Vec<String>,
}

fn parse_reply(line: &str) -> Option<BridgeReply> {
    serde_json::from_str(line).ok()
}

/// Live Playwright session
pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: FramedRead<ChildStdout, LinesCodec>,
    next_id: u64,
    command_timeout: Duration,
    page_errors: Vec<String>,
    _script_dir: TempDir,
}

impl PlaywrightDriver {
    /// Check if Playwright is installed
    pub async fn check_playwright_installed() -> CadenceResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(CadenceError::PlaywrightNotFound),
        }
    }

    pub async fn launch(config: &PlaywrightConfig, viewport: Viewport) -> CadenceResult<Self> {
        Self::check_playwright_installed().await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        tokio::fs::write(&script_path, BRIDGE_SCRIPT).await?;

        let mut command = Command::new("node");
        command
            .arg(&script_path)
            .env("CADENCE_BROWSER", config.browser.as_str())
            .env("CADENCE_HEADLESS", config.headless.to_string())
            .env("CADENCE_VIEWPORT_WIDTH", viewport.width.to_string())
            .env("CADENCE_VIEWPORT_HEIGHT", viewport.height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.node_project_dir {
            command.env("NODE_PATH", dir.join("node_modules")).current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| CadenceError::Browser(format!("failed to start node: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CadenceError::Browser("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CadenceError::Browser("bridge stdout unavailable".into()))?;

        let mut driver = Self {
            child,
            stdin,
            stdout: FramedRead::new(stdout, LinesCodec::new()),
            next_id: 0,
            command_timeout: config.command_timeout,
            page_errors: Vec::new(),
            _script_dir: script_dir,
        };

        // The bridge announces itself with id 0 once the page is open.
        let ready = tokio::time::timeout(config.command_timeout, driver.read_reply(0))
            .await
            .map_err(|_| CadenceError::Browser("browser did not start in time".into()))??;
        debug!(result = %ready, "playwright bridge ready");
        info!(browser = config.browser.as_str(), %viewport, "browser launched");
        Ok(driver)
    }

    async fn send(&mut self, op: &str, mut args: Value) -> CadenceResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        args["id"] = json!(id);
        args["op"] = json!(op);

        let mut line = serde_json::to_string(&args)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        tokio::time::timeout(self.command_timeout, self.read_reply(id))
            .await
            .map_err(|_| CadenceError::Browser(format!("`{}` got no reply within {:?}", op, self.command_timeout)))?
    }

    async fn read_reply(&mut self, id: u64) -> CadenceResult<Value> {
        loop {
            let line = match self.stdout.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(CadenceError::Browser(format!("bridge read failed: {}", e))),
                None => return Err(CadenceError::Browser("browser process exited".into())),
            };
            let Some(reply) = parse_reply(&line) else {
                debug!(line, "ignoring non-protocol output");
                continue;
            };
            self.page_errors.extend(reply.page_errors);
            if reply.id != id {
                continue;
            }
            return if reply.ok {
                Ok(reply.result)
            } else {
                Err(CadenceError::Browser(reply.error.unwrap_or_else(|| "unknown bridge error".into())))
            };
        }
    }

    fn element_args(element: &ElementRef) -> Value {
        json!({ "selector": element.selector, "index": element.index })
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn set_viewport(&mut self, viewport: Viewport) -> CadenceResult<()> {
        self.send("viewport", json!({ "width": viewport.width, "height": viewport.height }))
            .await
            .map(|_| ())
    }

    async fn visit(&mut self, url: &str) -> CadenceResult<()> {
        self.send("visit", json!({ "url": url })).await.map(|_| ())
    }

    async fn current_url(&mut self) -> CadenceResult<String> {
        match self.send("url", json!({})).await? {
            Value::String(url) => Ok(url),
            other => Err(CadenceError::Browser(format!("unexpected url reply: {}", other))),
        }
    }

    async fn query(&mut self, selector: &str) -> CadenceResult<Vec<ElementSnapshot>> {
        let result = self.send("query", json!({ "selector": selector })).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn click(&mut self, element: &ElementRef) -> CadenceResult<()> {
        self.send("click", Self::element_args(element)).await.map(|_| ())
    }

    async fn clear(&mut self, element: &ElementRef) -> CadenceResult<()> {
        self.send("clear", Self::element_args(element)).await.map(|_| ())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> CadenceResult<()> {
        let mut args = Self::element_args(element);
        args["text"] = json!(text);
        self.send("type", args).await.map(|_| ())
    }

    async fn remove_attribute(&mut self, element: &ElementRef, name: &str) -> CadenceResult<()> {
        let mut args = Self::element_args(element);
        args["name"] = json!(name);
        self.send("remove_attr", args).await.map(|_| ())
    }

    async fn drain_page_errors(&mut self) -> CadenceResult<Vec<String>> {
        Ok(std::mem::take(&mut self.page_errors))
    }

    async fn close(&mut self) -> CadenceResult<()> {
        if let Err(e) = self.send("close", json!({})).await {
            warn!("browser close failed: {}", e);
        }
        let _ = self.child.kill().await;
        Ok(())
    }
}

/// Starts a fresh Playwright session per suite.
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, viewport: Viewport) -> CadenceResult<Box<dyn BrowserDriver>> {
        Ok(Box::new(PlaywrightDriver::launch(&self.config, viewport).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_carry_page_errors() {
        let reply = parse_reply(r#"{"id":3,"ok":true,"result":[],"page_errors":["boom"]}"#).unwrap();
        assert_eq!(reply.id, 3);
        assert!(reply.ok);
        assert_eq!(reply.page_errors, vec!["boom".to_string()]);

        let failed = parse_reply(r#"{"id":4,"ok":false,"error":"Timeout 30000ms exceeded"}"#).unwrap();
        assert!(!failed.ok);
        assert_eq!(failed.result, Value::Null);
        assert!(parse_reply("Debugger listening on ws://...").is_none());
    }

    #[test]
    fn query_results_decode_into_snapshots() {
        let raw = json!([
            {"index": 0, "tag": "img", "text": "", "visible": true, "attributes": {"alt": "Avatar"}}
        ]);
        let snaps: Vec<ElementSnapshot> = serde_json::from_value(raw).unwrap();
        assert_eq!(snaps[0].attr("alt"), Some("Avatar"));
    }

    #[test]
    fn bridge_script_handles_every_op() {
        for op in ["viewport", "visit", "url", "query", "click", "clear", "type", "remove_attr", "close"] {
            assert!(BRIDGE_SCRIPT.contains(&format!("{}:", op)), "missing op {}", op);
        }
    }
}
