//! Execution context: everything one side of an origin bridge owns
//!
//! A local context lives for one suite file. A remote context is created
//! for the duration of an `origin` step and borrows nothing from the local
//! one except the browser session, which is handed over and back.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::browser::{BrowserDriver, BrowserLauncher};
use crate::commands::CommandRegistry;
use crate::error::{CadenceError, CadenceResult};
use crate::http::HttpAdapter;
use crate::ids::IdGenerator;
use crate::origin::{ContextKind, Origin};
use crate::retry::RetryPolicy;
use crate::spec::Viewport;
use crate::state::{Scope, SharedState};

pub struct ExecutionContext {
    pub(crate) state: SharedState,
    pub(crate) fixtures: Option<Arc<BTreeMap<String, Value>>>,
    pub(crate) http: HttpAdapter,
    pub(crate) browser: Option<Box<dyn BrowserDriver>>,
    pub(crate) launcher: Option<Arc<dyn BrowserLauncher>>,
    pub(crate) ids: Arc<Mutex<IdGenerator>>,
    pub(crate) commands: Arc<CommandRegistry>,
    pub(crate) policy: RetryPolicy,
    pub(crate) cancel: CancellationToken,
    pub(crate) kind: ContextKind,
    /// Argument frames of the custom commands currently expanding
    pub(crate) locals: Vec<BTreeMap<String, Value>>,
    pub(crate) suppress_app_exceptions: bool,
    pub(crate) viewport: Viewport,
}

impl ExecutionContext {
    pub fn new(http: HttpAdapter) -> Self {
        Self {
            state: SharedState::new(),
            fixtures: None,
            http,
            browser: None,
            launcher: None,
            ids: Arc::new(Mutex::new(IdGenerator::from_seeds(&[]))),
            commands: Arc::new(CommandRegistry::with_builtins()),
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            kind: ContextKind::Local,
            locals: Vec::new(),
            suppress_app_exceptions: true,
            viewport: Viewport::default(),
        }
    }

    pub fn with_fixtures(mut self, fixtures: BTreeMap<String, Value>) -> Self {
        self.fixtures = Some(Arc::new(fixtures));
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_browser(mut self, browser: Box<dyn BrowserDriver>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_ids(mut self, ids: IdGenerator) -> Self {
        self.ids = Arc::new(Mutex::new(ids));
        self
    }

    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn suppress_app_exceptions(mut self, suppress: bool) -> Self {
        self.suppress_app_exceptions = suppress;
        self
    }

    /// Context for the remote side of a bridge: fresh state seeded with the
    /// marshaled arguments, no fixtures, no launcher, HTTP rebased on the
    /// origin.
    pub(crate) fn remote(&self, origin: &Origin, state: SharedState, browser: Box<dyn BrowserDriver>) -> Self {
        Self {
            state,
            fixtures: None,
            http: self.http.rebased(origin.to_string()),
            browser: Some(browser),
            launcher: None,
            ids: self.ids.clone(),
            commands: self.commands.clone(),
            policy: self.policy.clone(),
            cancel: self.cancel.child_token(),
            kind: ContextKind::Remote(origin.clone()),
            locals: Vec::new(),
            suppress_app_exceptions: self.suppress_app_exceptions,
            viewport: self.viewport,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SharedState {
        &mut self.state
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn http(&self) -> &HttpAdapter {
        &self.http
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn seed(&self) -> u64 {
        self.ids.lock().seed()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Prepare for the next case: install its token and drop any command
    /// frames an abandoned case left behind.
    pub fn begin_case(&mut self, token: CancellationToken) {
        self.cancel = token;
        self.locals.clear();
    }

    /// Template scope: innermost command frame, then shared state, then fixtures.
    pub fn scope(&self) -> Scope<'_> {
        let mut scope = Scope::new(&self.state);
        if let Some(fixtures) = &self.fixtures {
            scope = scope.with_fixtures(fixtures);
        }
        if let Some(frame) = self.locals.last() {
            scope = scope.with_locals(frame);
        }
        scope
    }

    /// Launch the browser on first use.
    pub(crate) async fn ensure_browser(&mut self) -> CadenceResult<()> {
        if self.browser.is_some() {
            return Ok(());
        }
        let launcher = self.launcher.clone().ok_or_else(|| {
            CadenceError::Browser("this step needs a browser but none is configured".into())
        })?;
        debug!(viewport = %self.viewport, "launching browser");
        self.browser = Some(launcher.launch(self.viewport).await?);
        Ok(())
    }

    pub(crate) fn browser_mut(&mut self) -> CadenceResult<&mut Box<dyn BrowserDriver>> {
        self.browser
            .as_mut()
            .ok_or_else(|| CadenceError::Browser("browser session is not available".into()))
    }

    /// Report or swallow uncaught exceptions thrown by the page.
    pub(crate) async fn check_page_errors(&mut self) -> CadenceResult<()> {
        let Some(browser) = self.browser.as_mut() else {
            return Ok(());
        };
        let errors = browser.drain_page_errors().await?;
        if errors.is_empty() {
            return Ok(());
        }
        if self.suppress_app_exceptions {
            for error in &errors {
                debug!(%error, "suppressed uncaught application exception");
            }
            Ok(())
        } else {
            Err(CadenceError::AppException(errors.join("; ")))
        }
    }

    pub async fn close_browser(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("failed to close browser: {}", e);
            }
        }
    }
}
