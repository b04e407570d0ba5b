//! Step execution
//!
//! One handler per step kind. Observing steps go through the poll engine;
//! `command` and `origin` steps drain nested queues, which is why
//! [`ExecutionContext::execute`] returns a boxed future.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::browser::{filter_by_text, BrowserDriver, ElementRef, ElementSnapshot};
use crate::commands::CommandRegistry;
use crate::context::ExecutionContext;
use crate::error::{CadenceError, CadenceResult};
use crate::expect::{describe_check, unmet_check};
use crate::http::{HttpResponse, RequestOptions};
use crate::origin::{collect_returns, marshal_args, BridgeState, Origin};
use crate::queue::CommandQueue;
use crate::retry::{Poller, RetryPolicy};
use crate::spec::{
    AssertStep, CommandStep, ElementCheck, GetStep, Locator, OriginStep, RequestStep, Step, StepKind,
};
use crate::state::{lookup_path, split_path, SharedState};
use crate::template::{resolve_str, resolve_value};

/// What an action needs from the element before it can act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actionability {
    Attached,
    Visible,
}

#[derive(Debug, Clone)]
enum UiAction {
    Click,
    Clear,
    Type(String),
    RemoveAttribute(String),
}

impl UiAction {
    fn requires(&self) -> Actionability {
        match self {
            UiAction::RemoveAttribute(_) => Actionability::Attached,
            _ => Actionability::Visible,
        }
    }
}

impl ExecutionContext {
    /// Execute one step and return its output value, if any.
    pub fn execute<'a>(&'a mut self, step: &'a Step) -> BoxFuture<'a, CadenceResult<Option<Value>>> {
        async move {
            {
                let scope = self.scope();
                for key in &step.requires {
                    scope.resolve(key)?;
                }
            }

            let result = match &step.kind {
                StepKind::Request(r) => self.run_request(step, r).await,
                StepKind::Get(g) => self.run_get(step, g).await,
                StepKind::Visit(v) => self.run_visit(&v.url).await.map(|_| None),
                StepKind::Viewport(v) => {
                    self.ensure_browser().await?;
                    self.browser_mut()?.set_viewport(*v).await?;
                    self.viewport = *v;
                    Ok(None)
                }
                StepKind::Click(t) => self.run_action(step, &t.target, UiAction::Click).await,
                StepKind::Clear(t) => self.run_action(step, &t.target, UiAction::Clear).await,
                StepKind::Type(t) => {
                    let text = resolve_str(&t.text, &self.scope())?;
                    self.run_action(step, &t.target, UiAction::Type(text)).await
                }
                StepKind::RemoveAttribute(r) => {
                    self.run_action(step, &r.target, UiAction::RemoveAttribute(r.attribute.clone()))
                        .await
                }
                StepKind::Command(c) => self.run_command(c).await,
                StepKind::Assert(a) => self.run_assert(a).map(Some),
                StepKind::Origin(o) => self.run_origin(step, o).await,
                StepKind::Set(s) => {
                    let value = resolve_value(&s.value, &self.scope())?;
                    self.state.set(s.key.clone(), value.clone());
                    Ok(Some(value))
                }
                StepKind::GenerateId(g) => {
                    let id = self.ids.lock().next_id(g.max);
                    self.state.set(g.key.clone(), json!(id));
                    Ok(Some(json!(id)))
                }
                StepKind::Wait(w) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(w.ms)) => Ok(None),
                        _ = self.cancel.cancelled() => Err(CadenceError::Cancelled(format!("wait of {} ms", w.ms))),
                    }
                }
                StepKind::Log(l) => {
                    let message = resolve_str(&l.message, &self.scope()).unwrap_or_else(|_| l.message.clone());
                    info!("[TEST LOG] {}", message);
                    Ok(None)
                }
            };

            if step.is_ui() {
                let page = self.check_page_errors().await;
                // A failing step keeps its own error.
                if result.is_ok() {
                    page?;
                }
            }
            result
        }
        .boxed()
    }

    async fn run_request(&mut self, step: &Step, r: &RequestStep) -> CadenceResult<Option<Value>> {
        let (url, body, headers, expect) = {
            let scope = self.scope();
            let url = resolve_str(&r.url, &scope)?;
            let body = r.body.as_ref().map(|b| resolve_value(b, &scope)).transpose()?;
            let mut headers = BTreeMap::new();
            for (key, value) in &r.headers {
                headers.insert(key.clone(), resolve_str(value, &scope)?);
            }
            let expect = r.expect.as_ref().map(|e| e.resolve(&scope)).transpose()?;
            (url, body, headers, expect)
        };
        let options = RequestOptions {
            fail_on_status_code: r.fail_on_status_code,
            headers,
            timeout: step.timeout_ms.map(Duration::from_millis),
        };

        let response = match (&r.until, &expect) {
            (Some(policy), Some(expect)) => {
                let what = format!("{} {} to satisfy expectations", r.method, url);
                let mut poller = Poller::new(what, policy, &self.cancel);
                let mut satisfied: Option<HttpResponse> = None;
                while poller.next_attempt().await? {
                    match self.http.request(r.method, &url, body.as_ref(), &options).await {
                        Ok(response) => match expect.verify(&response) {
                            Ok(()) => {
                                satisfied = Some(response);
                                break;
                            }
                            Err(unmet) => poller.record(json!({
                                "response": response.to_value(),
                                "unmet": unmet.to_string(),
                            })),
                        },
                        Err(err @ (CadenceError::HttpStatusFailure { .. } | CadenceError::Http(_))) => {
                            poller.record(json!({ "error": err.to_string() }))
                        }
                        Err(err) => return Err(err),
                    }
                }
                satisfied.ok_or_else(|| poller.timeout_error())?
            }
            _ => {
                let response = self.http.request(r.method, &url, body.as_ref(), &options).await?;
                if let Some(expect) = &expect {
                    expect.verify(&response)?;
                }
                response
            }
        };

        let value = response.to_value();
        for (key, path) in &r.save {
            let (root, rest) = split_path(path);
            let saved = value
                .get(root)
                .and_then(|v| lookup_path(v, &rest))
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| CadenceError::AssertionFailure {
                    expected: format!("response to contain `{}`", path),
                    actual: value["body"].to_string(),
                })?;
            self.state.set(key.clone(), saved);
        }
        if let Some(key) = &r.save_as {
            self.state.set(key.clone(), value.clone());
        }
        Ok(Some(value))
    }

    fn resolve_locator(&self, locator: &Locator) -> CadenceResult<Locator> {
        let scope = self.scope();
        Ok(Locator {
            selector: resolve_str(&locator.selector, &scope)?,
            contains: locator
                .contains
                .as_deref()
                .map(|c| resolve_str(c, &scope))
                .transpose()?,
            match_case: locator.match_case,
        })
    }

    fn resolve_checks(&self, checks: &[ElementCheck]) -> CadenceResult<Vec<ElementCheck>> {
        if checks.is_empty() {
            return Ok(vec![ElementCheck::Exist]);
        }
        let scope = self.scope();
        checks
            .iter()
            .map(|check| {
                Ok(match check {
                    ElementCheck::ContainText(t) => ElementCheck::ContainText(resolve_str(t, &scope)?),
                    ElementCheck::HaveAttr { name, value } => ElementCheck::HaveAttr {
                        name: name.clone(),
                        value: value.as_deref().map(|v| resolve_str(v, &scope)).transpose()?,
                    },
                    other => other.clone(),
                })
            })
            .collect()
    }

    async fn run_get(&mut self, step: &Step, g: &GetStep) -> CadenceResult<Option<Value>> {
        let locator = self.resolve_locator(&g.target)?;
        let checks = self.resolve_checks(&g.should)?;
        let policy = self.policy.with_timeout(step.timeout_ms);
        self.ensure_browser().await?;

        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| CadenceError::Browser("browser session is not available".into()))?;
        let what = format!(
            "{} to {}",
            locator.describe(),
            checks.iter().map(describe_check).collect::<Vec<_>>().join(", ")
        );
        let mut poller = Poller::new(what, &policy, &self.cancel);
        let mut found: Option<Vec<ElementSnapshot>> = None;
        while poller.next_attempt().await? {
            let matched = filter_by_text(&locator, browser.query(&locator.selector).await?);
            match unmet_check(&checks, &matched) {
                None => {
                    found = Some(matched);
                    break;
                }
                Some(unmet) => poller.record(json!({ "unmet": unmet, "matched": matched })),
            }
        }
        let matched = found.ok_or_else(|| poller.timeout_error())?;

        let value = serde_json::to_value(&matched)?;
        if let Some(key) = &g.save_as {
            self.state.set(key.clone(), value.clone());
        }
        Ok(Some(value))
    }

    async fn run_action(&mut self, step: &Step, target: &Locator, action: UiAction) -> CadenceResult<Option<Value>> {
        let locator = self.resolve_locator(target)?;
        let policy = self.policy.with_timeout(step.timeout_ms);
        self.ensure_browser().await?;

        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| CadenceError::Browser("browser session is not available".into()))?;
        let element = wait_actionable(browser.as_mut(), &locator, action.requires(), &policy, &self.cancel).await?;
        debug!(selector = %element.selector, index = element.index, ?action, "acting on element");

        match &action {
            UiAction::Click => browser.click(&element).await?,
            UiAction::Clear => browser.clear(&element).await?,
            UiAction::Type(text) => browser.type_text(&element, text).await?,
            UiAction::RemoveAttribute(name) => browser.remove_attribute(&element, name).await?,
        }
        Ok(None)
    }

    async fn run_visit(&mut self, raw: &str) -> CadenceResult<()> {
        let url = resolve_str(raw, &self.scope())?;
        let url = self.http.resolve_url(&url)?.to_string();
        if let Some(origin) = self.kind.remote_origin() {
            if !origin.contains(&url) {
                return Err(CadenceError::OriginViolation {
                    origin: origin.to_string(),
                    url,
                });
            }
        }
        self.ensure_browser().await?;
        self.browser_mut()?.visit(&url).await
    }

    async fn run_command(&mut self, c: &CommandStep) -> CadenceResult<Option<Value>> {
        let commands = self.commands.clone();
        let def = commands.get(&c.command)?;
        let args = {
            let scope = self.scope();
            c.args
                .iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, &scope)?)))
                .collect::<CadenceResult<BTreeMap<_, _>>>()?
        };
        let locals = CommandRegistry::bind_args(&c.command, def, args)?;

        debug!(command = %c.command, "expanding custom command");
        let mut frame = LocalsFrame::push(self, locals);
        let outcome = CommandQueue::new(def.steps.clone()).run(&mut *frame.ctx).await;
        drop(frame);

        let steps = outcome.into_result()?;
        Ok(Some(json!({ "command": c.command, "steps": steps.len() })))
    }

    fn run_assert(&self, a: &AssertStep) -> CadenceResult<Value> {
        let scope = self.scope();
        let (root, rest) = split_path(&a.path);
        let actual = if root == "fixtures" {
            scope.resolve(&a.path).ok()
        } else {
            match scope.resolve(root) {
                Ok(base) => lookup_path(&base, &rest).cloned(),
                // Asserting absence of something never written holds.
                Err(e) if e.is_skip() && a.matcher.exists == Some(false) => None,
                Err(e) => return Err(e),
            }
        };
        a.matcher.resolve(&scope)?.check(&a.path, actual.as_ref())?;
        Ok(actual.unwrap_or(Value::Null))
    }

    async fn run_origin(&mut self, step: &Step, o: &OriginStep) -> CadenceResult<Option<Value>> {
        let origin = Origin::parse(&o.origin)?;
        let args = {
            let scope = self.scope();
            o.args
                .iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, &scope)?)))
                .collect::<CadenceResult<BTreeMap<_, _>>>()?
        };
        let remote_state = marshal_args(&args)?;
        self.ensure_browser().await?;

        info!(%origin, args = args.len(), "crossing into origin");
        match self.cross(step, o, &origin, remote_state).await {
            Ok(returned) => {
                for (key, value) in &returned {
                    self.state.set(key.clone(), value.clone());
                }
                info!(%origin, returned = returned.len(), "back from origin");
                Ok(Some(serde_json::to_value(returned)?))
            }
            Err(err @ CadenceError::Cancelled(_)) => Err(err),
            Err(err) => Err(CadenceError::OriginBridgeFailure {
                origin: origin.to_string(),
                source: Box::new(err),
            }),
        }
    }

    /// Hand the browser to a remote context, run the sub-queue there and take
    /// the browser back whatever the outcome.
    async fn cross(
        &mut self,
        step: &Step,
        o: &OriginStep,
        origin: &Origin,
        remote_state: SharedState,
    ) -> CadenceResult<BTreeMap<String, Value>> {
        let bridge = BridgeState::Local.advance(BridgeState::AwaitingOrigin(origin.clone()))?;

        // A sub-queue that opens with a visit establishes the origin itself.
        let opens_with_visit = matches!(o.steps.first().map(|s| &s.kind), Some(StepKind::Visit(_)));
        if !opens_with_visit {
            let policy = self.policy.with_timeout(step.timeout_ms);
            let browser = self
                .browser
                .as_mut()
                .ok_or_else(|| CadenceError::Browser("browser session is not available".into()))?;
            if let Err(err) = wait_for_origin(browser.as_mut(), origin, &policy, &self.cancel).await {
                bridge.advance(BridgeState::Failed(origin.clone()))?;
                return Err(err);
            }
        }
        let bridge = bridge.advance(BridgeState::Remote(origin.clone()))?;

        let browser = self
            .browser
            .take()
            .ok_or_else(|| CadenceError::Browser("browser session is not available".into()))?;
        let remote = self.remote(origin, remote_state, browser);
        let mut handoff = BrowserHandoff {
            home: &mut self.browser,
            remote,
        };
        let outcome = CommandQueue::new(o.steps.clone()).run(&mut handoff.remote).await;
        let result = outcome.into_result().and_then(|steps| {
            debug!(%origin, steps = steps.len(), "remote steps passed");
            collect_returns(&o.returns, handoff.remote.state())
        });
        drop(handoff);

        let end = match &result {
            Ok(_) => BridgeState::Returned(origin.clone()),
            Err(_) => BridgeState::Failed(origin.clone()),
        };
        bridge.advance(end)?;
        result
    }
}

/// Keeps a command's argument frame on the context until dropped, so a
/// case deadline that abandons the command mid-way still pops it.
struct LocalsFrame<'a> {
    ctx: &'a mut ExecutionContext,
}

impl<'a> LocalsFrame<'a> {
    fn push(ctx: &'a mut ExecutionContext, locals: BTreeMap<String, Value>) -> Self {
        ctx.locals.push(locals);
        Self { ctx }
    }
}

impl Drop for LocalsFrame<'_> {
    fn drop(&mut self) {
        self.ctx.locals.pop();
    }
}

/// The remote side of a crossing. Dropping it returns the browser session
/// to the local context, including when the crossing is abandoned.
struct BrowserHandoff<'a> {
    home: &'a mut Option<Box<dyn BrowserDriver>>,
    remote: ExecutionContext,
}

impl Drop for BrowserHandoff<'_> {
    fn drop(&mut self) {
        if let Some(browser) = self.remote.browser.take() {
            *self.home = Some(browser);
        }
    }
}

/// Poll until the first element matching `locator` can be acted on.
async fn wait_actionable(
    browser: &mut dyn BrowserDriver,
    locator: &Locator,
    needs: Actionability,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> CadenceResult<ElementRef> {
    let requirement = match needs {
        Actionability::Attached => "be attached",
        Actionability::Visible => "be visible",
    };
    let mut poller = Poller::new(format!("{} to {}", locator.describe(), requirement), policy, cancel);
    while poller.next_attempt().await? {
        let matched = filter_by_text(locator, browser.query(&locator.selector).await?);
        match matched.first() {
            Some(first) if needs == Actionability::Attached || first.visible => {
                return Ok(ElementRef {
                    selector: locator.selector.clone(),
                    index: first.index,
                });
            }
            _ => poller.record(json!({ "matched": matched })),
        }
    }
    Err(poller.timeout_error())
}

/// Poll until the current page belongs to `origin`.
async fn wait_for_origin(
    browser: &mut dyn BrowserDriver,
    origin: &Origin,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> CadenceResult<()> {
    let mut poller = Poller::new(format!("page on {}", origin), policy, cancel);
    while poller.next_attempt().await? {
        let url = browser.current_url().await?;
        if origin.contains(&url) {
            return Ok(());
        }
        poller.record(json!({ "current_url": url }));
    }
    Err(poller.timeout_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::browser::{ClickEffect, ScriptedElement, ScriptedLauncher, ScriptedPage, ScriptedSite};
    use crate::http::HttpAdapter;
    use crate::spec::TestSuite;

    fn site() -> ScriptedSite {
        ScriptedSite::new()
            .page(
                ScriptedPage::new("https://app.test/")
                    .element(ScriptedElement::new("input").attr("name", "email"))
                    .element(ScriptedElement::new("input").attr("name", "password"))
                    .element(
                        ScriptedElement::new("button")
                            .attr("type", "submit")
                            .text("Sign in")
                            .on_click(ClickEffect::Reveal {
                                ids: vec!["welcome".into(), "logout".into()],
                                after_ms: 250,
                            }),
                    )
                    .element(ScriptedElement::new("h1").id("welcome").text("Welcome back").deferred())
                    .element(
                        ScriptedElement::new("button")
                            .id("logout")
                            .attr("data-testid", "logout")
                            .deferred()
                            .on_click(ClickEffect::Navigate {
                                url: "https://app.test/bye".into(),
                            }),
                    )
                    .element(
                        ScriptedElement::new("a")
                            .attr("href", "https://other.test/profile")
                            .attr("target", "_blank")
                            .text("Profile"),
                    ),
            )
            .page(ScriptedPage::new("https://app.test/bye").element(ScriptedElement::new("p").text("Signed out")))
            .page(
                ScriptedPage::new("https://other.test/profile")
                    .element(ScriptedElement::new("span").text("octocat"))
                    .throws_on_load("TypeError: analytics is undefined"),
            )
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(HttpAdapter::new("https://app.test", Duration::from_secs(1)).unwrap())
            .with_launcher(Arc::new(ScriptedLauncher::new(site())))
            .with_policy(RetryPolicy::fixed(1000, 50))
    }

    async fn run(ctx: &mut ExecutionContext, yaml: &str) -> crate::queue::QueueOutcome {
        let suite = TestSuite::from_yaml(yaml).unwrap();
        let steps = suite.cases.into_iter().next().unwrap().steps;
        CommandQueue::new(steps).run(ctx).await
    }

    #[tokio::test(start_paused = true)]
    async fn login_command_then_wait_for_delayed_heading() {
        let mut ctx = ctx();
        ctx.state_mut().set("user", json!({"email": "qa@example.com"}));
        let outcome = run(
            &mut ctx,
            r#"
name: login
cases:
  - name: signs in
    steps:
      - action: visit
        url: https://app.test/
      - action: command
        command: login
        args: { email: "${user.email}", password: hunter2 }
      - action: get
        selector: h1
        contains: welcome
        match_case: false
        should: [be_visible]
        save_as: heading
      - action: get
        selector: input[name="email"]
        should:
          - have_attr: { name: value, value: "${user.email}" }
      - action: command
        command: logout
"#,
        )
        .await;
        assert!(outcome.is_completed(), "{:?}", outcome.verdict);
        assert_eq!(ctx.state().get("heading").unwrap()[0]["text"], "Welcome back");
        assert_eq!(ctx.browser_mut().unwrap().current_url().await.unwrap(), "https://app.test/bye");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_element_times_out_with_last_observation() {
        let mut ctx = ctx();
        let outcome = run(
            &mut ctx,
            r#"
name: missing
cases:
  - name: never appears
    steps:
      - action: visit
        url: https://app.test/
      - action: click
        selector: button#nope
"#,
        )
        .await;
        match outcome.verdict {
            crate::queue::QueueVerdict::Failed(CadenceError::TimeoutExceeded { attempts, .. }) => {
                assert_eq!(attempts, 20);
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn origin_bridge_isolates_state_and_returns_declared_keys() {
        let mut ctx = ctx().with_fixtures(BTreeMap::from([("secret".to_string(), json!({"k": 1}))]));
        ctx.state_mut().set("local_only", json!("do not leak"));
        let outcome = run(
            &mut ctx,
            r#"
name: bridge
cases:
  - name: crosses
    steps:
      - action: visit
        url: https://app.test/
      - action: remove_attribute
        selector: a
        contains: Profile
        attribute: target
      - action: click
        selector: a
        contains: Profile
      - action: origin
        origin: https://other.test
        args: { username: octocat }
        returns: { seen: shown }
        steps:
          - action: get
            selector: span
            contains: "${username}"
            save_as: shown
          - action: assert
            path: local_only
            exists: false
"#,
        )
        .await;
        assert!(outcome.is_completed(), "{:?}", outcome.verdict);
        assert_eq!(ctx.state().get("seen").unwrap()[0]["text"], "octocat");
        assert!(ctx.state().get("shown").is_none());
        assert!(ctx.browser.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_visit_to_another_origin_is_a_bridge_failure() {
        let mut ctx = ctx();
        let outcome = run(
            &mut ctx,
            r#"
name: bridge
cases:
  - name: escapes
    steps:
      - action: origin
        origin: https://other.test
        steps:
          - action: visit
            url: https://other.test/profile
          - action: visit
            url: https://app.test/
"#,
        )
        .await;
        match outcome.verdict {
            crate::queue::QueueVerdict::Failed(err) => {
                assert_eq!(err.kind(), "origin_bridge_failure");
                assert_eq!(err.root_cause().kind(), "origin_violation");
            }
            other => panic!("unexpected verdict {:?}", other),
        }
        assert!(ctx.browser.is_some(), "browser handed back after failure");
    }

    #[tokio::test(start_paused = true)]
    async fn app_exceptions_fail_only_when_not_suppressed() {
        let yaml = r#"
name: noisy
cases:
  - name: loads a page that throws
    steps:
      - action: visit
        url: https://other.test/profile
"#;
        let mut quiet = ctx();
        assert!(run(&mut quiet, yaml).await.is_completed());

        let mut strict = ctx().suppress_app_exceptions(false);
        match run(&mut strict, yaml).await.verdict {
            crate::queue::QueueVerdict::Failed(CadenceError::AppException(msg)) => {
                assert!(msg.contains("analytics"));
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    fn wait_step(ms: u64) -> Step {
        Step::new(StepKind::Wait(crate::spec::WaitStep { ms }))
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_command_pops_its_argument_frame() {
        let mut registry = CommandRegistry::with_builtins();
        registry.register(
            "slow",
            crate::spec::CommandDef {
                params: vec!["who".into()],
                steps: vec![wait_step(5000)],
            },
        );
        let mut ctx = ctx().with_commands(registry);
        ctx.state_mut().set("who", json!("from-state"));
        let step = Step::new(StepKind::Command(CommandStep {
            command: "slow".into(),
            args: BTreeMap::from([("who".to_string(), json!("from-command-arg"))]),
        }));

        let abandoned = tokio::time::timeout(Duration::from_millis(100), ctx.execute(&step)).await;
        assert!(abandoned.is_err());
        assert!(ctx.locals.is_empty());
        assert_eq!(ctx.scope().resolve("who").unwrap(), json!("from-state"));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_crossing_hands_the_browser_back() {
        let mut ctx = ctx();
        ctx.ensure_browser().await.unwrap();
        ctx.browser_mut().unwrap().visit("https://other.test/profile").await.unwrap();
        let step = Step::new(StepKind::Origin(OriginStep {
            origin: "https://other.test".into(),
            args: BTreeMap::new(),
            steps: vec![wait_step(5000)],
            returns: BTreeMap::new(),
        }));

        let abandoned = tokio::time::timeout(Duration::from_millis(100), ctx.execute(&step)).await;
        assert!(abandoned.is_err());
        assert_eq!(
            ctx.browser_mut().unwrap().current_url().await.unwrap(),
            "https://other.test/profile"
        );
    }
}
