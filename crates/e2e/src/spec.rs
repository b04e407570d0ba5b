//! Declarative YAML suite specification

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CadenceError, CadenceResult};
use crate::http::HttpMethod;
use crate::origin::Origin;
use crate::retry::RetryPolicy;

/// One suite file: the isolation boundary for shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser (layout is viewport dependent)
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Overrides the configured target base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Seed for generated identifiers
    #[serde(default)]
    pub seed: Option<u64>,

    /// Default poll policy for observing steps in this suite
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Wall clock budget per case
    #[serde(default)]
    pub case_timeout_ms: Option<u64>,

    #[serde(default)]
    pub suppress_app_exceptions: Option<bool>,

    /// Fixtures loaded once before the first case
    #[serde(default)]
    pub fixtures: Vec<FixtureBinding>,

    /// Suite-level custom commands
    #[serde(default)]
    pub commands: BTreeMap<String, CommandDef>,

    /// Steps prepended to every case
    #[serde(default)]
    pub before_each: Vec<Step>,

    pub cases: Vec<TestCase>,

    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// One scenario: an ordered, isolated sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Shared state keys that must exist, otherwise the case is skipped
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBinding {
    /// File name under the fixtures directory
    pub file: String,

    /// JSON pointer into the file, e.g. `/petstoreData`
    #[serde(default)]
    pub pointer: Option<String>,

    /// Name the data is exposed under (`${fixtures.<as>}`)
    #[serde(rename = "as")]
    pub alias: String,
}

/// A reusable macro of primitive steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDef {
    #[serde(default)]
    pub params: Vec<String>,
    pub steps: Vec<Step>,
}

/// A single step in a case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Label used in reports
    #[serde(default)]
    pub name: Option<String>,

    /// Overrides the poll timeout (observing steps) or request timeout (HTTP)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// When false, a failure becomes the step's output instead of failing the case
    #[serde(default = "default_true")]
    pub fail_on_error: bool,

    /// Shared state keys this step reads; absence skips the step
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(flatten)]
    pub kind: StepKind,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepKind {
    /// Issue one HTTP request
    Request(RequestStep),

    /// Query the DOM until the checks hold
    Get(GetStep),

    /// Navigate the browser
    Visit(VisitStep),

    /// Resize the browser
    Viewport(Viewport),

    Click(TargetStep),

    Clear(TargetStep),

    /// Type text into an element
    Type(TypeStep),

    RemoveAttribute(RemoveAttributeStep),

    /// Expand a registered custom command
    Command(CommandStep),

    /// Check a value held in shared state
    Assert(AssertStep),

    /// Continue the flow on another security origin
    Origin(OriginStep),

    /// Write a value into shared state
    Set(SetStep),

    /// Write a seeded random identifier into shared state
    GenerateId(GenerateIdStep),

    /// Wait for a fixed amount of time (use sparingly)
    Wait(WaitStep),

    /// Log a message (for debugging)
    Log(LogStep),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStep {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default = "default_true")]
    pub fail_on_status_code: bool,
    #[serde(default)]
    pub expect: Option<ResponseExpect>,
    /// Re-issue the request until `expect` holds (idempotent methods only)
    #[serde(default)]
    pub until: Option<RetryPolicy>,
    /// `state_key: path` pairs copied out of the response
    #[serde(default)]
    pub save: BTreeMap<String, String>,
    /// Store the whole response under this key
    #[serde(default)]
    pub save_as: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseExpect {
    #[serde(default)]
    pub status: Option<StatusExpect>,
    #[serde(default)]
    pub body: Vec<ValueCheck>,
    /// Require a non-empty error body (`message` field or bare string)
    #[serde(default)]
    pub error_body: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusExpect {
    One(u16),
    AnyOf(Vec<u16>),
}

impl StatusExpect {
    pub fn accepts(&self, status: u16) -> bool {
        match self {
            StatusExpect::One(s) => *s == status,
            StatusExpect::AnyOf(list) => list.contains(&status),
        }
    }
}

/// A path into a JSON value plus what it must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueCheck {
    pub path: String,
    #[serde(flatten)]
    pub matcher: Matcher,
}

/// Every field that is set must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_empty: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<Value>,
}

/// How a DOM element is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: String,
    /// Keep only elements whose text contains this
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default = "default_true")]
    pub match_case: bool,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            contains: None,
            match_case: true,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.contains = Some(text.into());
        self
    }

    pub fn ignore_case(mut self) -> Self {
        self.match_case = false;
        self
    }

    pub fn describe(&self) -> String {
        match &self.contains {
            Some(text) => format!("{} containing {:?}", self.selector, text),
            None => self.selector.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStep {
    #[serde(flatten)]
    pub target: Locator,
    /// Defaults to `[exist]`
    #[serde(default)]
    pub should: Vec<ElementCheck>,
    #[serde(default)]
    pub save_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementCheck {
    Exist,
    NotExist,
    BeVisible,
    ContainText(String),
    HaveAttr {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    HaveCount(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitStep {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStep {
    #[serde(flatten)]
    pub target: Locator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeStep {
    #[serde(flatten)]
    pub target: Locator,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveAttributeStep {
    #[serde(flatten)]
    pub target: Locator,
    pub attribute: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStep {
    pub command: String,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertStep {
    pub path: String,
    #[serde(flatten)]
    pub matcher: Matcher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginStep {
    /// scheme://host[:port]
    pub origin: String,
    /// The only values the remote steps can see
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    pub steps: Vec<Step>,
    /// `local_key: remote_key` pairs copied back when the remote steps pass
    #[serde(default)]
    pub returns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStep {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateIdStep {
    pub key: String,
    #[serde(default = "default_id_max")]
    pub max: u64,
}

fn default_id_max() -> u64 {
    1_000_000_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitStep {
    pub ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStep {
    pub message: String,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            name: None,
            timeout_ms: None,
            fail_on_error: true,
            requires: Vec::new(),
            kind,
        }
    }

    pub fn tolerate_failure(mut self) -> Self {
        self.fail_on_error = false;
        self
    }

    pub fn requiring(mut self, key: impl Into<String>) -> Self {
        self.requires.push(key.into());
        self
    }

    /// Report label, e.g. `request:POST /pet`
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.kind {
            StepKind::Request(r) => format!("request:{} {}", r.method, r.url),
            StepKind::Get(g) => format!("get:{}", g.target.describe()),
            StepKind::Visit(v) => format!("visit:{}", v.url),
            StepKind::Viewport(v) => format!("viewport:{}x{}", v.width, v.height),
            StepKind::Click(t) => format!("click:{}", t.target.describe()),
            StepKind::Clear(t) => format!("clear:{}", t.target.describe()),
            StepKind::Type(t) => format!("type:{}", t.target.describe()),
            StepKind::RemoveAttribute(r) => {
                format!("remove_attribute:{}@{}", r.target.describe(), r.attribute)
            }
            StepKind::Command(c) => format!("command:{}", c.command),
            StepKind::Assert(a) => format!("assert:{}", a.path),
            StepKind::Origin(o) => format!("origin:{}", o.origin),
            StepKind::Set(s) => format!("set:{}", s.key),
            StepKind::GenerateId(g) => format!("generate_id:{}", g.key),
            StepKind::Wait(w) => format!("wait:{}ms", w.ms),
            StepKind::Log(l) => format!("log:{}", l.message.chars().take(30).collect::<String>()),
        }
    }

    /// Steps that need a browser session.
    pub fn is_ui(&self) -> bool {
        matches!(
            self.kind,
            StepKind::Get(_)
                | StepKind::Visit(_)
                | StepKind::Viewport(_)
                | StepKind::Click(_)
                | StepKind::Clear(_)
                | StepKind::Type(_)
                | StepKind::RemoveAttribute(_)
        )
    }

    fn validate(&self, at: &str) -> CadenceResult<()> {
        match &self.kind {
            StepKind::Request(r) => {
                if r.until.is_some() && !r.method.is_idempotent_read() {
                    return Err(CadenceError::SpecParse(format!(
                        "{}: `until` cannot re-issue a {} request",
                        at, r.method
                    )));
                }
                if r.until.is_some() && r.expect.is_none() {
                    return Err(CadenceError::SpecParse(format!(
                        "{}: `until` needs an `expect` block to poll for",
                        at
                    )));
                }
            }
            StepKind::Viewport(v) => {
                if v.width == 0 || v.height == 0 {
                    return Err(CadenceError::SpecParse(format!("{}: viewport must be non-zero", at)));
                }
            }
            StepKind::Origin(o) => {
                Origin::parse(&o.origin)
                    .map_err(|e| CadenceError::SpecParse(format!("{}: {}", at, e)))?;
                for (i, step) in o.steps.iter().enumerate() {
                    step.validate(&format!("{} > step {}", at, i + 1))?;
                }
            }
            StepKind::Get(g) => {
                if g.target.selector.trim().is_empty() {
                    return Err(CadenceError::SpecParse(format!("{}: empty selector", at)));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl TestSuite {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> CadenceResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> CadenceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut suite = Self::from_yaml(&content)
            .map_err(|e| CadenceError::SpecParse(format!("{}: {}", path.display(), e)))?;
        suite.source = Some(path.to_path_buf());
        Ok(suite)
    }

    /// Load all suites from a directory, sorted by path
    pub fn load_all(dir: &Path) -> CadenceResult<Vec<Self>> {
        Self::discover(dir)?.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Paths of every `.yaml`/`.yml` file under `dir`, sorted
    pub fn discover(dir: &Path) -> CadenceResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(CadenceError::SpecParse(format!("{} is not a directory", dir.display())));
        }
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(suites: &'a [Self], tag: &str) -> Vec<&'a Self> {
        suites.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    pub fn validate(&self) -> CadenceResult<()> {
        if self.name.trim().is_empty() {
            return Err(CadenceError::SpecParse("suite name is empty".into()));
        }
        if let Some(v) = self.viewport {
            if v.width == 0 || v.height == 0 {
                return Err(CadenceError::SpecParse("viewport must be non-zero".into()));
            }
        }
        for (i, step) in self.before_each.iter().enumerate() {
            step.validate(&format!("before_each step {}", i + 1))?;
        }
        for (name, def) in &self.commands {
            for (i, step) in def.steps.iter().enumerate() {
                step.validate(&format!("command `{}` step {}", name, i + 1))?;
            }
        }
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(CadenceError::SpecParse(format!("{}: case with empty name", self.name)));
            }
            for (i, step) in case.steps.iter().enumerate() {
                step.validate(&format!("{} > step {}", case.name, i + 1))?;
            }
        }
        Ok(())
    }

    pub fn uses_browser(&self) -> bool {
        fn any_ui(steps: &[Step]) -> bool {
            steps.iter().any(|s| match &s.kind {
                StepKind::Origin(o) => any_ui(&o.steps),
                StepKind::Command(_) => true,
                _ => s.is_ui(),
            })
        }
        any_ui(&self.before_each) || self.cases.iter().any(|c| any_ui(&c.steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_suite() {
        let yaml = r#"
name: petstore-api
tags: [api]
fixtures:
  - file: petstoredata.json
    pointer: /petstoreData
    as: petstoreData
cases:
  - name: should create a new pet
    steps:
      - action: generate_id
        key: randomId
      - action: request
        method: POST
        url: /pet
        body:
          "...": "${fixtures.petstoreData}"
          id: "${randomId}"
          name: TestPet
        expect:
          status: 200
          body:
            - path: body.name
              equals: TestPet
        save:
          createdPetId: body.id
  - name: should return 404 for deleted pet
    requires: [createdPetId]
    steps:
      - action: request
        method: GET
        url: /pet/${createdPetId}
        fail_on_status_code: false
        timeout_ms: 2000
        expect:
          status: [404]
        until:
          timeout_ms: 2000
          interval_ms: 200
"#;
        let suite = TestSuite::from_yaml(yaml).unwrap();
        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.fixtures[0].alias, "petstoreData");
        let create = &suite.cases[0].steps[1];
        match &create.kind {
            StepKind::Request(r) => {
                assert_eq!(r.method, HttpMethod::Post);
                assert!(r.fail_on_status_code);
                let expect = r.expect.as_ref().unwrap();
                assert_eq!(expect.status, Some(StatusExpect::One(200)));
                assert_eq!(expect.body[0].matcher.equals, Some(serde_json::json!("TestPet")));
                assert_eq!(r.save["createdPetId"], "body.id");
            }
            other => panic!("unexpected step {:?}", other),
        }
        let poll = &suite.cases[1].steps[0];
        assert_eq!(poll.timeout_ms, Some(2000));
        assert!(poll.fail_on_error);
    }

    #[test]
    fn test_parse_ui_suite_with_origin() {
        let yaml = r#"
name: github-user-search
viewport: { width: 1280, height: 800 }
cases:
  - name: follow link crosses origin
    steps:
      - action: visit
        url: https://gh-users-search.netlify.app/
      - action: click
        selector: 'button[type="submit"]'
        contains: search
        match_case: false
      - action: get
        selector: a
        contains: follow
        timeout_ms: 10000
        should:
          - be_visible
          - have_attr: { name: href, value: "https://github.com/rodkawaura" }
      - action: remove_attribute
        selector: a
        contains: follow
        attribute: target
      - action: origin
        origin: https://github.com
        args: { username: rodkawaura }
        steps:
          - action: get
            selector: span
            contains: "${username}"
"#;
        let suite = TestSuite::from_yaml(yaml).unwrap();
        assert!(suite.uses_browser());
        let steps = &suite.cases[0].steps;
        match &steps[1].kind {
            StepKind::Click(t) => {
                assert!(!t.target.match_case);
                assert_eq!(t.target.contains.as_deref(), Some("search"));
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &steps[2].kind {
            StepKind::Get(g) => {
                assert_eq!(g.should.len(), 2);
                assert_eq!(g.should[0], ElementCheck::BeVisible);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(steps[2].timeout_ms, Some(10000));
        match &steps[4].kind {
            StepKind::Origin(o) => assert_eq!(o.steps.len(), 1),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_until_on_mutating_request_is_rejected() {
        let yaml = r#"
name: bad
cases:
  - name: retries a delete
    steps:
      - action: request
        method: DELETE
        url: /pet/1
        expect: { status: 200 }
        until: { timeout_ms: 1000 }
"#;
        let err = TestSuite::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("cannot re-issue"));
    }

    #[test]
    fn test_load_all_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "name: b\ncases: []\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: a\ntags: [smoke]\ncases: []\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let suites = TestSuite::load_all(dir.path()).unwrap();
        assert_eq!(suites.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(TestSuite::filter_by_tag(&suites, "smoke").len(), 1);
        assert!(suites[0].source.is_some());
    }
}
