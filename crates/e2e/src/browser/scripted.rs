//! In-memory scripted browser
//!
//! A site is a set of pages made of elements with attributes, text,
//! visibility, delayed appearance and click effects. It lets suites run
//! without Node/Playwright and gives tests deterministic DOM timing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{BrowserDriver, BrowserLauncher, ElementRef, ElementSnapshot};
use crate::error::{CadenceError, CadenceResult};
use crate::spec::Viewport;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedSite {
    #[serde(default)]
    pub pages: Vec<ScriptedPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedPage {
    pub url: String,
    #[serde(default)]
    pub elements: Vec<ScriptedElement>,
    /// Uncaught exceptions the page's own scripts throw on load
    #[serde(default)]
    pub page_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedElement {
    /// Handle for `reveal` effects
    #[serde(default)]
    pub id: Option<String>,
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Attached this long after the page loads
    #[serde(default)]
    pub appear_after_ms: u64,
    /// Not attached until revealed by a click effect
    #[serde(default)]
    pub deferred: bool,
    #[serde(default)]
    pub on_click: Vec<ClickEffect>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ClickEffect {
    Navigate { url: String },
    Reveal {
        ids: Vec<String>,
        #[serde(default)]
        after_ms: u64,
    },
    Throw { message: String },
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: ScriptedPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Load a site description (YAML or JSON).
    pub fn from_file(path: &Path) -> CadenceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    fn find(&self, url: &str) -> Option<&ScriptedPage> {
        let wanted = normalize(url);
        self.pages.iter().find(|p| normalize(&p.url) == wanted)
    }
}

fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

impl ScriptedPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            elements: Vec::new(),
            page_errors: Vec::new(),
        }
    }

    pub fn element(mut self, element: ScriptedElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn throws_on_load(mut self, message: impl Into<String>) -> Self {
        self.page_errors.push(message.into());
        self
    }
}

impl ScriptedElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            id: None,
            tag: tag.into(),
            attributes: BTreeMap::new(),
            text: String::new(),
            visible: true,
            appear_after_ms: 0,
            deferred: false,
            on_click: Vec::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn appear_after(mut self, ms: u64) -> Self {
        self.appear_after_ms = ms;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click.push(effect);
        self
    }
}

/// One parsed compound selector: `tag#id.class[attr="v"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

fn selector_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^(?:#(?P<id>[\w-]+)|\.(?P<class>[\w-]+)|\[\s*(?P<attr>[\w:-]+)\s*(?:=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\]\s]*)))?\s*\])"#,
        )
        .expect("selector part pattern")
    })
}

fn tag_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z][\w-]*").expect("tag pattern"))
}

impl SimpleSelector {
    fn parse(raw: &str) -> CadenceResult<Self> {
        let raw = raw.trim();
        let mut selector = SimpleSelector::default();
        let mut rest = raw;

        if let Some(m) = tag_part().find(rest) {
            selector.tag = Some(m.as_str().to_ascii_lowercase());
            rest = &rest[m.end()..];
        }

        while !rest.is_empty() {
            let caps = selector_part()
                .captures(rest)
                .ok_or_else(|| CadenceError::Browser(format!("unsupported selector `{}`", raw)))?;
            if let Some(id) = caps.name("id") {
                selector.id = Some(id.as_str().to_string());
            } else if let Some(class) = caps.name("class") {
                selector.classes.push(class.as_str().to_string());
            } else if let Some(attr) = caps.name("attr") {
                let value = caps
                    .name("dq")
                    .or_else(|| caps.name("sq"))
                    .or_else(|| caps.name("bare"))
                    .map(|v| v.as_str().to_string());
                selector.attributes.push((attr.as_str().to_string(), value));
            }
            rest = &rest[caps.get(0).expect("group 0").end()..];
        }

        if selector == SimpleSelector::default() {
            return Err(CadenceError::Browser(format!("unsupported selector `{}`", raw)));
        }
        Ok(selector)
    }

    fn matches(&self, tag: &str, attributes: &BTreeMap<String, String>) -> bool {
        if let Some(t) = &self.tag {
            if !t.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if attributes.get("id") != Some(id) {
                return false;
            }
        }
        let class_list = attributes.get("class").map(String::as_str).unwrap_or_default();
        if !self
            .classes
            .iter()
            .all(|c| class_list.split_whitespace().any(|have| have == c))
        {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| match (attributes.get(name), expected) {
            (Some(_), None) => true,
            (Some(have), Some(want)) => have == want,
            (None, _) => false,
        })
    }
}

#[derive(Debug)]
struct LiveElement {
    spec: ScriptedElement,
    attributes: BTreeMap<String, String>,
    attached_at: Option<Instant>,
}

impl LiveElement {
    fn is_attached(&self, now: Instant) -> bool {
        self.attached_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Browser session over a [`ScriptedSite`].
pub struct ScriptedBrowser {
    site: Arc<ScriptedSite>,
    viewport: Viewport,
    url: Option<String>,
    elements: Vec<LiveElement>,
    page_errors: Vec<String>,
    history: Vec<String>,
}

impl ScriptedBrowser {
    pub fn new(site: Arc<ScriptedSite>, viewport: Viewport) -> Self {
        Self {
            site,
            viewport,
            url: None,
            elements: Vec::new(),
            page_errors: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Every URL this session loaded, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn load(&mut self, url: &str) -> CadenceResult<()> {
        let page = self
            .site
            .find(url)
            .ok_or_else(|| CadenceError::Browser(format!("no page scripted for {}", url)))?
            .clone();

        let now = Instant::now();
        self.elements = page
            .elements
            .into_iter()
            .map(|spec| LiveElement {
                attributes: spec.attributes.clone(),
                attached_at: if spec.deferred {
                    None
                } else {
                    Some(now + Duration::from_millis(spec.appear_after_ms))
                },
                spec,
            })
            .collect();
        self.page_errors.extend(page.page_errors);
        self.url = Some(page.url.clone());
        self.history.push(page.url);
        debug!(url, "scripted page loaded");
        Ok(())
    }

    fn matching(&self, selector: &str) -> CadenceResult<Vec<usize>> {
        let parsed = SimpleSelector::parse(selector)?;
        let now = Instant::now();
        Ok(self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_attached(now) && parsed.matches(&e.spec.tag, &e.attributes))
            .map(|(i, _)| i)
            .collect())
    }

    fn resolve(&self, element: &ElementRef) -> CadenceResult<usize> {
        self.matching(&element.selector)?
            .get(element.index)
            .copied()
            .ok_or_else(|| {
                CadenceError::Browser(format!(
                    "element {} #{} detached from the page",
                    element.selector, element.index
                ))
            })
    }

    fn absolute(&self, href: &str) -> String {
        match self.url.as_deref().and_then(|u| Url::parse(u).ok()) {
            Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedBrowser {
    async fn set_viewport(&mut self, viewport: Viewport) -> CadenceResult<()> {
        self.viewport = viewport;
        Ok(())
    }

    async fn visit(&mut self, url: &str) -> CadenceResult<()> {
        self.load(url)
    }

    async fn current_url(&mut self) -> CadenceResult<String> {
        Ok(self.url.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query(&mut self, selector: &str) -> CadenceResult<Vec<ElementSnapshot>> {
        let indices = self.matching(selector)?;
        Ok(indices
            .into_iter()
            .enumerate()
            .map(|(index, i)| {
                let e = &self.elements[i];
                ElementSnapshot {
                    index,
                    tag: e.spec.tag.clone(),
                    text: e.spec.text.clone(),
                    visible: e.spec.visible,
                    attributes: e.attributes.clone(),
                }
            })
            .collect())
    }

    async fn click(&mut self, element: &ElementRef) -> CadenceResult<()> {
        let i = self.resolve(element)?;
        let effects = self.elements[i].spec.on_click.clone();
        let is_link = self.elements[i].spec.tag.eq_ignore_ascii_case("a");
        let href = self.elements[i].attributes.get("href").cloned();
        let new_tab = self.elements[i].attributes.get("target").map(|t| t == "_blank").unwrap_or(false);

        for effect in effects {
            match effect {
                ClickEffect::Navigate { url } => {
                    let url = self.absolute(&url);
                    return self.load(&url);
                }
                ClickEffect::Reveal { ids, after_ms } => {
                    let at = Instant::now() + Duration::from_millis(after_ms);
                    for e in self.elements.iter_mut() {
                        if e.spec.id.as_ref().map(|id| ids.contains(id)).unwrap_or(false) {
                            e.attached_at = Some(at);
                        }
                    }
                }
                ClickEffect::Throw { message } => self.page_errors.push(message),
            }
        }

        if is_link {
            if let Some(href) = href {
                if new_tab {
                    info!(href, "link opened in a new tab; current page unchanged");
                    return Ok(());
                }
                let url = self.absolute(&href);
                return self.load(&url);
            }
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> CadenceResult<()> {
        let i = self.resolve(element)?;
        self.elements[i].attributes.insert("value".to_string(), String::new());
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> CadenceResult<()> {
        let i = self.resolve(element)?;
        self.elements[i]
            .attributes
            .entry("value".to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn remove_attribute(&mut self, element: &ElementRef, name: &str) -> CadenceResult<()> {
        let i = self.resolve(element)?;
        self.elements[i].attributes.remove(name);
        Ok(())
    }

    async fn drain_page_errors(&mut self) -> CadenceResult<Vec<String>> {
        Ok(std::mem::take(&mut self.page_errors))
    }

    async fn close(&mut self) -> CadenceResult<()> {
        self.url = None;
        self.elements.clear();
        Ok(())
    }
}

/// Hands out fresh sessions over one shared site description.
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    site: Arc<ScriptedSite>,
    launches: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            site: Arc::new(site),
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions handed out so far, across clones.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, viewport: Viewport) -> CadenceResult<Box<dyn BrowserDriver>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBrowser::new(self.site.clone(), viewport)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> ScriptedSite {
        ScriptedSite::new()
            .page(
                ScriptedPage::new("https://app.test/")
                    .element(ScriptedElement::new("input").attr("data-testid", "search-bar"))
                    .element(
                        ScriptedElement::new("button")
                            .attr("type", "submit")
                            .text("Search")
                            .on_click(ClickEffect::Reveal {
                                ids: vec!["result".into()],
                                after_ms: 300,
                            }),
                    )
                    .element(ScriptedElement::new("img").id("result").attr("alt", "Avatar").deferred())
                    .element(
                        ScriptedElement::new("a")
                            .attr("href", "https://other.test/profile")
                            .attr("target", "_blank")
                            .text("follow"),
                    ),
            )
            .page(ScriptedPage::new("https://other.test/profile").element(ScriptedElement::new("span").text("me")))
    }

    #[test]
    fn selector_parsing() {
        let s = SimpleSelector::parse(r#"img[src="https://x/y?v=4"][alt='A B']"#).unwrap();
        assert_eq!(s.tag.as_deref(), Some("img"));
        assert_eq!(s.attributes[0], ("src".into(), Some("https://x/y?v=4".into())));
        assert_eq!(s.attributes[1], ("alt".into(), Some("A B".into())));

        let s = SimpleSelector::parse("button#go.primary[disabled]").unwrap();
        assert_eq!(s.id.as_deref(), Some("go"));
        assert_eq!(s.classes, vec!["primary".to_string()]);
        assert_eq!(s.attributes[0], ("disabled".into(), None));

        assert!(SimpleSelector::parse("div > span").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_attaches_after_delay() {
        let mut browser = ScriptedBrowser::new(Arc::new(site()), Viewport::default());
        browser.visit("https://app.test").await.unwrap();
        assert!(browser.query("img").await.unwrap().is_empty());

        let button = ElementRef { selector: "button".into(), index: 0 };
        browser.click(&button).await.unwrap();
        assert!(browser.query("img").await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(browser.query("img[alt=\"Avatar\"]").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn typing_and_clearing_update_value() {
        let mut browser = ScriptedBrowser::new(Arc::new(site()), Viewport::default());
        browser.visit("https://app.test/").await.unwrap();
        let input = ElementRef { selector: "input[data-testid=\"search-bar\"]".into(), index: 0 };
        browser.type_text(&input, "rod").await.unwrap();
        browser.type_text(&input, "kawaura").await.unwrap();
        assert_eq!(browser.query("input").await.unwrap()[0].attr("value"), Some("rodkawaura"));
        browser.clear(&input).await.unwrap();
        assert_eq!(browser.query("input").await.unwrap()[0].attr("value"), Some(""));
    }

    #[tokio::test]
    async fn link_with_blank_target_stays_on_page() {
        let mut browser = ScriptedBrowser::new(Arc::new(site()), Viewport::default());
        browser.visit("https://app.test/").await.unwrap();
        let link = ElementRef { selector: "a".into(), index: 0 };

        browser.click(&link).await.unwrap();
        assert_eq!(browser.current_url().await.unwrap(), "https://app.test/");

        browser.remove_attribute(&link, "target").await.unwrap();
        browser.click(&link).await.unwrap();
        assert_eq!(browser.current_url().await.unwrap(), "https://other.test/profile");
        assert_eq!(browser.history().len(), 2);
    }
}
