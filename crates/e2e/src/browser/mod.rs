//! Browser automation seam
//!
//! The engine only needs CSS selection, a handful of actions and the
//! current URL. Text filtering (`contains`) is done by the engine on the
//! returned snapshots so every driver behaves the same way.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CadenceResult;
use crate::spec::{Locator, Viewport};

pub mod playwright;
pub mod scripted;

pub use playwright::{Browser, PlaywrightConfig, PlaywrightDriver, PlaywrightLauncher};
pub use scripted::{ClickEffect, ScriptedBrowser, ScriptedElement, ScriptedLauncher, ScriptedPage, ScriptedSite};

/// What a driver reports about one matched element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Position among all matches of the selector
    pub index: usize,
    pub tag: String,
    pub text: String,
    pub visible: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Stable address of an element for actions: selector + match index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub selector: String,
    pub index: usize,
}

/// Keep the snapshots whose text satisfies the locator's `contains`.
pub fn filter_by_text(locator: &Locator, snapshots: Vec<ElementSnapshot>) -> Vec<ElementSnapshot> {
    let Some(needle) = &locator.contains else {
        return snapshots;
    };
    if locator.match_case {
        snapshots.into_iter().filter(|s| s.text.contains(needle.as_str())).collect()
    } else {
        let needle = needle.to_lowercase();
        snapshots
            .into_iter()
            .filter(|s| s.text.to_lowercase().contains(&needle))
            .collect()
    }
}

#[async_trait]
pub trait BrowserDriver: Send {
    async fn set_viewport(&mut self, viewport: Viewport) -> CadenceResult<()>;

    async fn visit(&mut self, url: &str) -> CadenceResult<()>;

    async fn current_url(&mut self) -> CadenceResult<String>;

    /// All elements matching a CSS selector, in document order.
    async fn query(&mut self, selector: &str) -> CadenceResult<Vec<ElementSnapshot>>;

    async fn click(&mut self, element: &ElementRef) -> CadenceResult<()>;

    async fn clear(&mut self, element: &ElementRef) -> CadenceResult<()>;

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> CadenceResult<()>;

    async fn remove_attribute(&mut self, element: &ElementRef, name: &str) -> CadenceResult<()>;

    /// Uncaught exceptions thrown by the application's own scripts since
    /// the last call.
    async fn drain_page_errors(&mut self) -> CadenceResult<Vec<String>>;

    async fn close(&mut self) -> CadenceResult<()>;
}

/// Creates one browser session per suite.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, viewport: Viewport) -> CadenceResult<Box<dyn BrowserDriver>>;
}
