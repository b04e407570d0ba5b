//! Shared test state scoped to one suite file
//!
//! A `SharedState` is created when a suite starts and dropped when it ends.
//! It is owned by the suite's execution context and never shared between
//! suites or worker processes.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{CadenceError, CadenceResult};

/// Mapping from symbolic name to last-known value.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    values: BTreeMap<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from values that crossed a serialization boundary.
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        debug!(key = %name, "shared state write");
        self.values.insert(name, value);
    }

    /// `None` means the key was never written. Callers treat that as "skip",
    /// not as a failure.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Like [`get`](Self::get) but turns absence into `PreconditionAbsent`.
    pub fn require(&self, name: &str) -> CadenceResult<&Value> {
        self.get(name)
            .ok_or_else(|| CadenceError::PreconditionAbsent(name.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Walk a dotted path (`body.photoUrls.0`) into a JSON value.
pub fn lookup_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Split `createdPet.body.id` into root key and remaining segments.
pub fn split_path(path: &str) -> (&str, Vec<&str>) {
    let mut parts = path.split('.');
    let root = parts.next().unwrap_or_default();
    (root, parts.filter(|p| !p.is_empty()).collect())
}

/// Read-only view used when resolving templates and assertion paths.
///
/// Lookup order: macro locals, then shared state, then `fixtures.*`.
pub struct Scope<'a> {
    pub state: &'a SharedState,
    pub fixtures: Option<&'a BTreeMap<String, Value>>,
    pub locals: Option<&'a BTreeMap<String, Value>>,
}

impl<'a> Scope<'a> {
    pub fn new(state: &'a SharedState) -> Self {
        Self {
            state,
            fixtures: None,
            locals: None,
        }
    }

    pub fn with_fixtures(mut self, fixtures: &'a BTreeMap<String, Value>) -> Self {
        self.fixtures = Some(fixtures);
        self
    }

    pub fn with_locals(mut self, locals: &'a BTreeMap<String, Value>) -> Self {
        self.locals = Some(locals);
        self
    }

    /// Resolve a dotted path. The error names the root key so the
    /// step can be reported as skipped.
    pub fn resolve(&self, path: &str) -> CadenceResult<Value> {
        let (root, rest) = split_path(path.trim());

        let base = if root == "fixtures" {
            let fixtures = self
                .fixtures
                .ok_or_else(|| CadenceError::PreconditionAbsent(path.to_string()))?;
            let (name, tail) = rest
                .split_first()
                .ok_or_else(|| CadenceError::InvalidStep("`fixtures` needs a fixture name".into()))?;
            let fixture = fixtures
                .get(*name)
                .ok_or_else(|| CadenceError::PreconditionAbsent(format!("fixtures.{}", name)))?;
            return lookup_path(fixture, tail)
                .cloned()
                .ok_or_else(|| CadenceError::PreconditionAbsent(path.to_string()));
        } else if let Some(local) = self.locals.and_then(|l| l.get(root)) {
            local
        } else {
            self.state.require(root)?
        };

        lookup_path(base, &rest)
            .cloned()
            .ok_or_else(|| CadenceError::PreconditionAbsent(path.to_string()))
    }
}
