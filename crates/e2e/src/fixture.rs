//! Static JSON test data
//!
//! Fixtures are loaded once per suite, before any case runs, and are
//! read-only afterwards. They are never visible across an origin bridge.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{CadenceError, CadenceResult};
use crate::spec::FixtureBinding;

/// Supplies fixture documents by file name.
pub trait FixtureProvider: Send + Sync {
    fn load(&self, file: &str) -> CadenceResult<Value>;
}

/// Reads `<dir>/<file>` as JSON.
#[derive(Debug, Clone)]
pub struct DirFixtures {
    dir: PathBuf,
}

impl DirFixtures {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FixtureProvider for DirFixtures {
    fn load(&self, file: &str) -> CadenceResult<Value> {
        let path = self.dir.join(file);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CadenceError::Fixture(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| CadenceError::Fixture(format!("{}: {}", path.display(), e)))
    }
}

/// In-memory fixtures, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct StaticFixtures {
    files: BTreeMap<String, Value>,
}

impl StaticFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: impl Into<String>, value: Value) -> Self {
        self.files.insert(file.into(), value);
        self
    }
}

impl FixtureProvider for StaticFixtures {
    fn load(&self, file: &str) -> CadenceResult<Value> {
        self.files
            .get(file)
            .cloned()
            .ok_or_else(|| CadenceError::Fixture(format!("no fixture named {}", file)))
    }
}

/// Resolve every binding of a suite into `alias -> value`.
pub fn load_bindings(
    provider: &dyn FixtureProvider,
    bindings: &[FixtureBinding],
) -> CadenceResult<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for binding in bindings {
        let document = provider.load(&binding.file)?;
        let value = match binding.pointer.as_deref() {
            Some(pointer) if !pointer.is_empty() => document.pointer(pointer).cloned().ok_or_else(|| {
                CadenceError::Fixture(format!("{} has nothing at {}", binding.file, pointer))
            })?,
            _ => document,
        };
        debug!(file = %binding.file, alias = %binding.alias, "fixture loaded");
        out.insert(binding.alias.clone(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(pointer: Option<&str>) -> FixtureBinding {
        FixtureBinding {
            file: "petstoredata.json".into(),
            pointer: pointer.map(String::from),
            alias: "petstoreData".into(),
        }
    }

    #[test]
    fn dir_fixtures_apply_pointer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("petstoredata.json"),
            r#"{"petstoreData": {"status": "available", "photoUrls": ["x"]}}"#,
        )
        .unwrap();

        let provider = DirFixtures::new(dir.path());
        let loaded = load_bindings(&provider, &[binding(Some("/petstoreData"))]).unwrap();
        assert_eq!(loaded["petstoreData"]["status"], json!("available"));

        let whole = load_bindings(&provider, &[binding(None)]).unwrap();
        assert!(whole["petstoreData"].get("petstoreData").is_some());
    }

    #[test]
    fn missing_pointer_or_file_is_a_fixture_error() {
        let provider = StaticFixtures::new().with("petstoredata.json", json!({}));
        let err = load_bindings(&provider, &[binding(Some("/nope"))]).unwrap_err();
        assert!(matches!(err, CadenceError::Fixture(_)));

        let err = DirFixtures::new("/nonexistent").load("x.json").unwrap_err();
        assert!(matches!(err, CadenceError::Fixture(_)));
    }
}
