//! `${path}` interpolation over shared state, fixtures and macro locals

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{CadenceError, CadenceResult};
use crate::state::Scope;

/// Object key that spreads another object into the one being built.
pub const SPREAD_KEY: &str = "...";

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\s*([^}\s]+)\s*\}").expect("placeholder pattern"))
}

/// Interpolate a string. Non-string values are rendered as compact JSON.
pub fn resolve_str(input: &str, scope: &Scope<'_>) -> CadenceResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in placeholder().captures_iter(input) {
        let whole = caps.get(0).expect("group 0");
        out.push_str(&input[last..whole.start()]);
        match scope.resolve(&caps[1])? {
            Value::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Interpolate every string inside a JSON value.
///
/// A string that is exactly one placeholder keeps the referenced type, so
/// `"${petId}"` becomes the number `42`, not `"42"`.
pub fn resolve_value(input: &Value, scope: &Scope<'_>) -> CadenceResult<Value> {
    match input {
        Value::String(s) => {
            if let Some(path) = whole_placeholder(s) {
                scope.resolve(path)
            } else {
                resolve_str(s, scope).map(Value::String)
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<CadenceResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            if let Some(spread) = map.get(SPREAD_KEY) {
                match resolve_value(spread, scope)? {
                    Value::Object(inner) => out.extend(inner),
                    Value::Null => {}
                    other => {
                        return Err(CadenceError::InvalidStep(format!(
                            "`...` must reference an object, got {}",
                            other
                        )))
                    }
                }
            }
            for (key, value) in map {
                if key == SPREAD_KEY {
                    continue;
                }
                out.insert(key.clone(), resolve_value(value, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let caps = placeholder().captures(s)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == s.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}
