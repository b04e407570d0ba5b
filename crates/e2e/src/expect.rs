//! Evaluation of declared expectations
//!
//! Matchers over JSON values, response expectations and DOM element checks.
//! Each returns `Ok(())` or an `AssertionFailure` naming what was seen.

use serde_json::Value;

use crate::browser::ElementSnapshot;
use crate::error::{CadenceError, CadenceResult};
use crate::http::HttpResponse;
use crate::spec::{ElementCheck, Matcher, ResponseExpect, StatusExpect, ValueCheck};
use crate::state::{lookup_path, split_path, Scope};
use crate::template::resolve_value;

fn failure(expected: impl Into<String>, actual: impl Into<String>) -> CadenceError {
    CadenceError::AssertionFailure {
        expected: expected.into(),
        actual: actual.into(),
    }
}

fn render(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_else(|| "nothing".to_string())
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loosely_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| loosely_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.iter().any(|item| loosely_equal(item, n)),
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, v)| h.get(k).map(|have| loosely_equal(have, v)).unwrap_or(false)),
        _ => false,
    }
}

impl Matcher {
    /// Substitute `${...}` references in the expected values.
    pub fn resolve(&self, scope: &Scope<'_>) -> CadenceResult<Matcher> {
        let one = |v: &Option<Value>| v.as_ref().map(|v| resolve_value(v, scope)).transpose();
        Ok(Matcher {
            equals: one(&self.equals)?,
            one_of: self
                .one_of
                .as_ref()
                .map(|list| list.iter().map(|v| resolve_value(v, scope)).collect::<CadenceResult<Vec<_>>>())
                .transpose()?,
            exists: self.exists,
            not_empty: self.not_empty,
            contains: one(&self.contains)?,
        })
    }

    /// Check `actual` (the value at `path`, `None` if nothing is there).
    pub fn check(&self, path: &str, actual: Option<&Value>) -> CadenceResult<()> {
        let present = actual.filter(|v| !v.is_null());

        if let Some(should_exist) = self.exists {
            if should_exist != present.is_some() {
                let expected = if should_exist { "to exist" } else { "to be absent" };
                return Err(failure(format!("{} {}", path, expected), render(actual)));
            }
            if !should_exist {
                return Ok(());
            }
        }

        let needs_value = self.equals.is_some()
            || self.one_of.is_some()
            || self.not_empty.is_some()
            || self.contains.is_some();
        let value = match present {
            Some(v) => v,
            None if needs_value => {
                return Err(failure(format!("{} to have a value", path), render(actual)));
            }
            None => return Ok(()),
        };

        if let Some(expected) = &self.equals {
            if !loosely_equal(value, expected) {
                return Err(failure(format!("{} == {}", path, expected), value.to_string()));
            }
        }
        if let Some(options) = &self.one_of {
            if !options.iter().any(|o| loosely_equal(value, o)) {
                return Err(failure(
                    format!("{} to be one of {}", path, Value::Array(options.clone())),
                    value.to_string(),
                ));
            }
        }
        if let Some(should_be_non_empty) = self.not_empty {
            if should_be_non_empty != is_non_empty(value) {
                let expected = if should_be_non_empty { "non-empty" } else { "empty" };
                return Err(failure(format!("{} to be {}", path, expected), value.to_string()));
            }
        }
        if let Some(needle) = &self.contains {
            if !contains(value, needle) {
                return Err(failure(format!("{} to contain {}", path, needle), value.to_string()));
            }
        }
        Ok(())
    }
}

impl StatusExpect {
    fn describe(&self) -> String {
        match self {
            StatusExpect::One(s) => format!("status {}", s),
            StatusExpect::AnyOf(list) => format!(
                "status in [{}]",
                list.iter().map(u16::to_string).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

impl ResponseExpect {
    pub fn resolve(&self, scope: &Scope<'_>) -> CadenceResult<ResponseExpect> {
        let body = self
            .body
            .iter()
            .map(|c| {
                Ok(ValueCheck {
                    path: c.path.clone(),
                    matcher: c.matcher.resolve(scope)?,
                })
            })
            .collect::<CadenceResult<Vec<_>>>()?;
        Ok(ResponseExpect {
            status: self.status.clone(),
            body,
            error_body: self.error_body,
        })
    }

    /// Checks run against the saved response shape
    /// (`status`, `headers`, `body`, `error`, `duration_ms`).
    pub fn verify(&self, response: &HttpResponse) -> CadenceResult<()> {
        if let Some(status) = &self.status {
            if !status.accepts(response.status) {
                return Err(failure(
                    status.describe(),
                    format!("status {} with body {}", response.status, response.body),
                ));
            }
        }

        if self.error_body && response.error_message().is_none() {
            return Err(failure("a non-empty error message", response.body.to_string()));
        }

        if !self.body.is_empty() {
            let shape = response.to_value();
            for check in &self.body {
                let (root, rest) = split_path(&check.path);
                let actual = shape.get(root).and_then(|v| lookup_path(v, &rest));
                check.matcher.check(&check.path, actual)?;
            }
        }
        Ok(())
    }
}

/// First check that the matched elements do not satisfy, as a description.
pub fn unmet_check(checks: &[ElementCheck], elements: &[ElementSnapshot]) -> Option<String> {
    checks.iter().find_map(|check| {
        let ok = match check {
            ElementCheck::Exist => !elements.is_empty(),
            ElementCheck::NotExist => elements.is_empty(),
            ElementCheck::BeVisible => elements.first().map(|e| e.visible).unwrap_or(false),
            ElementCheck::ContainText(text) => elements.iter().any(|e| e.text.contains(text.as_str())),
            ElementCheck::HaveAttr { name, value } => elements
                .first()
                .and_then(|e| e.attr(name))
                .map(|have| value.as_deref().map(|want| want == have).unwrap_or(true))
                .unwrap_or(false),
            ElementCheck::HaveCount(n) => elements.len() == *n,
        };
        (!ok).then(|| describe_check(check))
    })
}

pub fn describe_check(check: &ElementCheck) -> String {
    match check {
        ElementCheck::Exist => "exist".to_string(),
        ElementCheck::NotExist => "not exist".to_string(),
        ElementCheck::BeVisible => "be visible".to_string(),
        ElementCheck::ContainText(t) => format!("contain text {:?}", t),
        ElementCheck::HaveAttr { name, value: Some(v) } => format!("have {}={:?}", name, v),
        ElementCheck::HaveAttr { name, value: None } => format!("have attribute {}", name),
        ElementCheck::HaveCount(n) => format!("have count {}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn matcher() -> Matcher {
        Matcher::default()
    }

    #[test]
    fn equals_is_numeric_aware() {
        let m = Matcher {
            equals: Some(json!(42)),
            ..matcher()
        };
        assert!(m.check("id", Some(&json!(42.0))).is_ok());
        assert!(m.check("id", Some(&json!("42"))).unwrap_err().is_assertion_failure());
    }

    #[test]
    fn not_empty_and_one_of() {
        let m = Matcher {
            not_empty: Some(true),
            ..matcher()
        };
        assert!(m.check("error", Some(&json!("Invalid ID supplied"))).is_ok());
        assert!(m.check("error", Some(&json!(""))).is_err());
        assert!(m.check("error", None).is_err());

        let m = Matcher {
            one_of: Some(vec![json!(400), json!(500)]),
            ..matcher()
        };
        assert!(m.check("status", Some(&json!(500))).is_ok());
        assert!(m.check("status", Some(&json!(200))).is_err());
    }

    #[test]
    fn exists_false_accepts_absence() {
        let m = Matcher {
            exists: Some(false),
            ..matcher()
        };
        assert!(m.check("x", None).is_ok());
        assert!(m.check("x", Some(&Value::Null)).is_ok());
        assert!(m.check("x", Some(&json!(1))).is_err());
    }

    #[test]
    fn contains_over_strings_arrays_objects() {
        let m = Matcher {
            contains: Some(json!("dream job")),
            ..matcher()
        };
        assert!(m.check("h", Some(&json!("Land your dream job"))).is_ok());

        let m = Matcher {
            contains: Some(json!({"status": "pending"})),
            ..matcher()
        };
        assert!(m.check("body", Some(&json!({"id": 1, "status": "pending"}))).is_ok());
    }

    #[test]
    fn response_expectations() {
        let response = HttpResponse {
            status: 400,
            headers: BTreeMap::new(),
            body: json!("Invalid ID supplied"),
            duration_ms: 2,
        };
        let expect: ResponseExpect = serde_yaml::from_str(
            "status: [400, 500]\nerror_body: true\nbody:\n  - path: error\n    not_empty: true\n",
        )
        .unwrap();
        assert!(expect.verify(&response).is_ok());

        let strict: ResponseExpect = serde_yaml::from_str("status: 200").unwrap();
        let err = strict.verify(&response).unwrap_err();
        assert!(err.to_string().contains("status 200"));
    }

    #[test]
    fn element_checks() {
        let img = ElementSnapshot {
            index: 0,
            tag: "img".into(),
            text: String::new(),
            visible: true,
            attributes: BTreeMap::from([("alt".to_string(), "Avatar".to_string())]),
        };
        let checks = vec![
            ElementCheck::BeVisible,
            ElementCheck::HaveAttr {
                name: "alt".into(),
                value: Some("Avatar".into()),
            },
        ];
        assert_eq!(unmet_check(&checks, &[img.clone()]), None);
        assert_eq!(unmet_check(&checks, &[]), Some("be visible".to_string()));
        assert_eq!(
            unmet_check(&[ElementCheck::HaveCount(2)], &[img]),
            Some("have count 2".to_string())
        );
    }
}
