//! HTTP request adapter
//!
//! Issues exactly one request per call. Retrying belongs to the poll engine
//! and is only ever applied to idempotent reads.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CadenceError, CadenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Only these may be re-issued by a poll.
    pub fn is_idempotent_read(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }

    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// `false` returns 4xx/5xx responses instead of failing the step.
    pub fail_on_status_code: bool,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            fail_on_status_code: true,
            headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when possible, the raw text otherwise, `null` when empty.
    pub body: Value,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error bodies come either as `{"message": "..."}` or as a bare string.
    pub fn error_message(&self) -> Option<String> {
        match &self.body {
            Value::Object(map) => match map.get("message") {
                Some(Value::String(m)) if !m.is_empty() => Some(m.clone()),
                _ => None,
            },
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// The shape saved into shared state and inspected by assertions.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "status": self.status,
            "headers": self.headers,
            "body": self.body,
            "error": self.error_message(),
            "duration_ms": self.duration_ms,
        })
    }
}

/// Thin wrapper over a reqwest client bound to a base URL.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
    base_url: String,
}

impl HttpAdapter {
    pub fn new(base_url: impl Into<String>, default_timeout: Duration) -> CadenceResult<Self> {
        let client = Client::builder()
            .timeout(default_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Same client, different base (used when a flow crosses origins).
    pub fn rebased(&self, base_url: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through; anything else is appended to the base.
    pub fn resolve_url(&self, path: &str) -> CadenceResult<Url> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            let base = self.base_url.trim_end_matches('/');
            if path.starts_with('/') {
                format!("{}{}", base, path)
            } else {
                format!("{}/{}", base, path)
            }
        };
        Url::parse(&raw).map_err(|e| CadenceError::InvalidStep(format!("invalid URL `{}`: {}", raw, e)))
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> CadenceResult<HttpResponse> {
        let url = self.resolve_url(path)?;
        let headers = build_headers(&options.headers)?;

        let mut request = self
            .client
            .request(method.to_reqwest(), url.clone())
            .headers(headers);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, %url, "sending request");
        let start = Instant::now();
        let response = request.send().await?;

        let status = response.status().as_u16();
        let mut response_headers = BTreeMap::new();
        for (key, value) in response.headers() {
            response_headers.insert(key.to_string(), value.to_str().unwrap_or_default().to_string());
        }
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        let bytes = response.bytes().await?;
        let body = parse_body(&bytes, is_json);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(%method, %url, status, duration_ms, "response received");

        let response = HttpResponse {
            status,
            headers: response_headers,
            body,
            duration_ms,
        };

        if options.fail_on_status_code && !response.is_success() {
            return Err(CadenceError::HttpStatusFailure {
                method: method.to_string(),
                url: url.to_string(),
                status,
                body: response.body,
            });
        }
        Ok(response)
    }
}

fn build_headers(input: &BTreeMap<String, String>) -> CadenceResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in input {
        if key.is_empty() {
            continue;
        }
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| CadenceError::InvalidStep(format!("invalid header name `{}`: {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CadenceError::InvalidStep(format!("invalid header value for `{}`: {}", key, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn parse_body(bytes: &[u8], is_json: bool) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let text = String::from_utf8_lossy(bytes);
    // Some services return JSON without the content type.
    match serde_json::from_str::<Value>(&text) {
        Ok(v) if is_json || v.is_object() || v.is_array() => v,
        _ => Value::String(text.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> HttpAdapter {
        HttpAdapter::new("http://localhost:8080/api/v3", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn relative_paths_append_to_base() {
        let http = adapter();
        assert_eq!(
            http.resolve_url("/pet/42").unwrap().as_str(),
            "http://localhost:8080/api/v3/pet/42"
        );
        assert_eq!(
            http.resolve_url("pet").unwrap().as_str(),
            "http://localhost:8080/api/v3/pet"
        );
        assert_eq!(
            http.resolve_url("https://github.com/x").unwrap().as_str(),
            "https://github.com/x"
        );
    }

    #[test]
    fn error_message_accepts_both_shapes() {
        let mut response = HttpResponse {
            status: 400,
            headers: BTreeMap::new(),
            body: json!({"code": 400, "message": "Invalid ID supplied"}),
            duration_ms: 1,
        };
        assert_eq!(response.error_message().as_deref(), Some("Invalid ID supplied"));

        response.body = json!("Pet not found");
        assert_eq!(response.error_message().as_deref(), Some("Pet not found"));

        response.body = Value::Null;
        assert!(response.error_message().is_none());
    }

    #[test]
    fn bare_text_bodies_stay_strings() {
        assert_eq!(parse_body(b"Pet deleted", false), json!("Pet deleted"));
        assert_eq!(parse_body(b"{\"id\":1}", false), json!({"id": 1}));
        assert_eq!(parse_body(b"42", false), json!("42"));
        assert_eq!(parse_body(b"42", true), json!(42));
        assert_eq!(parse_body(b"", true), Value::Null);
    }
}
