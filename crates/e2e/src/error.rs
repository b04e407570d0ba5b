//! Error types for test orchestration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CadenceError {
    /// A predicate evaluated to something other than what the step expected.
    #[error("Assertion failed: expected {expected}, got {actual}")]
    AssertionFailure { expected: String, actual: String },

    /// The poll deadline passed before the observation was satisfied.
    #[error("Timed out after {elapsed_ms} ms ({attempts} attempts) waiting for {what}; last observed: {last_observed}")]
    TimeoutExceeded {
        what: String,
        elapsed_ms: u64,
        attempts: u32,
        last_observed: serde_json::Value,
    },

    #[error("{method} {url} returned {status}: {body}")]
    HttpStatusFailure {
        method: String,
        url: String,
        status: u16,
        body: serde_json::Value,
    },

    /// A step read shared state that no earlier step wrote. Reported as a skip.
    #[error("Precondition absent: `{0}` was never written")]
    PreconditionAbsent(String),

    #[error("Failure inside origin {origin}: {source}")]
    OriginBridgeFailure {
        origin: String,
        #[source]
        source: Box<CadenceError>,
    },

    #[error("Navigation to {url} leaves origin {origin}")]
    OriginViolation { origin: String, url: String },

    #[error("Uncaught application exception: {0}")]
    AppException(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Target service failed to start: {0}")]
    ServerStartup(String),

    #[error("Target health check failed: {0}")]
    ServerHealthCheck(String),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CadenceError {
    /// Skips are not failures: the upstream step already reported its own.
    pub fn is_skip(&self) -> bool {
        matches!(self, CadenceError::PreconditionAbsent(_))
    }

    /// Timeouts count as assertion failures with extra diagnostics.
    pub fn is_assertion_failure(&self) -> bool {
        matches!(
            self,
            CadenceError::AssertionFailure { .. } | CadenceError::TimeoutExceeded { .. }
        )
    }

    /// Stable identifier used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CadenceError::AssertionFailure { .. } => "assertion_failure",
            CadenceError::TimeoutExceeded { .. } => "timeout_exceeded",
            CadenceError::HttpStatusFailure { .. } => "http_status_failure",
            CadenceError::PreconditionAbsent(_) => "precondition_absent",
            CadenceError::OriginBridgeFailure { .. } => "origin_bridge_failure",
            CadenceError::OriginViolation { .. } => "origin_violation",
            CadenceError::AppException(_) => "app_exception",
            CadenceError::Cancelled(_) => "cancelled",
            _ => "harness_error",
        }
    }

    /// Structured payload kept for the reporter (last observed state on timeout,
    /// status and body on HTTP failures, inner cause for bridge failures).
    pub fn diagnostics(&self) -> Option<serde_json::Value> {
        match self {
            CadenceError::TimeoutExceeded {
                what,
                elapsed_ms,
                attempts,
                last_observed,
            } => Some(serde_json::json!({
                "what": what,
                "elapsed_ms": elapsed_ms,
                "attempts": attempts,
                "last_observed": last_observed,
            })),
            CadenceError::AssertionFailure { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            CadenceError::HttpStatusFailure { status, body, .. } => Some(serde_json::json!({
                "status": status,
                "body": body,
            })),
            CadenceError::OriginBridgeFailure { origin, source } => Some(serde_json::json!({
                "origin": origin,
                "cause_kind": source.kind(),
                "cause": source.to_string(),
                "cause_diagnostics": source.diagnostics(),
            })),
            _ => None,
        }
    }

    /// Unwrap bridge failures down to the failure that actually happened.
    pub fn root_cause(&self) -> &CadenceError {
        match self {
            CadenceError::OriginBridgeFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type CadenceResult<T> = Result<T, CadenceError>;
