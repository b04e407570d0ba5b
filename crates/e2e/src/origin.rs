//! Security origins and the bridge contract between them
//!
//! ```text
//!   LocalContext ──(origin step)──► RemoteContext ──(steps done)──► LocalContext
//!        │   args: JSON round trip        │   returns: declared keys only   ▲
//!        └────────────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! The remote side starts from an empty shared state seeded only with the
//! marshaled arguments. Nothing else crosses in either direction.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CadenceError, CadenceResult};
use crate::state::{lookup_path, split_path, SharedState};

/// scheme + host + port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn parse(raw: &str) -> CadenceResult<Self> {
        let url = Url::parse(raw)
            .map_err(|e| CadenceError::InvalidStep(format!("invalid origin `{}`: {}", raw, e)))?;
        Self::of_url(&url)
    }

    pub fn of_url(url: &Url) -> CadenceResult<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| CadenceError::InvalidStep(format!("`{}` has no host", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CadenceError::InvalidStep(format!("`{}` has no port", url)))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    /// `true` when `url` (absolute) is on this origin.
    pub fn contains(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| Self::of_url(&u).ok())
            .map(|o| &o == self)
            .unwrap_or(false)
    }

    fn default_port(&self) -> Option<u16> {
        match self.scheme.as_str() {
            "http" | "ws" => Some(80),
            "https" | "wss" => Some(443),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.default_port() == Some(self.port) {
            write!(f, "{}://{}", self.scheme, self.host)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Which side of the bridge a context runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    Local,
    Remote(Origin),
}

impl ContextKind {
    pub fn remote_origin(&self) -> Option<&Origin> {
        match self {
            ContextKind::Local => None,
            ContextKind::Remote(origin) => Some(origin),
        }
    }
}

/// Lifecycle of one crossing, tracked for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Local,
    AwaitingOrigin(Origin),
    Remote(Origin),
    Returned(Origin),
    Failed(Origin),
}

impl BridgeState {
    pub fn advance(self, next: BridgeState) -> CadenceResult<BridgeState> {
        use BridgeState::*;
        let ok = matches!(
            (&self, &next),
            (Local, AwaitingOrigin(_))
                | (AwaitingOrigin(_), Remote(_))
                | (AwaitingOrigin(_), Failed(_))
                | (Remote(_), Returned(_))
                | (Remote(_), Failed(_))
        );
        if ok {
            debug!(from = ?self, to = ?next, "origin bridge");
            Ok(next)
        } else {
            Err(CadenceError::InvalidStep(format!(
                "origin bridge cannot go from {:?} to {:?}",
                self, next
            )))
        }
    }
}

/// Push arguments through a JSON round trip so that only plain data
/// reaches the remote side.
pub fn marshal_args(args: &BTreeMap<String, Value>) -> CadenceResult<SharedState> {
    let wire = serde_json::to_string(args)?;
    let values: BTreeMap<String, Value> = serde_json::from_str(&wire)?;
    Ok(SharedState::from_values(values))
}

/// Copy the declared `local_key: remote_path` pairs out of the remote state.
/// A declared return that the remote side never wrote is a failure of the
/// crossing, not a skip.
pub fn collect_returns(
    returns: &BTreeMap<String, String>,
    remote: &SharedState,
) -> CadenceResult<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (local_key, remote_path) in returns {
        let (root, rest) = split_path(remote_path);
        let value = remote
            .get(root)
            .and_then(|v| lookup_path(v, &rest))
            .cloned()
            .ok_or_else(|| CadenceError::AssertionFailure {
                expected: format!("remote steps to return `{}`", remote_path),
                actual: "nothing written".to_string(),
            })?;
        let wire = serde_json::to_string(&value)?;
        out.insert(local_key.clone(), serde_json::from_str(&wire)?);
    }
    Ok(out)
}
