//! Structured provider failures.
//!
//! Adapters classify raw HTTP outcomes here; everything above the adapter
//! layer only looks at [`ProviderErrorKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    MissingCredential,
    EmptyResult,
    /// Rate limit or quota exhaustion. Systemic: stops rotation and triggers lockout.
    Throttled,
    /// Connect, read or timeout failure.
    Transport,
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::MissingCredential => "missing credential",
            ProviderErrorKind::EmptyResult => "empty result",
            ProviderErrorKind::Throttled => "throttled",
            ProviderErrorKind::Transport => "transport error",
            ProviderErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{provider}: {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn missing_credential(provider: &str) -> Self {
        Self::new(
            ProviderErrorKind::MissingCredential,
            provider,
            "no API key configured",
        )
    }

    pub fn empty_result(provider: &str) -> Self {
        Self::new(ProviderErrorKind::EmptyResult, provider, "provider returned nothing")
    }

    pub fn timeout(provider: &str, after_secs: u64) -> Self {
        Self::new(
            ProviderErrorKind::Transport,
            provider,
            format!("no answer after {after_secs}s"),
        )
    }

    pub fn is_throttled(&self) -> bool {
        self.kind == ProviderErrorKind::Throttled
    }

    /// Classify a failed HTTP exchange.
    pub fn from_http(provider: &str, status: u16, body: &str) -> Self {
        let kind = if status == 429 || has_throttle_signature(body) {
            ProviderErrorKind::Throttled
        } else {
            ProviderErrorKind::Other
        };
        Self::new(kind, provider, format!("HTTP {status}: {}", truncate(body, 200)))
    }

    /// Classify a client-side request failure.
    pub fn from_request(provider: &str, err: &reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = if err.status().is_some_and(|s| s.as_u16() == 429)
            || has_throttle_signature(&message)
        {
            ProviderErrorKind::Throttled
        } else {
            ProviderErrorKind::Transport
        };
        Self::new(kind, provider, message)
    }
}

/// Quota markers returned in error bodies.
const THROTTLE_MARKERS: &[&str] = &["RESOURCE_EXHAUSTED", "rate_limit_exceeded", "insufficient_quota"];

/// True if an error body carries a rate-limit or quota marker.
pub fn has_throttle_signature(body: &str) -> bool {
    THROTTLE_MARKERS.iter().any(|m| body.contains(m))
        || body.contains("\"code\": 429")
        || body.contains("\"code\":429")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
