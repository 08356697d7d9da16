//! The shared error taxonomy (spec §7), independent of any one component.
//!
//! Every component-level error type converts into a [`VmcpError`] at its
//! boundary; the composer is the only place that additionally knows how to
//! map a `VmcpError` onto a JSON-RPC error code.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Coarse classification used for metrics/logging without leaking detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadArguments,
    UnknownTool,
    UnknownResource,
    UnknownPrompt,
    UpstreamUnavailable,
    UpstreamTimeout,
    UpstreamProtocol,
    UpstreamToolError,
    AuthRequired,
    ToolTimeout,
    ToolCrash,
    ToolBadOutput,
    ToolHttpStatus,
    TemplateSyntax,
    TemplateMissingConfig,
    TemplateUnknownTarget,
    TemplateRecursion,
    UpstreamSaturated,
}

/// The full §7 taxonomy. Variants carry just enough structured context to
/// populate a JSON-RPC error `data` field without re-deriving it later.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmcpError {
    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("upstream {server} unavailable")]
    UpstreamUnavailable { server: String },

    #[error("upstream {server} timed out")]
    UpstreamTimeout { server: String },

    #[error("upstream {server} returned a malformed response: {detail}")]
    UpstreamProtocol { server: String, detail: String },

    #[error("upstream {server} tool error: {detail}")]
    UpstreamToolError { server: String, detail: String },

    #[error("authorization required for {server}")]
    AuthRequired {
        server: String,
        authorization_url: Option<String>,
    },

    #[error("tool {tool} timed out")]
    ToolTimeout { tool: String },

    #[error("tool {tool} crashed: {detail}")]
    ToolCrash { tool: String, detail: String },

    #[error("tool {tool} produced unreadable output: {detail}")]
    ToolBadOutput { tool: String, detail: String },

    #[error("tool {tool} received HTTP {status}: {body_excerpt}")]
    ToolHttpStatus {
        tool: String,
        status: u16,
        body_excerpt: String,
    },

    #[error("template syntax error at byte {offset}: {detail}")]
    TemplateSyntax { offset: usize, detail: String },

    #[error("template references undefined @config.{name}")]
    TemplateMissingConfig { name: String },

    #[error("template references unknown {kind} \"{name}\"")]
    TemplateUnknownTarget { kind: &'static str, name: String },

    #[error("template recursion exceeded max depth {max_depth} at {location}")]
    TemplateRecursion { max_depth: usize, location: String },

    #[error("upstream {server} is saturated")]
    UpstreamSaturated { server: String },
}

impl VmcpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadArguments(_) => ErrorKind::BadArguments,
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::UnknownResource(_) => ErrorKind::UnknownResource,
            Self::UnknownPrompt(_) => ErrorKind::UnknownPrompt,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            Self::UpstreamProtocol { .. } => ErrorKind::UpstreamProtocol,
            Self::UpstreamToolError { .. } => ErrorKind::UpstreamToolError,
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::ToolTimeout { .. } => ErrorKind::ToolTimeout,
            Self::ToolCrash { .. } => ErrorKind::ToolCrash,
            Self::ToolBadOutput { .. } => ErrorKind::ToolBadOutput,
            Self::ToolHttpStatus { .. } => ErrorKind::ToolHttpStatus,
            Self::TemplateSyntax { .. } => ErrorKind::TemplateSyntax,
            Self::TemplateMissingConfig { .. } => ErrorKind::TemplateMissingConfig,
            Self::TemplateUnknownTarget { .. } => ErrorKind::TemplateUnknownTarget,
            Self::TemplateRecursion { .. } => ErrorKind::TemplateRecursion,
            Self::UpstreamSaturated { .. } => ErrorKind::UpstreamSaturated,
        }
    }

    /// Upstream errors get one implicit reconnect attempt before being
    /// surfaced (§7 propagation policy); everything else is terminal.
    pub fn is_retryable_once(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

/// Strips any value flagged secret from an error-bound string (§4.6, §8
/// property 7). Call this with the vMCP's secret env values before a
/// `VmcpError` crosses out of the composer.
pub fn redact_secrets(text: &str, secret_values: &[String]) -> String {
    let mut out = text.to_string();
    for secret in secret_values {
        if secret.is_empty() {
            continue;
        }
        out = out.replace(secret.as_str(), "[redacted]");
    }
    out
}

/// A unique identifier stamped on each error instance for log correlation,
/// mirroring the teacher's contextual error struct without carrying its
/// full backtrace/diagnostic machinery (not needed at this scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorId(pub Uuid);

impl ErrorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ErrorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_secrets_strips_every_occurrence() {
        let text = "calling https://api.example.com?key=s3cr3t and again s3cr3t";
        let redacted = redact_secrets(text, &["s3cr3t".to_string()]);
        assert!(!redacted.contains("s3cr3t"));
        assert_eq!(redacted.matches("[redacted]").count(), 2);
    }

    #[test]
    fn redact_secrets_ignores_empty_values() {
        let text = "no secrets here";
        assert_eq!(redact_secrets(text, &["".to_string()]), text);
    }

    #[test]
    fn upstream_unavailable_is_retried_once() {
        let err = VmcpError::UpstreamUnavailable {
            server: "s1".to_string(),
        };
        assert!(err.is_retryable_once());
        assert!(!VmcpError::UpstreamTimeout { server: "s1".to_string() }.is_retryable_once());
    }
}
