//! Custom Tool data model (spec §3 "Custom Tool"): a discriminated union
//! over the three engine kinds, each carrying its own definition plus the
//! input schema and declared name shared by every engine.

use serde_json::Value;

use vmcp_auth::AuthPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Text,
    Binary,
}

/// How an HTTP tool's outbound request authenticates. `Upstream` is filled
/// in by the composer from a live upstream session's current auth headers
/// (e.g. a freshly-refreshed OAuth bearer token) rather than held here,
/// since token refresh is `vmcp-upstream`'s responsibility, not this
/// crate's.
#[derive(Clone)]
pub enum HttpAuthBinding {
    None,
    Policy(AuthPolicy),
    Upstream { extra_headers: Vec<(String, String)> },
}

impl std::fmt::Debug for HttpAuthBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Policy(p) => write!(f, "Policy({p:?})"),
            Self::Upstream { .. } => write!(f, "Upstream(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub source: String,
    /// Names of environment variables exposed to the script (spec §3).
    pub env_reads: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub method: String,
    pub url_template: String,
    pub header_templates: Vec<(String, String)>,
    pub body_template: Option<String>,
    pub auth: HttpAuthBinding,
    pub response_kind: ResponseKind,
}

#[derive(Debug, Clone)]
pub struct PromptToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub body_template: String,
}

#[derive(Debug, Clone)]
pub enum CustomToolDef {
    Script(ScriptToolDef),
    Http(HttpToolDef),
    Prompt(PromptToolDef),
}

impl CustomToolDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Script(d) => &d.name,
            Self::Http(d) => &d.name,
            Self::Prompt(d) => &d.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Script(d) => d.description.as_deref(),
            Self::Http(d) => d.description.as_deref(),
            Self::Prompt(d) => d.description.as_deref(),
        }
    }

    pub fn input_schema(&self) -> &Value {
        match self {
            Self::Script(d) => &d.input_schema,
            Self::Http(d) => &d.input_schema,
            Self::Prompt(d) => &d.input_schema,
        }
    }
}
