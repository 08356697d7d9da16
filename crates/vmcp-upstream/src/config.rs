//! Upstream Server data model (spec §3).

use vmcp_auth::{AuthPolicy, OAuth2Config};
use vmcp_core::ServerId;
use vmcp_transport::{HttpTransportConfig, SseTransportConfig};

#[derive(Clone)]
pub enum TransportConfig {
    Http(HttpTransportConfig),
    Sse(SseTransportConfig),
}

#[derive(Clone)]
pub enum AuthConfig {
    Static(AuthPolicy),
    OAuth2(OAuth2Config),
}

#[derive(Clone)]
pub struct UpstreamServerConfig {
    pub id: ServerId,
    pub name: String,
    pub transport: TransportConfig,
    pub auth: AuthConfig,
    pub enabled: bool,
    /// Max concurrent outbound calls (spec §5, default 16).
    pub max_concurrency: usize,
    /// Queue depth before `UpstreamSaturated` (spec §5, default 64).
    pub queue_bound: usize,
}

impl UpstreamServerConfig {
    pub fn new(id: impl Into<ServerId>, name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            auth: AuthConfig::Static(AuthPolicy::None),
            enabled: true,
            max_concurrency: 16,
            queue_bound: 64,
        }
    }
}
