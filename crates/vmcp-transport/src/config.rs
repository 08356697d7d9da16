//! Transport configuration (spec §3 "Upstream Server": transport kind,
//! endpoint, headers).

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub headers: HashMap<String, String>,
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            headers: HashMap::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SseTransportConfig {
    pub sse_endpoint: String,
    pub post_endpoint: String,
    pub headers: HashMap<String, String>,
    pub request_timeout: Duration,
    /// If no heartbeat (or frame) arrives within this window the session is
    /// considered lost (spec §4.1 "absence beyond `heartbeat_timeout`
    /// downgrades to `error`").
    pub heartbeat_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl Default for SseTransportConfig {
    fn default() -> Self {
        Self {
            sse_endpoint: String::new(),
            post_endpoint: String::new(),
            headers: HashMap::new(),
            request_timeout: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(45),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}
