//! Plain request/response JSON-RPC over HTTPS (spec §4.1 "HTTP: no
//! server-initiated stream").

use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::config::HttpTransportConfig;
use crate::error::TransportError;

#[derive(Clone)]
pub struct HttpUpstreamTransport {
    config: HttpTransportConfig,
    client: HttpClient,
}

impl HttpUpstreamTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TransportError::Reqwest)?;
        Ok(Self { config, client })
    }

    /// Send one JSON-RPC request and return the raw JSON-RPC response body.
    /// `extra_headers` carries per-call values (e.g. a freshly refreshed
    /// OAuth bearer token) that override the transport's static config.
    pub async fn call(&self, body: Value, extra_headers: &[(String, String)]) -> Result<Value, TransportError> {
        let mut request = self.client.post(&self.config.endpoint).json(&body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        for (key, value) in extra_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.config.request_timeout)
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::AuthRequired);
        }
        if !status.is_success() {
            let body_excerpt: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(512)
                .collect();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body_excerpt,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}
