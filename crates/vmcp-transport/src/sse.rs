//! Server-Sent Events transport: a long-lived GET stream for server→client
//! messages, paired with a separate HTTP POST channel for client→server
//! requests (spec §4.1 "SSE"). Framing is the standard
//! `event: message\ndata: <json>\n\n` with periodic heartbeat events.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SseTransportConfig;
use crate::error::TransportError;

/// One parsed SSE frame.
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

fn parse_frames(buffer: &mut String) -> Vec<SseFrame> {
    let mut frames = Vec::new();
    while let Some(idx) = buffer.find("\n\n") {
        let raw: String = buffer.drain(..idx + 2).collect();
        let mut event = None;
        let mut data_lines = Vec::new();
        for line in raw.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.trim().to_string());
            }
        }
        if !data_lines.is_empty() || event.is_some() {
            frames.push(SseFrame {
                event,
                data: data_lines.join("\n"),
            });
        }
    }
    frames
}

pub struct SseUpstreamTransport {
    config: SseTransportConfig,
    client: HttpClient,
    last_frame: Arc<Mutex<Instant>>,
    shutdown: CancellationToken,
    incoming: Arc<Mutex<mpsc::Receiver<Value>>>,
}

impl SseUpstreamTransport {
    /// Starts the background SSE reader task and returns once the first
    /// connection attempt has been issued (spec §4.1: heartbeats reset a
    /// liveness timer tracked here).
    pub fn connect(config: SseTransportConfig) -> Result<Self, TransportError> {
        let client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TransportError::Reqwest)?;

        let (tx, rx) = mpsc::channel(256);
        let last_frame = Arc::new(Mutex::new(Instant::now()));
        let shutdown = CancellationToken::new();

        let task_config = config.clone();
        let task_client = client.clone();
        let task_last_frame = Arc::clone(&last_frame);
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            Self::reader_loop(task_config, task_client, tx, task_last_frame, task_shutdown).await;
        });

        Ok(Self {
            config,
            client,
            last_frame,
            shutdown,
            incoming: Arc::new(Mutex::new(rx)),
        })
    }

    async fn reader_loop(
        config: SseTransportConfig,
        client: HttpClient,
        tx: mpsc::Sender<Value>,
        last_frame: Arc<Mutex<Instant>>,
        shutdown: CancellationToken,
    ) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let mut request = client
                .get(&config.sse_endpoint)
                .header("Accept", "text/event-stream");
            for (key, value) in &config.headers {
                request = request.header(key, value);
            }

            let response = match request.send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    warn!(status = %r.status(), "sse connection rejected");
                    tokio::time::sleep(config.reconnect_delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "sse connection failed");
                    tokio::time::sleep(config.reconnect_delay).await;
                    continue;
                }
            };

            let mut buffer = String::new();
            let mut stream = response.bytes_stream();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    chunk = stream.next() => {
                        match chunk {
                            Some(Ok(bytes)) => {
                                buffer.push_str(&String::from_utf8_lossy(&bytes));
                                *last_frame.lock().await = Instant::now();
                                for frame in parse_frames(&mut buffer) {
                                    if frame.event.as_deref() == Some("heartbeat") {
                                        debug!("sse heartbeat");
                                        continue;
                                    }
                                    if let Ok(value) = serde_json::from_str::<Value>(&frame.data) {
                                        let _ = tx.send(value).await;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "sse stream error, reconnecting");
                                break;
                            }
                            None => {
                                warn!("sse stream closed, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }
            tokio::time::sleep(config.reconnect_delay).await;
        }
    }

    /// True if a frame (data or heartbeat) arrived within `heartbeat_timeout`.
    pub async fn is_alive(&self) -> bool {
        let last = *self.last_frame.lock().await;
        last.elapsed() < self.config.heartbeat_timeout
    }

    /// Send a client→server JSON-RPC request over the separate POST
    /// channel (spec §4.1). `extra_headers` overrides static config, same
    /// as [`crate::http::HttpUpstreamTransport::call`].
    pub async fn post(&self, body: Value, extra_headers: &[(String, String)]) -> Result<Value, TransportError> {
        let mut request = self.client.post(&self.config.post_endpoint).json(&body);
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
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::AuthRequired);
        }
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus {
                status: response.status().as_u16(),
                body_excerpt: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Receive the next server-pushed message, if any, within `timeout`.
    pub async fn recv(&self, timeout: Duration) -> Option<Value> {
        let mut rx = self.incoming.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for SseUpstreamTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
