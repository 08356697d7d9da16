//! Transport-level errors. `vmcp-upstream` maps these onto the §7
//! taxonomy; this crate has no opinion about retries or session state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HTTP {status}: {body_excerpt}")]
    HttpStatus { status: u16, body_excerpt: String },

    #[error("authorization required (401)")]
    AuthRequired,

    #[error("SSE heartbeat missed for longer than {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    #[error("the underlying reqwest client failed: {0}")]
    Reqwest(#[from] reqwest::Error),
}
