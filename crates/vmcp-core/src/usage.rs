//! Usage logging interface (spec §6 `usage_log`, SPEC_FULL §2).
//!
//! The core only defines the sink trait and emits one event per completed
//! operation; persisting it to a relational store is an external
//! collaborator's job (spec §1 Out of scope).

use async_trait::async_trait;

use crate::error::ErrorKind;
use crate::ids::VmcpId;

/// One row of the logical `usage_log` table (spec §6).
#[derive(Debug, Clone)]
pub struct UsageLogEvent {
    pub vmcp_id: VmcpId,
    pub method: String,
    pub tool_name: Option<String>,
    pub server_name: Option<String>,
    pub duration_ms: u64,
    pub outcome: UsageOutcome,
}

#[derive(Debug, Clone)]
pub enum UsageOutcome {
    Success,
    Error(ErrorKind),
}

/// Append-only sink for usage events. The Adapter guarantees exactly one
/// row per inbound request (spec §7).
#[async_trait]
pub trait UsageLogSink: Send + Sync {
    async fn record(&self, event: UsageLogEvent);
}

/// In-memory sink for tests and `vmcp-cli serve-test` (SPEC_FULL §2).
#[derive(Default)]
pub struct InMemoryUsageLog {
    events: tokio::sync::Mutex<Vec<UsageLogEvent>>,
}

#[async_trait]
impl UsageLogSink for InMemoryUsageLog {
    async fn record(&self, event: UsageLogEvent) {
        self.events.lock().await.push(event);
    }
}

impl InMemoryUsageLog {
    pub async fn drain(&self) -> Vec<UsageLogEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }
}
