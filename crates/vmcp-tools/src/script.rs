//! Script engine (spec §4.5 "Script engine"): runs a tool's source text in
//! a genuinely process-isolated interpreter subprocess, never an in-process
//! interpreter (spec §9 design note rules that out explicitly).

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

use vmcp_core::{InvocationContext, VmcpError};
use vmcp_protocol::types::{CallToolResult, ContentPart};

use crate::types::ScriptToolDef;

/// Default wall-clock bound for a script invocation (spec §4.5).
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Global concurrency bound across all script-tool executions (spec §5,
/// default 8) — a bare semaphore, no queue-bound/`UpstreamSaturated`-style
/// rejection; callers simply wait their turn.
pub struct ScriptEngine {
    interpreter: String,
    timeout: Duration,
    global_permits: Arc<Semaphore>,
}

impl ScriptEngine {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
            global_permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn execute(
        &self,
        def: &ScriptToolDef,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CallToolResult, VmcpError> {
        let _permit = self
            .global_permits
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let env_dict: serde_json::Map<String, Value> = def
            .env_reads
            .iter()
            .filter_map(|name| ctx.env.get(name).map(|v| (name.clone(), Value::String(v.to_string()))))
            .collect();

        let mut command = Command::new(&self.interpreter);
        command
            .arg("-")
            .env("VMCP_TOOL_ARGS", args.to_string())
            .env("VMCP_TOOL_ENV", Value::Object(env_dict).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VmcpError::ToolCrash { tool: def.name.clone(), detail: format!("failed to spawn interpreter: {e}") })?;

        if let Some(mut stdin) = child.stdin.take() {
            let source = def.source.clone();
            let _ = stdin.write_all(source.as_bytes()).await;
        }

        let timeout = self.timeout.min(ctx.time_remaining());
        let wait = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| VmcpError::ToolCrash {
                tool: def.name.clone(),
                detail: format!("failed to wait on interpreter: {e}"),
            }),
            _ = tokio::time::sleep(timeout) => {
                return Err(VmcpError::ToolTimeout { tool: def.name.clone() });
            }
            _ = ctx.cancellation.cancelled() => {
                return Err(VmcpError::ToolTimeout { tool: def.name.clone() });
            }
        };

        let output = wait?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VmcpError::ToolCrash {
                tool: def.name.clone(),
                detail: stderr.chars().take(500).collect(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim()).map_err(|e| VmcpError::ToolBadOutput {
            tool: def.name.clone(),
            detail: format!("stdout was not valid JSON: {e}"),
        })?;

        Ok(CallToolResult {
            content: vec![ContentPart::Text { text: vmcp_template::render_value(&parsed) }],
            is_error: false,
        })
    }
}
