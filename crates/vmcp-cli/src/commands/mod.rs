pub mod run;

use std::sync::Arc;

use vmcp_composer::Composer;
use vmcp_core::blob::InMemoryBlobStore;
use vmcp_core::usage::InMemoryUsageLog;
use vmcp_server::{AdminApi, AppState, VmcpServerConfig, VmcpStore};
use vmcp_tools::{HttpEngine, ScriptEngine};
use vmcp_upstream::UpstreamRegistry;

/// Assembles the Composer and its `AppState` the same way for `run` and
/// `serve-test` — both boot the identical stack, only the seeded store
/// state and bind address differ.
pub fn build_app_state(config: VmcpServerConfig) -> AppState {
    let registry = Arc::new(UpstreamRegistry::new());
    let script_engine = ScriptEngine::new(config.max_concurrent_scripts);
    let http_engine = HttpEngine::default();
    let blob_store = Arc::new(InMemoryBlobStore::default());
    let usage_log = Arc::new(InMemoryUsageLog::default());

    let composer = Arc::new(Composer::new(registry.clone(), script_engine, http_engine, blob_store, usage_log));
    let store = Arc::new(VmcpStore::new());
    let admin = Arc::new(AdminApi::new(registry, store.clone()));

    AppState::new(composer, store, admin, Arc::new(config))
}

/// Binds and serves the axum router until the process receives Ctrl+C,
/// mirroring the teacher's `serve` command's `axum::serve` + listener
/// setup in `cli/commands/serve.rs`.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    tracing::info!(addr = %bound, "vmcp server listening");

    let app = vmcp_server::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
