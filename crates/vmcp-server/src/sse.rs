//! SSE transport for one vMCP's streamable endpoint (spec §6: "SSE
//! transport uses the standard `event: message\ndata: <json>\n\n` framing
//! with heartbeat events"), grounded on `turbomcp-transport`'s
//! `sse_handler` but subscribing to the per-vMCP broadcast channel instead
//! of one global one.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub async fn sse_handler(
    State(state): State<AppState>,
    Path(vmcp_name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, axum::http::StatusCode> {
    let Some(record) = state.store.get_by_name(&vmcp_name) else {
        return Err(axum::http::StatusCode::NOT_FOUND);
    };

    debug!(vmcp = %vmcp_name, "SSE connection established");
    let mut receiver = state.subscribe(&record.vmcp.id);

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(message) => yield Ok(Event::default().event("message").data(message)),
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(vmcp = %vmcp_name, skipped, "SSE client lagged behind the broadcast channel");
                    yield Ok(Event::default().event("error").data(
                        serde_json::json!({ "code": "LAGGED", "skipped": skipped }).to_string(),
                    ));
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL)))
}
