//! Background status poll loop.

use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::handlers::{AppState, SharedState};

/// Spawn the poll loop. Each cycle sleeps `interval` after the poll
/// completes, so the cadence drifts by the poll's own latency rather than
/// ticking at a fixed rate. The returned handle is the cancellation point;
/// `main` aborts it at shutdown.
pub fn spawn(state: SharedState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            poll_once(&state).await;
            tokio::time::sleep(interval).await;
        }
    })
}

/// Ask the device for `status` once and merge the reply into the cache.
///
/// Anything that is not a JSON object is logged and dropped; the previous
/// status stays in place.
pub async fn poll_once(state: &AppState) {
    let reply = {
        let mut link = state.link.lock().await;
        link.send_command("status").await
    };

    let raw = match reply {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "status poll failed");
            return;
        }
    };

    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(fields)) => {
            let mut status = state.status.write().await;
            status.merge(&fields);
            status.polled_at = Some(chrono::Utc::now());
            tracing::debug!(mode = %status.mode, "device status updated");
        }
        Ok(other) => {
            tracing::warn!(reply = %other, "status reply is not a JSON object");
        }
        Err(e) => {
            tracing::warn!(reply = %raw.trim(), error = %e, "failed to parse status reply");
        }
    }
}
