use axum::{Json, extract::State, http::StatusCode, response::Html};
use tokio::sync::{Mutex, RwLock};

use crate::serial::SerialLink;
use crate::types::{CommandReply, CommandRequest, DeviceStatus, ErrorReply, ModeRequest};

/// Shared context handed to every handler and the status poller.
///
/// The mutex serializes access to the physical serial line; the status
/// record sits behind its own lock so readers always see a complete
/// snapshot.
pub struct AppState {
    pub link: Mutex<SerialLink>,
    pub status: RwLock<DeviceStatus>,
}

pub type SharedState = std::sync::Arc<AppState>;

impl AppState {
    pub fn new(link: SerialLink) -> Self {
        Self {
            link: Mutex::new(link),
            status: RwLock::new(DeviceStatus::default()),
        }
    }
}

async fn forward(state: &AppState, command: &str) -> Json<CommandReply> {
    let result = {
        let mut link = state.link.lock().await;
        link.send_command(command).await
    };
    match result {
        Ok(response) => Json(CommandReply {
            success: true,
            response,
        }),
        Err(e) => {
            tracing::warn!(command, error = %e, "command forward failed");
            Json(CommandReply {
                success: false,
                response: e.to_string(),
            })
        }
    }
}

pub async fn command(
    State(state): State<SharedState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandReply>, (StatusCode, Json<ErrorReply>)> {
    let command = req.command.filter(|c| !c.is_empty()).ok_or((
        StatusCode::BAD_REQUEST,
        Json(ErrorReply::new("No command provided")),
    ))?;
    tracing::info!(command = %command, "forwarding command");
    Ok(forward(&state, &command).await)
}

pub async fn mode(
    State(state): State<SharedState>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<CommandReply>, (StatusCode, Json<ErrorReply>)> {
    let mode = req.mode.filter(|m| !m.is_empty()).ok_or((
        StatusCode::BAD_REQUEST,
        Json(ErrorReply::new("No mode provided")),
    ))?;
    tracing::info!(mode = %mode, "switching device mode");
    Ok(forward(&state, &format!("mode {mode}")).await)
}

pub async fn status(State(state): State<SharedState>) -> Json<DeviceStatus> {
    Json(state.status.read().await.clone())
}

pub async fn index(State(state): State<SharedState>) -> Html<String> {
    let status = state.status.read().await.clone();
    Html(render_index(&status))
}

fn render_index(status: &DeviceStatus) -> String {
    let wifi = if status.wifi_connected {
        "connected"
    } else {
        "offline"
    };
    let polled = status
        .polled_at
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| "never".into());
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Marauder Bridge</title>
<style>
 body {{ font-family: sans-serif; margin: 2em; }}
 table {{ border-collapse: collapse; }}
 td, th {{ border: 1px solid #999; padding: 0.4em 0.8em; text-align: left; }}
</style>
</head>
<body>
<h1>Marauder Bridge</h1>
<table>
<tr><th>Mode</th><td id="mode">{mode}</td></tr>
<tr><th>BTC price</th><td id="btc_price">{symbol}{price:.2}</td></tr>
<tr><th>24h change</th><td id="btc_change">{change:+.2}%</td></tr>
<tr><th>Wi-Fi</th><td id="wifi">{wifi}</td></tr>
<tr><th>Device uptime</th><td id="last_update">{uptime}s</td></tr>
<tr><th>Last poll</th><td id="polled_at">{polled}</td></tr>
</table>
<script>
setInterval(async () => {{
  const s = await (await fetch('/api/status')).json();
  document.getElementById('mode').textContent = s.mode;
  document.getElementById('btc_price').textContent = s.btc_price.toFixed(2);
  document.getElementById('btc_change').textContent = s.btc_change.toFixed(2) + '%';
  document.getElementById('wifi').textContent = s.wifi_connected ? 'connected' : 'offline';
  document.getElementById('last_update').textContent = s.last_update + 's';
  document.getElementById('polled_at').textContent = s.polled_at ?? 'never';
}}, 5000);
</script>
</body>
</html>"#,
        mode = status.mode,
        symbol = status.currency_symbol(),
        price = status.btc_price,
        change = status.btc_change,
        wifi = wifi,
        uptime = status.last_update,
        polled = polled,
    )
}
