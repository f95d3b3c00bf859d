//! WebSocket surface forwarding [`AppEvent`]s to subscribers and accepting a
//! small command set, grounded on `gateway::ws::ws_handler`/`handle_socket`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Deserialize;

use crate::event_bus::EventBus;
use crate::model::WakeMode;

use super::routes::GatewayState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    ImmediateEvent {
        mode: String,
        text: String,
        #[serde(default)]
        agent_id: Option<String>,
    },
    Ping,
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    let bus = state.bus.clone();
    let mut rx = bus.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let Ok(payload) = serde_json::to_string(&ev) else { continue };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "ws handler lagged behind event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_command(&text, &state, &mut socket).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_client_command(raw: &str, state: &GatewayState, socket: &mut WebSocket) {
    let cmd: WsCommand = match serde_json::from_str(raw) {
        Ok(c) => c,
        Err(e) => {
            let err = serde_json::json!({ "type": "error", "error": format!("invalid command: {e}") });
            let _ = socket.send(Message::Text(err.to_string())).await;
            return;
        }
    };

    match cmd {
        WsCommand::ImmediateEvent { mode, text, agent_id } => {
            let wake_mode = if mode == "next-heartbeat" { WakeMode::NextHeartbeat } else { WakeMode::Now };
            match state.scheduler.emit_system_event(agent_id, text, wake_mode).await {
                Ok(run_id) => {
                    let ack = serde_json::json!({ "type": "event_ack", "run_id": run_id });
                    let _ = socket.send(Message::Text(ack.to_string())).await;
                }
                Err(e) => {
                    let err = serde_json::json!({ "type": "error", "error": e.to_string() });
                    let _ = socket.send(Message::Text(err.to_string())).await;
                }
            }
        }
        WsCommand::Ping => {
            let pong = serde_json::json!({ "type": "pong" });
            let _ = socket.send(Message::Text(pong.to_string())).await;
        }
    }
}
