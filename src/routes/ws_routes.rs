use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::SessionEvent;
use crate::service::chat_service::ChatService;

/// GET `/ws/events` — upgrades to a WebSocket carrying conversation updates.
pub async fn ws_events_handler(
    ws: WebSocketUpgrade,
    State(svc): State<ChatService>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, svc))
}

/// Handles a single WebSocket connection.
///
/// Protocol (server → client only, JSON tagged by `type`):
/// 1. `{ "type": "snapshot", "messages": [...] }` once on connect
/// 2. `{ "type": "message_appended", "message": {...} }`
/// 3. `{ "type": "message_updated", "message": {...} }`
/// 4. `{ "type": "generation_finished" }`
async fn handle_socket(socket: WebSocket, svc: ChatService) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before taking the snapshot so no update falls in between.
    let mut events = svc.subscribe();
    let snapshot = SessionEvent::Snapshot { messages: svc.messages() };

    if send_event(&mut sender, &snapshot).await {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if !send_event(&mut sender, &event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged; skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    info!("WebSocket client disconnected");
}

/// Helper: serialize a `SessionEvent` and send it; false once the client is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, WsMessage>, event: &SessionEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize session event: {e}");
            true
        }
    }
}
