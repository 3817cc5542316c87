pub mod api_routes;
pub mod chat_routes;
pub mod ws_routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::service::chat_service::ChatService;
use api_routes::{get_message_handler, list_messages_handler, send_message_handler, session_handler};
use chat_routes::{index_handler, message_fragment_handler, stylesheet_handler};
use ws_routes::ws_events_handler;

pub fn router(chat_service: ChatService, max_upload_bytes: usize) -> Router {
    Router::new()
        // Page routes
        .route("/", get(index_handler))
        .route("/static/style.css", get(stylesheet_handler))
        // HTMX fragment routes
        .route("/chat/messages", post(send_message_handler))
        .route("/chat/messages/{id}", get(message_fragment_handler))
        // REST / WebSocket
        .route("/api/messages", get(list_messages_handler))
        .route("/api/messages/{id}", get(get_message_handler))
        .route("/api/session", get(session_handler))
        .route("/ws/events", get(ws_events_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(chat_service)
}
