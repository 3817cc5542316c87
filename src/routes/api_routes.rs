use askama::Template;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::errors::AppError;
use crate::models::Attachment;
use crate::routes::chat_routes::{render, MessagesFragment};
use crate::service::chat_service::ChatService;

// ── Form input ────────────────────────────────────────────────────────────────

pub struct ChatForm {
    pub prompt: String,
    pub image: Option<Attachment>,
}

impl ChatForm {
    /// Reads the `prompt` and optional `image` fields. Browsers send an empty
    /// `image` part when no file was picked; that counts as no attachment.
    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, AppError> {
        let mut prompt = String::new();
        let mut image = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(multipart_error)?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "prompt" => {
                    prompt = field
                        .text()
                        .await
                        .map_err(multipart_error)?;
                }
                "image" => {
                    let file_name = field.file_name().unwrap_or("image").to_string();
                    let mime_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(multipart_error)?;
                    if !bytes.is_empty() {
                        image = Some(Attachment::new(file_name, mime_type, bytes.to_vec())?);
                    }
                }
                other => warn!("Ignoring unexpected form field '{other}'"),
            }
        }

        Ok(Self { prompt, image })
    }
}

/// A body cut off by `DefaultBodyLimit` reports 413; anything else is a
/// malformed upload.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge { reason: e.body_text() }
    } else {
        AppError::invalid_attachment(e.body_text())
    }
}

#[derive(Template)]
#[template(path = "error_fragment.html")]
struct ErrorFragmentTemplate {
    error_message: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST `/chat/messages` — accepts multipart form data, returns the user
/// message and the loading placeholder as HTML fragments for HTMX
pub async fn send_message_handler(
    State(svc): State<ChatService>,
    mut multipart: Multipart,
) -> Response {
    let form = match ChatForm::from_multipart(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match svc.submit(&form.prompt, form.image) {
        Ok(accepted) => render(MessagesFragment::of([
            &accepted.user_message,
            &accepted.placeholder,
        ])),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/messages` — REST: the whole conversation as JSON
pub async fn list_messages_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    Json(svc.messages())
}

/// GET `/api/messages/:id` — REST: a single message
pub async fn get_message_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
) -> Response {
    match svc.message(&id) {
        Ok(message) => Json(message).into_response(),
        Err(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET `/api/session` — REST: busy flag, message count, credential presence
pub async fn session_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    Json(svc.status())
}

// ── Helper ────────────────────────────────────────────────────────────────────

fn error_response(err: &AppError) -> Response {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_too_large() {
        StatusCode::PAYLOAD_TOO_LARGE
    } else if err.is_busy() {
        StatusCode::CONFLICT
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let tmpl = ErrorFragmentTemplate { error_message: err.to_string() };
    match tmpl.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(_) => (status, err.to_string()).into_response(),
    }
}
