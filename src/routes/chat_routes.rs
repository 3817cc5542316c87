use askama::Template;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::models::Message;
use crate::service::chat_service::ChatService;

const STYLESHEET: &str = include_str!("../../static/style.css");

// ── Template structs ──────────────────────────────────────────────────────────

/// View model for a message, flattened for askama template use.
pub struct MessageView {
    pub id: String,
    pub is_user: bool,
    pub text: String,
    pub has_image: bool,
    pub image_name: String,
    pub image_url: String,
    pub is_loading: bool,
    pub has_error: bool,
    pub error: String,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        match m {
            Message::User(user) => Self {
                id: user.id.clone(),
                is_user: true,
                text: user.text.clone(),
                has_image: user.image.is_some(),
                image_name: user.image.as_ref().map(|i| i.name.clone()).unwrap_or_default(),
                image_url: user.image.as_ref().map(|i| i.url.clone()).unwrap_or_default(),
                is_loading: false,
                has_error: false,
                error: String::new(),
            },
            Message::Ai(ai) => Self {
                id: ai.id.clone(),
                is_user: false,
                text: String::new(),
                has_image: ai.image_url.is_some(),
                image_name: String::new(),
                image_url: ai.image_url.clone().unwrap_or_default(),
                is_loading: ai.is_loading,
                has_error: ai.error.is_some(),
                error: ai.error.clone().unwrap_or_default(),
            },
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    messages: Vec<MessageView>,
    is_generating: bool,
}

/// One or more message blocks, swapped into `#messages` by HTMX.
#[derive(Template)]
#[template(path = "messages.html")]
pub struct MessagesFragment {
    pub messages: Vec<MessageView>,
}

impl MessagesFragment {
    pub fn of<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Self {
        Self { messages: messages.into_iter().map(MessageView::from).collect() }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET `/` — full chat page
pub async fn index_handler(State(svc): State<ChatService>) -> impl IntoResponse {
    let messages = svc.messages();
    render(IndexTemplate {
        messages: messages.iter().map(MessageView::from).collect(),
        is_generating: svc.is_generating(),
    })
}

/// GET `/chat/messages/:id` — one message block; loading placeholders poll this
pub async fn message_fragment_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
) -> Response {
    match svc.message(&id) {
        Ok(message) => render(MessagesFragment::of([&message])),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// GET `/static/style.css`
pub async fn stylesheet_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], STYLESHEET)
}

// ── Helper ────────────────────────────────────────────────────────────────────

pub fn render(tmpl: impl Template) -> Response {
    match tmpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Template error: {e}"),
        )
            .into_response(),
    }
}
