use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Name plus displayable URL of an image shown in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    pub created_at: DateTime<Utc>,
}

/// Reply slot for one generation request. Created loading, resolved once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMessage {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AiMessage {
    pub fn placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image_url: None,
            is_loading: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Moves the placeholder to its final state. Either `image_url` or
    /// `error` is set afterwards, never both.
    pub fn resolve(&mut self, outcome: Result<String, String>) -> Result<(), AppError> {
        if !self.is_loading {
            return Err(AppError::AlreadyResolved { id: self.id.clone() });
        }
        match outcome {
            Ok(url) => self.image_url = Some(url),
            Err(message) => self.error = Some(message),
        }
        self.is_loading = false;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sender", rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    Ai(AiMessage),
}

impl Message {
    pub fn user(text: String, image: Option<ImageRef>) -> Self {
        Message::User(UserMessage {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            image,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Message::User(m) => &m.id,
            Message::Ai(m) => &m.id,
        }
    }

    pub fn as_ai(&self) -> Option<&AiMessage> {
        match self {
            Message::Ai(m) => Some(m),
            Message::User(_) => None,
        }
    }
}

/// An uploaded image waiting to be sent along with a prompt.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AppError> {
        let mime_type = mime_type.into();
        if !mime_type.starts_with("image/") {
            return Err(AppError::invalid_attachment(format!(
                "expected an image, got '{mime_type}'"
            )));
        }
        if bytes.is_empty() {
            return Err(AppError::invalid_attachment("file is empty"));
        }
        Ok(Self { name: name.into(), mime_type, bytes })
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_image_ref(&self) -> ImageRef {
        ImageRef {
            name: self.name.clone(),
            url: data_url(&self.mime_type, &self.base64_data()),
        }
    }
}

pub fn data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Read-only snapshot of the session for `/api/session`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_generating: bool,
    pub message_count: usize,
    pub configured: bool,
}

/// Broadcast to WebSocket subscribers as the conversation changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Snapshot { messages: Vec<Message> },
    MessageAppended { message: Message },
    MessageUpdated { message: Message },
    GenerationFinished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_resolves_exactly_once() {
        let mut ai = AiMessage::placeholder();
        ai.resolve(Ok("data:image/png;base64,AAAA".into())).unwrap();
        assert!(!ai.is_loading);
        assert!(ai.error.is_none());

        let err = ai.resolve(Err("late".into())).unwrap_err();
        assert!(matches!(err, AppError::AlreadyResolved { .. }));
        assert_eq!(ai.image_url.as_deref(), Some("data:image/png;base64,AAAA"));
        assert!(ai.error.is_none());
    }

    #[test]
    fn messages_serialize_with_sender_tag() {
        let user = Message::user("a red balloon".into(), None);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["sender"], "user");
        assert_eq!(json["text"], "a red balloon");
        assert!(json.get("image").is_none());

        let ai = Message::Ai(AiMessage::placeholder());
        let json = serde_json::to_value(&ai).unwrap();
        assert_eq!(json["sender"], "ai");
        assert_eq!(json["isLoading"], true);
    }

    #[test]
    fn attachment_rejects_non_images() {
        let err = Attachment::new("notes.txt", "text/plain", vec![1, 2, 3]).unwrap_err();
        assert!(err.is_validation());
        let err = Attachment::new("empty.png", "image/png", Vec::new()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn attachment_preview_is_a_data_url() {
        let attachment = Attachment::new("cat.png", "image/png", b"png".to_vec()).unwrap();
        let image = attachment.to_image_ref();
        assert_eq!(image.name, "cat.png");
        assert_eq!(image.url, "data:image/png;base64,cG5n");
    }
}
