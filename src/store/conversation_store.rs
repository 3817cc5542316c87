use tracing::error;

use crate::errors::AppError;
use crate::models::Message;

/// Append-only, in-memory message log. Insertion order is display order.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn find_all(&self) -> &[Message] {
        &self.messages
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn append(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Settles the loading placeholder `id` with an image URL or error text.
    pub fn resolve_placeholder(
        &mut self,
        id: &str,
        outcome: Result<String, String>,
    ) -> Result<&Message, AppError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id() == id)
            .ok_or_else(|| AppError::MessageNotFound { id: id.to_string() })?;

        match &mut *message {
            Message::Ai(ai) => ai.resolve(outcome).map_err(|e| {
                error!("Refusing to resolve placeholder {id} twice");
                e
            })?,
            Message::User(_) => {
                return Err(AppError::Unexpected(format!("message {id} is not an AI reply")));
            }
        }
        Ok(message)
    }
}
