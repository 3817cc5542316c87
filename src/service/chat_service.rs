use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::agent::ImageGenerator;
use crate::errors::AppError;
use crate::models::{AiMessage, Attachment, Message, SessionEvent, SessionStatus};
use crate::store::conversation_store::ConversationStore;

const MAX_PROMPT_LENGTH: usize = 8000;
const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct Session {
    store: ConversationStore,
    is_generating: bool,
}

/// Owns the conversation and admits at most one generation at a time.
#[derive(Clone)]
pub struct ChatService {
    session: Arc<Mutex<Session>>,
    generator: Arc<dyn ImageGenerator>,
    events: broadcast::Sender<SessionEvent>,
}

/// Snapshots of the two messages appended for an accepted submission.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub user_message: Message,
    pub placeholder: Message,
}

/// An admitted submission. Holds the busy slot until it is dropped.
pub struct Ticket {
    pub accepted: Accepted,
    prompt: String,
    attachment: Option<Attachment>,
    _slot: BusySlot,
}

/// Releases the busy flag when dropped. A placeholder still loading at that
/// point (cancelled task, panicking generator) is settled with an error.
struct BusySlot {
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<SessionEvent>,
    placeholder_id: String,
}

impl Drop for BusySlot {
    fn drop(&mut self) {
        let mut session = lock(&self.session);
        let still_loading = session
            .store
            .find_by_id(&self.placeholder_id)
            .and_then(Message::as_ai)
            .is_some_and(|ai| ai.is_loading);
        let interrupted = if still_loading {
            session
                .store
                .resolve_placeholder(&self.placeholder_id, Err(AppError::Interrupted.to_string()))
                .ok()
                .cloned()
        } else {
            None
        };
        session.is_generating = false;
        drop(session);

        if let Some(message) = interrupted {
            warn!(placeholder_id = %self.placeholder_id, "Generation interrupted");
            let _ = self.events.send(SessionEvent::MessageUpdated { message });
        }
        let _ = self.events.send(SessionEvent::GenerationFinished);
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatService {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session: Arc::new(Mutex::new(Session::default())),
            generator,
            events,
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.session).store.find_all().to_vec()
    }

    pub fn message(&self, id: &str) -> Result<Message, AppError> {
        lock(&self.session)
            .store
            .find_by_id(id)
            .cloned()
            .ok_or_else(|| AppError::MessageNotFound { id: id.to_string() })
    }

    pub fn is_generating(&self) -> bool {
        lock(&self.session).is_generating
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            is_generating: self.is_generating(),
            message_count: lock(&self.session).store.len(),
            configured: self.generator.is_configured(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Admission step: on success the user message and a loading placeholder
    /// are appended and the session is marked busy. Rejections leave the
    /// conversation untouched.
    pub fn begin(&self, prompt: &str, attachment: Option<Attachment>) -> Result<Ticket, AppError> {
        let prompt = prompt.trim();

        let mut session = lock(&self.session);
        if session.is_generating {
            return Err(AppError::Busy);
        }
        if prompt.is_empty() && attachment.is_none() {
            return Err(AppError::EmptySubmission);
        }
        let prompt_length = prompt.chars().count();
        if prompt_length > MAX_PROMPT_LENGTH {
            return Err(AppError::FieldTooLong {
                field_name: "prompt".to_string(),
                max_length: MAX_PROMPT_LENGTH,
                actual_length: prompt_length,
            });
        }

        let user_message = Message::user(
            prompt.to_string(),
            attachment.as_ref().map(Attachment::to_image_ref),
        );
        let placeholder = Message::Ai(AiMessage::placeholder());
        session.store.append(user_message.clone());
        session.store.append(placeholder.clone());
        session.is_generating = true;
        drop(session);

        info!(
            placeholder_id = placeholder.id(),
            with_image = attachment.is_some(),
            "Accepted generation request"
        );
        let _ = self.events.send(SessionEvent::MessageAppended { message: user_message.clone() });
        let _ = self.events.send(SessionEvent::MessageAppended { message: placeholder.clone() });

        let placeholder_id = placeholder.id().to_string();
        Ok(Ticket {
            accepted: Accepted { user_message, placeholder },
            prompt: prompt.to_string(),
            attachment,
            _slot: BusySlot {
                session: self.session.clone(),
                events: self.events.clone(),
                placeholder_id,
            },
        })
    }

    /// Runs the remote call for `ticket` and settles its placeholder.
    /// The busy slot is released once the placeholder has been updated.
    pub async fn complete(&self, ticket: Ticket) {
        let Ticket { accepted, prompt, attachment, _slot } = ticket;
        let placeholder_id = accepted.placeholder.id();

        let outcome = self
            .generator
            .generate(&prompt, attachment.as_ref())
            .await
            .map_err(|e| {
                error!("Error generating or editing image: {e}");
                e.to_string()
            });

        let updated = lock(&self.session)
            .store
            .resolve_placeholder(placeholder_id, outcome)
            .cloned();

        match updated {
            Ok(message) => {
                let failed = message.as_ai().is_some_and(|ai| ai.error.is_some());
                info!(placeholder_id, failed, "Placeholder settled");
                let _ = self.events.send(SessionEvent::MessageUpdated { message });
            }
            Err(e) => warn!("Could not settle placeholder {placeholder_id}: {e}"),
        }
        drop(_slot);
    }

    /// `begin`, then finish the generation on a background task.
    pub fn submit(&self, prompt: &str, attachment: Option<Attachment>) -> Result<Accepted, AppError> {
        let ticket = self.begin(prompt, attachment)?;
        let accepted = ticket.accepted.clone();
        let svc = self.clone();
        tokio::spawn(async move { svc.complete(ticket).await });
        Ok(accepted)
    }
}
