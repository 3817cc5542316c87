use thiserror::Error;

pub const MISSING_API_KEY_MESSAGE: &str =
    "API Key is not configured. Please set the API_KEY environment variable.";
pub const NO_IMAGE_DATA_MESSAGE: &str = "No image data found in the AI's response.";
pub const INTERRUPTED_MESSAGE: &str = "Image generation was interrupted before it finished.";

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Configuration errors ─────────────────────────────────────────────────
    #[error("{}", MISSING_API_KEY_MESSAGE)]
    MissingApiKey,

    // ── Remote generation errors ─────────────────────────────────────────────
    #[error("{0}")]
    Transport(#[source] reqwest::Error),

    #[error("{message}")]
    Remote { message: String },

    #[error("{}", NO_IMAGE_DATA_MESSAGE)]
    NoImageData,

    #[error("{}", INTERRUPTED_MESSAGE)]
    Interrupted,

    // ── Admission / validation errors ────────────────────────────────────────
    #[error("An image is already being generated")]
    Busy,

    #[error("Enter a prompt or attach an image")]
    EmptySubmission,

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Invalid attachment: {reason}")]
    InvalidAttachment { reason: String },

    #[error("Upload is too large: {reason}")]
    UploadTooLarge { reason: String },

    // ── Conversation errors ──────────────────────────────────────────────────
    #[error("Message '{id}' not found")]
    MessageNotFound { id: String },

    #[error("Message '{id}' has already been resolved")]
    AlreadyResolved { id: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn remote(message: impl Into<String>) -> Self {
        AppError::Remote { message: message.into() }
    }

    pub fn invalid_attachment(reason: impl Into<String>) -> Self {
        AppError::InvalidAttachment { reason: reason.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::MessageNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptySubmission
                | AppError::FieldTooLong { .. }
                | AppError::InvalidAttachment { .. }
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AppError::Busy)
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, AppError::UploadTooLarge { .. })
    }
}
