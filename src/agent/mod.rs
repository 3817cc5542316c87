pub mod gemini;

use futures_util::future::BoxFuture;

use crate::errors::AppError;
use crate::models::Attachment;

pub use gemini::GeminiImageClient;

/// Boundary to the hosted image model. Returns a displayable image URL.
pub trait ImageGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        image: Option<&'a Attachment>,
    ) -> BoxFuture<'a, Result<String, AppError>>;

    /// Whether a credential is present; used for status reporting only.
    fn is_configured(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub mod stub {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::BoxFuture;

    use super::ImageGenerator;
    use crate::errors::AppError;
    use crate::models::Attachment;

    pub enum Reply {
        Image(&'static str),
        NoImage,
        Fail(&'static str),
        Panic,
    }

    /// Answers every call with a canned reply and counts invocations.
    pub struct StubGenerator {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        pub fn new(reply: Reply) -> Self {
            Self { reply, calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn crash() -> Result<String, AppError> {
        panic!("generator crashed mid-request")
    }

    impl ImageGenerator for StubGenerator {
        fn generate<'a>(
            &'a self,
            _prompt: &'a str,
            _image: Option<&'a Attachment>,
        ) -> BoxFuture<'a, Result<String, AppError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match self.reply {
                Reply::Image(url) => Ok(url.to_string()),
                Reply::NoImage => Err(AppError::NoImageData),
                Reply::Fail(message) => Err(AppError::remote(message)),
                Reply::Panic => return Box::pin(async { crash() }),
            };
            Box::pin(async move { result })
        }
    }
}
