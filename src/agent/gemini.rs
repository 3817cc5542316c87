use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::ImageGenerator;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{data_url, Attachment};

const ERROR_BODY_LIMIT: usize = 512;
const FALLBACK_MIME_TYPE: &str = "image/png";

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Calls Gemini `generateContent` asking for image-only output.
/// One request per call: no retries and no timeout beyond reqwest's defaults.
#[derive(Clone)]
pub struct GeminiImageClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiImageClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn generate_image(
        &self,
        prompt: &str,
        image: Option<&Attachment>,
    ) -> Result<String, AppError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AppError::MissingApiKey);
        };

        let endpoint = self.endpoint();
        debug!(model = %self.model, with_image = image.is_some(), "Sending generateContent request");

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&build_request(prompt, image))
            .send()
            .await
            .map_err(|e| {
                // The URL carries the key as a query parameter.
                let e = e.without_url();
                error!("Gemini request failed ({endpoint}): {e}");
                AppError::Transport(e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(e.without_url()))?;
        if !status.is_success() {
            return Err(AppError::remote(service_error_message(status, &body)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::remote(format!("Gemini returned invalid JSON payload: {e}")))?;

        first_image_url(&parsed).ok_or(AppError::NoImageData)
    }
}

impl ImageGenerator for GeminiImageClient {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        image: Option<&'a Attachment>,
    ) -> BoxFuture<'a, Result<String, AppError>> {
        Box::pin(self.generate_image(prompt, image))
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// The image part (if any) goes first, then the text prompt.
fn build_request(prompt: &str, image: Option<&Attachment>) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = image {
        parts.push(Part {
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64_data(),
            }),
            ..Part::default()
        });
    }
    parts.push(Part { text: Some(prompt.to_string()), ..Part::default() });

    GenerateContentRequest {
        contents: vec![Content { role: Some("user".to_string()), parts }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE".to_string()],
        },
    }
}

/// First inline image in the first candidate, as a `data:` URL.
fn first_image_url(response: &GenerateContentResponse) -> Option<String> {
    let parts = response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .unwrap_or_default();

    parts.iter().find_map(|part| {
        let inline = part.inline_data.as_ref().filter(|inline| !inline.data.is_empty())?;
        let mime_type = if inline.mime_type.is_empty() {
            FALLBACK_MIME_TYPE
        } else {
            inline.mime_type.as_str()
        };
        Some(data_url(mime_type, &inline.data))
    })
}

fn service_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.trim().is_empty() => envelope.error.message,
        _ => format!(
            "Gemini request failed ({}): {}",
            status.as_u16(),
            truncate_text(body, ERROR_BODY_LIMIT)
        ),
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::errors::{MISSING_API_KEY_MESSAGE, NO_IMAGE_DATA_MESSAGE};

    #[derive(Clone)]
    struct Stub {
        status: HttpStatus,
        reply: Value,
        seen: Arc<Mutex<Vec<(String, Value)>>>,
    }

    async fn stub_handler(
        State(stub): State<Stub>,
        Query(query): Query<std::collections::HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> (HttpStatus, Json<Value>) {
        let key = query.get("key").cloned().unwrap_or_default();
        stub.seen.lock().unwrap().push((key, body));
        (stub.status, Json(stub.reply.clone()))
    }

    /// Serves `reply` for every generateContent call; returns the base URL.
    async fn spawn_stub(status: HttpStatus, reply: Value) -> (String, Arc<Mutex<Vec<(String, Value)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stub = Stub { status, reply, seen: seen.clone() };
        let app = Router::new()
            .route("/v1beta/models/{action}", post(stub_handler))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1beta"), seen)
    }

    fn client(api_base: &str, api_key: Option<&str>) -> GeminiImageClient {
        GeminiImageClient::new(&AppConfig {
            api_key: api_key.map(str::to_string),
            api_base: api_base.to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            port: 0,
            max_upload_bytes: 1024,
        })
    }

    fn image_reply() -> Value {
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here is your balloon." },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
                    ]
                }
            }]
        })
    }

    #[tokio::test]
    async fn returns_first_image_part_as_data_url() {
        let (base, seen) = spawn_stub(HttpStatus::OK, image_reply()).await;

        let url = client(&base, Some("secret"))
            .generate("a red balloon", None)
            .await
            .unwrap();

        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (key, body) = &seen[0];
        assert_eq!(key, "secret");
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["IMAGE"]));
        assert_eq!(body["contents"][0]["parts"], json!([{ "text": "a red balloon" }]));
    }

    #[tokio::test]
    async fn attachment_is_sent_inline_before_the_prompt() {
        let (base, seen) = spawn_stub(HttpStatus::OK, image_reply()).await;
        let attachment = Attachment::new("cat.jpg", "image/jpeg", b"jpg".to_vec()).unwrap();

        client(&base, Some("secret"))
            .generate("make it blue", Some(&attachment))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let parts = &seen[0].1["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "anBn");
        assert_eq!(parts[1]["text"], "make it blue");
    }

    #[tokio::test]
    async fn response_without_image_parts_is_no_image_data() {
        let reply = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't draw that." }] } }]
        });
        let (base, _) = spawn_stub(HttpStatus::OK, reply).await;

        let err = client(&base, Some("secret")).generate("a red balloon", None).await.unwrap_err();

        assert!(matches!(err, AppError::NoImageData));
        assert_eq!(err.to_string(), NO_IMAGE_DATA_MESSAGE);
    }

    #[tokio::test]
    async fn service_error_message_is_surfaced_verbatim() {
        let reply = json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        });
        let (base, _) = spawn_stub(HttpStatus::BAD_REQUEST, reply).await;

        let err = client(&base, Some("bad")).generate("a red balloon", None).await.unwrap_err();

        assert_eq!(err.to_string(), "API key not valid.");
    }

    #[tokio::test]
    async fn missing_key_fails_without_contacting_the_service() {
        let (base, seen) = spawn_stub(HttpStatus::OK, image_reply()).await;

        let err = client(&base, None).generate("a red balloon", None).await.unwrap_err();

        assert_eq!(err.to_string(), MISSING_API_KEY_MESSAGE);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn only_the_first_candidate_is_scanned() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "no image here" }] } },
                { "content": { "parts": [{ "inline_data": { "mime_type": "image/png", "data": "AAAA" } }] } }
            ]
        }))
        .unwrap();
        assert_eq!(first_image_url(&response), None);
    }

    #[test]
    fn snake_case_inline_data_is_accepted() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "inline_data": { "mime_type": "image/webp", "data": "AAAA" } }] } }
            ]
        }))
        .unwrap();
        assert_eq!(first_image_url(&response).as_deref(), Some("data:image/webp;base64,AAAA"));
    }

    #[test]
    fn unstructured_error_bodies_are_truncated() {
        let body = "x".repeat(600);
        let message = service_error_message(StatusCode::BAD_GATEWAY, &body);
        assert!(message.starts_with("Gemini request failed (502): "));
        assert!(message.ends_with('…'));
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        let mut gemini = client("https://example.test/v1beta", Some("k"));
        assert_eq!(
            gemini.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        gemini.model = "models/custom".to_string();
        assert_eq!(gemini.endpoint(), "https://example.test/v1beta/models/custom:generateContent");
    }
}
