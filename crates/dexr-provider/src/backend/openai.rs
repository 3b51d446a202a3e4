//! OpenAI chat completions adapter (vision-capable GPT models).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TIMEOUT, HttpReply, ProviderKind, RawResponse,
    VisionProvider, body_excerpt, classify_status, http_client, send,
};
use crate::{Credentials, ImagePayload, MediaKind, ProviderError, Result};

/// Default OpenAI API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const ACCEPTED: &[MediaKind] = &[
    MediaKind::Png,
    MediaKind::Jpeg,
    MediaKind::Gif,
    MediaKind::Webp,
    MediaKind::Pdf,
];

/// Adapter for the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAiProvider {
    /// Create an adapter pointing at the public OpenAI endpoint.
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Point at a different (OpenAI-compatible) endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn accepted_media(&self) -> &'static [MediaKind] {
        ACCEPTED
    }

    async fn submit(
        &self,
        image: &ImagePayload,
        prompt: &str,
        model: &str,
        credentials: &Credentials,
    ) -> Result<RawResponse> {
        let image = image
            .normalized_for(self.accepted_media())
            .map_err(|e| ProviderError::InvalidRequest {
                provider: ProviderKind::OpenAi,
                message: format!("cannot convert {} payload: {}", image.kind(), e),
            })?;

        let body = build_request(&image, prompt, model, self.max_output_tokens);

        debug!(
            model,
            media = %image.kind(),
            bytes = image.bytes().len(),
            "Submitting to OpenAI"
        );

        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(credentials.expose())
            .json(&body);

        let reply = send(ProviderKind::OpenAi, request, self.timeout).await?;
        decode_reply(model, &reply, self.timeout)
    }
}

fn build_request<'a>(
    image: &ImagePayload,
    prompt: &str,
    model: &'a str,
    max_tokens: u32,
) -> ChatRequest<'a> {
    let attachment = match image.kind() {
        MediaKind::Pdf => ContentPart::File {
            file: FileData {
                filename: if image.file_name().is_empty() {
                    "document.pdf".to_string()
                } else {
                    image.file_name().to_string()
                },
                file_data: image.data_url(),
            },
        },
        _ => ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
            },
        },
    };

    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: prompt.to_string(),
                },
                attachment,
            ],
        }],
        max_tokens,
        temperature: 0.0,
    }
}

fn decode_reply(model: &str, reply: &HttpReply, timeout: Duration) -> Result<RawResponse> {
    let provider = ProviderKind::OpenAi;

    if !(200..300).contains(&reply.status) {
        return Err(classify_error(model, reply, timeout));
    }

    if reply.body.trim().is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider,
            reason: None,
        });
    }

    let response: ChatResponse =
        serde_json::from_str(&reply.body).map_err(|e| ProviderError::Decode {
            provider,
            message: e.to_string(),
        })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse {
            provider,
            reason: Some("no choices".to_string()),
        })?;

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(RawResponse {
            text,
            finish_reason: choice.finish_reason,
        }),
        _ => Err(ProviderError::EmptyResponse {
            provider,
            reason: choice.finish_reason,
        }),
    }
}

fn classify_error(model: &str, reply: &HttpReply, timeout: Duration) -> ProviderError {
    let provider = ProviderKind::OpenAi;

    let (message, code) = match serde_json::from_str::<ErrorEnvelope>(&reply.body) {
        Ok(envelope) => (
            envelope.error.message,
            envelope
                .error
                .code
                .and_then(|c| c.as_str().map(str::to_string)),
        ),
        Err(_) => (body_excerpt(&reply.body), None),
    };

    let lowered = message.to_lowercase();
    let model_missing = code.as_deref() == Some("model_not_found")
        || (lowered.contains("model") && lowered.contains("does not exist"));

    if model_missing {
        return ProviderError::UnknownModel {
            provider,
            model: model.to_string(),
            message,
        };
    }

    if code.as_deref() == Some("insufficient_quota") {
        return ProviderError::RateLimited {
            provider,
            retry_after: reply.retry_after,
            message,
        };
    }

    classify_status(provider, model, reply, message, timeout)
}
