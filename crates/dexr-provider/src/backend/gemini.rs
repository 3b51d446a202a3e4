//! Google Gemini `generateContent` adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TIMEOUT, HttpReply, ProviderKind, RawResponse,
    VisionProvider, body_excerpt, classify_status, http_client, send,
};
use crate::{Credentials, ImagePayload, MediaKind, ProviderError, Result};

/// Default Generative Language API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const ACCEPTED: &[MediaKind] = &[MediaKind::Png, MediaKind::Jpeg, MediaKind::Webp, MediaKind::Pdf];

/// Adapter for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl ApiError {
    fn has_reason(&self, reason: &str) -> bool {
        self.details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some(reason))
    }
}

impl GeminiProvider {
    /// Create an adapter pointing at the public Gemini endpoint.
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

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

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
                provider: ProviderKind::Gemini,
                message: format!("cannot convert {} payload: {}", image.kind(), e),
            })?;

        let body = build_request(&image, prompt, self.max_output_tokens);

        debug!(
            model,
            media = %image.kind(),
            bytes = image.bytes().len(),
            "Submitting to Gemini"
        );

        // Key goes in a header so it never shows up in logged URLs.
        let request = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", credentials.expose())
            .json(&body);

        let reply = send(ProviderKind::Gemini, request, self.timeout).await?;
        decode_reply(model, &reply, self.timeout)
    }
}

fn build_request(image: &ImagePayload, prompt: &str, max_output_tokens: u32) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: prompt.to_string(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.kind().mime_type().to_string(),
                        data: image.to_base64(),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            max_output_tokens,
        },
    }
}

fn decode_reply(model: &str, reply: &HttpReply, timeout: Duration) -> Result<RawResponse> {
    let provider = ProviderKind::Gemini;

    if !(200..300).contains(&reply.status) {
        return Err(classify_error(model, reply, timeout));
    }

    if reply.body.trim().is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider,
            reason: None,
        });
    }

    let response: GenerateResponse =
        serde_json::from_str(&reply.body).map_err(|e| ProviderError::Decode {
            provider,
            message: e.to_string(),
        })?;

    let block_reason = response.prompt_feedback.and_then(|f| f.block_reason);

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::EmptyResponse {
            provider,
            reason: block_reason.or_else(|| Some("no candidates".to_string())),
        });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider,
            reason: candidate.finish_reason.or(block_reason),
        });
    }

    Ok(RawResponse {
        text,
        finish_reason: candidate.finish_reason,
    })
}

fn classify_error(model: &str, reply: &HttpReply, timeout: Duration) -> ProviderError {
    let provider = ProviderKind::Gemini;

    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&reply.body) else {
        return classify_status(provider, model, reply, body_excerpt(&reply.body), timeout);
    };
    let error = envelope.error;

    // Gemini answers 400 INVALID_ARGUMENT for a bad key.
    if error.has_reason("API_KEY_INVALID") || error.message.contains("API key not valid") {
        return ProviderError::Auth {
            provider,
            message: error.message,
        };
    }

    match error.status.as_deref() {
        Some("RESOURCE_EXHAUSTED") => ProviderError::RateLimited {
            provider,
            retry_after: reply.retry_after,
            message: error.message,
        },
        Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => ProviderError::Auth {
            provider,
            message: error.message,
        },
        Some("NOT_FOUND") => ProviderError::UnknownModel {
            provider,
            model: model.to_string(),
            message: error.message,
        },
        _ => classify_status(provider, model, reply, error.message, timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reply(status: u16, body: &str) -> HttpReply {
        HttpReply {
            status,
            retry_after: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_request_shape() {
        let image = ImagePayload::new(vec![1, 2, 3], MediaKind::Png, "r.png");
        let json = serde_json::to_value(build_request(&image, "extract", 256)).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "extract");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "AQID");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let provider = GeminiProvider::new().with_base_url("http://localhost:9000/");
        assert_eq!(
            provider.endpoint("models/gemini-1.5-pro"),
            "http://localhost:9000/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_decode_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#;
        let raw = decode_reply("gemini-1.5-pro", &reply(200, body), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(raw.text, "{\"a\":1}");
        assert_eq!(raw.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_decode_blocked_prompt() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = decode_reply("gemini-1.5-pro", &reply(200, body), DEFAULT_TIMEOUT).unwrap_err();
        assert_eq!(
            err,
            ProviderError::EmptyResponse {
                provider: ProviderKind::Gemini,
                reason: Some("SAFETY".to_string()),
            }
        );
    }

    #[test]
    fn test_bad_key_is_auth() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        assert!(decode_reply("m", &reply(400, body), DEFAULT_TIMEOUT).unwrap_err().is_auth());
    }

    #[test]
    fn test_error_statuses() {
        let exhausted = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(decode_reply("m", &reply(429, exhausted), DEFAULT_TIMEOUT)
            .unwrap_err()
            .is_transient());

        let missing = r#"{"error":{"code":404,"message":"models/nope is not found","status":"NOT_FOUND"}}"#;
        assert!(matches!(
            decode_reply("nope", &reply(404, missing), DEFAULT_TIMEOUT).unwrap_err(),
            ProviderError::UnknownModel { .. }
        ));

        let overloaded = r#"{"error":{"code":503,"message":"The model is overloaded","status":"UNAVAILABLE"}}"#;
        assert!(decode_reply("m", &reply(503, overloaded), DEFAULT_TIMEOUT)
            .unwrap_err()
            .is_transient());
    }
}
