//! Provider adapter implementations.

pub mod gemini;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};

use crate::{Credentials, ImagePayload, MediaKind, ProviderError, Result};

/// Default per-request timeout for hosted vision calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cap on generated tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Longest server-suggested back-off we are willing to honour.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// The hosted providers dexr knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini `generateContent`.
    #[serde(rename = "gemini")]
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Gemini];

    /// Stable identifier used in configuration and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "OpenAI"),
            ProviderKind::Gemini => write!(f, "Gemini"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open-ai" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" | "google gemini" | "google-gemini" => Ok(ProviderKind::Gemini),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Raw text answer from a hosted model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Model output, untouched.
    pub text: String,
    /// Why generation stopped, as reported by the provider.
    pub finish_reason: Option<String>,
}

impl RawResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }

    /// Whether the provider cut the output short because of the token limit.
    pub fn is_truncated(&self) -> bool {
        matches!(
            self.finish_reason.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("length") | Some("max_tokens")
        )
    }
}

/// Contract shared by every hosted vision model adapter.
///
/// Adapters do not retry. They report failures through [`ProviderError`] so
/// the caller can tell transient failures from permanent ones.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Which provider this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Media kinds the provider accepts without conversion.
    fn accepted_media(&self) -> &'static [MediaKind] {
        &MediaKind::ALL
    }

    /// Send one image plus instructions to `model` and return its text output.
    async fn submit(
        &self,
        image: &ImagePayload,
        prompt: &str,
        model: &str,
        credentials: &Credentials,
    ) -> Result<RawResponse>;
}

/// The closed set of hosted adapters.
#[derive(Debug, Clone)]
pub enum HostedProvider {
    OpenAi(openai::OpenAiProvider),
    Gemini(gemini::GeminiProvider),
}

impl HostedProvider {
    /// Create the adapter for `kind` with default endpoint and limits.
    pub fn new(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => HostedProvider::OpenAi(openai::OpenAiProvider::new()),
            ProviderKind::Gemini => HostedProvider::Gemini(gemini::GeminiProvider::new()),
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        match self {
            HostedProvider::OpenAi(p) => HostedProvider::OpenAi(p.with_base_url(base_url)),
            HostedProvider::Gemini(p) => HostedProvider::Gemini(p.with_base_url(base_url)),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match self {
            HostedProvider::OpenAi(p) => HostedProvider::OpenAi(p.with_timeout(timeout)),
            HostedProvider::Gemini(p) => HostedProvider::Gemini(p.with_timeout(timeout)),
        }
    }

    /// Set the generated token cap.
    pub fn with_max_output_tokens(self, max_output_tokens: u32) -> Self {
        match self {
            HostedProvider::OpenAi(p) => {
                HostedProvider::OpenAi(p.with_max_output_tokens(max_output_tokens))
            }
            HostedProvider::Gemini(p) => {
                HostedProvider::Gemini(p.with_max_output_tokens(max_output_tokens))
            }
        }
    }
}

#[async_trait]
impl VisionProvider for HostedProvider {
    fn kind(&self) -> ProviderKind {
        match self {
            HostedProvider::OpenAi(p) => p.kind(),
            HostedProvider::Gemini(p) => p.kind(),
        }
    }

    fn accepted_media(&self) -> &'static [MediaKind] {
        match self {
            HostedProvider::OpenAi(p) => p.accepted_media(),
            HostedProvider::Gemini(p) => p.accepted_media(),
        }
    }

    async fn submit(
        &self,
        image: &ImagePayload,
        prompt: &str,
        model: &str,
        credentials: &Credentials,
    ) -> Result<RawResponse> {
        match self {
            HostedProvider::OpenAi(p) => p.submit(image, prompt, model, credentials).await,
            HostedProvider::Gemini(p) => p.submit(image, prompt, model, credentials).await,
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug)]
pub(crate) struct HttpReply {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Build the shared HTTP client.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("dexr/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Send a request and read the whole body, mapping transport failures.
pub(crate) async fn send(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<HttpReply> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| transport_error(provider, timeout, e))?;

    let status = response.status().as_u16();
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, timeout, e))?;

    Ok(HttpReply {
        status,
        retry_after,
        body,
    })
}

fn transport_error(provider: ProviderKind, timeout: Duration, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { provider, timeout }
    } else {
        ProviderError::Transport {
            provider,
            message: err.to_string(),
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// Map a non-success status to an error, provider quirks aside.
pub(crate) fn classify_status(
    provider: ProviderKind,
    model: &str,
    reply: &HttpReply,
    message: String,
    timeout: Duration,
) -> ProviderError {
    match reply.status {
        401 | 403 => ProviderError::Auth { provider, message },
        404 => ProviderError::UnknownModel {
            provider,
            model: model.to_string(),
            message,
        },
        408 | 504 => ProviderError::Timeout { provider, timeout },
        429 => ProviderError::RateLimited {
            provider,
            retry_after: reply.retry_after,
            message,
        },
        500..=599 => ProviderError::Unavailable {
            provider,
            status: reply.status,
            message,
        },
        _ => ProviderError::InvalidRequest { provider, message },
    }
}

/// Shorten an unparseable error body for inclusion in a message.
pub(crate) fn body_excerpt(body: &str) -> String {
    const LIMIT: usize = 300;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16) -> HttpReply {
        HttpReply {
            status,
            retry_after: Some(Duration::from_secs(3)),
            body: String::new(),
        }
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!("Google Gemini".parse::<ProviderKind>(), Ok(ProviderKind::Gemini));
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let kind: ProviderKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some("600")), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_classify_status() {
        let p = ProviderKind::OpenAi;
        let t = DEFAULT_TIMEOUT;

        assert!(classify_status(p, "m", &reply(401), String::new(), t).is_auth());
        assert!(matches!(
            classify_status(p, "m", &reply(404), String::new(), t),
            ProviderError::UnknownModel { .. }
        ));
        assert_eq!(
            classify_status(p, "m", &reply(429), String::new(), t).retry_after(),
            Some(Duration::from_secs(3))
        );
        assert!(classify_status(p, "m", &reply(503), String::new(), t).is_transient());
        assert!(classify_status(p, "m", &reply(504), String::new(), t).is_transient());
        assert!(!classify_status(p, "m", &reply(400), String::new(), t).is_transient());
    }

    #[test]
    fn test_accepted_media_per_provider() {
        let openai = HostedProvider::new(ProviderKind::OpenAi);
        let gemini = HostedProvider::new(ProviderKind::Gemini);

        assert!(openai.accepted_media().contains(&MediaKind::Gif));
        assert!(!gemini.accepted_media().contains(&MediaKind::Gif));
        for provider in [&openai, &gemini] {
            assert!(provider.accepted_media().contains(&MediaKind::Pdf));
            assert!(!provider.accepted_media().contains(&MediaKind::Bmp));
        }
    }

    #[test]
    fn test_truncation_flag() {
        let mut raw = RawResponse::new("{\"a\":");
        raw.finish_reason = Some("length".to_string());
        assert!(raw.is_truncated());
        raw.finish_reason = Some("MAX_TOKENS".to_string());
        assert!(raw.is_truncated());
        raw.finish_reason = Some("stop".to_string());
        assert!(!raw.is_truncated());
    }
}
