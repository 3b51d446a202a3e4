//! Configuration structures for the extraction pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dexr_provider::ProviderKind;
use serde::{Deserialize, Serialize};

/// Main configuration for dexr.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DexrConfig {
    /// Hosted provider settings and model catalogues.
    pub providers: ProvidersConfig,

    /// Retry policy for transient provider failures.
    pub retry: RetryConfig,

    /// Record storage configuration.
    pub store: StoreConfig,
}

/// Settings for every supported provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI chat completions.
    pub openai: ProviderSettings,

    /// Google Gemini.
    pub gemini: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderSettings::openai(),
            gemini: ProviderSettings::gemini(),
        }
    }
}

/// Endpoint, limits and model catalogue for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Override for the API base URL (None = public endpoint).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when the caller does not name one.
    pub default_model: String,

    /// Model used for the auto-detect sub-request (None = request model).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_model: Option<String>,

    /// Models callers may choose from.
    pub models: Vec<String>,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Cap on generated tokens per call.
    pub max_output_tokens: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            default_model: String::new(),
            classification_model: None,
            models: Vec::new(),
            timeout_secs: 60,
            max_output_tokens: 4096,
        }
    }
}

impl ProviderSettings {
    /// Stock OpenAI catalogue.
    pub fn openai() -> Self {
        Self {
            default_model: "gpt-4o".to_string(),
            classification_model: Some("gpt-4o-mini".to_string()),
            models: vec![
                "gpt-4o".to_string(),
                "gpt-4o-mini".to_string(),
                "gpt-4-vision-preview".to_string(),
            ],
            ..Self::default()
        }
    }

    /// Stock Gemini catalogue.
    pub fn gemini() -> Self {
        Self {
            default_model: "gemini-1.5-pro".to_string(),
            classification_model: Some("gemini-1.5-flash".to_string()),
            models: vec![
                "gemini-1.5-pro".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-pro-vision".to_string(),
            ],
            ..Self::default()
        }
    }

    /// Whether `model` is in the catalogue.
    pub fn supports(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Model to use for classifying a document submitted with `request_model`.
    pub fn classifier_for<'a>(&'a self, request_model: &'a str) -> &'a str {
        self.classification_model.as_deref().unwrap_or(request_model)
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds; doubles each time.
    pub base_delay_ms: u64,

    /// Upper bound on a computed delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl RetryConfig {
    /// Wait before retry number `attempt` (0-based).
    ///
    /// A server-suggested delay wins over the computed one.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay;
        }
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Record storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding saved records (None = platform data dir).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl DexrConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Settings for one provider.
    pub fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.providers.openai,
            ProviderKind::Gemini => &self.providers.gemini,
        }
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        for kind in ProviderKind::ALL {
            let settings = self.provider(kind);
            if settings.models.is_empty() {
                return Err(format!("no models configured for {kind}"));
            }
            if !settings.supports(&settings.default_model) {
                return Err(format!(
                    "default model `{}` is not in the {kind} catalogue",
                    settings.default_model
                ));
            }
            if settings.timeout_secs == 0 {
                return Err(format!("timeout for {kind} must be positive"));
            }
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err("retry.max_delay_ms is smaller than retry.base_delay_ms".to_string());
        }
        Ok(())
    }
}
