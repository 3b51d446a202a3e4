//! The extraction orchestrator.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use dexr_provider::{
    Credentials, HostedProvider, ImagePayload, MediaKind, ProviderError, ProviderKind,
    RawResponse, VisionProvider,
};
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::classify::classify_answer;
use super::parser::ResponseParser;
use super::{Extraction, ExtractionRequest, Stage};
use crate::error::{ExtractError, Result, ValidationError};
use crate::models::config::{DexrConfig, ProviderSettings};
use crate::models::document::RequestedType;
use crate::models::record::ExtractionRecord;
use crate::prompt::PromptBuilder;
use crate::store::RecordStore;

/// Runs extraction requests against the configured providers.
///
/// The orchestrator holds only read-only configuration and adapters, so one
/// instance can serve concurrent calls.
pub struct Orchestrator {
    config: DexrConfig,
    providers: HashMap<ProviderKind, Arc<dyn VisionProvider>>,
}

/// A successful provider call and how many attempts it took.
struct Answer {
    raw: RawResponse,
    attempts: u32,
}

impl Orchestrator {
    /// Create an orchestrator with the hosted adapters for every provider.
    pub fn new(config: DexrConfig) -> Result<Self> {
        config.validate().map_err(ExtractError::Config)?;

        let providers = ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let adapter: Arc<dyn VisionProvider> =
                    Arc::new(hosted_adapter(kind, config.provider(kind)));
                (kind, adapter)
            })
            .collect();

        Ok(Self { config, providers })
    }

    /// Replace the adapter used for `kind`.
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn VisionProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    pub fn config(&self) -> &DexrConfig {
        &self.config
    }

    fn provider_for(&self, kind: ProviderKind) -> Result<&dyn VisionProvider> {
        self.providers
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| ExtractError::Config(format!("no adapter registered for {kind}")))
    }

    /// Extract entities from a document.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<Extraction> {
        self.extract_with_cancel(request, &CancelToken::new()).await
    }

    /// Extract entities, giving up as soon as `cancel` fires.
    pub async fn extract_with_cancel(
        &self,
        request: &ExtractionRequest,
        cancel: &CancelToken,
    ) -> Result<Extraction> {
        let kind = request.provider.kind;
        let model = request.provider.model.as_str();

        debug!(
            stage = %Stage::Pending,
            provider = %kind,
            model,
            requested = %request.requested_type,
            "Validating request"
        );
        let mut warnings = Vec::new();
        let image = self.validate(request, &mut warnings)?;

        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let provider = self.provider_for(kind)?;
        let settings = self.config.provider(kind);

        let doc_type = match request.requested_type {
            RequestedType::Known(doc_type) => doc_type,
            RequestedType::Auto => {
                let classifier = settings.classifier_for(model);
                let prompt = PromptBuilder::classification();
                let answer = self
                    .submit_with_retry(
                        provider,
                        settings,
                        &image,
                        &prompt,
                        classifier,
                        &request.credentials,
                        cancel,
                    )
                    .await?;
                let doc_type = classify_answer(&answer.raw.text);
                info!(
                    provider = %kind,
                    model = classifier,
                    document_type = %doc_type,
                    "Auto-detected document type"
                );
                doc_type
            }
        };
        debug!(stage = %Stage::TypeResolved, document_type = %doc_type);

        let template = PromptBuilder::build(doc_type);
        debug!(stage = %Stage::Submitted, provider = %kind, model, prompt_version = template.version);
        let answer = self
            .submit_with_retry(
                provider,
                settings,
                &image,
                &template.text,
                model,
                &request.credentials,
                cancel,
            )
            .await?;

        if answer.attempts > 1 {
            warnings.push(format!("provider succeeded after {} attempts", answer.attempts));
        }
        if answer.raw.is_truncated() {
            warnings.push(
                "model output was cut off at the token limit; entities may be incomplete"
                    .to_string(),
            );
        }

        let parsed = ResponseParser::parse(&answer.raw.text, doc_type);
        debug!(stage = %Stage::Parsed, status = ?parsed.status, keys = parsed.entities.len());
        warnings.extend(parsed.warnings);

        let record = ExtractionRecord::new(
            doc_type,
            parsed.entities,
            answer.raw.text,
            image.file_name(),
            model,
            kind,
            template.version,
        );

        info!(
            stage = %Stage::Complete,
            id = %record.id(),
            document_type = %doc_type,
            provider = %kind,
            model,
            status = ?parsed.status,
            "Extraction complete"
        );

        Ok(Extraction {
            record,
            parse: parsed.status,
            warnings,
        })
    }

    /// Extract entities and save the record.
    ///
    /// A cancelled extraction is never saved. If saving fails, the
    /// extraction is returned inside [`ExtractError::Persistence`].
    pub async fn extract_and_save(
        &self,
        request: &ExtractionRequest,
        store: &dyn RecordStore,
        cancel: &CancelToken,
    ) -> Result<Extraction> {
        let extraction = self.extract_with_cancel(request, cancel).await?;

        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        match store.save(&extraction.record).await {
            Ok(id) => {
                info!(%id, "Record saved");
                Ok(extraction)
            }
            Err(source) => {
                warn!(id = %extraction.record.id(), error = %source, "Failed to save record");
                Err(ExtractError::Persistence {
                    extraction: Box::new(extraction),
                    source,
                })
            }
        }
    }

    fn validate<'a>(
        &self,
        request: &'a ExtractionRequest,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<Cow<'a, ImagePayload>, ValidationError> {
        let image = &request.image;
        if image.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        let detected = MediaKind::sniff(image.bytes()).ok_or_else(|| {
            ValidationError::UnsupportedMedia {
                file_name: image.file_name().to_string(),
            }
        })?;

        let kind = request.provider.kind;
        let model = &request.provider.model;
        if !self.config.provider(kind).supports(model) {
            return Err(ValidationError::UnsupportedModel {
                provider: kind,
                model: model.clone(),
            });
        }

        if !request.credentials.is_plausible() {
            return Err(ValidationError::InvalidCredentials { provider: kind });
        }

        if detected != image.kind() {
            warn!(declared = %image.kind(), detected = %detected, "Declared file type does not match content");
            warnings.push(format!(
                "file declared as {} but content is {}; using {}",
                image.kind(),
                detected,
                detected
            ));
            return Ok(Cow::Owned(image.with_kind(detected)));
        }

        Ok(Cow::Borrowed(image))
    }

    /// Call the provider, retrying transient failures with backoff.
    #[allow(clippy::too_many_arguments)]
    async fn submit_with_retry(
        &self,
        provider: &dyn VisionProvider,
        settings: &ProviderSettings,
        image: &ImagePayload,
        prompt: &str,
        model: &str,
        credentials: &Credentials,
        cancel: &CancelToken,
    ) -> Result<Answer> {
        let kind = provider.kind();
        let timeout = settings.timeout();
        let retry = &self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            debug!(provider = %kind, model, attempt = attempts, "Calling provider");

            let call = tokio::time::timeout(timeout, provider.submit(image, prompt, model, credentials));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
                outcome = call => outcome
                    .unwrap_or_else(|_| Err(ProviderError::Timeout { provider: kind, timeout })),
            };

            let err = match outcome {
                Ok(raw) => return Ok(Answer { raw, attempts }),
                Err(err) => err,
            };

            if !err.is_transient() || attempts > retry.max_retries {
                warn!(provider = %kind, model, attempt = attempts, error = %err, "Provider call failed");
                return Err(ExtractError::from_provider(err, attempts));
            }

            let delay = retry.backoff(attempts - 1, err.retry_after());
            warn!(
                provider = %kind,
                model,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient provider failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn hosted_adapter(kind: ProviderKind, settings: &ProviderSettings) -> HostedProvider {
    let adapter = HostedProvider::new(kind)
        .with_timeout(settings.timeout())
        .with_max_output_tokens(settings.max_output_tokens);

    match &settings.base_url {
        Some(base_url) => adapter.with_base_url(base_url.clone()),
        None => adapter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::extraction::ProviderChoice;
    use crate::models::document::DocumentType;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// Replays canned outcomes and records the models it was called with.
    struct Scripted {
        outcomes: Mutex<Vec<dexr_provider::Result<RawResponse>>>,
        models: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<dexr_provider::Result<RawResponse>>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                models: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.models.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VisionProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        async fn submit(
            &self,
            _image: &ImagePayload,
            _prompt: &str,
            model: &str,
            _credentials: &Credentials,
        ) -> dexr_provider::Result<RawResponse> {
            self.models.lock().unwrap().push(model.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(RawResponse::new("{}")))
        }
    }

    fn orchestrator(stub: Arc<Scripted>) -> Orchestrator {
        let mut config = DexrConfig::default();
        config.retry.base_delay_ms = 0;
        Orchestrator::new(config)
            .unwrap()
            .with_provider(ProviderKind::OpenAi, stub)
    }

    fn request(requested: RequestedType, bytes: &[u8], kind: MediaKind) -> ExtractionRequest {
        ExtractionRequest::new(
            requested,
            ImagePayload::new(bytes.to_vec(), kind, "doc.png"),
            ProviderChoice::new(ProviderKind::OpenAi, "gpt-4o"),
            Credentials::new("sk-test-0123456789"),
        )
    }

    fn unavailable() -> ProviderError {
        ProviderError::Unavailable {
            provider: ProviderKind::OpenAi,
            status: 503,
            message: "overloaded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let stub = Scripted::new(vec![]);
        let orch = orchestrator(stub.clone());
        let known = RequestedType::Known(DocumentType::Invoice);

        let empty = orch.extract(&request(known, b"", MediaKind::Png)).await.unwrap_err();
        assert!(matches!(empty, ExtractError::Validation(ValidationError::EmptyPayload)));

        let text = orch.extract(&request(known, b"hello", MediaKind::Png)).await.unwrap_err();
        assert!(matches!(text, ExtractError::Validation(ValidationError::UnsupportedMedia { .. })));

        let mut bad_model = request(known, PNG, MediaKind::Png);
        bad_model.provider.model = "gpt-2".to_string();
        assert!(matches!(
            orch.extract(&bad_model).await.unwrap_err(),
            ExtractError::Validation(ValidationError::UnsupportedModel { .. })
        ));

        let mut bad_key = request(known, PNG, MediaKind::Png);
        bad_key.credentials = Credentials::new("short");
        assert!(matches!(
            orch.extract(&bad_key).await.unwrap_err(),
            ExtractError::Validation(ValidationError::InvalidCredentials { .. })
        ));

        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_declared_kind_uses_detected() {
        let stub = Scripted::new(vec![Ok(RawResponse::new(r#"{"total": "1"}"#))]);
        let orch = orchestrator(stub);

        let extraction = orch
            .extract(&request(DocumentType::Receipt.into(), PNG, MediaKind::Jpeg))
            .await
            .unwrap();
        assert!(extraction.warnings.iter().any(|w| w.contains("content is png")));
    }

    #[tokio::test]
    async fn test_auto_uses_classification_model() {
        let stub = Scripted::new(vec![
            Ok(RawResponse::new("Email")),
            Ok(RawResponse::new(r#"{"subject": "Hi"}"#)),
        ]);
        let orch = orchestrator(stub.clone());

        let extraction = orch
            .extract(&request(RequestedType::Auto, PNG, MediaKind::Png))
            .await
            .unwrap();

        assert_eq!(extraction.record.document_type(), DocumentType::Email);
        assert_eq!(stub.calls(), vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()]);
        assert_eq!(extraction.record.model_used(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_retry_then_success_is_reported() {
        let stub = Scripted::new(vec![
            Err(unavailable()),
            Ok(RawResponse::new(r#"{"total": "1"}"#)),
        ]);
        let orch = orchestrator(stub.clone());

        let extraction = orch
            .extract(&request(DocumentType::Invoice.into(), PNG, MediaKind::Png))
            .await
            .unwrap();

        assert_eq!(stub.calls().len(), 2);
        assert!(extraction.warnings.iter().any(|w| w.contains("after 2 attempts")));
    }

    #[tokio::test]
    async fn test_empty_response_is_not_retried() {
        let stub = Scripted::new(vec![Err(ProviderError::EmptyResponse {
            provider: ProviderKind::OpenAi,
            reason: None,
        })]);
        let orch = orchestrator(stub.clone());

        let err = orch
            .extract(&request(DocumentType::Invoice.into(), PNG, MediaKind::Png))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Provider(ProviderError::EmptyResponse { .. })));
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_output_warns() {
        let mut raw = RawResponse::new(r#"{"total": "1"}"#);
        raw.finish_reason = Some("length".to_string());
        let orch = orchestrator(Scripted::new(vec![Ok(raw)]));

        let extraction = orch
            .extract(&request(DocumentType::Invoice.into(), PNG, MediaKind::Png))
            .await
            .unwrap();
        assert!(extraction.warnings.iter().any(|w| w.contains("token limit")));
    }

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl VisionProvider for Hanging {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        async fn submit(
            &self,
            _image: &ImagePayload,
            _prompt: &str,
            _model: &str,
            _credentials: &Credentials,
        ) -> dexr_provider::Result<RawResponse> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let mut config = DexrConfig::default();
        config.retry.max_retries = 1;
        config.retry.base_delay_ms = 0;
        config.providers.openai.timeout_secs = 5;
        let orch = Orchestrator::new(config)
            .unwrap()
            .with_provider(ProviderKind::OpenAi, Arc::new(Hanging));

        let err = orch
            .extract(&request(DocumentType::Invoice.into(), PNG, MediaKind::Png))
            .await
            .unwrap_err();

        match err {
            ExtractError::TransientProvider { attempts, source } => {
                assert_eq!(attempts, 2);
                assert_eq!(
                    source,
                    ProviderError::Timeout {
                        provider: ProviderKind::OpenAi,
                        timeout: Duration::from_secs(5),
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = DexrConfig::default();
        config.providers.openai.models.clear();
        assert!(matches!(Orchestrator::new(config), Err(ExtractError::Config(_))));
    }
}
