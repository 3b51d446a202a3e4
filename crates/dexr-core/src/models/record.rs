//! The extraction record produced by a successful extraction.

use chrono::{DateTime, Utc};
use dexr_provider::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::document::DocumentType;
use crate::prompt::PromptBuilder;

/// Extracted entities keyed by field label.
pub type EntityMap = Map<String, Value>;

/// A completed extraction.
///
/// Fields are read-only once the record is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    id: Uuid,
    document_type: DocumentType,
    uploaded_at: DateTime<Utc>,
    entities: EntityMap,
    raw_text: String,
    file_name: String,
    model_used: String,
    provider: ProviderKind,
    prompt_version: String,
}

/// Size of the raw model answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextStats {
    pub characters: usize,
    pub words: usize,
    pub lines: usize,
}

impl ExtractionRecord {
    /// Build a record with a fresh id and the current time.
    pub fn new(
        document_type: DocumentType,
        entities: EntityMap,
        raw_text: impl Into<String>,
        file_name: impl Into<String>,
        model_used: impl Into<String>,
        provider: ProviderKind,
        prompt_version: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_type,
            uploaded_at: Utc::now(),
            entities,
            raw_text: raw_text.into(),
            file_name: file_name.into(),
            model_used: model_used.into(),
            provider,
            prompt_version: prompt_version.into(),
        }
    }

    /// Replace the upload timestamp.
    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = uploaded_at;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    /// The model answer exactly as received.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn model_used(&self) -> &str {
        &self.model_used
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn prompt_version(&self) -> &str {
        &self.prompt_version
    }

    /// Character, word and line counts of the raw answer.
    pub fn stats(&self) -> TextStats {
        TextStats {
            characters: self.raw_text.chars().count(),
            words: self.raw_text.split_whitespace().count(),
            lines: if self.raw_text.is_empty() {
                0
            } else {
                self.raw_text.lines().count()
            },
        }
    }

    /// Expected fields for the document type that are absent or null.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        if self.document_type == DocumentType::General {
            return Vec::new();
        }

        PromptBuilder::fields(self.document_type)
            .iter()
            .map(|field| field.key)
            .filter(|key| matches!(self.entities.get(*key), None | Some(Value::Null)))
            .collect()
    }
}
