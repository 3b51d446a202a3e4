//! Persistence of extraction records.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::document::DocumentType;
use crate::models::record::ExtractionRecord;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A document store keyed by extraction id.
///
/// Saving the same record twice leaves a single copy.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record and return its id.
    async fn save(&self, record: &ExtractionRecord) -> Result<Uuid>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<ExtractionRecord>>;

    /// Records matching `filter`, newest first.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<ExtractionRecord>>;

    /// Records whose entities contain the queried key, newest first.
    async fn search(&self, query: &FieldQuery) -> Result<Vec<SearchHit>>;
}

/// Restricts which records [`RecordStore::list`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub document_type: Option<DocumentType>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ExtractionRecord) -> bool {
        self.document_type
            .is_none_or(|doc_type| doc_type == record.document_type())
    }

    /// Filter, order newest first and truncate.
    pub(crate) fn apply(&self, records: impl IntoIterator<Item = ExtractionRecord>) -> Vec<ExtractionRecord> {
        let mut selected: Vec<_> = records.into_iter().filter(|r| self.matches(r)).collect();
        selected.sort_by(|a, b| b.uploaded_at().cmp(&a.uploaded_at()));
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Search by entity key, optionally requiring a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub key: String,
    /// Compared against the value's text form.
    pub equals: Option<String>,
}

impl FieldQuery {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            equals: None,
        }
    }

    pub fn equals(mut self, value: impl Into<String>) -> Self {
        self.equals = Some(value.into());
        self
    }

    /// The hit for `record`, if it matches.
    pub fn hit(&self, record: &ExtractionRecord) -> Option<SearchHit> {
        let value = text_value(record.entities().get(&self.key)?);

        if let Some(expected) = &self.equals {
            if &value != expected {
                return None;
            }
        }

        Some(SearchHit {
            id: record.id(),
            document_type: record.document_type(),
            uploaded_at: record.uploaded_at(),
            file_name: record.file_name().to_string(),
            value,
        })
    }

    pub(crate) fn apply<'a>(&self, records: impl IntoIterator<Item = &'a ExtractionRecord>) -> Vec<SearchHit> {
        let mut hits: Vec<_> = records.into_iter().filter_map(|r| self.hit(r)).collect();
        hits.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        hits
    }
}

/// A record matched by a [`FieldQuery`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub uploaded_at: DateTime<Utc>,
    pub file_name: String,
    /// Text form of the matched value.
    pub value: String,
}

/// Strings unquoted, everything else as compact JSON.
fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
