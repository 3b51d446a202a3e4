//! In-process record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FieldQuery, RecordFilter, RecordStore, Result, SearchHit};
use crate::models::record::ExtractionRecord;

/// Keeps records in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, ExtractionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, record: &ExtractionRecord) -> Result<Uuid> {
        let id = record.id();
        self.records.write().await.insert(id, record.clone());
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExtractionRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<ExtractionRecord>> {
        let records = self.records.read().await;
        Ok(filter.apply(records.values().cloned()))
    }

    async fn search(&self, query: &FieldQuery) -> Result<Vec<SearchHit>> {
        let records = self.records.read().await;
        Ok(query.apply(records.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentType;
    use crate::store::tests::record;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let store = MemoryStore::new();
        let rec = record(DocumentType::Invoice, json!({"total": "1"}), 1);

        assert_eq!(store.save(&rec).await.unwrap(), rec.id());
        assert_eq!(store.save(&rec).await.unwrap(), rec.id());
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(rec.id()).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_list_and_search() {
        let store = MemoryStore::new();
        let old = record(DocumentType::Invoice, json!({"vendor": "ACME"}), 1);
        let new = record(DocumentType::Receipt, json!({"merchant": "Cafe"}), 2);
        store.save(&old).await.unwrap();
        store.save(&new).await.unwrap();

        let listed = store.list(&RecordFilter::default()).await.unwrap();
        assert_eq!(listed, vec![new.clone(), old.clone()]);

        let hits = store.search(&FieldQuery::key("vendor").equals("ACME")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, old.id());

        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
