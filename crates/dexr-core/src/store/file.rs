//! Record store backed by one JSON file per record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{FieldQuery, RecordFilter, RecordStore, Result, SearchHit};
use crate::error::StoreError;
use crate::models::record::ExtractionRecord;

/// Stores each record as `<id>.json` in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

/// On-disk shape: the record plus the time it was first saved.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    #[serde(flatten)]
    record: ExtractionRecord,
    created_at: DateTime<Utc>,
}

impl JsonFileStore {
    /// Open a store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!("Opened record store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_row(&self, path: &Path) -> Result<Option<StoredRow>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Every readable record in the directory. Unreadable files are skipped.
    async fn load_all(&self) -> Result<Vec<ExtractionRecord>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match self.read_row(&path).await {
                Ok(Some(row)) => records.push(row.record),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn save(&self, record: &ExtractionRecord) -> Result<Uuid> {
        let id = record.id();
        let path = self.path_for(id);

        // Keep the original creation time when a record is saved again.
        let created_at = match self.read_row(&path).await {
            Ok(Some(existing)) => existing.created_at,
            _ => Utc::now(),
        };

        let row = StoredRow {
            record: record.clone(),
            created_at,
        };
        let content = serde_json::to_string_pretty(&row)?;

        let tmp = self.dir.join(format!(".{id}.json.tmp"));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(%id, "Saved record to {}", path.display());
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExtractionRecord>> {
        Ok(self.read_row(&self.path_for(id)).await?.map(|row| row.record))
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<ExtractionRecord>> {
        Ok(filter.apply(self.load_all().await?))
    }

    async fn search(&self, query: &FieldQuery) -> Result<Vec<SearchHit>> {
        let records = self.load_all().await?;
        Ok(query.apply(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentType;
    use crate::store::tests::record;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("records")).await.unwrap();
        let rec = record(
            DocumentType::Invoice,
            json!({"invoice_number": "INV-001", "line_items": [{"qty": 1}]}),
            4,
        );

        let id = store.save(&rec).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(rec));
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_row_shape_and_idempotent_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let rec = record(DocumentType::Receipt, json!({"total": 3}), 4);

        store.save(&rec).await.unwrap();
        let path = dir.path().join(format!("{}.json", rec.id()));
        let first: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        store.save(&rec).await.unwrap();
        let second: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        for key in [
            "id",
            "document_type",
            "uploaded_at",
            "entities",
            "raw_text",
            "file_name",
            "model_used",
            "provider",
            "prompt_version",
            "created_at",
        ] {
            assert!(first.get(key).is_some(), "missing {key}");
        }
        assert_eq!(first["created_at"], second["created_at"]);

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_list_search_and_skip_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let a = record(DocumentType::Invoice, json!({"total": "10.00"}), 1);
        let b = record(DocumentType::Invoice, json!({"total": "20.00"}), 2);
        let c = record(DocumentType::Email, json!({"subject": "Hi"}), 3);
        for rec in [&a, &b, &c] {
            store.save(rec).await.unwrap();
        }
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let invoices = store
            .list(&RecordFilter {
                document_type: Some(DocumentType::Invoice),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(invoices, vec![b.clone(), a.clone()]);

        let hits = store.search(&FieldQuery::key("total")).await.unwrap();
        let values: Vec<_> = hits.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(values, vec!["20.00", "10.00"]);

        let exact = store
            .search(&FieldQuery::key("total").equals("10.00"))
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id, a.id());
    }
}
