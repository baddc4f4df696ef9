use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relative_path::RelativePathBuf;

use super::{DeleteAck, DocumentId, PersistenceError, PersistenceGateway, SaveAck, SaveRequest, SpanRecord};

/// Stores each document's spans as `<root>/<document id>.json`.
#[derive(Debug, Clone)]
pub struct FileGateway {
    root: PathBuf,
}

impl FileGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the span file for `document_id`.
    pub fn path_for(&self, document_id: &DocumentId) -> Result<PathBuf, PersistenceError> {
        let id = document_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(PersistenceError::InvalidDocumentId(id.to_string()));
        }
        Ok(RelativePathBuf::from(format!("{id}.json")).to_path(&self.root))
    }

    async fn read(&self, document_id: &DocumentId) -> Result<Vec<SpanRecord>, PersistenceError> {
        let path = self.path_for(document_id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let stored: SaveRequest = serde_json::from_str(&content)?;
        Ok(stored.spans)
    }

    async fn write(&self, document_id: &DocumentId, spans: Vec<SpanRecord>) -> Result<(), PersistenceError> {
        let path = self.path_for(document_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = SaveRequest {
            document_id: document_id.clone(),
            spans,
        };
        let content = serde_json::to_string_pretty(&body)?;
        // Write then rename so a crash never leaves a truncated file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn load_spans(&self, document_id: &DocumentId) -> Result<Vec<SpanRecord>, PersistenceError> {
        self.read(document_id).await
    }

    async fn save_all(
        &self,
        document_id: &DocumentId,
        spans: Vec<SpanRecord>,
    ) -> Result<SaveAck, PersistenceError> {
        let count = spans.len();
        self.write(document_id, spans).await?;
        log::debug!("saved {count} spans for {document_id}");
        Ok(SaveAck::ok())
    }

    async fn delete_one(&self, document_id: &DocumentId, number: usize) -> Result<DeleteAck, PersistenceError> {
        let mut spans = self.read(document_id).await?;
        let before = spans.len();
        spans.retain(|s| s.number != number);
        if spans.len() == before {
            return Ok(DeleteAck { success: false });
        }
        self.write(document_id, spans).await?;
        Ok(DeleteAck { success: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{create_test_store_dir, record};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = create_test_store_dir();
        let gateway = FileGateway::new(dir.path());
        let spans = gateway.load_spans(&"unknown".into()).await.unwrap();
        assert!(spans.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_returns_records() {
        let dir = create_test_store_dir();
        let gateway = FileGateway::new(dir.path().join("nested"));
        let id = DocumentId::from("essay");
        let records = vec![record(1, 0, 5, "Hello"), record(2, 7, 12, "world")];

        let ack = gateway.save_all(&id, records.clone()).await.unwrap();
        assert!(ack.success);
        assert_eq!(gateway.load_spans(&id).await.unwrap(), records);

        let raw = std::fs::read_to_string(dir.path().join("nested/essay.json")).unwrap();
        assert!(raw.contains("\"documentId\": \"essay\""));
        assert!(raw.contains("\"startOffset\": 7"));
    }

    #[tokio::test]
    async fn save_replaces_previous_set() {
        let dir = create_test_store_dir();
        let gateway = FileGateway::new(dir.path());
        let id = DocumentId::from("essay");
        gateway
            .save_all(&id, vec![record(1, 0, 5, "a"), record(2, 6, 9, "b")])
            .await
            .unwrap();
        gateway.save_all(&id, vec![record(1, 6, 9, "b")]).await.unwrap();

        assert_eq!(gateway.load_spans(&id).await.unwrap(), vec![record(1, 6, 9, "b")]);
    }

    #[tokio::test]
    async fn delete_one_removes_matching_number() {
        let dir = create_test_store_dir();
        let gateway = FileGateway::new(dir.path());
        let id = DocumentId::from("essay");
        gateway
            .save_all(&id, vec![record(1, 0, 5, "a"), record(2, 6, 9, "b")])
            .await
            .unwrap();

        assert!(gateway.delete_one(&id, 1).await.unwrap().success);
        assert!(!gateway.delete_one(&id, 7).await.unwrap().success);
        assert_eq!(gateway.load_spans(&id).await.unwrap(), vec![record(2, 6, 9, "b")]);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = create_test_store_dir();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let gateway = FileGateway::new(dir.path());
        let result = gateway.load_spans(&"bad".into()).await;
        assert!(matches!(result, Err(PersistenceError::Serialization(_))));
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("a/b")]
    #[case("a\\b")]
    fn path_for_rejects_unsafe_ids(#[case] id: &str) {
        let gateway = FileGateway::new("/tmp/readmark");
        assert!(matches!(
            gateway.path_for(&id.into()),
            Err(PersistenceError::InvalidDocumentId(_))
        ));
    }
}
