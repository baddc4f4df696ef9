use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DeleteAck, DocumentId, PersistenceError, PersistenceGateway, SaveAck, SpanRecord};

/// In-process storage, mostly for tests and previews.
///
/// `set_failing(true)` makes every call fail, to exercise the non-fatal
/// persistence path.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    documents: Mutex<HashMap<DocumentId, Vec<SpanRecord>>>,
    failing: AtomicBool,
    rejecting_saves: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spans(document_id: DocumentId, spans: Vec<SpanRecord>) -> Self {
        Self {
            documents: Mutex::new(HashMap::from([(document_id, spans)])),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Answer saves with an unsuccessful ack, leaving storage untouched.
    pub fn set_rejecting_saves(&self, rejecting: bool) {
        self.rejecting_saves.store(rejecting, Ordering::SeqCst);
    }

    /// Current stored set for a document.
    pub async fn stored(&self, document_id: &DocumentId) -> Vec<SpanRecord> {
        self.documents
            .lock()
            .await
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("memory gateway offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load_spans(&self, document_id: &DocumentId) -> Result<Vec<SpanRecord>, PersistenceError> {
        self.check()?;
        Ok(self.stored(document_id).await)
    }

    async fn save_all(
        &self,
        document_id: &DocumentId,
        spans: Vec<SpanRecord>,
    ) -> Result<SaveAck, PersistenceError> {
        self.check()?;
        if self.rejecting_saves.load(Ordering::SeqCst) {
            return Ok(SaveAck::failed("saves are disabled"));
        }
        self.documents.lock().await.insert(document_id.clone(), spans);
        Ok(SaveAck::ok())
    }

    async fn delete_one(&self, document_id: &DocumentId, number: usize) -> Result<DeleteAck, PersistenceError> {
        self.check()?;
        let mut documents = self.documents.lock().await;
        let Some(spans) = documents.get_mut(document_id) else {
            return Ok(DeleteAck { success: false });
        };
        let before = spans.len();
        spans.retain(|s| s.number != number);
        Ok(DeleteAck {
            success: spans.len() < before,
        })
    }
}
