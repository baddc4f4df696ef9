//! Durable storage of span definitions.
//!
//! The engine only talks to storage through [`PersistenceGateway`]. Every
//! call is made off the synchronous editing path, and failures never undo
//! in-memory state.

pub mod file;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spans::Span;

pub use file::FileGateway;
pub use memory::MemoryGateway;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed span data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid document id: {0:?}")]
    InvalidDocumentId(String),
    #[error("Storage rejected the request: {0}")]
    Rejected(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Identifies the document a span set belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Stored form of a span. Stored numbers are advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    pub number: usize,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Span> for SpanRecord {
    fn from(span: &Span) -> Self {
        Self {
            number: span.number,
            content: span.content.clone(),
            start_offset: span.start,
            end_offset: span.end,
            created_at: span.created_at,
        }
    }
}

impl From<SpanRecord> for Span {
    fn from(record: SpanRecord) -> Self {
        Self {
            number: record.number,
            start: record.start_offset,
            end: record.end_offset,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

/// Body of a save: the complete span set for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub document_id: DocumentId,
    pub spans: Vec<SpanRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// Treat an unsuccessful ack as an error.
    pub fn into_result(self) -> Result<(), PersistenceError> {
        if self.success {
            Ok(())
        } else {
            Err(PersistenceError::Rejected(
                self.error.unwrap_or_else(|| "save failed".to_string()),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub success: bool,
}

impl DeleteAck {
    pub fn into_result(self, number: usize) -> Result<(), PersistenceError> {
        if self.success {
            Ok(())
        } else {
            Err(PersistenceError::Rejected(format!(
                "span {number} could not be deleted"
            )))
        }
    }
}

/// Load, save and delete span definitions for a document.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Stored spans in no particular order.
    async fn load_spans(&self, document_id: &DocumentId) -> Result<Vec<SpanRecord>, PersistenceError>;

    /// Replace the stored set with `spans`.
    async fn save_all(
        &self,
        document_id: &DocumentId,
        spans: Vec<SpanRecord>,
    ) -> Result<SaveAck, PersistenceError>;

    async fn delete_one(&self, document_id: &DocumentId, number: usize) -> Result<DeleteAck, PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_uses_camel_case_wire_names() {
        let record = SpanRecord {
            number: 2,
            content: "world".to_string(),
            start_offset: 7,
            end_offset: 12,
            created_at: "2026-01-02T03:04:05Z".parse().unwrap(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "number": 2,
                "content": "world",
                "startOffset": 7,
                "endOffset": 12,
                "createdAt": "2026-01-02T03:04:05Z",
            })
        );
    }

    #[test]
    fn save_ack_omits_missing_error() {
        let json = serde_json::to_string(&SaveAck::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
        let ack: SaveAck = serde_json::from_str(r#"{"success":false,"error":"disk full"}"#).unwrap();
        assert!(matches!(ack.into_result(), Err(PersistenceError::Rejected(e)) if e == "disk full"));
    }

    #[test]
    fn span_converts_to_record_and_back() {
        let span = Span {
            number: 3,
            start: 1,
            end: 4,
            content: "abc".to_string(),
            created_at: Utc::now(),
        };
        let back = Span::from(SpanRecord::from(&span));
        assert_eq!(back, span);
    }
}
