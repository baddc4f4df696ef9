//! Shared helpers for unit tests.

use tempfile::TempDir;

use crate::document::RenderedDocument;
use crate::io::SpanRecord;

pub fn create_test_store_dir() -> TempDir {
    TempDir::new().unwrap()
}

/// A stored span with a fixed creation time so records compare equal.
pub fn record(number: usize, start: usize, end: usize, content: &str) -> SpanRecord {
    SpanRecord {
        number,
        content: content.to_string(),
        start_offset: start,
        end_offset: end,
        created_at: "2026-01-01T00:00:00Z".parse().unwrap(),
    }
}

/// "Hello world. Goodbye." split over three fragments.
pub fn scenario_document() -> RenderedDocument {
    RenderedDocument::from_fragments(&["Hello ", "world. ", "Goodbye."])
}
