//! Per-document editing session.
//!
//! A [`Session`] owns the span store and the rendered document for one
//! document id. Mutations run synchronously: validate, update the store,
//! redraw. Persistence is queued to a background worker afterwards and never
//! blocks or rolls back the in-memory state; failures come back as
//! [`Notice`]s.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::document::RenderedDocument;
use crate::io::{DocumentId, PersistenceGateway, SaveAck, SpanRecord};
use crate::spans::{
    Color, IndexLookupError, Point, RenderReport, Span, SpanError, SpanRenderer, SpanStore,
    TextPositionIndex,
};

/// Soft notifications for the reader; none of these undo local changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LoadFailed { error: String },
    /// Stored spans that were empty or overlapped others and were dropped.
    DroppedStoredSpans { count: usize },
    SaveFailed { error: String },
    DeleteFailed { number: usize, error: String },
}

pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error(transparent)]
    Lookup(#[from] IndexLookupError),
    #[error(transparent)]
    Span(#[from] SpanError),
}

/// One row of the span list shown next to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanSummary {
    pub number: usize,
    pub color: Color,
    pub preview: String,
}

enum PersistOp {
    SaveAll(Vec<SpanRecord>),
    /// Remove the stored record covering `start..end`; `number` is the
    /// span's in-memory number, used for reporting.
    Delete {
        number: usize,
        start: usize,
        end: usize,
    },
    Flush(oneshot::Sender<()>),
}

/// Applies persistence requests in the order they were queued.
struct PersistWorker {
    gateway: Arc<dyn PersistenceGateway>,
    document_id: DocumentId,
    notices: mpsc::UnboundedSender<Notice>,
    /// Records known to be in storage, with their stored numbers. `None`
    /// once a write failed and storage may differ.
    stored: Option<Vec<SpanRecord>>,
}

impl PersistWorker {
    fn start(mut self) -> mpsc::UnboundedSender<PersistOp> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                self.handle(op).await;
            }
            log::debug!("persistence worker for {} stopped", self.document_id);
        });
        tx
    }

    async fn handle(&mut self, op: PersistOp) {
        match op {
            PersistOp::SaveAll(records) => {
                let result = self
                    .gateway
                    .save_all(&self.document_id, records.clone())
                    .await
                    .and_then(SaveAck::into_result);
                match result {
                    Ok(()) => self.stored = Some(records),
                    Err(e) => {
                        log::warn!("failed to save spans for {}: {e}", self.document_id);
                        self.stored = None;
                        let _ = self.notices.send(Notice::SaveFailed {
                            error: e.to_string(),
                        });
                    }
                }
            }
            PersistOp::Delete { number, start, end } => {
                // Stored numbers can lag the in-memory ones, so match on offsets.
                let target = self
                    .stored
                    .as_ref()
                    .and_then(|stored| {
                        stored
                            .iter()
                            .find(|r| r.start_offset == start && r.end_offset == end)
                    })
                    .map(|r| r.number);
                let Some(stored_number) = target else {
                    log::debug!(
                        "no known stored record for span {number} at {start}..{end}, leaving it to the next save"
                    );
                    return;
                };
                let result = self
                    .gateway
                    .delete_one(&self.document_id, stored_number)
                    .await
                    .and_then(|ack| ack.into_result(stored_number));
                match result {
                    Ok(()) => {
                        if let Some(stored) = &mut self.stored {
                            stored.retain(|r| r.number != stored_number);
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to delete span {number} for {}: {e}",
                            self.document_id
                        );
                        self.stored = None;
                        let _ = self.notices.send(Notice::DeleteFailed {
                            number,
                            error: e.to_string(),
                        });
                    }
                }
            }
            PersistOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

pub struct Session {
    document_id: DocumentId,
    document: RenderedDocument,
    store: SpanStore,
    renderer: SpanRenderer,
    persist: mpsc::UnboundedSender<PersistOp>,
    last_report: RenderReport,
}

impl Session {
    /// Load stored spans for `document_id`, renumber them by position and
    /// draw them. A failed load is reported and the session starts empty.
    pub async fn open(
        document_id: DocumentId,
        document: RenderedDocument,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> (Self, NoticeReceiver) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let mut store = SpanStore::new();
        let mut stored = None;
        match gateway.load_spans(&document_id).await {
            Ok(records) => {
                stored = Some(records.clone());
                let dropped = store.replace_all(records.into_iter().map(Span::from));
                if !dropped.is_empty() {
                    let _ = notice_tx.send(Notice::DroppedStoredSpans {
                        count: dropped.len(),
                    });
                }
            }
            Err(e) => {
                log::warn!("failed to load spans for {document_id}: {e}");
                let _ = notice_tx.send(Notice::LoadFailed {
                    error: e.to_string(),
                });
            }
        }

        let persist = PersistWorker {
            gateway,
            document_id: document_id.clone(),
            notices: notice_tx,
            stored,
        }
        .start();

        let mut session = Self {
            document_id,
            document,
            store,
            renderer: SpanRenderer::new(),
            persist,
            last_report: RenderReport::default(),
        };
        session.redraw();
        log::info!(
            "opened {} with {} spans",
            session.document_id,
            session.store.len()
        );
        (session, notice_rx)
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn document(&self) -> &RenderedDocument {
        &self.document
    }

    pub fn spans(&self) -> &[Span] {
        self.store.list()
    }

    /// Result of the most recent redraw.
    pub fn last_report(&self) -> &RenderReport {
        &self.last_report
    }

    pub fn next_number(&self) -> usize {
        self.store.next_number()
    }

    /// Mark `[start, end)` as a new span, capturing its current text.
    pub fn add_selection(&mut self, start: usize, end: usize) -> Result<Span, SpanError> {
        let len = self.document.len();
        if end > len {
            return Err(SpanError::OutOfDocument { start, end, len });
        }
        let content = self.document.text_in(start, end);
        let span = self.store.add(start, end, content)?;
        self.redraw();
        self.save_all();
        Ok(span)
    }

    /// Mark the text between two selection endpoints, in either order.
    pub fn add_from_points(&mut self, anchor: Point, focus: Point) -> Result<Span, SelectionError> {
        let index = TextPositionIndex::build(&self.document);
        let a = index.offset_of(anchor.fragment, anchor.offset)?;
        let b = index.offset_of(focus.fragment, focus.offset)?;
        Ok(self.add_selection(a.min(b), a.max(b))?)
    }

    /// Replace a span's content. Blank or unchanged content is ignored and
    /// returns `Ok(false)`.
    pub fn edit(&mut self, number: usize, content: &str) -> Result<bool, SpanError> {
        let span = self.store.get(number).ok_or(SpanError::NotFound(number))?;
        let content = content.trim();
        if content.is_empty() || content == span.content {
            return Ok(false);
        }
        self.store.edit(number, content)?;
        self.save_all();
        Ok(true)
    }

    pub fn remove(&mut self, number: usize) -> Result<Span, SpanError> {
        let removed = self.store.remove(number)?;
        self.redraw();
        self.queue(PersistOp::Delete {
            number,
            start: removed.start,
            end: removed.end,
        });
        self.save_all();
        Ok(removed)
    }

    /// List rows with content previews cut to `preview_chars`.
    pub fn summaries(&self, preview_chars: usize) -> Vec<SpanSummary> {
        self.store
            .list()
            .iter()
            .map(|span| SpanSummary {
                number: span.number,
                color: self.renderer.color_for(span.number),
                preview: preview(&span.content, preview_chars),
            })
            .collect()
    }

    /// Wait until every queued persistence request has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.queue(PersistOp::Flush(tx));
        let _ = rx.await;
    }

    fn redraw(&mut self) {
        self.last_report = self.renderer.redraw(&mut self.document, self.store.list());
    }

    fn save_all(&self) {
        let records = self.store.list().iter().map(SpanRecord::from).collect();
        self.queue(PersistOp::SaveAll(records));
    }

    fn queue(&self, op: PersistOp) {
        if self.persist.send(op).is_err() {
            log::warn!("persistence worker for {} is gone", self.document_id);
        }
    }
}

fn preview(content: &str, max: usize) -> String {
    let mut chars = content.chars();
    let mut s: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        s.push_str("...");
    }
    s
}
