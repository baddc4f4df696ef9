use chrono::{DateTime, Utc};

/// A numbered, offset-defined annotation over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub number: usize,
    pub start: usize,
    pub end: usize,
    /// Text captured when the span was created; never revalidated.
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Span {
    /// Non-empty intersection; touching endpoints don't count.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        (start >= self.start && start < self.end)
            || (end > self.start && end <= self.end)
            || (start <= self.start && end >= self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpanError {
    #[error("range {start}..{end} overlaps span {number}")]
    Overlap {
        start: usize,
        end: usize,
        number: usize,
    },
    #[error("range {start}..{end} is empty")]
    InvalidRange { start: usize, end: usize },
    #[error("range {start}..{end} extends past the end of the document ({len})")]
    OutOfDocument { start: usize, end: usize, len: usize },
    #[error("no span numbered {0}")]
    NotFound(usize),
}

/// The span set for one document session.
///
/// Spans are kept sorted by `start` and numbered `1..=N` in that order after
/// every mutation.
#[derive(Debug, Clone, Default)]
pub struct SpanStore {
    spans: Vec<Span>,
}

impl SpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, start: usize, end: usize, content: impl Into<String>) -> Result<Span, SpanError> {
        self.add_at(start, end, content, Utc::now())
    }

    /// Add with an explicit creation time, as when restoring from storage.
    pub fn add_at(
        &mut self,
        start: usize,
        end: usize,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Span, SpanError> {
        self.check(start, end)?;
        // Spans stay sorted by start, so this slot is the span's rank.
        let pos = self.spans.partition_point(|s| s.start < start);
        self.spans.insert(
            pos,
            Span {
                number: pos + 1,
                start,
                end,
                content: content.into(),
                created_at,
            },
        );
        self.renumber();
        let added = self.spans[pos].clone();
        log::debug!("added span {} at {start}..{end}", added.number);
        Ok(added)
    }

    fn check(&self, start: usize, end: usize) -> Result<(), SpanError> {
        if end <= start {
            return Err(SpanError::InvalidRange { start, end });
        }
        match self.spans.iter().find(|s| s.overlaps(start, end)) {
            Some(existing) => Err(SpanError::Overlap {
                start,
                end,
                number: existing.number,
            }),
            None => Ok(()),
        }
    }

    /// Replace the whole set, e.g. after loading from storage.
    ///
    /// Stored numbers are ignored. Spans that are empty or overlap an
    /// earlier-accepted span are dropped and returned.
    pub fn replace_all(&mut self, spans: impl IntoIterator<Item = Span>) -> Vec<Span> {
        self.spans.clear();
        let mut rejected = Vec::new();
        for span in spans {
            match self.check(span.start, span.end) {
                Ok(()) => self.spans.push(span),
                Err(e) => {
                    log::warn!("dropping stored span {}: {e}", span.number);
                    rejected.push(span);
                }
            }
        }
        self.renumber();
        rejected
    }

    pub fn remove(&mut self, number: usize) -> Result<Span, SpanError> {
        let pos = self.position(number)?;
        let removed = self.spans.remove(pos);
        self.renumber();
        Ok(removed)
    }

    /// Replace a span's content. Offsets never change after creation.
    pub fn edit(&mut self, number: usize, content: impl Into<String>) -> Result<(), SpanError> {
        let pos = self.position(number)?;
        self.spans[pos].content = content.into();
        Ok(())
    }

    /// Sort by start and reassign numbers from 1.
    pub fn renumber(&mut self) {
        self.spans.sort_by_key(|s| s.start);
        for (i, span) in self.spans.iter_mut().enumerate() {
            span.number = i + 1;
        }
    }

    pub fn list(&self) -> &[Span] {
        &self.spans
    }

    pub fn get(&self, number: usize) -> Option<&Span> {
        self.spans.iter().find(|s| s.number == number)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Number a span appended after every existing one would get.
    pub fn next_number(&self) -> usize {
        self.spans.len() + 1
    }

    fn position(&self, number: usize) -> Result<usize, SpanError> {
        self.spans
            .iter()
            .position(|s| s.number == number)
            .ok_or(SpanError::NotFound(number))
    }
}
