use crate::document::{RenderError, RenderedDocument};
use crate::spans::index::TextPositionIndex;
use crate::spans::palette::{Color, PALETTE};
use crate::spans::store::Span;

/// A span that could not be drawn during a redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSpan {
    pub number: usize,
    pub error: RenderError,
}

/// Outcome of one `render_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub rendered: Vec<usize>,
    pub skipped: Vec<SkippedSpan>,
}

impl RenderReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Draws span decorations onto a document.
///
/// The renderer never decides whether a span is valid; it draws whatever the
/// store hands it and reports the spans it could not place.
#[derive(Debug, Clone)]
pub struct SpanRenderer {
    palette: [Color; 8],
}

impl Default for SpanRenderer {
    fn default() -> Self {
        Self { palette: PALETTE }
    }
}

impl SpanRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_palette(palette: [Color; 8]) -> Self {
        Self { palette }
    }

    pub fn color_for(&self, number: usize) -> Color {
        self.palette[number.saturating_sub(1) % self.palette.len()]
    }

    /// Remove every decoration and merge split fragments back together.
    pub fn clear_all(&self, doc: &mut RenderedDocument) -> usize {
        let removed = doc.unwrap_decorations();
        let merged = doc.normalize();
        log::trace!("cleared {removed} decorations, merged {merged} fragments");
        removed
    }

    /// Wrap each span in a decoration, in ascending start order.
    ///
    /// `index` should be freshly built. Every wrap invalidates it, so it is
    /// rebuilt before the next span is resolved. A span that cannot be
    /// resolved or wrapped is logged and skipped.
    pub fn render_all(
        &self,
        doc: &mut RenderedDocument,
        spans: &[Span],
        mut index: TextPositionIndex,
    ) -> RenderReport {
        let mut ordered: Vec<&Span> = spans.iter().collect();
        ordered.sort_by_key(|s| s.start);

        let mut report = RenderReport::default();
        for span in ordered {
            if !index.is_current(doc) {
                index = TextPositionIndex::build(doc);
            }
            let drawn = index
                .range_for(span.start, span.end)
                .map_err(RenderError::from)
                .and_then(|range| doc.wrap(&range, span.number, self.color_for(span.number)));
            match drawn {
                Ok(()) => report.rendered.push(span.number),
                Err(error) => {
                    log::warn!(
                        "skipping span {} at {}..{}: {error}",
                        span.number,
                        span.start,
                        span.end
                    );
                    report.skipped.push(SkippedSpan {
                        number: span.number,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Clear, rebuild the index from the clean baseline, and draw all spans.
    pub fn redraw(&self, doc: &mut RenderedDocument, spans: &[Span]) -> RenderReport {
        self.clear_all(doc);
        let index = TextPositionIndex::build(doc);
        self.render_all(doc, spans, index)
    }
}
