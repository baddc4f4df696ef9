//! Flat offset ⇄ fragment translation.
//!
//! The index is built from a [`RenderedDocument`] and stamped with the
//! document version it saw. Wrapping or unwrapping a decoration changes
//! fragment boundaries and bumps that version, so an index must be rebuilt
//! after every decoration mutation before it is used again.

use std::collections::HashMap;
use std::fmt;

use crate::document::{FragmentId, RenderedDocument};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexLookupError {
    #[error("fragment {0} is not in the index")]
    UnknownFragment(FragmentId),
    #[error("offset {offset} is outside the document (length {len})")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("local offset {offset} is past the end of fragment {fragment} (length {len})")]
    LocalOffsetOutOfBounds {
        fragment: FragmentId,
        offset: usize,
        len: usize,
    },
    #[error("empty or inverted range {start}..{end}")]
    InvalidRange { start: usize, end: usize },
    #[error("index built for version {index_version}, document is at {document_version}")]
    Stale {
        index_version: u64,
        document_version: u64,
    },
}

/// A position inside one fragment, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub fragment: FragmentId,
    pub offset: usize,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fragment, self.offset)
    }
}

/// Resolved `[start, end)` range, valid for one document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    pub start: Point,
    pub end: Point,
    pub version: u64,
}

/// Which fragment wins when an offset falls on a boundary between two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Start of the following fragment.
    Forward,
    /// End of the preceding fragment.
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub fragment: FragmentId,
    pub start: usize,
    pub len: usize,
}

impl IndexEntry {
    fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone)]
pub struct TextPositionIndex {
    entries: Vec<IndexEntry>,
    slots: HashMap<FragmentId, usize>,
    total_len: usize,
    version: u64,
}

impl TextPositionIndex {
    /// Walk the document's text fragments in order and record their extents.
    pub fn build(doc: &RenderedDocument) -> Self {
        let mut entries = Vec::new();
        let mut slots = HashMap::new();
        let mut start = 0;
        for fragment in doc.fragments() {
            let len = fragment.len();
            slots.insert(fragment.id, entries.len());
            entries.push(IndexEntry {
                fragment: fragment.id,
                start,
                len,
            });
            start += len;
        }
        log::trace!(
            "built index over {} fragments ({} chars) at version {}",
            entries.len(),
            start,
            doc.version()
        );
        Self {
            entries,
            slots,
            total_len: start,
            version: doc.version(),
        }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the document still has the fragment layout this index saw.
    pub fn is_current(&self, doc: &RenderedDocument) -> bool {
        self.version == doc.version()
    }

    /// Flat offset of `local` chars into `fragment`.
    pub fn offset_of(&self, fragment: FragmentId, local: usize) -> Result<usize, IndexLookupError> {
        let slot = self
            .slots
            .get(&fragment)
            .ok_or(IndexLookupError::UnknownFragment(fragment))?;
        let entry = self.entries[*slot];
        if local > entry.len {
            return Err(IndexLookupError::LocalOffsetOutOfBounds {
                fragment,
                offset: local,
                len: entry.len,
            });
        }
        Ok(entry.start + local)
    }

    /// Fragment position holding `offset`; the document end resolves to the
    /// end of the last fragment.
    pub fn locate(&self, offset: usize) -> Result<Point, IndexLookupError> {
        self.locate_with(offset, Bias::Forward)
    }

    pub fn locate_with(&self, offset: usize, bias: Bias) -> Result<Point, IndexLookupError> {
        let out_of_bounds = IndexLookupError::OffsetOutOfBounds {
            offset,
            len: self.total_len,
        };
        if offset > self.total_len {
            return Err(out_of_bounds);
        }

        let slot = match bias {
            Bias::Backward if offset > 0 => self.entries.partition_point(|e| e.end() < offset),
            _ => self.entries.partition_point(|e| e.end() <= offset),
        };
        if let Some(entry) = self.entries.get(slot) {
            return Ok(Point {
                fragment: entry.fragment,
                offset: offset - entry.start,
            });
        }

        // Only the document end falls past every entry.
        match self.entries.last() {
            Some(last) => Ok(Point {
                fragment: last.fragment,
                offset: last.len,
            }),
            None => Err(out_of_bounds),
        }
    }

    /// Resolve `[start, end)`.
    ///
    /// The end is located with backward bias so a range ending on a fragment
    /// boundary stays in the fragment it covers.
    pub fn range_for(&self, start: usize, end: usize) -> Result<FragmentRange, IndexLookupError> {
        if end <= start {
            return Err(IndexLookupError::InvalidRange { start, end });
        }
        Ok(FragmentRange {
            start: self.locate_with(start, Bias::Forward)?,
            end: self.locate_with(end, Bias::Backward)?,
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn scenario() -> (RenderedDocument, Vec<FragmentId>) {
        let doc = RenderedDocument::from_fragments(&["Hello ", "world. ", "Goodbye."]);
        let ids = doc.fragments().iter().map(|t| t.id).collect();
        (doc, ids)
    }

    #[test]
    fn build_records_cumulative_starts() {
        let (doc, ids) = scenario();
        let index = TextPositionIndex::build(&doc);

        let starts: Vec<_> = index.entries().iter().map(|e| (e.start, e.len)).collect();
        assert_eq!(starts, vec![(0, 6), (6, 7), (13, 8)]);
        assert_eq!(index.total_len(), 21);
        assert_eq!(index.entries()[1].fragment, ids[1]);
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(5, 0, 5)]
    #[case(6, 1, 0)]
    #[case(12, 1, 6)]
    #[case(13, 2, 0)]
    #[case(20, 2, 7)]
    #[case(21, 2, 8)]
    fn locate_finds_containing_fragment(
        #[case] offset: usize,
        #[case] slot: usize,
        #[case] local: usize,
    ) {
        let (doc, ids) = scenario();
        let index = TextPositionIndex::build(&doc);
        assert_eq!(
            index.locate(offset).unwrap(),
            Point {
                fragment: ids[slot],
                offset: local
            }
        );
    }

    #[test]
    fn locate_backward_prefers_preceding_fragment() {
        let (doc, ids) = scenario();
        let index = TextPositionIndex::build(&doc);
        assert_eq!(
            index.locate_with(6, Bias::Backward).unwrap(),
            Point {
                fragment: ids[0],
                offset: 6
            }
        );
        assert_eq!(
            index.locate_with(0, Bias::Backward).unwrap(),
            Point {
                fragment: ids[0],
                offset: 0
            }
        );
    }

    #[test]
    fn locate_rejects_offsets_past_the_end() {
        let (doc, _) = scenario();
        let index = TextPositionIndex::build(&doc);
        assert_eq!(
            index.locate(22),
            Err(IndexLookupError::OffsetOutOfBounds { offset: 22, len: 21 })
        );
    }

    #[test]
    fn locate_in_empty_document_fails() {
        let index = TextPositionIndex::build(&RenderedDocument::default());
        assert!(index.locate(0).is_err());
    }

    #[test]
    fn offset_of_sums_preceding_fragments() {
        let (doc, ids) = scenario();
        let index = TextPositionIndex::build(&doc);
        assert_eq!(index.offset_of(ids[2], 3), Ok(16));
        assert_eq!(index.offset_of(ids[0], 0), Ok(0));
    }

    #[test]
    fn offset_of_rejects_unknown_fragment_and_overlong_offset() {
        let (doc, ids) = scenario();
        let index = TextPositionIndex::build(&doc);
        let other = RenderedDocument::from_fragments(&["a", "b", "c", "d"]);
        let foreign = other.fragments()[3].id;

        assert_eq!(
            index.offset_of(foreign, 0),
            Err(IndexLookupError::UnknownFragment(foreign))
        );
        assert!(matches!(
            index.offset_of(ids[0], 7),
            Err(IndexLookupError::LocalOffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn offset_round_trips_through_locate() {
        let doc = RenderedDocument::from_markdown("Some *marked up* text\n\nwith `two` paragraphs.");
        let index = TextPositionIndex::build(&doc);
        for entry in index.entries() {
            for local in 0..entry.len {
                let offset = index.offset_of(entry.fragment, local).unwrap();
                assert_eq!(
                    index.locate(offset).unwrap(),
                    Point {
                        fragment: entry.fragment,
                        offset: local
                    }
                );
            }
        }
    }

    #[test]
    fn range_for_keeps_end_in_covered_fragment() {
        let (doc, ids) = scenario();
        let index = TextPositionIndex::build(&doc);
        let range = index.range_for(0, 6).unwrap();
        assert_eq!(range.start, Point { fragment: ids[0], offset: 0 });
        assert_eq!(range.end, Point { fragment: ids[0], offset: 6 });
        assert_eq!(range.version, doc.version());
    }

    #[rstest]
    #[case(5, 5)]
    #[case(7, 3)]
    fn range_for_rejects_empty_ranges(#[case] start: usize, #[case] end: usize) {
        let (doc, _) = scenario();
        let index = TextPositionIndex::build(&doc);
        assert_eq!(
            index.range_for(start, end),
            Err(IndexLookupError::InvalidRange { start, end })
        );
    }

    #[test]
    fn range_for_fails_when_end_is_out_of_bounds() {
        let (doc, _) = scenario();
        let index = TextPositionIndex::build(&doc);
        assert!(matches!(
            index.range_for(18, 40),
            Err(IndexLookupError::OffsetOutOfBounds { offset: 40, .. })
        ));
    }

    #[test]
    fn index_goes_stale_after_decoration() {
        let (mut doc, _) = scenario();
        let index = TextPositionIndex::build(&doc);
        let range = index.range_for(0, 3).unwrap();
        doc.wrap(&range, 1, crate::spans::palette::PALETTE[0])
            .unwrap();
        assert!(!index.is_current(&doc));
        assert!(TextPositionIndex::build(&doc).is_current(&doc));
    }
}
