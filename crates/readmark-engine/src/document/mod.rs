//! Rendered document model.
//!
//! A [`RenderedDocument`] is an explicit tree standing in for the rendered
//! page: markup elements, text leaves ("fragments") and the decorations the
//! span renderer wraps around ranges of fragments. Every structural mutation
//! bumps the document `version`, which position indexes use to detect that
//! they were built against an older fragment layout.

pub mod html;
pub mod markdown;

use std::fmt;

use crate::spans::index::{FragmentRange, IndexLookupError, Point};
use crate::spans::palette::Color;

/// Stable identifier of a text fragment within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(u32);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Markup structure carried over from the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,
    Heading(u8),
    BlockQuote,
    CodeBlock,
    List { ordered: bool },
    ListItem,
    Emphasis,
    Strong,
    Strikethrough,
    Code,
    Link,
    /// Anything we keep for structure but don't style.
    Other,
}

impl ElementKind {
    /// Block-level elements are separated by a newline fragment.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            ElementKind::Paragraph
                | ElementKind::Heading(_)
                | ElementKind::BlockQuote
                | ElementKind::CodeBlock
                | ElementKind::List { .. }
                | ElementKind::ListItem
        )
    }
}

/// A leaf unit of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub id: FragmentId,
    /// The fragment this piece was split from (itself if never split).
    pub origin: FragmentId,
    pub text: String,
}

impl TextNode {
    /// Length in chars, the unit of flat offsets.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Visual wrapper drawn around one span.
///
/// The badge is an attribute, not a text child, so decorations never
/// contribute to flat offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub number: usize,
    pub color: Color,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(TextNode),
    Element { kind: ElementKind, children: Vec<Node> },
    Decoration(Decoration),
}

impl Node {
    fn children(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Text(_) => None,
            Node::Element { children, .. } => Some(children),
            Node::Decoration(d) => Some(&d.children),
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Text(_) => None,
            Node::Element { children, .. } => Some(children),
            Node::Decoration(d) => Some(&mut d.children),
        }
    }

    /// Total text length of this subtree.
    fn text_len(&self) -> usize {
        match self {
            Node::Text(t) => t.len(),
            _ => self
                .children()
                .map(|c| c.iter().map(Node::text_len).sum())
                .unwrap_or(0),
        }
    }
}

/// Failures while mutating decorations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Lookup(#[from] IndexLookupError),
    #[error("range {start}..{end} crosses an element boundary")]
    CrossesBoundary { start: Point, end: Point },
    #[error("range {start}..{end} selects no content")]
    EmptyRange { start: Point, end: Point },
}

/// Decoration as seen by a reader: its badge, color and covered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecorationView {
    pub number: usize,
    pub color: Color,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    pub(crate) root: Vec<Node>,
    next_id: u32,
    version: u64,
}

impl RenderedDocument {
    /// Flat document made of top-level text fragments, in order.
    pub fn from_fragments<S: AsRef<str>>(fragments: &[S]) -> Self {
        let mut doc = Self::default();
        for text in fragments {
            let node = doc.new_text(text.as_ref().to_string());
            doc.root.push(node);
        }
        doc
    }

    /// Parse Markdown bytes into a rendered document.
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::from_markdown(text))
    }

    pub(crate) fn new_text(&mut self, text: String) -> Node {
        let id = self.allocate_id();
        Node::Text(TextNode {
            id,
            origin: id,
            text,
        })
    }

    fn allocate_id(&mut self) -> FragmentId {
        let id = FragmentId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Structure version, bumped on every decoration mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn nodes(&self) -> &[Node] {
        &self.root
    }

    /// Text fragments in document order, skipping empty ones.
    pub fn fragments(&self) -> Vec<&TextNode> {
        fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a TextNode>) {
            for node in nodes {
                match node {
                    Node::Text(t) if !t.is_empty() => out.push(t),
                    Node::Text(_) => {}
                    _ => {
                        if let Some(children) = node.children() {
                            walk(children, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    pub fn text(&self) -> String {
        self.fragments().iter().map(|t| t.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.root.iter().map(Node::text_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text between two flat offsets, clamped to the document.
    pub fn text_in(&self, start: usize, end: usize) -> String {
        self.text()
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }

    /// Decorations in document order with their flat extents.
    pub fn decorations(&self) -> Vec<DecorationView> {
        fn walk(nodes: &[Node], pos: &mut usize, out: &mut Vec<DecorationView>) {
            for node in nodes {
                match node {
                    Node::Text(t) => *pos += t.len(),
                    Node::Element { children, .. } => walk(children, pos, out),
                    Node::Decoration(d) => {
                        let start = *pos;
                        let slot = out.len();
                        out.push(DecorationView {
                            number: d.number,
                            color: d.color,
                            start,
                            end: start,
                            text: String::new(),
                        });
                        walk(&d.children, pos, out);
                        out[slot].end = *pos;
                        out[slot].text = collect_text(&d.children);
                    }
                }
            }
        }
        let mut out = Vec::new();
        let mut pos = 0;
        walk(&self.root, &mut pos, &mut out);
        out
    }

    /// Surround `range` with a decoration.
    ///
    /// The start and end fragments are split so the decoration covers exactly
    /// the range. Both endpoints must sit in the same child list, or on the
    /// outer edge of an element that is itself in that list.
    pub fn wrap(
        &mut self,
        range: &FragmentRange,
        number: usize,
        color: Color,
    ) -> Result<(), RenderError> {
        if range.version != self.version {
            return Err(IndexLookupError::Stale {
                index_version: range.version,
                document_version: self.version,
            }
            .into());
        }

        let start_path = self
            .path_to(range.start.fragment)
            .ok_or(IndexLookupError::UnknownFragment(range.start.fragment))?;
        let end_path = self
            .path_to(range.end.fragment)
            .ok_or(IndexLookupError::UnknownFragment(range.end.fragment))?;

        let common = common_prefix(&start_path, &end_path)
            .min(start_path.len() - 1)
            .min(end_path.len() - 1);
        let parent = &start_path[..common];

        let start_edge = self.edge(parent, &start_path[common..], range.start.offset, Side::Start);
        let end_edge = self.edge(parent, &end_path[common..], range.end.offset, Side::End);
        let (Some(start_edge), Some(end_edge)) = (start_edge, end_edge) else {
            return Err(RenderError::CrossesBoundary {
                start: range.start,
                end: range.end,
            });
        };

        let (end_id, start_id) = (self.allocate_id(), self.allocate_id());
        let siblings = children_at_mut(&mut self.root, parent).ok_or(
            IndexLookupError::UnknownFragment(range.start.fragment),
        )?;

        // Split the end first so start indexes stay valid.
        let mut hi = match end_edge {
            Edge::Lifted(i) => i + 1,
            Edge::Text(i, offset) => match split_text(siblings, i, offset, end_id) {
                Split::Before => i,
                Split::After | Split::Split => i + 1,
            },
        };
        let lo = match start_edge {
            Edge::Lifted(i) => i,
            Edge::Text(i, offset) => match split_text(siblings, i, offset, start_id) {
                Split::Before => i,
                Split::After => i + 1,
                Split::Split => {
                    hi += 1;
                    i + 1
                }
            },
        };

        // Splits above already changed the fragment layout.
        self.version += 1;
        if lo >= hi {
            return Err(RenderError::EmptyRange {
                start: range.start,
                end: range.end,
            });
        }

        let children: Vec<Node> = siblings.drain(lo..hi).collect();
        siblings.insert(
            lo,
            Node::Decoration(Decoration {
                number,
                color,
                children,
            }),
        );
        Ok(())
    }

    /// Remove every decoration, putting its content back in place.
    ///
    /// Returns the number of decorations removed.
    pub fn unwrap_decorations(&mut self) -> usize {
        fn unwrap(nodes: &mut Vec<Node>) -> usize {
            let mut removed = 0;
            let mut out = Vec::with_capacity(nodes.len());
            for node in nodes.drain(..) {
                match node {
                    Node::Decoration(mut d) => {
                        removed += 1 + unwrap(&mut d.children);
                        out.extend(d.children);
                    }
                    mut other => {
                        if let Some(children) = other.children_mut() {
                            removed += unwrap(children);
                        }
                        out.push(other);
                    }
                }
            }
            *nodes = out;
            removed
        }
        let removed = unwrap(&mut self.root);
        if removed > 0 {
            self.version += 1;
        }
        removed
    }

    /// Merge adjacent pieces that were split from the same fragment.
    ///
    /// Returns the number of merges performed.
    pub fn normalize(&mut self) -> usize {
        fn merge(nodes: &mut Vec<Node>) -> usize {
            let mut merged = 0;
            let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
            for mut node in nodes.drain(..) {
                if let Some(children) = node.children_mut() {
                    merged += merge(children);
                }
                if let (Some(Node::Text(prev)), Node::Text(next)) = (out.last_mut(), &node)
                    && prev.origin == next.origin
                {
                    prev.text.push_str(&next.text);
                    merged += 1;
                    continue;
                }
                out.push(node);
            }
            *nodes = out;
            merged
        }
        let merged = merge(&mut self.root);
        if merged > 0 {
            self.version += 1;
        }
        merged
    }

    fn path_to(&self, id: FragmentId) -> Option<Vec<usize>> {
        fn find(nodes: &[Node], id: FragmentId, path: &mut Vec<usize>) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                let found = match node {
                    Node::Text(t) => t.id == id,
                    _ => node.children().is_some_and(|c| find(c, id, path)),
                };
                if found {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        find(&self.root, id, &mut path).then_some(path)
    }

    /// Resolve an endpoint relative to the child list at `parent`.
    ///
    /// `rel` is the remaining path from that list down to the fragment.
    fn edge(&self, parent: &[usize], rel: &[usize], offset: usize, side: Side) -> Option<Edge> {
        let siblings = children_at(&self.root, parent)?;
        let (&index, below) = rel.split_first()?;
        if below.is_empty() {
            return Some(Edge::Text(index, offset));
        }
        let container = siblings.get(index)?;
        let before = offset_within(container, below)? + offset;
        let at_edge = match side {
            Side::Start => before == 0,
            Side::End => before == container.text_len(),
        };
        at_edge.then_some(Edge::Lifted(index))
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Start,
    End,
}

/// Where an endpoint lands in the common child list.
#[derive(Debug, Clone, Copy)]
enum Edge {
    /// Inside the text node at this index, at a char offset.
    Text(usize, usize),
    /// On the outer edge of the container at this index.
    Lifted(usize),
}

enum Split {
    /// Offset is at the start of the node.
    Before,
    /// Offset is at the end of the node.
    After,
    /// Node was split; the right half now sits at index + 1.
    Split,
}

fn split_text(siblings: &mut Vec<Node>, index: usize, offset: usize, right_id: FragmentId) -> Split {
    let Some(Node::Text(node)) = siblings.get_mut(index) else {
        return Split::After;
    };
    if offset == 0 {
        return Split::Before;
    }
    if offset >= node.len() {
        return Split::After;
    }
    let byte = node
        .text
        .char_indices()
        .nth(offset)
        .map(|(b, _)| b)
        .unwrap_or(node.text.len());
    let right = Node::Text(TextNode {
        id: right_id,
        origin: node.origin,
        text: node.text.split_off(byte),
    });
    siblings.insert(index + 1, right);
    Split::Split
}

fn children_at<'a>(root: &'a [Node], path: &[usize]) -> Option<&'a [Node]> {
    let mut nodes = root;
    for &i in path {
        nodes = nodes.get(i)?.children()?;
    }
    Some(nodes)
}

fn children_at_mut<'a>(root: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Vec<Node>> {
    let mut nodes = root;
    for &i in path {
        nodes = nodes.get_mut(i)?.children_mut()?;
    }
    Some(nodes)
}

/// Chars preceding the node at `path` inside `container`.
fn offset_within(container: &Node, path: &[usize]) -> Option<usize> {
    let mut before = 0;
    let mut node = container;
    for &i in path {
        let children = node.children()?;
        before += children[..i.min(children.len())]
            .iter()
            .map(Node::text_len)
            .sum::<usize>();
        node = children.get(i)?;
    }
    Some(before)
}

fn common_prefix(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn collect_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&t.text),
            _ => {
                if let Some(children) = node.children() {
                    out.push_str(&collect_text(children));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::index::TextPositionIndex;
    use crate::spans::palette::PALETTE;
    use pretty_assertions::assert_eq;

    fn wrap_range(doc: &mut RenderedDocument, start: usize, end: usize, number: usize) {
        let index = TextPositionIndex::build(doc);
        let range = index.range_for(start, end).unwrap();
        doc.wrap(&range, number, PALETTE[0]).unwrap();
    }

    #[test]
    fn wrap_splits_fragment_into_three() {
        let mut doc = RenderedDocument::from_fragments(&["Hello world"]);
        wrap_range(&mut doc, 2, 7, 1);

        let texts: Vec<_> = doc.fragments().iter().map(|t| t.text.clone()).collect();
        assert_eq!(texts, vec!["He", "llo w", "orld"]);
        assert_eq!(doc.text(), "Hello world");
        assert_eq!(doc.decorations()[0].text, "llo w");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn wrap_covers_several_fragments() {
        let mut doc = RenderedDocument::from_fragments(&["Hello ", "world. ", "Goodbye."]);
        wrap_range(&mut doc, 3, 15, 1);

        let view = &doc.decorations()[0];
        assert_eq!((view.start, view.end), (3, 15));
        assert_eq!(view.text, "lo world. Go");
    }

    #[test]
    fn wrap_whole_fragment_does_not_split() {
        let mut doc = RenderedDocument::from_fragments(&["Hello ", "world. "]);
        wrap_range(&mut doc, 6, 13, 1);

        assert_eq!(doc.fragments().len(), 2);
        assert!(matches!(doc.nodes()[1], Node::Decoration(_)));
    }

    #[test]
    fn wrap_handles_multibyte_text() {
        let mut doc = RenderedDocument::from_fragments(&["日本語の文章です"]);
        wrap_range(&mut doc, 2, 5, 1);
        assert_eq!(doc.decorations()[0].text, "語の文");
    }

    #[test]
    fn wrap_rejects_stale_range() {
        let mut doc = RenderedDocument::from_fragments(&["Hello world"]);
        let index = TextPositionIndex::build(&doc);
        let first = index.range_for(0, 2).unwrap();
        let second = index.range_for(6, 8).unwrap();

        doc.wrap(&first, 1, PALETTE[0]).unwrap();
        let err = doc.wrap(&second, 2, PALETTE[1]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Lookup(IndexLookupError::Stale { .. })
        ));
    }

    #[test]
    fn wrap_lifts_endpoints_on_element_edges() {
        let mut doc = RenderedDocument::from_markdown("Say *hello* now");
        // "hello" is the whole emphasis element.
        wrap_range(&mut doc, 4, 9, 1);
        let view = &doc.decorations()[0];
        assert_eq!(view.text, "hello");
        // Range spilling out of the emphasis also lifts.
        doc.unwrap_decorations();
        doc.normalize();
        wrap_range(&mut doc, 0, 11, 2);
        assert_eq!(doc.decorations()[0].text, "Say hello n");
    }

    #[test]
    fn wrap_rejects_partial_element() {
        let mut doc = RenderedDocument::from_markdown("Say *hello* now");
        let index = TextPositionIndex::build(&doc);
        let range = index.range_for(2, 6).unwrap();
        let err = doc.wrap(&range, 1, PALETTE[0]).unwrap_err();
        assert!(matches!(err, RenderError::CrossesBoundary { .. }));
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn unwrap_and_normalize_restore_baseline() {
        let baseline = RenderedDocument::from_fragments(&["Hello ", "world. ", "Goodbye."]);
        let mut doc = baseline.clone();
        wrap_range(&mut doc, 1, 4, 1);
        wrap_range(&mut doc, 8, 16, 2);

        assert_eq!(doc.unwrap_decorations(), 2);
        assert!(doc.normalize() > 0);
        assert_eq!(doc.nodes(), baseline.nodes());
    }

    #[test]
    fn normalize_keeps_distinct_fragments_apart() {
        let mut doc = RenderedDocument::from_fragments(&["a", "b"]);
        assert_eq!(doc.normalize(), 0);
        assert_eq!(doc.fragments().len(), 2);
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn text_in_clamps_to_document() {
        let doc = RenderedDocument::from_fragments(&["Hello ", "world."]);
        assert_eq!(doc.text_in(6, 11), "world");
        assert_eq!(doc.text_in(10, 50), "d.");
        assert_eq!(doc.text_in(5, 2), "");
    }
}
