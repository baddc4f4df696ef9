use pulldown_cmark::{Event, Parser, Tag};

use super::{ElementKind, Node, RenderedDocument};

impl RenderedDocument {
    /// Render Markdown into a document tree.
    ///
    /// Text-bearing events become fragments. Consecutive blocks are separated
    /// by a `"\n"` fragment so the flat text reads like the rendered page.
    pub fn from_markdown(markdown: &str) -> Self {
        let mut doc = RenderedDocument::default();
        // Open elements; the bottom frame is the document root.
        let mut stack: Vec<(ElementKind, Vec<Node>)> = vec![(ElementKind::Other, Vec::new())];

        for event in Parser::new(markdown) {
            match event {
                Event::Start(tag) => {
                    let kind = element_kind(&tag);
                    if kind.is_block() && stack.last().is_some_and(|(_, s)| !s.is_empty()) {
                        push_text(&mut doc, &mut stack, "\n".to_string());
                    }
                    stack.push((kind, Vec::new()));
                }
                Event::End(_) => {
                    if stack.len() > 1
                        && let Some((kind, children)) = stack.pop()
                        && let Some((_, parent)) = stack.last_mut()
                    {
                        parent.push(Node::Element { kind, children });
                    }
                }
                Event::Text(text)
                | Event::FootnoteReference(text)
                | Event::InlineMath(text)
                | Event::DisplayMath(text) => push_text(&mut doc, &mut stack, text.to_string()),
                Event::Code(text) => {
                    let node = doc.new_text(text.to_string());
                    if let Some((_, siblings)) = stack.last_mut() {
                        siblings.push(Node::Element {
                            kind: ElementKind::Code,
                            children: vec![node],
                        });
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    push_text(&mut doc, &mut stack, "\n".to_string())
                }
                _ => {}
            }
        }

        // Unbalanced input can leave frames open; fold them into their parents.
        while stack.len() > 1 {
            if let Some((kind, children)) = stack.pop()
                && let Some((_, parent)) = stack.last_mut()
            {
                parent.push(Node::Element { kind, children });
            }
        }
        if let Some((_, root)) = stack.pop() {
            doc.root = root;
        }
        doc
    }
}

fn push_text(doc: &mut RenderedDocument, stack: &mut [(ElementKind, Vec<Node>)], text: String) {
    if text.is_empty() {
        return;
    }
    let node = doc.new_text(text);
    if let Some((_, siblings)) = stack.last_mut() {
        siblings.push(node);
    }
}

fn element_kind(tag: &Tag<'_>) -> ElementKind {
    match tag {
        Tag::Paragraph => ElementKind::Paragraph,
        Tag::Heading { level, .. } => ElementKind::Heading(*level as u8),
        Tag::BlockQuote(_) => ElementKind::BlockQuote,
        Tag::CodeBlock(_) => ElementKind::CodeBlock,
        Tag::List(start) => ElementKind::List {
            ordered: start.is_some(),
        },
        Tag::Item => ElementKind::ListItem,
        Tag::Emphasis => ElementKind::Emphasis,
        Tag::Strong => ElementKind::Strong,
        Tag::Strikethrough => ElementKind::Strikethrough,
        Tag::Link { .. } => ElementKind::Link,
        _ => ElementKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(doc: &RenderedDocument) -> Vec<String> {
        doc.fragments().iter().map(|t| t.text.clone()).collect()
    }

    #[test]
    fn paragraphs_are_separated_by_newline_fragments() {
        let doc = RenderedDocument::from_markdown("First para.\n\nSecond para.");
        assert_eq!(texts(&doc), vec!["First para.", "\n", "Second para."]);
        assert_eq!(doc.text(), "First para.\nSecond para.");
    }

    #[test]
    fn inline_markup_splits_fragments() {
        let doc = RenderedDocument::from_markdown("Say *hello* to `code` now");
        assert_eq!(texts(&doc), vec!["Say ", "hello", " to ", "code", " now"]);
        assert_eq!(doc.text(), "Say hello to code now");
    }

    #[test]
    fn soft_breaks_become_newlines() {
        let doc = RenderedDocument::from_markdown("line one\nline two");
        assert_eq!(doc.text(), "line one\nline two");
    }

    #[test]
    fn headings_keep_their_level() {
        let doc = RenderedDocument::from_markdown("## Title\n\nBody");
        assert!(matches!(
            doc.nodes()[0],
            Node::Element {
                kind: ElementKind::Heading(2),
                ..
            }
        ));
        assert_eq!(doc.text(), "Title\nBody");
    }

    #[test]
    fn empty_markdown_has_no_fragments() {
        let doc = RenderedDocument::from_markdown("");
        assert!(doc.fragments().is_empty());
        assert!(doc.is_empty());
    }

    #[test]
    fn from_bytes_rejects_invalid_utf8() {
        assert!(RenderedDocument::from_bytes(&[0xff, 0xfe]).is_err());
    }
}
