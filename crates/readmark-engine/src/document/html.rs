use std::fmt::Write;

use super::{Decoration, ElementKind, Node, RenderedDocument};

impl RenderedDocument {
    /// Serialize the document, decorations included, as HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&mut out, &self.root);
        out
    }
}

fn write_nodes(out: &mut String, nodes: &[Node]) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&html_escape::encode_text(&t.text)),
            Node::Element { kind, children } => {
                let tag = tag_name(kind);
                let _ = write!(out, "<{tag}>");
                write_nodes(out, children);
                let _ = write!(out, "</{tag}>");
            }
            Node::Decoration(d) => write_decoration(out, d),
        }
    }
}

fn write_decoration(out: &mut String, d: &Decoration) {
    let _ = write!(
        out,
        r#"<span class="user-defined-paragraph" data-paragraph-number="{n}" style="border-left: 3px solid {border}; background-color: {bg};">"#,
        n = d.number,
        border = d.color.css(0.4),
        bg = d.color.css(0.1),
    );
    write_nodes(out, &d.children);
    let _ = write!(
        out,
        r#"<span class="paragraph-badge" style="background-color: {badge};">{n}</span></span>"#,
        n = d.number,
        badge = d.color.css(0.8),
    );
}

fn tag_name(kind: &ElementKind) -> String {
    match kind {
        ElementKind::Paragraph => "p".into(),
        ElementKind::Heading(level) => format!("h{level}"),
        ElementKind::BlockQuote => "blockquote".into(),
        ElementKind::CodeBlock => "pre".into(),
        ElementKind::List { ordered: true } => "ol".into(),
        ElementKind::List { ordered: false } => "ul".into(),
        ElementKind::ListItem => "li".into(),
        ElementKind::Emphasis => "em".into(),
        ElementKind::Strong => "strong".into(),
        ElementKind::Strikethrough => "del".into(),
        ElementKind::Code => "code".into(),
        ElementKind::Link => "a".into(),
        ElementKind::Other => "span".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::index::TextPositionIndex;
    use crate::spans::palette::PALETTE;

    #[test]
    fn plain_markdown_renders_elements() {
        let doc = RenderedDocument::from_markdown("Say *hi* & bye");
        insta::assert_snapshot!(doc.to_html(), @"<p>Say <em>hi</em> &amp; bye</p>");
    }

    #[test]
    fn decoration_renders_with_badge() {
        let mut doc = RenderedDocument::from_fragments(&["ab"]);
        let index = TextPositionIndex::build(&doc);
        let range = index.range_for(0, 1).unwrap();
        doc.wrap(&range, 1, PALETTE[0]).unwrap();

        insta::assert_snapshot!(
            doc.to_html(),
            @r#"<span class="user-defined-paragraph" data-paragraph-number="1" style="border-left: 3px solid rgba(255, 99, 132, 0.4); background-color: rgba(255, 99, 132, 0.1);">a<span class="paragraph-badge" style="background-color: rgba(255, 99, 132, 0.8);">1</span></span>b"#
        );
    }
}
