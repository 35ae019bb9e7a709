//! Lenient HTML tree used as the mutation medium for section editing.
//!
//! The parser is tolerant in the way a browser is tolerant: unknown tags,
//! stray end tags, and unclosed elements are accepted. Text and comments are
//! stored verbatim, and attribute values only translate the entity for their
//! own quote character, so a parse/serialize round trip of untouched markup
//! is byte-identical — edits produce no spurious diffs.

mod parse;

pub use parse::parse_document;

use std::fmt;

pub type NodeId = usize;

#[derive(Debug)]
pub struct HtmlError(pub String);

impl fmt::Display for HtmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "html parse error: {}", self.0)
    }
}

impl std::error::Error for HtmlError {}

/// Quote style an attribute value was written with, preserved on serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Double,
    Single,
    Bare,
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
    pub quote: QuoteStyle,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Element {
        tag: String,
        attrs: Vec<Attr>,
        self_closing: bool,
    },
    Text(String),
    Comment(String),
    /// Raw text between `<!` and `>`, e.g. `DOCTYPE html`.
    Doctype(String),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

/// An HTML document (or fragment) as an arena of nodes rooted at node 0.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) nodes: Vec<NodeData>,
}

pub(crate) const ROOT: NodeId = 0;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
    "param", "source", "track", "wbr",
];

pub(crate) fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t))
}

impl Document {
    /// Parse a full document or a bare fragment. Both go through the same
    /// tolerant tree builder.
    pub fn parse(text: &str) -> Result<Document, HtmlError> {
        parse_document(text)
    }

    pub(crate) fn new() -> Document {
        Document {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                children: Vec::new(),
            }],
        }
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub(crate) fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str, attrs: Vec<Attr>) -> NodeId {
        self.push_node(NodeKind::Element {
            tag: tag.to_string(),
            attrs,
            self_closing: false,
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
    }

    /// Lowercased tag name, or None for non-element nodes.
    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag.to_ascii_lowercase()),
            _ => None,
        }
    }

    /// First element in document order carrying `name="value"`.
    pub fn find_by_attr(&self, name: &str, value: &str) -> Option<NodeId> {
        self.walk(|doc, id| match doc.kind(id) {
            NodeKind::Element { attrs, .. } => attrs.iter().any(|a| {
                a.name.eq_ignore_ascii_case(name) && a.value.as_deref() == Some(value)
            }),
            _ => false,
        })
    }

    /// First element in document order with the given tag name.
    pub fn find_first_tag(&self, tag: &str) -> Option<NodeId> {
        self.walk(|doc, id| match doc.kind(id) {
            NodeKind::Element { tag: t, .. } => t.eq_ignore_ascii_case(tag),
            _ => false,
        })
    }

    /// True when any element carries `id="value"`.
    pub fn has_element_id(&self, value: &str) -> bool {
        self.find_by_attr("id", value).is_some()
    }

    fn walk<F>(&self, accept: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        let mut stack: Vec<NodeId> = self.nodes[ROOT].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if accept(self, id) {
                return Some(id);
            }
            for child in self.nodes[id].children.iter().rev() {
                stack.push(*child);
            }
        }
        None
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .and_then(|a| a.value.as_deref()),
            _ => None,
        }
    }

    /// Set an attribute, updating in place (keeping its position and quote
    /// style) when it already exists.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            if let Some(attr) = attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
                if attr.quote == QuoteStyle::Bare {
                    attr.quote = QuoteStyle::Double;
                }
                attr.value = Some(value.to_string());
            } else {
                attrs.push(Attr {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                    quote: QuoteStyle::Double,
                });
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            attrs.retain(|a| !a.name.eq_ignore_ascii_case(name));
        }
    }

    /// Serialize the children of a node, i.e. its inner HTML.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in &self.nodes[id].children {
            self.write_node(*child, &mut out);
        }
        out
    }

    /// Replace a node's children with the parse of `html`.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Result<(), HtmlError> {
        let fragment = Document::parse(html)?;
        self.nodes[id].children.clear();
        let roots: Vec<NodeId> = fragment.nodes[ROOT].children.clone();
        for root in roots {
            let grafted = self.graft(&fragment, root);
            self.nodes[id].children.push(grafted);
        }
        // A self-closing element that received children must serialize with
        // a real end tag from now on.
        if let NodeKind::Element { self_closing, .. } = &mut self.nodes[id].kind {
            *self_closing = false;
        }
        Ok(())
    }

    fn graft(&mut self, other: &Document, other_id: NodeId) -> NodeId {
        let id = self.push_node(other.nodes[other_id].kind.clone());
        for child in &other.nodes[other_id].children {
            let grafted = self.graft(other, *child);
            self.nodes[id].children.push(grafted);
        }
        id
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for child in &self.nodes[ROOT].children {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Root => {}
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(raw) => {
                out.push_str("<!--");
                out.push_str(raw);
                out.push_str("-->");
            }
            NodeKind::Doctype(raw) => {
                out.push_str("<!");
                out.push_str(raw);
                out.push('>');
            }
            NodeKind::Element {
                tag,
                attrs,
                self_closing,
            } => {
                out.push('<');
                out.push_str(tag);
                for attr in attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if let Some(value) = &attr.value {
                        // The one character a quoted value cannot hold
                        // literally is its own quote; it goes through the
                        // entity the parser decodes back.
                        match attr.quote {
                            QuoteStyle::Double => {
                                out.push_str("=\"");
                                if value.contains('"') {
                                    out.push_str(&value.replace('"', "&quot;"));
                                } else {
                                    out.push_str(value);
                                }
                                out.push('"');
                            }
                            QuoteStyle::Single => {
                                out.push_str("='");
                                if value.contains('\'') {
                                    out.push_str(&value.replace('\'', "&#39;"));
                                } else {
                                    out.push_str(value);
                                }
                                out.push('\'');
                            }
                            QuoteStyle::Bare => {
                                out.push('=');
                                out.push_str(value);
                            }
                        }
                    }
                }
                if *self_closing && self.nodes[id].children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &self.nodes[id].children {
                    self.write_node(*child, out);
                }
                if !is_void_tag(tag) {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_byte_identical() {
        let src = "<!DOCTYPE html>\n<html>\n<head><title>T</title></head>\n<body>\n  <h1 data-id=\"hero-title\" class='big'>Old</h1>\n  <br/>\n  <!-- note -->\n</body>\n</html>\n";
        let doc = Document::parse(src).unwrap();
        assert_eq!(doc.serialize(), src);
    }

    #[test]
    fn find_by_attr_matches_first_in_document_order() {
        let doc =
            Document::parse("<div><p data-id=\"x\">a</p></div><p data-id=\"x\">b</p>").unwrap();
        let id = doc.find_by_attr("data-id", "x").unwrap();
        assert_eq!(doc.inner_html(id), "a");
    }

    #[test]
    fn set_inner_html_replaces_children_only() {
        let mut doc = Document::parse("<div data-id=\"d\"><b>old</b></div><p>keep</p>").unwrap();
        let id = doc.find_by_attr("data-id", "d").unwrap();
        doc.set_inner_html(id, "<i>new</i>").unwrap();
        assert_eq!(doc.serialize(), "<div data-id=\"d\"><i>new</i></div><p>keep</p>");
    }

    #[test]
    fn set_inner_html_empty_clears_element() {
        let mut doc = Document::parse("<span data-id=\"s\">text</span>").unwrap();
        let id = doc.find_by_attr("data-id", "s").unwrap();
        doc.set_inner_html(id, "").unwrap();
        assert_eq!(doc.serialize(), "<span data-id=\"s\"></span>");
    }

    #[test]
    fn attribute_update_preserves_order_and_quotes() {
        let mut doc = Document::parse("<a href='old' data-id=\"l\">x</a>").unwrap();
        let id = doc.find_by_attr("data-id", "l").unwrap();
        doc.set_attr(id, "href", "new");
        assert_eq!(doc.serialize(), "<a href='new' data-id=\"l\">x</a>");
    }

    #[test]
    fn attribute_value_containing_its_quote_round_trips() {
        let mut doc = Document::parse("<a data-id=\"l\" href=\"/x\">x</a>").unwrap();
        let id = doc.find_by_attr("data-id", "l").unwrap();
        doc.set_attr(id, "href", "a\"b");
        let serialized = doc.serialize();
        assert_eq!(serialized, "<a data-id=\"l\" href=\"a&quot;b\">x</a>");
        let reparsed = Document::parse(&serialized).unwrap();
        let id = reparsed.find_by_attr("data-id", "l").unwrap();
        assert_eq!(reparsed.attr(id, "href"), Some("a\"b"));
    }

    #[test]
    fn single_quoted_value_escapes_single_quotes() {
        let mut doc = Document::parse("<a href='old' data-id=\"l\">x</a>").unwrap();
        let id = doc.find_by_attr("data-id", "l").unwrap();
        doc.set_attr(id, "href", "it's");
        let serialized = doc.serialize();
        assert_eq!(serialized, "<a href='it&#39;s' data-id=\"l\">x</a>");
        let reparsed = Document::parse(&serialized).unwrap();
        let id = reparsed.find_by_attr("data-id", "l").unwrap();
        assert_eq!(reparsed.attr(id, "href"), Some("it's"));
    }

    #[test]
    fn attribute_remove_and_insert() {
        let mut doc = Document::parse("<a href=\"h\" target=\"_blank\">x</a>").unwrap();
        let id = doc.find_first_tag("a").unwrap();
        doc.remove_attr(id, "target");
        doc.set_attr(id, "rel", "noopener");
        assert_eq!(doc.serialize(), "<a href=\"h\" rel=\"noopener\">x</a>");
    }

    #[test]
    fn script_content_is_raw_text() {
        let src = "<script>if (a < b && x) { run(\"<div>\"); }</script>";
        let doc = Document::parse(src).unwrap();
        assert_eq!(doc.serialize(), src);
        let id = doc.find_first_tag("script").unwrap();
        assert_eq!(doc.inner_html(id), "if (a < b && x) { run(\"<div>\"); }");
    }

    #[test]
    fn stray_end_tag_is_ignored() {
        let doc = Document::parse("<p>a</span>b</p>").unwrap();
        assert_eq!(doc.serialize(), "<p>ab</p>");
    }

    #[test]
    fn append_child_builds_injection_shape() {
        let mut doc = Document::parse("<head><title>t</title></head>").unwrap();
        let head = doc.find_first_tag("head").unwrap();
        let script = doc.create_element(
            "script",
            vec![Attr {
                name: "id".to_string(),
                value: Some("injection-abc".to_string()),
                quote: QuoteStyle::Double,
            }],
        );
        let text = doc.create_text("console.log(1);");
        doc.append_child(script, text);
        doc.append_child(head, script);
        assert_eq!(
            doc.serialize(),
            "<head><title>t</title><script id=\"injection-abc\">console.log(1);</script></head>"
        );
        assert!(doc.has_element_id("injection-abc"));
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert!(Document::parse("<p>a</p><!-- oops").is_err());
    }
}
