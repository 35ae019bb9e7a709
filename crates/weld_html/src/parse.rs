//! Tolerant tree builder. Structural characters are all ASCII, so scanning
//! bytes and slicing the source string at those positions is UTF-8 safe.

use crate::{is_void_tag, Attr, Document, HtmlError, NodeId, NodeKind, QuoteStyle, ROOT};

/// Elements whose content is opaque text up to the matching end tag.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "title", "textarea"];

fn is_raw_text_tag(tag: &str) -> bool {
    RAW_TEXT_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t))
}

pub fn parse_document(text: &str) -> Result<Document, HtmlError> {
    let parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        doc: Document::new(),
        stack: vec![ROOT],
    };
    parser.run()
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    doc: Document,
    stack: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn run(mut self) -> Result<Document, HtmlError> {
        let len = self.bytes.len();
        while self.pos < len {
            let start = self.pos;
            while self.pos < len && self.bytes[self.pos] != b'<' {
                self.pos += 1;
            }
            if self.pos > start {
                let text = self.text[start..self.pos].to_string();
                self.append_node(NodeKind::Text(text));
            }
            if self.pos >= len {
                break;
            }
            let rest = &self.bytes[self.pos..];
            if rest.starts_with(b"<!--") {
                self.parse_comment()?;
            } else if rest.starts_with(b"<!") {
                self.parse_declaration()?;
            } else if rest.starts_with(b"</") && rest.get(2).is_some_and(u8::is_ascii_alphabetic) {
                self.parse_end_tag()?;
            } else if rest.get(1).is_some_and(u8::is_ascii_alphabetic) {
                self.parse_start_tag()?;
            } else {
                // A lone '<' that opens nothing is literal text.
                self.append_node(NodeKind::Text("<".to_string()));
                self.pos += 1;
            }
        }
        Ok(self.doc)
    }

    fn current(&self) -> NodeId {
        *self.stack.last().unwrap_or(&ROOT)
    }

    fn append_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.doc.push_node(kind);
        let parent = self.current();
        self.doc.append_child(parent, id);
        id
    }

    fn parse_comment(&mut self) -> Result<(), HtmlError> {
        let body_start = self.pos + 4;
        match find_sub(self.bytes, b"-->", body_start) {
            Some(end) => {
                let raw = self.text[body_start..end].to_string();
                self.append_node(NodeKind::Comment(raw));
                self.pos = end + 3;
                Ok(())
            }
            None => Err(HtmlError(format!(
                "unterminated comment at byte {}",
                self.pos
            ))),
        }
    }

    fn parse_declaration(&mut self) -> Result<(), HtmlError> {
        let body_start = self.pos + 2;
        match self.bytes[body_start..].iter().position(|b| *b == b'>') {
            Some(offset) => {
                let end = body_start + offset;
                let raw = self.text[body_start..end].to_string();
                self.append_node(NodeKind::Doctype(raw));
                self.pos = end + 1;
                Ok(())
            }
            None => Err(HtmlError(format!(
                "unterminated markup declaration at byte {}",
                self.pos
            ))),
        }
    }

    fn parse_end_tag(&mut self) -> Result<(), HtmlError> {
        let name_start = self.pos + 2;
        let mut end = name_start;
        while end < self.bytes.len() && is_tag_name_byte(self.bytes[end]) {
            end += 1;
        }
        let name = &self.text[name_start..end];
        match self.bytes[end..].iter().position(|b| *b == b'>') {
            Some(offset) => {
                self.pos = end + offset + 1;
            }
            None => {
                return Err(HtmlError(format!(
                    "unterminated end tag </{} at byte {}",
                    name, self.pos
                )))
            }
        }
        // Pop to the nearest matching open element; a stray end tag with no
        // matching open element is dropped.
        let matching = self.stack.iter().rposition(|id| {
            matches!(self.doc.kind(*id), NodeKind::Element { tag, .. } if tag.eq_ignore_ascii_case(name))
        });
        if let Some(index) = matching {
            self.stack.truncate(index);
        }
        Ok(())
    }

    fn parse_start_tag(&mut self) -> Result<(), HtmlError> {
        let tag_at = self.pos;
        let name_start = self.pos + 1;
        let mut end = name_start;
        while end < self.bytes.len() && is_tag_name_byte(self.bytes[end]) {
            end += 1;
        }
        let name = self.text[name_start..end].to_string();
        self.pos = end;

        let mut attrs: Vec<Attr> = Vec::new();
        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(HtmlError(format!(
                    "unterminated start tag <{} at byte {}",
                    name, tag_at
                )));
            };
            if byte == b'>' {
                self.pos += 1;
                break;
            }
            if byte == b'/' && self.bytes.get(self.pos + 1) == Some(&b'>') {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if byte == b'/' || byte == b'=' {
                // Stray punctuation inside the tag; skip it.
                self.pos += 1;
                continue;
            }
            let attr = self.parse_attribute(&name, tag_at)?;
            attrs.push(attr);
        }

        let element = self.append_node(NodeKind::Element {
            tag: name.clone(),
            attrs,
            self_closing,
        });
        if self_closing || is_void_tag(&name) {
            return Ok(());
        }
        if is_raw_text_tag(&name) {
            return self.consume_raw_text(element, &name);
        }
        self.stack.push(element);
        Ok(())
    }

    fn parse_attribute(&mut self, tag: &str, tag_at: usize) -> Result<Attr, HtmlError> {
        let name_start = self.pos;
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            if byte.is_ascii_whitespace() || byte == b'=' || byte == b'>' || byte == b'/' {
                break;
            }
            self.pos += 1;
        }
        let name = self.text[name_start..self.pos].to_string();
        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'=') {
            return Ok(Attr {
                name,
                value: None,
                quote: QuoteStyle::Bare,
            });
        }
        self.pos += 1;
        self.skip_whitespace();
        match self.bytes.get(self.pos) {
            Some(&quote @ (b'"' | b'\'')) => {
                let value_start = self.pos + 1;
                match self.bytes[value_start..].iter().position(|b| *b == quote) {
                    Some(offset) => {
                        let value =
                            decode_quoted_value(&self.text[value_start..value_start + offset], quote);
                        self.pos = value_start + offset + 1;
                        Ok(Attr {
                            name,
                            value: Some(value),
                            quote: if quote == b'"' {
                                QuoteStyle::Double
                            } else {
                                QuoteStyle::Single
                            },
                        })
                    }
                    None => Err(HtmlError(format!(
                        "unterminated attribute value for {} in <{} at byte {}",
                        name, tag, tag_at
                    ))),
                }
            }
            _ => {
                let value_start = self.pos;
                while self.pos < self.bytes.len() {
                    let byte = self.bytes[self.pos];
                    if byte.is_ascii_whitespace() || byte == b'>' {
                        break;
                    }
                    if byte == b'/' && self.bytes.get(self.pos + 1) == Some(&b'>') {
                        break;
                    }
                    self.pos += 1;
                }
                let value = self.text[value_start..self.pos].to_string();
                Ok(Attr {
                    name,
                    value: Some(value),
                    quote: QuoteStyle::Bare,
                })
            }
        }
    }

    /// Opaque content up to the matching end tag. EOF before the end tag is
    /// tolerated: the rest of the input becomes the element's text.
    fn consume_raw_text(&mut self, element: NodeId, tag: &str) -> Result<(), HtmlError> {
        let close = format!("</{}", tag);
        match find_sub_ci(self.bytes, close.as_bytes(), self.pos) {
            Some(end_at) => {
                if end_at > self.pos {
                    let text = self.text[self.pos..end_at].to_string();
                    let node = self.doc.push_node(NodeKind::Text(text));
                    self.doc.append_child(element, node);
                }
                match self.bytes[end_at..].iter().position(|b| *b == b'>') {
                    Some(offset) => {
                        self.pos = end_at + offset + 1;
                        Ok(())
                    }
                    None => Err(HtmlError(format!(
                        "unterminated end tag </{} at byte {}",
                        tag, end_at
                    ))),
                }
            }
            None => {
                if self.pos < self.bytes.len() {
                    let text = self.text[self.pos..].to_string();
                    let node = self.doc.push_node(NodeKind::Text(text));
                    self.doc.append_child(element, node);
                }
                self.pos = self.bytes.len();
                Ok(())
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.pos += 1;
        }
    }
}

/// Decode the entity for the value's own quote character, the one entity the
/// serializer emits. Everything else stays verbatim so untouched markup
/// round-trips byte-identical.
fn decode_quoted_value(raw: &str, quote: u8) -> String {
    let (entity, literal) = if quote == b'"' {
        ("&quot;", "\"")
    } else {
        ("&#39;", "'")
    };
    if raw.contains(entity) {
        raw.replace(entity, literal)
    } else {
        raw.to_string()
    }
}

fn is_tag_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b':'
}

fn find_sub(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_sub_ci(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|offset| from + offset)
}
