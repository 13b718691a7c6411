//! Markup fragment scanner
//!
//! Add and paste responses arrive as serialized markup fragments. This is a
//! hand-rolled scanner over the small, regular subset those fragments use:
//! elements, double- or single-quoted attributes, self-closing tags, void
//! tags, comments and character references. Anything outside that subset is
//! an [`EditError::MalformedFragment`] rather than a guess.
//!
//! Whitespace-only text between elements is indentation from the serializer,
//! not content, and is dropped on the way in.

use crate::form::dom::{Document, NodeId};
use crate::form::error::{EditError, EditResult};

/// Tags that never have a closing tag.
const VOID_TAGS: &[&str] = &["input", "br", "hr", "img", "meta", "link"];

/// Parse `markup` into `doc`, returning the top-level elements in order.
/// The returned elements are detached; the caller decides where they attach.
pub fn parse_into(doc: &mut Document, markup: &str) -> EditResult<Vec<NodeId>> {
    let mut scanner = Scanner {
        input: markup.as_bytes(),
        pos: 0,
    };
    let mut roots = Vec::new();
    // Stack of open elements; text and children attach to the innermost.
    let mut open: Vec<NodeId> = Vec::new();

    loop {
        scanner.skip_insignificant();
        if scanner.at_end() {
            break;
        }
        if scanner.peek() != b'<' {
            let text = scanner.take_text();
            if let Some(&parent) = open.last() {
                doc.append_text(parent, &decode_entities(&text));
            }
            // Text outside any element is serializer noise, dropped.
            continue;
        }
        if scanner.starts_with("<!--") {
            scanner.skip_comment()?;
            continue;
        }
        if scanner.starts_with("</") {
            let tag = scanner.take_close_tag()?;
            let top = open
                .pop()
                .ok_or_else(|| malformed(format!("unexpected closing tag </{}>", tag)))?;
            if doc.tag(top) != tag {
                return Err(malformed(format!(
                    "closing tag </{}> does not match open <{}>",
                    tag,
                    doc.tag(top)
                )));
            }
            if open.is_empty() {
                roots.push(top);
            }
            continue;
        }
        let (node, self_closing) = scanner.take_open_tag(doc)?;
        if let Some(&parent) = open.last() {
            doc.append_child(parent, node);
        }
        let is_void = VOID_TAGS.contains(&doc.tag(node));
        if self_closing || is_void {
            if open.is_empty() {
                roots.push(node);
            }
        } else {
            open.push(node);
        }
    }

    if let Some(&top) = open.last() {
        return Err(malformed(format!("unclosed element <{}>", doc.tag(top))));
    }
    if roots.is_empty() {
        return Err(malformed("empty fragment".to_string()));
    }
    Ok(roots)
}

fn malformed(msg: String) -> EditError {
    EditError::MalformedFragment(msg)
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> u8 {
        self.input[self.pos]
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix.as_bytes())
    }

    /// Skip whitespace when the next non-whitespace byte opens a tag, so that
    /// indentation between elements never becomes a text node. Whitespace
    /// that runs into real text is kept as part of that text.
    fn skip_insignificant(&mut self) {
        let mut ahead = self.pos;
        while ahead < self.input.len() && self.input[ahead].is_ascii_whitespace() {
            ahead += 1;
        }
        if ahead >= self.input.len() || self.input[ahead] == b'<' {
            self.pos = ahead;
        }
    }

    fn take_text(&mut self) -> String {
        let start = self.pos;
        while !self.at_end() && self.peek() != b'<' {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn skip_comment(&mut self) -> EditResult<()> {
        self.pos += 4;
        while self.pos < self.input.len() {
            if self.input[self.pos..].starts_with(b"-->") {
                self.pos += 3;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(malformed("unterminated comment".to_string()))
    }

    fn take_name(&mut self) -> EditResult<String> {
        let start = self.pos;
        while !self.at_end() {
            let b = self.peek();
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(malformed(format!("expected a name at byte {}", start)));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn skip_spaces(&mut self) {
        while !self.at_end() && self.peek().is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn take_close_tag(&mut self) -> EditResult<String> {
        self.pos += 2;
        let tag = self.take_name()?;
        self.skip_spaces();
        if self.at_end() || self.peek() != b'>' {
            return Err(malformed(format!("unterminated closing tag </{}", tag)));
        }
        self.pos += 1;
        Ok(tag)
    }

    fn take_open_tag(&mut self, doc: &mut Document) -> EditResult<(NodeId, bool)> {
        self.pos += 1;
        let tag = self.take_name()?;
        let node = doc.create_element(&tag);
        loop {
            self.skip_spaces();
            if self.at_end() {
                return Err(malformed(format!("unterminated tag <{}", tag)));
            }
            match self.peek() {
                b'>' => {
                    self.pos += 1;
                    return Ok((node, false));
                }
                b'/' => {
                    self.pos += 1;
                    if self.at_end() || self.peek() != b'>' {
                        return Err(malformed(format!("stray '/' in tag <{}", tag)));
                    }
                    self.pos += 1;
                    return Ok((node, true));
                }
                _ => {
                    let name = self.take_name()?;
                    self.skip_spaces();
                    if !self.at_end() && self.peek() == b'=' {
                        self.pos += 1;
                        self.skip_spaces();
                        let value = self.take_attr_value(&name)?;
                        doc.set_attr(node, &name, &decode_entities(&value));
                    } else {
                        // Bare attribute, e.g. `disabled`.
                        doc.set_attr(node, &name, "");
                    }
                }
            }
        }
    }

    fn take_attr_value(&mut self, name: &str) -> EditResult<String> {
        if self.at_end() {
            return Err(malformed(format!("attribute {} has no value", name)));
        }
        let quote = self.peek();
        if quote == b'"' || quote == b'\'' {
            self.pos += 1;
            let start = self.pos;
            while !self.at_end() && self.peek() != quote {
                self.pos += 1;
            }
            if self.at_end() {
                return Err(malformed(format!("unterminated value for {}", name)));
            }
            let value = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
            self.pos += 1;
            Ok(value)
        } else {
            let start = self.pos;
            while !self.at_end() && !self.peek().is_ascii_whitespace() && self.peek() != b'>' {
                self.pos += 1;
            }
            Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
        }
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let mut replaced = false;
        for (entity, ch) in [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
            ("&apos;", '\''),
        ] {
            if rest.starts_with(entity) {
                out.push(ch);
                rest = &rest[entity.len()..];
                replaced = true;
                break;
            }
        }
        if !replaced {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(markup: &str) -> (Document, NodeId) {
        let mut doc = Document::new();
        let roots = parse_into(&mut doc, markup).unwrap();
        assert_eq!(roots.len(), 1);
        (doc, roots[0])
    }

    #[test]
    fn test_simple_element_with_attrs() {
        let (doc, node) = parse_one(r#"<div id="test:0" class="container"></div>"#);
        assert_eq!(doc.tag(node), "div");
        assert_eq!(doc.id_attr(node), Some("test:0"));
        assert_eq!(doc.classes(node), "container");
    }

    #[test]
    fn test_nested_elements_and_text() {
        let (doc, node) = parse_one("<div><textarea name=\"a\">Hello &amp; bye</textarea></div>");
        let textarea = doc.children(node)[0];
        assert_eq!(doc.own_text(textarea), "Hello & bye");
    }

    #[test]
    fn test_indentation_is_dropped() {
        let (doc, node) = parse_one("<div>\n    <p></p>\n    <p></p>\n</div>");
        assert_eq!(doc.children(node).len(), 2);
        assert_eq!(doc.own_text(node), "");
    }

    #[test]
    fn test_void_and_self_closing_tags() {
        let mut doc = Document::new();
        let roots = parse_into(&mut doc, r#"<input name="a" value="1"><br/><hr>"#).unwrap();
        assert_eq!(roots.len(), 3);
        assert_eq!(doc.attr(roots[0], "value"), Some("1"));
    }

    #[test]
    fn test_comment_is_skipped() {
        let (doc, node) = parse_one("<div><!-- generated --><p></p></div>");
        assert_eq!(doc.children(node).len(), 1);
    }

    #[test]
    fn test_mismatched_close_is_rejected() {
        let mut doc = Document::new();
        let err = parse_into(&mut doc, "<div><p></div>").unwrap_err();
        assert!(matches!(err, EditError::MalformedFragment(_)));
    }

    #[test]
    fn test_unclosed_element_is_rejected() {
        let mut doc = Document::new();
        assert!(matches!(
            parse_into(&mut doc, "<div>"),
            Err(EditError::MalformedFragment(_))
        ));
    }

    #[test]
    fn test_empty_fragment_is_rejected() {
        let mut doc = Document::new();
        assert!(matches!(
            parse_into(&mut doc, "   "),
            Err(EditError::MalformedFragment(_))
        ));
    }

    #[test]
    fn test_single_quoted_and_bare_attributes() {
        let (doc, node) = parse_one("<input type='text' disabled/>");
        assert_eq!(doc.attr(node, "type"), Some("text"));
        assert_eq!(doc.attr(node, "disabled"), Some(""));
    }
}
