//! The HVML document parser.
//!
//! A single recursive-descent pass over the source text builds the
//! [`VDocument`] arena. The surface is XML-shaped with two HVML-isms: the
//! seven attribute assignment operators (`=`, `+=`, `-=`, `%=`, `~=`, `^=`,
//! `$=`), and preposition attributes whose value follows after whitespace
//! with no `=` at all (`<iterate on 3L>`, `<exit with 'fired'/>`).

use crate::document::{VAttribute, VDocument, VElement, VNodeData, VNodeId};
use crate::error::ParseError;
use crate::tags::{AttrOp, TagName};
use crate::vcm;

pub fn parse_document(src: &str) -> Result<VDocument, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut parser = DocParser {
        chars: &chars,
        pos: 0,
        doc: VDocument::new(),
    };

    parser.skip_ws_and_misc()?;
    if parser.pos >= parser.chars.len() {
        return Err(ParseError::MissingRoot);
    }
    let root = parser.parse_element(parser.doc.document_node())?;
    parser.skip_ws_and_misc()?;

    // lift target="..." off the root element when it is a plain literal
    let target = parser
        .doc
        .element(root)
        .and_then(|el| el.attr("target"))
        .and_then(|attr| attr.value.clone());
    if let Some(vcm::VcmNode::String(target)) = target {
        parser.doc.target = target.to_string();
    }

    Ok(parser.doc)
}

struct DocParser<'a> {
    chars: &'a [char],
    pos: usize,
    doc: VDocument,
}

impl<'a> DocParser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Whitespace, doctype, and processing-instruction noise before and
    /// after the root element.
    fn skip_ws_and_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_ws();
            if self.starts_with("<!DOCTYPE") || self.starts_with("<!doctype") || self.starts_with("<?")
            {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == '>' {
                        break;
                    }
                }
            } else if self.starts_with("<!--") {
                self.skip_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<String, ParseError> {
        self.pos += 4; // <!--
        let start = self.pos;
        while self.pos < self.chars.len() {
            if self.starts_with("-->") {
                let text: String = self.chars[start..self.pos].iter().collect();
                self.pos += 3;
                return Ok(text);
            }
            self.pos += 1;
        }
        Err(ParseError::UnexpectedEof(self.pos))
    }

    fn parse_name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn parse_element(&mut self, parent: VNodeId) -> Result<VNodeId, ParseError> {
        debug_assert_eq!(self.peek(), Some('<'));
        self.pos += 1;
        let tag_name = self.parse_name();
        if tag_name.is_empty() {
            return Err(ParseError::UnexpectedChar {
                at: self.pos,
                found: self.peek().unwrap_or('\0'),
                expected: "tag name",
            });
        }

        let attrs = self.parse_attributes()?;
        let element = VElement {
            tag: TagName::from_tag(&tag_name),
            attrs,
        };
        let id = self.doc.push_node(parent, VNodeData::Element(element));

        self.skip_ws();
        if self.starts_with("/>") {
            self.pos += 2;
            return Ok(id);
        }
        match self.peek() {
            Some('>') => self.pos += 1,
            Some(found) => {
                return Err(ParseError::UnexpectedChar {
                    at: self.pos,
                    found,
                    expected: "> or />",
                })
            }
            None => return Err(ParseError::UnexpectedEof(self.pos)),
        }

        self.parse_children(id)?;

        // closing </tag>
        self.pos += 2; // "</"
        let close_name = self.parse_name();
        if close_name != tag_name {
            return Err(ParseError::MismatchedClose {
                at: self.pos,
                opened: tag_name,
                closed: close_name,
            });
        }
        self.skip_ws();
        match self.peek() {
            Some('>') => {
                self.pos += 1;
                Ok(id)
            }
            Some(found) => Err(ParseError::UnexpectedChar {
                at: self.pos,
                found,
                expected: ">",
            }),
            None => Err(ParseError::UnexpectedEof(self.pos)),
        }
    }

    fn parse_children(&mut self, parent: VNodeId) -> Result<(), ParseError> {
        loop {
            if self.starts_with("</") {
                return Ok(());
            }
            if self.starts_with("<!--") {
                let text = self.skip_comment()?;
                self.doc.push_node(parent, VNodeData::Comment(text));
                continue;
            }
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof(self.pos)),
                Some('<') => {
                    self.parse_element(parent)?;
                }
                Some(_) => {
                    // text run: `<` ends it, except inside a `{{ }}`
                    // island or directly after `$` (the `$<` symbol)
                    let start = self.pos;
                    let mut island = false;
                    while let Some(c) = self.peek() {
                        if island {
                            if c == '}' && self.peek_at(1) == Some('}') {
                                island = false;
                                self.pos += 2;
                                continue;
                            }
                            self.pos += 1;
                            continue;
                        }
                        if c == '{' && self.peek_at(1) == Some('{') {
                            island = true;
                            self.pos += 2;
                            continue;
                        }
                        if c == '<' && self.chars.get(self.pos.wrapping_sub(1)) != Some(&'$') {
                            break;
                        }
                        self.pos += 1;
                    }
                    let raw: String = self.chars[start..self.pos].iter().collect();
                    let trimmed = raw.trim();
                    if !trimmed.is_empty() {
                        let parts = vcm::parse_content(trimmed)?;
                        self.doc.push_node(parent, VNodeData::Content(parts));
                    }
                }
            }
        }
    }

    fn parse_attributes(&mut self) -> Result<Vec<VAttribute>, ParseError> {
        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof(self.pos)),
                Some('>') | Some('/') => return Ok(attrs),
                _ => {}
            }

            let name = self.parse_name();
            if name.is_empty() {
                return Err(ParseError::UnexpectedChar {
                    at: self.pos,
                    found: self.peek().unwrap_or('\0'),
                    expected: "attribute name",
                });
            }

            // assignment form, with an optional operator: `name = v`, `name += v`
            self.skip_ws();
            let op = self.parse_attr_op();
            if op.is_some() || self.peek() == Some('=') {
                if self.peek() == Some('=') {
                    self.pos += 1;
                }
                self.skip_ws();
                let value = self.parse_attr_value()?;
                attrs.push(VAttribute {
                    name,
                    op: op.unwrap_or(AttrOp::Replace),
                    value: Some(value),
                });
                continue;
            }

            // preposition form: `on 3L`, `with 'fired'`, `for "sub"`
            if matches!(self.peek(), Some(c) if is_value_start(c)) {
                let value = self.parse_attr_value()?;
                attrs.push(VAttribute {
                    name,
                    op: AttrOp::Replace,
                    value: Some(value),
                });
            } else {
                // bare flag (e.g. `silently`)
                attrs.push(VAttribute {
                    name,
                    op: AttrOp::Replace,
                    value: None,
                });
            }
        }
    }

    fn parse_attr_op(&mut self) -> Option<AttrOp> {
        let op = match (self.peek(), self.peek_at(1)) {
            (Some('+'), Some('=')) => Some(AttrOp::Add),
            (Some('-'), Some('=')) => Some(AttrOp::Subtract),
            (Some('%'), Some('=')) => Some(AttrOp::Remainder),
            (Some('~'), Some('=')) => Some(AttrOp::RegexReplace),
            (Some('^'), Some('=')) => Some(AttrOp::Prepend),
            (Some('$'), Some('=')) => Some(AttrOp::Append),
            _ => None,
        };
        if op.is_some() {
            self.pos += 2;
        }
        op
    }

    fn parse_attr_value(&mut self) -> Result<vcm::VcmNode, ParseError> {
        match self.peek() {
            Some('"') => {
                let text = self.read_quoted('"')?;
                vcm::interpolated_string(&text)
            }
            Some('\'') => {
                let text = self.read_quoted('\'')?;
                Ok(vcm::VcmNode::String(text.into()))
            }
            Some('`') => {
                let text = self.read_quoted('`')?;
                Ok(vcm::VcmNode::String(text.into()))
            }
            _ if self.starts_with("{{") => {
                self.pos += 2;
                let start = self.pos;
                while self.pos < self.chars.len() && !self.starts_with("}}") {
                    self.pos += 1;
                }
                if self.pos >= self.chars.len() {
                    return Err(ParseError::UnexpectedEof(self.pos));
                }
                let inner: String = self.chars[start..self.pos].iter().collect();
                self.pos += 2;
                vcm::parse_expression(inner.trim())
            }
            _ => {
                // unquoted token: runs to whitespace or tag end
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == '>' {
                        break;
                    }
                    if c == '/' && self.peek_at(1) == Some('>') {
                        break;
                    }
                    self.pos += 1;
                }
                let token: String = self.chars[start..self.pos].iter().collect();
                if token.is_empty() {
                    return Err(ParseError::UnexpectedEof(self.pos));
                }
                vcm::parse_expression(&token)
            }
        }
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, ParseError> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof(self.pos)),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        None => return Err(ParseError::UnexpectedEof(self.pos)),
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

fn is_value_start(c: char) -> bool {
    c == '$' || c == '\'' || c == '"' || c == '`' || c == '{' || c == '[' || c == '-'
        || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcm::VcmNode;
    use crate::ContentPart;

    #[test]
    fn empty_document() {
        let doc = parse_document("<hvml/>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.element(root).unwrap().tag, TagName::Hvml);
        assert!(doc.children(root).is_empty());
    }

    #[test]
    fn nested_structure_with_preposition_attrs() {
        let doc = parse_document(
            "<hvml target=\"html\"><body><iterate on 3L><span>$%</span></iterate></body></hvml>",
        )
        .unwrap();
        assert_eq!(doc.target, "html");

        let root = doc.root_element().unwrap();
        let body = doc.children(root)[0];
        assert_eq!(doc.element(body).unwrap().tag, TagName::Body);

        let iterate = doc.children(body)[0];
        let el = doc.element(iterate).unwrap();
        assert_eq!(el.tag, TagName::Iterate);
        assert_eq!(el.attr("on").unwrap().value, Some(VcmNode::LongInt(3)));

        let span = doc.children(iterate)[0];
        assert!(matches!(
            &doc.element(span).unwrap().tag,
            TagName::Foreign(name) if &**name == "span"
        ));
        let text = doc.children(span)[0];
        match doc.data(text) {
            VNodeData::Content(parts) => {
                assert!(matches!(parts[0], ContentPart::Expr(VcmNode::Symbol('%'))))
            }
            other => panic!("expected content, got {other:?}"),
        }
    }

    #[test]
    fn observe_and_exit_attributes() {
        let doc = parse_document(
            "<hvml><observe on $TIMERS for \"expired:t\"><exit with 'fired'/></observe></hvml>",
        )
        .unwrap();
        let root = doc.root_element().unwrap();
        let observe = doc.children(root)[0];
        let el = doc.element(observe).unwrap();
        assert_eq!(el.attr("on").unwrap().value, Some(VcmNode::Variable("TIMERS".into())));
        assert_eq!(
            el.attr("for").unwrap().value,
            Some(VcmNode::String("expired:t".into()))
        );

        let exit = doc.children(observe)[0];
        let el = doc.element(exit).unwrap();
        assert_eq!(el.tag, TagName::Exit);
        assert_eq!(el.attr("with").unwrap().value, Some(VcmNode::String("fired".into())));
    }

    #[test]
    fn catch_with_backtick_exception_name() {
        let doc = parse_document(
            "<hvml><inherit>{{ raise('BadName') }}<catch for `BadName`><exit with 'ok'/></catch></inherit></hvml>",
        )
        .unwrap();
        let root = doc.root_element().unwrap();
        let inherit = doc.children(root)[0];
        let children = doc.children(inherit);
        assert_eq!(children.len(), 2);
        assert!(matches!(doc.data(children[0]), VNodeData::Content(_)));
        let catch = doc.element(children[1]).unwrap();
        assert_eq!(catch.tag, TagName::Catch);
        assert_eq!(catch.attr("for").unwrap().value, Some(VcmNode::String("BadName".into())));
    }

    #[test]
    fn attribute_operators() {
        let doc = parse_document("<hvml><span count += 1 class $= \"-x\" title ^= 'pre'/></hvml>")
            .unwrap();
        let root = doc.root_element().unwrap();
        let span = doc.element(doc.children(root)[0]).unwrap();
        assert_eq!(span.attr("count").unwrap().op, AttrOp::Add);
        assert_eq!(span.attr("class").unwrap().op, AttrOp::Append);
        assert_eq!(span.attr("title").unwrap().op, AttrOp::Prepend);
    }

    #[test]
    fn flag_attributes_take_no_value() {
        let doc = parse_document("<hvml><init as 'x' with 1 silently/></hvml>").unwrap();
        let root = doc.root_element().unwrap();
        let init = doc.element(doc.children(root)[0]).unwrap();
        assert!(init.has_flag("silently"));
        assert_eq!(init.attr("as").unwrap().value, Some(VcmNode::String("x".into())));
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let err = parse_document("<hvml><body></hvml></body>").unwrap_err();
        assert!(matches!(err, ParseError::MismatchedClose { .. }));
    }

    #[test]
    fn comments_are_kept_as_nodes() {
        let doc = parse_document("<hvml><!-- note --><body/></hvml>").unwrap();
        let root = doc.root_element().unwrap();
        let kids = doc.children(root);
        assert!(matches!(doc.data(kids[0]), VNodeData::Comment(_)));
        assert!(matches!(doc.data(kids[1]), VNodeData::Element(_)));
    }
}
