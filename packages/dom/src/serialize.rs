//! HTML serialization of the output tree.

use crate::tree::{DomId, DomNodeData, DomTree};

/// Tags serialized without a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}

impl DomTree {
    /// Serialize `id` including its own tag.
    pub fn outer_html(&self, id: DomId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serialize the children of `id`.
    pub fn inner_html(&self, id: DomId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, id: DomId, out: &mut String) {
        match self.data(id) {
            None => {}
            Some(DomNodeData::Text(text)) => out.push_str(&escape_text(text)),
            Some(DomNodeData::Element { tag, attrs }) => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_and_escaping() {
        let mut tree = DomTree::new("div");
        tree.set_attribute(tree.root(), "title", "a \"b\" & c").unwrap();
        tree.append_content(tree.root(), "1 < 2").unwrap();
        assert_eq!(
            tree.outer_html(tree.root()),
            "<div title=\"a &quot;b&quot; &amp; c\">1 &lt; 2</div>"
        );
    }

    #[test]
    fn void_tags_have_no_close() {
        let mut tree = DomTree::new("p");
        tree.append_element(tree.root(), "br").unwrap();
        assert_eq!(tree.outer_html(tree.root()), "<p><br></p>");
    }
}
