//! Tolerant parsing of HTML chunks.
//!
//! `add_child_chunk`/`set_child_chunk` take raw HTML text. The chunk is
//! parsed as if it sat inside a hidden wrapper element and its root nodes
//! are grafted in order. The parser is deliberately forgiving: unknown
//! tags are fine, stray text is kept, and an unclosed element is closed at
//! the end of the chunk.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<FragmentNode>,
    },
    Text(String),
}

/// The parsed form of one HTML chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub roots: Vec<FragmentNode>,
}

/// Parse an HTML chunk. Never fails: malformed trailing input degrades to
/// text.
pub fn parse_fragment(src: &str) -> Fragment {
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0;
    let roots = parse_nodes(&chars, &mut pos, None);
    Fragment { roots }
}

fn parse_nodes(chars: &[char], pos: &mut usize, close_for: Option<&str>) -> Vec<FragmentNode> {
    let mut nodes = Vec::new();
    loop {
        if *pos >= chars.len() {
            return nodes;
        }

        // closing tag: consume it only if it matches our element
        if chars[*pos] == '<' && chars.get(*pos + 1) == Some(&'/') {
            let save = *pos;
            *pos += 2;
            let name = read_name(chars, pos);
            skip_until(chars, pos, '>');
            if close_for == Some(name.as_str()) {
                return nodes;
            }
            // stray close tag: drop it and continue
            log::debug!("dropping stray close tag </{name}> in chunk at {save}");
            continue;
        }

        if chars[*pos] == '<' && chars.get(*pos + 1) == Some(&'!') {
            // comments and doctype noise are skipped wholesale
            skip_until(chars, pos, '>');
            continue;
        }

        if chars[*pos] == '<'
            && matches!(chars.get(*pos + 1), Some(c) if c.is_ascii_alphabetic())
        {
            *pos += 1;
            let tag = read_name(chars, pos);
            let (attrs, self_closed) = read_attrs(chars, pos);
            let children = if self_closed || is_void(&tag) {
                Vec::new()
            } else {
                parse_nodes(chars, pos, Some(tag.as_str()))
            };
            nodes.push(FragmentNode::Element {
                tag,
                attrs,
                children,
            });
            continue;
        }

        // text run
        let start = *pos;
        while *pos < chars.len() && chars[*pos] != '<' {
            *pos += 1;
        }
        let text: String = chars[start..*pos].iter().collect();
        let text = unescape(&text);
        if !text.trim().is_empty() {
            nodes.push(FragmentNode::Text(text));
        }
        // a lone '<' that opens nothing parseable is consumed as text
        if *pos < chars.len()
            && chars[*pos] == '<'
            && !matches!(chars.get(*pos + 1), Some(c) if c.is_ascii_alphabetic() || *c == '/' || *c == '!')
        {
            nodes.push(FragmentNode::Text("<".into()));
            *pos += 1;
        }
    }
}

fn read_name(chars: &[char], pos: &mut usize) -> String {
    let mut out = String::new();
    while let Some(c) = chars.get(*pos) {
        if c.is_ascii_alphanumeric() || *c == '-' || *c == '_' {
            out.push(*c);
            *pos += 1;
        } else {
            break;
        }
    }
    out
}

fn read_attrs(chars: &[char], pos: &mut usize) -> (Vec<(String, String)>, bool) {
    let mut attrs: IndexMap<String, String> = IndexMap::new();
    loop {
        while matches!(chars.get(*pos), Some(c) if c.is_whitespace()) {
            *pos += 1;
        }
        match chars.get(*pos) {
            None => return (attrs.into_iter().collect(), false),
            Some('>') => {
                *pos += 1;
                return (attrs.into_iter().collect(), false);
            }
            Some('/') => {
                *pos += 1;
                if chars.get(*pos) == Some(&'>') {
                    *pos += 1;
                }
                return (attrs.into_iter().collect(), true);
            }
            _ => {}
        }
        let name = read_name(chars, pos);
        if name.is_empty() {
            *pos += 1;
            continue;
        }
        while matches!(chars.get(*pos), Some(c) if c.is_whitespace()) {
            *pos += 1;
        }
        let mut value = String::new();
        if chars.get(*pos) == Some(&'=') {
            *pos += 1;
            while matches!(chars.get(*pos), Some(c) if c.is_whitespace()) {
                *pos += 1;
            }
            match chars.get(*pos) {
                Some(q @ ('"' | '\'')) => {
                    let quote = *q;
                    *pos += 1;
                    while let Some(c) = chars.get(*pos) {
                        *pos += 1;
                        if *c == quote {
                            break;
                        }
                        value.push(*c);
                    }
                }
                _ => {
                    while let Some(c) = chars.get(*pos) {
                        if c.is_whitespace() || *c == '>' || *c == '/' {
                            break;
                        }
                        value.push(*c);
                        *pos += 1;
                    }
                }
            }
        }
        attrs.insert(name, unescape(&value));
    }
}

fn skip_until(chars: &[char], pos: &mut usize, stop: char) {
    while let Some(c) = chars.get(*pos) {
        *pos += 1;
        if *c == stop {
            return;
        }
    }
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trips_through_graft() {
        let fragment = parse_fragment("<ul class=\"x\"><li>one</li><li>two</li></ul>tail");
        assert_eq!(fragment.roots.len(), 2);

        let mut tree = crate::DomTree::new("div");
        tree.graft(tree.root(), &fragment).unwrap();
        assert_eq!(
            tree.outer_html(tree.root()),
            "<div><ul class=\"x\"><li>one</li><li>two</li></ul>tail</div>"
        );
    }

    #[test]
    fn unclosed_elements_close_at_chunk_end() {
        let fragment = parse_fragment("<p>open");
        assert_eq!(
            fragment.roots,
            vec![FragmentNode::Element {
                tag: "p".into(),
                attrs: vec![],
                children: vec![FragmentNode::Text("open".into())],
            }]
        );
    }
}
