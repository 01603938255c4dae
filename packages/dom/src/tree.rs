use indexmap::IndexMap;
use slab::Slab;
use thiserror::Error;

/// A node's unique identifier within one [`DomTree`].
///
/// Ids are slab keys: unique across the tree but not across time, since a
/// removed node's slot is reused. The root element is always id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomId(pub usize);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomError {
    #[error("node {0:?} is not in the tree")]
    Detached(DomId),

    #[error("node {0:?} is not an element")]
    NotAnElement(DomId),

    #[error("cannot remove the root element")]
    RootRemoval,
}

#[derive(Debug, Clone)]
pub enum DomNodeData {
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
    },
    Text(String),
}

struct DomNode {
    parent: Option<DomId>,
    children: Vec<DomId>,
    data: DomNodeData,
}

/// The output document: an arena tree rooted at a single element.
pub struct DomTree {
    nodes: Slab<DomNode>,
    root: DomId,
}

impl DomTree {
    /// An empty tree rooted at `root_tag`.
    pub fn new(root_tag: &str) -> Self {
        let mut nodes = Slab::new();
        let root = DomId(nodes.insert(DomNode {
            parent: None,
            children: Vec::new(),
            data: DomNodeData::Element {
                tag: root_tag.to_owned(),
                attrs: IndexMap::new(),
            },
        }));
        DomTree { nodes, root }
    }

    /// The skeleton every `target="html"` run starts from:
    /// `<html><head></head><body></body></html>`.
    pub fn new_html() -> Self {
        let mut tree = Self::new("html");
        let root = tree.root();
        tree.append_element(root, "head").unwrap();
        tree.append_element(root, "body").unwrap();
        tree
    }

    pub fn root(&self) -> DomId {
        self.root
    }

    pub fn contains(&self, id: DomId) -> bool {
        self.nodes.contains(id.0)
    }

    pub fn data(&self, id: DomId) -> Option<&DomNodeData> {
        self.nodes.get(id.0).map(|n| &n.data)
    }

    pub fn parent(&self, id: DomId) -> Option<DomId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: DomId) -> &[DomId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn tag(&self, id: DomId) -> Option<&str> {
        match self.data(id)? {
            DomNodeData::Element { tag, .. } => Some(tag),
            DomNodeData::Text(_) => None,
        }
    }

    /// First descendant element with the given tag, depth-first.
    pub fn find_by_tag(&self, from: DomId, tag: &str) -> Option<DomId> {
        if self.tag(from) == Some(tag) {
            return Some(from);
        }
        for child in self.children(from).to_vec() {
            if let Some(found) = self.find_by_tag(child, tag) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant element with the given tag, in document order.
    pub fn find_all_by_tag(&self, from: DomId, tag: &str) -> Vec<DomId> {
        let mut found = Vec::new();
        self.collect_by_tag(from, tag, &mut found);
        found
    }

    fn collect_by_tag(&self, from: DomId, tag: &str, found: &mut Vec<DomId>) {
        if self.tag(from) == Some(tag) {
            found.push(from);
        }
        for child in self.children(from).to_vec() {
            self.collect_by_tag(child, tag, found);
        }
    }

    pub fn append_element(&mut self, parent: DomId, tag: &str) -> Result<DomId, DomError> {
        self.ensure_element(parent)?;
        let id = DomId(self.nodes.insert(DomNode {
            parent: Some(parent),
            children: Vec::new(),
            data: DomNodeData::Element {
                tag: tag.to_owned(),
                attrs: IndexMap::new(),
            },
        }));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Append a text node. Adjacent text nodes are coalesced.
    pub fn append_content(&mut self, parent: DomId, text: &str) -> Result<DomId, DomError> {
        self.ensure_element(parent)?;
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let DomNodeData::Text(existing) = &mut self.nodes[last.0].data {
                existing.push_str(text);
                return Ok(last);
            }
        }
        let id = DomId(self.nodes.insert(DomNode {
            parent: Some(parent),
            children: Vec::new(),
            data: DomNodeData::Text(text.to_owned()),
        }));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Drop all children of `parent` and replace them with a single text
    /// node.
    pub fn displace_content(&mut self, parent: DomId, text: &str) -> Result<DomId, DomError> {
        self.remove_children(parent)?;
        self.append_content(parent, text)
    }

    pub fn set_attribute(
        &mut self,
        id: DomId,
        key: &str,
        value: &str,
    ) -> Result<(), DomError> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(DomNodeData::Element { attrs, .. }) => {
                attrs.insert(key.to_owned(), value.to_owned());
                Ok(())
            }
            Some(_) => Err(DomError::NotAnElement(id)),
            None => Err(DomError::Detached(id)),
        }
    }

    pub fn attribute(&self, id: DomId, key: &str) -> Option<&str> {
        match self.data(id)? {
            DomNodeData::Element { attrs, .. } => attrs.get(key).map(String::as_str),
            DomNodeData::Text(_) => None,
        }
    }

    /// Remove `id` and its whole subtree.
    pub fn remove(&mut self, id: DomId) -> Result<(), DomError> {
        if id == self.root {
            return Err(DomError::RootRemoval);
        }
        if !self.nodes.contains(id.0) {
            return Err(DomError::Detached(id));
        }
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
        self.remove_subtree(id);
        Ok(())
    }

    pub fn remove_children(&mut self, parent: DomId) -> Result<(), DomError> {
        self.ensure_element(parent)?;
        let children = std::mem::take(&mut self.nodes[parent.0].children);
        for child in children {
            self.remove_subtree(child);
        }
        Ok(())
    }

    fn remove_subtree(&mut self, id: DomId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.remove_subtree(child);
        }
        self.nodes.remove(id.0);
    }

    /// Graft the root nodes of a parsed fragment under `parent`, in order.
    pub fn graft(
        &mut self,
        parent: DomId,
        fragment: &crate::fragment::Fragment,
    ) -> Result<Vec<DomId>, DomError> {
        self.ensure_element(parent)?;
        let mut grafted = Vec::new();
        for node in &fragment.roots {
            grafted.push(self.graft_node(parent, node)?);
        }
        Ok(grafted)
    }

    fn graft_node(
        &mut self,
        parent: DomId,
        node: &crate::fragment::FragmentNode,
    ) -> Result<DomId, DomError> {
        use crate::fragment::FragmentNode;
        match node {
            FragmentNode::Text(text) => self.append_content(parent, text),
            FragmentNode::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.append_element(parent, tag)?;
                for (key, value) in attrs {
                    self.set_attribute(id, key, value)?;
                }
                for child in children {
                    self.graft_node(id, child)?;
                }
                Ok(id)
            }
        }
    }

    fn ensure_element(&self, id: DomId) -> Result<(), DomError> {
        match self.nodes.get(id.0) {
            Some(node) => match node.data {
                DomNodeData::Element { .. } => Ok(()),
                DomNodeData::Text(_) => Err(DomError::NotAnElement(id)),
            },
            None => Err(DomError::Detached(id)),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_skeleton() {
        let tree = DomTree::new_html();
        assert_eq!(tree.outer_html(tree.root()), "<html><head></head><body></body></html>");
    }

    #[test]
    fn append_and_displace() {
        let mut tree = DomTree::new_html();
        let body = tree.find_by_tag(tree.root(), "body").unwrap();
        let span = tree.append_element(body, "span").unwrap();
        tree.append_content(span, "0").unwrap();
        tree.append_content(span, "1").unwrap();
        assert_eq!(tree.outer_html(span), "<span>01</span>");

        tree.displace_content(span, "x").unwrap();
        assert_eq!(tree.outer_html(span), "<span>x</span>");
    }

    #[test]
    fn removing_a_subtree_frees_ids() {
        let mut tree = DomTree::new("root");
        let a = tree.append_element(tree.root(), "a").unwrap();
        tree.append_element(a, "b").unwrap();
        let before = tree.node_count();
        tree.remove(a).unwrap();
        assert_eq!(tree.node_count(), before - 2);
        assert!(!tree.contains(a));
    }
}
