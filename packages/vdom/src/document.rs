use crate::tags::{AttrOp, TagName};
use crate::vcm::VcmNode;
use smallvec::SmallVec;

/// Index of a node inside its [`VDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VNodeId(pub usize);

/// One evaluated-per-frame attribute of an element.
#[derive(Debug, Clone)]
pub struct VAttribute {
    pub name: String,
    pub op: AttrOp,
    /// `None` for bare flag attributes such as `silently`.
    pub value: Option<VcmNode>,
}

/// An element node: a verb tag or a foreign output element.
#[derive(Debug, Clone)]
pub struct VElement {
    pub tag: TagName,
    pub attrs: Vec<VAttribute>,
}

impl VElement {
    pub fn attr(&self, name: &str) -> Option<&VAttribute> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name && a.value.is_none())
    }
}

/// A piece of text content: either a literal run or an embedded
/// expression (`$var`, `$%`, `{{ ... }}`).
#[derive(Debug, Clone)]
pub enum ContentPart {
    Literal(String),
    Expr(VcmNode),
}

#[derive(Debug, Clone)]
pub enum VNodeData {
    /// The synthetic document node; always the arena root.
    Document,
    Element(VElement),
    Content(Vec<ContentPart>),
    Comment(String),
}

#[derive(Debug)]
struct VNodeInner {
    parent: Option<VNodeId>,
    children: SmallVec<[VNodeId; 4]>,
    data: VNodeData,
}

/// The parsed, immutable vDOM of one HVML document.
///
/// The arena owns every node; ids are stable for the document's lifetime.
/// Node 0 is a synthetic document node whose single element child is the
/// `<hvml>` root. Scoped-variable managers key off [`VNodeId`]s, which is
/// why the tree exposes the ancestor chain directly.
#[derive(Debug)]
pub struct VDocument {
    nodes: Vec<VNodeInner>,
    /// Value of the root element's `target` attribute; defaults to "html".
    pub target: String,
}

impl VDocument {
    pub(crate) fn new() -> Self {
        VDocument {
            nodes: vec![VNodeInner {
                parent: None,
                children: SmallVec::new(),
                data: VNodeData::Document,
            }],
            target: String::from("html"),
        }
    }

    pub fn document_node(&self) -> VNodeId {
        VNodeId(0)
    }

    /// The `<hvml>` element.
    pub fn root_element(&self) -> Option<VNodeId> {
        self.children(VNodeId(0))
            .iter()
            .copied()
            .find(|id| matches!(self.data(*id), VNodeData::Element(_)))
    }

    pub(crate) fn push_node(&mut self, parent: VNodeId, data: VNodeData) -> VNodeId {
        let id = VNodeId(self.nodes.len());
        self.nodes.push(VNodeInner {
            parent: Some(parent),
            children: SmallVec::new(),
            data,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn data(&self, id: VNodeId) -> &VNodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: VNodeId) -> Option<&VElement> {
        match self.data(id) {
            VNodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn parent(&self, id: VNodeId) -> Option<VNodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: VNodeId) -> &[VNodeId] {
        &self.nodes[id.0].children
    }

    /// The ancestor chain of `id`, starting at `id` itself and ending at
    /// the document node. This is the scope chain for variable lookup.
    pub fn ancestors(&self, id: VNodeId) -> Vec<VNodeId> {
        let mut chain = vec![id];
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            chain.push(parent);
            cursor = parent;
        }
        chain
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A compact location string for diagnostics, e.g. `hvml/body/iterate`.
    pub fn path_of(&self, id: VNodeId) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for node in self.ancestors(id) {
            if let VNodeData::Element(el) = self.data(node) {
                parts.push(el.tag.as_str());
            }
        }
        parts.reverse();
        parts.join("/")
    }
}
