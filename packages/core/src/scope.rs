//! Scoped variables: per-vDOM-node name bindings.
//!
//! `<init>`, `<bind>` and `<define>` attach variants to vDOM nodes; lookup
//! walks the ancestor chain of the *frame's scope node* - not the spine of
//! live frames, since a pushed frame may be executing a re-used vDOM
//! subtree. Document-level binds live on the synthetic document node.

use hvml_variant::Variant;
use hvml_vdom::{VDocument, VNodeId};
use rustc_hash::FxHashMap;

/// All scoped-variable managers of one coroutine, keyed by vDOM node.
#[derive(Default)]
pub struct ScopedVariables {
    managers: FxHashMap<VNodeId, FxHashMap<String, Variant>>,
}

impl ScopedVariables {
    /// Bind `name` at `node`, displacing any previous binding there.
    pub fn bind(&mut self, node: VNodeId, name: impl Into<String>, value: Variant) {
        self.managers.entry(node).or_default().insert(name.into(), value);
    }

    /// Remove the binding of `name` at exactly `node`.
    pub fn unbind(&mut self, node: VNodeId, name: &str) -> Option<Variant> {
        self.managers.get_mut(&node).and_then(|m| m.remove(name))
    }

    /// Resolve `name` from `node`, climbing the vDOM ancestor chain.
    /// Case-sensitive, whole-name matches only. The returned handle is a
    /// clone; the binding itself stays owned by its manager.
    pub fn lookup(&self, doc: &VDocument, node: VNodeId, name: &str) -> Option<Variant> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if let Some(found) = self.managers.get(&current).and_then(|m| m.get(name)) {
                return Some(found.clone());
            }
            cursor = doc.parent(current);
        }
        None
    }

    /// Drop every binding attached exactly at `node`.
    pub fn drop_node(&mut self, node: VNodeId) {
        self.managers.remove(&node);
    }

    pub fn binding_count(&self) -> usize {
        self.managers.values().map(|m| m.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_vdom::parse_document;

    #[test]
    fn lookup_climbs_the_ancestor_chain() {
        let doc = parse_document("<hvml><body><div><span/></div></body></hvml>").unwrap();
        let root = doc.root_element().unwrap();
        let body = doc.children(root)[0];
        let div = doc.children(body)[0];
        let span = doc.children(div)[0];

        let mut scoped = ScopedVariables::default();
        scoped.bind(doc.document_node(), "top", Variant::longint(1));
        scoped.bind(div, "mid", Variant::longint(2));

        assert_eq!(scoped.lookup(&doc, span, "top").unwrap().coerce_i64().unwrap(), 1);
        assert_eq!(scoped.lookup(&doc, span, "mid").unwrap().coerce_i64().unwrap(), 2);
        // siblings of `div` cannot see `mid`
        assert!(scoped.lookup(&doc, body, "mid").is_none());
        // case-sensitive
        assert!(scoped.lookup(&doc, span, "Top").is_none());
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let doc = parse_document("<hvml><body><div/></body></hvml>").unwrap();
        let root = doc.root_element().unwrap();
        let body = doc.children(root)[0];
        let div = doc.children(body)[0];

        let mut scoped = ScopedVariables::default();
        scoped.bind(doc.document_node(), "x", Variant::string("outer"));
        scoped.bind(div, "x", Variant::string("inner"));

        assert_eq!(scoped.lookup(&doc, div, "x").unwrap().to_string(), "inner");
        assert_eq!(scoped.lookup(&doc, body, "x").unwrap().to_string(), "outer");
    }
}
