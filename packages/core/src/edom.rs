//! The `@` symbol's "elements" value and output-DOM addressing.

use hvml_dom::{DomId, DomTree};
use hvml_variant::{NativeMethod, NativeOps, Variant};
use std::any::Any;
use std::rc::Rc;

/// A collection of output-DOM elements, as wrapped by the `@` symbol and
/// by `$DOC.query()`. Opaque to expressions except for `count`.
pub struct ElementCollection {
    pub ids: Vec<DomId>,
}

impl NativeOps for ElementCollection {
    fn name(&self) -> &'static str {
        "elements"
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        match name {
            "count" => {
                let count = self.ids.len() as u64;
                Some(Rc::new(move |_, _| Ok(Variant::ulongint(count))))
            }
            _ => None,
        }
    }
}

/// Wrap element ids as an `elements` variant.
pub fn elements_variant(ids: Vec<DomId>) -> Variant {
    Variant::native(Rc::new(ElementCollection { ids }))
}

/// Unwrap an `elements` variant back into ids.
pub fn collection_of(value: &Variant) -> Option<Vec<DomId>> {
    let ops = value.as_native_ops()?;
    let any = ops.as_any()?;
    any.downcast_ref::<ElementCollection>()
        .map(|c| c.ids.clone())
}

/// Resolve an `on`-style target against the output DOM: an `elements`
/// value passes through, `#id` matches by id attribute, a bare name
/// matches the first element with that tag.
pub fn resolve_dom_target(tree: &DomTree, value: &Variant) -> Option<Vec<DomId>> {
    if let Some(ids) = collection_of(value) {
        return Some(ids);
    }
    let selector = value.as_str()?;
    if let Some(id_value) = selector.strip_prefix('#') {
        let found = find_by_attr(tree, tree.root(), "id", id_value);
        return Some(found.into_iter().collect());
    }
    Some(tree.find_all_by_tag(tree.root(), selector))
}

fn find_by_attr(tree: &DomTree, from: DomId, key: &str, expected: &str) -> Option<DomId> {
    if tree.attribute(from, key) == Some(expected) {
        return Some(from);
    }
    for child in tree.children(from).to_vec() {
        if let Some(found) = find_by_attr(tree, child, key, expected) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_round_trips() {
        let value = elements_variant(vec![DomId(3), DomId(5)]);
        assert_eq!(collection_of(&value), Some(vec![DomId(3), DomId(5)]));
        assert_eq!(
            value.invoke_getter("count", &[]).unwrap().coerce_i64().unwrap(),
            2
        );
    }

    #[test]
    fn id_selector_resolution() {
        let mut tree = DomTree::new_html();
        let body = tree.find_by_tag(tree.root(), "body").unwrap();
        let div = tree.append_element(body, "div").unwrap();
        tree.set_attribute(div, "id", "x").unwrap();

        let ids = resolve_dom_target(&tree, &Variant::string("#x")).unwrap();
        assert_eq!(ids, vec![div]);
        let ids = resolve_dom_target(&tree, &Variant::string("body")).unwrap();
        assert_eq!(ids, vec![body]);
        assert!(resolve_dom_target(&tree, &Variant::string("#missing"))
            .unwrap()
            .is_empty());
    }
}
