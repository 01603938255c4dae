//! Expression evaluation against a live frame stack.
//!
//! The evaluator itself lives in `hvml-vdom`; this module supplies its
//! name resolution: symbols from the frame stack, `$name` from the scoped
//! chain, then document built-ins. Symbol slots left undefined fall back
//! parentward through the stack, which is how `$%` inside a foreign child
//! of `<iterate>` sees the iteration counter.

use crate::coroutine::Coroutine;
use crate::error::Result;
use crate::scope::ScopedVariables;
use crate::stack::Frame;
use hvml_variant::Variant;
use hvml_vdom::{eval_vcm, ContentPart, VcmEvalCtx, VcmNode, VDocument};

pub struct FrameEvalCtx<'a> {
    pub doc: &'a VDocument,
    pub scoped: &'a ScopedVariables,
    pub builtins: &'a Variant,
    pub stack: &'a [Frame],
    /// Index of the frame evaluation happens in.
    pub depth: usize,
}

impl<'a> FrameEvalCtx<'a> {
    pub fn for_top(co: &'a Coroutine) -> Self {
        FrameEvalCtx {
            doc: &co.doc,
            scoped: &co.scoped,
            builtins: &co.builtins,
            stack: &co.stack,
            depth: co.stack.len().saturating_sub(1),
        }
    }
}

impl VcmEvalCtx for FrameEvalCtx<'_> {
    fn resolve_variable(&self, name: &str) -> Option<Variant> {
        let scope = self.stack.get(self.depth).map(|f| f.scope)?;
        self.scoped
            .lookup(self.doc, scope, name)
            .or_else(|| self.builtins.object_get(name))
    }

    fn resolve_symbol(&self, symbol: char) -> Option<Variant> {
        if self.stack.is_empty() {
            return Some(Variant::undefined());
        }
        for frame in self.stack[..=self.depth.min(self.stack.len() - 1)].iter().rev() {
            match frame.get_symbol(symbol) {
                Some(value) if !value.is_undefined() => return Some(value),
                _ => {}
            }
        }
        Some(Variant::undefined())
    }
}

/// Evaluate an expression in the coroutine's top frame.
pub fn eval_in_top(co: &Coroutine, node: &VcmNode, silently: bool) -> Result<Variant> {
    let ctx = FrameEvalCtx::for_top(co);
    Ok(eval_vcm(node, &ctx, silently)?)
}

/// Evaluate text content. A single expression part yields its raw value
/// (so data content keeps its kind); anything else concatenates to a
/// string.
pub fn eval_content(co: &Coroutine, parts: &[ContentPart], silently: bool) -> Result<Variant> {
    if parts.len() == 1 {
        if let ContentPart::Expr(expr) = &parts[0] {
            return eval_in_top(co, expr, silently);
        }
    }
    let mut out = String::new();
    for part in parts {
        match part {
            ContentPart::Literal(text) => out.push_str(text),
            ContentPart::Expr(expr) => {
                let value = eval_in_top(co, expr, silently)?;
                out.push_str(&value.to_string());
            }
        }
    }
    Ok(Variant::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::{CoroId, Coroutine};
    use crate::ops::ForeignOps;
    use crate::stack::{Frame, FrameKind};
    use hvml_dom::{DomId, DomTree};
    use hvml_vdom::parse_document;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_coroutine() -> Coroutine {
        let doc = Rc::new(parse_document("<hvml><body/></hvml>").unwrap());
        let builtins = Variant::object();
        let timers = Variant::set_by_key(Some("id"));
        builtins.object_set("TIMERS", timers.clone()).unwrap();
        Coroutine::new(
            CoroId(0),
            doc,
            Rc::new(RefCell::new(DomTree::new_html())),
            builtins,
            timers,
        )
    }

    fn push_frame(co: &mut Coroutine) {
        let scope = co.doc.root_element().unwrap();
        co.stack.push(Frame::new(
            FrameKind::Normal,
            Some(scope),
            scope,
            DomId(0),
            Rc::new(ForeignOps),
        ));
    }

    #[test]
    fn symbols_fall_back_parentward() {
        let mut co = test_coroutine();
        push_frame(&mut co);
        co.frame_mut().unwrap().set_symbol('%', Variant::ulongint(2));
        push_frame(&mut co);

        let value = eval_in_top(&co, &VcmNode::Symbol('%'), false).unwrap();
        assert_eq!(value.coerce_i64().unwrap(), 2);

        // the child's own value wins once set
        co.frame_mut().unwrap().set_symbol('%', Variant::ulongint(7));
        let value = eval_in_top(&co, &VcmNode::Symbol('%'), false).unwrap();
        assert_eq!(value.coerce_i64().unwrap(), 7);
    }

    #[test]
    fn variables_hit_scope_then_builtins() {
        let mut co = test_coroutine();
        push_frame(&mut co);

        let node = VcmNode::Variable("TIMERS".into());
        let from_builtins = eval_in_top(&co, &node, false).unwrap();
        assert!(from_builtins.ptr_eq(&co.timers_var));

        let scope = co.frame().unwrap().scope;
        co.scoped.bind(scope, "TIMERS", Variant::string("shadow"));
        let shadowed = eval_in_top(&co, &node, false).unwrap();
        assert_eq!(shadowed.to_string(), "shadow");
    }
}
