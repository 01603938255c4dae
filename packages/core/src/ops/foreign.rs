//! Foreign (output) elements: anything that is not a verb tag.
//!
//! A foreign element materializes itself into the output DOM, evaluates
//! its attributes with the assignment operators applied, and then runs
//! its children with itself as the insertion point. The renderer sees one
//! `appendChild` carrying the fully-attributed element.

use super::{apply_attr_op, ElementOps, OpsCtx};
use crate::error::Result;
use crate::eval::eval_in_top;
use hvml_variant::Variant;

pub struct ForeignOps;

impl ElementOps for ForeignOps {
    fn name(&self) -> &'static str {
        "foreign"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let Some(pos) = ctx.pos() else {
            return Ok(false);
        };
        let doc = ctx.co.doc.clone();
        let Some(element) = doc.element(pos) else {
            return Ok(false);
        };

        let parent = ctx.frame().edom_element;
        let id = {
            let mut edom = ctx.co.edom.borrow_mut();
            edom.append_element(parent, element.tag.as_str())?
        };

        let silently = ctx.frame().silently;
        for attr in &element.attrs {
            // adverb flags drive the interpreter, not the output
            if attr.value.is_none() && attr.name == "silently" {
                continue;
            }
            let value = match &attr.value {
                Some(expr) => eval_in_top(ctx.co, expr, silently)?,
                None => Variant::boolean(true),
            };
            let rendered = apply_attr_op(attr.op, None, &value)?;
            ctx.co
                .edom
                .borrow_mut()
                .set_attribute(id, &attr.name, &rendered)?;
        }

        if let Some(page) = ctx.co.page {
            let html = ctx.co.edom.borrow().outer_html(id);
            ctx.services
                .renderer
                .append_child(page, parent.0 as u64, &html)?;
        }

        ctx.frame_mut().edom_element = id;
        ctx.refresh_at();
        Ok(true)
    }
}
