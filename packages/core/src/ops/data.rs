//! Data tags: `<init>`, `<bind>`, `<define>`, `<archetype>`.
//!
//! None of these execute their children as steps; children are payload.

use super::{ElementOps, OpsCtx};
use crate::error::{HvmlError, Result};
use hvml_variant::Variant;
use hvml_vdom::{TagName, VNodeId};

/// Where a binding lands: `<init>` under `<head>`/`<hvml>` binds at
/// document level, everything else binds at the element's parent so
/// siblings that follow can see it.
fn binding_node(ctx: &OpsCtx<'_>, at: Option<&str>) -> VNodeId {
    let doc = &ctx.co.doc;
    let document_node = doc.document_node();
    if matches!(at, Some("_topmost") | Some("_root")) {
        return document_node;
    }

    let Some(pos) = ctx.pos() else {
        return document_node;
    };
    let parent = doc.parent(pos).unwrap_or(document_node);
    match doc.element(parent).map(|el| &el.tag) {
        Some(TagName::Head) | Some(TagName::Hvml) => document_node,
        _ => parent,
    }
}

/// The payload of a data tag: `with` attribute first, else data content.
fn data_value(ctx: &OpsCtx<'_>) -> Result<Variant> {
    if let Some(value) = ctx.eval_attr("with")? {
        return Ok(value);
    }
    if let Some(parts) = ctx.content_parts() {
        return ctx.eval_data_content(&parts);
    }
    Ok(Variant::undefined())
}

pub struct InitOps;

impl ElementOps for InitOps {
    fn name(&self) -> &'static str {
        "init"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let name = ctx
            .require_attr("as")?
            .to_string();
        let mut value = data_value(ctx)?;

        // `uniquely` turns the data into a set, keyed by `against`
        if ctx.has_flag("uniquely") {
            let key_field = ctx.eval_attr("against")?.map(|v| v.to_string());
            let set = Variant::set_by_key(key_field.as_deref());
            for member in value.members() {
                set.set_add(member)?;
            }
            value = set;
        }

        // `$TIMERS` is live: merge elements into the bound set so the
        // timer bridge listeners see the growth
        if name == "TIMERS" {
            let timers = ctx.co.timers_var.clone();
            for member in value.members() {
                timers.set_add(member)?;
            }
            ctx.set_result(timers);
            return Ok(false);
        }

        let at = ctx.eval_attr("at")?.map(|v| v.to_string());
        let node = binding_node(ctx, at.as_deref());
        ctx.co.scoped.bind(node, name, value.clone());
        ctx.set_result(value);
        Ok(false)
    }
}

pub struct BindOps;

impl ElementOps for BindOps {
    fn name(&self) -> &'static str {
        "bind"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let name = ctx.require_attr("as")?.to_string();
        let value = match ctx.eval_attr("on")? {
            Some(value) => value,
            None => data_value(ctx)?,
        };

        let at = ctx.eval_attr("at")?.map(|v| v.to_string());
        let node = binding_node(ctx, at.as_deref());
        ctx.co.scoped.bind(node, name, value.clone());
        ctx.set_result(value);
        Ok(false)
    }
}

pub struct DefineOps;

impl ElementOps for DefineOps {
    fn name(&self) -> &'static str {
        "define"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let name = ctx.require_attr("as")?.to_string();
        let Some(pos) = ctx.pos() else {
            return Err(HvmlError::bad_arg("<define> outside the document"));
        };
        log::debug!("defined group {name:?}");
        ctx.co.groups.insert(name, pos);
        // the group body runs only through <include>/<call>
        Ok(false)
    }
}

pub struct ArchetypeOps;

impl ElementOps for ArchetypeOps {
    fn name(&self) -> &'static str {
        "archetype"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let name = ctx.require_attr("name")?.to_string();
        let Some(pos) = ctx.pos() else {
            return Err(HvmlError::bad_arg("<archetype> outside the document"));
        };
        ctx.co.archetypes.insert(name, pos);
        // template content is stamped lazily by <update>
        Ok(false)
    }
}
