//! `<update>`: mutate the output DOM or a data container.

use super::{apply_attr_op, ElementOps, OpsCtx};
use crate::edom::resolve_dom_target;
use crate::error::{HvmlError, Result};
use crate::eval::eval_content;
use hvml_dom::DomId;
use hvml_variant::Variant;
use hvml_vdom::{AttrOp, VcmNode, VNodeData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateAction {
    Displace,
    Append,
    Prepend,
    Merge,
    Remove,
}

impl UpdateAction {
    fn parse(text: Option<&str>) -> Result<Self> {
        Ok(match text {
            None | Some("displace") => UpdateAction::Displace,
            Some("append") => UpdateAction::Append,
            Some("prepend") => UpdateAction::Prepend,
            Some("merge") | Some("unite") => UpdateAction::Merge,
            Some("remove") | Some("subtract") => UpdateAction::Remove,
            Some(other) => {
                return Err(HvmlError::bad_arg(format!("unknown update action {other:?}")))
            }
        })
    }
}

pub struct UpdateOps;

impl UpdateOps {
    /// The update payload: `with` (possibly an archetype reference) or
    /// data content.
    fn payload(ctx: &mut OpsCtx<'_>) -> Result<Variant> {
        if let Some(VcmNode::Variable(name)) = ctx.attr_expr("with") {
            // an archetype name stamps the template against this frame
            if let Some(&template) = ctx.co.archetypes.get(&*name) {
                return Self::stamp_archetype(ctx, template);
            }
        }
        if let Some(value) = ctx.eval_attr("with")? {
            return Ok(value);
        }
        if let Some(parts) = ctx.content_parts() {
            return ctx.eval_data_content(&parts);
        }
        Ok(Variant::undefined())
    }

    /// Evaluate an archetype's content parts in the current frame and
    /// return the produced markup as a string.
    fn stamp_archetype(ctx: &OpsCtx<'_>, template: hvml_vdom::VNodeId) -> Result<Variant> {
        let doc = ctx.co.doc.clone();
        let silently = ctx.frame().silently;
        let mut out = String::new();
        for &child in doc.children(template) {
            if let VNodeData::Content(parts) = doc.data(child) {
                out.push_str(&eval_content(ctx.co, parts, silently)?.to_string());
            }
        }
        Ok(Variant::string(out))
    }

    fn update_dom(
        ctx: &mut OpsCtx<'_>,
        targets: Vec<DomId>,
        action: UpdateAction,
        at: Option<&str>,
        value: &Variant,
        op: AttrOp,
    ) -> Result<()> {
        for target in targets {
            match at {
                // `at 'attr.name'` addresses an attribute
                Some(at) if at.starts_with("attr.") => {
                    let key = &at[5..];
                    let old = ctx.co.edom.borrow().attribute(target, key).map(str::to_owned);
                    let rendered = apply_attr_op(op, old.as_deref(), value)?;
                    ctx.set_dom_attribute(target, key, &rendered)?;
                }
                // `at 'textContent'` (or nothing) addresses the content
                _ => {
                    let text = value.to_string();
                    match action {
                        UpdateAction::Displace => {
                            if looks_like_markup(&text) {
                                ctx.set_child_chunk(target, &text)?;
                            } else {
                                ctx.displace_text(target, &text)?;
                            }
                        }
                        UpdateAction::Append => {
                            if looks_like_markup(&text) {
                                ctx.add_child_chunk(target, &text)?;
                            } else {
                                let saved = ctx.frame().edom_element;
                                ctx.frame_mut().edom_element = target;
                                let outcome = ctx.append_text(&text);
                                ctx.frame_mut().edom_element = saved;
                                outcome?;
                            }
                        }
                        other => {
                            return Err(HvmlError::bad_arg(format!(
                                "update action {other:?} does not apply to element content"
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn update_container(
        target: &Variant,
        action: UpdateAction,
        at: Option<&str>,
        value: Variant,
    ) -> Result<()> {
        match (at, action) {
            (Some(key), UpdateAction::Displace) => target.object_set(key, value)?,
            (Some(key), UpdateAction::Remove) => {
                target.object_remove(key)?;
            }
            (None, UpdateAction::Append) => match target.kind_name() {
                "array" => target.array_push(value),
                "set" => target.set_add(value)?,
                other => {
                    return Err(HvmlError::bad_arg(format!("cannot append to {other}")))
                }
            },
            (None, UpdateAction::Merge) => match target.kind_name() {
                "set" => {
                    for member in value.members() {
                        target.set_add(member)?;
                    }
                }
                "object" => {
                    for key in value.object_keys() {
                        if let Some(member) = value.object_get(&key) {
                            target.object_set(key, member)?;
                        }
                    }
                }
                other => {
                    return Err(HvmlError::bad_arg(format!("cannot merge into {other}")))
                }
            },
            (None, UpdateAction::Displace) => {
                if target.is_native() {
                    if let Some(ops) = target.as_native_ops() {
                        ops.updater(target, &value)?;
                        return Ok(());
                    }
                }
                return Err(HvmlError::bad_arg("displace needs an at key"));
            }
            (at, action) => {
                return Err(HvmlError::bad_arg(format!(
                    "unsupported update: action {action:?} at {at:?}"
                )))
            }
        }
        Ok(())
    }
}

impl ElementOps for UpdateOps {
    fn name(&self) -> &'static str {
        "update"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let target = ctx.require_attr("on")?;
        let action = UpdateAction::parse(
            ctx.eval_attr("to")?.map(|v| v.to_string()).as_deref(),
        )?;
        let at = ctx.eval_attr("at")?.map(|v| v.to_string());
        let op = ctx.attr_op("with").unwrap_or(AttrOp::Replace);
        let value = Self::payload(ctx)?;

        // output-DOM targets: selectors and `$@` collections
        let dom_targets = {
            let edom = ctx.co.edom.borrow();
            resolve_dom_target(&edom, &target)
        };
        if let Some(targets) = dom_targets {
            Self::update_dom(ctx, targets, action, at.as_deref(), &value, op)?;
            ctx.set_result(Variant::boolean(true));
            return Ok(false);
        }

        // otherwise the target is a data container
        Self::update_container(&target, action, at.as_deref(), value)?;
        ctx.set_result(target);
        Ok(false)
    }
}

/// Crude but sufficient: chunk payloads start with a tag.
fn looks_like_markup(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('<') && trimmed.len() > 1
}
