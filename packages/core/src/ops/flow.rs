//! Flow tags: `<inherit>`, `<exit>`, `<catch>`/`<except>`, `<back>`,
//! `<call>`/`<include>`, `<load>`.

use super::{select_from, ElementOps, OpsCtx, SelectOutcome};
use crate::error::{HvmlError, Result};
use hvml_variant::Variant;
use hvml_vdom::VNodeId;
use std::rc::Rc;

// ------------------------------------------------------------- inherit

/// `<inherit>` runs its content and children in the enclosing context;
/// its value is whatever the content produced.
pub struct InheritOps;

impl ElementOps for InheritOps {
    fn name(&self) -> &'static str {
        "inherit"
    }
}

// ---------------------------------------------------------------- exit

pub struct ExitOps;

impl ElementOps for ExitOps {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let value = ctx
            .eval_attr("with")?
            .unwrap_or_else(Variant::undefined);
        log::debug!("coroutine {:?} exiting with {value:?}", ctx.co.id);
        ctx.co.result = Some(value);
        ctx.co.exiting = true;
        Ok(false)
    }
}

// ------------------------------------------------------- catch / except

struct ClaimCtxt {
    depth: usize,
}

fn exception_matches(ctx: &OpsCtx<'_>, rule: Option<&str>) -> bool {
    let Some(exception) = &ctx.co.exception else {
        return false;
    };
    match rule {
        None | Some("*") | Some("") => true,
        Some(name) => exception.atom().as_str() == name,
    }
}

fn claim_exception(ctx: &mut OpsCtx<'_>) -> Result<bool> {
    let rule = match ctx.attr_expr("for") {
        Some(expr) => {
            let silently = ctx.frame().silently;
            Some(crate::eval::eval_in_top(ctx.co, &expr, silently)?.to_string())
        }
        None => None,
    };
    if !exception_matches(ctx, rule.as_deref()) {
        return Ok(false);
    }

    let depth = ctx.co.depth() - 1;
    ctx.co.exception_claimed = Some(depth);
    if let Some(exception) = &ctx.co.exception {
        log::debug!("claimed exception {} at depth {depth}", exception.atom());
        let info = exception
            .error
            .info
            .clone()
            .unwrap_or_else(Variant::undefined);
        ctx.frame_mut().set_symbol('?', info);
    }
    ctx.frame_mut().ctxt = Some(Box::new(ClaimCtxt { depth }));
    Ok(true)
}

fn release_claim(ctx: &mut OpsCtx<'_>) {
    let claimed = ctx
        .frame()
        .ctxt_ref::<ClaimCtxt>()
        .map(|c| ctx.co.exception_claimed == Some(c.depth))
        .unwrap_or(false);
    if claimed {
        // the exception is consumed here, per the tag contract
        ctx.co.exception = None;
        ctx.co.exception_claimed = None;
    }
}

/// `<catch for \`SomeError\`>`: runs its children as the handler when the
/// pending exception matches, and consumes it while popping.
pub struct CatchOps;

impl ElementOps for CatchOps {
    fn name(&self) -> &'static str {
        "catch"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        claim_exception(ctx)
    }

    fn on_popping(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        release_claim(ctx);
        Ok(true)
    }
}

/// `<except>` is the declarative sibling of `<catch>`: same matching and
/// consumption, but its children are fallback content.
pub struct ExceptOps;

impl ElementOps for ExceptOps {
    fn name(&self) -> &'static str {
        "except"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        claim_exception(ctx)
    }

    fn on_popping(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        release_claim(ctx);
        Ok(true)
    }
}

// ---------------------------------------------------------------- back

pub struct BackOps;

impl ElementOps for BackOps {
    fn name(&self) -> &'static str {
        "back"
    }

    /// Unwind to the nearest `<call>`/`<include>` boundary (or the frame
    /// depth named by `to`), delivering `with` as that frame's result.
    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let value = ctx
            .eval_attr("with")?
            .unwrap_or_else(Variant::undefined);
        let to = ctx.eval_attr("to")?.map(|v| v.to_string());

        let target = match to.as_deref() {
            Some("_parent") => ctx.co.depth().checked_sub(3),
            Some("_grandparent") => ctx.co.depth().checked_sub(4),
            _ => {
                // nearest call/include below us
                ctx.co
                    .stack
                    .iter()
                    .enumerate()
                    .rev()
                    .skip(1)
                    .find(|(_, frame)| matches!(frame.ops.name(), "call" | "include"))
                    .map(|(depth, _)| depth)
            }
        };

        match target {
            Some(depth) => {
                ctx.co.back_request = Some((depth, value));
                Ok(false)
            }
            None => Err(HvmlError::bad_arg("<back> found no frame to return to")),
        }
    }
}

// ------------------------------------------------------ call / include

struct GroupCtxt {
    group: VNodeId,
}

fn resolve_group(ctx: &OpsCtx<'_>) -> Result<VNodeId> {
    let name = ctx
        .eval_attr("from")?
        .or(ctx.eval_attr("with")?)
        .map(|v| v.to_string())
        .ok_or_else(|| HvmlError::bad_arg("group tags need from or with"))?;
    ctx.co
        .groups
        .get(&name)
        .copied()
        .ok_or_else(|| HvmlError::new(crate::error::ErrorKind::NotExists, format!("no group {name:?}")))
}

fn group_after_pushed(ctx: &mut OpsCtx<'_>) -> Result<bool> {
    let group = resolve_group(ctx)?;
    if let Some(input) = ctx.eval_attr("on")? {
        ctx.set_child_input(input);
    }
    ctx.frame_mut().ctxt = Some(Box::new(GroupCtxt { group }));
    Ok(true)
}

fn group_select_child(ctx: &mut OpsCtx<'_>) -> Result<SelectOutcome> {
    match ctx.frame().ctxt_ref::<GroupCtxt>().map(|c| c.group) {
        Some(group) => select_from(ctx, group),
        None => Ok(SelectOutcome::Done),
    }
}

/// `<include from 'name'>`: execute a defined group in place.
pub struct IncludeOps;

impl ElementOps for IncludeOps {
    fn name(&self) -> &'static str {
        "include"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        group_after_pushed(ctx)
    }

    fn select_child(&self, ctx: &mut OpsCtx<'_>) -> Result<SelectOutcome> {
        group_select_child(ctx)
    }
}

/// `<call from 'name'>`: like include, but the group's result is the
/// call's value (the `<back>` target).
pub struct CallOps;

impl ElementOps for CallOps {
    fn name(&self) -> &'static str {
        "call"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        group_after_pushed(ctx)
    }

    fn select_child(&self, ctx: &mut OpsCtx<'_>) -> Result<SelectOutcome> {
        group_select_child(ctx)
    }

    fn on_popping(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        if ctx.frame().result.is_undefined() {
            if let Some(result) = ctx.frame().result_from_child.clone() {
                ctx.set_result(result);
            }
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------- load

/// `<load>` schedules another document as a fresh coroutine. Only inline
/// sources (`with` holding HVML text) run here; `from` URLs belong to the
/// external fetcher.
pub struct LoadOps;

impl ElementOps for LoadOps {
    fn name(&self) -> &'static str {
        "load"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        if ctx.attr_expr("from").is_some() {
            return Err(HvmlError::not_implemented("<load from> (external fetcher)"));
        }
        let source = ctx.require_attr("with")?.to_string();
        let doc = hvml_vdom::parse_document(&source)?;
        ctx.services.spawn_queue.borrow_mut().push(Rc::new(doc));
        ctx.set_result(Variant::boolean(true));
        Ok(false)
    }
}
