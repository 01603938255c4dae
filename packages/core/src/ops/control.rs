//! Control tags: `<test>`/`<match>`, `<differ>`, `<choose>`, `<iterate>`,
//! `<reduce>`, `<sort>`.

use super::{default_select_child, ElementOps, OpsCtx, SelectOutcome};
use crate::error::{HvmlError, Result};
use hvml_executors::{make_executor, MatchExecutor, parse_match};
use hvml_variant::Variant;

/// Build the executor named by a `by` attribute, if present.
fn executor_from_by(ctx: &OpsCtx<'_>) -> Result<Option<Box<dyn hvml_executors::Executor>>> {
    match ctx.eval_attr("by")? {
        Some(rule) => Ok(Some(make_executor(&rule.to_string())?)),
        None => Ok(None),
    }
}

// ------------------------------------------------------------- iterate

pub(super) struct IterateCtxt {
    items: Vec<Variant>,
    /// Index of the round currently in progress.
    index: usize,
}

pub struct IterateOps;

impl IterateOps {
    fn items(input: &Variant, by: Option<Box<dyn hvml_executors::Executor>>) -> Result<Vec<Variant>> {
        if let Some(executor) = by {
            return Ok(executor.iterate(input)?);
        }
        // without an executor, a numeric input iterates that many rounds
        // (0, 1, ..., n-1); containers iterate their members
        if !input.is_container() {
            if let Ok(count) = input.coerce_i64() {
                return Ok((0..count.max(0)).map(Variant::longint).collect());
            }
        }
        Ok(input.members())
    }
}

impl ElementOps for IterateOps {
    fn name(&self) -> &'static str {
        "iterate"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let input = ctx.require_attr("on")?;
        let items = Self::items(&input, executor_from_by(ctx)?)?;

        ctx.frame_mut().set_symbol('%', Variant::ulongint(0));
        if let Some(first) = items.first() {
            ctx.set_child_input(first.clone());
        }
        ctx.frame_mut().ctxt = Some(Box::new(IterateCtxt { items, index: 0 }));
        Ok(true)
    }

    fn select_child(&self, ctx: &mut OpsCtx<'_>) -> Result<SelectOutcome> {
        let exhausted = ctx
            .frame()
            .ctxt_ref::<IterateCtxt>()
            .map(|c| c.index >= c.items.len())
            .unwrap_or(true);
        if exhausted {
            return Ok(SelectOutcome::Done);
        }
        default_select_child(ctx)
    }

    fn on_popping(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let done = ctx
            .frame()
            .ctxt_ref::<IterateCtxt>()
            .map(|c| c.index >= c.items.len())
            .unwrap_or(true);
        Ok(done)
    }

    fn rerun(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let next = {
            let Some(c) = ctx.frame_mut().ctxt_mut::<IterateCtxt>() else {
                return Ok(false);
            };
            c.index += 1;
            c.items.get(c.index).cloned()
        };
        let frame = ctx.frame_mut();
        frame.inc_percent();
        frame.child_cursor = 0;
        if let Some(item) = next {
            frame.child_input = Some(item);
        }
        Ok(true)
    }
}

// ------------------------------------------------------------- choose

pub struct ChooseOps;

impl ElementOps for ChooseOps {
    fn name(&self) -> &'static str {
        "choose"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let input = ctx.require_attr("on")?;
        let chosen = match executor_from_by(ctx)? {
            Some(executor) => executor.choose(&input)?,
            None => input,
        };
        ctx.set_child_input(chosen.clone());
        ctx.set_result(chosen.clone());
        ctx.frame_mut().set_symbol('?', chosen);
        Ok(true)
    }

    fn on_popping(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        // a child's result displaces the chosen value
        if let Some(result) = ctx.frame().result_from_child.clone() {
            ctx.set_result(result);
        }
        Ok(true)
    }
}

// ------------------------------------------------------------- reduce

pub struct ReduceOps;

impl ElementOps for ReduceOps {
    fn name(&self) -> &'static str {
        "reduce"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let input = ctx.require_attr("on")?;
        let reduced = match executor_from_by(ctx)? {
            Some(executor) => executor.reduce(&input)?,
            None => input,
        };
        ctx.set_child_input(reduced.clone());
        ctx.set_result(reduced.clone());
        ctx.frame_mut().set_symbol('?', reduced);
        Ok(true)
    }
}

// --------------------------------------------------------------- sort

pub struct SortOps;

impl ElementOps for SortOps {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let input = ctx.require_attr("on")?;
        let descending = ctx.has_flag("descendingly");
        let key = ctx.eval_attr("against")?.map(|v| v.to_string());

        let mut members = input.members();
        members.sort_by(|a, b| {
            let (a, b) = match &key {
                Some(key) => (
                    a.object_get(key).unwrap_or_else(Variant::undefined),
                    b.object_get(key).unwrap_or_else(Variant::undefined),
                ),
                None => (a.clone(), b.clone()),
            };
            compare_variants(&a, &b)
        });
        if descending {
            members.reverse();
        }

        let sorted = Variant::array(members);
        ctx.set_child_input(sorted.clone());
        ctx.set_result(sorted.clone());
        ctx.frame_mut().set_symbol('?', sorted);
        Ok(true)
    }
}

fn compare_variants(a: &Variant, b: &Variant) -> std::cmp::Ordering {
    match (a.coerce_number(), b.coerce_number()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// ---------------------------------------------------------- test/match

pub(super) struct TestCtxt {
    pub(super) matched: bool,
    pub(super) exclusively: bool,
}

pub struct TestOps;

impl ElementOps for TestOps {
    fn name(&self) -> &'static str {
        "test"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let input = ctx.require_attr("on")?;
        let exclusively = ctx.has_flag("exclusively");
        ctx.set_child_input(input.clone());
        ctx.set_result(input.clone());
        ctx.frame_mut().set_symbol('?', input);
        ctx.frame_mut().ctxt = Some(Box::new(TestCtxt {
            matched: false,
            exclusively,
        }));
        Ok(true)
    }
}

pub struct MatchOps;

impl ElementOps for MatchOps {
    fn name(&self) -> &'static str {
        "match"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let input = ctx
            .frame()
            .get_symbol('<')
            .unwrap_or_else(Variant::undefined);

        // an exclusive sibling already matched: stand down
        if let Some(parent) = ctx.parent_frame_mut() {
            if let Some(test) = parent.ctxt_ref::<TestCtxt>() {
                if test.exclusively && test.matched {
                    return Ok(false);
                }
            }
        }

        let matched = match ctx.attr_expr("for") {
            // no rule: the catch-all arm
            None => true,
            Some(expr) => {
                let silently = ctx.frame().silently;
                let rule = crate::eval::eval_in_top(ctx.co, &expr, silently)?.to_string();
                if rule.trim_start().to_ascii_uppercase().starts_with("MATCH") {
                    MatchExecutor::new(parse_match(&rule)?)?.matches(&input)
                } else {
                    // a bare value compares for equality
                    rule == input.to_string()
                }
            }
        };

        if matched {
            if let Some(parent) = ctx.parent_frame_mut() {
                if let Some(test) = parent.ctxt_mut::<TestCtxt>() {
                    test.matched = true;
                }
            }
        }
        Ok(matched)
    }
}

// -------------------------------------------------------------- differ

pub struct DifferOps;

impl ElementOps for DifferOps {
    fn name(&self) -> &'static str {
        "differ"
    }

    /// Children run only when `on` and `with` differ by value.
    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let lhs = ctx.require_attr("on")?;
        let rhs = ctx
            .eval_attr("with")?
            .or(ctx.eval_attr("to")?)
            .ok_or_else(|| HvmlError::bad_arg("<differ> requires with or to"))?;

        let differs = !lhs.eq_by_value(&rhs);
        ctx.set_result(Variant::boolean(differs));
        ctx.set_child_input(lhs);
        Ok(differs)
    }
}
