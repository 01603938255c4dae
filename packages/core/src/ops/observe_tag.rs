//! `<observe>` and `<forget>`: the subscription tags.

use super::{ElementOps, OpsCtx};
use crate::error::{HvmlError, Result};
use crate::observe::{Observer, SubMatch};
use crate::runloop::{LocalMsg, MessageRecord};
use crate::stack::FrameKind;
use hvml_variant::{shrink_atom, Atom, ListenerHandle, Variant};
use std::rc::Rc;

/// Split a `for` value into `(event, sub)`: `"expired:t"` observes event
/// `expired` with sub-type `t`.
fn split_event(rule: &str) -> (Atom, Option<String>) {
    match rule.split_once(':') {
        Some((event, sub)) if !sub.is_empty() => (Atom::intern(event), Some(sub.to_owned())),
        _ => (Atom::intern(rule), None),
    }
}

pub struct ObserveOps;

impl ElementOps for ObserveOps {
    fn name(&self) -> &'static str {
        "observe"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        // frames pushed by message dispatch run the handler children;
        // first-round frames register and pop
        if ctx.frame().kind == FrameKind::Pseudo {
            return Ok(true);
        }

        let observed = ctx.require_attr("on")?;
        let rule = ctx.require_attr("for")?.to_string();
        let (event, sub) = split_event(&rule);

        let pos = ctx
            .pos()
            .ok_or_else(|| HvmlError::bad_arg("<observe> outside the document"))?;
        let listener = bridge_container_events(ctx, &observed, event);
        let observer = Observer {
            observed,
            event,
            sub: SubMatch::parse(sub.as_deref()),
            scope: ctx.frame().scope,
            edom_element: ctx.frame().edom_element,
            pos,
            listener,
        };

        ctx.co.observers.register(observer);
        ctx.co.waits += 1;
        log::debug!(
            "coroutine {:?} observing {event}{} ({} live)",
            ctx.co.id,
            sub.map(|s| format!(":{s}")).unwrap_or_default(),
            ctx.co.waits
        );
        Ok(false)
    }
}

/// Observing `grow`/`shrink`/`change` on a container needs a variant
/// post-listener to forward the mutation onto the message bus. The
/// callback captures no handle to the observed variant itself (the fire
/// path passes the source in), so no reference cycle forms.
fn bridge_container_events(
    ctx: &OpsCtx<'_>,
    observed: &Variant,
    event: Atom,
) -> Option<ListenerHandle> {
    if !observed.is_container() {
        return None;
    }
    if !matches!(event.as_str(), "grow" | "shrink" | "change") {
        return None;
    }

    let runloop = ctx.services.runloop.clone();
    let target = ctx.co.id;
    let handle = observed.register_post_listener(
        event,
        Rc::new(move |source, fired, args| {
            // args: [key-new, value-new, key-old, value-old]
            let (key, value) = if fired == shrink_atom() {
                (&args[2], &args[3])
            } else {
                (&args[0], &args[1])
            };
            runloop.post(LocalMsg::Message(MessageRecord {
                target,
                source: source.clone(),
                event: fired,
                sub: key.as_str().map(str::to_owned),
                extra: value.clone(),
            }));
        }),
    );
    Some(handle)
}

pub struct ForgetOps;

impl ElementOps for ForgetOps {
    fn name(&self) -> &'static str {
        "forget"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        let observed = ctx.require_attr("on")?;
        let event = ctx
            .eval_attr("for")?
            .map(|v| split_event(&v.to_string()).0);

        let handles = ctx.co.observers.matching_registration(&observed, event);
        for handle in handles {
            if ctx.co.observers.revoke(handle).is_some() {
                ctx.co.waits = ctx.co.waits.saturating_sub(1);
                ctx.co.observed_cache.remove(&(handle.list as usize, handle.key));
            }
        }
        Ok(false)
    }
}
