//! The per-tick phase transition.
//!
//! One call to [`step`] advances a coroutine by exactly one frame-phase
//! transition. Errors returned by ops are moved into the coroutine's
//! exception slot here - this is the single point where the C original's
//! thread-local error slot became a function.

use crate::coroutine::{Coroutine, CoroutineState};
use crate::error::{Exception, HvmlError};
use crate::heap::Services;
use crate::ops::{push_child_frame, OpsCtx, SelectOutcome};
use crate::stack::NextStep;

/// Advance `co` by one transition. The coroutine is `RUN` for the
/// duration and `READY` again on return; parking and termination are the
/// heap's decisions afterwards.
pub(crate) fn step(co: &mut Coroutine, services: &Services) {
    co.state = CoroutineState::Run;
    step_inner(co, services);
    co.state = CoroutineState::Ready;
}

fn step_inner(co: &mut Coroutine, services: &Services) {
    // <exit> unwinds everything without running further phases
    if co.exiting {
        co.stack.clear();
        if co.exception_claimed.is_some() {
            // a catch had already consumed the exception; exit keeps it
            // consumed
            co.exception = None;
            co.exception_claimed = None;
        }
        return;
    }

    // <back> unwinds to its boundary frame, delivering the value
    if let Some((depth, value)) = co.back_request.take() {
        while co.stack.len() > depth + 1 {
            co.stack.pop();
        }
        if co.exception_claimed.map(|d| d >= co.stack.len()).unwrap_or(false) {
            co.exception_claimed = None;
        }
        if let Some(frame) = co.stack.last_mut() {
            frame.result = value;
            frame.next_step = NextStep::OnPopping;
        }
        return;
    }

    if co.stack.is_empty() {
        return;
    }

    // a preemptor overrides exactly one transition
    let preemptor = co.stack.last_mut().and_then(|f| f.preemptor.take());
    let (next_step, ops) = {
        let frame = co.stack.last().expect("checked non-empty");
        (frame.next_step, frame.ops.clone())
    };

    let mut ctx = OpsCtx { co, services };

    if let Some(preemptor) = preemptor {
        if let Err(err) = preemptor(&mut ctx) {
            capture_exception(ctx.co, err);
        }
        return;
    }

    match next_step {
        NextStep::AfterPushed => match ops.after_pushed(&mut ctx) {
            Ok(true) => ctx.frame_mut().next_step = NextStep::SelectChild,
            Ok(false) => ctx.frame_mut().next_step = NextStep::OnPopping,
            Err(err) => {
                capture_exception(ctx.co, err);
                if let Some(frame) = ctx.co.frame_mut() {
                    frame.next_step = NextStep::OnPopping;
                }
            }
        },

        NextStep::SelectChild => match ops.select_child(&mut ctx) {
            Ok(SelectOutcome::Push(child)) => {
                push_child_frame(ctx.co, &services.ops, child);
            }
            Ok(SelectOutcome::Handled) => {}
            Ok(SelectOutcome::Done) => ctx.frame_mut().next_step = NextStep::OnPopping,
            // stay in SELECT_CHILD: the exception travels with the
            // coroutine and the remaining children may include a <catch>
            Err(err) => capture_exception(ctx.co, err),
        },

        NextStep::OnPopping => match ops.on_popping(&mut ctx) {
            Ok(true) => pop_frame(ctx.co),
            Ok(false) => ctx.frame_mut().next_step = NextStep::Rerun,
            Err(err) => {
                capture_exception(ctx.co, err);
                pop_frame(ctx.co);
            }
        },

        NextStep::Rerun => match ops.rerun(&mut ctx) {
            Ok(true) => ctx.frame_mut().next_step = NextStep::SelectChild,
            // a rerun that cannot re-arm pops rather than ping-ponging
            // with on_popping
            Ok(false) => pop_frame(ctx.co),
            Err(err) => {
                capture_exception(ctx.co, err);
                pop_frame(ctx.co);
            }
        },
    }
}

/// Pop the top frame and deliver its result to the parent's `?`.
fn pop_frame(co: &mut Coroutine) {
    let Some(popped) = co.stack.pop() else {
        return;
    };
    // a claim that belonged to the popped frame but was never released
    // (forced pop) leaves the exception pending
    if co.exception_claimed.map(|d| d >= co.stack.len()).unwrap_or(false) {
        co.exception_claimed = None;
    }
    if let Some(parent) = co.stack.last_mut() {
        parent.take_child_result(popped.result);
    } else if co.result.is_none() && !popped.result.is_undefined() {
        // the root frame's result is the coroutine's, unless <exit> spoke
        co.result = Some(popped.result);
    }
}

/// Move an error into the coroutine's exception slot, honoring the
/// frame's `silently` demotion.
pub(crate) fn capture_exception(co: &mut Coroutine, error: HvmlError) {
    let silently = co.frame().map(|f| f.silently).unwrap_or(false);
    if silently && !is_raised_exception(&error) {
        log::warn!("silently demoted in {:?}: {error}", co.id);
        if let Some(frame) = co.frame_mut() {
            frame.result = hvml_variant::Variant::undefined();
        }
        return;
    }

    let callsite = co
        .frame()
        .and_then(|f| f.pos)
        .map(|pos| co.doc.path_of(pos))
        .unwrap_or_else(|| String::from("<no frame>"));
    log::debug!("captured exception {} at {callsite}: {error}", error.atom);

    // first capture wins; a cascading error must not mask the original
    if co.exception.is_none() {
        co.exception = Some(Exception { error, callsite });
    }
}

/// `raise()`-style exceptions carry an atom that differs from their
/// kind's default; those punch through `silently`.
fn is_raised_exception(error: &HvmlError) -> bool {
    error.atom != error.kind.default_atom()
}
